use super::RevId;

/// Formats `chain` (already in reverse-chronological order, i.e. current
/// revision first) as a comma-separated history string, truncated at the
/// first occurrence of any element of `back_to` or at `max_count`,
/// whichever comes first. If truncated by `back_to`, the matching element
/// is still included (spec.md §4.1).
pub fn format_history(chain: &[RevId], max_count: usize, back_to: &[RevId]) -> String {
    let mut out = Vec::with_capacity(chain.len().min(max_count.max(1)));

    for rev in chain {
        if out.len() >= max_count {
            break;
        }
        out.push(rev.format());
        if back_to.contains(rev) {
            break;
        }
    }

    out.join(",")
}
