//! Byte-based send-buffer flow control (spec.md §4.5/§5:
//! `kSendBufferSize = 256 KiB`).

/// Default high-water mark before `send` starts refusing writes.
pub const SEND_BUFFER_SIZE: usize = 256 * 1024;

/// Tracks unacknowledged outbound bytes for one WebSocket connection.
/// `send()` reports whether the caller should keep producing; once the
/// backlog crosses the high-water mark, the caller must wait for
/// `on_writeable` (fired when the backlog drops back below half) before
/// sending more (spec.md §8 property 8).
#[derive(Debug, Default)]
pub struct FlowControl {
    high_water_mark: usize,
    outstanding: usize,
    paused: bool,
    writeable_fired_since_pause: bool,
}

impl FlowControl {
    pub fn new(high_water_mark: usize) -> Self {
        Self { high_water_mark, outstanding: 0, paused: false, writeable_fired_since_pause: false }
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Accounts for `n` newly queued bytes. Returns `true` if the caller may
    /// keep sending, `false` once the backlog has crossed the high-water
    /// mark.
    pub fn send(&mut self, n: usize) -> bool {
        self.outstanding += n;
        if self.outstanding > self.high_water_mark {
            self.paused = true;
        }
        !self.paused
    }

    /// Called by the transport when `n` bytes have actually gone out over
    /// the socket. Returns `true` exactly once per pause/resume cycle, the
    /// moment the backlog drops below half the high-water mark — this is
    /// the `on_writeable` signal.
    pub fn completed_send(&mut self, n: usize) -> bool {
        self.outstanding = self.outstanding.saturating_sub(n);
        if self.paused && self.outstanding < self.high_water_mark / 2 {
            self.paused = false;
            if !self.writeable_fired_since_pause {
                self.writeable_fired_since_pause = true;
                return true;
            }
        }
        if !self.paused {
            self.writeable_fired_since_pause = false;
        }
        false
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_beyond_the_high_water_mark_pauses() {
        let mut fc = FlowControl::new(100);
        assert!(fc.send(50));
        assert!(!fc.send(60));
        assert!(fc.is_paused());
    }

    #[test]
    fn writeable_fires_exactly_once_when_backlog_drops_below_half() {
        let mut fc = FlowControl::new(100);
        fc.send(50);
        fc.send(60);
        assert!(fc.is_paused());

        assert!(!fc.completed_send(10));
        assert!(fc.is_paused());

        assert!(fc.completed_send(60), "crossing below half the high-water mark must fire writeable");
        assert!(!fc.is_paused());
    }

    #[test]
    fn default_high_water_mark_matches_spec_constant() {
        let fc = FlowControl::new(SEND_BUFFER_SIZE);
        assert_eq!(fc.high_water_mark, 256 * 1024);
    }
}
