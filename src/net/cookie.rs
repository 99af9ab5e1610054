//! A plain-text HTTP cookie jar (spec.md §6, "Cookie store"): parses
//! `Set-Cookie` per RFC 6265 with extensions for the Google-style
//! dash-date and ANSI-C `asctime` timestamp formats, and rejects cookies
//! whose `Domain` attribute isn't a suffix of the source host unless
//! `accept_parent_domain` is set and the source host is in turn a suffix of
//! the domain.
//!
//! Grounded on `examples/original_source/Networking/HTTP/CookieStore.{cc,hh}`;
//! out of deep scope per spec.md §1, so this mirrors only what §6 calls out
//! rather than the original's full persistence/`fleece::Encoder` machinery.

use chrono::{NaiveDateTime, Utc};
use std::time::{SystemTime, UNIX_EPOCH};

/// Date formats accepted in a `Set-Cookie: ...; Expires=...` attribute, in
/// the order the original tries them (`CookieStore.cc`'s `dateFormats`):
/// RFC 822, the Google Cloud Load Balancer dash-date variant, and ANSI C's
/// `asctime()` format.
const DATE_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S GMT", "%a, %d-%b-%Y %H:%M:%S GMT", "%a %b %e %H:%M:%S %Y"];

fn parse_gmt_time(s: &str) -> Option<i64> {
    for fmt in DATE_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp());
        }
    }
    None
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// `host` is the cookie's target domain-matching check: `domain` matches if
/// it equals `host` or is a dot-separated suffix of it
/// (`example.com` matches `www.example.com` but not `notexample.com`).
fn domain_contains(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    let host = host.trim_end_matches('.');
    host.eq_ignore_ascii_case(domain) || host.to_ascii_lowercase().ends_with(&format!(".{}", domain.to_ascii_lowercase()))
}

fn path_contains(cookie_path: &str, request_path: &str) -> bool {
    if cookie_path.is_empty() || cookie_path == "/" {
        return true;
    }
    if !request_path.starts_with(cookie_path) {
        return false;
    }
    cookie_path.ends_with('/')
        || request_path.len() == cookie_path.len()
        || request_path.as_bytes().get(cookie_path.len()) == Some(&b'/')
}

/// Derives the default cookie path from a request path: everything up to
/// (not including) the last `/` (RFC 6265 §5.1.4), matching
/// `Cookie::Cookie`'s `fromPath.rfind('/')` handling.
fn default_path(request_path: &str) -> String {
    match request_path.rfind('/') {
        Some(slash) if slash > 0 => request_path[..slash].to_string(),
        _ => String::new(),
    }
}

/// One HTTP cookie. `valid()` reports whether parsing succeeded; invalid
/// cookies carry an empty `name` and are never inserted into a
/// [`CookieStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub created: i64,
    pub expires: i64,
    pub secure: bool,
}

impl Cookie {
    pub fn valid(&self) -> bool {
        !self.name.is_empty()
    }

    /// A persistent (non-session) cookie carries a positive `expires`.
    pub fn persistent(&self) -> bool {
        self.expires > 0
    }

    pub fn expired(&self) -> bool {
        self.expires > 0 && self.expires < now_secs()
    }

    /// Parses a `Set-Cookie:` header value received while fetching
    /// `from_path` on `from_host`. Returns `None` for a header this store
    /// rejects outright (malformed, or a `Domain` attribute that isn't
    /// legal for `from_host` and `accept_parent_domain` doesn't rescue).
    pub fn parse(header: &str, from_host: &str, from_path: &str, accept_parent_domain: bool) -> Option<Cookie> {
        let created = now_secs();
        let mut domain = from_host.to_string();
        let mut path = default_path(from_path);
        let mut secure = false;
        let mut expires: i64 = 0;
        let mut name = String::new();
        let mut value = String::new();

        for (i, pair) in header.split(';').enumerate() {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }
            let (key, val) = match pair.split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => (pair, ""),
            };
            if i == 0 {
                name = key.to_string();
                value = val.trim_matches('"').to_string();
                continue;
            }
            match key.to_ascii_lowercase().as_str() {
                "domain" => {
                    let val = val.trim_start_matches('.');
                    if !domain_contains(val, from_host) && !(accept_parent_domain && domain_contains(from_host, val))
                    {
                        return None;
                    }
                    domain = val.to_string();
                }
                "path" => path = val.to_string(),
                "secure" => secure = true,
                "expires" => {
                    if expires == 0 {
                        expires = parse_gmt_time(val)?;
                    }
                }
                "max-age" => {
                    let max_age: i64 = val.parse().ok()?;
                    expires = created + max_age;
                }
                _ => {}
            }
        }

        if name.is_empty() {
            return None;
        }
        Some(Cookie { name, value, domain, path, created, expires, secure })
    }

    /// Two cookies are the "same cookie" for replacement purposes if they
    /// share a name/domain/path triple (case-insensitive domain).
    pub fn matches(&self, other: &Cookie) -> bool {
        self.name == other.name && self.domain.eq_ignore_ascii_case(&other.domain) && self.path == other.path
    }

    pub fn same_value_as(&self, other: &Cookie) -> bool {
        self.value == other.value && self.expires == other.expires && self.secure == other.secure
    }

    /// Whether this cookie should be sent on a request to `host`/`path`
    /// (optionally over a secure transport).
    pub fn applies_to(&self, host: &str, path: &str, is_secure_transport: bool) -> bool {
        domain_contains(&self.domain, host) && path_contains(&self.path, path) && (!self.secure || is_secure_transport)
    }
}

/// A thread-safe(-by-caller) jar of cookies accumulated from `Set-Cookie`
/// responses, with lookup for the `Cookie:` header to send on a subsequent
/// request. Mirrors `CookieStore`'s `setCookie`/`cookiesForRequest` shape.
#[derive(Debug, Default, Clone)]
pub struct CookieStore {
    cookies: Vec<Cookie>,
    changed: bool,
}

impl CookieStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses and inserts a `Set-Cookie` header, replacing any existing
    /// cookie with the same name/domain/path. Returns `false` if the
    /// header didn't parse into a valid cookie.
    pub fn set_cookie(&mut self, header_value: &str, from_host: &str, from_path: &str) -> bool {
        self.set_cookie_with_policy(header_value, from_host, from_path, false)
    }

    pub fn set_cookie_with_policy(
        &mut self,
        header_value: &str,
        from_host: &str,
        from_path: &str,
        accept_parent_domain: bool,
    ) -> bool {
        let Some(new_cookie) = Cookie::parse(header_value, from_host, from_path, accept_parent_domain) else {
            return false;
        };
        self.add_cookie(new_cookie);
        true
    }

    fn add_cookie(&mut self, new_cookie: Cookie) {
        self.cookies.retain(|c| !c.matches(&new_cookie));
        if !new_cookie.expired() {
            self.cookies.push(new_cookie);
        }
        self.changed = true;
    }

    pub fn cookies(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter().filter(|c| !c.expired())
    }

    /// Builds the `Cookie:` header value to send on a request to
    /// `host`/`path`.
    pub fn cookies_for_request(&self, host: &str, path: &str, is_secure_transport: bool) -> String {
        self.cookies()
            .filter(|c| c.applies_to(host, path, is_secure_transport))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn clear_cookies(&mut self) {
        self.cookies.clear();
        self.changed = true;
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn clear_changed(&mut self) {
        self.changed = false;
    }

    /// Merges cookies from another store (e.g. loaded from persisted
    /// storage), letting the more recently created copy of a duplicate win.
    pub fn merge(&mut self, other: &CookieStore) {
        for cookie in &other.cookies {
            match self.cookies.iter().find(|c| c.matches(cookie)) {
                Some(existing) if existing.created >= cookie.created => {}
                _ => self.add_cookie(cookie.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_simple_set_cookie_header() {
        let c = Cookie::parse("session=abc123; Path=/app; Secure", "example.com", "/app/login", false).unwrap();
        assert_eq!(c.name, "session");
        assert_eq!(c.value, "abc123");
        assert_eq!(c.path, "/app");
        assert!(c.secure);
        assert_eq!(c.domain, "example.com");
    }

    #[test]
    fn default_path_is_request_path_minus_last_component() {
        let c = Cookie::parse("a=b", "example.com", "/app/sub/page", false).unwrap();
        assert_eq!(c.path, "/app/sub");
    }

    #[test]
    fn rejects_a_domain_that_is_not_a_suffix_of_the_host() {
        assert!(Cookie::parse("a=b; Domain=evil.com", "example.com", "/", false).is_none());
    }

    #[test]
    fn accepts_a_parent_domain_when_the_flag_is_set_and_host_is_a_suffix_of_it() {
        let c = Cookie::parse("a=b; Domain=example.com", "www.example.com", "/", true).unwrap();
        assert_eq!(c.domain, "example.com");
    }

    #[test]
    fn parses_rfc822_expires() {
        let c = Cookie::parse("a=b; Expires=Wed, 21 Oct 2015 07:28:00 GMT", "example.com", "/", false).unwrap();
        assert_eq!(c.expires, 1445412480);
    }

    #[test]
    fn parses_google_dash_date_expires() {
        let c = Cookie::parse("a=b; Expires=Wed, 21-Oct-2015 07:28:00 GMT", "example.com", "/", false).unwrap();
        assert_eq!(c.expires, 1445412480);
    }

    #[test]
    fn parses_ansi_c_asctime_expires() {
        let c = Cookie::parse("a=b; Expires=Wed Oct 21 07:28:00 2015", "example.com", "/", false).unwrap();
        assert_eq!(c.expires, 1445412480);
    }

    #[test]
    fn max_age_overrides_expires_relative_to_creation_time() {
        let c = Cookie::parse("a=b; Max-Age=60", "example.com", "/", false).unwrap();
        assert_eq!(c.expires, c.created + 60);
    }

    #[test]
    fn store_replaces_a_cookie_with_the_same_name_domain_and_path() {
        let mut store = CookieStore::new();
        store.set_cookie("a=1", "example.com", "/");
        store.set_cookie("a=2", "example.com", "/");
        assert_eq!(store.cookies().count(), 1);
        assert_eq!(store.cookies().next().unwrap().value, "2");
    }

    #[test]
    fn cookies_for_request_respects_domain_path_and_secure() {
        let mut store = CookieStore::new();
        store.set_cookie("a=1; Path=/app; Secure", "example.com", "/");
        store.set_cookie("b=2; Path=/", "example.com", "/");
        let header = store.cookies_for_request("example.com", "/app/page", true);
        assert!(header.contains("a=1"));
        assert!(header.contains("b=2"));

        let insecure = store.cookies_for_request("example.com", "/app/page", false);
        assert!(!insecure.contains("a=1"));
        assert!(insecure.contains("b=2"));
    }

    #[test]
    fn a_cookie_set_with_zero_max_age_in_the_past_is_immediately_expired_and_not_stored() {
        let mut store = CookieStore::new();
        store.set_cookie("a=1; Max-Age=-100", "example.com", "/");
        assert_eq!(store.cookies().count(), 0);
    }
}
