//! `Cookie` / `Set-Cookie` handling.
//!
//! Two directions, two formats:
//!
//! ```text
//! request:   Cookie: a=1; session_id=abc
//! response:  Set-Cookie: session_id=abc; Max-Age=60; Expires=…; Path=/; HttpOnly; SameSite=Lax
//! ```
//!
//! [`parse_pairs`] reads the first, [`Cookie::to_header_value`] writes the second.

use std::fmt;
use std::time::{Duration, SystemTime};

// ── SameSite ──────────────────────────────────────────────────────────────────

/// The `SameSite` cookie attribute.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    /// Loose, case-insensitive parse. Unknown values fall back to `Lax` and are
    /// never rejected.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("strict") {
            Self::Strict
        } else if s.eq_ignore_ascii_case("none") {
            Self::None
        } else {
            Self::Lax
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lax    => "Lax",
            Self::Strict => "Strict",
            Self::None   => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Cookie ────────────────────────────────────────────────────────────────────

/// A cookie destined for a `Set-Cookie` response header.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    pub path: String,
    pub domain: String,
    /// `Max-Age` in seconds. `None` omits the attribute.
    pub max_age: Option<i64>,
    /// `Expires`. `None` omits the attribute.
    pub expires: Option<SystemTime>,
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), ..Self::default() }
    }

    /// A cookie that instructs the client to drop `name`: empty value and an
    /// `Expires` one minute in the past.
    pub fn removal(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expires: SystemTime::now().checked_sub(Duration::from_secs(60)),
            ..Self::default()
        }
    }

    /// Renders the `Set-Cookie` header value.
    pub fn to_header_value(&self) -> String {
        let mut out = format!("{}={}", self.name, self.value);
        if let Some(max_age) = self.max_age {
            out.push_str(&format!("; Max-Age={max_age}"));
        }
        if let Some(expires) = self.expires {
            out.push_str(&format!("; Expires={}", httpdate::fmt_http_date(expires)));
        }
        if !self.domain.is_empty() {
            out.push_str(&format!("; Domain={}", self.domain));
        }
        if !self.path.is_empty() {
            out.push_str(&format!("; Path={}", self.path));
        }
        if self.http_only {
            out.push_str("; HttpOnly");
        }
        if self.secure {
            out.push_str("; Secure");
        }
        out.push_str(&format!("; SameSite={}", self.same_site));
        out
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Iterates the `name=value` pairs of a `Cookie` request header.
///
/// Pairs without `=` are skipped; surrounding whitespace is trimmed and a
/// double-quoted value is unquoted.
pub(crate) fn parse_pairs(header: &str) -> impl Iterator<Item = (&str, &str)> {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.trim().split_once('=')?;
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        Some((name.trim(), value))
    })
}

/// Extracts the cookie name from a `Set-Cookie` header value.
pub(crate) fn set_cookie_name(header_value: &str) -> &str {
    header_value
        .split(';')
        .next()
        .and_then(|pair| pair.split_once('='))
        .map(|(name, _)| name.trim())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_site_parse_is_loose() {
        assert_eq!(SameSite::parse("STRICT"), SameSite::Strict);
        assert_eq!(SameSite::parse("none"), SameSite::None);
        assert_eq!(SameSite::parse("lax"), SameSite::Lax);
        assert_eq!(SameSite::parse("bogus"), SameSite::Lax);
        assert_eq!(SameSite::parse(""), SameSite::Lax);
    }

    #[test]
    fn header_value_carries_attributes() {
        let cookie = Cookie {
            name: "session_id".into(),
            value: "abc".into(),
            path: "/".into(),
            domain: "example.com".into(),
            max_age: Some(60),
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
            ..Cookie::default()
        };
        let v = cookie.to_header_value();
        assert!(v.starts_with("session_id=abc; Max-Age=60"));
        assert!(v.contains("; Domain=example.com"));
        assert!(v.contains("; Path=/"));
        assert!(v.contains("; HttpOnly"));
        assert!(v.contains("; Secure"));
        assert!(v.ends_with("; SameSite=Strict"));
    }

    #[test]
    fn removal_expires_in_the_past() {
        let cookie = Cookie::removal("session_id");
        assert!(cookie.value.is_empty());
        assert!(cookie.expires.unwrap() < SystemTime::now());
        assert!(cookie.to_header_value().contains("; Expires="));
    }

    #[test]
    fn parse_pairs_skips_garbage() {
        let pairs: Vec<_> = parse_pairs(r#"a=1; broken; b = "two" ;c="#).collect();
        assert_eq!(pairs, vec![("a", "1"), ("b", "two"), ("c", "")]);
    }

    #[test]
    fn set_cookie_name_reads_first_pair() {
        assert_eq!(set_cookie_name("tok=abc; Path=/"), "tok");
        assert_eq!(set_cookie_name("garbage"), "");
    }
}
