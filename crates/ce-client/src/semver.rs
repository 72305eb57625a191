//! Loose version sort keys
//!
//! Catalog `semver` values are not strict semver: "trunk", "13.2.0 (git)",
//! "19.38.33133", "nightly", or nothing at all. [`SemverKey`] maps any of
//! these onto a total order where greater means newer.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

static LEADING_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+)(?:\.(\d+))?(?:\.(\d+))?(.*)$")
        .expect("LEADING_VERSION_RE regex should compile")
});

/// Tokens marking an unversioned, bleeding-edge build.
const BLEEDING_EDGE_TOKENS: &[&str] = &["trunk", "head", "git", "snapshot", "nightly", "tip"];

/// Sort key for a loose version string.
///
/// Compares `(major, minor, patch, tweak, remainder)` and finally the raw
/// input, so two distinct strings never compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SemverKey {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub tweak: u64,
    pub remainder: String,
    raw: String,
}

impl SemverKey {
    /// Parse a version-ish string. Never fails.
    pub fn parse(s: Option<&str>) -> Self {
        let raw = s.unwrap_or("").to_string();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Self::zero(raw);
        }

        let lowered = trimmed.to_lowercase();
        let starts_with_digit = lowered.chars().next().is_some_and(|c| c.is_ascii_digit());
        if !starts_with_digit && BLEEDING_EDGE_TOKENS.iter().any(|t| lowered.contains(t)) {
            return SemverKey {
                major: u64::MAX,
                minor: u64::MAX,
                patch: u64::MAX,
                tweak: u64::MAX,
                remainder: lowered,
                raw,
            };
        }

        let Some(caps) = LEADING_VERSION_RE.captures(trimmed) else {
            let remainder = trimmed.to_string();
            let mut key = Self::zero(raw);
            key.remainder = remainder;
            return key;
        };

        let num = |i: usize| -> u64 {
            caps.get(i)
                .map(|m| m.as_str().parse::<u64>().unwrap_or(u64::MAX))
                .unwrap_or(0)
        };
        let rest = caps.get(4).map(|m| m.as_str().trim()).unwrap_or("").to_string();
        let rest_lower = rest.to_lowercase();
        let tweak = u64::from(rest_lower.contains("trunk") || rest_lower.contains("git"));

        SemverKey {
            major: num(1),
            minor: num(2),
            patch: num(3),
            tweak,
            remainder: rest,
            raw,
        }
    }

    fn zero(raw: String) -> Self {
        SemverKey {
            major: 0,
            minor: 0,
            patch: 0,
            tweak: 0,
            remainder: String::new(),
            raw,
        }
    }

    /// Whether this key came from an unversioned tag such as "trunk".
    pub fn is_bleeding_edge(&self) -> bool {
        self.major == u64::MAX && self.minor == u64::MAX && self.patch == u64::MAX
    }

    /// The string this key was parsed from.
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl Ord for SemverKey {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch, self.tweak)
            .cmp(&(other.major, other.minor, other.patch, other.tweak))
            .then_with(|| self.remainder.cmp(&other.remainder))
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for SemverKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Shorthand for [`SemverKey::parse`].
pub fn semver_key(s: Option<&str>) -> SemverKey {
    SemverKey::parse(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(s: &str) -> SemverKey {
        SemverKey::parse(Some(s))
    }

    #[test]
    fn test_numeric_ordering() {
        assert!(key("14.2.0") > key("14.1.0"));
        assert!(key("14.1.0") > key("9.0"));
        assert!(key("10.0") > key("9.5.3"));
    }

    #[test]
    fn test_bleeding_edge_is_newest() {
        assert!(key("trunk") > key("99.0.0"));
        assert!(key("nightly") > key("99.0.0"));
        assert!(key("(snapshot)") > key("1000.0"));
        assert!(key("trunk").is_bleeding_edge());
        assert!(!key("13.1").is_bleeding_edge());
    }

    #[test]
    fn test_digit_prefixed_git_is_versioned() {
        let k = key("13.2.0 (git)");
        assert!(!k.is_bleeding_edge());
        assert_eq!(k.tweak, 1);
        assert!(k > key("13.2.0"));
        assert!(k < key("13.3.0"));
    }

    #[test]
    fn test_unparseable_sorts_oldest_and_lexically() {
        let a = key("abc");
        let b = key("abd");
        assert!(a < key("0.1"));
        assert!(a < b);
        assert_eq!(a.major, 0);
    }

    #[test]
    fn test_missing_is_zero() {
        let none = SemverKey::parse(None);
        let empty = key("");
        assert_eq!(none.major, 0);
        assert_eq!(none, empty);
        assert!(none < key("0.0.1"));
    }

    #[test]
    fn test_distinct_strings_never_tie() {
        let a = key("13.0");
        let b = key("13.0.0");
        assert_ne!(a.cmp(&b), Ordering::Equal);
        let c = key(" 13.0");
        assert_ne!(a.cmp(&c), Ordering::Equal);
    }

    #[test]
    fn test_huge_component_saturates() {
        let k = key("99999999999999999999999.1");
        assert_eq!(k.major, u64::MAX);
        assert_eq!(k.minor, 1);
    }
}
