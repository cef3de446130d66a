//! Product version strings.
//!
//! Installed product versions come from the package database as dotted
//! numeric strings (`6.7.2`, `3.15.0`). Upgrade targets may carry a `.z`
//! suffix (`6.6.z`) meaning "latest errata of 6.6"; the suffix is kept in the
//! raw string but ignored for ordering.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Errors raised when parsing a version string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Empty version string")]
    Empty,

    #[error("Invalid version component '{component}' in '{raw}'")]
    InvalidComponent { raw: String, component: String },
}

/// A dotted product version.
#[derive(Debug, Clone, Eq)]
pub struct Version {
    raw: String,
    parts: Vec<u64>,
}

impl Version {
    /// Parse a version such as `6.7`, `6.7.2` or `6.7.z`.
    ///
    /// A trailing `z` component is accepted and ignored for comparisons.
    /// Release suffixes after a dash (`3.15.0-1.el7`) are dropped.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(VersionError::Empty);
        }
        let numeric = raw.split('-').next().unwrap_or(raw);

        let mut parts = Vec::new();
        for component in numeric.split('.') {
            if component == "z" {
                continue;
            }
            let value = component
                .parse::<u64>()
                .map_err(|_| VersionError::InvalidComponent {
                    raw: raw.to_string(),
                    component: component.to_string(),
                })?;
            parts.push(value);
        }
        if parts.is_empty() {
            return Err(VersionError::Empty);
        }

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }

    /// The `major.minor` prefix, e.g. `6.7` for `6.7.2`.
    pub fn major_minor(&self) -> String {
        let major = self.parts.first().copied().unwrap_or(0);
        let minor = self.parts.get(1).copied().unwrap_or(0);
        format!("{}.{}", major, minor)
    }

    /// True when this version sorts strictly before `other`.
    ///
    /// An unparsable `other` compares as not-less so a bad constant never
    /// routes a host onto a legacy code path.
    pub fn less_than(&self, other: &str) -> bool {
        match Self::parse(other) {
            Ok(other) => *self < other,
            Err(_) => false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ordering => return ordering,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_major_minor() {
        let v = Version::parse("6.7.2").unwrap();
        assert_eq!(v.major_minor(), "6.7");
        assert_eq!(v.as_str(), "6.7.2");

        let v = Version::parse("3.15.0-1.el7").unwrap();
        assert_eq!(v.major_minor(), "3.15");
    }

    #[test]
    fn test_z_suffix_is_ignored_for_ordering() {
        let z = Version::parse("6.6.z").unwrap();
        let plain = Version::parse("6.6").unwrap();
        assert_eq!(z, plain);
        assert_eq!(z.to_string(), "6.6.z");
    }

    #[test]
    fn test_ordering_is_numeric() {
        let a = Version::parse("6.10").unwrap();
        let b = Version::parse("6.9.4").unwrap();
        assert!(b < a);
        assert!(b.less_than("6.10"));
        assert!(!a.less_than("6.3"));
    }

    #[test]
    fn test_less_than_with_garbage_is_false() {
        let v = Version::parse("6.1").unwrap();
        assert!(!v.less_than("not-a-version"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Version::parse("  "), Err(VersionError::Empty));
        assert!(matches!(
            Version::parse("6.x"),
            Err(VersionError::InvalidComponent { .. })
        ));
    }
}
