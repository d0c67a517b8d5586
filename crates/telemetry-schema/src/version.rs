//! Schema version identifiers.
//!
//! Versions are dotted sequences of non-negative integers (`1.2.3`). They
//! compare numerically segment by segment, with missing trailing segments
//! treated as zero, so `1.0` and `1.0.0` name the same version and `1.10.0`
//! sorts after `1.9.0`.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use smallvec::SmallVec;

/// Reason a version string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("version is empty")]
    Empty,

    #[error("segment {index} is empty")]
    EmptySegment { index: usize },

    #[error("segment {index} ({segment:?}) is not a non-negative integer")]
    InvalidSegment { index: usize, segment: String },
}

/// A parsed schema version.
#[derive(Debug, Clone)]
pub struct Version {
    segments: SmallVec<[u64; 4]>,
    raw: String,
}

impl Version {
    /// The version assumed for data that does not declare one.
    pub fn zero() -> Self {
        Self {
            segments: SmallVec::from_slice(&[0, 0, 0]),
            raw: "0.0.0".to_owned(),
        }
    }

    /// Extract the version from the last path segment of a schema URL.
    ///
    /// `https://opentelemetry.io/schemas/1.1.0` yields `1.1.0`. Returns `None`
    /// when the URL has no trailing segment or it is not a valid version.
    pub fn from_schema_url(url: &str) -> Option<Self> {
        let trimmed = url.trim_end_matches('/');
        let (_, last) = trimmed.rsplit_once('/')?;
        last.parse().ok()
    }

    /// Numeric segments as written.
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    /// The version as originally spelled.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|s| *s != 0)
            .map_or(0, |i| i + 1);
        &self.segments[..len]
    }
}

impl FromStr for Version {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let mut segments = SmallVec::new();
        for (index, segment) in s.split('.').enumerate() {
            if segment.is_empty() {
                return Err(VersionParseError::EmptySegment { index });
            }
            // u64::from_str accepts a leading '+', which is not a version digit.
            if !segment.bytes().all(|b| b.is_ascii_digit()) {
                return Err(VersionParseError::InvalidSegment {
                    index,
                    segment: segment.to_owned(),
                });
            }
            let value = segment
                .parse::<u64>()
                .map_err(|_| VersionParseError::InvalidSegment {
                    index,
                    segment: segment.to_owned(),
                })?;
            segments.push(value);
        }

        Ok(Self {
            segments,
            raw: s.to_owned(),
        })
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        for i in 0..len {
            let a = self.segments.get(i).copied().unwrap_or(0);
            let b = other.segments.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
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

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn parses_dotted_versions() {
        assert_eq!(v("1.2.3").segments(), &[1, 2, 3]);
        assert_eq!(v("2").segments(), &[2]);
        assert_eq!(v(" 1.0 ").as_str(), "1.0");
    }

    #[test]
    fn rejects_malformed_versions() {
        assert_eq!("".parse::<Version>().unwrap_err(), VersionParseError::Empty);
        assert_eq!(
            "1..2".parse::<Version>().unwrap_err(),
            VersionParseError::EmptySegment { index: 1 }
        );
        assert!(matches!(
            "1.x".parse::<Version>(),
            Err(VersionParseError::InvalidSegment { index: 1, .. })
        ));
        assert!("1.+2".parse::<Version>().is_err());
        assert!("-1.0".parse::<Version>().is_err());
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert!(v("1.10.0") > v("1.9.0"));
        assert!(v("1.0.0") < v("1.0.1"));
        assert!(v("0.0.0") < v("1.0.0"));
        assert!(v("2") > v("1.99.99"));
    }

    #[test]
    fn missing_segments_are_zero() {
        assert_eq!(v("1.0"), v("1.0.0"));
        assert_eq!(v("1"), v("1.0.0.0"));
        assert_ne!(v("1.0.1"), v("1.0"));

        let set: HashSet<_> = [v("1.0"), v("1.0.0")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_keeps_original_spelling() {
        assert_eq!(v("1.0").to_string(), "1.0");
        assert_eq!(Version::zero().to_string(), "0.0.0");
    }

    #[test]
    fn version_from_schema_url() {
        assert_eq!(
            Version::from_schema_url("https://opentelemetry.io/schemas/1.1.0"),
            Some(v("1.1.0"))
        );
        assert_eq!(
            Version::from_schema_url("https://opentelemetry.io/schemas/1.9.0/"),
            Some(v("1.9.0"))
        );
        assert_eq!(Version::from_schema_url("https://example.com/schemas/latest"), None);
        assert_eq!(Version::from_schema_url(""), None);
    }

    #[test]
    fn deserialises_from_string() {
        let version: Version = serde_yaml::from_str("\"1.2.0\"").unwrap();
        assert_eq!(version, v("1.2"));

        let err = serde_yaml::from_str::<Version>("\"one\"");
        assert!(err.is_err());
    }
}
