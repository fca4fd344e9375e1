//! NuGet semantic versions.
//!
//! `major.minor.patch[.revision][-prerelease][+build]`, ordered by the
//! ecosystem's SemVer 2.0 rules. Build metadata never affects ordering,
//! equality or hashing.

use crate::error::{NugetError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// An immutable NuGet package version.
#[derive(Debug, Clone)]
pub struct SemanticVersion {
    major: u64,
    minor: u64,
    patch: u64,
    revision: Option<u64>,
    prerelease: Option<String>,
    build: Option<String>,
}

impl SemanticVersion {
    /// Create a release version.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            revision: None,
            prerelease: None,
            build: None,
        }
    }

    /// Copy of this version carrying a prerelease label.
    pub fn with_prerelease(mut self, label: impl Into<String>) -> Self {
        let label = label.into();
        self.prerelease = if label.is_empty() { None } else { Some(label) };
        self
    }

    /// Strict parse: 3 or 4 numeric components are required.
    pub fn parse(text: &str) -> Result<Self> {
        parse_version(text, 3)
    }

    /// Lenient parse used for feed data and range bounds, where the
    /// ecosystem routinely writes `1.0` for `1.0.0`.
    pub fn parse_lenient(text: &str) -> Result<Self> {
        parse_version(text, 1)
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u64 {
        self.minor
    }

    pub fn patch(&self) -> u64 {
        self.patch
    }

    pub fn revision(&self) -> Option<u64> {
        self.revision
    }

    pub fn prerelease(&self) -> Option<&str> {
        self.prerelease.as_deref()
    }

    pub fn build_metadata(&self) -> Option<&str> {
        self.build.as_deref()
    }

    pub fn is_prerelease(&self) -> bool {
        self.prerelease.is_some()
    }

    /// Version string without build metadata, as feeds expect it in URLs
    /// and query strings.
    pub fn to_normalized_string(&self) -> String {
        let mut out = format!("{}.{}.{}", self.major, self.minor, self.patch);
        if let Some(revision) = self.revision {
            out.push_str(&format!(".{}", revision));
        }
        if let Some(ref pre) = self.prerelease {
            out.push('-');
            out.push_str(pre);
        }
        out
    }

    fn numeric_key(&self) -> (u64, u64, u64, u64) {
        (
            self.major,
            self.minor,
            self.patch,
            self.revision.unwrap_or(0),
        )
    }
}

fn invalid(input: &str, reason: impl Into<String>) -> NugetError {
    NugetError::InvalidVersion {
        input: input.to_string(),
        reason: reason.into(),
    }
}

fn valid_identifier(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn parse_version(text: &str, min_parts: usize) -> Result<SemanticVersion> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(invalid(text, "empty version string"));
    }

    let (without_build, build) = match trimmed.split_once('+') {
        Some((head, build)) => {
            if !build.split('.').all(valid_identifier) {
                return Err(invalid(text, format!("malformed build metadata '{}'", build)));
            }
            (head, Some(build.to_string()))
        }
        None => (trimmed, None),
    };

    let (numeric, prerelease) = match without_build.split_once('-') {
        Some((head, pre)) => {
            if !pre.split('.').all(valid_identifier) {
                return Err(invalid(text, format!("malformed prerelease label '{}'", pre)));
            }
            (head, Some(pre.to_string()))
        }
        None => (without_build, None),
    };

    let parts: Vec<&str> = numeric.split('.').collect();
    if parts.len() < min_parts {
        return Err(invalid(
            text,
            format!(
                "expected at least {} numeric components, found {}",
                min_parts,
                parts.len()
            ),
        ));
    }
    if parts.len() > 4 {
        return Err(invalid(text, "more than 4 numeric components"));
    }

    let mut numbers = [0u64; 4];
    for (slot, part) in numbers.iter_mut().zip(&parts) {
        if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(text, format!("non-numeric component '{}'", part)));
        }
        *slot = part
            .parse::<u64>()
            .map_err(|e| invalid(text, format!("component '{}': {}", part, e)))?;
    }

    Ok(SemanticVersion {
        major: numbers[0],
        minor: numbers[1],
        patch: numbers[2],
        revision: if parts.len() == 4 {
            Some(numbers[3])
        } else {
            None
        },
        prerelease,
        build,
    })
}

/// Compare two prerelease labels segment by segment.
fn compare_prerelease(a: &str, b: &str) -> Ordering {
    let mut left = a.split('.');
    let mut right = b.split('.');
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = compare_segment(x, y);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn compare_segment(x: &str, y: &str) -> Ordering {
    let x_numeric = x.chars().all(|c| c.is_ascii_digit());
    let y_numeric = y.chars().all(|c| c.is_ascii_digit());
    match (x_numeric, y_numeric) {
        (true, true) => {
            let x = x.trim_start_matches('0');
            let y = y.trim_start_matches('0');
            // Equal-length digit strings order lexically; longer is larger.
            x.len().cmp(&y.len()).then_with(|| x.cmp(y))
        }
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => x.to_ascii_lowercase().cmp(&y.to_ascii_lowercase()),
    }
}

impl Ord for SemanticVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_key()
            .cmp(&other.numeric_key())
            .then_with(|| match (&self.prerelease, &other.prerelease) {
                (None, None) => Ordering::Equal,
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a), Some(b)) => compare_prerelease(a, b),
            })
    }
}

impl PartialOrd for SemanticVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SemanticVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SemanticVersion {}

impl Hash for SemanticVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.numeric_key().hash(state);
        if let Some(ref pre) = self.prerelease {
            // Hash numeric segments by value so "01" and "1" collide like they compare.
            for segment in pre.split('.') {
                if segment.chars().all(|c| c.is_ascii_digit()) {
                    segment.trim_start_matches('0').hash(state);
                } else {
                    segment.to_ascii_lowercase().hash(state);
                }
            }
        }
    }
}

impl fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_normalized_string())?;
        if let Some(ref build) = self.build {
            write!(f, "+{}", build)?;
        }
        Ok(())
    }
}

impl FromStr for SemanticVersion {
    type Err = NugetError;

    fn from_str(s: &str) -> Result<Self> {
        SemanticVersion::parse(s)
    }
}

impl Serialize for SemanticVersion {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for SemanticVersion {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        SemanticVersion::parse_lenient(&text).map_err(serde::de::Error::custom)
    }
}
