//! Version ranges in NuGet interval notation.
//!
//! Supported forms:
//!
//! | text        | meaning               |
//! |-------------|-----------------------|
//! | `1.0`       | `1.0 <= v` (or exact, see [`BareVersion`]) |
//! | `[1.0]`     | `v == 1.0`            |
//! | `[1.0,2.0)` | `1.0 <= v < 2.0`      |
//! | `(1.0,)`    | `1.0 < v`             |
//! | `(,3.0]`    | `v <= 3.0`            |
//! | `1.*`       | `1.0 <= v < 2.0`      |
//! | `*` or ``   | any version (written as `*`) |

use super::SemanticVersion;
use crate::error::{NugetError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// How a bare version string (no brackets) is interpreted as a range.
///
/// The two feed protocols disagree in practice, so every call site states
/// which reading it wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BareVersion {
    /// `1.0` means `[1.0,)`: the ecosystem's dependency convention.
    #[default]
    Minimum,
    /// `1.0` means `[1.0]`.
    Exact,
}

/// An interval of versions. Both bounds absent matches everything.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionRange {
    minimum: Option<SemanticVersion>,
    min_inclusive: bool,
    maximum: Option<SemanticVersion>,
    max_inclusive: bool,
}

fn invalid(input: &str, reason: impl Into<String>) -> NugetError {
    NugetError::InvalidRange {
        input: input.to_string(),
        reason: reason.into(),
    }
}

impl VersionRange {
    /// Build a range, rejecting empty intervals.
    pub fn new(
        minimum: Option<SemanticVersion>,
        min_inclusive: bool,
        maximum: Option<SemanticVersion>,
        max_inclusive: bool,
    ) -> Result<Self> {
        let range = Self {
            minimum,
            min_inclusive,
            maximum,
            max_inclusive,
        };
        range.validate()?;
        Ok(range)
    }

    /// Matches every version.
    pub fn any() -> Self {
        Self {
            minimum: None,
            min_inclusive: false,
            maximum: None,
            max_inclusive: false,
        }
    }

    /// `[v]`
    pub fn exact(version: SemanticVersion) -> Self {
        Self {
            minimum: Some(version.clone()),
            min_inclusive: true,
            maximum: Some(version),
            max_inclusive: true,
        }
    }

    /// `[v,)`
    pub fn at_least(version: SemanticVersion) -> Self {
        Self {
            minimum: Some(version),
            min_inclusive: true,
            maximum: None,
            max_inclusive: false,
        }
    }

    /// `(v,)`
    pub fn greater_than(version: SemanticVersion) -> Self {
        Self {
            minimum: Some(version),
            min_inclusive: false,
            maximum: None,
            max_inclusive: false,
        }
    }

    /// Parse using the ecosystem convention for bare versions.
    pub fn parse(text: &str) -> Result<Self> {
        Self::parse_with(text, BareVersion::Minimum)
    }

    /// Parse with an explicit bare-version policy.
    pub fn parse_with(text: &str, bare: BareVersion) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let first = trimmed.chars().next().unwrap_or(' ');
        if first == '[' || first == '(' {
            return Self::parse_interval(text, trimmed);
        }

        if let Some(prefix) = trimmed.strip_suffix(".*") {
            return Self::parse_floating(text, prefix);
        }

        let version = SemanticVersion::parse_lenient(trimmed)
            .map_err(|e| invalid(text, e.to_string()))?;
        Ok(match bare {
            BareVersion::Minimum => Self::at_least(version),
            BareVersion::Exact => Self::exact(version),
        })
    }

    fn parse_interval(input: &str, trimmed: &str) -> Result<Self> {
        let min_inclusive = trimmed.starts_with('[');
        let max_inclusive = match trimmed.chars().last() {
            Some(']') => true,
            Some(')') => false,
            _ => return Err(invalid(input, "missing closing ']' or ')'")),
        };
        if trimmed.len() < 2 {
            return Err(invalid(input, "empty interval"));
        }
        let inner = &trimmed[1..trimmed.len() - 1];

        let bound = |text: &str| -> Result<Option<SemanticVersion>> {
            let text = text.trim();
            if text.is_empty() {
                Ok(None)
            } else {
                SemanticVersion::parse_lenient(text)
                    .map(Some)
                    .map_err(|e| invalid(input, e.to_string()))
            }
        };

        let parts: Vec<&str> = inner.split(',').collect();
        match parts.as_slice() {
            [single] => {
                if !(min_inclusive && max_inclusive) {
                    return Err(invalid(input, "a single-version range must use '[v]'"));
                }
                let version = bound(single)?.ok_or_else(|| invalid(input, "empty interval"))?;
                Ok(Self::exact(version))
            }
            [low, high] => {
                let minimum = bound(low)?;
                let maximum = bound(high)?;
                if minimum.is_none() && maximum.is_none() {
                    return Err(invalid(input, "at least one bound is required"));
                }
                Self::new(minimum, min_inclusive, maximum, max_inclusive)
                    .map_err(|e| match e {
                        NugetError::InvalidRange { reason, .. } => invalid(input, reason),
                        other => other,
                    })
            }
            _ => Err(invalid(input, "too many ',' separators")),
        }
    }

    fn parse_floating(input: &str, prefix: &str) -> Result<Self> {
        let parts: Vec<&str> = prefix.split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return Err(invalid(input, "floating versions take 1 to 3 fixed components"));
        }
        let mut numbers = Vec::with_capacity(parts.len());
        for part in &parts {
            let number = part
                .parse::<u64>()
                .map_err(|_| invalid(input, format!("non-numeric component '{}'", part)))?;
            numbers.push(number);
        }

        let component = |i: usize| numbers.get(i).copied().unwrap_or(0);
        let bump = |i: usize| {
            component(i)
                .checked_add(1)
                .ok_or_else(|| invalid(input, "floating component is too large"))
        };
        let minimum = SemanticVersion::new(component(0), component(1), component(2));
        let maximum = match numbers.len() {
            1 => SemanticVersion::new(bump(0)?, 0, 0),
            2 => SemanticVersion::new(component(0), bump(1)?, 0),
            _ => SemanticVersion::new(component(0), component(1), bump(2)?),
        };
        Self::new(Some(minimum), true, Some(maximum), false)
    }

    fn validate(&self) -> Result<()> {
        if let (Some(min), Some(max)) = (&self.minimum, &self.maximum) {
            if min > max {
                return Err(invalid(
                    &self.to_string(),
                    format!("minimum {} is greater than maximum {}", min, max),
                ));
            }
            if min == max && !(self.min_inclusive && self.max_inclusive) {
                return Err(invalid(
                    &self.to_string(),
                    "interval with equal bounds must be inclusive on both sides",
                ));
            }
        }
        Ok(())
    }

    pub fn minimum(&self) -> Option<&SemanticVersion> {
        self.minimum.as_ref()
    }

    pub fn maximum(&self) -> Option<&SemanticVersion> {
        self.maximum.as_ref()
    }

    pub fn is_min_inclusive(&self) -> bool {
        self.min_inclusive
    }

    pub fn is_max_inclusive(&self) -> bool {
        self.max_inclusive
    }

    /// Whether this range matches every version.
    pub fn is_unbounded(&self) -> bool {
        self.minimum.is_none() && self.maximum.is_none()
    }

    /// The single version of a degenerate `[v,v]` range.
    pub fn exact_version(&self) -> Option<&SemanticVersion> {
        match (&self.minimum, &self.maximum) {
            (Some(min), Some(max)) if self.min_inclusive && self.max_inclusive && min == max => {
                Some(min)
            }
            _ => None,
        }
    }

    pub fn is_exact(&self) -> bool {
        self.exact_version().is_some()
    }

    /// Whether either bound is a prerelease version.
    pub fn has_prerelease_bound(&self) -> bool {
        self.minimum.as_ref().is_some_and(|v| v.is_prerelease())
            || self.maximum.as_ref().is_some_and(|v| v.is_prerelease())
    }

    /// Membership test honouring bound inclusivity.
    pub fn contains(&self, version: &SemanticVersion) -> bool {
        if let Some(ref min) = self.minimum {
            let ok = if self.min_inclusive {
                version >= min
            } else {
                version > min
            };
            if !ok {
                return false;
            }
        }
        if let Some(ref max) = self.maximum {
            let ok = if self.max_inclusive {
                version <= max
            } else {
                version < max
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Whether any version in `[lower, upper]` could fall inside this range.
    pub fn intersects(&self, lower: &SemanticVersion, upper: &SemanticVersion) -> bool {
        let below_max = match self.maximum {
            Some(ref max) if self.max_inclusive => lower <= max,
            Some(ref max) => lower < max,
            None => true,
        };
        let above_min = match self.minimum {
            Some(ref min) if self.min_inclusive => upper >= min,
            Some(ref min) => upper > min,
            None => true,
        };
        below_max && above_min
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unbounded() {
            return f.write_str("*");
        }
        if let Some(version) = self.exact_version() {
            return write!(f, "[{}]", version);
        }
        let open = if self.min_inclusive && self.minimum.is_some() {
            '['
        } else {
            '('
        };
        let close = if self.max_inclusive && self.maximum.is_some() {
            ']'
        } else {
            ')'
        };
        let min = self
            .minimum
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        let max = self
            .maximum
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_default();
        write!(f, "{}{}, {}{}", open, min, max, close)
    }
}

impl FromStr for VersionRange {
    type Err = NugetError;

    fn from_str(s: &str) -> Result<Self> {
        VersionRange::parse(s)
    }
}

impl Serialize for VersionRange {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionRange {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        VersionRange::parse(&text).map_err(serde::de::Error::custom)
    }
}
