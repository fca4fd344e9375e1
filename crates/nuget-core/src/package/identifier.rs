//! Package identifiers: an id plus an exact version or a version range.

use crate::error::Result;
use crate::version::{BareVersion, SemanticVersion, VersionRange};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// The version half of an identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VersionSpec {
    Exact(SemanticVersion),
    Range(VersionRange),
}

impl VersionSpec {
    /// Any version, prefer latest.
    pub fn any() -> Self {
        VersionSpec::Range(VersionRange::any())
    }

    /// Parse range text. A degenerate `[v]` range becomes `Exact`.
    pub fn parse(text: &str, bare: BareVersion) -> Result<Self> {
        Ok(VersionRange::parse_with(text, bare)?.into())
    }

    pub fn exact_version(&self) -> Option<&SemanticVersion> {
        match self {
            VersionSpec::Exact(version) => Some(version),
            VersionSpec::Range(_) => None,
        }
    }

    /// As a range; `Exact(v)` becomes `[v]`.
    pub fn to_range(&self) -> VersionRange {
        match self {
            VersionSpec::Exact(version) => VersionRange::exact(version.clone()),
            VersionSpec::Range(range) => range.clone(),
        }
    }

    pub fn contains(&self, version: &SemanticVersion) -> bool {
        match self {
            VersionSpec::Exact(exact) => exact == version,
            VersionSpec::Range(range) => range.contains(version),
        }
    }

    /// Version used for ordering: the exact version, else the range
    /// minimum, else its maximum. Unbounded ranges have none.
    pub fn comparison_version(&self) -> Option<&SemanticVersion> {
        match self {
            VersionSpec::Exact(version) => Some(version),
            VersionSpec::Range(range) => range.minimum().or_else(|| range.maximum()),
        }
    }

    fn cmp_spec(&self, other: &Self) -> Ordering {
        let by_version = match (self.comparison_version(), other.comparison_version()) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.cmp(b),
        };
        if by_version != Ordering::Equal {
            return by_version;
        }

        match (self, other) {
            (VersionSpec::Exact(_), VersionSpec::Exact(_)) => Ordering::Equal,
            (VersionSpec::Exact(_), VersionSpec::Range(_)) => Ordering::Less,
            (VersionSpec::Range(_), VersionSpec::Exact(_)) => Ordering::Greater,
            (VersionSpec::Range(a), VersionSpec::Range(b)) => cmp_ranges(a, b),
        }
    }
}

fn cmp_ranges(a: &VersionRange, b: &VersionRange) -> Ordering {
    // Absent maximum means unbounded above, so it sorts last.
    let max_order = match (a.maximum(), b.maximum()) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(x), Some(y)) => x.cmp(y),
    };
    a.minimum()
        .cmp(&b.minimum())
        .then_with(|| b.is_min_inclusive().cmp(&a.is_min_inclusive()))
        .then(max_order)
        .then_with(|| a.is_max_inclusive().cmp(&b.is_max_inclusive()))
}

impl From<VersionRange> for VersionSpec {
    fn from(range: VersionRange) -> Self {
        match range.exact_version() {
            Some(version) => VersionSpec::Exact(version.clone()),
            None => VersionSpec::Range(range),
        }
    }
}

impl From<SemanticVersion> for VersionSpec {
    fn from(version: SemanticVersion) -> Self {
        VersionSpec::Exact(version)
    }
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Exact(version) => write!(f, "{}", version),
            VersionSpec::Range(range) => write!(f, "{}", range),
        }
    }
}

impl Serialize for VersionSpec {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for VersionSpec {
    /// Install records store plain versions, so a bare string is exact.
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        VersionSpec::parse(&text, BareVersion::Exact).map_err(serde::de::Error::custom)
    }
}

/// A package id with its requested version.
///
/// Ids compare case-insensitively. `is_manually_installed` is carried along
/// but never takes part in equality or ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageIdentifier {
    pub id: String,
    pub version: VersionSpec,
    #[serde(default)]
    pub is_manually_installed: bool,
}

impl PackageIdentifier {
    pub fn new(id: impl Into<String>, version: VersionSpec) -> Self {
        Self {
            id: id.into(),
            version,
            is_manually_installed: false,
        }
    }

    pub fn exact(id: impl Into<String>, version: SemanticVersion) -> Self {
        Self::new(id, VersionSpec::Exact(version))
    }

    pub fn with_range(id: impl Into<String>, range: VersionRange) -> Self {
        Self::new(id, range.into())
    }

    /// Any version of `id`.
    pub fn any(id: impl Into<String>) -> Self {
        Self::new(id, VersionSpec::any())
    }

    /// Parse `range` with an explicit bare-version policy.
    pub fn parse(id: impl Into<String>, range: &str, bare: BareVersion) -> Result<Self> {
        Ok(Self::new(id, VersionSpec::parse(range, bare)?))
    }

    pub fn manually_installed(mut self, manual: bool) -> Self {
        self.is_manually_installed = manual;
        self
    }

    pub fn has_version_range(&self) -> bool {
        !matches!(self.version, VersionSpec::Exact(_))
    }

    pub fn exact_version(&self) -> Option<&SemanticVersion> {
        self.version.exact_version()
    }

    pub fn is_prerelease(&self) -> bool {
        match self.version {
            VersionSpec::Exact(ref version) => version.is_prerelease(),
            VersionSpec::Range(ref range) => range.has_prerelease_bound(),
        }
    }

    /// Whether `version` satisfies this identifier's version spec.
    pub fn matches(&self, version: &SemanticVersion) -> bool {
        self.version.contains(version)
    }

    /// Same id, ignoring case.
    pub fn is_same_package(&self, other: &PackageIdentifier) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
    }

    /// Same id and the same exact version.
    pub fn is_same_install(&self, other: &PackageIdentifier) -> bool {
        self.is_same_package(other)
            && matches!(
                (self.exact_version(), other.exact_version()),
                (Some(a), Some(b)) if a == b
            )
    }
}

impl PartialEq for PackageIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_package(other) && self.version == other.version
    }
}

impl Eq for PackageIdentifier {}

impl Hash for PackageIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.to_ascii_lowercase().hash(state);
        self.version.hash(state);
    }
}

impl Ord for PackageIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .to_ascii_lowercase()
            .cmp(&other.id.to_ascii_lowercase())
            .then_with(|| self.version.cmp_spec(&other.version))
    }
}

impl PartialOrd for PackageIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PackageIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}
