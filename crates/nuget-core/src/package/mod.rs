//! Package value types shared by every source.

mod identifier;

pub use identifier::{PackageIdentifier, VersionSpec};

use crate::version::SemanticVersion;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Which concrete implementation produced a package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Local,
    Legacy,
    Modern,
    Combined,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::Local => "local",
            SourceKind::Legacy => "v2",
            SourceKind::Modern => "v3",
            SourceKind::Combined => "combined",
        };
        f.write_str(name)
    }
}

/// The owning source of a package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub name: String,
    pub location: String,
    pub kind: SourceKind,
}

impl SourceInfo {
    pub fn new(name: impl Into<String>, location: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            name: name.into(),
            location: location.into(),
            kind,
        }
    }
}

/// Source control metadata declared in a package manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInfo {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

/// Dependencies declared for one target framework. An empty moniker
/// applies to every framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkDependencyGroup {
    pub target_framework: String,
    pub dependencies: Vec<PackageIdentifier>,
}

impl FrameworkDependencyGroup {
    pub fn new(target_framework: impl Into<String>) -> Self {
        Self {
            target_framework: target_framework.into(),
            dependencies: Vec::new(),
        }
    }

    pub fn applies_to_all(&self) -> bool {
        self.target_framework.is_empty()
    }
}

/// One version of a package as reported by a source.
///
/// `versions` holds every version the source knows of, newest first.
/// Equality and ordering use the id (case-insensitive) and `version` only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Package {
    pub id: String,
    pub version: SemanticVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository: Option<RepositoryInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
    pub versions: Vec<SemanticVersion>,
    pub dependency_groups: Vec<FrameworkDependencyGroup>,
    pub is_manually_installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub source: SourceInfo,
}

impl Package {
    /// A package with only identity filled in. `versions` starts as
    /// `[version]`.
    pub fn new(id: impl Into<String>, version: SemanticVersion, source: SourceInfo) -> Self {
        Self {
            id: id.into(),
            versions: vec![version.clone()],
            version,
            title: None,
            description: None,
            summary: None,
            release_notes: None,
            authors: Vec::new(),
            tags: Vec::new(),
            icon_url: None,
            project_url: None,
            license_url: None,
            repository: None,
            download_count: None,
            published: None,
            dependency_groups: Vec::new(),
            is_manually_installed: false,
            download_url: None,
            source,
        }
    }

    /// Exact identifier for this package, carrying the manual flag.
    pub fn identifier(&self) -> PackageIdentifier {
        PackageIdentifier::exact(self.id.clone(), self.version.clone())
            .manually_installed(self.is_manually_installed)
    }

    pub fn is_prerelease(&self) -> bool {
        self.version.is_prerelease()
    }

    pub fn is_same_package(&self, other: &Package) -> bool {
        self.id.eq_ignore_ascii_case(&other.id)
    }

    /// Dependency group for `framework`, falling back to the group that
    /// applies to all frameworks.
    pub fn dependencies_for(&self, framework: &str) -> Option<&FrameworkDependencyGroup> {
        self.dependency_groups
            .iter()
            .find(|group| {
                !group.applies_to_all() && group.target_framework.eq_ignore_ascii_case(framework)
            })
            .or_else(|| self.dependency_groups.iter().find(|g| g.applies_to_all()))
    }

    /// Union `others` into `versions`, keeping newest-first order.
    pub fn merge_versions<I>(&mut self, others: I)
    where
        I: IntoIterator<Item = SemanticVersion>,
    {
        self.versions.extend(others);
        self.versions.sort_by(|a, b| b.cmp(a));
        self.versions.dedup();
    }
}

impl PartialEq for Package {
    fn eq(&self, other: &Self) -> bool {
        self.is_same_package(other) && self.version == other.version
    }
}

impl Eq for Package {}

impl Ord for Package {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id
            .to_ascii_lowercase()
            .cmp(&other.id.to_ascii_lowercase())
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for Package {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.version)
    }
}

/// Drop later duplicates by (id, version), keeping first-seen order.
pub fn dedupe_packages(packages: Vec<Package>) -> Vec<Package> {
    let mut seen = std::collections::HashSet::new();
    packages
        .into_iter()
        .filter(|p| seen.insert((p.id.to_ascii_lowercase(), p.version.clone())))
        .collect()
}
