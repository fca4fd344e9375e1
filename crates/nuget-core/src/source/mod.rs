//! Package sources.
//!
//! Every source (local folder, v2 feed, v3 feed, or an aggregate of
//! several) answers the same [`PackageSource`] contract. Concrete sources are
//! built from a [`SourceConfig`] by [`create_source`], sharing the HTTP
//! client and caches held in a [`SourceContext`].

pub mod combined;
pub mod legacy;
pub mod local;
pub mod modern;

pub use combined::CombinedPackageSource;
pub use legacy::LegacyFeedSource;
pub use local::LocalPackageSource;
pub use modern::{EndpointCache, ModernFeedSource};

use crate::cancel::CancellationToken;
use crate::config::ClientOptions;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::Result;
use crate::network::HttpClient;
use crate::package::{Package, PackageIdentifier, SourceInfo, SourceKind};
use crate::version::VersionRange;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Feed protocol override for a configured source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolVersion {
    #[serde(rename = "v2", alias = "2")]
    V2,
    #[serde(rename = "v3", alias = "3")]
    V3,
}

fn default_enabled() -> bool {
    true
}

/// A configured package source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub name: String,
    /// Folder path, `file://` URL, or feed URL.
    pub path: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol_version: Option<ProtocolVersion>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            enabled: true,
            credentials: None,
            protocol_version: None,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol_version = Some(protocol);
        self
    }

    pub fn is_remote(&self) -> bool {
        let lower = self.path.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }

    /// Which implementation serves this source. Remote paths use the
    /// explicit protocol when set, else v3 for `.json` service indexes and
    /// v2 for everything else.
    pub fn kind(&self) -> SourceKind {
        if !self.is_remote() {
            return SourceKind::Local;
        }
        match self.protocol_version {
            Some(ProtocolVersion::V3) => SourceKind::Modern,
            Some(ProtocolVersion::V2) => SourceKind::Legacy,
            None => {
                let base = self.path.split(['?', '#']).next().unwrap_or(&self.path);
                if base.to_ascii_lowercase().ends_with(".json") {
                    SourceKind::Modern
                } else {
                    SourceKind::Legacy
                }
            }
        }
    }

    pub fn info(&self) -> SourceInfo {
        SourceInfo::new(self.name.clone(), self.path.clone(), self.kind())
    }
}

/// Options for [`PackageSource::get_updates`].
#[derive(Debug, Clone, Default)]
pub struct UpdateQuery {
    pub include_prerelease: bool,
    pub include_all_versions: bool,
    pub target_frameworks: Vec<String>,
    /// Allowed versions per package id, keyed by lowercase id.
    pub version_constraints: HashMap<String, VersionRange>,
}

impl UpdateQuery {
    pub fn with_constraint(mut self, id: &str, range: VersionRange) -> Self {
        self.version_constraints.insert(id.to_ascii_lowercase(), range);
        self
    }

    pub fn constraint_for(&self, id: &str) -> Option<&VersionRange> {
        self.version_constraints.get(&id.to_ascii_lowercase())
    }

    /// Whether `version` of `id` may be offered as a replacement.
    pub fn allows(&self, id: &str, version: &crate::version::SemanticVersion) -> bool {
        if version.is_prerelease() && !self.include_prerelease {
            return false;
        }
        self.constraint_for(id)
            .map_or(true, |range| range.contains(version))
    }
}

/// Shared state handed to every concrete source.
#[derive(Debug, Clone)]
pub struct SourceContext {
    pub http: Arc<HttpClient>,
    pub endpoints: Arc<EndpointCache>,
    pub credentials: Arc<CredentialStore>,
}

impl SourceContext {
    pub fn new(options: &ClientOptions) -> Result<Self> {
        Ok(Self {
            http: Arc::new(HttpClient::with_options(options)?),
            endpoints: Arc::new(EndpointCache::new()),
            credentials: Arc::new(CredentialStore::new()),
        })
    }

    pub fn with_credential_store(mut self, store: Arc<CredentialStore>) -> Self {
        self.credentials = store;
        self
    }
}

/// The operations every package source supports.
///
/// Read operations degrade transport failures to empty results and log
/// them. Malformed responses and cancellation are returned as errors.
#[async_trait]
pub trait PackageSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    /// All versions matching `identifier`, ascending.
    async fn find_packages_by_id(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>>;

    /// The first match of [`find_packages_by_id`](Self::find_packages_by_id).
    /// An exact request with no exact match returns the lowest newer version.
    async fn get_specific_package(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Option<Package>> {
        let found = self.find_packages_by_id(identifier, cancel).await?;
        if !found.is_empty() {
            return Ok(found.into_iter().next());
        }
        let Some(version) = identifier.exact_version() else {
            return Ok(None);
        };
        let newer = PackageIdentifier::with_range(
            identifier.id.clone(),
            VersionRange::at_least(version.clone()),
        );
        Ok(self
            .find_packages_by_id(&newer, cancel)
            .await?
            .into_iter()
            .next())
    }

    /// One page of search results.
    async fn search(
        &self,
        term: &str,
        include_prerelease: bool,
        take: usize,
        skip: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>>;

    /// Replacement candidates for each installed package: one entry per id
    /// with the highest candidate as primary and every candidate in
    /// `versions`.
    async fn get_updates(
        &self,
        installed: &[PackageIdentifier],
        query: &UpdateQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>>;

    /// Write the package archive to `destination`.
    async fn download_to_file(
        &self,
        identifier: &PackageIdentifier,
        destination: &Path,
        download_url_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Instantiate the concrete source `config` describes.
pub fn create_source(config: &SourceConfig, context: &SourceContext) -> Arc<dyn PackageSource> {
    match config.kind() {
        SourceKind::Modern => Arc::new(ModernFeedSource::new(config, context)),
        SourceKind::Legacy => Arc::new(LegacyFeedSource::new(config, context)),
        _ => Arc::new(LocalPackageSource::new(config)),
    }
}

/// Sort ascending by version (ids compared case-insensitively first).
pub(crate) fn sort_ascending(packages: &mut [Package]) {
    packages.sort();
}

/// Fold the versions of one installed package into an update entry, or
/// `None` when no other allowed version exists.
pub(crate) fn build_update(
    installed: &PackageIdentifier,
    candidates: Vec<Package>,
    query: &UpdateQuery,
) -> Option<Package> {
    let current = installed.exact_version();
    let mut allowed: Vec<Package> = candidates
        .into_iter()
        .filter(|p| p.id.eq_ignore_ascii_case(&installed.id))
        .filter(|p| Some(&p.version) != current)
        .filter(|p| query.allows(&installed.id, &p.version))
        .collect();
    if allowed.is_empty() {
        return None;
    }

    allowed.sort_by(|a, b| b.version.cmp(&a.version));
    let versions: Vec<_> = allowed.iter().map(|p| p.version.clone()).collect();
    let mut primary = allowed.swap_remove(0);
    primary.versions = versions;
    primary.versions.dedup();
    primary.is_manually_installed = installed.is_manually_installed;
    Some(primary)
}

/// Skip/take paging over an already-ordered list.
pub(crate) fn page<T>(items: Vec<T>, skip: usize, take: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(take).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SemanticVersion;

    fn v(text: &str) -> SemanticVersion {
        SemanticVersion::parse_lenient(text).unwrap()
    }

    fn package(id: &str, version: &str) -> Package {
        Package::new(id, v(version), SourceInfo::new("t", "/t", SourceKind::Local))
    }

    #[test]
    fn test_source_kind_selection() {
        assert_eq!(SourceConfig::new("l", "/srv/packages").kind(), SourceKind::Local);
        assert_eq!(SourceConfig::new("l", "file:///srv/packages").kind(), SourceKind::Local);
        assert_eq!(
            SourceConfig::new("n", "https://api.nuget.org/v3/index.json").kind(),
            SourceKind::Modern
        );
        assert_eq!(
            SourceConfig::new("n", "https://www.nuget.org/api/v2/").kind(),
            SourceKind::Legacy
        );
        assert_eq!(
            SourceConfig::new("n", "https://feed.example/nuget")
                .with_protocol(ProtocolVersion::V3)
                .kind(),
            SourceKind::Modern
        );
    }

    #[test]
    fn test_source_config_serde() {
        let config: SourceConfig = serde_json::from_str(
            r#"{"name":"corp","path":"https://feed.example/","protocolVersion":"3",
                "credentials":{"username":"ci","password":"pw"}}"#,
        )
        .unwrap();
        assert!(config.enabled);
        assert_eq!(config.protocol_version, Some(ProtocolVersion::V3));
        assert!(!format!("{:?}", config).contains("pw"));
    }

    #[test]
    fn test_build_update_lists_both_directions() {
        let installed = PackageIdentifier::exact("A", v("2.0.0")).manually_installed(true);
        let candidates = vec![
            package("A", "1.0.0"),
            package("A", "2.0.0"),
            package("A", "3.0.0"),
            package("A", "4.0.0-beta"),
        ];
        let update = build_update(&installed, candidates, &UpdateQuery::default()).unwrap();
        assert_eq!(update.version, v("3.0.0"));
        assert_eq!(update.versions, vec![v("3.0.0"), v("1.0.0")]);
        assert!(update.is_manually_installed);
    }

    #[test]
    fn test_build_update_honours_constraints() {
        let installed = PackageIdentifier::exact("A", v("2.0.0"));
        let query = UpdateQuery {
            include_prerelease: true,
            ..Default::default()
        }
        .with_constraint("a", VersionRange::parse("[2.0.0,3.0.0)").unwrap());
        let candidates = vec![package("A", "2.5.0"), package("A", "3.0.0")];
        let update = build_update(&installed, candidates, &query).unwrap();
        assert_eq!(update.versions, vec![v("2.5.0")]);

        let none = build_update(&installed, vec![package("A", "2.0.0")], &query);
        assert!(none.is_none());
    }

    #[test]
    fn test_page() {
        assert_eq!(page(vec![1, 2, 3, 4], 1, 2), vec![2, 3]);
        assert!(page(vec![1, 2], 5, 2).is_empty());
    }
}
