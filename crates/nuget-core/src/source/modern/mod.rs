//! NuGet v3 (JSON) feeds.

mod api;
mod discovery;
mod types;

pub use api::ModernApiClient;
pub use discovery::{parse_service_index, EndpointCache, Endpoints};
pub use types::{
    CatalogEntry, Dependency, DependencyGroup, OneOrMany, RegistrationIndex, RegistrationLeaf,
    RegistrationPage, SearchResponse, SearchResult, SearchVersion, ServiceIndex, ServiceResource,
};

use super::{build_update, sort_ascending, PackageSource, SourceConfig, SourceContext, UpdateQuery};
use crate::cancel::CancellationToken;
use crate::error::{NugetError, Result};
use crate::package::{FrameworkDependencyGroup, Package, PackageIdentifier, SourceInfo};
use crate::version::{BareVersion, SemanticVersion, VersionRange};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::warn;

/// Package source speaking the v3 protocol.
pub struct ModernFeedSource {
    info: SourceInfo,
    client: ModernApiClient,
}

impl ModernFeedSource {
    pub fn new(config: &SourceConfig, context: &SourceContext) -> Self {
        Self {
            info: config.info(),
            client: ModernApiClient::new(
                config.path.clone(),
                context.http.clone(),
                context.endpoints.clone(),
                config.credentials.clone(),
                context.credentials.clone(),
            ),
        }
    }

    pub fn client(&self) -> &ModernApiClient {
        &self.client
    }

    fn leaf_to_package(&self, version: SemanticVersion, leaf: RegistrationLeaf) -> Package {
        let entry = leaf.catalog_entry;
        let mut package = Package::new(entry.id.clone(), version, self.info.clone());
        package.title = entry.title;
        package.description = entry.description;
        package.summary = entry.summary;
        package.release_notes = entry.release_notes;
        package.authors = split_authors(entry.authors);
        package.tags = entry.tags.map(OneOrMany::into_vec).unwrap_or_default();
        package.icon_url = entry.icon_url;
        package.project_url = entry.project_url;
        package.license_url = entry.license_url;
        package.published = entry
            .published
            .as_deref()
            .and_then(|p| DateTime::parse_from_rfc3339(p).ok())
            .map(|p| p.with_timezone(&Utc));
        package.dependency_groups = entry
            .dependency_groups
            .into_iter()
            .map(|group| {
                let mut mapped =
                    FrameworkDependencyGroup::new(group.target_framework.unwrap_or_default());
                mapped.dependencies = group
                    .dependencies
                    .into_iter()
                    .filter_map(|dep| {
                        let range = dep.range.unwrap_or_default();
                        PackageIdentifier::parse(dep.id.clone(), &range, BareVersion::Minimum)
                            .map_err(|e| warn!("Skipping dependency '{}' of {}: {}", dep.id, entry.id, e))
                            .ok()
                    })
                    .collect();
                mapped
            })
            .collect();
        package.download_url = leaf.package_content;
        package
    }

    fn search_result_to_package(&self, result: SearchResult, url: &str) -> Result<Package> {
        let malformed = |e: NugetError| NugetError::malformed(url, e.to_string());
        let version = SemanticVersion::parse_lenient(&result.version).map_err(malformed)?;

        let mut package = Package::new(result.id, version, self.info.clone());
        package.title = result.title;
        package.description = result.description;
        package.summary = result.summary;
        package.icon_url = result.icon_url;
        package.project_url = result.project_url;
        package.license_url = result.license_url;
        package.authors = split_authors(result.authors);
        package.tags = result.tags.map(OneOrMany::into_vec).unwrap_or_default();
        package.download_count = result.total_downloads;
        let versions = result
            .versions
            .iter()
            .map(|v| SemanticVersion::parse_lenient(&v.version).map_err(malformed))
            .collect::<Result<Vec<_>>>()?;
        package.merge_versions(versions);
        Ok(package)
    }

    /// Registration lookup with transport failures logged and degraded.
    async fn packages_in_range(
        &self,
        id: &str,
        range: &VersionRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        match self.client.registration_leaves(id, range, cancel).await {
            Ok(leaves) => Ok(leaves
                .into_iter()
                .map(|(version, leaf)| self.leaf_to_package(version, leaf))
                .collect()),
            Err(e) if e.is_transport() => {
                warn!("Registration lookup for {} on '{}' failed: {}", id, self.info.name, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Authors arrive as one comma-separated string or as an array.
fn split_authors(authors: Option<OneOrMany<String>>) -> Vec<String> {
    authors
        .map(OneOrMany::into_vec)
        .unwrap_or_default()
        .iter()
        .flat_map(|a| a.split(','))
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(String::from)
        .collect()
}

#[async_trait]
impl PackageSource for ModernFeedSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn find_packages_by_id(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let range = identifier.version.to_range();
        let mut packages = self
            .packages_in_range(&identifier.id, &range, cancel)
            .await?;
        sort_ascending(&mut packages);
        packages.dedup();
        Ok(packages)
    }

    async fn search(
        &self,
        term: &str,
        include_prerelease: bool,
        take: usize,
        skip: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let response = match self
            .client
            .search(term.trim(), include_prerelease, take, skip, cancel)
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_transport() => {
                warn!("Search on '{}' failed: {}", self.info.name, e);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let origin = self.client.index_url().to_string();
        response
            .data
            .into_iter()
            .map(|result| self.search_result_to_package(result, &origin))
            .collect()
    }

    async fn get_updates(
        &self,
        installed: &[PackageIdentifier],
        query: &UpdateQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let mut updates = Vec::new();
        for item in installed {
            if item.exact_version().is_none() {
                continue;
            }
            let candidates = self
                .packages_in_range(&item.id, &VersionRange::any(), cancel)
                .await?;
            updates.extend(build_update(item, candidates, query));
        }
        Ok(updates)
    }

    async fn download_to_file(
        &self,
        identifier: &PackageIdentifier,
        destination: &Path,
        download_url_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let version = match identifier.exact_version() {
            Some(version) => version.clone(),
            None => self
                .get_specific_package(identifier, cancel)
                .await?
                .map(|p| p.version)
                .ok_or_else(|| NugetError::DownloadFailed {
                    url: self.client.index_url().to_string(),
                    message: format!("no version of {} found", identifier),
                })?,
        };
        self.client
            .download(&identifier.id, &version, destination, download_url_hint, cancel)
            .await
    }
}
