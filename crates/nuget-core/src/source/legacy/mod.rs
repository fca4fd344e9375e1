//! NuGet v2 (OData/Atom) feeds.

mod atom;
mod dependencies;
mod query;

pub use atom::{parse_feed, FeedPage};
pub use dependencies::parse_dependencies;

use super::{build_update, sort_ascending, PackageSource, SourceConfig, SourceContext, UpdateQuery};
use crate::cancel::CancellationToken;
use crate::config::FeedConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{NugetError, Result};
use crate::network::{download_file, HttpClient};
use crate::package::{Package, PackageIdentifier, SourceInfo};
use crate::version::VersionRange;
use async_trait::async_trait;
use query::UpdateRequest;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Package source speaking the v2 OData protocol.
pub struct LegacyFeedSource {
    info: SourceInfo,
    base_url: String,
    http: Arc<HttpClient>,
    credentials: Option<Credentials>,
    store: Arc<CredentialStore>,
}

impl LegacyFeedSource {
    pub fn new(config: &SourceConfig, context: &SourceContext) -> Self {
        Self {
            info: config.info(),
            base_url: query::normalize_base(&config.path),
            http: context.http.clone(),
            credentials: config.credentials.clone(),
            store: context.credentials.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn auth(&self) -> Option<Credentials> {
        self.store
            .resolve(self.credentials.as_ref(), &self.base_url)
            .await
    }

    /// Fetch `url` and every `rel="next"` page after it, stopping once
    /// `limit` entries were collected. Transport errors are returned as-is.
    async fn fetch_all(
        &self,
        url: &str,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let credentials = self.auth().await;
        let mut packages = Vec::new();
        let mut next = Some(url.to_string());
        let mut pages = 0;

        while let Some(page_url) = next.take() {
            let body = self
                .http
                .get_text(&page_url, credentials.as_ref(), cancel)
                .await?;
            let page = parse_feed(&body, &page_url, &self.info)?;
            packages.extend(page.packages);
            pages += 1;

            if limit.is_some_and(|max| packages.len() >= max) {
                break;
            }
            if pages >= FeedConfig::LEGACY_MAX_PAGES {
                if page.next.is_some() {
                    warn!("Stopping after {} pages from {}", pages, url);
                }
                break;
            }
            next = page.next;
        }
        debug!("Fetched {} entries from {}", packages.len(), url);
        Ok(packages)
    }

    /// [`fetch_all`](Self::fetch_all) with transport failures logged and
    /// turned into an empty result.
    async fn fetch_or_empty(
        &self,
        url: &str,
        limit: Option<usize>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        match self.fetch_all(url, limit, cancel).await {
            Ok(packages) => Ok(packages),
            Err(e) if e.is_transport() => {
                warn!("Request to {} failed: {}", url, e);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Per-package fallback for servers without `GetUpdates()`.
    async fn updates_by_find(
        &self,
        installed: &[&PackageIdentifier],
        query: &UpdateQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let mut updates = Vec::new();
        for item in installed {
            let Some(current) = item.exact_version() else {
                continue;
            };
            let newer = PackageIdentifier::with_range(
                item.id.clone(),
                VersionRange::greater_than(current.clone()),
            );
            let candidates = self.find_packages_by_id(&newer, cancel).await?;
            updates.extend(build_update(item, candidates, query));
        }
        Ok(updates)
    }
}

/// Combine several `GetUpdates()` entries for one id into a single package:
/// newest as primary, versions unioned, release notes concatenated newest
/// first with each version's notes prefixed by its version.
pub fn merge_update_entries(mut entries: Vec<Package>) -> Option<Package> {
    entries.sort_by(|a, b| b.version.cmp(&a.version));
    let notes: Vec<String> = entries
        .iter()
        .filter_map(|p| {
            p.release_notes
                .as_deref()
                .map(|n| format!("{}:\n{}", p.version, n.trim()))
        })
        .collect();
    let versions: Vec<_> = entries.iter().flat_map(|p| p.versions.clone()).collect();

    let mut iter = entries.into_iter();
    let mut primary = iter.next()?;
    primary.merge_versions(versions);
    if notes.len() > 1 {
        primary.release_notes = Some(notes.join("\n\n"));
    }
    Some(primary)
}

#[async_trait]
impl PackageSource for LegacyFeedSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn find_packages_by_id(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let url = match identifier.exact_version() {
            Some(version) => query::package(&self.base_url, &identifier.id, version),
            None => query::find_packages_by_id(&self.base_url, &identifier.id),
        };

        let mut packages: Vec<Package> = self
            .fetch_or_empty(&url, None, cancel)
            .await?
            .into_iter()
            .filter(|p| p.id.eq_ignore_ascii_case(&identifier.id))
            .filter(|p| identifier.matches(&p.version))
            .collect();
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
        if take == 0 {
            return Ok(Vec::new());
        }
        let url = query::search(&self.base_url, term.trim(), include_prerelease, skip, take);
        let mut packages = self.fetch_or_empty(&url, Some(take), cancel).await?;
        packages.truncate(take);
        Ok(packages)
    }

    async fn get_updates(
        &self,
        installed: &[PackageIdentifier],
        query: &UpdateQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        let exact: Vec<&PackageIdentifier> = installed
            .iter()
            .filter(|item| item.exact_version().is_some())
            .collect();
        let mut updates = Vec::new();

        for (index, batch) in exact.chunks(FeedConfig::LEGACY_UPDATE_BATCH_SIZE).enumerate() {
            let requests: Vec<UpdateRequest<'_>> = batch
                .iter()
                .filter_map(|item| {
                    item.exact_version().map(|version| UpdateRequest {
                        id: &item.id,
                        version,
                        constraint: query
                            .constraint_for(&item.id)
                            .map(|r| r.to_string())
                            .unwrap_or_default(),
                    })
                })
                .collect();
            let url = query::get_updates(
                &self.base_url,
                &requests,
                query.include_prerelease,
                query.include_all_versions,
                &query.target_frameworks,
            );

            let entries = match self.fetch_all(&url, None, cancel).await {
                Ok(entries) => entries,
                Err(e) if e.is_not_found() => {
                    info!(
                        "{} has no GetUpdates() endpoint; checking packages individually",
                        self.base_url
                    );
                    let remaining = &exact[index * FeedConfig::LEGACY_UPDATE_BATCH_SIZE..];
                    updates.extend(self.updates_by_find(remaining, query, cancel).await?);
                    return Ok(updates);
                }
                Err(e) if e.is_transport() => {
                    warn!("Update check against {} failed: {}", url, e);
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut by_id: HashMap<String, Vec<Package>> = HashMap::new();
            for entry in entries {
                by_id
                    .entry(entry.id.to_ascii_lowercase())
                    .or_default()
                    .push(entry);
            }
            for item in batch {
                let entries = by_id
                    .remove(&item.id.to_ascii_lowercase())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|p| Some(&p.version) != item.exact_version())
                    .collect();
                if let Some(mut merged) = merge_update_entries(entries) {
                    merged.is_manually_installed = item.is_manually_installed;
                    updates.push(merged);
                }
            }
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
        let url = match download_url_hint {
            Some(hint) => hint.to_string(),
            None => {
                let resolved = self
                    .get_specific_package(identifier, cancel)
                    .await?
                    .filter(|p| identifier.matches(&p.version));
                match (resolved, identifier.exact_version()) {
                    (Some(package), _) => package.download_url.unwrap_or_else(|| {
                        query::package_download(&self.base_url, &package.id, &package.version)
                    }),
                    (None, Some(version)) => {
                        query::package_download(&self.base_url, &identifier.id, version)
                    }
                    (None, None) => {
                        return Err(NugetError::DownloadFailed {
                            url: self.base_url.clone(),
                            message: format!("no version of {} found", identifier),
                        })
                    }
                }
            }
        };

        let credentials = self.auth().await;
        download_file(&self.http, &url, credentials.as_ref(), destination, cancel).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::SourceKind;
    use crate::version::SemanticVersion;

    fn v(text: &str) -> SemanticVersion {
        SemanticVersion::parse_lenient(text).unwrap()
    }

    fn entry(version: &str, notes: Option<&str>) -> Package {
        let mut package = Package::new(
            "A",
            v(version),
            SourceInfo::new("v2", "https://feed/", SourceKind::Legacy),
        );
        package.release_notes = notes.map(String::from);
        package
    }

    #[test]
    fn test_merge_update_entries() {
        let merged = merge_update_entries(vec![
            entry("2.0.0", Some("Second")),
            entry("3.0.0", Some("Third")),
            entry("2.5.0", None),
        ])
        .unwrap();
        assert_eq!(merged.version, v("3.0.0"));
        assert_eq!(merged.versions, vec![v("3.0.0"), v("2.5.0"), v("2.0.0")]);
        assert_eq!(
            merged.release_notes.as_deref(),
            Some("3.0.0:\nThird\n\n2.0.0:\nSecond")
        );
    }

    #[test]
    fn test_merge_single_entry_keeps_notes() {
        let merged = merge_update_entries(vec![entry("2.0.0", Some("Only"))]).unwrap();
        assert_eq!(merged.release_notes.as_deref(), Some("Only"));
        assert!(merge_update_entries(Vec::new()).is_none());
    }
}
