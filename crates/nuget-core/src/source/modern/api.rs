//! HTTP calls against a v3 feed.

use super::discovery::{parse_service_index, EndpointCache, Endpoints};
use super::types::{RegistrationIndex, RegistrationLeaf, RegistrationPage, SearchResponse};
use crate::cancel::CancellationToken;
use crate::config::FeedConfig;
use crate::credentials::{CredentialStore, Credentials};
use crate::error::{NugetError, Result};
use crate::network::{download_file, HttpClient};
use crate::version::{SemanticVersion, VersionRange};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Client for one v3 service index.
pub struct ModernApiClient {
    index_url: String,
    http: Arc<HttpClient>,
    cache: Arc<EndpointCache>,
    credentials: Option<Credentials>,
    store: Arc<CredentialStore>,
}

impl ModernApiClient {
    pub fn new(
        index_url: impl Into<String>,
        http: Arc<HttpClient>,
        cache: Arc<EndpointCache>,
        credentials: Option<Credentials>,
        store: Arc<CredentialStore>,
    ) -> Self {
        Self {
            index_url: index_url.into(),
            http,
            cache,
            credentials,
            store,
        }
    }

    pub fn index_url(&self) -> &str {
        &self.index_url
    }

    async fn auth(&self) -> Option<Credentials> {
        self.store
            .resolve(self.credentials.as_ref(), &self.index_url)
            .await
    }

    /// Endpoints of this feed, discovered once per index URL.
    pub async fn endpoints(&self, cancel: &CancellationToken) -> Result<Endpoints> {
        self.cache
            .get_or_discover(&self.index_url, || async {
                let credentials = self.auth().await;
                let body = self
                    .http
                    .get_text(&self.index_url, credentials.as_ref(), cancel)
                    .await?;
                parse_service_index(&body, &self.index_url)
            })
            .await
    }

    /// Query the search services in order until one answers.
    pub async fn search(
        &self,
        term: &str,
        include_prerelease: bool,
        take: usize,
        skip: usize,
        cancel: &CancellationToken,
    ) -> Result<SearchResponse> {
        let endpoints = self.endpoints(cancel).await?;
        let credentials = self.auth().await;
        let mut last_error = None;

        for service in &endpoints.search {
            let url = format!(
                "{}?semVerLevel={}&q={}&skip={}&take={}&prerelease={}",
                service,
                FeedConfig::SEMVER_LEVEL,
                urlencoding::encode(term),
                skip,
                take,
                include_prerelease
            );
            match self
                .http
                .get_json::<SearchResponse>(&url, credentials.as_ref(), cancel)
                .await
            {
                Ok(response) => return Ok(response),
                Err(e) if e.is_transport() => {
                    warn!("Search service {} failed: {}", service, e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            NugetError::malformed(&self.index_url, "no search service available")
        }))
    }

    /// Every listed registration leaf of `id` whose version lies in `range`,
    /// in page order. A package the feed does not know yields no leaves.
    pub async fn registration_leaves(
        &self,
        id: &str,
        range: &VersionRange,
        cancel: &CancellationToken,
    ) -> Result<Vec<(SemanticVersion, RegistrationLeaf)>> {
        let endpoints = self.endpoints(cancel).await?;
        let credentials = self.auth().await;
        let url = format!(
            "{}{}/index.json",
            endpoints.registrations_base,
            id.to_lowercase()
        );

        let index = match self
            .http
            .get_json::<RegistrationIndex>(&url, credentials.as_ref(), cancel)
            .await
        {
            Ok(index) => index,
            Err(e) if e.is_not_found() => {
                debug!("{} is not registered at {}", id, url);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut leaves = Vec::new();
        for mut page in index.items {
            // An empty inline page is a stub like a missing one.
            let items = match page.items.take().filter(|items| !items.is_empty()) {
                Some(items) => items,
                None => {
                    if !page_intersects(&page, range) {
                        continue;
                    }
                    let fetched: RegistrationPage = self
                        .http
                        .get_json(&page.url, credentials.as_ref(), cancel)
                        .await?;
                    fetched.items.ok_or_else(|| {
                        NugetError::malformed(&page.url, "registration page is missing 'items'")
                    })?
                }
            };

            for leaf in items {
                if leaf.catalog_entry.listed == Some(false) {
                    continue;
                }
                let version = SemanticVersion::parse_lenient(&leaf.catalog_entry.version)
                    .map_err(|e| NugetError::malformed(&url, e.to_string()))?;
                if range.contains(&version) {
                    leaves.push((version, leaf));
                }
            }
        }
        Ok(leaves)
    }

    /// Flat-container URL of a package archive.
    pub fn content_url(endpoints: &Endpoints, id: &str, version: &SemanticVersion) -> String {
        let id = id.to_lowercase();
        let version = version.to_normalized_string().to_lowercase();
        format!(
            "{}{}/{}/{}.{}.nupkg",
            endpoints.package_base, id, version, id, version
        )
    }

    /// Stream a package archive to `destination`.
    pub async fn download(
        &self,
        id: &str,
        version: &SemanticVersion,
        destination: &Path,
        url_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let url = match url_hint {
            Some(hint) => hint.to_string(),
            None => Self::content_url(&self.endpoints(cancel).await?, id, version),
        };
        let credentials = self.auth().await;
        download_file(&self.http, &url, credentials.as_ref(), destination, cancel).await?;
        Ok(())
    }
}

/// Whether a page's `[lower, upper]` bounds can hold a version in `range`.
/// Pages with missing or unreadable bounds are always fetched.
fn page_intersects(page: &RegistrationPage, range: &VersionRange) -> bool {
    let bound = |text: &Option<String>| {
        text.as_deref()
            .and_then(|t| SemanticVersion::parse_lenient(t).ok())
    };
    match (bound(&page.lower), bound(&page.upper)) {
        (Some(lower), Some(upper)) => range.intersects(&lower, &upper),
        _ => true,
    }
}
