//! Service index discovery and the endpoint cache.

use super::types::ServiceIndex;
use crate::error::{NugetError, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

const PACKAGE_BASE_ADDRESS: &str = "PackageBaseAddress/3.0.0";

/// Registration resource types, most preferred first.
const REGISTRATION_TYPES: &[&str] = &[
    "RegistrationsBaseUrl/3.6.0",
    "RegistrationsBaseUrl/3.4.0",
    "RegistrationsBaseUrl/3.0.0-rc",
    "RegistrationsBaseUrl/3.0.0-beta",
    "RegistrationsBaseUrl",
];

const SEARCH_TYPE_PREFIX: &str = "SearchQueryService";

/// Service endpoints a v3 feed advertises.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Flat container base, with trailing slash.
    pub package_base: String,
    /// Registration base, with trailing slash.
    pub registrations_base: String,
    /// Search services, the primary one first.
    pub search: Vec<String>,
}

fn with_slash(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

/// Extract endpoints from an `index.json` body fetched from `url`.
pub fn parse_service_index(text: &str, url: &str) -> Result<Endpoints> {
    let index: ServiceIndex =
        serde_json::from_str(text).map_err(|e| NugetError::malformed(url, e.to_string()))?;

    let find = |wanted: &str| {
        index
            .resources
            .iter()
            .find(|r| r.kind.iter().any(|kind| kind == wanted))
            .map(|r| r.url.clone())
    };

    let package_base = find(PACKAGE_BASE_ADDRESS).ok_or_else(|| {
        NugetError::malformed(url, format!("missing resource '{}'", PACKAGE_BASE_ADDRESS))
    })?;
    let registrations_base = REGISTRATION_TYPES
        .iter()
        .find_map(|kind| find(*kind))
        .ok_or_else(|| NugetError::malformed(url, "missing resource 'RegistrationsBaseUrl'"))?;

    let mut search: Vec<(bool, String)> = Vec::new();
    for resource in &index.resources {
        if !resource.kind.iter().any(|k| k.starts_with(SEARCH_TYPE_PREFIX)) {
            continue;
        }
        if search.iter().any(|(_, existing)| existing == &resource.url) {
            continue;
        }
        let primary = resource
            .comment
            .as_deref()
            .is_some_and(|c| c.contains("(primary)"));
        search.push((primary, resource.url.clone()));
    }
    if search.is_empty() {
        return Err(NugetError::malformed(
            url,
            format!("missing resource '{}'", SEARCH_TYPE_PREFIX),
        ));
    }
    // Stable: primary services first, otherwise index order.
    search.sort_by_key(|(primary, _)| !primary);

    Ok(Endpoints {
        package_base: with_slash(&package_base),
        registrations_base: with_slash(&registrations_base),
        search: search.into_iter().map(|(_, url)| url).collect(),
    })
}

type Slot = Arc<OnceCell<std::result::Result<Endpoints, String>>>;

/// Discovered endpoints per service index URL.
///
/// Each URL is discovered at most once. Callers that arrive while discovery
/// is in flight wait for its outcome. Failures are remembered and returned
/// as [`NugetError::DiscoveryFailed`]; a cancelled discovery leaves the slot
/// empty so the next caller tries again.
#[derive(Debug, Default)]
pub struct EndpointCache {
    slots: Mutex<HashMap<String, Slot>>,
}

impl EndpointCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached endpoints for `index_url`, running `discover` if none are
    /// recorded yet.
    pub async fn get_or_discover<F, Fut>(&self, index_url: &str, discover: F) -> Result<Endpoints>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Endpoints>>,
    {
        let slot = {
            let mut slots = self.slots.lock().await;
            slots.entry(index_url.to_string()).or_default().clone()
        };

        let outcome = slot
            .get_or_try_init(|| async {
                debug!("Discovering service endpoints from {}", index_url);
                match discover().await {
                    Ok(endpoints) => Ok(Ok(endpoints)),
                    Err(NugetError::Cancelled) => Err(NugetError::Cancelled),
                    Err(e) => {
                        warn!("Service discovery failed for {}: {}", index_url, e);
                        Ok(Err(e.to_string()))
                    }
                }
            })
            .await?;

        match outcome {
            Ok(endpoints) => Ok(endpoints.clone()),
            Err(message) => Err(NugetError::DiscoveryFailed {
                url: index_url.to_string(),
                message: message.clone(),
            }),
        }
    }

    /// Whether discovery for `index_url` has produced an outcome.
    pub async fn is_resolved(&self, index_url: &str) -> bool {
        self.slots
            .lock()
            .await
            .get(index_url)
            .is_some_and(|slot| slot.initialized())
    }

    /// Forget every recorded outcome.
    pub async fn clear(&self) {
        self.slots.lock().await.clear();
    }
}
