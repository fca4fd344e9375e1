//! Aggregate of several package sources.

use super::{create_source, sort_ascending, PackageSource, SourceConfig, SourceContext, UpdateQuery};
use crate::cancel::CancellationToken;
use crate::error::{NugetError, Result};
use crate::package::{dedupe_packages, Package, PackageIdentifier, SourceInfo, SourceKind};
use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Answers every query from all of its sources.
///
/// With a single source every call is passed straight through. With several,
/// results are concatenated in source order and deduplicated by id and
/// version. A source that fails is logged and skipped; the call only fails
/// when every source did.
pub struct CombinedPackageSource {
    info: SourceInfo,
    sources: Vec<Arc<dyn PackageSource>>,
}

impl CombinedPackageSource {
    pub fn new(name: impl Into<String>, sources: Vec<Arc<dyn PackageSource>>) -> Self {
        let location = sources
            .iter()
            .map(|s| s.info().location.as_str())
            .collect::<Vec<_>>()
            .join(";");
        Self {
            info: SourceInfo::new(name, location, SourceKind::Combined),
            sources,
        }
    }

    /// Build one concrete source per enabled entry of `configs`.
    pub fn from_configs(name: impl Into<String>, configs: &[SourceConfig], context: &SourceContext) -> Self {
        let sources = configs
            .iter()
            .filter(|config| config.enabled)
            .map(|config| create_source(config, context))
            .collect();
        Self::new(name, sources)
    }

    pub fn sources(&self) -> &[Arc<dyn PackageSource>] {
        &self.sources
    }

    /// The concrete source that reported `package`.
    pub fn owning_source(&self, package: &Package) -> Option<Arc<dyn PackageSource>> {
        self.sources
            .iter()
            .find(|source| {
                let info = source.info();
                info.name == package.source.name && info.location == package.source.location
            })
            .cloned()
    }

    fn single(&self) -> Option<&Arc<dyn PackageSource>> {
        match self.sources.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }

    fn warn_if_empty(&self, operation: &str) -> bool {
        if self.sources.is_empty() {
            warn!("{} on '{}': no enabled package sources", operation, self.info.name);
            return true;
        }
        false
    }
}

/// Merge per-source outcomes, keeping source order.
fn merge_outcomes(
    operation: &str,
    outcomes: Vec<(&SourceInfo, Result<Vec<Package>>)>,
) -> Result<Vec<Package>> {
    let total = outcomes.len();
    let mut packages = Vec::new();
    let mut first_error = None;
    let mut failed = 0;

    for (info, outcome) in outcomes {
        match outcome {
            Ok(found) => packages.extend(found),
            Err(NugetError::Cancelled) => return Err(NugetError::Cancelled),
            Err(e) => {
                warn!("{} on source '{}' failed: {}", operation, info.name, e);
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if failed == total => Err(e),
        _ => Ok(dedupe_packages(packages)),
    }
}

/// An exact request is satisfied by its own version only; a range request
/// by any version inside the range.
fn is_direct_hit(identifier: &PackageIdentifier, package: &Package) -> bool {
    match identifier.exact_version() {
        Some(version) => &package.version == version,
        None => identifier.matches(&package.version),
    }
}

#[async_trait]
impl PackageSource for CombinedPackageSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn find_packages_by_id(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        if let Some(only) = self.single() {
            return only.find_packages_by_id(identifier, cancel).await;
        }
        if self.warn_if_empty("find_packages_by_id") {
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            cancel.check()?;
            outcomes.push((source.info(), source.find_packages_by_id(identifier, cancel).await));
        }
        let mut packages = merge_outcomes("find_packages_by_id", outcomes)?;
        sort_ascending(&mut packages);
        Ok(packages)
    }

    async fn get_specific_package(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Option<Package>> {
        if let Some(only) = self.single() {
            return only.get_specific_package(identifier, cancel).await;
        }
        if self.warn_if_empty("get_specific_package") {
            return Ok(None);
        }

        let mut best: Option<Package> = None;
        let mut first_error = None;
        let mut failed = 0;

        for source in &self.sources {
            cancel.check()?;
            match source.get_specific_package(identifier, cancel).await {
                Ok(Some(package)) => {
                    if is_direct_hit(identifier, &package) {
                        debug!("{} resolved from '{}'", package, source.info().name);
                        return Ok(Some(package));
                    }
                    let better = best
                        .as_ref()
                        .map_or(true, |current| package.version > current.version);
                    if better {
                        best = Some(package);
                    }
                }
                Ok(None) => {}
                Err(NugetError::Cancelled) => return Err(NugetError::Cancelled),
                Err(e) => {
                    warn!(
                        "get_specific_package on source '{}' failed: {}",
                        source.info().name,
                        e
                    );
                    failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if failed == self.sources.len() => Err(e),
            _ => Ok(best),
        }
    }

    async fn search(
        &self,
        term: &str,
        include_prerelease: bool,
        take: usize,
        skip: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        if let Some(only) = self.single() {
            return only.search(term, include_prerelease, take, skip, cancel).await;
        }
        if self.warn_if_empty("search") {
            return Ok(Vec::new());
        }

        let results = join_all(
            self.sources
                .iter()
                .map(|source| source.search(term, include_prerelease, take, skip, cancel)),
        )
        .await;
        let outcomes = self.sources.iter().map(|s| s.info()).zip(results).collect();
        merge_outcomes("search", outcomes)
    }

    async fn get_updates(
        &self,
        installed: &[PackageIdentifier],
        query: &UpdateQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        if let Some(only) = self.single() {
            return only.get_updates(installed, query, cancel).await;
        }
        if self.warn_if_empty("get_updates") {
            return Ok(Vec::new());
        }

        let mut outcomes = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            cancel.check()?;
            outcomes.push((source.info(), source.get_updates(installed, query, cancel).await));
        }
        merge_outcomes("get_updates", outcomes)
    }

    async fn download_to_file(
        &self,
        identifier: &PackageIdentifier,
        destination: &Path,
        download_url_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if let Some(only) = self.single() {
            return only
                .download_to_file(identifier, destination, download_url_hint, cancel)
                .await;
        }
        Err(NugetError::Unsupported {
            operation: "download_to_file",
            source_name: self.info.name.clone(),
        })
    }
}
