//! Folder of `.nupkg` files.
//!
//! Two layouts are recognised under the root:
//!
//! ```text
//! {root}/{id}.{version}.nupkg
//! {root}/{id}/{version}/{id}.{version}.nupkg   (also all-lowercase)
//! ```
//!
//! There is no index, so enumeration opens every archive and reads its
//! manifest.

use super::{build_update, page, sort_ascending, PackageSource, SourceConfig, UpdateQuery};
use crate::cancel::CancellationToken;
use crate::error::{NugetError, Result};
use crate::network::race;
use crate::nuspec;
use crate::package::{Package, PackageIdentifier, SourceInfo};
use crate::version::SemanticVersion;
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

const MAX_DEPTH: usize = 3;

/// Package source backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalPackageSource {
    info: SourceInfo,
    root: PathBuf,
}

impl LocalPackageSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            info: config.info(),
            root: resolve_root(&config.path),
        }
    }

    /// Paths where an exact version may live, most common layout first.
    fn direct_candidates(&self, id: &str, version: &SemanticVersion) -> Vec<PathBuf> {
        let version = version.to_normalized_string();
        let mut spellings = vec![(id.to_string(), version.clone())];
        let lower = (id.to_ascii_lowercase(), version.to_ascii_lowercase());
        if lower != spellings[0] {
            spellings.push(lower);
        }

        let mut paths = Vec::new();
        for (id, version) in &spellings {
            let file = format!("{}.{}.nupkg", id, version);
            paths.push(self.root.join(&file));
            paths.push(self.root.join(id).join(version).join(&file));
        }
        paths
    }

    /// Every package in the folder whose id matches `pattern`, one entry per
    /// archive.
    async fn enumerate(
        &self,
        pattern: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        cancel.check()?;
        if !self.root.is_dir() {
            warn!(
                "Local source '{}' folder {} does not exist",
                self.info.name,
                self.root.display()
            );
            return Ok(Vec::new());
        }

        let matcher = pattern.map(wildcard_regex).transpose()?;
        let root = self.root.clone();
        let info = self.info.clone();
        let task = tokio::task::spawn_blocking(move || scan(&root, &info, matcher.as_ref()));
        let packages = race(cancel, task)
            .await?
            .map_err(|e| NugetError::Other(format!("Package scan task failed: {}", e)))?;
        debug!(
            "Found {} packages in {}",
            packages.len(),
            self.root.display()
        );
        Ok(packages)
    }

    async fn read_direct(
        &self,
        id: &str,
        version: &SemanticVersion,
        cancel: &CancellationToken,
    ) -> Result<Option<Package>> {
        for path in self.direct_candidates(id, version) {
            if !path.is_file() {
                continue;
            }
            let info = self.info.clone();
            let task = tokio::task::spawn_blocking(move || read_package(&path, &info));
            let found = race(cancel, task)
                .await?
                .map_err(|e| NugetError::Other(format!("Package read task failed: {}", e)))?;
            if let Some(package) = found {
                if package.id.eq_ignore_ascii_case(id) && &package.version == version {
                    return Ok(Some(package));
                }
            }
        }
        Ok(None)
    }
}

fn resolve_root(path: &str) -> PathBuf {
    if path.to_ascii_lowercase().starts_with("file:") {
        if let Ok(url) = url::Url::parse(path) {
            if let Ok(local) = url.to_file_path() {
                return local;
            }
        }
    }
    PathBuf::from(path)
}

/// Case-insensitive, anchored regex for an id pattern where `*` matches any
/// run of characters.
fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    RegexBuilder::new(&format!("^{}$", body))
        .case_insensitive(true)
        .build()
        .map_err(|e| NugetError::Other(format!("Invalid id pattern '{}': {}", pattern, e)))
}

fn is_package_file(path: &Path) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    name.ends_with(".nupkg") && !name.ends_with(".symbols.nupkg")
}

/// Whether the archive name `{id}.{version}.nupkg` could belong to an id
/// accepted by `matcher`. Names with no `{id}.{version}` reading are kept
/// so their manifest decides.
fn name_may_match(path: &Path, matcher: &Regex) -> bool {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let Some(stem) = name
        .len()
        .checked_sub(".nupkg".len())
        .and_then(|end| name.get(..end))
    else {
        return true;
    };

    let mut conventional = false;
    for (dot, _) in stem.match_indices('.') {
        let (id, version) = (&stem[..dot], &stem[dot + 1..]);
        if id.is_empty() || SemanticVersion::parse_lenient(version).is_err() {
            continue;
        }
        if matcher.is_match(id) {
            return true;
        }
        conventional = true;
    }
    !conventional
}

fn read_package(path: &Path, info: &SourceInfo) -> Option<Package> {
    match nuspec::read_from_package(path) {
        Ok(manifest) => {
            let mut package = manifest.into_package(info.clone());
            package.download_url = Some(path.display().to_string());
            Some(package)
        }
        Err(e) => {
            warn!("Skipping unreadable package {}: {}", path.display(), e);
            None
        }
    }
}

fn scan(root: &Path, info: &SourceInfo, matcher: Option<&Regex>) -> Vec<Package> {
    WalkDir::new(root)
        .max_depth(MAX_DEPTH)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Error walking {}: {}", root.display(), e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_package_file(entry.path()))
        .filter(|entry| matcher.map_or(true, |re| name_may_match(entry.path(), re)))
        .filter_map(|entry| read_package(entry.path(), info))
        .filter(|package| matcher.map_or(true, |re| re.is_match(&package.id)))
        .collect()
}

/// One entry per id: the newest version is primary and every other version
/// found is merged into its `versions` list.
pub fn collapse(packages: Vec<Package>) -> Vec<Package> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut collapsed: Vec<Package> = Vec::new();

    for package in packages {
        let key = package.id.to_ascii_lowercase();
        match index.get(&key) {
            None => {
                index.insert(key, collapsed.len());
                collapsed.push(package);
            }
            Some(&i) => {
                let existing = &mut collapsed[i];
                if package.version > existing.version {
                    let older = std::mem::replace(existing, package);
                    existing.merge_versions(older.versions);
                } else {
                    existing.merge_versions(std::iter::once(package.version));
                }
            }
        }
    }
    collapsed
}

fn matches_term(package: &Package, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let term = term.to_lowercase();
    package.id.to_lowercase().contains(&term)
        || package
            .title
            .as_deref()
            .is_some_and(|title| title.to_lowercase().contains(&term))
}

#[async_trait]
impl PackageSource for LocalPackageSource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    async fn find_packages_by_id(
        &self,
        identifier: &PackageIdentifier,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        if let Some(version) = identifier.exact_version() {
            if let Some(package) = self.read_direct(&identifier.id, version, cancel).await? {
                return Ok(vec![package]);
            }
        }

        let mut packages: Vec<Package> = self
            .enumerate(Some(&identifier.id), cancel)
            .await?
            .into_iter()
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
        let term = term.trim();
        let matching: Vec<Package> = self
            .enumerate(None, cancel)
            .await?
            .into_iter()
            .filter(|p| include_prerelease || !p.is_prerelease())
            .filter(|p| matches_term(p, term))
            .collect();

        let mut collapsed = collapse(matching);
        collapsed.sort_by_key(|p| p.id.to_ascii_lowercase());
        Ok(page(collapsed, skip, take))
    }

    async fn get_updates(
        &self,
        installed: &[PackageIdentifier],
        query: &UpdateQuery,
        cancel: &CancellationToken,
    ) -> Result<Vec<Package>> {
        if installed.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_id: HashMap<String, Vec<Package>> = HashMap::new();
        for package in self.enumerate(None, cancel).await? {
            by_id
                .entry(package.id.to_ascii_lowercase())
                .or_default()
                .push(package);
        }

        let updates = installed
            .iter()
            .filter_map(|item| {
                let candidates = by_id
                    .get(&item.id.to_ascii_lowercase())
                    .cloned()
                    .unwrap_or_default();
                build_update(item, candidates, query)
            })
            .collect();
        Ok(updates)
    }

    async fn download_to_file(
        &self,
        identifier: &PackageIdentifier,
        destination: &Path,
        download_url_hint: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let hinted = download_url_hint
            .map(resolve_root)
            .filter(|path| path.is_file());

        let archive = match hinted {
            Some(path) => path,
            None => {
                let package = self
                    .get_specific_package(identifier, cancel)
                    .await?
                    .filter(|p| identifier.matches(&p.version));
                match package.and_then(|p| p.download_url) {
                    Some(path) => PathBuf::from(path),
                    None => {
                        return Err(NugetError::DownloadFailed {
                            url: self.root.display().to_string(),
                            message: format!("package {} not found", identifier),
                        })
                    }
                }
            }
        };

        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| NugetError::io_with_path(e, parent))?;
            }
        }
        race(cancel, tokio::fs::copy(&archive, destination))
            .await?
            .map_err(|e| NugetError::io_with_path(e, &archive))?;
        info!(
            "Copied {} to {}",
            archive.display(),
            destination.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::SourceKind;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_package(path: &Path, id: &str, version: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(format!("{}.nuspec", id), SimpleFileOptions::default())
            .unwrap();
        write!(
            zip,
            "<package><metadata><id>{}</id><version>{}</version><title>{} title</title></metadata></package>",
            id, version, id
        )
        .unwrap();
        zip.finish().unwrap();
    }

    fn source(root: &Path) -> LocalPackageSource {
        LocalPackageSource::new(&SourceConfig::new("local", root.display().to_string()))
    }

    fn v(text: &str) -> SemanticVersion {
        SemanticVersion::parse_lenient(text).unwrap()
    }

    #[test]
    fn test_wildcard_regex() {
        let re = wildcard_regex("Microsoft.*").unwrap();
        assert!(re.is_match("microsoft.csharp"));
        assert!(!re.is_match("System.Microsoft.Foo"));
        let exact = wildcard_regex("A.B").unwrap();
        assert!(exact.is_match("a.b"));
        assert!(!exact.is_match("aXb"));
    }

    #[test]
    fn test_name_prefilter() {
        let re = wildcard_regex("Newtonsoft.Json").unwrap();
        assert!(name_may_match(Path::new("Newtonsoft.Json.12.0.1.nupkg"), &re));
        assert!(name_may_match(Path::new("newtonsoft.json.13.0.1-beta.nupkg"), &re));
        assert!(!name_may_match(Path::new("Newtonsoft.Json.Bson.1.0.2.nupkg"), &re));
        assert!(!name_may_match(Path::new("Serilog.2.10.0.nupkg"), &re));
        assert!(name_may_match(Path::new("renamed-archive.nupkg"), &re));
    }

    #[tokio::test]
    async fn test_unconventional_names_fall_back_to_manifest() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join("A.1.0.0.nupkg"), "A", "1.0.0");
        write_package(&temp.path().join("latest-a.nupkg"), "A", "2.0.0");
        write_package(&temp.path().join("B.1.0.0.nupkg"), "B", "1.0.0");
        std::fs::write(temp.path().join("Broken.1.0.0.nupkg"), b"not a zip").unwrap();

        let found = source(temp.path())
            .find_packages_by_id(&PackageIdentifier::any("a"), &CancellationToken::new())
            .await
            .unwrap();
        let versions: Vec<_> = found.iter().map(|p| p.version.clone()).collect();
        assert_eq!(versions, vec![v("1.0.0"), v("2.0.0")]);
    }

    #[test]
    fn test_collapse_newest_absorbs_versions() {
        let info = SourceInfo::new("l", "/l", SourceKind::Local);
        let packages = vec![
            Package::new("A", v("1.0.0"), info.clone()),
            Package::new("a", v("2.0.0"), info.clone()),
            Package::new("A", v("1.5.0"), info.clone()),
            Package::new("B", v("1.0.0"), info),
        ];
        let collapsed = collapse(packages);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].version, v("2.0.0"));
        assert_eq!(collapsed[0].versions, vec![v("2.0.0"), v("1.5.0"), v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_flattened_and_collapsed_modes() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join("A.1.0.0.nupkg"), "A", "1.0.0");
        write_package(&temp.path().join("A.2.0.0.nupkg"), "A", "2.0.0");
        let local = source(temp.path());
        let cancel = CancellationToken::new();

        let found = local
            .find_packages_by_id(&PackageIdentifier::any("A"), &cancel)
            .await
            .unwrap();
        let versions: Vec<_> = found.iter().map(|p| p.version.to_string()).collect();
        assert_eq!(versions, vec!["1.0.0", "2.0.0"]);

        let results = local.search("A", false, 20, 0, &cancel).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].version, v("2.0.0"));
        assert_eq!(results[0].versions, vec![v("2.0.0"), v("1.0.0")]);
    }

    #[tokio::test]
    async fn test_hierarchical_layout_and_symbols_skipped() {
        let temp = TempDir::new().unwrap();
        write_package(
            &temp.path().join("serilog").join("2.10.0").join("serilog.2.10.0.nupkg"),
            "Serilog",
            "2.10.0",
        );
        write_package(
            &temp.path().join("Serilog.2.10.0.symbols.nupkg"),
            "Serilog",
            "2.10.0",
        );
        let local = source(temp.path());
        let cancel = CancellationToken::new();

        let exact = PackageIdentifier::exact("Serilog", v("2.10.0"));
        let found = local.find_packages_by_id(&exact, &cancel).await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].download_url.as_deref().unwrap().ends_with("serilog.2.10.0.nupkg"));

        let all = local.search("", true, 10, 0, &cancel).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].versions.len(), 1);
    }

    #[tokio::test]
    async fn test_search_term_matches_title_and_pages() {
        let temp = TempDir::new().unwrap();
        write_package(&temp.path().join("Alpha.1.0.0.nupkg"), "Alpha", "1.0.0");
        write_package(&temp.path().join("Beta.1.0.0.nupkg"), "Beta", "1.0.0");
        write_package(&temp.path().join("Beta.2.0.0-rc.1.nupkg"), "Beta", "2.0.0-rc.1");
        let local = source(temp.path());
        let cancel = CancellationToken::new();

        let by_title = local.search("BETA TITLE", false, 10, 0, &cancel).await.unwrap();
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].version, v("1.0.0"));

        let with_pre = local.search("beta", true, 10, 0, &cancel).await.unwrap();
        assert_eq!(with_pre[0].version, v("2.0.0-rc.1"));

        let second_page = local.search("", false, 1, 1, &cancel).await.unwrap();
        assert_eq!(second_page[0].id, "Beta");
        assert!(local.search("", false, 10, 5, &cancel).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_updates_and_download() {
        let temp = TempDir::new().unwrap();
        for version in ["1.0.0", "2.0.0", "3.0.0"] {
            write_package(&temp.path().join(format!("A.{}.nupkg", version)), "A", version);
        }
        let local = source(temp.path());
        let cancel = CancellationToken::new();

        let installed = [PackageIdentifier::exact("a", v("2.0.0")).manually_installed(true)];
        let updates = local
            .get_updates(&installed, &UpdateQuery::default(), &cancel)
            .await
            .unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].version, v("3.0.0"));
        assert_eq!(updates[0].versions, vec![v("3.0.0"), v("1.0.0")]);
        assert!(updates[0].is_manually_installed);

        let out = TempDir::new().unwrap();
        let dest = out.path().join("nested").join("A.3.0.0.nupkg");
        local
            .download_to_file(&PackageIdentifier::exact("A", v("3.0.0")), &dest, None, &cancel)
            .await
            .unwrap();
        assert!(dest.is_file());

        let missing = local
            .download_to_file(
                &PackageIdentifier::exact("A", v("9.0.0")),
                &out.path().join("x.nupkg"),
                None,
                &cancel,
            )
            .await;
        assert!(matches!(missing, Err(NugetError::DownloadFailed { .. })));
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let local = source(Path::new("/definitely/not/here"));
        let found = local
            .find_packages_by_id(&PackageIdentifier::any("A"), &CancellationToken::new())
            .await
            .unwrap();
        assert!(found.is_empty());
    }
}
