//! OData query URLs for v2 feeds.
//!
//! String arguments are wrapped in single quotes (embedded quotes doubled)
//! and percent-encoded inside the quotes.

use crate::version::SemanticVersion;

/// Base URL with exactly one trailing slash.
pub fn normalize_base(url: &str) -> String {
    format!("{}/", url.trim_end_matches('/'))
}

fn quoted(value: &str) -> String {
    format!("'{}'", urlencoding::encode(&value.replace('\'', "''")))
}

pub fn find_packages_by_id(base: &str, id: &str) -> String {
    format!("{}FindPackagesById()?id={}", base, quoted(id))
}

pub fn package(base: &str, id: &str, version: &SemanticVersion) -> String {
    format!(
        "{}Packages(Id={},Version={})",
        base,
        quoted(id),
        quoted(&version.to_normalized_string())
    )
}

pub fn search(base: &str, term: &str, include_prerelease: bool, skip: usize, take: usize) -> String {
    let filter = if include_prerelease {
        "IsAbsoluteLatestVersion"
    } else {
        "IsLatestVersion"
    };
    format!(
        "{}Search()?$filter={}&$orderby=DownloadCount%20desc&$skip={}&$top={}&searchTerm={}&targetFramework=''&includePrerelease={}",
        base,
        filter,
        skip,
        take,
        quoted(term),
        include_prerelease
    )
}

/// One installed package in a `GetUpdates()` batch.
#[derive(Debug, Clone)]
pub struct UpdateRequest<'a> {
    pub id: &'a str,
    pub version: &'a SemanticVersion,
    /// Range text, empty when unconstrained.
    pub constraint: String,
}

pub fn get_updates(
    base: &str,
    batch: &[UpdateRequest<'_>],
    include_prerelease: bool,
    include_all_versions: bool,
    target_frameworks: &[String],
) -> String {
    let join = |values: Vec<String>| values.join("|");
    let ids = join(batch.iter().map(|r| r.id.to_string()).collect());
    let versions = join(
        batch
            .iter()
            .map(|r| r.version.to_normalized_string())
            .collect(),
    );
    let constraints = join(batch.iter().map(|r| r.constraint.clone()).collect());
    let frameworks = target_frameworks.join("|");

    format!(
        "{}GetUpdates()?packageIds={}&versions={}&includePrerelease={}&includeAllVersions={}&targetFrameworks={}&versionConstraints={}",
        base,
        quoted(&ids),
        quoted(&versions),
        include_prerelease,
        include_all_versions,
        quoted(&frameworks),
        quoted(&constraints)
    )
}

/// Default package content route when an entry carries no `<content src>`.
pub fn package_download(base: &str, id: &str, version: &SemanticVersion) -> String {
    format!(
        "{}package/{}/{}",
        base,
        urlencoding::encode(id),
        urlencoding::encode(&version.to_normalized_string())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://feed.example/api/v2/";

    fn v(text: &str) -> SemanticVersion {
        SemanticVersion::parse(text).unwrap()
    }

    #[test]
    fn test_normalize_base() {
        assert_eq!(normalize_base("https://feed.example/api/v2"), BASE);
        assert_eq!(normalize_base("https://feed.example/api/v2//"), BASE);
    }

    #[test]
    fn test_find_and_package_urls() {
        assert_eq!(
            find_packages_by_id(BASE, "Newtonsoft.Json"),
            "https://feed.example/api/v2/FindPackagesById()?id='Newtonsoft.Json'"
        );
        assert_eq!(
            package(BASE, "Serilog", &v("2.10.0+build.5")),
            "https://feed.example/api/v2/Packages(Id='Serilog',Version='2.10.0')"
        );
        assert_eq!(
            find_packages_by_id(BASE, "O'Brien Tools"),
            "https://feed.example/api/v2/FindPackagesById()?id='O%27%27Brien%20Tools'"
        );
    }

    #[test]
    fn test_search_url() {
        assert_eq!(
            search(BASE, "json", false, 0, 15),
            "https://feed.example/api/v2/Search()?$filter=IsLatestVersion&$orderby=DownloadCount%20desc&$skip=0&$top=15&searchTerm='json'&targetFramework=''&includePrerelease=false"
        );
        assert!(search(BASE, "", true, 30, 15).contains("$filter=IsAbsoluteLatestVersion"));
    }

    #[test]
    fn test_get_updates_url() {
        let a = v("1.0.0");
        let b = v("2.0.0-beta");
        let batch = [
            UpdateRequest {
                id: "A",
                version: &a,
                constraint: String::new(),
            },
            UpdateRequest {
                id: "B",
                version: &b,
                constraint: "[2.0.0, 3.0.0)".into(),
            },
        ];
        let url = get_updates(BASE, &batch, true, false, &["net45".to_string()]);
        assert_eq!(
            url,
            "https://feed.example/api/v2/GetUpdates()?packageIds='A%7CB'&versions='1.0.0%7C2.0.0-beta'&includePrerelease=true&includeAllVersions=false&targetFrameworks='net45'&versionConstraints='%7C%5B2.0.0%2C%203.0.0%29'"
        );
    }
}
