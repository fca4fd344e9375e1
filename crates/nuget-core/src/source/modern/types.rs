//! JSON documents served by v3 feeds.

use serde::Deserialize;

/// A field that feeds write either as a single value or as an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        match self {
            OneOrMany::One(value) => std::slice::from_ref(value).iter(),
            OneOrMany::Many(values) => values.iter(),
        }
    }
}

/// `index.json`
#[derive(Debug, Deserialize)]
pub struct ServiceIndex {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub resources: Vec<ServiceResource>,
}

#[derive(Debug, Deserialize)]
pub struct ServiceResource {
    #[serde(rename = "@id")]
    pub url: String,
    #[serde(rename = "@type")]
    pub kind: OneOrMany<String>,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    #[serde(default)]
    pub total_hits: u64,
    #[serde(default)]
    pub data: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub authors: Option<OneOrMany<String>>,
    #[serde(default)]
    pub tags: Option<OneOrMany<String>>,
    #[serde(default)]
    pub total_downloads: Option<u64>,
    #[serde(default)]
    pub versions: Vec<SearchVersion>,
}

#[derive(Debug, Deserialize)]
pub struct SearchVersion {
    pub version: String,
    #[serde(default)]
    pub downloads: Option<u64>,
}

/// `{registrationBase}{id}/index.json`
#[derive(Debug, Deserialize)]
pub struct RegistrationIndex {
    #[serde(default)]
    pub items: Vec<RegistrationPage>,
}

/// A page of registration leaves. Servers omit `items` (or send it empty)
/// on large packages; the page must then be fetched from its `@id`.
#[derive(Debug, Deserialize)]
pub struct RegistrationPage {
    #[serde(rename = "@id")]
    pub url: String,
    #[serde(default)]
    pub lower: Option<String>,
    #[serde(default)]
    pub upper: Option<String>,
    #[serde(default)]
    pub items: Option<Vec<RegistrationLeaf>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationLeaf {
    pub catalog_entry: CatalogEntry,
    #[serde(default)]
    pub package_content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub release_notes: Option<String>,
    #[serde(default)]
    pub authors: Option<OneOrMany<String>>,
    #[serde(default)]
    pub tags: Option<OneOrMany<String>>,
    #[serde(default)]
    pub icon_url: Option<String>,
    #[serde(default)]
    pub project_url: Option<String>,
    #[serde(default)]
    pub license_url: Option<String>,
    #[serde(default)]
    pub listed: Option<bool>,
    #[serde(default)]
    pub published: Option<String>,
    #[serde(default)]
    pub dependency_groups: Vec<DependencyGroup>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyGroup {
    #[serde(default)]
    pub target_framework: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Dependency {
    pub id: String,
    #[serde(default)]
    pub range: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_as_string_or_array() {
        let index: ServiceIndex = serde_json::from_str(
            r#"{"version":"3.0.0","resources":[
                {"@id":"https://a/","@type":"PackageBaseAddress/3.0.0"},
                {"@id":"https://b/","@type":["SearchQueryService","SearchQueryService/3.0.0-rc"],"comment":"x"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(index.resources[0].kind.iter().count(), 1);
        assert_eq!(index.resources[1].kind.iter().count(), 2);
        assert_eq!(index.resources[1].comment.as_deref(), Some("x"));
    }

    #[test]
    fn test_authors_string_or_array() {
        let results: SearchResponse = serde_json::from_str(
            r#"{"totalHits":2,"data":[
                {"id":"A","version":"1.0.0","authors":"Someone"},
                {"id":"B","version":"1.0.0","authors":["X","Y"],"versions":[{"version":"1.0.0","downloads":3}]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(results.total_hits, 2);
        let authors: Vec<Vec<String>> = results
            .data
            .into_iter()
            .map(|r| r.authors.map(OneOrMany::into_vec).unwrap_or_default())
            .collect();
        assert_eq!(authors, vec![vec!["Someone".to_string()], vec!["X".into(), "Y".into()]]);
    }

    #[test]
    fn test_registration_page_without_items() {
        let index: RegistrationIndex = serde_json::from_str(
            r#"{"count":1,"items":[{"@id":"https://r/a/page/1.0.0/2.0.0.json","lower":"1.0.0","upper":"2.0.0"}]}"#,
        )
        .unwrap();
        assert!(index.items[0].items.is_none());
    }
}
