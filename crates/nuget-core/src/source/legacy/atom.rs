//! Atom + OData response parsing.

use super::dependencies::parse_dependencies;
use crate::error::{NugetError, Result};
use crate::package::{Package, SourceInfo};
use crate::version::SemanticVersion;
use crate::xml::{self, Element};
use chrono::{DateTime, NaiveDateTime, Utc};

/// Entries of one response page plus the continuation link, if any.
#[derive(Debug)]
pub struct FeedPage {
    pub packages: Vec<Package>,
    pub next: Option<String>,
}

/// Parse a `<feed>` (or a single `<entry>`) returned from `url`.
pub fn parse_feed(text: &str, url: &str, source: &SourceInfo) -> Result<FeedPage> {
    let root = xml::parse(text, url)?;
    match root.name.as_str() {
        "feed" => {
            let packages = root
                .children_named("entry")
                .map(|entry| parse_entry(entry, url, source))
                .collect::<Result<Vec<_>>>()?;
            let next = root
                .children_named("link")
                .find(|link| link.attr("rel") == Some("next"))
                .and_then(|link| link.attr("href"))
                .map(String::from);
            Ok(FeedPage { packages, next })
        }
        "entry" => Ok(FeedPage {
            packages: vec![parse_entry(&root, url, source)?],
            next: None,
        }),
        other => Err(NugetError::malformed(
            url,
            format!("expected <feed> or <entry>, found <{}>", other),
        )),
    }
}

fn required<'a>(properties: &'a Element, name: &str, url: &str) -> Result<&'a str> {
    properties
        .child_text(name)
        .ok_or_else(|| NugetError::malformed(url, format!("entry is missing required field '{}'", name)))
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn parse_entry(entry: &Element, url: &str, source: &SourceInfo) -> Result<Package> {
    let properties = entry
        .child("properties")
        .ok_or_else(|| NugetError::malformed(url, "entry is missing <m:properties>"))?;

    let id = required(properties, "Id", url)?;
    let version_text = required(properties, "Version", url)?;
    let version = SemanticVersion::parse_lenient(version_text)
        .map_err(|e| NugetError::malformed(url, e.to_string()))?;

    let text = |name: &str| properties.child_text(name).map(String::from);
    let mut package = Package::new(id, version, source.clone());
    package.title = text("Title");
    package.description = text("Description");
    package.summary = text("Summary");
    package.release_notes = text("ReleaseNotes");
    package.icon_url = text("IconUrl");
    package.project_url = text("ProjectUrl");
    package.license_url = text("LicenseUrl");
    package.authors = properties
        .child_text("Authors")
        .map(|a| a.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    package.tags = properties
        .child_text("Tags")
        .map(|t| t.split_whitespace().map(String::from).collect())
        .unwrap_or_default();
    package.download_count = properties
        .child_text("DownloadCount")
        .and_then(|c| c.parse::<u64>().ok());
    package.published = properties.child_text("Published").and_then(parse_timestamp);
    package.dependency_groups = properties
        .child_text("Dependencies")
        .map(parse_dependencies)
        .unwrap_or_default();
    package.download_url = entry
        .child("content")
        .and_then(|content| content.attr("src"))
        .map(String::from);
    Ok(package)
}
