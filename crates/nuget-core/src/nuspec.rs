//! Package manifest (`.nuspec`) reader.
//!
//! Local sources have no index, so id, version and metadata come from the
//! manifest stored at the root of each `.nupkg` archive.

use crate::error::{NugetError, Result};
use crate::package::{
    FrameworkDependencyGroup, Package, PackageIdentifier, RepositoryInfo, SourceInfo,
};
use crate::version::{BareVersion, SemanticVersion};
use crate::xml::{self, Element};
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Metadata declared in a package manifest.
#[derive(Debug, Clone)]
pub struct Nuspec {
    pub id: String,
    pub version: SemanticVersion,
    pub title: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub release_notes: Option<String>,
    pub authors: Vec<String>,
    pub tags: Vec<String>,
    pub icon_url: Option<String>,
    pub project_url: Option<String>,
    pub license_url: Option<String>,
    pub repository: Option<RepositoryInfo>,
    pub dependency_groups: Vec<FrameworkDependencyGroup>,
}

impl Nuspec {
    pub fn into_package(self, source: SourceInfo) -> Package {
        let mut package = Package::new(self.id, self.version, source);
        package.title = self.title;
        package.description = self.description;
        package.summary = self.summary;
        package.release_notes = self.release_notes;
        package.authors = self.authors;
        package.tags = self.tags;
        package.icon_url = self.icon_url;
        package.project_url = self.project_url;
        package.license_url = self.license_url;
        package.repository = self.repository;
        package.dependency_groups = self.dependency_groups;
        package
    }
}

/// Read the manifest from a `.nupkg` archive. Blocking.
pub fn read_from_package(path: &Path) -> Result<Nuspec> {
    let archive_error = |message: String| NugetError::Archive {
        path: path.to_path_buf(),
        message,
    };

    let file = std::fs::File::open(path).map_err(|e| NugetError::io_with_path(e, path))?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| archive_error(e.to_string()))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| archive_error(e.to_string()))?;
        let name = entry.name().to_string();
        if name.contains('/') || !name.to_ascii_lowercase().ends_with(".nuspec") {
            continue;
        }
        let mut contents = String::new();
        entry
            .read_to_string(&mut contents)
            .map_err(|e| archive_error(format!("{}: {}", name, e)))?;
        return parse(&contents, &path.display().to_string());
    }

    Err(archive_error("no .nuspec at the archive root".to_string()))
}

fn split_list(text: Option<&str>, separator: impl Fn(char) -> bool) -> Vec<String> {
    text.map(|t| {
        t.split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    })
    .unwrap_or_default()
}

fn parse_dependency(element: &Element, origin: &str) -> Option<PackageIdentifier> {
    let id = element.attr("id").map(str::trim).filter(|s| !s.is_empty())?;
    let range = element.attr("version").unwrap_or("");
    match PackageIdentifier::parse(id, range, BareVersion::Minimum) {
        Ok(identifier) => Some(identifier),
        Err(e) => {
            warn!("Skipping dependency '{}' in {}: {}", id, origin, e);
            None
        }
    }
}

fn parse_dependency_groups(metadata: &Element, origin: &str) -> Vec<FrameworkDependencyGroup> {
    let Some(dependencies) = metadata.child("dependencies") else {
        return Vec::new();
    };

    let mut groups = Vec::new();
    let flat: Vec<_> = dependencies
        .children_named("dependency")
        .filter_map(|d| parse_dependency(d, origin))
        .collect();
    if !flat.is_empty() {
        let mut group = FrameworkDependencyGroup::new("");
        group.dependencies = flat;
        groups.push(group);
    }

    for element in dependencies.children_named("group") {
        let mut group = FrameworkDependencyGroup::new(element.attr("targetFramework").unwrap_or(""));
        group.dependencies = element
            .children_named("dependency")
            .filter_map(|d| parse_dependency(d, origin))
            .collect();
        groups.push(group);
    }
    groups
}

/// Parse manifest XML. `origin` names the manifest in errors.
pub fn parse(text: &str, origin: &str) -> Result<Nuspec> {
    let root = xml::parse(text, origin)?;
    let metadata = root
        .child("metadata")
        .ok_or_else(|| NugetError::malformed(origin, "missing <metadata>"))?;

    let id = metadata
        .child_text("id")
        .ok_or_else(|| NugetError::malformed(origin, "missing required field 'id'"))?
        .to_string();
    let version_text = metadata
        .child_text("version")
        .ok_or_else(|| NugetError::malformed(origin, "missing required field 'version'"))?;
    let version = SemanticVersion::parse_lenient(version_text)?;

    let owned = |name: &str| metadata.child_text(name).map(String::from);
    let repository = metadata.child("repository").map(|r| RepositoryInfo {
        kind: r.attr("type").map(String::from),
        url: r.attr("url").map(String::from),
        branch: r.attr("branch").map(String::from),
        commit: r.attr("commit").map(String::from),
    });

    Ok(Nuspec {
        id,
        version,
        title: owned("title"),
        description: owned("description"),
        summary: owned("summary"),
        release_notes: owned("releaseNotes"),
        authors: split_list(metadata.child_text("authors"), |c| c == ','),
        tags: split_list(metadata.child_text("tags"), |c| c == ' ' || c == ','),
        icon_url: owned("iconUrl"),
        project_url: owned("projectUrl"),
        license_url: owned("licenseUrl"),
        repository,
        dependency_groups: parse_dependency_groups(metadata, origin),
    })
}
