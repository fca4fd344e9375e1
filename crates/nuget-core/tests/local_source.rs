//! Resolution against a folder of packages.

mod common;

use nuget_core::{
    create_source, BareVersion, CancellationToken, ClientOptions, CombinedPackageSource,
    PackageIdentifier, PackageSource, SemanticVersion, SourceConfig, SourceContext, SourceKind,
    UpdateQuery,
};
use tempfile::TempDir;

fn v(text: &str) -> SemanticVersion {
    SemanticVersion::parse_lenient(text).unwrap()
}

fn newtonsoft_folder() -> TempDir {
    let temp = TempDir::new().expect("Failed to create temp dir");
    for version in ["11.0.0", "12.0.1", "13.0.0"] {
        common::write_nupkg(temp.path(), "Newtonsoft.Json", version);
    }
    temp
}

#[tokio::test]
async fn test_range_resolves_highest_match_in_range() {
    let temp = newtonsoft_folder();
    let context = SourceContext::new(&ClientOptions::default()).unwrap();
    let config = SourceConfig::new("local", temp.path().display().to_string());
    let source = create_source(&config, &context);
    assert_eq!(source.info().kind, SourceKind::Local);

    let wanted =
        PackageIdentifier::parse("Newtonsoft.Json", "[12.0.0,13.0.0)", BareVersion::Minimum)
            .unwrap();
    let found = source
        .find_packages_by_id(&wanted, &CancellationToken::new())
        .await
        .unwrap();
    let versions: Vec<_> = found.iter().map(|p| p.version.clone()).collect();
    assert_eq!(versions, vec![v("12.0.1")]);

    let specific = source
        .get_specific_package(&wanted, &CancellationToken::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(specific.version, v("12.0.1"));
}

#[tokio::test]
async fn test_missing_exact_version_falls_back_to_next_newer() {
    let temp = newtonsoft_folder();
    let context = SourceContext::new(&ClientOptions::default()).unwrap();
    let source = create_source(
        &SourceConfig::new("local", temp.path().display().to_string()),
        &context,
    );

    let found = source
        .get_specific_package(
            &PackageIdentifier::exact("newtonsoft.json", v("12.0.0")),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.version, v("12.0.1"));
}

#[tokio::test]
async fn test_updates_and_download_through_owning_source() {
    let first = newtonsoft_folder();
    let second = TempDir::new().unwrap();
    common::write_nupkg(second.path(), "Serilog", "2.10.0");
    common::write_nupkg(second.path(), "Serilog", "3.0.1");

    let context = SourceContext::new(&ClientOptions::default()).unwrap();
    let configs = vec![
        SourceConfig::new("first", first.path().display().to_string()),
        SourceConfig::new("second", second.path().display().to_string()),
    ];
    let combined = CombinedPackageSource::from_configs("all", &configs, &context);
    let cancel = CancellationToken::new();

    let installed = vec![
        PackageIdentifier::exact("Newtonsoft.Json", v("12.0.1")),
        PackageIdentifier::exact("Serilog", v("2.10.0")).manually_installed(true),
    ];
    let mut updates = combined
        .get_updates(&installed, &UpdateQuery::default(), &cancel)
        .await
        .unwrap();
    updates.sort();
    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].id, "Newtonsoft.Json");
    assert_eq!(updates[0].version, v("13.0.0"));
    assert_eq!(updates[0].versions, vec![v("13.0.0"), v("11.0.0")]);
    assert_eq!(updates[1].version, v("3.0.1"));
    assert!(updates[1].is_manually_installed);

    let owner = combined.owning_source(&updates[1]).unwrap();
    assert_eq!(owner.info().name, "second");

    let dest = TempDir::new().unwrap();
    let target = dest.path().join("serilog.3.0.1.nupkg");
    owner
        .download_to_file(
            &updates[1].identifier(),
            &target,
            updates[1].download_url.as_deref(),
            &cancel,
        )
        .await
        .unwrap();
    let package = nuget_core::nuspec::read_from_package(&target).unwrap();
    assert_eq!(package.version, v("3.0.1"));
}

#[tokio::test]
async fn test_disabled_sources_are_ignored() {
    let temp = newtonsoft_folder();
    let context = SourceContext::new(&ClientOptions::default()).unwrap();
    let mut disabled = SourceConfig::new("off", temp.path().display().to_string());
    disabled.enabled = false;

    let combined = CombinedPackageSource::from_configs("all", &[disabled], &context);
    assert!(combined.sources().is_empty());
    let found = combined
        .search("", true, 10, 0, &CancellationToken::new())
        .await
        .unwrap();
    assert!(found.is_empty());
}
