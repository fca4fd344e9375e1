//! NuGet CLI - query and download packages from configured sources.
//!
//! Sources come from a JSON sources file (see `nuget_core::SourcesFile`) or
//! from repeated `--source` flags, and are queried together.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use nuget_core::{
    BareVersion, CancellationToken, CombinedPackageSource, Package, PackageIdentifier,
    PackageSource, SemanticVersion, SourceConfig, SourceContext, SourcesFile, UpdateQuery,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "nuget")]
#[command(about = "Query and download NuGet packages")]
struct Args {
    /// Sources file (defaults to <config dir>/nuget-client/sources.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Package source path or feed URL; replaces the sources file when given
    #[arg(short, long = "source", global = true)]
    sources: Vec<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search all sources
    Search {
        #[arg(default_value = "")]
        term: String,
        #[arg(long)]
        prerelease: bool,
        #[arg(long, default_value_t = nuget_core::FeedConfig::DEFAULT_SEARCH_TAKE)]
        take: usize,
        #[arg(long, default_value_t = 0)]
        skip: usize,
    },
    /// List the versions of a package
    Find {
        id: String,
        /// Version range, e.g. "[12.0.0,13.0.0)"; a bare version means "at least"
        #[arg(long = "version", default_value = "")]
        range: String,
    },
    /// Resolve the best single version of a package; without a range, the
    /// latest stable version (or latest prerelease when there is no stable one)
    Resolve {
        id: String,
        #[arg(default_value = "")]
        range: String,
    },
    /// Check installed packages (`Id@Version`) for other versions
    Updates {
        #[arg(required = true)]
        installed: Vec<String>,
        #[arg(long)]
        prerelease: bool,
        #[arg(long)]
        all_versions: bool,
        /// Target framework monikers, e.g. net8.0
        #[arg(long = "framework")]
        frameworks: Vec<String>,
    },
    /// Download a package archive; without a version, the latest one
    Download {
        id: String,
        #[arg(default_value = "")]
        range: String,
        /// Destination file or directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let file = load_sources(&args)?;
    let context = SourceContext::new(&file.client)?;
    let combined = CombinedPackageSource::from_configs("all", &file.sources, &context);
    debug!("Querying {} source(s)", combined.sources().len());

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            ctrl_c_token.cancel();
        }
    });

    run(args.command, &combined, args.json, &cancel).await
}

/// Sources from `--source` flags, else from the sources file.
fn load_sources(args: &Args) -> Result<SourcesFile> {
    if !args.sources.is_empty() {
        let sources = args
            .sources
            .iter()
            .enumerate()
            .map(|(index, path)| SourceConfig::new(format!("source-{}", index + 1), path.clone()))
            .collect();
        return Ok(SourcesFile {
            sources,
            ..Default::default()
        });
    }

    let path = match args.config {
        Some(ref path) => path.clone(),
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("No configuration directory on this platform; use --config"))?
            .join("nuget-client")
            .join("sources.json"),
    };
    if !path.exists() {
        bail!(
            "No sources configured: {} does not exist and no --source was given",
            path.display()
        );
    }
    SourcesFile::load(&path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn run(
    command: Command,
    source: &CombinedPackageSource,
    json: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Search {
            term,
            prerelease,
            take,
            skip,
        } => {
            let results = source.search(&term, prerelease, take, skip, cancel).await?;
            print_packages(&results, json)
        }
        Command::Find { id, range } => {
            let wanted = PackageIdentifier::parse(id, &range, BareVersion::Minimum)?;
            let found = source.find_packages_by_id(&wanted, cancel).await?;
            print_packages(&found, json)
        }
        Command::Resolve { id, range } => {
            let wanted = PackageIdentifier::parse(id, &range, BareVersion::Minimum)?;
            match resolve(source, &wanted, cancel).await? {
                Some(package) => print_packages(std::slice::from_ref(&package), json),
                None => bail!("No version of {} found", wanted),
            }
        }
        Command::Updates {
            installed,
            prerelease,
            all_versions,
            frameworks,
        } => {
            let installed = installed
                .iter()
                .map(|spec| parse_installed(spec))
                .collect::<Result<Vec<_>>>()?;
            let query = UpdateQuery {
                include_prerelease: prerelease,
                include_all_versions: all_versions,
                target_frameworks: frameworks,
                ..Default::default()
            };
            let updates = source.get_updates(&installed, &query, cancel).await?;
            print_packages(&updates, json)
        }
        Command::Download { id, range, output } => {
            let wanted = PackageIdentifier::parse(id, &range, BareVersion::Exact)?;
            let package = resolve(source, &wanted, cancel)
                .await?
                .ok_or_else(|| anyhow!("No version of {} found", wanted))?;

            let owner: Arc<dyn PackageSource> = source
                .owning_source(&package)
                .ok_or_else(|| anyhow!("No configured source owns {}", package))?;
            let destination = destination_for(&output, &package);
            info!("Downloading {} from '{}'", package, owner.info().name);
            owner
                .download_to_file(
                    &package.identifier(),
                    &destination,
                    package.download_url.as_deref(),
                    cancel,
                )
                .await?;
            println!("{}", destination.display());
            Ok(())
        }
    }
}

/// The package a user means by `wanted`: the latest stable version when no
/// range was given, else the source's own resolution.
async fn resolve(
    source: &CombinedPackageSource,
    wanted: &PackageIdentifier,
    cancel: &CancellationToken,
) -> Result<Option<Package>> {
    if !wanted.version.to_range().is_unbounded() {
        return Ok(source.get_specific_package(wanted, cancel).await?);
    }
    let found = source.find_packages_by_id(wanted, cancel).await?;
    Ok(latest(found))
}

/// Highest stable version, falling back to the highest prerelease.
fn latest(packages: Vec<Package>) -> Option<Package> {
    let (stable, prerelease): (Vec<_>, Vec<_>) =
        packages.into_iter().partition(|p| !p.is_prerelease());
    let pick = |list: Vec<Package>| list.into_iter().max_by(|a, b| a.version.cmp(&b.version));
    pick(stable).or_else(|| pick(prerelease))
}

/// Parse `Id@Version` into an exact identifier.
fn parse_installed(spec: &str) -> Result<PackageIdentifier> {
    let (id, version) = spec
        .split_once('@')
        .ok_or_else(|| anyhow!("Expected Id@Version, got '{}'", spec))?;
    if id.trim().is_empty() {
        bail!("Missing package id in '{}'", spec);
    }
    let version = SemanticVersion::parse_lenient(version.trim())?;
    Ok(PackageIdentifier::exact(id.trim(), version))
}

/// `output` itself, or `{output}/{id}.{version}.nupkg` when it is a directory.
fn destination_for(output: &Path, package: &Package) -> PathBuf {
    if output.is_dir() {
        output.join(format!(
            "{}.{}.nupkg",
            package.id.to_lowercase(),
            package.version.to_normalized_string().to_lowercase()
        ))
    } else {
        output.to_path_buf()
    }
}

fn print_packages(packages: &[Package], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(packages)?);
        return Ok(());
    }
    if packages.is_empty() {
        println!("No packages found");
        return Ok(());
    }
    for package in packages {
        let others = package
            .versions
            .iter()
            .filter(|v| **v != package.version)
            .count();
        if others > 0 {
            println!(
                "{} {} ({} other versions) [{}]",
                package.id, package.version, others, package.source.name
            );
        } else {
            println!("{} {} [{}]", package.id, package.version, package.source.name);
        }
        if let Some(description) = package.description.as_deref() {
            println!("    {}", description.lines().next().unwrap_or_default());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nuget_core::{SourceInfo, SourceKind};
    use tempfile::TempDir;

    #[test]
    fn test_parse_installed() {
        let id = parse_installed("Newtonsoft.Json@12.0.1").unwrap();
        assert_eq!(id.id, "Newtonsoft.Json");
        assert_eq!(id.exact_version().unwrap().to_string(), "12.0.1");
        assert!(parse_installed("Newtonsoft.Json").is_err());
        assert!(parse_installed("@1.0.0").is_err());
        assert!(parse_installed("A@not-a-version").is_err());
    }

    #[test]
    fn test_latest_prefers_stable() {
        let info = SourceInfo::new("local", "/tmp", SourceKind::Local);
        let package = |version: &str| {
            Package::new("Serilog", SemanticVersion::parse(version).unwrap(), info.clone())
        };

        let picked = latest(vec![
            package("2.10.0"),
            package("3.0.1"),
            package("4.0.0-beta"),
            package("1.0.0"),
        ])
        .unwrap();
        assert_eq!(picked.version.to_string(), "3.0.1");

        let picked = latest(vec![package("1.0.0-alpha"), package("1.0.0-beta")]).unwrap();
        assert_eq!(picked.version.to_string(), "1.0.0-beta");
        assert!(latest(Vec::new()).is_none());
    }

    #[test]
    fn test_destination_for_directory() {
        let temp = TempDir::new().unwrap();
        let package = Package::new(
            "Serilog",
            SemanticVersion::parse("2.10.0-Beta").unwrap(),
            SourceInfo::new("local", "/tmp", SourceKind::Local),
        );
        assert_eq!(
            destination_for(temp.path(), &package),
            temp.path().join("serilog.2.10.0-beta.nupkg")
        );
        let file = temp.path().join("custom.nupkg");
        assert_eq!(destination_for(&file, &package), file);
    }

    #[test]
    fn test_source_flags_replace_config() {
        let args = Args::parse_from([
            "nuget",
            "--source",
            "/srv/packages",
            "-s",
            "https://api.nuget.org/v3/index.json",
            "search",
            "json",
        ]);
        let file = load_sources(&args).unwrap();
        assert_eq!(file.sources.len(), 2);
        assert_eq!(file.sources[1].name, "source-2");
    }
}
