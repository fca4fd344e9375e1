//! NuGet Core - Headless package resolution over NuGet package sources.
//!
//! Local folders, v2 (OData/Atom) feeds and v3 (JSON) feeds all answer the
//! same [`PackageSource`] contract: find the versions of a package, search,
//! compute updates for installed packages, and download archives. A
//! [`CombinedPackageSource`] queries several sources as one.
//!
//! # Example
//!
//! ```rust,ignore
//! use nuget_core::{
//!     create_source, CancellationToken, ClientOptions, PackageIdentifier, SourceConfig,
//!     SourceContext,
//! };
//!
//! #[tokio::main]
//! async fn main() -> nuget_core::Result<()> {
//!     let context = SourceContext::new(&ClientOptions::default())?;
//!     let config = SourceConfig::new("nuget.org", "https://api.nuget.org/v3/index.json");
//!     let source = create_source(&config, &context);
//!
//!     let wanted = PackageIdentifier::parse("Newtonsoft.Json", "[12.0.0,13.0.0)", Default::default())?;
//!     let found = source.get_specific_package(&wanted, &CancellationToken::new()).await?;
//!     println!("Resolved {:?}", found.map(|p| p.to_string()));
//!
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod network;
pub mod nuspec;
pub mod package;
pub mod source;
pub mod version;
pub mod xml;

// Re-export commonly used types
pub use cancel::CancellationToken;
pub use config::{ClientOptions, FeedConfig, NetworkConfig, SourcesFile};
pub use credentials::{CredentialProvider, CredentialStore, Credentials};
pub use error::{NugetError, Result};
pub use package::{
    FrameworkDependencyGroup, Package, PackageIdentifier, RepositoryInfo, SourceInfo, SourceKind,
    VersionSpec,
};
pub use source::{
    create_source, CombinedPackageSource, EndpointCache, LegacyFeedSource, LocalPackageSource,
    ModernFeedSource, PackageSource, ProtocolVersion, SourceConfig, SourceContext, UpdateQuery,
};
pub use version::{BareVersion, SemanticVersion, VersionRange};
