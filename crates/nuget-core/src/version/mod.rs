//! Package versions and version ranges.

mod range;
mod semantic;

pub use range::{BareVersion, VersionRange};
pub use semantic::SemanticVersion;
