//! The v2 `Dependencies` property: `id:range:framework|id:range:framework`.
//!
//! Servers emit placeholder entries such as `::net40` to mark a framework
//! with no dependencies; entries without an id or a range are dropped.

use crate::package::{FrameworkDependencyGroup, PackageIdentifier};
use crate::version::BareVersion;
use tracing::warn;

/// Parse a dependency string into framework groups, in first-seen order.
pub fn parse_dependencies(text: &str) -> Vec<FrameworkDependencyGroup> {
    let mut groups: Vec<FrameworkDependencyGroup> = Vec::new();

    for entry in text.split('|') {
        let mut fields = entry.splitn(3, ':').map(str::trim);
        let id = fields.next().unwrap_or("");
        let range = fields.next().unwrap_or("");
        let framework = fields.next().unwrap_or("");
        if id.is_empty() || range.is_empty() {
            continue;
        }

        let dependency = match PackageIdentifier::parse(id, range, BareVersion::Minimum) {
            Ok(dependency) => dependency,
            Err(e) => {
                warn!("Skipping dependency '{}': {}", entry, e);
                continue;
            }
        };

        match groups
            .iter_mut()
            .find(|g| g.target_framework.eq_ignore_ascii_case(framework))
        {
            Some(group) => group.dependencies.push(dependency),
            None => {
                let mut group = FrameworkDependencyGroup::new(framework);
                group.dependencies.push(dependency);
                groups.push(group);
            }
        }
    }
    groups
}
