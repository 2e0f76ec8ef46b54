//! Launch descriptors: what to download and what to run.
//!
//! A [`LaunchDescriptor`] is produced once by a [`DescriptorReader`] and is
//! read-only afterwards. Older single-jar descriptors and newer multi-jar ones
//! both end up as an ordered list of [`ResourceRef`]s.

pub mod jnlp;
pub mod loader;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::LaunchResult;

pub use jnlp::JnlpReader;
pub use loader::{load_document, read_descriptor};

/// One downloadable unit named by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    /// Declared name, also the local file name relative to the target directory.
    pub name: String,
    pub url: Url,
    /// Marks the main resource of single-jar flows.
    pub primary: bool,
}

/// A system property handed to the child runtime as `-Dname=value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeProperty {
    pub name: String,
    pub value: String,
}

impl RuntimeProperty {
    pub fn to_arg(&self) -> String {
        format!("-D{}={}", self.name, self.value)
    }
}

/// Immutable description of one launchable application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchDescriptor {
    pub title: Option<String>,
    pub vendor: Option<String>,
    pub homepage: Option<String>,
    pub resources: Vec<ResourceRef>,
    /// Fully-qualified identifier the child runtime executes.
    pub entry_point: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<RuntimeProperty>,
}

impl LaunchDescriptor {
    /// The primary resource, if the descriptor names any resource at all.
    pub fn primary(&self) -> Option<&ResourceRef> {
        self.resources
            .iter()
            .find(|r| r.primary)
            .or_else(|| self.resources.first())
    }
}

/// Turns a raw document into a [`LaunchDescriptor`].
///
/// `base` is the location the document was loaded from; readers use it to
/// resolve relative resource locations when the document has no codebase.
pub trait DescriptorReader: Send + Sync {
    fn parse(&self, raw: &str, base: Option<&Url>) -> LaunchResult<LaunchDescriptor>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(name: &str, primary: bool) -> ResourceRef {
        ResourceRef {
            name: name.to_string(),
            url: Url::parse(&format!("https://example.com/{}", name)).unwrap(),
            primary,
        }
    }

    #[test]
    fn test_primary_prefers_flagged_resource() {
        let descriptor = LaunchDescriptor {
            resources: vec![resource("lib.jar", false), resource("app.jar", true)],
            ..Default::default()
        };
        assert_eq!(descriptor.primary().unwrap().name, "app.jar");
    }

    #[test]
    fn test_primary_falls_back_to_first() {
        let descriptor = LaunchDescriptor {
            resources: vec![resource("a.jar", false), resource("b.jar", false)],
            ..Default::default()
        };
        assert_eq!(descriptor.primary().unwrap().name, "a.jar");
        assert!(LaunchDescriptor::default().primary().is_none());
    }

    #[test]
    fn test_property_arg() {
        let prop = RuntimeProperty {
            name: "app.mode".to_string(),
            value: "demo".to_string(),
        };
        assert_eq!(prop.to_arg(), "-Dapp.mode=demo");
    }
}
