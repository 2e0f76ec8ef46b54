//! JNLP descriptor reader.
//!
//! Only the parts of the format the launcher acts on are read; everything else
//! (`security`, `j2se`, icons, descriptions) is ignored.

use serde::Deserialize;
use std::path::{Component, Path};
use tracing::debug;
use url::Url;

use super::{DescriptorReader, LaunchDescriptor, ResourceRef, RuntimeProperty};
use crate::error::{LaunchError, LaunchResult};

#[derive(Debug, Deserialize)]
struct JnlpDocument {
    #[serde(rename = "@codebase", default)]
    codebase: Option<String>,
    #[serde(default)]
    information: Vec<Information>,
    #[serde(default)]
    resources: Vec<Resources>,
    #[serde(rename = "application-desc", default)]
    application_desc: Option<ApplicationDesc>,
}

#[derive(Debug, Deserialize)]
struct Information {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    homepage: Option<Homepage>,
}

#[derive(Debug, Deserialize)]
struct Homepage {
    #[serde(rename = "@href", default)]
    href: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Resources {
    #[serde(default)]
    jar: Vec<Jar>,
    #[serde(default)]
    property: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Jar {
    #[serde(rename = "@href")]
    href: String,
    #[serde(rename = "@main", default)]
    main: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Property {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@value", default)]
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApplicationDesc {
    #[serde(rename = "@main-class", default)]
    main_class: Option<String>,
    #[serde(default)]
    argument: Vec<String>,
}

/// Reads JNLP XML documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JnlpReader;

impl JnlpReader {
    pub fn new() -> Self {
        Self
    }
}

impl DescriptorReader for JnlpReader {
    fn parse(&self, raw: &str, base: Option<&Url>) -> LaunchResult<LaunchDescriptor> {
        let doc: JnlpDocument = quick_xml::de::from_str(raw)
            .map_err(|e| LaunchError::Descriptor(format!("Malformed JNLP document: {}", e)))?;

        let codebase = non_empty(doc.codebase);
        let mut resources = Vec::new();
        let mut properties = Vec::new();

        for block in doc.resources {
            for jar in block.jar {
                let href = jar.href.trim();
                let url = resolve_location(href, codebase.as_deref(), base)?;
                let primary = jar
                    .main
                    .as_deref()
                    .is_some_and(|m| m.trim().eq_ignore_ascii_case("true"));
                add_resource(&mut resources, href, url, primary)?;
            }
            properties.extend(block.property.into_iter().map(|p| RuntimeProperty {
                name: p.name,
                value: p.value,
            }));
        }

        // Exactly one resource is primary: the first flagged one, else the first.
        let primary_index = resources.iter().position(|r| r.primary).unwrap_or(0);
        for (index, resource) in resources.iter_mut().enumerate() {
            resource.primary = index == primary_index;
        }

        let info = doc.information.into_iter().next();
        let (title, vendor, homepage) = match info {
            Some(info) => (
                non_empty(info.title),
                non_empty(info.vendor),
                non_empty(info.homepage.and_then(|h| h.href)),
            ),
            None => (None, None, None),
        };

        let (entry_point, arguments) = match doc.application_desc {
            Some(desc) => (non_empty(desc.main_class), desc.argument),
            None => (None, Vec::new()),
        };

        Ok(LaunchDescriptor {
            title,
            vendor,
            homepage,
            resources,
            entry_point,
            arguments,
            properties,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Resolve a jar `href` against the codebase, or the document location when
/// there is no codebase. A codebase always behaves as a directory.
fn resolve_location(href: &str, codebase: Option<&str>, base: Option<&Url>) -> LaunchResult<Url> {
    if let Ok(url) = Url::parse(href) {
        return Ok(url);
    }

    let unresolvable =
        |reason: String| LaunchError::Descriptor(format!("Cannot resolve `{}`: {}", href, reason));

    let base = match codebase {
        Some(codebase) => {
            let mut codebase_url = match Url::parse(codebase) {
                Ok(url) => url,
                Err(_) => base
                    .ok_or_else(|| unresolvable(format!("relative codebase `{}`", codebase)))?
                    .join(codebase)
                    .map_err(|e| unresolvable(e.to_string()))?,
            };
            if !codebase_url.path().ends_with('/') {
                let path = format!("{}/", codebase_url.path());
                codebase_url.set_path(&path);
            }
            codebase_url
        }
        None => base
            .cloned()
            .ok_or_else(|| unresolvable("no codebase and no document location".to_string()))?,
    };

    base.join(href).map_err(|e| unresolvable(e.to_string()))
}

/// Append a resource, keeping local names unique.
///
/// A location listed twice is kept once. An absolute `href` whose last
/// segment is already taken is stored under its host and path instead.
fn add_resource(
    resources: &mut Vec<ResourceRef>,
    href: &str,
    url: Url,
    primary: bool,
) -> LaunchResult<()> {
    if let Some(existing) = resources.iter_mut().find(|r| r.url == url) {
        debug!("Ignoring repeated resource {}", url);
        existing.primary |= primary;
        return Ok(());
    }

    let taken = |name: &str| resources.iter().any(|r| r.name == name);
    let mut name = resource_name(href, &url)?;
    if taken(&name) && Url::parse(href).is_ok() {
        name = checked_name(
            href,
            format!("{}{}", url.host_str().unwrap_or_default(), url.path()),
        )?;
    }
    if taken(&name) {
        return Err(LaunchError::Descriptor(format!(
            "Resource `{}` would overwrite another resource stored as `{}`",
            href, name
        )));
    }

    resources.push(ResourceRef { name, url, primary });
    Ok(())
}

/// Local file name for a resource: the relative `href`, or the last URL
/// segment when the `href` is absolute.
fn resource_name(href: &str, url: &Url) -> LaunchResult<String> {
    let name = if Url::parse(href).is_ok() {
        url.path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default()
            .to_string()
    } else {
        href.split(['?', '#']).next().unwrap_or_default().to_string()
    };
    checked_name(href, name)
}

fn checked_name(href: &str, name: String) -> LaunchResult<String> {
    let path = Path::new(&name);
    let safe = !name.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(LaunchError::Descriptor(format!(
            "Resource `{}` does not name a relative file",
            href
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = include_str!("../../tests/fixtures/sample.jnlp");

    #[test]
    fn test_parse_sample_descriptor() {
        let descriptor = JnlpReader::new().parse(SAMPLE, None).unwrap();

        assert_eq!(descriptor.title.as_deref(), Some("Sample JNLP"));
        assert_eq!(descriptor.vendor.as_deref(), Some("Example Vendor"));
        assert_eq!(descriptor.homepage.as_deref(), Some("https://example.com/sample"));
        assert_eq!(descriptor.entry_point.as_deref(), Some("MainClass"));
        assert_eq!(descriptor.resources.len(), 1);

        let jar = &descriptor.resources[0];
        assert_eq!(jar.name, "sample.jar");
        assert_eq!(
            jar.url.as_str(),
            "https://downloads.example.com/sample/sample.jar"
        );
        assert!(jar.primary);
    }

    #[test]
    fn test_parse_multiple_resource_blocks_in_order() {
        let raw = r#"<?xml version="1.0"?>
            <jnlp codebase="https://example.com/app/">
                <resources>
                    <jar href="lib/first.jar"/>
                    <j2se version="11+"/>
                    <jar href="app.jar" main="true"/>
                    <property name="app.mode" value="demo"/>
                </resources>
                <resources os="Linux">
                    <jar href="https://cdn.example.com/native/linux.jar"/>
                </resources>
                <application-desc main-class="com.example.Main">
                    <argument>--verbose</argument>
                    <argument>input.txt</argument>
                </application-desc>
            </jnlp>"#;

        let descriptor = JnlpReader::new().parse(raw, None).unwrap();
        let names: Vec<_> = descriptor.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["lib/first.jar", "app.jar", "linux.jar"]);
        assert_eq!(
            descriptor.resources[0].url.as_str(),
            "https://example.com/app/lib/first.jar"
        );
        assert_eq!(
            descriptor.resources[2].url.as_str(),
            "https://cdn.example.com/native/linux.jar"
        );
        assert_eq!(descriptor.primary().unwrap().name, "app.jar");
        assert_eq!(descriptor.resources.iter().filter(|r| r.primary).count(), 1);
        assert_eq!(descriptor.arguments, vec!["--verbose", "input.txt"]);
        assert_eq!(descriptor.properties[0].to_arg(), "-Dapp.mode=demo");
        assert!(descriptor.title.is_none());
    }

    #[test]
    fn test_same_file_name_in_different_directories_stays_distinct() {
        let raw = r#"<jnlp codebase="https://example.com/app/">
                <resources><jar href="app.jar" main="true"/></resources>
                <resources os="Linux">
                    <jar href="https://cdn.example.com/linux/native.jar"/>
                </resources>
                <resources os="Windows">
                    <jar href="https://cdn.example.com/windows/native.jar"/>
                </resources>
                <resources><jar href="app.jar"/></resources>
            </jnlp>"#;

        let descriptor = JnlpReader::new().parse(raw, None).unwrap();
        let names: Vec<_> = descriptor.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["app.jar", "native.jar", "cdn.example.com/windows/native.jar"]
        );
        assert!(descriptor.resources[0].primary);
    }

    #[test]
    fn test_relative_href_clashing_with_absolute_jar_is_rejected() {
        let raw = r#"<jnlp codebase="https://example.com/app/">
                <resources>
                    <jar href="https://cdn.example.com/lib/app.jar"/>
                    <jar href="app.jar"/>
                </resources>
            </jnlp>"#;

        let err = JnlpReader::new().parse(raw, None).unwrap_err();
        assert!(err.to_string().contains("would overwrite"));
    }

    #[test]
    fn test_relative_href_without_codebase_uses_document_location() {
        let raw = r#"<jnlp><resources><jar href="app.jar"/></resources></jnlp>"#;
        let base = Url::parse("file:///srv/apps/demo.jnlp").unwrap();

        let descriptor = JnlpReader::new().parse(raw, Some(&base)).unwrap();
        assert_eq!(descriptor.resources[0].url.as_str(), "file:///srv/apps/app.jar");
        assert!(descriptor.resources[0].primary);
        assert!(descriptor.entry_point.is_none());
    }

    #[test]
    fn test_unresolvable_href_is_rejected() {
        let raw = r#"<jnlp><resources><jar href="app.jar"/></resources></jnlp>"#;
        let err = JnlpReader::new().parse(raw, None).unwrap_err();
        assert!(matches!(err, LaunchError::Descriptor(_)));
    }

    #[test]
    fn test_parent_traversal_is_rejected() {
        let raw = r#"<jnlp codebase="https://example.com/app">
                <resources><jar href="../escape.jar"/></resources>
            </jnlp>"#;
        let err = JnlpReader::new().parse(raw, None).unwrap_err();
        assert!(err.to_string().contains("does not name a relative file"));
    }

    #[test]
    fn test_malformed_document() {
        let err = JnlpReader::new().parse("<jnlp><resources>", None).unwrap_err();
        assert!(matches!(err, LaunchError::Descriptor(_)));
    }
}
