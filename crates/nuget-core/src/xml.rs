//! Minimal XML element tree over quick-xml.
//!
//! Atom feeds and `.nuspec` manifests are small, so both are read into an
//! owned tree keyed by local names; namespace prefixes are dropped.

use crate::error::{NugetError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<Element>,
    pub text: String,
}

impl Element {
    /// First child with local name `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `m:null="true"` marks an OData property as absent.
    pub fn is_null(&self) -> bool {
        self.attr("null") == Some("true")
    }

    /// Trimmed text of child `name`; `None` when missing, null or blank.
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .filter(|c| !c.is_null())
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }
}

fn start_element(start: &BytesStart<'_>, origin: &str) -> Result<Element> {
    let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in start.attributes() {
        let attr = attr.map_err(|e| NugetError::malformed(origin, e.to_string()))?;
        if attr.key.as_namespace_binding().is_some() {
            continue;
        }
        let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| NugetError::malformed(origin, e.to_string()))?
            .into_owned();
        attributes.push((key, value));
    }
    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
        text: String::new(),
    })
}

/// Parse a document into its root element. `origin` (a URL or path) names
/// the document in errors.
pub fn parse(text: &str, origin: &str) -> Result<Element> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<Element> = Vec::new();
    let mut root: Option<Element> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| NugetError::malformed(origin, format!("invalid XML: {}", e)))?;
        match event {
            Event::Start(ref start) => stack.push(start_element(start, origin)?),
            Event::Empty(ref start) => {
                let element = start_element(start, origin)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| NugetError::malformed(origin, "unbalanced end tag"))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = Some(element),
                }
            }
            Event::Text(ref content) => {
                let value = content
                    .unescape()
                    .map_err(|e| NugetError::malformed(origin, e.to_string()))?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&value);
                }
            }
            Event::CData(content) => {
                if let Some(current) = stack.last_mut() {
                    current
                        .text
                        .push_str(&String::from_utf8_lossy(&content.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(NugetError::malformed(origin, "unexpected end of document"));
    }
    root.ok_or_else(|| NugetError::malformed(origin, "document has no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaced_properties() {
        let doc = r#"<?xml version="1.0" encoding="utf-8"?>
<entry xmlns="http://www.w3.org/2005/Atom"
       xmlns:d="http://schemas.microsoft.com/ado/2007/08/dataservices"
       xmlns:m="http://schemas.microsoft.com/ado/2007/08/dataservices/metadata">
  <content type="application/zip" src="https://feed/package/A/1.0.0"/>
  <m:properties>
    <d:Id>A</d:Id>
    <d:Title m:null="true"></d:Title>
    <d:Description>Fish &amp; chips</d:Description>
    <d:ReleaseNotes><![CDATA[<b>bold</b>]]></d:ReleaseNotes>
  </m:properties>
</entry>"#;
        let root = parse(doc, "https://feed/").unwrap();
        assert_eq!(root.name, "entry");
        assert_eq!(
            root.child("content").and_then(|c| c.attr("src")),
            Some("https://feed/package/A/1.0.0")
        );
        let props = root.child("properties").unwrap();
        assert_eq!(props.child_text("Id"), Some("A"));
        assert_eq!(props.child_text("Title"), None);
        assert_eq!(props.child_text("Description"), Some("Fish & chips"));
        assert_eq!(props.child_text("ReleaseNotes"), Some("<b>bold</b>"));
        assert!(root.attributes.is_empty());
    }

    #[test]
    fn test_truncated_document_is_malformed() {
        let err = parse("<feed><entry>", "https://feed/Search()").unwrap_err();
        match err {
            NugetError::MalformedResponse { url, .. } => assert_eq!(url, "https://feed/Search()"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_bom_is_ignored() {
        let root = parse("\u{feff}<package><metadata/></package>", "a.nuspec").unwrap();
        assert!(root.child("metadata").is_some());
    }
}
