//! Attribute-bag element model.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A namespaced element with attributes, children and optional text.
///
/// Attributes are kept sorted so rendering is deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Element {
    /// Element name
    pub name: String,
    /// Namespace (rendered as the `xmlns` attribute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xmlns: Option<String>,
    /// Attributes
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Child elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Element>,
    /// Text content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Element {
    /// Create an empty element
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Create an element in a namespace
    pub fn with_ns(name: impl Into<String>, xmlns: &str) -> Self {
        Self {
            name: name.into(),
            xmlns: Some(xmlns.to_string()),
            ..Default::default()
        }
    }

    /// Add an attribute, skipping it when the value is absent
    pub fn attr_opt(mut self, key: &str, value: Option<&str>) -> Self {
        if let Some(value) = value {
            self.set_attr(key, value);
        }
        self
    }

    /// Add an attribute
    pub fn attr(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_attr(key, value);
        self
    }

    /// Add a child element
    pub fn child(mut self, child: Element) -> Self {
        self.children.push(child);
        self
    }

    /// Set text content
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Set or replace an attribute
    pub fn set_attr(&mut self, key: &str, value: impl Into<String>) {
        self.attributes.insert(key.to_string(), value.into());
    }

    /// Read an attribute
    pub fn get_attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    /// Text content, or the empty string
    pub fn text(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }

    /// First child with the given name
    pub fn find_child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        if let Some(ns) = &self.xmlns {
            write!(f, " xmlns=\"{}\"", escape(ns))?;
        }
        for (key, value) in &self.attributes {
            write!(f, " {}=\"{}\"", key, escape(value))?;
        }
        if self.children.is_empty() && self.text.is_none() {
            return f.write_str("/>");
        }
        f.write_str(">")?;
        if let Some(text) = &self.text {
            f.write_str(&escape(text))?;
        }
        for child in &self.children {
            write!(f, "{child}")?;
        }
        write!(f, "</{}>", self.name)
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
