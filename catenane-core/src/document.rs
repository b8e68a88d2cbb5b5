use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::digest::Digest;
use crate::error::GraphError;
use crate::path::{validate_segment, Path};

/// Name of the element that holds the root object of a document.
pub const ROOT_ELEMENT: &str = "root";

/// A node of the document tree.
///
/// Attributes keep insertion order so that encoding the same tree twice
/// yields identical bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    name: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    attributes: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<Element>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Element {
            name: name.into(),
            attributes: IndexMap::new(),
            text: None,
            children: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns a copy of this element under a different name.
    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Sets an attribute, overwriting any previous value.
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        self.attributes.shift_remove(name)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = Some(text.into());
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// Returns the first child with the given name.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn push_child(&mut self, child: Element) {
        self.children.push(child);
    }
}

/// A serialized object graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    root: Element,
}

impl Document {
    pub fn new(root: Element) -> Self {
        Document { root }
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Element {
        &mut self.root
    }

    pub fn into_root(self) -> Element {
        self.root
    }

    /// Looks up the element at `path`, where the root element sits at `prefix`.
    pub fn find(&self, path: &Path, prefix: &Path) -> Option<&Element> {
        let mut current = &self.root;
        for segment in path.segments_under(prefix)? {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Mounts `sub` as the member `member` of this document's root.
    ///
    /// References inside `sub` only resolve if it was written with the root
    /// prefix matching its new location, e.g. `/member` for a top-level mount.
    pub fn embed(&mut self, member: &str, sub: Document) -> Result<(), GraphError> {
        validate_segment(member)?;
        self.root.push_child(sub.root.renamed(member));
        Ok(())
    }

    /// Encodes the document as CBOR.
    pub fn to_bytes(&self) -> Result<Vec<u8>, GraphError> {
        let mut bytes = Vec::new();
        ciborium::into_writer(self, &mut bytes).map_err(|e| GraphError::Encode(e.to_string()))?;
        Ok(bytes)
    }

    /// Decodes a document from CBOR.
    pub fn from_bytes(data: &[u8]) -> Result<Self, GraphError> {
        ciborium::from_reader(data).map_err(|e| GraphError::Decode(e.to_string()))
    }

    /// Fingerprint of the encoded document.
    pub fn digest(&self) -> Result<Digest, GraphError> {
        Ok(Digest::from_data(&self.to_bytes()?))
    }
}
