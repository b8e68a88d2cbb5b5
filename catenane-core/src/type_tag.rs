//! Reserved attributes and the type-tag codec.
//!
//! These names are part of the document format: any reader and writer pair
//! must agree on them. Members are always written as child elements, so a
//! member name can never shadow one of these attributes.

use crate::document::Element;
use crate::path::Path;
use crate::registry::{Entry, TypeRegistry};

/// Attribute holding the fully qualified name of an object's runtime type.
pub const QNAME_ATTR: &str = "qname";

/// Attribute marking a back-reference; its value is the target path.
pub const REF_ATTR: &str = "ref";

/// Attribute marking an explicit `None` inside a sequence or map.
///
/// `true` for a plain `None`. Inside nested options the value counts the
/// `Some` layers around the `None`, so `Some(None)` is written as `1`.
pub const NIL_ATTR: &str = "nil";

/// Records `qname` as the type of `node`. Re-tagging overwrites.
pub fn tag(node: &mut Element, qname: &str) {
    node.set_attr(QNAME_ATTR, qname);
}

/// Returns the raw type name written on `node`, if any.
pub fn raw_tag(node: &Element) -> Option<&str> {
    node.attr(QNAME_ATTR)
}

/// Resolves the tag on `node` to a constructible type of family `F`.
///
/// Returns `None` when there is no tag, when the name is unknown for `F`, or
/// when the name is ambiguous. Callers fall back to the declared type.
pub fn read_tag<'r, F: ?Sized + 'static>(
    node: &Element,
    registry: &'r TypeRegistry,
) -> Option<&'r Entry<F>> {
    registry.resolve::<F>(raw_tag(node)?)
}

/// Turns `node` into a back-reference to `target`.
pub fn write_reference(node: &mut Element, target: &Path) {
    node.set_attr(REF_ATTR, target.as_str());
}

/// Returns the target of a back-reference node.
pub fn reference_target(node: &Element) -> Option<Path> {
    node.attr(REF_ATTR).map(Path::from_raw)
}

/// Marks `node` as a `None` wrapped in `depth` layers of `Some`.
pub fn mark_nil(node: &mut Element, depth: usize) {
    match depth {
        0 => node.set_attr(NIL_ATTR, "true"),
        n => node.set_attr(NIL_ATTR, n.to_string()),
    }
}

/// Returns the nesting depth of the `None` recorded on `node`, if any.
pub fn nil_depth(node: &Element) -> Option<usize> {
    match node.attr(NIL_ATTR)? {
        "true" => Some(0),
        depth => depth.parse().ok(),
    }
}

pub fn is_nil(node: &Element) -> bool {
    nil_depth(node).is_some()
}
