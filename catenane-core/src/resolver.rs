//! Two-phase, order-independent resolution of graph documents.
//!
//! Phase one indexes every definition element by path. Phase two walks the
//! document from the root with static types in hand. A definition binds a
//! shell instance to its path before its members are populated, so anything
//! below it can already point back at it. A reference whose target has not
//! been reached yet allocates the target's shell early from the index; the
//! definition populates that same shell when the walk gets there.
//!
//! Per path: `Unseen -> ShellAllocated -> Populated`. References never
//! change the state of their target.

use std::any::Any;
use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, trace, warn};

use crate::document::{Document, Element};
use crate::error::GraphError;
use crate::path::Path;
use crate::persist::{Member, Persist, Shared};
use crate::registry::TypeRegistry;
use crate::type_tag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotState {
    ShellAllocated,
    Populated,
}

struct Slot {
    object: Rc<dyn Any>,
    qname: &'static str,
    state: SlotState,
}

/// Path-to-instance bookkeeping for one deserialization pass.
pub struct Resolver<'d> {
    registry: &'d TypeRegistry,
    definitions: HashMap<Path, &'d Element>,
    slots: HashMap<Path, Slot>,
}

impl<'d> Resolver<'d> {
    /// Indexes every definition in `document`, whose root sits at `root`.
    pub fn new(registry: &'d TypeRegistry, document: &'d Document, root: &Path) -> Self {
        let mut definitions = HashMap::new();
        index_definitions(document.root(), root.clone(), &mut definitions);
        Resolver {
            registry,
            definitions,
            slots: HashMap::new(),
        }
    }

    /// Binds the definition at `path` and returns the instance to populate.
    ///
    /// Reuses a shell allocated earlier by a forward reference.
    pub fn begin_definition<T: ?Sized + Persist>(
        &mut self,
        path: &Path,
        node: &Element,
    ) -> Result<Shared<T>, GraphError> {
        let existing = self.slots.get_mut(path).map(|slot| {
            let previous = slot.state;
            slot.state = SlotState::Populated;
            (previous, slot.qname, Rc::clone(&slot.object))
        });

        match existing {
            Some((SlotState::Populated, _, _)) => Err(GraphError::DuplicateDefinition {
                path: path.clone(),
            }),
            Some((SlotState::ShellAllocated, qname, object)) => {
                trace!("populate forward shell at {path}");
                self.view::<T>(path, qname, object)
            }
            None => {
                let shared = self.allocate::<T>(path, node)?;
                if let Some(slot) = self.slots.get_mut(path) {
                    slot.state = SlotState::Populated;
                }
                Ok(shared)
            }
        }
    }

    /// Resolves a back-reference found at `at` that points to `target`.
    pub fn resolve_reference<T: ?Sized + Persist>(
        &mut self,
        target: Path,
        at: &Path,
    ) -> Result<Shared<T>, GraphError> {
        if let Some(slot) = self.slots.get(&target) {
            let (qname, object) = (slot.qname, Rc::clone(&slot.object));
            trace!("reference {at} -> {target}");
            return self.view::<T>(&target, qname, object);
        }

        let Some(&node) = self.definitions.get(&target) else {
            return Err(GraphError::DanglingReference { path: target });
        };
        trace!("forward reference {at} -> {target}");
        self.allocate::<T>(&target, node)
    }

    /// Checks that every shell handed out was eventually populated.
    pub fn finish(self) -> Result<usize, GraphError> {
        let mut unpopulated: Vec<_> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.state == SlotState::ShellAllocated)
            .map(|(path, _)| path)
            .collect();
        unpopulated.sort();

        match unpopulated.first() {
            Some(path) => Err(GraphError::DanglingReference {
                path: (*path).clone(),
            }),
            None => Ok(self.slots.len()),
        }
    }

    fn allocate<T: ?Sized + Persist>(
        &mut self,
        path: &Path,
        node: &Element,
    ) -> Result<Shared<T>, GraphError> {
        let registry = self.registry;
        let entry = match type_tag::read_tag::<T>(node, registry) {
            Some(entry) => entry,
            None => {
                if let Some(raw) = type_tag::raw_tag(node) {
                    warn!("unresolved type tag {raw:?} at {path}, using declared type");
                }
                registry
                    .fallback::<T>()
                    .ok_or_else(|| GraphError::AbstractType {
                        path: path.clone(),
                        declared: std::any::type_name::<T>(),
                    })?
            }
        };

        let object = entry.construct();
        let shared = entry
            .view(Rc::clone(&object))
            .ok_or_else(|| GraphError::TypeMismatch {
                path: path.clone(),
                expected: std::any::type_name::<T>(),
            })?;
        trace!("shell {} at {path}", entry.qname());
        self.slots.insert(
            path.clone(),
            Slot {
                object,
                qname: entry.qname(),
                state: SlotState::ShellAllocated,
            },
        );
        Ok(shared)
    }

    fn view<T: ?Sized + Persist>(
        &self,
        path: &Path,
        qname: &str,
        object: Rc<dyn Any>,
    ) -> Result<Shared<T>, GraphError> {
        self.registry
            .resolve::<T>(qname)
            .and_then(|entry| entry.view(object))
            .ok_or_else(|| GraphError::TypeMismatch {
                path: path.clone(),
                expected: std::any::type_name::<T>(),
            })
    }
}

fn index_definitions<'d>(node: &'d Element, path: Path, out: &mut HashMap<Path, &'d Element>) {
    if type_tag::reference_target(node).is_some() {
        return;
    }
    for child in node.children() {
        index_definitions(child, path.join(child.name()), out);
    }
    // Duplicate siblings: the first one wins, as in `Element::child`.
    out.entry(path).or_insert(node);
}

/// Read cursor handed to each object while it is being populated.
pub struct Loader<'a, 'd> {
    resolver: &'a mut Resolver<'d>,
    node: &'d Element,
    path: Path,
    options: usize,
}

impl<'a, 'd> Loader<'a, 'd> {
    pub(crate) fn new(resolver: &'a mut Resolver<'d>, node: &'d Element, path: Path) -> Self {
        Loader {
            resolver,
            node,
            path,
            options: 0,
        }
    }

    /// Counts one more `Option` layer read at this node and returns its index.
    pub(crate) fn enter_option(&mut self) -> usize {
        let layer = self.options;
        self.options += 1;
        layer
    }

    /// Reads a marked member into `slot` if the document has it.
    pub fn read<M: Member>(&mut self, member: &str, slot: &mut M) -> Result<(), GraphError> {
        let node: &'d Element = self.node;
        if let Some(child) = node.child(member) {
            let path = self.path.join(member);
            *slot = M::read_value(&mut Loader::new(&mut *self.resolver, child, path))?;
        }
        Ok(())
    }

    /// Reads every child element in document order, keyed by element name.
    pub fn read_items<M: Member>(&mut self) -> Result<Vec<(String, M)>, GraphError> {
        let node: &'d Element = self.node;
        node.children()
            .iter()
            .map(|child| {
                let path = self.path.join(child.name());
                let value = M::read_value(&mut Loader::new(&mut *self.resolver, child, path))?;
                Ok((child.name().to_string(), value))
            })
            .collect()
    }

    /// Path of the current element.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn node(&self) -> &'d Element {
        self.node
    }

    pub(crate) fn resolver(&mut self) -> &mut Resolver<'d> {
        &mut *self.resolver
    }
}

/// Rebuilds object graphs from documents.
#[derive(Debug, Clone)]
pub struct Deserializer<'r> {
    registry: &'r TypeRegistry,
    root_prefix: Path,
}

impl<'r> Deserializer<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Deserializer {
            registry,
            root_prefix: Path::root(),
        }
    }

    /// Path owned by the document's root element; must match the writer's.
    pub fn root_prefix(mut self, prefix: &str) -> Self {
        self.root_prefix = Path::prefix(prefix);
        self
    }

    /// Reads the graph rooted at the document root as a `T`.
    pub fn deserialize<T: ?Sized + Persist>(&self, document: &Document) -> Result<Shared<T>, GraphError> {
        let mut resolver = Resolver::new(self.registry, document, &self.root_prefix);
        let root = Shared::<T>::read_value(&mut Loader::new(
            &mut resolver,
            document.root(),
            self.root_prefix.clone(),
        ))?;
        let objects = resolver.finish()?;
        debug!("deserialized {objects} objects under {}", self.root_prefix);
        Ok(root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ROOT_ELEMENT;
    use crate::persist::share;
    use crate::persist::tests::{Circle, Leaf, Link, Shape, Square};
    use crate::type_tag::{QNAME_ATTR, REF_ATTR};
    use crate::writer::Serializer;

    fn registry() -> TypeRegistry {
        let mut registry = TypeRegistry::new();
        registry
            .register::<Leaf>()
            .register::<Link>()
            .register_as::<dyn Shape, Circle>(|c| c as Shared<dyn Shape>)
            .register_as::<dyn Shape, Square>(|s| s as Shared<dyn Shape>);
        registry
    }

    fn text(name: &str, value: &str) -> Element {
        let mut e = Element::new(name);
        e.set_text(value);
        e
    }

    fn reference(name: &str, target: &str) -> Element {
        let mut e = Element::new(name);
        e.set_attr(REF_ATTR, target);
        e
    }

    #[test]
    fn shared_leaf_roundtrip() {
        let leaf = share(Leaf {
            label: "s".into(),
            weight: 7,
        });
        let head = share(Link {
            name: "head".into(),
            next: Some(share(Link {
                name: "tail".into(),
                leaf: Some(leaf.clone()),
                ..Link::default()
            })),
            leaf: Some(leaf),
        });

        let registry = registry();
        let doc = Serializer::new().serialize(&head).unwrap();
        let back = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap();

        let back = back.borrow();
        let next = back.next.as_ref().unwrap().borrow();
        let via_head = back.leaf.as_ref().unwrap();
        let via_tail = next.leaf.as_ref().unwrap();
        assert!(Rc::ptr_eq(via_head, via_tail));
        assert_eq!(via_head.borrow().weight, 7);
    }

    #[test]
    fn forward_reference_resolves() {
        // Members are read as name, next, leaf: `/next/leaf` is reached before
        // the definition at `/leaf` it points to.
        let mut next = Element::new("next");
        next.push_child(reference("leaf", "/leaf"));

        let mut leaf = Element::new("leaf");
        leaf.set_attr(QNAME_ATTR, Leaf::qualified_name());
        leaf.push_child(text("label", "late"));

        let mut root = Element::new(ROOT_ELEMENT);
        root.push_child(next);
        root.push_child(leaf);
        let doc = Document::new(root);

        let registry = registry();
        let head = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap();
        let head = head.borrow();
        let defined = head.leaf.as_ref().unwrap();
        let early = head.next.as_ref().unwrap().borrow().leaf.clone().unwrap();
        assert!(Rc::ptr_eq(defined, &early));
        assert_eq!(early.borrow().label, "late");
    }

    #[test]
    fn index_keeps_first_of_duplicate_siblings() {
        let mut root = Element::new(ROOT_ELEMENT);
        root.push_child(text("leaf", "first"));
        root.push_child(text("leaf", "second"));

        let mut index = HashMap::new();
        index_definitions(&root, Path::root(), &mut index);
        let indexed = index[&Path::from_raw("/leaf")];
        assert_eq!(indexed.text(), Some("first"));
        assert!(std::ptr::eq(indexed, root.child("leaf").unwrap()));
    }

    #[test]
    fn dangling_reference_names_path() {
        let mut root = Element::new(ROOT_ELEMENT);
        root.push_child(reference("next", "/nowhere"));
        let doc = Document::new(root);

        let registry = registry();
        let err = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap_err();
        match err {
            GraphError::DanglingReference { path } => assert_eq!(path.as_str(), "/nowhere"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reference_into_unread_subtree_is_dangling() {
        // The target exists in the document but under a member no type reads.
        let mut stray = Element::new("stray");
        stray.push_child(text("name", "ghost"));

        let mut root = Element::new(ROOT_ELEMENT);
        root.push_child(reference("next", "/stray"));
        root.push_child(stray);
        let doc = Document::new(root);

        let registry = registry();
        let err = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap_err();
        assert!(matches!(err, GraphError::DanglingReference { .. }));
    }

    #[test]
    fn untagged_node_uses_declared_type() {
        let mut leaf = Element::new("leaf");
        leaf.push_child(text("label", "plain"));
        let mut root = Element::new(ROOT_ELEMENT);
        root.push_child(leaf);
        let doc = Document::new(root);

        let registry = registry();
        let link = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap();
        assert_eq!(link.borrow().leaf.as_ref().unwrap().borrow().label, "plain");
    }

    #[test]
    fn unresolvable_tag_falls_back() {
        let mut root = Element::new(ROOT_ELEMENT);
        root.set_attr(QNAME_ATTR, "renamed::Leaf");
        root.push_child(text("weight", "4"));
        let doc = Document::new(root);

        let registry = registry();
        let leaf = Deserializer::new(&registry).deserialize::<Leaf>(&doc).unwrap();
        assert_eq!(leaf.borrow().weight, 4);
    }

    #[test]
    fn untagged_trait_object_is_abstract() {
        let doc = Document::new(Element::new(ROOT_ELEMENT));
        let registry = registry();
        let err = Deserializer::new(&registry)
            .deserialize::<dyn Shape>(&doc)
            .unwrap_err();
        assert!(matches!(err, GraphError::AbstractType { .. }));
    }

    #[test]
    fn polymorphic_root_roundtrip() {
        let shape: Shared<dyn Shape> = share(Square { side: 3.0 });
        let doc = Serializer::new().serialize(&shape).unwrap();

        let registry = registry();
        let back = Deserializer::new(&registry).deserialize::<dyn Shape>(&doc).unwrap();
        assert_eq!(back.borrow().type_name(), Square::qualified_name());
        assert_eq!(back.borrow().area(), 9.0);
    }

    #[test]
    fn self_reference_roundtrip() {
        let node = share(Link {
            name: "loop".into(),
            ..Link::default()
        });
        node.borrow_mut().next = Some(node.clone());

        let registry = registry();
        let doc = Serializer::new().serialize(&node).unwrap();
        let back = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap();
        let next = back.borrow().next.clone().unwrap();
        assert!(Rc::ptr_eq(&back, &next));
    }

    #[test]
    fn reference_with_incompatible_type_is_mismatch() {
        // `/leaf` is declared as a Leaf but points at the root Link.
        let mut root = Element::new(ROOT_ELEMENT);
        root.set_attr(QNAME_ATTR, Link::qualified_name());
        root.push_child(reference("leaf", ""));
        let doc = Document::new(root);

        let registry = registry();
        let err = Deserializer::new(&registry).deserialize::<Link>(&doc).unwrap_err();
        assert!(matches!(err, GraphError::TypeMismatch { .. }));
    }

    #[test]
    fn invalid_scalar_reports_path() {
        let mut root = Element::new(ROOT_ELEMENT);
        root.push_child(text("weight", "heavy"));
        let doc = Document::new(root);

        let registry = registry();
        let err = Deserializer::new(&registry).deserialize::<Leaf>(&doc).unwrap_err();
        match err {
            GraphError::InvalidScalar { path, value, expected } => {
                assert_eq!(path.as_str(), "/weight");
                assert_eq!(value, "heavy");
                assert_eq!(expected, "u32");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn duplicate_definition_is_rejected() {
        let registry = registry();
        let doc = Document::new(Element::new(ROOT_ELEMENT));
        let mut resolver = Resolver::new(&registry, &doc, &Path::root());

        let node = Element::new("x");
        let path = Path::from_raw("/x");
        resolver.begin_definition::<Leaf>(&path, &node).unwrap();
        let err = resolver.begin_definition::<Leaf>(&path, &node).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateDefinition { .. }));
    }
}
