use log::debug;

use crate::document::{Document, Element, ROOT_ELEMENT};
use crate::error::GraphError;
use crate::path::{validate_segment, Path};
use crate::persist::{Member, Persist, Shared};
use crate::session::{SessionConfig, SessionContext, TagPolicy};

/// Write cursor handed to each object while it is being serialized.
///
/// Points at the element of the object (or member) being written. Children
/// get their own emitter for their own element; the parent's element is only
/// reachable again once the child returns.
pub struct Emitter<'a> {
    session: &'a mut SessionContext,
    node: &'a mut Element,
    path: Path,
}

impl<'a> Emitter<'a> {
    pub(crate) fn new(session: &'a mut SessionContext, node: &'a mut Element, path: Path) -> Self {
        Emitter {
            session,
            node,
            path,
        }
    }

    /// Writes a marked member. `None` members are left out of the document.
    pub fn write<M: Member>(&mut self, member: &str, value: &M) -> Result<(), GraphError> {
        if value.is_absent() {
            return Ok(());
        }
        self.write_item(member, value)
    }

    /// Writes a child element unconditionally, as sequences and maps do.
    pub fn write_item<M: Member>(&mut self, segment: &str, value: &M) -> Result<(), GraphError> {
        validate_segment(segment)?;
        let path = self.session.path_for(&self.path, segment);
        let mut child = Element::new(segment);
        value.write_value(&mut Emitter::new(&mut *self.session, &mut child, path))?;
        self.node.push_child(child);
        Ok(())
    }

    /// Path of the current element.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn node_mut(&mut self) -> &mut Element {
        &mut *self.node
    }

    pub(crate) fn session(&mut self) -> &mut SessionContext {
        &mut *self.session
    }
}

/// Serializes object graphs into documents.
///
/// Each call to [`Serializer::serialize`] runs a fresh session, so paths and
/// identities never leak from one document into the next.
#[derive(Debug, Clone, Default)]
pub struct Serializer {
    config: SessionConfig,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Serializer { config }
    }

    /// Mounts the written graph at `prefix` instead of the document root.
    pub fn root_prefix(mut self, prefix: &str) -> Self {
        self.config.root_prefix = Path::prefix(prefix);
        self
    }

    pub fn tag_policy(mut self, policy: TagPolicy) -> Self {
        self.config.tag_policy = policy;
        self
    }

    /// Writes the graph reachable from `root`.
    pub fn serialize<T: ?Sized + Persist>(&self, root: &Shared<T>) -> Result<Document, GraphError> {
        let mut session = SessionContext::new(self.config.clone());
        let mut element = Element::new(ROOT_ELEMENT);
        let path = session.root_path().clone();
        root.write_value(&mut Emitter::new(&mut session, &mut element, path))?;
        debug!(
            "serialized {} objects under {}",
            session.registry().len(),
            session.root_path()
        );
        Ok(Document::new(element))
    }
}
