use log::trace;

use crate::identity::{IdentityRegistry, ObjectId, Registration};
use crate::path::Path;

/// When object nodes receive a type tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TagPolicy {
    /// Tag every object node.
    #[default]
    Always,
    /// Tag only when the runtime type differs from the declared member type.
    Polymorphic,
}

/// Settings for one serialization pass.
#[derive(Debug, Clone, Default)]
pub struct SessionConfig {
    /// Path owned by the root object; every other path is below it.
    pub root_prefix: Path,
    pub tag_policy: TagPolicy,
}

/// What the traversal should do with an object it is about to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VisitDecision {
    /// First encounter: write the full contents at this path.
    FreshVisit(Path),
    /// Seen before: write a reference to this path and do not descend.
    AlreadyVisited(Path),
}

/// Bookkeeping shared by the whole recursive walk of one graph.
///
/// A session is created per serialization call and handed down by `&mut`;
/// it is never cloned, so every level of the recursion sees the same
/// identity registry.
#[derive(Debug, Default)]
pub struct SessionContext {
    config: SessionConfig,
    registry: IdentityRegistry,
}

impl SessionContext {
    pub fn new(config: SessionConfig) -> Self {
        SessionContext {
            config,
            registry: IdentityRegistry::new(),
        }
    }

    /// Path of the root object.
    pub fn root_path(&self) -> &Path {
        &self.config.root_prefix
    }

    pub fn tag_policy(&self) -> TagPolicy {
        self.config.tag_policy
    }

    /// Path of member `member` of the object at `parent`.
    pub fn path_for(&self, parent: &Path, member: &str) -> Path {
        parent.join(member)
    }

    /// Decides whether `id` is written in full at `candidate` or referenced.
    ///
    /// A fresh identity is registered before this returns, so a cycle that
    /// leads back to it from any descendant sees `AlreadyVisited`.
    pub fn enter_or_reference(&mut self, id: ObjectId, candidate: &Path) -> VisitDecision {
        match self.registry.try_register(id, candidate) {
            Registration::New => {
                trace!("visit {candidate}");
                VisitDecision::FreshVisit(candidate.clone())
            }
            Registration::Existing(existing) => {
                trace!("reference {candidate} -> {existing}");
                VisitDecision::AlreadyVisited(existing)
            }
        }
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn path_for_is_deterministic() {
        let session = SessionContext::default();
        let parent = Path::from_raw("/a");
        let first = session.path_for(&parent, "b");
        let second = session.path_for(&parent, "b");
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "/a/b");
    }

    #[test]
    fn path_for_ignores_session_history() {
        let mut session = SessionContext::default();
        let before = session.path_for(&Path::root(), "x");
        let object = Rc::new(0u8);
        session.enter_or_reference(ObjectId::of(&object), &before);
        assert_eq!(session.path_for(&Path::root(), "x"), before);
    }

    #[test]
    fn second_encounter_is_a_reference() {
        let mut session = SessionContext::default();
        let shared = Rc::new("s");
        let id = ObjectId::of(&shared);

        let a = session.path_for(session.root_path(), "a");
        let b = session.path_for(session.root_path(), "b");

        assert_eq!(session.enter_or_reference(id, &a), VisitDecision::FreshVisit(a.clone()));
        assert_eq!(session.enter_or_reference(id, &b), VisitDecision::AlreadyVisited(a));
        assert_eq!(session.registry().len(), 1);
    }

    #[test]
    fn root_prefix_applies_to_children() {
        let session = SessionContext::new(SessionConfig {
            root_prefix: Path::prefix("/outer/"),
            ..SessionConfig::default()
        });
        let child = session.path_for(session.root_path(), "a");
        assert_eq!(child.as_str(), "/outer/a");
    }
}
