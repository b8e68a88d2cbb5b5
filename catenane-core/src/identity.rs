use std::collections::HashMap;
#[cfg(debug_assertions)]
use std::collections::HashSet;
use std::rc::Rc;

use crate::path::Path;

/// Identity of a shared object: the address of its allocation.
///
/// Two handles compare equal only if they point at the same allocation,
/// regardless of the values behind them. Only meaningful while the graph
/// being walked is alive, which holds for the duration of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(usize);

impl ObjectId {
    /// Returns the identity of the allocation behind `handle`.
    pub fn of<T: ?Sized>(handle: &Rc<T>) -> Self {
        ObjectId(Rc::as_ptr(handle).cast::<()>() as usize)
    }
}

/// Outcome of [`IdentityRegistry::try_register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The identity was unseen and is now bound to the given path.
    New,
    /// The identity was already bound; carries the first-seen path.
    Existing(Path),
}

/// Maps object identities to the path where each was first written.
///
/// The registry only grows. The first path registered for an identity is
/// canonical and is never overwritten.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    paths: HashMap<ObjectId, Path>,
    #[cfg(debug_assertions)]
    claimed: HashSet<Path>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `id` to `path` unless it is already bound.
    pub fn try_register(&mut self, id: ObjectId, path: &Path) -> Registration {
        if let Some(existing) = self.paths.get(&id) {
            return Registration::Existing(existing.clone());
        }
        #[cfg(debug_assertions)]
        {
            let fresh = self.claimed.insert(path.clone());
            debug_assert!(fresh, "path {path} assigned to two distinct objects");
        }
        self.paths.insert(id, path.clone());
        Registration::New
    }

    /// Returns the canonical path of `id`, if it has been registered.
    pub fn path_of(&self, id: ObjectId) -> Option<&Path> {
        self.paths.get(&id)
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
