use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;

use log::warn;

use crate::persist::{Persist, Shared};

/// A constructible concrete type, as seen through a declared family `F`.
///
/// `F` is the type written at a member position: either the concrete type
/// itself or a trait object such as `dyn Shape`.
pub struct Entry<F: ?Sized> {
    qname: &'static str,
    concrete: TypeId,
    construct: fn() -> Rc<dyn Any>,
    view: Box<dyn Fn(Rc<dyn Any>) -> Option<Shared<F>>>,
}

impl<F: ?Sized + 'static> Entry<F> {
    /// Fully qualified name of the concrete type.
    pub fn qname(&self) -> &'static str {
        self.qname
    }

    /// Allocates a default-initialised shell of the concrete type.
    pub(crate) fn construct(&self) -> Rc<dyn Any> {
        (self.construct)()
    }

    /// Views a type-erased object as the declared family, if it is this type.
    pub(crate) fn view(&self, object: Rc<dyn Any>) -> Option<Shared<F>> {
        (self.view)(object)
    }
}

struct Family<F: ?Sized> {
    entries: HashMap<&'static str, Entry<F>>,
    ambiguous: HashSet<&'static str>,
    fallback: Option<&'static str>,
}

impl<F: ?Sized> Family<F> {
    fn new() -> Self {
        Family {
            entries: HashMap::new(),
            ambiguous: HashSet::new(),
            fallback: None,
        }
    }
}

fn construct<C: Persist + Default>() -> Rc<dyn Any> {
    Rc::new(RefCell::new(C::default()))
}

/// Maps fully qualified type names to shell constructors, per declared family.
///
/// A type becomes loadable from a type tag only after it is registered for
/// the family of the member position it appears in.
pub struct TypeRegistry {
    families: HashMap<TypeId, Box<dyn Any>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        TypeRegistry {
            families: HashMap::new(),
        }
    }

    /// Registers `C` in its own family and makes it that family's fallback.
    pub fn register<C: Persist + Default>(&mut self) -> &mut Self {
        self.insert_concrete::<C>();
        self.family_mut::<C>().fallback = Some(C::qualified_name());
        self
    }

    /// Registers `C` as a member of the declared family `F`.
    ///
    /// `coerce` performs the unsizing conversion, typically
    /// `|c| c as Shared<dyn Trait>`. `C` also becomes resolvable in its own
    /// family, so an object first read as `F` can be referenced from a
    /// `Shared<C>` member. That family gets no fallback from this call.
    pub fn register_as<F, C>(&mut self, coerce: fn(Shared<C>) -> Shared<F>) -> &mut Self
    where
        F: ?Sized + Persist,
        C: Persist + Default,
    {
        self.insert_concrete::<C>();
        self.insert(Entry::<F> {
            qname: C::qualified_name(),
            concrete: TypeId::of::<C>(),
            construct: construct::<C>,
            view: Box::new(move |object: Rc<dyn Any>| {
                object.downcast::<RefCell<C>>().ok().map(coerce)
            }),
        });
        self
    }

    /// Looks up `qname` in family `F`. Ambiguous names resolve to nothing.
    pub fn resolve<F: ?Sized + 'static>(&self, qname: &str) -> Option<&Entry<F>> {
        let family = self.family::<F>()?;
        if family.ambiguous.contains(qname) {
            return None;
        }
        family.entries.get(qname)
    }

    /// The entry used when a node of family `F` carries no usable tag.
    pub fn fallback<F: ?Sized + 'static>(&self) -> Option<&Entry<F>> {
        let family = self.family::<F>()?;
        self.resolve::<F>(family.fallback?)
    }

    pub fn contains<F: ?Sized + 'static>(&self, qname: &str) -> bool {
        self.resolve::<F>(qname).is_some()
    }

    /// Number of declared families with at least one registration.
    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    fn insert_concrete<C: Persist + Default>(&mut self) {
        self.insert(Entry::<C> {
            qname: C::qualified_name(),
            concrete: TypeId::of::<C>(),
            construct: construct::<C>,
            view: Box::new(|object: Rc<dyn Any>| object.downcast::<RefCell<C>>().ok()),
        });
    }

    fn insert<F: ?Sized + 'static>(&mut self, entry: Entry<F>) {
        let family = self.family_mut::<F>();
        match family.entries.get(entry.qname) {
            Some(existing) if existing.concrete != entry.concrete => {
                warn!(
                    "type name {} registered for two different types in family {}",
                    entry.qname,
                    std::any::type_name::<F>()
                );
                family.ambiguous.insert(entry.qname);
            }
            _ => {
                family.entries.insert(entry.qname, entry);
            }
        }
    }

    fn family<F: ?Sized + 'static>(&self) -> Option<&Family<F>> {
        self.families.get(&TypeId::of::<F>())?.downcast_ref()
    }

    fn family_mut<F: ?Sized + 'static>(&mut self) -> &mut Family<F> {
        self.families
            .entry(TypeId::of::<F>())
            .or_insert_with(|| Box::new(Family::<F>::new()))
            .downcast_mut()
            .expect("family is keyed by its own TypeId")
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("families", &self.families.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::tests::{Circle, Leaf, Shape, Square};

    #[test]
    fn register_concrete_sets_fallback() {
        let mut registry = TypeRegistry::new();
        registry.register::<Leaf>();

        let fallback = registry.fallback::<Leaf>().unwrap();
        assert_eq!(fallback.qname(), Leaf::qualified_name());
        assert!(registry.contains::<Leaf>(Leaf::qualified_name()));
    }

    #[test]
    fn trait_family_has_no_fallback() {
        let mut registry = TypeRegistry::new();
        registry
            .register_as::<dyn Shape, Circle>(|c| c as Shared<dyn Shape>)
            .register_as::<dyn Shape, Square>(|s| s as Shared<dyn Shape>);

        assert!(registry.fallback::<dyn Shape>().is_none());
        assert!(registry.contains::<dyn Shape>(Circle::qualified_name()));
        assert!(registry.contains::<dyn Shape>(Square::qualified_name()));
    }

    #[test]
    fn register_as_makes_concrete_type_resolvable() {
        let mut registry = TypeRegistry::new();
        registry.register_as::<dyn Shape, Circle>(|c| c as Shared<dyn Shape>);

        assert!(registry.contains::<Circle>(Circle::qualified_name()));
        assert!(registry.fallback::<Circle>().is_none());
        assert_eq!(registry.len(), 2);

        // A shell built for the trait family views as the concrete type too.
        let entry = registry.resolve::<dyn Shape>(Circle::qualified_name()).unwrap();
        let shell = entry.construct();
        let circle = registry
            .resolve::<Circle>(Circle::qualified_name())
            .and_then(|concrete| concrete.view(shell));
        assert!(circle.is_some());
    }

    #[test]
    fn constructed_shell_views_as_family() {
        let mut registry = TypeRegistry::new();
        registry.register_as::<dyn Shape, Circle>(|c| c as Shared<dyn Shape>);

        let entry = registry.resolve::<dyn Shape>(Circle::qualified_name()).unwrap();
        let shell = entry.construct();
        let shape = entry.view(shell).unwrap();
        assert_eq!(shape.borrow().type_name(), Circle::qualified_name());
    }

    #[test]
    fn view_rejects_other_types() {
        let mut registry = TypeRegistry::new();
        registry.register::<Leaf>().register::<Circle>();

        let circle = registry.fallback::<Circle>().unwrap().construct();
        assert!(registry.fallback::<Leaf>().unwrap().view(circle).is_none());
    }

    #[test]
    fn reregistering_same_type_is_idempotent() {
        let mut registry = TypeRegistry::new();
        registry.register::<Leaf>().register::<Leaf>();
        assert!(registry.contains::<Leaf>(Leaf::qualified_name()));
    }

    #[test]
    fn clashing_names_become_ambiguous() {
        let mut registry = TypeRegistry::new();
        registry
            .register_as::<dyn Shape, Circle>(|c| c as Shared<dyn Shape>)
            .insert(Entry::<dyn Shape> {
                qname: Circle::qualified_name(),
                concrete: TypeId::of::<Square>(),
                construct: construct::<Square>,
                view: Box::new(|object: Rc<dyn Any>| {
                    object
                        .downcast::<RefCell<Square>>()
                        .ok()
                        .map(|s| s as Shared<dyn Shape>)
                }),
            });

        assert!(registry.resolve::<dyn Shape>(Circle::qualified_name()).is_none());
    }
}
