use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::GraphError;
use crate::identity::ObjectId;
use crate::resolver::Loader;
use crate::session::{TagPolicy, VisitDecision};
use crate::type_tag;
use crate::writer::Emitter;

/// A shared, mutable graph node. Identity is the allocation.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wraps a value in a fresh [`Shared`] handle.
pub fn share<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// An object that can occupy a node of a graph document.
///
/// Usually derived with `#[derive(Persist)]`, which writes and reads only the
/// members marked `#[persist]`. Trait objects participate through a
/// supertrait: `trait Shape: Persist { .. }` makes `Shared<dyn Shape>` a valid
/// member type.
pub trait Persist: Any {
    /// Fully qualified name written into type tags.
    fn qualified_name() -> &'static str
    where
        Self: Sized;

    /// Fully qualified name of the runtime type.
    fn type_name(&self) -> &'static str;

    /// `TypeId` of the runtime type, also through a trait object.
    fn concrete_type_id(&self) -> TypeId {
        TypeId::of::<Self>()
    }

    /// Writes the marked members as children of the current node.
    fn write_members(&self, out: &mut Emitter<'_>) -> Result<(), GraphError>;

    /// Populates the marked members from the current node.
    ///
    /// Called on a default-initialised shell. Members absent from the
    /// document keep their current value.
    fn read_members(&mut self, input: &mut Loader<'_, '_>) -> Result<(), GraphError>;
}

/// A value that can be stored in a marked member.
pub trait Member: Sized {
    /// Writes this value into the node the emitter points at.
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError>;

    /// Reads a value from the node the loader points at.
    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError>;

    /// Whether the member is omitted from the document entirely.
    fn is_absent(&self) -> bool {
        false
    }
}

impl<T: ?Sized + Persist> Member for Shared<T> {
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
        let id = ObjectId::of(self);
        let candidate = out.path().clone();
        match out.session().enter_or_reference(id, &candidate) {
            VisitDecision::AlreadyVisited(existing) => {
                type_tag::write_reference(out.node_mut(), &existing);
                Ok(())
            }
            VisitDecision::FreshVisit(path) => {
                let object = self.try_borrow().map_err(|_| GraphError::Borrow { path })?;
                let explicit = out.session().tag_policy() == TagPolicy::Always
                    || object.concrete_type_id() != TypeId::of::<T>();
                if explicit {
                    type_tag::tag(out.node_mut(), object.type_name());
                }
                object.write_members(out)
            }
        }
    }

    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
        if let Some(target) = type_tag::reference_target(input.node()) {
            let at = input.path().clone();
            return input.resolver().resolve_reference::<T>(target, &at);
        }

        let path = input.path().clone();
        let node = input.node();
        let shared = input.resolver().begin_definition::<T>(&path, node)?;
        {
            let mut object = shared
                .try_borrow_mut()
                .map_err(|_| GraphError::Borrow { path })?;
            object.read_members(input)?;
        }
        Ok(shared)
    }
}

impl<M: Member> Member for Option<M> {
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
        match self {
            Some(value) => {
                value.write_value(out)?;
                // An inner `None` was marked; count this `Some` around it.
                if let Some(depth) = type_tag::nil_depth(out.node_mut()) {
                    type_tag::mark_nil(out.node_mut(), depth + 1);
                }
                Ok(())
            }
            None => {
                type_tag::mark_nil(out.node_mut(), 0);
                Ok(())
            }
        }
    }

    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
        let layer = input.enter_option();
        if type_tag::nil_depth(input.node()) == Some(layer) {
            return Ok(None);
        }
        M::read_value(input).map(Some)
    }

    fn is_absent(&self) -> bool {
        self.is_none()
    }
}

impl<M: Member> Member for Vec<M> {
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
        for (index, item) in self.iter().enumerate() {
            out.write_item(&index.to_string(), item)?;
        }
        Ok(())
    }

    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
        input.read_items().map(|items| items.into_iter().map(|(_, v)| v).collect())
    }
}

impl<M: Member> Member for BTreeMap<String, M> {
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
        for (key, value) in self {
            out.write_item(key, value)?;
        }
        Ok(())
    }

    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
        input.read_items().map(|items| items.into_iter().collect())
    }
}

impl<M: Member> Member for IndexMap<String, M> {
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
        for (key, value) in self {
            out.write_item(key, value)?;
        }
        Ok(())
    }

    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
        input.read_items().map(|items| items.into_iter().collect())
    }
}

impl Member for String {
    fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
        out.node_mut().set_text(self.as_str());
        Ok(())
    }

    fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
        Ok(input.node().text().unwrap_or_default().to_string())
    }
}

macro_rules! impl_member_scalar {
    ($($t:ty),* $(,)?) => {
        $(
            impl Member for $t {
                fn write_value(&self, out: &mut Emitter<'_>) -> Result<(), GraphError> {
                    out.node_mut().set_text(self.to_string());
                    Ok(())
                }

                fn read_value(input: &mut Loader<'_, '_>) -> Result<Self, GraphError> {
                    let text = input.node().text().unwrap_or_default();
                    text.parse().map_err(|_| GraphError::InvalidScalar {
                        path: input.path().clone(),
                        value: text.to_string(),
                        expected: stringify!($t),
                    })
                }
            }
        )*
    };
}

impl_member_scalar!(
    bool, char, u8, u16, u32, u64, u128, usize, i8, i16, i32, i64, i128, isize, f32, f64,
);
