//! Catenane serializes cyclic, shared object graphs to hierarchical documents
//! and back, keeping both object identity and runtime types.
//!
//! Core concepts:
//! - **Shared**: `Rc<RefCell<T>>`, a graph node whose identity is its allocation
//! - **Path**: where an object was first written within one document
//! - **SessionContext**: per-serialization identity registry and root prefix
//! - **Type tag**: the `qname` attribute naming an object's concrete type
//! - **Resolver**: two-phase, order-independent rebuilding of shared instances
//!
//! # Example
//!
//! ```
//! use catenane_core::{share, Deserializer, Persist, Serializer, Shared, TypeRegistry};
//! use std::rc::Rc;
//!
//! #[derive(Debug, Default, Persist)]
//! struct Note {
//!     #[persist]
//!     text: String,
//! }
//!
//! #[derive(Debug, Default, Persist)]
//! struct Pair {
//!     #[persist]
//!     a: Option<Shared<Note>>,
//!     #[persist]
//!     b: Option<Shared<Note>>,
//! }
//!
//! let note = share(Note { text: "shared".into() });
//! let pair = share(Pair { a: Some(note.clone()), b: Some(note) });
//!
//! let doc = Serializer::new().serialize(&pair).unwrap();
//! assert_eq!(doc.root().child("b").unwrap().attr("ref"), Some("/a"));
//!
//! let mut registry = TypeRegistry::new();
//! registry.register::<Pair>().register::<Note>();
//! let back = Deserializer::new(&registry).deserialize::<Pair>(&doc).unwrap();
//! let back = back.borrow();
//! assert!(Rc::ptr_eq(back.a.as_ref().unwrap(), back.b.as_ref().unwrap()));
//! ```
//!
//! # Document format
//!
//! Every object is one element. Marked members are child elements named after
//! the member; scalars carry text. An object seen before is written as an
//! empty element whose `ref` attribute holds the path of its first
//! occurrence. See [`type_tag`] for the reserved attribute names.
//!
//! Member names must be unique within a type, renamed ones included:
//!
//! ```compile_fail
//! use catenane_core::{Persist, Shared};
//!
//! #[derive(Default, Persist)]
//! struct Clash {
//!     #[persist(rename = "x")]
//!     first: Option<Shared<Clash>>,
//!     #[persist]
//!     x: Option<Shared<Clash>>,
//! }
//! ```

// Lets the derive macro's `::catenane_core` paths resolve inside this crate.
extern crate self as catenane_core;

mod digest;
mod document;
mod error;
mod identity;
mod path;
mod persist;
mod registry;
mod resolver;
mod session;
pub mod type_tag;
mod writer;

pub use digest::Digest;
pub use document::{Document, Element, ROOT_ELEMENT};
pub use error::GraphError;
pub use identity::{IdentityRegistry, ObjectId, Registration};
pub use path::{validate_segment, Path, DELIMITER};
pub use persist::{share, Member, Persist, Shared};
pub use registry::{Entry, TypeRegistry};
pub use resolver::{Deserializer, Loader, Resolver};
pub use session::{SessionConfig, SessionContext, TagPolicy, VisitDecision};
pub use writer::{Emitter, Serializer};

#[cfg(feature = "derive")]
pub use catenane_derive::Persist;
