use crate::path::Path;

/// Error type for graph serialization and deserialization.
///
/// Session bookkeeping never fails; everything here surfaces from the
/// document codec, the type registry fallback, or the resolver.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("dangling reference: no definition at {path}")]
    DanglingReference { path: Path },
    #[error("cannot construct abstract type {declared} at {path}")]
    AbstractType { path: Path, declared: &'static str },
    #[error("object at {path} is not a {expected}")]
    TypeMismatch { path: Path, expected: &'static str },
    #[error("duplicate definition at {path}")]
    DuplicateDefinition { path: Path },
    #[error("invalid path segment {segment:?}")]
    InvalidSegment { segment: String },
    #[error("invalid {expected} value {value:?} at {path}")]
    InvalidScalar {
        path: Path,
        value: String,
        expected: &'static str,
    },
    #[error("object at {path} is already mutably borrowed")]
    Borrow { path: Path },
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
}
