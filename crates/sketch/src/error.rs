use thiserror::Error;

use crate::geometry::GeometryKind;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("parameter index {index} out of range (store holds {len} slots)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("unknown property `{name}` for geometry kind {kind:?}")]
    UnknownProperty { kind: GeometryKind, name: String },

    #[error("unresolved reference: {reason}")]
    UnresolvedReference { reason: String },

    #[error("invalid geometry shape: {reason}")]
    InvalidShape { reason: String },

    #[error("constraint scale must be positive, got {0}")]
    InvalidScale(f64),
}

impl Error {
    pub(crate) fn unresolved(reason: impl Into<String>) -> Self {
        Error::UnresolvedReference {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_shape(reason: impl Into<String>) -> Self {
        Error::InvalidShape {
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
