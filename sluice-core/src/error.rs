//! Error types shared across the core crate

use thiserror::Error;

/// Raised when an external string does not name a member of a closed vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("invalid {kind}: {value:?}")]
    InvalidArgument { kind: &'static str, value: String },
}

impl ParseError {
    pub fn invalid(kind: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidArgument {
            kind,
            value: value.into(),
        }
    }
}
