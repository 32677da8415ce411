//! Error types shared by models, arrays and validations.

use std::fmt;

/// A captured attempt to use a member on absent data.
///
/// Reading through a placeholder never faults. Instead the attempt is
/// recorded here and carried along the chain, so that whoever finally
/// forces the value gets a description of where the nil came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UndefinedAccess {
    member: String,
    target: String,
}

impl UndefinedAccess {
    pub(crate) fn new(member: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            member: member.into(),
            target: target.into(),
        }
    }

    /// The member (attribute or method) that was attempted.
    pub fn member(&self) -> &str {
        &self.member
    }

    /// Inspected form of the container the member was attempted on.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for UndefinedAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "undefined method `{}' for {}", self.member, self.target)
    }
}

/// Errors raised by container operations.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{0}")]
    UndefinedAccess(UndefinedAccess),

    #[error("container at {path} holds a scalar, not a mapping")]
    NotAMapping { path: String },

    #[error("attribute {path} is not a sequence")]
    NotASequence { path: String },

    #[error("placeholder has no parent to attach to")]
    Detached,

    #[error("assigning into {path} would make the container its own descendant")]
    Cycle { path: String },

    #[error("index {index} out of bounds for sequence of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("invalid validation rules: {0}")]
    InvalidRules(#[from] serde_json::Error),
}

impl From<UndefinedAccess> for ModelError {
    fn from(access: UndefinedAccess) -> Self {
        ModelError::UndefinedAccess(access)
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
