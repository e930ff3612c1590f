//! Engine error taxonomy.

use serde::{Deserialize, Serialize};

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClass {
    NotFound,
    Forbidden,
    Conflict,
    Unauthorized,
    Other,
}

impl ErrorClass {
    pub fn from_status(code: u16) -> Self {
        match code {
            401 => ErrorClass::Unauthorized,
            403 => ErrorClass::Forbidden,
            404 => ErrorClass::NotFound,
            409 => ErrorClass::Conflict,
            _ => ErrorClass::Other,
        }
    }
}

/// Error surfaced by the remote gateway.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
#[error("remote {class:?}{}: {message}", .status.map(|s| format!(" ({})", s)).unwrap_or_default())]
pub struct RemoteError {
    pub class: ErrorClass,
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self { class, status: None, message: message.into() }
    }

    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self { class: ErrorClass::from_status(status), status: Some(status), message: message.into() }
    }

    pub fn not_found(message: impl Into<String>) -> Self { Self::new(ErrorClass::NotFound, message) }
    pub fn conflict(message: impl Into<String>) -> Self { Self::new(ErrorClass::Conflict, message) }
    pub fn other(message: impl Into<String>) -> Self { Self::new(ErrorClass::Other, message) }

    /// Not-found and forbidden both mean the object is gone from the caller's view.
    pub fn is_absent(&self) -> bool { matches!(self.class, ErrorClass::NotFound | ErrorClass::Forbidden) }
    pub fn is_conflict(&self) -> bool { self.class == ErrorClass::Conflict }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("field {field}: expected {expected}, found {found}")]
    ShapeMismatch { field: String, expected: &'static str, found: String },

    #[error("{group}: more than one variant populated ({})", .populated.join(", "))]
    AmbiguousVariant { group: String, populated: Vec<String> },

    #[error("{group}: remote object populates no known variant")]
    NoVariantPopulated { group: String },

    #[error("{group}: remote object populates several variants ({})", .populated.join(", "))]
    MultipleVariantsPopulated { group: String, populated: Vec<String> },

    #[error("validation: {0}")]
    Validation(String),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("timed out waiting for {id} (last state {last_state:?})")]
    Timeout { id: String, last_state: String },

    #[error("{id}: unexpected state {state:?}, expected one of {}", .expected.join(", "))]
    UnexpectedState { id: String, state: String, expected: Vec<String> },

    #[error("{id}: entered failed state: {message}")]
    FailedState { id: String, message: String },

    #[error("cancelled while waiting for {id} (last state {last_state:?})")]
    Cancelled { id: String, last_state: String },

    #[error("lookup matched no objects")]
    LookupNotFound,

    #[error("lookup matched {count} objects, expected exactly one")]
    LookupAmbiguous { count: usize },

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn shape(field: impl Into<String>, expected: &'static str, found: impl Into<String>) -> Self {
        EngineError::ShapeMismatch { field: field.into(), expected, found: found.into() }
    }

    pub fn validation(msg: impl Into<String>) -> Self { EngineError::Validation(msg.into()) }

    pub fn remote(&self) -> Option<&RemoteError> {
        match self { EngineError::Remote(r) => Some(r), _ => None }
    }

    pub fn is_absent(&self) -> bool { self.remote().map(RemoteError::is_absent).unwrap_or(false) }
    pub fn is_conflict(&self) -> bool { self.remote().map(RemoteError::is_conflict).unwrap_or(false) }
}

pub type EngineResult<T> = Result<T, EngineError>;
