//! Corral core types: declarative records, the remote object envelope and errors.

#![forbid(unsafe_code)]

pub mod error;
pub mod object;
pub mod record;

pub use error::{EngineError, EngineResult, ErrorClass, RemoteError};
pub use object::{from_payload, to_payload, RemoteObject, ResourceKind, ResourceMeta};
pub use record::{Record, Value};

pub mod prelude {
    pub use super::{EngineError, EngineResult, ErrorClass, Record, RemoteError, RemoteObject, ResourceKind, ResourceMeta, Value};
}
