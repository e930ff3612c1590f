//! Corral gateway: the narrow call surface against the control-plane API.
//!
//! Every remote failure is classified exactly once here into an [`ErrorClass`]; nothing above
//! this crate inspects status codes or error text.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use corral_core::{EngineResult, ErrorClass, RemoteError, RemoteObject, ResourceKind};
use metrics::counter;
use serde_json::Value as Json;

pub mod mock;
pub mod rancher;

pub use mock::{Call, MockGateway, Op, ReadStep};
pub use rancher::{ConnectError, RancherConfig, RancherGateway};

pub type Filters = BTreeMap<String, String>;

/// Untyped CRUD + action surface, shared across concurrent orchestrations.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    async fn create(&self, kind: ResourceKind, payload: Json) -> Result<Json, RemoteError>;

    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Json, RemoteError>;

    /// Full replace; the object id is taken from the payload.
    async fn replace(&self, kind: ResourceKind, payload: Json) -> Result<Json, RemoteError>;

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), RemoteError>;

    /// Invoke a named side action. An empty response body is `Ok(None)`.
    async fn action(&self, kind: ResourceKind, id: &str, name: &str, input: Option<Json>) -> Result<Option<Json>, RemoteError>;

    async fn list(&self, kind: ResourceKind, filters: &Filters) -> Result<Vec<Json>, RemoteError>;
}

pub(crate) fn payload_id(payload: &Json) -> Result<String, RemoteError> {
    payload
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| RemoteError::other("replace payload carries no id"))
}

pub(crate) fn observe(kind: ResourceKind, op: &'static str, res: Result<(), &RemoteError>) {
    counter!("gateway_calls_total", 1u64, "kind" => kind.as_str(), "op" => op);
    if let Err(e) = res {
        let class = match e.class {
            ErrorClass::NotFound => "not_found",
            ErrorClass::Forbidden => "forbidden",
            ErrorClass::Conflict => "conflict",
            ErrorClass::Unauthorized => "unauthorized",
            ErrorClass::Other => "other",
        };
        counter!("gateway_errors_total", 1u64, "kind" => kind.as_str(), "op" => op, "class" => class);
    }
}

/// Typed helpers over any gateway: serialize on the way out, deserialize on the way back.
pub mod typed {
    use super::*;
    use corral_core::{from_payload, to_payload};

    pub async fn create<T: RemoteObject>(gw: &dyn RemoteGateway, obj: &T) -> EngineResult<T> {
        let out = gw.create(T::KIND, to_payload(obj)?).await?;
        from_payload(out)
    }

    pub async fn read<T: RemoteObject>(gw: &dyn RemoteGateway, id: &str) -> EngineResult<T> {
        let out = gw.read(T::KIND, id).await?;
        from_payload(out)
    }

    pub async fn replace<T: RemoteObject>(gw: &dyn RemoteGateway, obj: &T) -> EngineResult<T> {
        let out = gw.replace(T::KIND, to_payload(obj)?).await?;
        from_payload(out)
    }

    pub async fn list<T: RemoteObject>(gw: &dyn RemoteGateway, filters: &Filters) -> EngineResult<Vec<T>> {
        gw.list(T::KIND, filters).await?.into_iter().map(from_payload).collect()
    }

    /// Read with absence folded into `None`.
    pub async fn read_opt<T: RemoteObject>(gw: &dyn RemoteGateway, id: &str) -> EngineResult<Option<T>> {
        match read::<T>(gw, id).await {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_absent() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
