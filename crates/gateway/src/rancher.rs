//! v3 REST transport on top of `kube::Client`.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use corral_core::{RemoteError, ResourceKind};
use http::{header, Method, Request};
use serde_json::Value as Json;
use tracing::{debug, info};
use url::form_urlencoded;

use crate::{observe, payload_id, Filters, RemoteGateway};

#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("RANCHER_URL is not set")]
    MissingUrl,
    #[error("invalid api url {0:?}")]
    InvalidUrl(String),
    #[error("no credentials: set RANCHER_TOKEN_KEY or RANCHER_ACCESS_KEY and RANCHER_SECRET_KEY")]
    MissingCredentials,
    #[error("invalid CA bundle: {0}")]
    CaCerts(String),
    #[error("client: {0}")]
    Client(#[from] kube::Error),
}

/// Connection settings for the control plane.
#[derive(Clone, Default)]
pub struct RancherConfig {
    pub url: String,
    pub token_key: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// PEM bundle.
    pub ca_certs: Option<String>,
    pub insecure: bool,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for RancherConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RancherConfig")
            .field("url", &self.url)
            .field("token_key", &self.token_key.as_ref().map(|_| "<redacted>"))
            .field("access_key", &self.access_key)
            .field("insecure", &self.insecure)
            .finish()
    }
}

impl RancherConfig {
    pub fn from_env() -> Result<Self, ConnectError> {
        let var = |k: &str| std::env::var(k).ok().filter(|s| !s.is_empty());
        let url = var("RANCHER_URL").ok_or(ConnectError::MissingUrl)?;
        Ok(Self {
            url,
            token_key: var("RANCHER_TOKEN_KEY"),
            access_key: var("RANCHER_ACCESS_KEY"),
            secret_key: var("RANCHER_SECRET_KEY"),
            ca_certs: var("RANCHER_CA_CERTS"),
            insecure: var("RANCHER_INSECURE").map(|s| s == "true" || s == "1").unwrap_or(false),
            timeout: var("RANCHER_TIMEOUT_SECS").and_then(|s| s.parse().ok()).map(Duration::from_secs),
        })
    }

    fn authorization(&self) -> Result<String, ConnectError> {
        if let Some(t) = &self.token_key {
            return Ok(format!("Bearer {}", t));
        }
        match (&self.access_key, &self.secret_key) {
            (Some(a), Some(s)) => Ok(format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", a, s)))),
            _ => Err(ConnectError::MissingCredentials),
        }
    }

    /// Base url without a trailing `/v3`.
    fn base_url(&self) -> String {
        let u = self.url.trim_end_matches('/');
        u.strip_suffix("/v3").unwrap_or(u).to_string()
    }
}

/// Decode a PEM bundle into DER certificates.
fn pem_to_der(bundle: &str) -> Result<Vec<Vec<u8>>, ConnectError> {
    let mut out = Vec::new();
    let mut body: Option<String> = None;
    for line in bundle.lines().map(str::trim) {
        if line.starts_with("-----BEGIN ") {
            body = Some(String::new());
        } else if line.starts_with("-----END ") {
            let b64 = body.take().ok_or_else(|| ConnectError::CaCerts("END without BEGIN".into()))?;
            let der = base64::engine::general_purpose::STANDARD
                .decode(b64.as_bytes())
                .map_err(|e| ConnectError::CaCerts(e.to_string()))?;
            out.push(der);
        } else if let Some(b) = body.as_mut() {
            b.push_str(line);
        }
    }
    if out.is_empty() {
        return Err(ConnectError::CaCerts("no certificates found".into()));
    }
    Ok(out)
}

fn classify(err: kube::Error) -> RemoteError {
    match err {
        kube::Error::Api(resp) => RemoteError::from_status(resp.code, resp.message),
        other => RemoteError::other(other.to_string()),
    }
}

pub struct RancherGateway {
    client: kube::Client,
    authorization: String,
}

impl RancherGateway {
    pub fn connect(cfg: &RancherConfig) -> Result<Self, ConnectError> {
        let base = cfg.base_url();
        let uri: http::Uri = base.parse().map_err(|_| ConnectError::InvalidUrl(cfg.url.clone()))?;
        let mut kc = kube::Config::new(uri);
        kc.accept_invalid_certs = cfg.insecure;
        if let Some(pem) = &cfg.ca_certs {
            kc.root_cert = Some(pem_to_der(pem)?);
        }
        if let Some(t) = cfg.timeout {
            kc.read_timeout = Some(t);
            kc.connect_timeout = Some(t);
        }
        let client = kube::Client::try_from(kc)?;
        info!(url = %base, insecure = cfg.insecure, "rancher gateway ready");
        Ok(Self { client, authorization: cfg.authorization()? })
    }

    fn path(kind: ResourceKind, id: Option<&str>) -> String {
        match id {
            Some(id) => format!("/v3/{}/{}", kind.collection(), id),
            None => format!("/v3/{}", kind.collection()),
        }
    }

    /// Collection or object path with a form-encoded query appended.
    fn uri<K, V>(kind: ResourceKind, id: Option<&str>, query: impl IntoIterator<Item = (K, V)>) -> String
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let path = Self::path(kind, id);
        let q = form_urlencoded::Serializer::new(String::new()).extend_pairs(query).finish();
        if q.is_empty() {
            path
        } else {
            format!("{}?{}", path, q)
        }
    }

    async fn send(&self, method: Method, path: String, body: Option<&Json>) -> Result<Option<Json>, RemoteError> {
        let bytes = match body {
            Some(b) => serde_json::to_vec(b).map_err(|e| RemoteError::other(e.to_string()))?,
            None => Vec::new(),
        };
        debug!(%method, %path, "rancher request");
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .body(bytes)
            .map_err(|e| RemoteError::other(e.to_string()))?;
        let text = self.client.request_text(req).await.map_err(classify)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text).map(Some).map_err(|e| RemoteError::other(format!("decoding response: {}", e)))
    }

    async fn send_object(&self, method: Method, path: String, body: Option<&Json>) -> Result<Json, RemoteError> {
        self.send(method, path, body).await?.ok_or_else(|| RemoteError::other("empty response body"))
    }
}

#[async_trait]
impl RemoteGateway for RancherGateway {
    async fn create(&self, kind: ResourceKind, mut payload: Json) -> Result<Json, RemoteError> {
        if let Some(obj) = payload.as_object_mut() {
            obj.entry("type").or_insert_with(|| Json::String(kind.wire_type().to_string()));
        }
        let res = self.send_object(Method::POST, Self::path(kind, None), Some(&payload)).await;
        observe(kind, "create", res.as_ref().map(|_| ()));
        res
    }

    async fn read(&self, kind: ResourceKind, id: &str) -> Result<Json, RemoteError> {
        let res = self.send_object(Method::GET, Self::path(kind, Some(id)), None).await;
        observe(kind, "read", res.as_ref().map(|_| ()));
        res
    }

    async fn replace(&self, kind: ResourceKind, payload: Json) -> Result<Json, RemoteError> {
        let id = payload_id(&payload)?;
        let res = self.send_object(Method::PUT, Self::path(kind, Some(&id)), Some(&payload)).await;
        observe(kind, "replace", res.as_ref().map(|_| ()));
        res
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), RemoteError> {
        let res = self.send(Method::DELETE, Self::path(kind, Some(id)), None).await.map(|_| ());
        observe(kind, "delete", res.as_ref().map(|_| ()));
        res
    }

    async fn action(&self, kind: ResourceKind, id: &str, name: &str, input: Option<Json>) -> Result<Option<Json>, RemoteError> {
        let path = Self::uri(kind, Some(id), [("action", name)]);
        let res = self.send(Method::POST, path, input.as_ref()).await;
        observe(kind, "action", res.as_ref().map(|_| ()));
        res
    }

    async fn list(&self, kind: ResourceKind, filters: &Filters) -> Result<Vec<Json>, RemoteError> {
        let path = Self::uri(kind, None, filters);
        let res = self.send_object(Method::GET, path, None).await.map(|body| match body {
            Json::Object(mut m) => match m.remove("data") {
                Some(Json::Array(items)) => items,
                _ => Vec::new(),
            },
            Json::Array(items) => items,
            _ => Vec::new(),
        });
        observe(kind, "list", res.as_ref().map(|_| ()));
        res
    }
}
