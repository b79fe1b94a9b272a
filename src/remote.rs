//! Persistence boundary. The backend is a secondary replica of the in-memory
//! graph; every client classifies its failures once, into "the server
//! validated and refused" versus "the server was never really reached", and
//! the mutation coordinator acts on that tag alone.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::ir::{Edge, Node, NodePatch};
use crate::palette::PaletteItem;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RemoteError {
    /// The backend handled the request and refused it (HTTP 4xx other than
    /// 404). The optimistic local change must be rolled back.
    #[error("backend rejected the change (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    /// The backend could not be reached, is not configured, or has no route
    /// for the call (local-only mode). The optimistic change is kept.
    #[error("backend unreachable: {0}")]
    Unreachable(String),
}

impl RemoteError {
    pub fn is_definite_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

/// Async persistence operations the coordinator drives. Implementations must
/// resolve every call to exactly one `Ok`/`Rejected`/`Unreachable` outcome.
#[async_trait]
pub trait PersistenceClient {
    async fn create_node(&self, node: &Node) -> Result<Node, RemoteError>;
    async fn update_node(&self, id: &str, patch: &NodePatch) -> Result<Node, RemoteError>;
    async fn create_edge(&self, edge: &Edge) -> Result<Edge, RemoteError>;
    async fn fetch_palette(&self) -> Result<Vec<PaletteItem>, RemoteError>;
}

/// REST client for a configured backend: `POST /nodes`, `PATCH /nodes/{id}`,
/// `POST /edges`, `GET /palette`. With no base URL every call reports
/// unreachable, which the coordinator treats as local-only mode.
#[derive(Debug)]
pub struct HttpPersistenceClient {
    base: Option<Url>,
    http: reqwest::Client,
}

impl HttpPersistenceClient {
    pub fn new(base_url: Option<&str>) -> Result<Self, RemoteError> {
        let base = match base_url {
            Some(raw) => Some(Url::parse(raw).map_err(|e| {
                RemoteError::Unreachable(format!("invalid backend url {raw:?}: {e}"))
            })?),
            None => None,
        };
        Ok(Self {
            base,
            http: reqwest::Client::new(),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.base.is_some()
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self
            .base
            .clone()
            .ok_or_else(|| RemoteError::Unreachable("no backend configured".to_string()))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Unreachable("backend url cannot be a base".to_string()))?;
            // push() percent-encodes, so arbitrary ids are safe in the path
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<T, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Unreachable(e.to_string()))?;
        let status = response.status();
        debug!(%status, what, "backend response");
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::Unreachable(format!("no backend route for {what}")));
        }
        if status.is_client_error() {
            let message = response.text().await.unwrap_or_default();
            let message = if message.is_empty() {
                status.to_string()
            } else {
                message
            };
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                message,
            });
        }
        if !status.is_success() {
            // 5xx proves nothing was validated; treat as transient.
            return Err(RemoteError::Unreachable(format!(
                "backend error {status} for {what}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Unreachable(format!("invalid response for {what}: {e}")))
    }
}

#[async_trait]
impl PersistenceClient for HttpPersistenceClient {
    async fn create_node(&self, node: &Node) -> Result<Node, RemoteError> {
        let url = self.endpoint(&["nodes"])?;
        self.send(self.http.post(url).json(node), "create node").await
    }

    async fn update_node(&self, id: &str, patch: &NodePatch) -> Result<Node, RemoteError> {
        let url = self.endpoint(&["nodes", id])?;
        self.send(self.http.patch(url).json(patch), "update node").await
    }

    async fn create_edge(&self, edge: &Edge) -> Result<Edge, RemoteError> {
        let url = self.endpoint(&["edges"])?;
        self.send(self.http.post(url).json(edge), "create edge").await
    }

    async fn fetch_palette(&self) -> Result<Vec<PaletteItem>, RemoteError> {
        let url = self.endpoint(&["palette"])?;
        self.send(self.http.get(url), "fetch palette").await
    }
}

#[derive(Debug, Default)]
struct MemoryBackend {
    nodes: BTreeMap<String, Node>,
    edges: BTreeMap<String, Edge>,
    node_counter: u64,
    edge_counter: u64,
    fail_next: Option<RemoteError>,
}

/// In-memory backend for tests and offline development. Behaves like the
/// real service (id assignment, shallow PATCH merge, refusal on unknown ids)
/// and can be primed to fail its next call deterministically.
#[derive(Debug, Default)]
pub struct MemoryPersistenceClient {
    inner: Mutex<MemoryBackend>,
}

impl MemoryPersistenceClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime the next operation to fail with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next = Some(error);
        }
    }

    pub fn node(&self, id: &str) -> Option<Node> {
        self.inner.lock().ok()?.nodes.get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.nodes.len()).unwrap_or(0)
    }

    pub fn edge_count(&self) -> usize {
        self.inner.lock().map(|inner| inner.edges.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryBackend>, RemoteError> {
        self.inner
            .lock()
            .map_err(|_| RemoteError::Unreachable("mock backend poisoned".to_string()))
    }
}

#[async_trait]
impl PersistenceClient for MemoryPersistenceClient {
    async fn create_node(&self, node: &Node) -> Result<Node, RemoteError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        let mut stored = node.clone();
        if stored.id.is_empty() {
            inner.node_counter += 1;
            stored.id = format!("n{}", inner.node_counter);
        }
        inner.nodes.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn update_node(&self, id: &str, patch: &NodePatch) -> Result<Node, RemoteError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        let Some(existing) = inner.nodes.get_mut(id) else {
            // The mock owns its data, so a missing node is a real refusal,
            // not a missing route.
            return Err(RemoteError::Rejected {
                status: 404,
                message: format!("node {id:?} does not exist"),
            });
        };
        if let Some(label) = &patch.label {
            existing.label = label.clone();
        }
        if let Some(x) = patch.x {
            existing.x = x;
        }
        if let Some(y) = patch.y {
            existing.y = y;
        }
        if let Some(width) = patch.width {
            existing.width = Some(width);
        }
        if let Some(height) = patch.height {
            existing.height = Some(height);
        }
        if let Some(props) = &patch.props {
            existing.props.merge(props.clone());
        }
        Ok(existing.clone())
    }

    async fn create_edge(&self, edge: &Edge) -> Result<Edge, RemoteError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        let mut stored = edge.clone();
        if stored.id.is_empty() {
            inner.edge_counter += 1;
            stored.id = format!("e{}", inner.edge_counter);
        }
        inner.edges.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }

    async fn fetch_palette(&self) -> Result<Vec<PaletteItem>, RemoteError> {
        let mut inner = self.lock()?;
        if let Some(err) = inner.fail_next.take() {
            return Err(err);
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeType;

    #[tokio::test]
    async fn unconfigured_http_client_is_unreachable() {
        let client = HttpPersistenceClient::new(None).expect("client");
        assert!(!client.is_configured());
        let err = client
            .create_node(&Node::new("s1", NodeType::Site, "HQ"))
            .await
            .unwrap_err();
        assert_eq!(err, RemoteError::Unreachable("no backend configured".to_string()));
        assert!(!err.is_definite_rejection());
    }

    #[test]
    fn invalid_base_url_is_reported() {
        let err = HttpPersistenceClient::new(Some("not a url")).unwrap_err();
        assert!(matches!(err, RemoteError::Unreachable(_)));
    }

    #[test]
    fn endpoint_percent_encodes_ids() {
        let client = HttpPersistenceClient::new(Some("http://backend.local/api")).expect("client");
        let url = client.endpoint(&["nodes", "rack 1/a"]).expect("endpoint");
        assert_eq!(url.as_str(), "http://backend.local/api/nodes/rack%201%2Fa");
    }

    #[tokio::test]
    async fn memory_backend_assigns_ids_and_merges_patches() {
        let client = MemoryPersistenceClient::new();
        let node = Node::new("", NodeType::Site, "HQ");
        let stored = client.create_node(&node).await.expect("create");
        assert_eq!(stored.id, "n1");

        let patched = client
            .update_node(
                "n1",
                &NodePatch {
                    label: Some("HQ West".to_string()),
                    x: Some(40.0),
                    ..NodePatch::default()
                },
            )
            .await
            .expect("patch");
        assert_eq!(patched.label, "HQ West");
        assert_eq!(patched.x, 40.0);
        assert_eq!(client.node("n1").expect("stored").label, "HQ West");
    }

    #[tokio::test]
    async fn memory_backend_refuses_unknown_ids() {
        let client = MemoryPersistenceClient::new();
        let err = client
            .update_node("ghost", &NodePatch::default())
            .await
            .unwrap_err();
        assert!(err.is_definite_rejection());
    }

    #[tokio::test]
    async fn primed_failure_fires_once() {
        let client = MemoryPersistenceClient::new();
        client.fail_next(RemoteError::Unreachable("cable pulled".to_string()));
        let node = Node::new("s1", NodeType::Site, "HQ");
        assert!(client.create_node(&node).await.is_err());
        assert!(client.create_node(&node).await.is_ok());
        assert_eq!(client.node_count(), 1);
    }
}
