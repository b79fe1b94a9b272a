//! Optimistic mutation coordination. Every state-changing operation with a
//! remote effect follows one state machine:
//!
//! ```text
//! Pending(optimistic) -> Confirmed | RolledBack | LocalOnly
//! ```
//!
//! The change lands in the local store first; the remote call then either
//! confirms it, definitively rejects it (the local change is reverted), or
//! fails transiently (the change is kept and flagged local-only). Validation
//! failures resolve locally and never reach the remote layer; remote failures
//! resolve here and never bubble further.

use tracing::debug;

use crate::ir::{Edge, Node, NodePatch};
use crate::remote::PersistenceClient;
use crate::store::{GraphStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warn,
    Error,
}

/// Fire-and-forget outcome reporting. The editor shell renders these as
/// toasts; the CLI logs them.
pub trait NotificationSink {
    fn notify(&self, message: &str, severity: Severity);
}

/// Sink that forwards notifications to the tracing subscriber.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, message: &str, severity: Severity) {
        match severity {
            Severity::Error => tracing::error!("{message}"),
            Severity::Warn => tracing::warn!("{message}"),
            Severity::Success | Severity::Info => tracing::info!("{message}"),
        }
    }
}

/// Terminal state of one coordinated mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Remote accepted; local state already reflects the change.
    Confirmed,
    /// Remote definitively refused; local state was reverted.
    RolledBack,
    /// Remote unreachable or not configured; local change retained.
    LocalOnly,
}

pub struct MutationCoordinator<C, N> {
    client: C,
    sink: N,
}

impl<C: PersistenceClient, N: NotificationSink> MutationCoordinator<C, N> {
    pub fn new(client: C, sink: N) -> Self {
        Self { client, sink }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Create a node optimistically and persist it. A validation rejection
    /// returns `Err` before any state (local or remote) changes.
    pub async fn create_node(
        &self,
        store: &mut GraphStore,
        node: Node,
    ) -> Result<MutationOutcome, StoreError> {
        store.insert_node(node.clone())?;
        debug!(id = %node.id, "node applied optimistically");

        match self.client.create_node(&node).await {
            Ok(_) => {
                self.sink
                    .notify(&format!("node {} saved", node.label), Severity::Success);
                Ok(MutationOutcome::Confirmed)
            }
            Err(err) if err.is_definite_rejection() => {
                // The node was inserted a moment ago; removing it restores
                // the exact pre-creation graph.
                let _ = store.remove_node(&node.id);
                self.sink
                    .notify(&format!("node creation rejected: {err}"), Severity::Error);
                Ok(MutationOutcome::RolledBack)
            }
            Err(err) => {
                self.sink
                    .notify(&format!("node kept local-only: {err}"), Severity::Warn);
                Ok(MutationOutcome::LocalOnly)
            }
        }
    }

    /// Update a node (edits, drags, resizes) optimistically and persist the
    /// patch. On definite rejection the prior snapshot is restored and the
    /// chain refit.
    pub async fn update_node(
        &self,
        store: &mut GraphStore,
        id: &str,
        patch: NodePatch,
    ) -> Result<MutationOutcome, StoreError> {
        let prior = store.update_node(id, patch.clone())?;
        debug!(%id, "patch applied optimistically");

        match self.client.update_node(id, &patch).await {
            Ok(_) => {
                self.sink
                    .notify(&format!("node {id} updated"), Severity::Success);
                Ok(MutationOutcome::Confirmed)
            }
            Err(err) if err.is_definite_rejection() => {
                store.restore_node(prior);
                self.sink.notify(
                    &format!("update rejected, change reverted: {err}"),
                    Severity::Error,
                );
                Ok(MutationOutcome::RolledBack)
            }
            Err(err) => {
                self.sink
                    .notify(&format!("change kept local-only: {err}"), Severity::Warn);
                Ok(MutationOutcome::LocalOnly)
            }
        }
    }

    /// Create an edge optimistically and persist it.
    pub async fn create_edge(
        &self,
        store: &mut GraphStore,
        edge: Edge,
    ) -> Result<MutationOutcome, StoreError> {
        store.insert_edge(edge.clone())?;

        match self.client.create_edge(&edge).await {
            Ok(_) => {
                self.sink
                    .notify(&format!("edge {} saved", edge.id), Severity::Success);
                Ok(MutationOutcome::Confirmed)
            }
            Err(err) if err.is_definite_rejection() => {
                let _ = store.remove_edge(&edge.id);
                self.sink
                    .notify(&format!("edge creation rejected: {err}"), Severity::Error);
                Ok(MutationOutcome::RolledBack)
            }
            Err(err) => {
                self.sink
                    .notify(&format!("edge kept local-only: {err}"), Severity::Warn);
                Ok(MutationOutcome::LocalOnly)
            }
        }
    }
}
