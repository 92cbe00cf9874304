use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use canopy_common::{ConditionalSync, SharedCell};
use canopy_storage::{NodeHash, StorageBackend};
use thiserror::Error;

use crate::{Node, SyncTreeError};

/// An error produced while resolving a node hash over the network.
///
/// Fetch errors are branch-local: one failed subtree never aborts sibling
/// branches, and a failed entry is retried only when its owner re-adds it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The collaborator did not answer in time
    #[error("Fetch timed out: {0}")]
    Timeout(String),

    /// The collaborator answered with a failure
    #[error("Fetch failed: {0}")]
    Failed(String),

    /// The collaborator does not hold the requested node
    #[error("Node not found: {0}")]
    NotFound(String),
}

/// The network collaborator: resolves a hash into node content.
///
/// Implementations are expected to be cheap to clone (a handle over shared
/// state) because every in-flight fetch holds its own clone. The engine
/// imposes no per-fetch timeout; "no response" leaves the requesting branch
/// pending until its owner cancels or retries; timeout policy belongs to
/// the implementation.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait NodeFetcher: Clone + ConditionalSync + 'static {
    /// Resolve `hash` into the node it identifies.
    async fn fetch_node(&self, hash: &NodeHash) -> Result<Node, FetchError>;
}

/// A [`NodeFetcher`] over any [`StorageBackend`] that stores canonical node
/// bytes against their hash.
#[derive(Clone)]
pub struct BackendFetcher<Backend> {
    backend: Backend,
}

impl<Backend> BackendFetcher<Backend>
where
    Backend: StorageBackend<Key = NodeHash, Value = Vec<u8>>,
{
    /// Create a fetcher reading from the given backend.
    pub fn new(backend: Backend) -> Self {
        BackendFetcher { backend }
    }

    /// Encode and store a node so it can later be fetched by hash.
    pub async fn store(&mut self, node: &Node) -> Result<NodeHash, SyncTreeError> {
        let hash = node.hash();
        self.backend
            .set(hash, node.canonical_bytes().to_vec())
            .await
            .map_err(|error| SyncTreeError::Storage(error.into()))?;
        Ok(hash)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl<Backend> NodeFetcher for BackendFetcher<Backend>
where
    Backend: StorageBackend<Key = NodeHash, Value = Vec<u8>> + ConditionalSync + 'static,
{
    async fn fetch_node(&self, hash: &NodeHash) -> Result<Node, FetchError> {
        let bytes = self
            .backend
            .get(hash)
            .await
            .map_err(|error| {
                let error: canopy_storage::CanopyStorageError = error.into();
                FetchError::Failed(format!("{error}"))
            })?
            .ok_or_else(|| FetchError::NotFound(hash.short()))?;

        Node::decode(&bytes).map_err(|error| FetchError::Failed(format!("{error}")))
    }
}

/// An in-memory [`NodeFetcher`] holding whole nodes.
///
/// Doubles as the remote-replica emulator in tests: nodes are registered
/// directly, and individual hashes can be primed to fail so that
/// partial-failure behavior can be exercised deterministically.
#[derive(Clone, Default)]
pub struct MemoryNodeFetcher {
    nodes: Arc<SharedCell<HashMap<NodeHash, Node>>>,
    failures: Arc<SharedCell<HashMap<NodeHash, FetchError>>>,
}

impl MemoryNodeFetcher {
    /// Register a node so it can be fetched by hash.
    pub fn insert_node(&self, node: Node) -> NodeHash {
        let hash = node.hash();
        self.nodes.write().insert(hash, node);
        hash
    }

    /// Prime the given hash to fail with `error` instead of resolving.
    pub fn fail_hash(&self, hash: NodeHash, error: FetchError) {
        self.failures.write().insert(hash, error);
    }

    /// Remove a primed failure, letting the hash resolve again.
    pub fn heal_hash(&self, hash: &NodeHash) {
        self.failures.write().remove(hash);
    }

    /// The number of registered nodes.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl NodeFetcher for MemoryNodeFetcher {
    async fn fetch_node(&self, hash: &NodeHash) -> Result<Node, FetchError> {
        if let Some(error) = self.failures.read().get(hash) {
            return Err(error.clone());
        }
        self.nodes
            .read()
            .get(hash)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(hash.short()))
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use canopy_storage::MemoryStorageBackend;
    use nonempty::NonEmpty;

    use super::{BackendFetcher, FetchError, MemoryNodeFetcher, NodeFetcher};
    use crate::{Element, Name, Node};

    fn leaf(name: &str) -> Node {
        Node::from_elements(NonEmpty::singleton(Element::Leaf(Name::from_components([
            name,
        ]))))
        .unwrap()
    }

    #[cfg(all(target_arch = "wasm32", target_os = "unknown"))]
    use wasm_bindgen_test::wasm_bindgen_test;

    #[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn it_fetches_stored_nodes_from_a_backend() -> Result<()> {
        let mut fetcher = BackendFetcher::new(MemoryStorageBackend::default());
        let node = leaf("kept");
        let hash = fetcher.store(&node).await?;

        let fetched = fetcher.fetch_node(&hash).await?;

        assert_eq!(fetched, node);
        Ok(())
    }

    #[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn a_missing_node_is_reported_as_not_found() {
        let fetcher = BackendFetcher::new(
            MemoryStorageBackend::<canopy_storage::NodeHash, Vec<u8>>::default(),
        );

        let result = fetcher.fetch_node(&canopy_storage::NodeHash::of(b"absent")).await;

        assert!(matches!(result, Err(FetchError::NotFound(_))));
    }

    #[cfg_attr(all(target_arch = "wasm32", target_os = "unknown"), wasm_bindgen_test)]
    #[cfg_attr(not(target_arch = "wasm32"), tokio::test)]
    async fn a_primed_failure_fires_until_healed() -> Result<()> {
        let fetcher = MemoryNodeFetcher::default();
        let node = leaf("flaky");
        let hash = fetcher.insert_node(node.clone());

        fetcher.fail_hash(hash, FetchError::Timeout("primed".into()));
        assert!(matches!(
            fetcher.fetch_node(&hash).await,
            Err(FetchError::Timeout(_))
        ));

        fetcher.heal_hash(&hash);
        assert_eq!(fetcher.fetch_node(&hash).await?, node);
        Ok(())
    }
}
