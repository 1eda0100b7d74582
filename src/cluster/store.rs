//! Cluster store - the object store nodes and device metadata live in
//!
//! [`ClusterStore`] is the capability set the lifecycle service consumes.
//! [`MemoryStore`] implements it in process with the semantics of a real
//! control-plane store: create never overwrites, update requires the current
//! resource version, and every single call is atomic per key.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::device_info::DeviceMetadata;
use super::node::Node;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by a cluster store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: &'static str, name: String },

    #[error("conflict updating {kind} '{name}': {reason}")]
    Conflict {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

pub(crate) const NODE_KIND: &str = "node";
pub(crate) const DEVICE_METADATA_KIND: &str = "configmap";

/// Operations the lifecycle service needs from the cluster store
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get_node(&self, name: &str) -> StoreResult<Node>;

    async fn list_nodes(&self) -> StoreResult<Vec<Node>>;

    /// Fails with `AlreadyExists` if the name is taken
    async fn create_node(&self, node: Node) -> StoreResult<Node>;

    /// Fails with `Conflict` unless `node` carries the current resource version
    async fn update_node(&self, node: Node) -> StoreResult<Node>;

    async fn delete_node(&self, name: &str) -> StoreResult<()>;

    async fn get_device_metadata(&self, namespace: &str, name: &str)
        -> StoreResult<DeviceMetadata>;

    async fn create_device_metadata(&self, record: DeviceMetadata) -> StoreResult<DeviceMetadata>;

    async fn delete_device_metadata(&self, namespace: &str, name: &str) -> StoreResult<()>;
}

/// In-process cluster store
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Nodes indexed by name
    nodes: DashMap<String, Node>,

    /// Device metadata indexed by "namespace/name"
    device_metadata: DashMap<String, DeviceMetadata>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn device_metadata_count(&self) -> usize {
        self.device_metadata.len()
    }
}

fn qualified_name(namespace: &str, name: &str) -> String {
    format!("{}/{}", namespace, name)
}

fn next_version(current: Option<&str>) -> String {
    let current: u64 = current.and_then(|v| v.parse().ok()).unwrap_or(0);
    (current + 1).to_string()
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_node(&self, name: &str) -> StoreResult<Node> {
        self.nodes
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: NODE_KIND,
                name: name.to_string(),
            })
    }

    async fn list_nodes(&self) -> StoreResult<Vec<Node>> {
        let mut nodes: Vec<Node> = self.nodes.iter().map(|r| r.clone()).collect();
        nodes.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(nodes)
    }

    async fn create_node(&self, mut node: Node) -> StoreResult<Node> {
        match self.nodes.entry(node.metadata.name.clone()) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists {
                kind: NODE_KIND,
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                node.metadata.uid = Some(Uuid::new_v4().to_string());
                node.metadata.resource_version = Some(next_version(None));
                node.metadata.creation_timestamp = Some(Utc::now());
                entry.insert(node.clone());
                debug!(node = %node.metadata.name, "node created");
                Ok(node)
            }
        }
    }

    async fn update_node(&self, mut node: Node) -> StoreResult<Node> {
        let name = node.metadata.name.clone();
        let mut stored = self.nodes.get_mut(&name).ok_or_else(|| StoreError::NotFound {
            kind: NODE_KIND,
            name: name.clone(),
        })?;

        if node.metadata.resource_version != stored.metadata.resource_version {
            return Err(StoreError::Conflict {
                kind: NODE_KIND,
                name,
                reason: format!(
                    "resource version {:?} does not match current {:?}",
                    node.metadata.resource_version, stored.metadata.resource_version
                ),
            });
        }
        if node.metadata.uid.is_some() && node.metadata.uid != stored.metadata.uid {
            return Err(StoreError::Conflict {
                kind: NODE_KIND,
                name,
                reason: "uid precondition failed".to_string(),
            });
        }

        node.metadata.uid = stored.metadata.uid.clone();
        node.metadata.creation_timestamp = stored.metadata.creation_timestamp;
        node.metadata.resource_version =
            Some(next_version(stored.metadata.resource_version.as_deref()));
        *stored = node.clone();
        debug!(node = %name, version = ?node.metadata.resource_version, "node updated");
        Ok(node)
    }

    async fn delete_node(&self, name: &str) -> StoreResult<()> {
        self.nodes
            .remove(name)
            .map(|_| debug!(node = %name, "node deleted"))
            .ok_or_else(|| StoreError::NotFound {
                kind: NODE_KIND,
                name: name.to_string(),
            })
    }

    async fn get_device_metadata(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<DeviceMetadata> {
        self.device_metadata
            .get(&qualified_name(namespace, name))
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound {
                kind: DEVICE_METADATA_KIND,
                name: qualified_name(namespace, name),
            })
    }

    async fn create_device_metadata(
        &self,
        mut record: DeviceMetadata,
    ) -> StoreResult<DeviceMetadata> {
        let key = qualified_name(record.namespace(), &record.metadata.name);
        match self.device_metadata.entry(key) {
            Entry::Occupied(entry) => Err(StoreError::AlreadyExists {
                kind: DEVICE_METADATA_KIND,
                name: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                record.metadata.uid = Some(Uuid::new_v4().to_string());
                record.metadata.resource_version = Some(next_version(None));
                record.metadata.creation_timestamp = Some(Utc::now());
                debug!(record = %entry.key(), "device metadata created");
                entry.insert(record.clone());
                Ok(record)
            }
        }
    }

    async fn delete_device_metadata(&self, namespace: &str, name: &str) -> StoreResult<()> {
        let key = qualified_name(namespace, name);
        self.device_metadata
            .remove(&key)
            .map(|_| debug!(record = %key, "device metadata deleted"))
            .ok_or(StoreError::NotFound {
                kind: DEVICE_METADATA_KIND,
                name: key,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::device_info::{DeviceProfile, SYSTEM_NAMESPACE};

    #[tokio::test]
    async fn test_create_assigns_store_fields() {
        let store = MemoryStore::new();
        let created = store.create_node(Node::new("node-1")).await.unwrap();

        assert!(created.metadata.uid.is_some());
        assert_eq!(created.metadata.resource_version.as_deref(), Some("1"));
        assert!(created.metadata.creation_timestamp.is_some());
        assert_eq!(store.get_node("node-1").await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let store = MemoryStore::new();
        store.create_node(Node::new("node-1")).await.unwrap();

        let result = store.create_node(Node::new("node-1")).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists { .. })));
        assert_eq!(store.node_count(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_current_version() {
        let store = MemoryStore::new();
        let created = store.create_node(Node::new("node-1")).await.unwrap();

        let stale = Node::new("node-1");
        let result = store.update_node(stale).await;
        assert!(result.unwrap_err().is_conflict());

        let updated = store.update_node(created.clone()).await.unwrap();
        assert_eq!(updated.metadata.resource_version.as_deref(), Some("2"));
        assert_eq!(updated.metadata.uid, created.metadata.uid);

        // The version consumed by the first update is now stale
        let result = store.update_node(created).await;
        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_update_uid_mismatch() {
        let store = MemoryStore::new();
        let mut created = store.create_node(Node::new("node-1")).await.unwrap();
        created.metadata.uid = Some("someone-else".to_string());

        let result = store.update_node(created).await;
        assert!(result.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_update_missing_node() {
        let store = MemoryStore::new();
        let result = store.update_node(Node::new("ghost")).await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_delete_node() {
        let store = MemoryStore::new();
        store.create_node(Node::new("node-1")).await.unwrap();

        store.delete_node("node-1").await.unwrap();
        assert!(store.get_node("node-1").await.unwrap_err().is_not_found());
        assert!(store.delete_node("node-1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_device_metadata_round_trip() {
        let store = MemoryStore::new();
        let record = DeviceMetadata::for_node("node-1", &DeviceProfile::default());
        let name = record.metadata.name.clone();

        store.create_device_metadata(record.clone()).await.unwrap();
        let again = store.create_device_metadata(record).await;
        assert!(again.unwrap_err().is_already_exists());

        let stored = store
            .get_device_metadata(SYSTEM_NAMESPACE, &name)
            .await
            .unwrap();
        assert_eq!(stored.metadata.resource_version.as_deref(), Some("1"));

        store
            .delete_device_metadata(SYSTEM_NAMESPACE, &name)
            .await
            .unwrap();
        assert_eq!(store.device_metadata_count(), 0);
    }

    #[tokio::test]
    async fn test_list_nodes_sorted() {
        let store = MemoryStore::new();
        store.create_node(Node::new("node-b")).await.unwrap();
        store.create_node(Node::new("node-a")).await.unwrap();

        let names: Vec<String> = store
            .list_nodes()
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.metadata.name)
            .collect();
        assert_eq!(names, vec!["node-a", "node-b"]);
    }
}
