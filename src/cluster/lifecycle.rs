//! Node lifecycle - paired create/update/delete of nodes and device metadata
//!
//! A simulated node is two store objects: the [`Node`] record and its
//! [`DeviceMetadata`] companion. The store only makes single calls atomic, so
//! this service sequences the calls and repairs partial failures:
//!
//! - create: node first, then device metadata; a failed or cancelled
//!   metadata create deletes the node again so no node exists without its
//!   companion
//! - update: only the node record changes, carrying the stored resource
//!   version and uid forward
//! - delete: device metadata cleanup is best effort, the node delete decides
//!   the outcome
//!
//! Every store call is raced against the caller's cancellation token. No
//! call is retried.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::device_info::{device_metadata_name, DeviceMetadata, DeviceProfile, SYSTEM_NAMESPACE};
use super::identity::{NameGenerator, RandomNameGenerator};
use super::node::{Node, ResourceProfile};
use super::store::{ClusterStore, StoreError, StoreResult};
use crate::metrics::LifecycleMetrics;

/// The store call a lifecycle operation was executing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    LookupNode,
    CreateNode,
    CreateDeviceMetadata,
    UpdateNode,
    DeleteDeviceMetadata,
    DeleteNode,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let step = match self {
            Step::LookupNode => "look up node",
            Step::CreateNode => "create node",
            Step::CreateDeviceMetadata => "create device metadata",
            Step::UpdateNode => "update node",
            Step::DeleteDeviceMetadata => "delete device metadata",
            Step::DeleteNode => "delete node",
        };
        f.write_str(step)
    }
}

/// Errors returned by lifecycle operations
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("node '{name}': failed to {step}: {source}")]
    Store {
        name: String,
        step: Step,
        #[source]
        source: StoreError,
    },

    /// `source` is `None` when the metadata create was cancelled rather than
    /// refused by the store
    #[error(
        "node '{name}': device metadata not created ({}) and rollback failed \
         ({rollback}); node record left without device metadata",
        describe_cause(.source)
    )]
    CompensationFailed {
        name: String,
        #[source]
        source: Option<StoreError>,
        rollback: StoreError,
    },

    #[error("node '{name}': cancelled during {step}")]
    Cancelled { name: String, step: Step },
}

fn describe_cause(source: &Option<StoreError>) -> String {
    match source {
        Some(e) => e.to_string(),
        None => "cancelled".to_string(),
    }
}

impl LifecycleError {
    /// Node the failed operation targeted
    pub fn node_name(&self) -> &str {
        match self {
            LifecycleError::Store { name, .. }
            | LifecycleError::CompensationFailed { name, .. }
            | LifecycleError::Cancelled { name, .. } => name,
        }
    }

    /// Step that failed. A failed rollback is reported as the metadata create.
    pub fn step(&self) -> Step {
        match self {
            LifecycleError::Store { step, .. } | LifecycleError::Cancelled { step, .. } => *step,
            LifecycleError::CompensationFailed { .. } => Step::CreateDeviceMetadata,
        }
    }

    /// Underlying store error, if the failure came from the store
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            LifecycleError::Store { source, .. } => Some(source),
            LifecycleError::CompensationFailed { source, .. } => source.as_ref(),
            LifecycleError::Cancelled { .. } => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LifecycleError::Store { source, .. } if source.is_not_found())
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, LifecycleError::Store { source, .. } if source.is_already_exists())
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LifecycleError::Store { source, .. } if source.is_conflict())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, LifecycleError::Cancelled { .. })
    }
}

/// Registers, updates, and removes simulated nodes
pub struct NodeLifecycleService {
    store: Arc<dyn ClusterStore>,
    names: Arc<dyn NameGenerator>,
    profile: ResourceProfile,
    devices: DeviceProfile,
    metrics: Arc<LifecycleMetrics>,
}

impl NodeLifecycleService {
    /// Create a service with random names and the default profiles
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        let devices = DeviceProfile::default();
        let profile = ResourceProfile {
            accelerator: Some((devices.resource_name.clone(), u64::from(devices.count))),
            ..ResourceProfile::default()
        };
        Self {
            store,
            names: Arc::new(RandomNameGenerator),
            profile,
            devices,
            metrics: Arc::new(LifecycleMetrics::new()),
        }
    }

    /// Use a different name source
    pub fn with_name_generator(mut self, names: Arc<dyn NameGenerator>) -> Self {
        self.names = names;
        self
    }

    /// Replace the baseline resource profile
    pub fn with_resource_profile(mut self, profile: ResourceProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Replace the simulated device profile
    pub fn with_device_profile(mut self, devices: DeviceProfile) -> Self {
        self.devices = devices;
        self
    }

    /// Report into a shared metrics collector
    pub fn with_metrics(mut self, metrics: Arc<LifecycleMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn store(&self) -> &Arc<dyn ClusterStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<LifecycleMetrics> {
        &self.metrics
    }

    /// Register a node, or update it if a node with that name exists.
    ///
    /// An empty name is replaced by a generated one. Returns the node as
    /// stored.
    pub async fn add_node(
        &self,
        cancel: &CancellationToken,
        mut node: Node,
    ) -> Result<Node, LifecycleError> {
        let name = self.ensure_node_name(&mut node);
        node.apply_default_profile(&self.profile);

        let lookup = self
            .guarded(cancel, &name, Step::LookupNode, self.store.get_node(&name))
            .await;
        match lookup {
            Ok(existing) => self.update_node(cancel, node, existing).await,
            Err(e) if e.is_not_found() => self.create_node_and_metadata(cancel, node).await,
            Err(e) => Err(e),
        }
    }

    /// Remove a node and, best effort, its device metadata
    pub async fn delete_node(
        &self,
        cancel: &CancellationToken,
        name: &str,
    ) -> Result<(), LifecycleError> {
        self.guarded(cancel, name, Step::LookupNode, self.store.get_node(name))
            .await?;

        let record_name = device_metadata_name(name);
        let cleanup = self
            .guarded(
                cancel,
                name,
                Step::DeleteDeviceMetadata,
                self.store
                    .delete_device_metadata(SYSTEM_NAMESPACE, &record_name),
            )
            .await;
        match cleanup {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                self.metrics.record_cleanup_failure();
                warn!(node = %name, record = %record_name, error = %e, "device metadata cleanup failed");
            }
        }

        self.guarded(cancel, name, Step::DeleteNode, self.store.delete_node(name))
            .await?;
        self.metrics.record_deleted();
        info!(node = %name, "node deleted");
        Ok(())
    }

    fn ensure_node_name(&self, node: &mut Node) -> String {
        if node.metadata.name.is_empty() {
            node.metadata.name = self.names.generate();
            debug!(node = %node.metadata.name, "generated node name");
        }
        node.metadata.name.clone()
    }

    async fn create_node_and_metadata(
        &self,
        cancel: &CancellationToken,
        node: Node,
    ) -> Result<Node, LifecycleError> {
        let name = node.metadata.name.clone();
        let created = self
            .guarded(cancel, &name, Step::CreateNode, self.store.create_node(node))
            .await?;

        let record = DeviceMetadata::for_node(&name, &self.devices);
        let companion = self
            .guarded(
                cancel,
                &name,
                Step::CreateDeviceMetadata,
                self.store.create_device_metadata(record),
            )
            .await;
        match companion {
            Ok(_) => {
                self.metrics.record_created();
                info!(node = %name, ready = created.is_ready(), "node registered");
                Ok(created)
            }
            Err(e) => Err(self.roll_back(&name, e).await),
        }
    }

    /// Undo a node create whose device metadata was not created.
    ///
    /// Runs even if the caller has been cancelled: the node record exists
    /// and must not be left without its companion. On success the original
    /// failure is returned unchanged.
    async fn roll_back(&self, name: &str, cause: LifecycleError) -> LifecycleError {
        match self.store.delete_node(name).await {
            Ok(()) => {
                self.metrics.record_rollback();
                warn!(node = %name, error = %cause, "device metadata not created, node record rolled back");
                cause
            }
            Err(rollback) => {
                self.metrics.record_compensation_failure();
                error!(node = %name, error = %cause, rollback_error = %rollback, "rollback failed, node record orphaned");
                LifecycleError::CompensationFailed {
                    name: name.to_string(),
                    source: cause.store_error().cloned(),
                    rollback,
                }
            }
        }
    }

    async fn update_node(
        &self,
        cancel: &CancellationToken,
        mut node: Node,
        existing: Node,
    ) -> Result<Node, LifecycleError> {
        let name = node.metadata.name.clone();
        node.metadata.resource_version = existing.metadata.resource_version;
        node.metadata.uid = existing.metadata.uid;

        let updated = self
            .guarded(cancel, &name, Step::UpdateNode, self.store.update_node(node))
            .await?;
        self.metrics.record_updated();
        info!(node = %name, version = ?updated.metadata.resource_version, "node updated");
        Ok(updated)
    }

    /// Await a store call unless the token fires first
    async fn guarded<T, F>(
        &self,
        cancel: &CancellationToken,
        name: &str,
        step: Step,
        call: F,
    ) -> Result<T, LifecycleError>
    where
        F: Future<Output = StoreResult<T>>,
    {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                self.metrics.record_cancellation();
                debug!(node = %name, %step, "operation cancelled");
                Err(LifecycleError::Cancelled {
                    name: name.to_string(),
                    step,
                })
            }
            result = call => result.map_err(|source| LifecycleError::Store {
                name: name.to_string(),
                step,
                source,
            }),
        }
    }
}
