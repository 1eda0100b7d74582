//! # Simulated Node Lifecycle
//!
//! Registers synthetic compute nodes into a cluster store so a scheduler
//! under test can place workloads on machines that do not exist. Each node is
//! a pair of store objects:
//!
//! - **Node**: capacity, allocatable resources, and a Ready condition
//! - **Device metadata**: a ConfigMap in `kube-system` describing the node's
//!   simulated accelerators, read by the device-info consumer
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────────────┐     ┌────────────────┐
//! │ HTTP handler │────▶│  NodeLifecycleService  │────▶│  ClusterStore  │
//! │  (server)    │     │  create / update /     │     │  nodes         │
//! └──────────────┘     │  delete + rollback     │     │  configmaps    │
//!                      └───────────┬────────────┘     └────────────────┘
//!                                  │
//!                          ┌───────┴────────┐
//!                          │ NameGenerator  │
//!                          └────────────────┘
//! ```
//!
//! The store only guarantees atomicity of single calls. The lifecycle
//! service keeps the pair consistent: a node whose device metadata cannot be
//! created is deleted again, while device metadata that cannot be deleted is
//! tolerated as a leak.

pub mod device_info;
pub mod identity;
pub mod lifecycle;
pub mod node;
pub mod resources;
pub mod store;

pub use device_info::{
    device_metadata_name, DeviceInfo, DeviceInfoConfig, DeviceMetadata, DeviceProfile,
    CONSUMER_LABEL_KEY, CONSUMER_LABEL_VALUE, DEVICE_INFO_KEY, DEVICE_INFO_PREFIX,
    SEPARATE_DEVICE_KEY, SYSTEM_NAMESPACE,
};
pub use identity::{NameGenerator, RandomNameGenerator};
pub use lifecycle::{LifecycleError, NodeLifecycleService, Step};
pub use node::{
    is_valid_node_name, Node, NodeCapacity, NodeCondition, NodeConditionType, NodeSpec,
    NodeStatus, ObjectMeta, ResourceProfile,
};
pub use resources::{OperationStatus, ResourceList};
pub use store::{ClusterStore, MemoryStore, StoreError, StoreResult};
