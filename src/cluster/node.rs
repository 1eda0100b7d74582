//! Node resource - the control-plane record of a simulated compute node
//!
//! A Node registered by the simulator has no kubelet behind it. It carries:
//! - Identity and store-managed bookkeeping (uid, resource version)
//! - A resource profile (capacity and allocatable)
//! - A readiness condition so the scheduler under test treats it as usable

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::device_info::DEVICE_INFO_PREFIX;

/// Maximum length of any store object name (DNS-1123 subdomain)
pub const MAX_OBJECT_NAME_LEN: usize = 253;

/// Maximum node name length that still leaves room for the device metadata
/// record name derived from it
pub const MAX_NODE_NAME_LEN: usize = MAX_OBJECT_NAME_LEN - DEVICE_INFO_PREFIX.len();

static NODE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("node name pattern is valid")
});

/// A Node in the cluster store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// API version
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,

    /// Kind is always "Node"
    #[serde(default = "default_node_kind")]
    pub kind: String,

    /// Metadata about the node
    #[serde(default)]
    pub metadata: ObjectMeta,

    /// Node specification
    #[serde(default)]
    pub spec: NodeSpec,

    /// Reported node status (resource profile and conditions)
    #[serde(default)]
    pub status: NodeStatus,
}

/// Metadata shared by every stored object
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Name, unique within its collection. Empty means "generate one".
    #[serde(default)]
    pub name: String,

    /// Namespace for namespaced objects
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Store-assigned unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Optimistic-concurrency token assigned by the store
    #[serde(
        rename = "resourceVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub resource_version: Option<String>,

    /// Set by the store on create
    #[serde(
        rename = "creationTimestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub creation_timestamp: Option<DateTime<Utc>>,

    /// Labels for selection
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,

    /// Annotations for metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

/// Node specification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Cordoned nodes are skipped by the scheduler
    #[serde(default)]
    pub unschedulable: bool,

    /// Provider identifier of the backing machine, if any
    #[serde(rename = "providerID", default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

/// Status of a Node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Total resources of the node
    #[serde(default)]
    pub capacity: NodeCapacity,

    /// Resources available for scheduling
    #[serde(default)]
    pub allocatable: NodeCapacity,

    /// Detailed conditions
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

/// Resource quantities of a node. Zero means "not specified".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapacity {
    /// Number of CPU cores
    #[serde(default)]
    pub cpu: u32,

    /// Memory in bytes
    #[serde(default)]
    pub memory: u64,

    /// Maximum pods this node can run
    #[serde(default)]
    pub pods: u32,

    /// Extended resources, e.g. accelerator devices
    #[serde(default, flatten)]
    pub extended: BTreeMap<String, u64>,
}

/// A condition of a Node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCondition {
    /// Type of condition
    #[serde(rename = "type")]
    pub condition_type: NodeConditionType,

    /// Status: True, False, Unknown
    pub status: String,

    /// Last heartbeat time
    #[serde(rename = "lastHeartbeatTime")]
    pub last_heartbeat_time: DateTime<Utc>,

    /// Last transition time
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,

    /// Reason for the condition
    #[serde(default)]
    pub reason: String,

    /// Human-readable message
    #[serde(default)]
    pub message: String,
}

/// Types of node conditions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeConditionType {
    /// Node is ready to accept pods
    Ready,
    /// Node is short on memory
    MemoryPressure,
    /// Node is short on disk space
    DiskPressure,
    /// Node is short on PIDs
    PIDPressure,
    /// Network is not configured
    NetworkUnavailable,
}

/// Baseline resource profile applied to nodes registered without one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceProfile {
    pub cpu: u32,
    pub memory: u64,
    pub pods: u32,
    /// Extended resource filled in when absent (resource name, count)
    pub accelerator: Option<(String, u64)>,
}

impl Default for ResourceProfile {
    fn default() -> Self {
        Self {
            cpu: 32,
            memory: 256 * 1024 * 1024 * 1024,
            pods: 110,
            accelerator: None,
        }
    }
}

fn default_api_version() -> String {
    "v1".to_string()
}

fn default_node_kind() -> String {
    "Node".to_string()
}

impl Default for Node {
    fn default() -> Self {
        Self::new("")
    }
}

impl Node {
    /// Create a new Node with an empty resource profile
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: default_api_version(),
            kind: default_node_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                ..ObjectMeta::default()
            },
            spec: NodeSpec::default(),
            status: NodeStatus::default(),
        }
    }

    /// Set the capacity
    pub fn with_capacity(mut self, capacity: NodeCapacity) -> Self {
        self.status.capacity = capacity;
        self
    }

    /// Name of this node
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Check if node has a Ready=True condition
    pub fn is_ready(&self) -> bool {
        self.status
            .conditions
            .iter()
            .any(|c| c.condition_type == NodeConditionType::Ready && c.status == "True")
    }

    /// Fill every omitted part of the resource profile.
    ///
    /// Zero capacity fields take the profile's values, zero allocatable
    /// fields mirror capacity, and a node without conditions gets a single
    /// Ready=True condition. Values supplied by the caller are kept.
    pub fn apply_default_profile(&mut self, profile: &ResourceProfile) {
        let capacity = &mut self.status.capacity;
        if capacity.cpu == 0 {
            capacity.cpu = profile.cpu;
        }
        if capacity.memory == 0 {
            capacity.memory = profile.memory;
        }
        if capacity.pods == 0 {
            capacity.pods = profile.pods;
        }
        if let Some((resource, count)) = &profile.accelerator {
            capacity.extended.entry(resource.clone()).or_insert(*count);
        }

        let capacity = self.status.capacity.clone();
        let allocatable = &mut self.status.allocatable;
        if allocatable.cpu == 0 {
            allocatable.cpu = capacity.cpu;
        }
        if allocatable.memory == 0 {
            allocatable.memory = capacity.memory;
        }
        if allocatable.pods == 0 {
            allocatable.pods = capacity.pods;
        }
        for (resource, count) in capacity.extended {
            allocatable.extended.entry(resource).or_insert(count);
        }

        if self.status.conditions.is_empty() {
            self.status.conditions.push(NodeCondition::ready(
                true,
                "KubeletReady",
                "simulated node is posting ready status",
            ));
        }
    }
}

impl NodeCondition {
    /// Create a Ready condition
    pub fn ready(status: bool, reason: &str, message: &str) -> Self {
        let now = Utc::now();
        Self {
            condition_type: NodeConditionType::Ready,
            status: if status { "True" } else { "False" }.to_string(),
            last_heartbeat_time: now,
            last_transition_time: now,
            reason: reason.to_string(),
            message: message.to_string(),
        }
    }
}

impl NodeCapacity {
    /// Set CPU cores
    pub fn with_cpu(mut self, cores: u32) -> Self {
        self.cpu = cores;
        self
    }

    /// Set memory in GiB
    pub fn with_memory_gib(mut self, gib: u64) -> Self {
        self.memory = gib * 1024 * 1024 * 1024;
        self
    }
}

/// Check a node name against the DNS-1123 subdomain rules the store enforces,
/// leaving room for the device metadata prefix
pub fn is_valid_node_name(name: &str) -> bool {
    name.len() <= MAX_NODE_NAME_LEN && NODE_NAME_PATTERN.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> ResourceProfile {
        ResourceProfile {
            cpu: 32,
            memory: 256 * 1024 * 1024 * 1024,
            pods: 110,
            accelerator: Some(("huawei.com/Ascend910".to_string(), 8)),
        }
    }

    #[test]
    fn test_create_node() {
        let node = Node::new("node-1");

        assert_eq!(node.name(), "node-1");
        assert_eq!(node.kind, "Node");
        assert!(!node.spec.unschedulable);
        assert!(node.metadata.resource_version.is_none());
    }

    #[test]
    fn test_default_profile_on_empty_node() {
        let mut node = Node::new("node-1");
        node.apply_default_profile(&profile());

        let status = &node.status;
        assert_eq!(status.capacity.cpu, 32);
        assert_eq!(status.capacity.memory, 256 * 1024 * 1024 * 1024);
        assert_eq!(status.capacity.pods, 110);
        assert_eq!(status.capacity.extended.get("huawei.com/Ascend910"), Some(&8));
        assert_eq!(status.allocatable, status.capacity);
        assert_eq!(status.conditions.len(), 1);
        assert!(node.is_ready());
    }

    #[test]
    fn test_default_profile_keeps_caller_values() {
        let mut node = Node::new("node-1").with_capacity(NodeCapacity::default().with_cpu(8));
        node.status.conditions.push(NodeCondition::ready(false, "Booting", ""));
        node.apply_default_profile(&profile());

        assert_eq!(node.status.capacity.cpu, 8);
        assert_eq!(node.status.allocatable.cpu, 8);
        assert_eq!(node.status.capacity.pods, 110);
        assert_eq!(node.status.conditions.len(), 1);
        assert!(!node.is_ready());
    }

    #[test]
    fn test_pressure_condition_from_payload() {
        let json = r#"{
            "metadata": {"name": "node-1"},
            "status": {"conditions": [{
                "type": "MemoryPressure",
                "status": "True",
                "lastHeartbeatTime": "2024-01-01T00:00:00Z",
                "lastTransitionTime": "2024-01-01T00:00:00Z"
            }]}
        }"#;
        let mut node: Node = serde_json::from_str(json).unwrap();
        node.apply_default_profile(&profile());

        assert_eq!(node.status.conditions.len(), 1);
        assert_eq!(
            node.status.conditions[0].condition_type,
            NodeConditionType::MemoryPressure
        );
        assert!(!node.is_ready());
    }

    #[test]
    fn test_unknown_condition_type_rejected() {
        let json = r#"{"type": "Flooded", "status": "True",
            "lastHeartbeatTime": "2024-01-01T00:00:00Z",
            "lastTransitionTime": "2024-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<NodeCondition>(json).is_err());

        for kind in ["DiskPressure", "PIDPressure", "NetworkUnavailable"] {
            let json = format!(
                r#"{{"type": "{kind}", "status": "False",
                "lastHeartbeatTime": "2024-01-01T00:00:00Z",
                "lastTransitionTime": "2024-01-01T00:00:00Z"}}"#
            );
            let condition: NodeCondition = serde_json::from_str(&json).unwrap();
            assert_ne!(condition.condition_type, NodeConditionType::Ready);
        }
    }

    #[test]
    fn test_capacity_builder() {
        let cap = NodeCapacity::default()
            .with_cpu(128)
            .with_memory_gib(512);

        assert_eq!(cap.cpu, 128);
        assert_eq!(cap.memory, 512 * 1024 * 1024 * 1024);
        assert_eq!(cap.pods, 0);
    }

    #[test]
    fn test_deserialize_minimal_node() {
        let node: Node = serde_json::from_str(r#"{"metadata": {}}"#).unwrap();
        assert_eq!(node.name(), "");
        assert_eq!(node.api_version, "v1");
        assert_eq!(node.status.capacity, NodeCapacity::default());
    }

    #[test]
    fn test_extended_resources_flatten() {
        let json = r#"{"cpu": 4, "memory": 1024, "pods": 10, "huawei.com/Ascend910": 8}"#;
        let cap: NodeCapacity = serde_json::from_str(json).unwrap();
        assert_eq!(cap.cpu, 4);
        assert_eq!(cap.extended.get("huawei.com/Ascend910"), Some(&8));
    }

    #[test]
    fn test_node_name_validation() {
        assert!(is_valid_node_name("node-12345"));
        assert!(is_valid_node_name("rack1.node-a"));
        assert!(!is_valid_node_name(""));
        assert!(!is_valid_node_name("Node_1"));
        assert!(!is_valid_node_name("-node"));
        assert!(!is_valid_node_name(&"a".repeat(254)));
    }

    #[test]
    fn test_node_name_leaves_room_for_device_metadata() {
        let longest = "a".repeat(MAX_NODE_NAME_LEN);
        assert!(is_valid_node_name(&longest));
        assert_eq!(
            format!("{}{}", DEVICE_INFO_PREFIX, longest).len(),
            MAX_OBJECT_NAME_LEN
        );
        assert!(!is_valid_node_name(&"a".repeat(MAX_NODE_NAME_LEN + 1)));
    }
}
