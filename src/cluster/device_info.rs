//! Device metadata - the companion record describing a node's accelerators
//!
//! Every simulated node owns one ConfigMap-shaped record in the system
//! namespace. The device-info consumer discovers it through a fixed label and
//! reads the topology descriptor from a fixed data key, so the names below
//! are part of the wire contract and must not change.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::node::ObjectMeta;

/// Prefix of every device metadata record name
pub const DEVICE_INFO_PREFIX: &str = "mindx-dl-deviceinfo-";

/// Namespace holding device metadata records
pub const SYSTEM_NAMESPACE: &str = "kube-system";

/// Label marking a record as visible to the device-info consumer
pub const CONSUMER_LABEL_KEY: &str = "mx-consumer-cim";
pub const CONSUMER_LABEL_VALUE: &str = "true";

/// Data key holding the serialized topology descriptor
pub const DEVICE_INFO_KEY: &str = "DeviceInfoCfg";

/// Data key holding manual device separation overrides
pub const SEPARATE_DEVICE_KEY: &str = "ManuallySeparateNPU";

/// A ConfigMap-shaped device metadata record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetadata {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Kind is always "ConfigMap"
    pub kind: String,

    pub metadata: ObjectMeta,

    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

/// Shape of the simulated accelerator hardware attached to each node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceProfile {
    /// Extended resource name, e.g. "huawei.com/Ascend910"
    #[serde(default = "default_resource_name")]
    pub resource_name: String,

    /// Device id prefix, e.g. "Ascend910" gives "Ascend910-0"
    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,

    /// Devices per node
    #[serde(default = "default_device_count")]
    pub count: u32,

    #[serde(default = "default_super_pod_id")]
    pub super_pod_id: i32,

    #[serde(default)]
    pub server_index: i32,

    #[serde(default = "default_rack_id")]
    pub rack_id: i32,
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            resource_name: default_resource_name(),
            device_prefix: default_device_prefix(),
            count: default_device_count(),
            super_pod_id: default_super_pod_id(),
            server_index: 0,
            rack_id: default_rack_id(),
        }
    }
}

fn default_resource_name() -> String {
    "huawei.com/Ascend910".to_string()
}

fn default_device_prefix() -> String {
    "Ascend910".to_string()
}

fn default_device_count() -> u32 {
    8
}

fn default_super_pod_id() -> i32 {
    5
}

fn default_rack_id() -> i32 {
    6
}

/// Topology descriptor stored under [`DEVICE_INFO_KEY`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfoConfig {
    #[serde(rename = "DeviceInfo")]
    pub device_info: DeviceInfo,

    #[serde(rename = "SuperPodID")]
    pub super_pod_id: i32,

    #[serde(rename = "ServerIndex")]
    pub server_index: i32,

    #[serde(rename = "RackID")]
    pub rack_id: i32,

    #[serde(rename = "TopoCheck")]
    pub topo_check: String,

    /// SHA-256 hex digest of the serialized `DeviceInfo` object
    #[serde(rename = "CheckCode")]
    pub check_code: String,
}

/// Device list plus health sub-fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(rename = "DeviceList")]
    pub device_list: BTreeMap<String, String>,

    /// Unix seconds
    #[serde(rename = "UpdateTime")]
    pub update_time: i64,
}

/// Name of the device metadata record paired with `node_name`
pub fn device_metadata_name(node_name: &str) -> String {
    format!("{}{}", DEVICE_INFO_PREFIX, node_name)
}

impl DeviceProfile {
    /// Comma separated device ids, e.g. "Ascend910-0,Ascend910-1"
    pub fn device_ids(&self) -> String {
        (0..self.count)
            .map(|i| format!("{}-{}", self.device_prefix, i))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Build a healthy topology descriptor stamped with the current time
    pub fn descriptor(&self) -> DeviceInfoConfig {
        let resource = &self.resource_name;
        let mut device_list = BTreeMap::new();
        device_list.insert(resource.clone(), self.device_ids());
        device_list.insert(format!("{}-Fault", resource), "[]".to_string());
        device_list.insert(format!("{}-NetworkUnhealthy", resource), String::new());
        device_list.insert(format!("{}-Recovering", resource), String::new());
        device_list.insert(format!("{}-Unhealthy", resource), String::new());

        let device_info = DeviceInfo {
            device_list,
            update_time: Utc::now().timestamp(),
        };

        DeviceInfoConfig {
            check_code: device_info.check_code(),
            device_info,
            super_pod_id: self.super_pod_id,
            server_index: self.server_index,
            rack_id: self.rack_id,
            topo_check: "OK".to_string(),
        }
    }
}

impl DeviceInfo {
    /// SHA-256 over the JSON encoding of this object
    pub fn check_code(&self) -> String {
        // Serializing a struct of strings and integers cannot fail.
        let encoded = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&encoded);
        format!("{:x}", digest)
    }
}

impl DeviceMetadata {
    /// Build the record paired with `node_name`
    pub fn for_node(node_name: &str, profile: &DeviceProfile) -> Self {
        let mut metadata = ObjectMeta {
            name: device_metadata_name(node_name),
            namespace: Some(SYSTEM_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        };
        metadata
            .labels
            .insert(CONSUMER_LABEL_KEY.to_string(), CONSUMER_LABEL_VALUE.to_string());

        // Serializing the descriptor cannot fail: all keys are strings.
        let descriptor = serde_json::to_string(&profile.descriptor()).unwrap_or_default();

        let mut data = BTreeMap::new();
        data.insert(DEVICE_INFO_KEY.to_string(), descriptor);
        data.insert(SEPARATE_DEVICE_KEY.to_string(), String::new());

        Self {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
            metadata,
            data,
        }
    }

    /// Namespace of this record, defaulting to the system namespace
    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or(SYSTEM_NAMESPACE)
    }

    /// Decode the stored topology descriptor
    pub fn descriptor(&self) -> Option<DeviceInfoConfig> {
        self.data
            .get(DEVICE_INFO_KEY)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_naming() {
        let record = DeviceMetadata::for_node("node-12345", &DeviceProfile::default());

        assert_eq!(record.metadata.name, "mindx-dl-deviceinfo-node-12345");
        assert_eq!(record.namespace(), "kube-system");
        assert_eq!(
            record.metadata.labels.get("mx-consumer-cim"),
            Some(&"true".to_string())
        );
        assert_eq!(record.data.get("ManuallySeparateNPU"), Some(&String::new()));
        assert_eq!(record.kind, "ConfigMap");
    }

    #[test]
    fn test_descriptor_device_list() {
        let record = DeviceMetadata::for_node("n1", &DeviceProfile::default());
        let descriptor = record.descriptor().expect("descriptor decodes");
        let list = &descriptor.device_info.device_list;

        assert_eq!(
            list.get("huawei.com/Ascend910").map(String::as_str),
            Some("Ascend910-0,Ascend910-1,Ascend910-2,Ascend910-3,Ascend910-4,Ascend910-5,Ascend910-6,Ascend910-7")
        );
        assert_eq!(list.get("huawei.com/Ascend910-Fault").map(String::as_str), Some("[]"));
        assert_eq!(list.get("huawei.com/Ascend910-Unhealthy").map(String::as_str), Some(""));
        assert_eq!(list.len(), 5);
        assert_eq!(descriptor.super_pod_id, 5);
        assert_eq!(descriptor.rack_id, 6);
        assert_eq!(descriptor.topo_check, "OK");
    }

    #[test]
    fn test_descriptor_wire_keys() {
        let record = DeviceMetadata::for_node("n1", &DeviceProfile::default());
        let raw: serde_json::Value =
            serde_json::from_str(record.data.get(DEVICE_INFO_KEY).unwrap()).unwrap();

        assert!(raw["DeviceInfo"]["DeviceList"].is_object());
        assert!(raw["DeviceInfo"]["UpdateTime"].is_i64());
        assert!(raw["SuperPodID"].is_i64());
        assert!(raw["ServerIndex"].is_i64());
        assert!(raw["RackID"].is_i64());
        assert!(raw["CheckCode"].is_string());
    }

    #[test]
    fn test_check_code_matches_device_info() {
        let descriptor = DeviceProfile::default().descriptor();
        let expected = format!(
            "{:x}",
            Sha256::digest(serde_json::to_vec(&descriptor.device_info).unwrap())
        );

        assert_eq!(descriptor.check_code, expected);
        assert_eq!(descriptor.check_code.len(), 64);
    }

    #[test]
    fn test_custom_profile() {
        let profile = DeviceProfile {
            resource_name: "vendor.io/npu".to_string(),
            device_prefix: "npu".to_string(),
            count: 2,
            ..DeviceProfile::default()
        };

        assert_eq!(profile.device_ids(), "npu-0,npu-1");
        let descriptor = profile.descriptor();
        assert!(descriptor
            .device_info
            .device_list
            .contains_key("vendor.io/npu-Recovering"));
    }
}
