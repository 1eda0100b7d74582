//! Shared response types for the simulator API

use serde::{Deserialize, Serialize};

/// Response for listing resources
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceList<T> {
    /// API version
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Kind (e.g., "NodeList")
    pub kind: String,

    /// List of items
    pub items: Vec<T>,
}

impl<T> ResourceList<T> {
    /// Create a new resource list
    pub fn new(kind: impl Into<String>, items: Vec<T>) -> Self {
        Self {
            api_version: "v1".to_string(),
            kind: kind.into(),
            items,
        }
    }
}

/// Status of an operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStatus {
    /// Success or failure
    pub success: bool,

    /// Status message
    pub message: String,
}

impl OperationStatus {
    /// Create failure status
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}
