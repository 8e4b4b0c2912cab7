use serde::{Deserialize, Serialize};

/// Declaration of a tool the model may call
///
/// Supplied by the caller and never modified; adapters translate it into
/// their dialect's function declaration shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Function name, unique within one request
    pub name: String,
    /// Human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}
