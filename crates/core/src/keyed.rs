use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Opaque keyed blob, e.g. stored service credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub key: String,
    pub value: Value,
    pub timestamp: i64,
}

/// Keyed application setting. `value` is an opaque scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: Value,
    pub timestamp: i64,
}

/// Setting key holding the remote authority's base URL.
pub const API_URL_SETTING: &str = "apiUrl";
