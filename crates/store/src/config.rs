//! Store configuration.

use serde::{Deserialize, Serialize};

/// Which store implementation to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-process tree (development and tests)
    Memory,
    /// Hosted realtime database over its REST protocol
    Rest,
}

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,
    /// Database URL, e.g. `https://resqpulse-default-rtdb.firebaseio.com`
    #[serde(default)]
    pub url: String,
    /// Database secret or access token appended as `auth=`
    #[serde(default)]
    pub auth_token: Option<String>,
    /// Request timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_timeout_ms() -> u64 {
    5000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: String::new(),
            auth_token: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}
