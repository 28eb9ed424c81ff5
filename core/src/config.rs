//! Node configuration: the `FullnodeInfo`/`NeighborsInfo` keys recognized
//! from a JSON config file. Unknown keys are ignored; missing or malformed
//! required keys fail at load time with a [`FullnodeError`].

use serde::{Deserialize, Serialize};

use crate::error::FullnodeError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FullnodeInfo {
    pub host: String,
    pub clients_listening_port: u16,
    pub neighbors_listening_port: u16,
    pub database_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NeighborsInfo {
    pub neighbor_address: String,
    pub neighbor_port: u16,
}

/// Top-level config file shape. Any key outside `FullnodeInfo`/`NeighborsInfo`
/// is ignored by `serde`'s default "unknown fields are dropped" behavior.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(rename = "FullnodeInfo")]
    pub fullnode_info: FullnodeInfo,

    #[serde(rename = "NeighborsInfo")]
    pub neighbors_info: NeighborsInfo,

    /// Number of staged transactions that triggers block formation.
    /// Not part of the on-disk schema; defaults to 1, matching the test
    /// value used throughout this crate's own test suite. Production
    /// deployments should raise this well above 1.
    #[serde(default = "default_formation_threshold")]
    pub formation_threshold: usize,
}

fn default_formation_threshold() -> usize {
    1
}

impl Config {
    /// Parses a config from a JSON string, surfacing missing/malformed
    /// required fields as a [`FullnodeError`].
    pub fn from_json(raw: &str) -> Result<Self, FullnodeError> {
        serde_json::from_str(raw).map_err(|e| FullnodeError::InvalidConfig(e.to_string()))
    }

    /// Reads and parses a config file from `path`.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, FullnodeError> {
        let path_ref = path.as_ref();
        let raw = std::fs::read_to_string(path_ref).map_err(|e| FullnodeError::ConfigIo {
            path: path_ref.display().to_string(),
            source: e,
        })?;
        Self::from_json(&raw)
    }
}
