// Data-driven lifecycle configuration.
//
// All tunable lifecycle parameters live in `LifecycleConfig`, loaded from
// JSON at startup. The controller reads delays and container names from
// here rather than hard-coding them, so a deployment can lengthen the
// between-mission pause or rename the designated top-level group without a
// rebuild.
//
// Every field carries `#[serde(default)]`, so a config file only needs to
// name what it overrides. `{}` is a valid config.
//
// See also: `lifecycle.rs`, which owns a `LifecycleConfig`, and the server
// crate's `main.rs`, which layers CLI overrides on top of a loaded file.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// How the hosting process is deployed. Single-player servers never pause
/// between stage 1 and stage 2; there are no remote clients to wait for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerType {
    SinglePlayer,
    #[default]
    MultiPlayer,
}

/// Tunable parameters for the mission lifecycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Pause (ms) between distributing load info and the heavy stage-2 load,
    /// on every load except the first. Gives the transport time to deliver
    /// the mission info to remote clients.
    pub mission_load_pause_ms: u64,
    /// Delay (ms) before cycling to another mission after a mission resource
    /// loads without its top-level group.
    pub load_retry_delay_ms: u64,
    pub server_type: ServerType,
    /// Name of the scope that parents every session container. Recreated
    /// empty on every mission end.
    pub server_group_name: String,
    /// Name of the top-level container a mission resource must create.
    pub mission_group_name: String,
    /// Name of the transient-object container created after a good load.
    pub mission_cleanup_name: String,
    /// Missions the rotation policy cycles through, in order.
    pub mission_rotation: Vec<String>,
    /// Mission loaded (as the first load) when the server starts.
    pub initial_mission: Option<String>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            mission_load_pause_ms: 5000,
            load_retry_delay_ms: 3000,
            server_type: ServerType::MultiPlayer,
            server_group_name: "ServerGroup".into(),
            mission_group_name: "MissionGroup".into(),
            mission_cleanup_name: "MissionCleanup".into(),
            mission_rotation: Vec::new(),
            initial_mission: None,
        }
    }
}

impl LifecycleConfig {
    /// Parse a config from a JSON string. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a JSON config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Whether stage 2 runs in the same step as stage 1.
    pub fn skips_load_pause(&self, is_first_load: bool) -> bool {
        is_first_load || self.server_type == ServerType::SinglePlayer
    }
}
