// Wire-level identifiers and constants.
//
// These mirror the mission library's newtypes but live here so the protocol
// crate stays independent of it. The server converts at the boundary.

use serde::{Deserialize, Serialize};

/// Bumped whenever a message shape changes incompatibly. The server rejects
/// a `Hello` carrying any other version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Server-assigned client ID, unique for the lifetime of the server process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerId(pub u32);

/// Display metadata for a mission, sent before the heavy load begins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionInfo {
    pub mission_path: String,
    pub name: String,
    pub description: Vec<String>,
}

/// Snapshot of the server's mission session.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub mission_path: Option<String>,
    pub sequence: u64,
    pub crc: Option<u32>,
    pub running: bool,
    /// Lifecycle state name, e.g. `"Running"` or `"Pausing"`.
    pub state: String,
}
