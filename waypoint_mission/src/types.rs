// Core ID and value types for the mission library.
//
// Lightweight newtypes shared by the container manager, scheduler, session
// record, and roster. They are compact integers, never reused within a
// process: a destroyed container's ID is never handed out again, which is
// what lets the scheduler treat "ID no longer exists" as "scope destroyed".

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handle to an object container. Allocated monotonically, never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub u64);

/// Mission sequence number. Incremented on every load attempt and used to
/// invalidate replication state and delayed callbacks from older sessions.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct MissionSequence(pub u64);

impl MissionSequence {
    /// The sequence number that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for MissionSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// CRC-32 fingerprint of a mission resource's bytes. Clients compare it
/// against their cached derived data (lighting) to decide on reuse.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MissionCrc(pub u32);

impl fmt::Display for MissionCrc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Connection-layer identifier for a client in the roster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientId(pub u32);
