// The session record: what mission is active and how far along it is.
//
// `Session` is owned and mutated exclusively by `MissionLifecycle`. Outside
// code gets read-only access (hooks receive `&Session`; hosts call
// `MissionLifecycle::session()` or take a `SessionStatus` snapshot).
//
// "Is a mission loaded?" is answered by `Session::loaded`, an explicit
// `Option<LoadedMission>` holding the primary and cleanup container IDs,
// not by probing the container manager for a well-known name.
//
// State machine:
//
//   Idle → Ending → LoadingStage1 → Pausing → LoadingStage2 → Running
//                                \___________/       |
//                        (first load / single-player) `→ RetryScheduled
//
// `Running → Ending` is the only way out of a running mission. `Ending`
// falls back to `Idle` once teardown completes. A missing resource in
// stage 2 also lands in `Idle`.

use serde::{Deserialize, Serialize};

use crate::resource::LoadInfo;
use crate::types::{ContainerId, MissionCrc, MissionSequence};

/// Where the lifecycle currently is.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleState {
    #[default]
    Idle,
    Ending,
    LoadingStage1,
    /// Waiting for the scheduled stage-2 event.
    Pausing,
    LoadingStage2,
    Running,
    /// A corrupt load was reported; a mission cycle is scheduled.
    RetryScheduled,
}

/// Container handles for a successfully loaded mission.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoadedMission {
    /// The mission's top-level group (primary container).
    pub mission_group: ContainerId,
    /// Transient objects; a sibling of `mission_group` under the server
    /// scope, never a child of it.
    pub cleanup: ContainerId,
}

/// The active mission session.
#[derive(Clone, Debug, Default)]
pub struct Session {
    pub(crate) mission_path: Option<String>,
    pub(crate) sequence: MissionSequence,
    pub(crate) crc: Option<MissionCrc>,
    pub(crate) running: bool,
    pub(crate) state: LifecycleState,
    pub(crate) load_info: Option<LoadInfo>,
    pub(crate) loaded: Option<LoadedMission>,
}

impl Session {
    /// Path of the mission most recently requested.
    pub fn mission_path(&self) -> Option<&str> {
        self.mission_path.as_deref()
    }

    pub fn sequence(&self) -> MissionSequence {
        self.sequence
    }

    /// Fingerprint of the mission, once stage 2 has computed it.
    pub fn crc(&self) -> Option<MissionCrc> {
        self.crc
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Load info distributed in the most recent stage 1.
    pub fn load_info(&self) -> Option<&LoadInfo> {
        self.load_info.as_ref()
    }

    pub fn loaded(&self) -> Option<LoadedMission> {
        self.loaded
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            mission_path: self.mission_path.clone(),
            sequence: self.sequence,
            crc: self.crc,
            running: self.running,
            state: self.state,
        }
    }
}

/// Serializable snapshot of the session for telemetry and status replies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub mission_path: Option<String>,
    pub sequence: MissionSequence,
    pub crc: Option<MissionCrc>,
    pub running: bool,
    pub state: LifecycleState,
}
