// Messages exchanged between the dedicated server and game clients.
//
// - `ClientMessage`: client → server. A `Hello` handshake, the host-only
//   mission control requests, and a status query any client may send.
// - `ServerMessage`: server → client. The handshake answer, the per-client
//   mission lifecycle notifications, and replies to requests.
//
// The lifecycle notifications map one-to-one onto the mission library's
// `ClientSession` calls (see `waypoint_server::connection`).

use serde::{Deserialize, Serialize};

use crate::types::{MissionInfo, PlayerId, StatusReport};

/// Messages sent by a client to the server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Join the server (handshake). Must be the first message.
    Hello {
        protocol_version: u32,
        player_name: String,
        /// AI clients receive no mission info, only mission starts.
        ai_controlled: bool,
    },
    /// End the current mission and load `mission` (host only).
    LoadMission { mission: String },
    /// End the current mission without loading another (host only).
    EndMission,
    /// Rebuild the transient-object container (host only).
    ResetMission,
    /// Load the next mission in the rotation (host only).
    CycleMission,
    /// Ask for a `Status` reply.
    RequestStatus,
    /// Leaving gracefully.
    Goodbye,
}

impl ClientMessage {
    /// Whether only the host may send this message.
    pub fn is_host_only(&self) -> bool {
        matches!(
            self,
            Self::LoadMission { .. } | Self::EndMission | Self::ResetMission | Self::CycleMission
        )
    }
}

/// Messages sent by the server to a client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Handshake accepted.
    Welcome {
        client_id: PlayerId,
        /// Whether this client may issue mission control requests.
        host: bool,
        status: StatusReport,
    },
    /// Handshake rejected; the server closes the connection.
    Rejected { reason: String },
    /// Stage 1 of a mission load: what is about to be loaded.
    MissionInfo { info: MissionInfo },
    /// The mission finished loading; begin the client-side load.
    MissionStart {
        sequence: u64,
        crc: u32,
        mission_path: String,
    },
    MissionEnd,
    ResetGhosting,
    ClearPaths,
    ClearCenterPrint,
    ClearBottomPrint,
    /// A load attempt failed on the server.
    LoadFailed { mission_path: String, reason: String },
    /// Reply to `RequestStatus`, or after a host request completes.
    Status { status: StatusReport },
    /// A request was refused (not host, or the lifecycle reported an error).
    RequestDenied { reason: String },
}
