// waypoint_protocol — wire protocol between the Waypoint dedicated server
// and game clients.
//
// Shared by `waypoint_server` and any client implementation. It has no
// dependency on the mission library; status and mission metadata travel as
// plain wire structs and the server converts at the boundary.
//
// Module overview:
// - `types.rs`:    `PlayerId`, `MissionInfo`, `StatusReport`, and
//                  `PROTOCOL_VERSION`.
// - `message.rs`:  `ClientMessage` / `ServerMessage` enums.
// - `framing.rs`:  4-byte big-endian length prefix + JSON payload over any
//                  `Read`/`Write` stream.
//
// Blocking `std::io` only; no async runtime.

pub mod framing;
pub mod message;
pub mod types;

pub use framing::{MAX_FRAME_SIZE, read_frame, recv, send, write_frame};
pub use message::{ClientMessage, ServerMessage};
pub use types::{MissionInfo, PROTOCOL_VERSION, PlayerId, StatusReport};
