// waypoint_server — dedicated server host for Waypoint missions.
//
// Wraps the `waypoint_mission` lifecycle behind a TCP front end speaking
// `waypoint_protocol`. Game clients connect, say `Hello`, and from then on
// receive the per-client mission notifications (mission info, mission
// start, end, ghosting reset, path clears, print clears). The first client
// in is the host and may load, end, reset, and cycle missions.
//
// Module overview:
// - `connection.rs`: `ClientConnection`, the TCP-backed `ClientSession`,
//                    plus conversions from mission types to wire types.
// - `session.rs`:    `ServerSession`: client admission, host-only request
//                    handling, and wall-clock ticks into the lifecycle.
// - `server.rs`:     Listener thread, per-client reader threads, and the
//                    `recv_timeout` main loop that owns the `ServerSession`.
//
// The server can run as the standalone `waypoint` binary (`main.rs`) or be
// embedded through `start_server`.

pub mod connection;
pub mod server;
pub mod session;

pub use server::{ServerConfig, ServerHandle, start_server};
pub use session::ServerSession;
