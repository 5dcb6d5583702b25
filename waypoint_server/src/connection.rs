// One connected client, as the mission lifecycle sees it.
//
// `ClientConnection` implements the mission library's `ClientSession` by
// writing framed `ServerMessage`s to the client's stream. Only the server's
// main thread holds connections, so writes never race the reader thread,
// which owns a separate clone of the socket.
//
// A failed write is logged and otherwise ignored. The lifecycle treats
// client calls as fire-and-forget; the reader thread for a dead client
// notices the broken socket and reports the disconnect.
//
// The writer is generic so tests can capture frames in a `Vec<u8>`.

use std::io::{BufWriter, Write};
use std::net::TcpStream;

use tracing::warn;
use waypoint_mission::{ClientId, ClientSession, LoadInfo, MissionStart, SessionStatus};
use waypoint_protocol::{MissionInfo, PlayerId, ServerMessage, StatusReport, send};

/// A connected client and the write half of its stream.
pub struct ClientConnection<W: Write = BufWriter<TcpStream>> {
    id: ClientId,
    name: String,
    ai_controlled: bool,
    writer: W,
}

impl<W: Write> ClientConnection<W> {
    pub fn new(id: ClientId, name: String, ai_controlled: bool, writer: W) -> Self {
        Self {
            id,
            name,
            ai_controlled,
            writer,
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Frame and write one message. Errors are logged, not returned.
    pub fn send(&mut self, message: &ServerMessage) {
        if let Err(err) = send(&mut self.writer, message) {
            warn!("write to client {} ({}) failed: {err}", self.id.0, self.name);
        }
    }
}

impl<W: Write> ClientSession for ClientConnection<W> {
    fn is_ai_controlled(&self) -> bool {
        self.ai_controlled
    }

    fn send_load_info(&mut self, info: &LoadInfo) {
        self.send(&ServerMessage::MissionInfo {
            info: mission_info(info),
        });
    }

    fn load_mission(&mut self, start: &MissionStart) {
        self.send(&ServerMessage::MissionStart {
            sequence: start.sequence.0,
            crc: start.crc.0,
            mission_path: start.mission_path.clone(),
        });
    }

    fn end_mission(&mut self) {
        self.send(&ServerMessage::MissionEnd);
    }

    fn reset_ghosting(&mut self) {
        self.send(&ServerMessage::ResetGhosting);
    }

    fn clear_paths(&mut self) {
        self.send(&ServerMessage::ClearPaths);
    }

    fn clear_center_print(&mut self) {
        self.send(&ServerMessage::ClearCenterPrint);
    }

    fn clear_bottom_print(&mut self) {
        self.send(&ServerMessage::ClearBottomPrint);
    }
}

pub fn player_id(id: ClientId) -> PlayerId {
    PlayerId(id.0)
}

pub fn mission_info(info: &LoadInfo) -> MissionInfo {
    MissionInfo {
        mission_path: info.mission_path.clone(),
        name: info.name.clone(),
        description: info.description.clone(),
    }
}

pub fn status_report(status: &SessionStatus) -> StatusReport {
    StatusReport {
        mission_path: status.mission_path.clone(),
        sequence: status.sequence.0,
        crc: status.crc.map(|crc| crc.0),
        running: status.running,
        state: format!("{:?}", status.state),
    }
}
