// Server-side session: the connected clients plus the mission lifecycle.
//
// `ServerSession` is what the server's main loop drives. It owns the
// `MissionLifecycle` and the join-ordered `ClientGroup` of connections, and
// lends the roster to every lifecycle operation. All mutation happens on the
// main thread; there is no locking.
//
// Responsibilities:
// - Client admission: protocol version check, capacity check, ID
//   assignment, host selection (first client in; the next oldest client if
//   the host leaves). New clients are caught up on the current mission.
// - Request handling: host-only mission control (`LoadMission`,
//   `EndMission`, `ResetMission`, `CycleMission`), status queries for all.
// - Time: `tick(now_ms)` forwards the wall clock to `advance_to`, which
//   fires paused stage-2 loads and corrupt-mission retries. Requests carry
//   their arrival time and catch the clock up first, so any delay they
//   schedule starts at the moment they arrived.
// - Reporting: handled load failures are broadcast as `LoadFailed`;
//   propagated lifecycle errors are logged and, for requests, answered with
//   `RequestDenied`. A propagated error that abandoned a load is broadcast
//   as `LoadFailed` too.

use std::io::Write;

use tracing::{debug, error, info, warn};
use waypoint_mission::{
    ClientGroup, ClientId, LifecycleConfig, LifecycleError, LifecycleEventKind, LifecycleState,
    MissionLifecycle, MissionResources, MissionStore, NoHooks, StepResult,
};
use waypoint_protocol::{ClientMessage, PROTOCOL_VERSION, ServerMessage};

use crate::connection::{ClientConnection, player_id, status_report};

/// Mission lifecycle plus the clients it serves.
pub struct ServerSession<W: Write, S: MissionResources = MissionStore> {
    lifecycle: MissionLifecycle<S, NoHooks>,
    clients: ClientGroup<ClientConnection<W>>,
    host: Option<ClientId>,
    next_client_id: u32,
    max_clients: usize,
}

impl<W: Write, S: MissionResources> ServerSession<W, S> {
    pub fn new(config: LifecycleConfig, resources: S, max_clients: usize) -> Self {
        Self {
            lifecycle: MissionLifecycle::new(config, resources, NoHooks),
            clients: ClientGroup::new(),
            host: None,
            next_client_id: 1,
            max_clients,
        }
    }

    pub fn lifecycle(&self) -> &MissionLifecycle<S, NoHooks> {
        &self.lifecycle
    }

    pub fn clients(&self) -> &ClientGroup<ClientConnection<W>> {
        &self.clients
    }

    pub fn host(&self) -> Option<ClientId> {
        self.host
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Load the configured initial mission, if any, as a first load.
    pub fn load_initial_mission(&mut self) {
        let Some(mission) = self.lifecycle.config().initial_mission.clone() else {
            info!("no initial mission configured; waiting for the host");
            return;
        };
        let result = self
            .lifecycle
            .load_mission(&mut self.clients, &mission, true);
        self.report(result);
    }

    /// Admit a client after its `Hello`. Returns the assigned ID, or the
    /// rejection reason. On success the client has already been sent
    /// `Welcome` and caught up on the current mission.
    pub fn add_client(
        &mut self,
        protocol_version: u32,
        name: String,
        ai_controlled: bool,
        writer: W,
    ) -> Result<ClientId, String> {
        if protocol_version != PROTOCOL_VERSION {
            return Err(format!(
                "protocol version {protocol_version} not supported (server speaks {PROTOCOL_VERSION})"
            ));
        }
        if self.clients.len() >= self.max_clients {
            return Err("server is full".into());
        }

        let id = ClientId(self.next_client_id);
        self.next_client_id += 1;
        let host = self.host.is_none();
        if host {
            self.host = Some(id);
        }

        let mut connection = ClientConnection::new(id, name, ai_controlled, writer);
        connection.send(&ServerMessage::Welcome {
            client_id: player_id(id),
            host,
            status: status_report(&self.lifecycle.status()),
        });
        self.lifecycle.client_connected(&mut connection);
        info!(
            "client {} ({}) joined{}",
            id.0,
            connection.name(),
            if host { " as host" } else { "" }
        );
        self.clients.add(id, connection);
        Ok(id)
    }

    /// Drop a client. If it was the host, the longest-connected remaining
    /// client takes over.
    pub fn remove_client(&mut self, id: ClientId) {
        let Some(connection) = self.clients.remove(id) else {
            return;
        };
        info!("client {} ({}) left", id.0, connection.name());
        if self.host == Some(id) {
            self.host = self.clients.ids().first().copied();
            if let Some(new_host) = self.host {
                info!("client {} is now the host", new_host.0);
            }
        }
    }

    /// Handle a message from an admitted client that arrived at `now_ms`.
    pub fn handle_message(&mut self, from: ClientId, message: ClientMessage, now_ms: u64) {
        self.tick(now_ms);
        if message.is_host_only() && self.host != Some(from) {
            warn!("client {} sent host-only request {message:?}", from.0);
            self.send_to(
                from,
                &ServerMessage::RequestDenied {
                    reason: "only the host may control missions".into(),
                },
            );
            return;
        }

        let result = match message {
            ClientMessage::LoadMission { mission } => {
                self.lifecycle
                    .load_mission(&mut self.clients, &mission, false)
            }
            ClientMessage::EndMission => self.lifecycle.end_mission(&mut self.clients),
            ClientMessage::ResetMission => self.lifecycle.reset_mission(),
            ClientMessage::CycleMission => self.lifecycle.cycle_missions(&mut self.clients),
            ClientMessage::RequestStatus => {
                self.send_status(from);
                return;
            }
            ClientMessage::Hello { .. } | ClientMessage::Goodbye => {
                // Hello is consumed during admission, Goodbye by the reader.
                return;
            }
        };

        if let Err(err) = &result {
            self.send_to(
                from,
                &ServerMessage::RequestDenied {
                    reason: err.to_string(),
                },
            );
        }
        self.report(result);
        self.send_status(from);
    }

    /// Advance lifecycle time to `now_ms`, firing anything due.
    pub fn tick(&mut self, now_ms: u64) {
        // Also called with nothing due, so delays scheduled later are
        // measured from the current wall clock.
        let result = self.lifecycle.advance_to(&mut self.clients, now_ms);
        self.report(result);
    }

    /// Milliseconds from `now_ms` until the next scheduled event.
    pub fn time_until_next_event(&self, now_ms: u64) -> Option<u64> {
        self.lifecycle
            .next_due()
            .map(|due| due.saturating_sub(now_ms))
    }

    fn send_to(&mut self, id: ClientId, message: &ServerMessage) {
        if let Some(connection) = self.clients.get_by_id_mut(id) {
            connection.send(message);
        }
    }

    fn send_status(&mut self, id: ClientId) {
        let status = status_report(&self.lifecycle.status());
        self.send_to(id, &ServerMessage::Status { status });
    }

    fn broadcast(&mut self, message: &ServerMessage) {
        for id in self.clients.ids() {
            self.send_to(id, message);
        }
    }

    /// An error that left no mission loaded and the lifecycle idle came out
    /// of a load attempt; clients already have its info, so tell them.
    fn report_abandoned_load(&mut self, err: &LifecycleError) {
        let session = self.lifecycle.session();
        if session.loaded().is_some() || session.state() != LifecycleState::Idle {
            return;
        }
        let Some(mission_path) = session.mission_path().map(str::to_string) else {
            return;
        };
        self.broadcast(&ServerMessage::LoadFailed {
            mission_path,
            reason: err.to_string(),
        });
    }

    fn report(&mut self, result: Result<StepResult, LifecycleError>) {
        let step = match result {
            Ok(step) => step,
            Err(err) => {
                error!("mission lifecycle error: {err}");
                self.report_abandoned_load(&err);
                return;
            }
        };
        for event in step.events {
            debug!("lifecycle event at {}ms: {:?}", event.time, event.kind);
            if let LifecycleEventKind::LoadFailed { failure } = event.kind {
                self.broadcast(&ServerMessage::LoadFailed {
                    mission_path: failure.path().to_string(),
                    reason: failure.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use waypoint_protocol::{StatusReport, recv};

    use super::*;

    const OUTPOST: &str = r#"{
        "info": { "name": "Outpost" },
        "objects": [ { "class": "SimGroup", "name": "MissionGroup" } ]
    }"#;

    fn session() -> ServerSession<Vec<u8>> {
        let store = MissionStore::in_memory()
            .with_mission("outpost.mis", OUTPOST)
            .with_mission("ridge.mis", OUTPOST)
            .with_mission("garbled.mis", "{ objects: ");
        let config = LifecycleConfig {
            mission_rotation: vec!["outpost.mis".into(), "ridge.mis".into()],
            ..LifecycleConfig::default()
        };
        ServerSession::new(config, store, 2)
    }

    fn inbox(session: &ServerSession<Vec<u8>>, id: ClientId) -> Vec<ServerMessage> {
        let bytes = session.clients().get_by_id(id).unwrap().writer().clone();
        let mut cursor = Cursor::new(bytes);
        let mut out = Vec::new();
        while (cursor.position() as usize) < cursor.get_ref().len() {
            out.push(recv(&mut cursor).unwrap());
        }
        out
    }

    fn last_status(messages: &[ServerMessage]) -> StatusReport {
        messages
            .iter()
            .rev()
            .find_map(|msg| match msg {
                ServerMessage::Status { status } => Some(status.clone()),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn first_client_is_host_and_capacity_is_enforced() {
        let mut s = session();
        let host = s.add_client(PROTOCOL_VERSION, "ann".into(), false, Vec::new()).unwrap();
        let guest = s.add_client(PROTOCOL_VERSION, "bo".into(), false, Vec::new()).unwrap();
        assert_eq!(s.host(), Some(host));
        assert_ne!(host, guest);

        let err = s
            .add_client(PROTOCOL_VERSION, "cy".into(), false, Vec::new())
            .unwrap_err();
        assert_eq!(err, "server is full");

        s.remove_client(host);
        assert_eq!(s.host(), Some(guest));
    }

    #[test]
    fn wrong_protocol_version_is_rejected() {
        let mut s = session();
        let err = s
            .add_client(PROTOCOL_VERSION + 1, "old".into(), false, Vec::new())
            .unwrap_err();
        assert!(err.contains("not supported"), "{err}");
        assert_eq!(s.client_count(), 0);
    }

    #[test]
    fn non_host_cannot_control_missions() {
        let mut s = session();
        s.add_client(PROTOCOL_VERSION, "ann".into(), false, Vec::new()).unwrap();
        let guest = s.add_client(PROTOCOL_VERSION, "bo".into(), false, Vec::new()).unwrap();

        s.handle_message(
            guest,
            ClientMessage::LoadMission {
                mission: "outpost.mis".into(),
            },
            0,
        );

        assert_eq!(s.lifecycle().session().sequence().0, 0);
        assert!(matches!(
            inbox(&s, guest).last(),
            Some(ServerMessage::RequestDenied { .. })
        ));
    }

    #[test]
    fn host_load_pauses_until_tick_reaches_due_time() {
        let mut s = session();
        let host = s.add_client(PROTOCOL_VERSION, "ann".into(), false, Vec::new()).unwrap();

        s.handle_message(
            host,
            ClientMessage::LoadMission {
                mission: "outpost.mis".into(),
            },
            0,
        );
        assert_eq!(last_status(&inbox(&s, host)).state, "Pausing");
        assert_eq!(s.time_until_next_event(1000), Some(4000));

        s.tick(4999);
        assert!(!s.lifecycle().session().is_running());
        s.tick(5000);
        assert!(s.lifecycle().session().is_running());

        let messages = inbox(&s, host);
        assert!(messages.contains(&ServerMessage::MissionStart {
            sequence: 1,
            crc: s.lifecycle().session().crc().unwrap().0,
            mission_path: "outpost.mis".into(),
        }));
    }

    #[test]
    fn initial_mission_loads_immediately_and_late_joiners_catch_up() {
        let store = MissionStore::in_memory().with_mission("outpost.mis", OUTPOST);
        let config = LifecycleConfig {
            initial_mission: Some("outpost.mis".into()),
            ..LifecycleConfig::default()
        };
        let mut s: ServerSession<Vec<u8>> = ServerSession::new(config, store, 4);
        s.load_initial_mission();
        assert!(s.lifecycle().session().is_running());

        let id = s.add_client(PROTOCOL_VERSION, "late".into(), false, Vec::new()).unwrap();
        let messages = inbox(&s, id);
        assert!(matches!(messages[0], ServerMessage::Welcome { host: true, .. }));
        assert!(matches!(messages[1], ServerMessage::MissionInfo { .. }));
        assert!(matches!(messages[2], ServerMessage::MissionStart { sequence: 1, .. }));
    }

    #[test]
    fn missing_mission_is_broadcast_as_load_failure() {
        let mut s = session();
        let host = s.add_client(PROTOCOL_VERSION, "ann".into(), false, Vec::new()).unwrap();
        s.handle_message(
            host,
            ClientMessage::LoadMission {
                mission: "gone.mis".into(),
            },
            0,
        );
        s.tick(5000);

        assert!(inbox(&s, host).contains(&ServerMessage::LoadFailed {
            mission_path: "gone.mis".into(),
            reason: "could not find mission gone.mis".into(),
        }));
    }

    #[test]
    fn pause_is_measured_from_when_the_request_arrived() {
        let mut s = session();
        let host = s.add_client(PROTOCOL_VERSION, "ann".into(), false, Vec::new()).unwrap();
        s.tick(1000);

        s.handle_message(
            host,
            ClientMessage::LoadMission {
                mission: "outpost.mis".into(),
            },
            1090,
        );
        assert_eq!(s.time_until_next_event(1090), Some(5000));

        s.tick(6089);
        assert!(!s.lifecycle().session().is_running());
        s.tick(6090);
        assert!(s.lifecycle().session().is_running());
    }

    #[test]
    fn failed_stage2_is_broadcast_and_leaves_session_idle() {
        let mut s = session();
        let host = s.add_client(PROTOCOL_VERSION, "ann".into(), false, Vec::new()).unwrap();
        let guest = s.add_client(PROTOCOL_VERSION, "bo".into(), true, Vec::new()).unwrap();
        s.handle_message(
            host,
            ClientMessage::LoadMission {
                mission: "garbled.mis".into(),
            },
            0,
        );

        s.tick(5000);

        for id in [host, guest] {
            assert!(
                inbox(&s, id).iter().any(|msg| matches!(
                    msg,
                    ServerMessage::LoadFailed { mission_path, .. } if mission_path == "garbled.mis"
                )),
                "client {} got no LoadFailed",
                id.0
            );
        }
        s.handle_message(host, ClientMessage::RequestStatus, 5000);
        let status = last_status(&inbox(&s, host));
        assert_eq!(status.state, "Idle");
        assert!(!status.running);
        assert_eq!(status.crc, None);
    }
}
