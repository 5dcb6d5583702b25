// Client roster capability traits.
//
// The lifecycle does not own client connections; the connection layer
// does. It only needs to walk the connected clients in a stable order and
// invoke per-client lifecycle calls on them. `ClientRoster` is that
// capability: an indexed, ordered collection of `ClientSession`s. Keeping
// it this small lets tests drive the lifecycle with a fake roster and lets
// the server crate plug in real TCP connections.
//
// Per-client calls are fire-and-forget. A session that cannot deliver a
// notification (broken pipe, say) handles that itself; the lifecycle never
// waits on delivery.
//
// `ClientGroup` is the shipped ordered roster: clients keep their join order,
// and removal preserves the relative order of everyone else.
//
// See also: `lifecycle.rs` for the fixed order in which these calls are
// issued, and `waypoint_server::connection` for the TCP-backed session.

use serde::{Deserialize, Serialize};

use crate::resource::LoadInfo;
use crate::types::{ClientId, MissionCrc, MissionSequence};

/// What each client receives when a mission finishes loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionStart {
    pub sequence: MissionSequence,
    pub crc: MissionCrc,
    pub mission_path: String,
}

/// Per-client lifecycle operations the controller invokes.
pub trait ClientSession {
    /// AI-controlled clients are skipped for stage-1 load info.
    fn is_ai_controlled(&self) -> bool;

    /// Stage 1: push display metadata ahead of the heavy load.
    fn send_load_info(&mut self, info: &LoadInfo);

    /// Stage 2 done: begin this client's own load sequence.
    fn load_mission(&mut self, start: &MissionStart);

    fn end_mission(&mut self);

    /// Drop replication bookkeeping from the ended session.
    fn reset_ghosting(&mut self);

    /// Drop path-following state from the ended session.
    fn clear_paths(&mut self);

    fn clear_center_print(&mut self) {}

    fn clear_bottom_print(&mut self) {}
}

/// Ordered, indexable set of connected clients.
pub trait ClientRoster {
    fn count(&self) -> usize;

    fn get(&mut self, index: usize) -> Option<&mut dyn ClientSession>;

    fn clear_center_print_all(&mut self) {
        for index in 0..self.count() {
            if let Some(client) = self.get(index) {
                client.clear_center_print();
            }
        }
    }

    fn clear_bottom_print_all(&mut self) {
        for index in 0..self.count() {
            if let Some(client) = self.get(index) {
                client.clear_bottom_print();
            }
        }
    }
}

/// Join-ordered roster of client sessions keyed by `ClientId`.
#[derive(Debug)]
pub struct ClientGroup<C> {
    clients: Vec<(ClientId, C)>,
}

impl<C> Default for ClientGroup<C> {
    fn default() -> Self {
        Self {
            clients: Vec::new(),
        }
    }
}

impl<C> ClientGroup<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a client at the end of the roster order. Replaces the session
    /// in place if the ID is already present.
    pub fn add(&mut self, id: ClientId, session: C) {
        if let Some(entry) = self.clients.iter_mut().find(|(existing, _)| *existing == id) {
            entry.1 = session;
        } else {
            self.clients.push((id, session));
        }
    }

    pub fn remove(&mut self, id: ClientId) -> Option<C> {
        let index = self.clients.iter().position(|(existing, _)| *existing == id)?;
        Some(self.clients.remove(index).1)
    }

    pub fn get_by_id(&self, id: ClientId) -> Option<&C> {
        self.clients
            .iter()
            .find(|(existing, _)| *existing == id)
            .map(|(_, session)| session)
    }

    pub fn get_by_id_mut(&mut self, id: ClientId) -> Option<&mut C> {
        self.clients
            .iter_mut()
            .find(|(existing, _)| *existing == id)
            .map(|(_, session)| session)
    }

    pub fn ids(&self) -> Vec<ClientId> {
        self.clients.iter().map(|(id, _)| *id).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &C)> {
        self.clients.iter().map(|(id, session)| (*id, session))
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

impl<C: ClientSession> ClientRoster for ClientGroup<C> {
    fn count(&self) -> usize {
        self.clients.len()
    }

    fn get(&mut self, index: usize) -> Option<&mut dyn ClientSession> {
        self.clients
            .get_mut(index)
            .map(|(_, session)| session as &mut dyn ClientSession)
    }
}
