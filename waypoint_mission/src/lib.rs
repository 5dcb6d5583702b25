// waypoint_mission — mission lifecycle library for the Waypoint server.
//
// This crate owns everything that happens between "load mission X" and the
// mission being torn down again: ending the previous session, distributing
// load metadata to clients, the optional pause before the heavy load,
// instantiating the mission resource into object containers, fingerprinting
// it, notifying every client in roster order, and recovering from broken
// mission files by cycling to another mission after a delay.
//
// Module overview:
// - `lifecycle.rs`: `MissionLifecycle`, the end → load → run state machine.
//                   The only module with real ordering constraints.
// - `session.rs`:   `Session` record (path, sequence, CRC, running flag,
//                   state) and the serializable `SessionStatus` snapshot.
// - `scheduler.rs`: Scope-bound delayed events, ordered by
//                   `(due time, sequence)`. Destroying a scope cancels its
//                   events.
// - `container.rs`: `ObjectContainers`: hierarchical object scopes plus the
//                   active instantiation target.
// - `roster.rs`:    `ClientRoster` / `ClientSession` capability traits and
//                   the ordered `ClientGroup` implementation.
// - `resource.rs`:  `MissionResources` trait and the JSON-backed
//                   `MissionStore` (directory or in-memory).
// - `crc.rs`:       Mission fingerprinting (CRC-32).
// - `hooks.rs`:     Game-level hooks and the mission cycling policy.
// - `config.rs`:    `LifecycleConfig`, loaded from JSON.
// - `error.rs`:     Error types: handled `LoadFailure` reports and the
//                   propagated `LifecycleError`.
// - `types.rs`:     Small newtypes shared across modules.
//
// No networking lives here. The `waypoint_server` crate wraps this library
// behind a TCP front end; tests drive it directly with fake rosters.
//
// **Critical constraint: single logical thread.** Every mutating operation
// takes `&mut self` and runs to completion. Delays are scheduled events that
// fire from `MissionLifecycle::advance_to`, never sleeps.

pub mod config;
pub mod container;
pub mod crc;
pub mod error;
pub mod hooks;
pub mod lifecycle;
pub mod resource;
pub mod roster;
pub mod scheduler;
pub mod session;
pub mod types;

pub use config::{LifecycleConfig, ServerType};
pub use container::{Container, ObjectContainers, SessionObject};
pub use error::{
    ConfigError, ContainerError, HookError, LifecycleError, LoadFailure, ResourceError,
};
pub use hooks::{HookResult, MissionCycler, MissionHooks, MissionRotation, NoHooks};
pub use lifecycle::{LifecycleEvent, LifecycleEventKind, MissionLifecycle, StepResult};
pub use resource::{LoadInfo, MissionResources, MissionStore};
pub use roster::{ClientGroup, ClientRoster, ClientSession, MissionStart};
pub use session::{LifecycleState, LoadedMission, Session, SessionStatus};
pub use types::{ClientId, ContainerId, MissionCrc, MissionSequence};
