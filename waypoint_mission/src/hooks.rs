// Game-level hooks and the mission cycling policy.
//
// The lifecycle decides *when* things happen; gameplay code decides *what*
// happens. `MissionHooks` is the gameplay side: the lifecycle calls these at
// fixed points and propagates any `HookError` straight to the host without
// interpreting it. Every method has a no-op default so an implementation
// overrides only what it cares about.
//
// Call points, in order:
// - load:  `build_paths` → `start_replication` → (clients loaded) →
//          `on_mission_loaded` → `purge_resources`
// - end:   `on_mission_ended` (first, while the object graph is still live)
// - reset: `on_mission_reset` (after the cleanup container is recreated)
//
// `MissionCycler` picks the next mission: after a corrupt load, or when the
// host asks to cycle. The selection algorithm is a deployment decision, so
// it is a trait. `MissionRotation` is the shipped policy: walk a configured
// list in order.

use tracing::debug;

use crate::container::ObjectContainers;
use crate::error::HookError;
use crate::session::Session;

pub type HookResult = Result<(), HookError>;

/// Gameplay callbacks invoked by the lifecycle.
pub trait MissionHooks {
    /// Construct paths and other derived world data. New objects land in the
    /// cleanup container (the active target at this point).
    fn build_paths(&mut self, _containers: &mut ObjectContainers) -> HookResult {
        Ok(())
    }

    /// Start replicating the freshly instantiated objects to observers.
    fn start_replication(&mut self, _containers: &ObjectContainers) -> HookResult {
        Ok(())
    }

    /// The mission is running and every client has been told to load.
    fn on_mission_loaded(
        &mut self,
        _session: &Session,
        _containers: &mut ObjectContainers,
    ) -> HookResult {
        Ok(())
    }

    /// Release caches only needed while loading.
    fn purge_resources(&mut self) -> HookResult {
        Ok(())
    }

    /// The mission is ending. Runs before any client is notified and before
    /// anything is destroyed.
    fn on_mission_ended(&mut self, _session: &Session, _containers: &ObjectContainers) -> HookResult {
        Ok(())
    }

    /// Transient objects were thrown away; the mission itself is untouched.
    fn on_mission_reset(
        &mut self,
        _session: &Session,
        _containers: &mut ObjectContainers,
    ) -> HookResult {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoHooks;

impl MissionHooks for NoHooks {}

/// Policy choosing which mission to load next.
pub trait MissionCycler {
    /// The mission to load after `current` (`None` if nothing is loaded).
    /// Returning `None` means there is nowhere to go.
    fn next_after(&mut self, current: Option<&str>) -> Option<String>;
}

/// Cycles through a fixed list in order, wrapping at the end. A current
/// mission not in the list restarts the rotation from the top.
#[derive(Clone, Debug, Default)]
pub struct MissionRotation {
    missions: Vec<String>,
}

impl MissionRotation {
    pub fn new(missions: Vec<String>) -> Self {
        Self { missions }
    }

    pub fn missions(&self) -> &[String] {
        &self.missions
    }
}

impl MissionCycler for MissionRotation {
    fn next_after(&mut self, current: Option<&str>) -> Option<String> {
        let start = current
            .and_then(|current| self.missions.iter().position(|m| m == current))
            .map_or(0, |index| index + 1);

        // Walk the whole list once from `start`, skipping the current mission
        // so a single-entry rotation never "cycles" onto itself.
        let len = self.missions.len();
        let next = (0..len)
            .map(|offset| &self.missions[(start + offset) % len])
            .find(|candidate| Some(candidate.as_str()) != current)
            .cloned();
        debug!("rotation: {current:?} -> {next:?}");
        next
    }
}
