// Mission lifecycle controller: end → load → run.
//
// `MissionLifecycle` owns the `Session` record, the object containers, the
// scheduler, and the external collaborators it drives (mission resources,
// gameplay hooks, the cycling policy). The client roster is *not* owned;
// the connection layer owns it and lends it to each operation.
//
// ## Loading
//
// `load_mission(roster, mission, is_first_load)`:
//
//   Stage 1, always synchronous
//     1. End the current mission (no-op if none is loaded).
//     2. Clear center/bottom prints on every client.
//     3. Bump the sequence number, clear `running`, record the path.
//     4. Read load info (display metadata only).
//     5. Send it to every non-AI client, in roster order.
//     6. First load or single-player: run stage 2 now. Otherwise schedule
//        stage 2 `mission_load_pause_ms` later, bound to the server scope
//        and tagged with the current sequence number.
//
//   Stage 2, inline or from `advance_to`
//     1. Point the active target at the server scope.
//     2. Missing resource → report `ResourceMissing`, go `Idle`. Done.
//     3. Fingerprint the resource.
//     4. Instantiate it.
//     5. No top-level group → report `LoadCorruption`, clear the partial
//        load, schedule a mission cycle `load_retry_delay_ms` later. Done.
//     6. Create the cleanup container beside the group; make it the target.
//     7. `build_paths`, `start_replication` hooks.
//     8. `running = true`.
//     9. `load_mission` on every client (AI included), in roster order.
//    10. `on_mission_loaded`, `purge_resources` hooks.
//
// ## Ending
//
// `end_mission` runs the gameplay hook first, then tells every client to
// end / reset ghosting / clear paths, and only then destroys the mission
// containers and replaces the server scope with a fresh empty one. Nothing
// is destroyed while any client hook could still observe it.
//
// ## Stale callbacks
//
// Two independent guards keep a delayed event from a superseded load from
// touching a newer session:
// - Scope: events are bound to the server scope. Ending a loaded mission
//   destroys that scope, and the scheduler drops its events unfired.
// - Generation: stage-2 and cycle events carry the sequence number they
//   were scheduled under and are discarded if it is no longer current.
//   This covers the case the scope guard cannot: `load_mission("B")` while
//   "A" is still paused before stage 2. Nothing was loaded, so ending is a
//   no-op and the scope survives.
//
// ## Failures
//
// `ResourceMissing` and `LoadCorruption` are handled: logged, reported as
// `LifecycleEventKind::LoadFailed`, never returned as `Err`. Everything
// else (hook errors, unreadable/unparseable resources) propagates. A stage 2
// that fails this way is abandoned before the error is returned: the server
// scope is emptied, the fingerprint dropped, and the session left `Idle`.

use tracing::{debug, error, info, warn};

use crate::config::LifecycleConfig;
use crate::container::ObjectContainers;
use crate::error::{LifecycleError, LoadFailure};
use crate::hooks::{MissionCycler, MissionHooks, MissionRotation};
use crate::resource::{LoadInfo, MissionResources};
use crate::roster::{ClientRoster, ClientSession, MissionStart};
use crate::scheduler::{ScheduledEvent, ScheduledEventKind, Scheduler};
use crate::session::{LifecycleState, LoadedMission, Session, SessionStatus};
use crate::types::{ContainerId, MissionCrc, MissionSequence};

/// Something observable that a lifecycle operation did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleEvent {
    /// Controller time (ms) when it happened.
    pub time: u64,
    pub kind: LifecycleEventKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEventKind {
    MissionEnded {
        mission_path: String,
        sequence: MissionSequence,
    },
    /// Stage 1 began for a new load attempt.
    LoadStarted {
        mission_path: String,
        sequence: MissionSequence,
    },
    Stage2Scheduled {
        sequence: MissionSequence,
        due: u64,
    },
    MissionLoaded {
        mission_path: String,
        sequence: MissionSequence,
        crc: MissionCrc,
    },
    LoadFailed {
        failure: LoadFailure,
    },
    RetryScheduled {
        failed_mission: String,
        due: u64,
    },
    MissionReset {
        mission_path: String,
    },
    /// A delayed event from a superseded load attempt was dropped.
    StaleEventDiscarded {
        generation: MissionSequence,
    },
    /// The cycling policy had no other mission to offer.
    CycleAbandoned {
        from: Option<String>,
    },
}

/// Events produced by one lifecycle operation, in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepResult {
    pub events: Vec<LifecycleEvent>,
}

impl StepResult {
    /// The handled load failures reported during this step.
    pub fn failures(&self) -> impl Iterator<Item = &LoadFailure> {
        self.events.iter().filter_map(|event| match &event.kind {
            LifecycleEventKind::LoadFailed { failure } => Some(failure),
            _ => None,
        })
    }
}

/// The mission lifecycle controller.
pub struct MissionLifecycle<S, H> {
    config: LifecycleConfig,
    session: Session,
    containers: ObjectContainers,
    scheduler: Scheduler,
    /// Parent scope of every session container; replaced on mission end.
    server_scope: ContainerId,
    resources: S,
    hooks: H,
    cycler: Box<dyn MissionCycler>,
}

impl<S: MissionResources, H: MissionHooks> MissionLifecycle<S, H> {
    /// A controller with no mission loaded, cycling through
    /// `config.mission_rotation`.
    pub fn new(config: LifecycleConfig, resources: S, hooks: H) -> Self {
        let mut containers = ObjectContainers::new();
        let server_scope = containers.create_root(config.server_group_name.clone());
        let cycler = Box::new(MissionRotation::new(config.mission_rotation.clone()));
        Self {
            config,
            session: Session::default(),
            containers,
            scheduler: Scheduler::new(),
            server_scope,
            resources,
            hooks,
            cycler,
        }
    }

    /// Replace the mission cycling policy.
    pub fn with_cycler(mut self, cycler: impl MissionCycler + 'static) -> Self {
        self.cycler = Box::new(cycler);
        self
    }

    pub fn set_cycler(&mut self, cycler: Box<dyn MissionCycler>) {
        self.cycler = cycler;
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn containers(&self) -> &ObjectContainers {
        &self.containers
    }

    pub fn server_scope(&self) -> ContainerId {
        self.server_scope
    }

    pub fn resources(&self) -> &S {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut S {
        &mut self.resources
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    pub fn hooks_mut(&mut self) -> &mut H {
        &mut self.hooks
    }

    /// Controller clock (ms).
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    /// When the next scheduled event is due, if any.
    pub fn next_due(&self) -> Option<u64> {
        self.scheduler.peek_due()
    }

    /// Number of queued scheduled events (cancelled ones included until the
    /// clock passes them).
    pub fn pending_events(&self) -> usize {
        self.scheduler.len()
    }

    /// End whatever is running and load `mission`.
    pub fn load_mission(
        &mut self,
        roster: &mut dyn ClientRoster,
        mission: &str,
        is_first_load: bool,
    ) -> Result<StepResult, LifecycleError> {
        let mut events = Vec::new();
        self.load_mission_into(roster, mission, is_first_load, &mut events)?;
        Ok(StepResult { events })
    }

    /// Tear down the loaded mission. No-op when nothing is loaded.
    pub fn end_mission(
        &mut self,
        roster: &mut dyn ClientRoster,
    ) -> Result<StepResult, LifecycleError> {
        let mut events = Vec::new();
        self.end_mission_into(roster, &mut events)?;
        Ok(StepResult { events })
    }

    /// Throw away transient objects and rebuild the cleanup container,
    /// keeping the mission itself running. No-op when nothing is loaded.
    pub fn reset_mission(&mut self) -> Result<StepResult, LifecycleError> {
        let mut events = Vec::new();
        let Some(loaded) = self.session.loaded else {
            debug!("reset requested with no mission loaded");
            return Ok(StepResult { events });
        };

        info!("*** MISSION RESET");
        self.containers.destroy(loaded.cleanup);
        self.containers.set_active_target(self.server_scope)?;
        let cleanup = self
            .containers
            .create_in_target(self.config.mission_cleanup_name.clone())?;
        self.containers.set_active_target(cleanup)?;
        self.session.loaded = Some(LoadedMission { cleanup, ..loaded });

        self.hooks
            .on_mission_reset(&self.session, &mut self.containers)?;

        let mission_path = self.session.mission_path.clone().unwrap_or_default();
        events.push(self.event(LifecycleEventKind::MissionReset { mission_path }));
        Ok(StepResult { events })
    }

    /// Load whatever the cycling policy picks after the current mission.
    pub fn cycle_missions(
        &mut self,
        roster: &mut dyn ClientRoster,
    ) -> Result<StepResult, LifecycleError> {
        let mut events = Vec::new();
        let current = self.session.mission_path.clone();
        match self.cycler.next_after(current.as_deref()) {
            Some(next) => {
                info!("cycling missions: {current:?} -> {next}");
                self.load_mission_into(roster, &next, false, &mut events)?;
            }
            None => {
                warn!("mission cycle requested but no other mission is available");
                events.push(self.event(LifecycleEventKind::CycleAbandoned { from: current }));
            }
        }
        Ok(StepResult { events })
    }

    /// Fire every scheduled event due at or before `time`, in order, then
    /// move the clock to `time`.
    pub fn advance_to(
        &mut self,
        roster: &mut dyn ClientRoster,
        time: u64,
    ) -> Result<StepResult, LifecycleError> {
        let mut events = Vec::new();
        while let Some(event) = self.scheduler.pop_due(time, &self.containers) {
            self.dispatch(roster, event, &mut events)?;
        }
        self.scheduler.settle(time);
        Ok(StepResult { events })
    }

    /// Bring a newly connected client up to date: load info if a load is in
    /// progress or done, and its own mission load if the mission is running.
    pub fn client_connected(&self, client: &mut dyn ClientSession) {
        if !client.is_ai_controlled()
            && let Some(info) = &self.session.load_info
        {
            client.send_load_info(info);
        }
        if self.session.running
            && let (Some(mission_path), Some(crc)) = (&self.session.mission_path, self.session.crc)
        {
            client.load_mission(&MissionStart {
                sequence: self.session.sequence,
                crc,
                mission_path: mission_path.clone(),
            });
        }
    }

    fn event(&self, kind: LifecycleEventKind) -> LifecycleEvent {
        LifecycleEvent {
            time: self.scheduler.now(),
            kind,
        }
    }

    fn load_mission_into(
        &mut self,
        roster: &mut dyn ClientRoster,
        mission: &str,
        is_first_load: bool,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        info!("*** LOADING MISSION: {mission}");
        self.end_mission_into(roster, events)?;

        debug!("*** Stage 1 load");
        self.session.state = LifecycleState::LoadingStage1;
        roster.clear_center_print_all();
        roster.clear_bottom_print_all();

        self.session.sequence = self.session.sequence.next();
        self.session.running = false;
        self.session.crc = None;
        self.session.mission_path = Some(mission.to_string());
        let sequence = self.session.sequence;
        events.push(self.event(LifecycleEventKind::LoadStarted {
            mission_path: mission.to_string(),
            sequence,
        }));

        let load_info = match self.resources.load_info(mission) {
            Ok(info) => info,
            Err(err) => {
                // Stage 2 reports the real failure; clients still get a name.
                warn!("no load info for {mission}: {err}");
                LoadInfo::placeholder(mission)
            }
        };
        for index in 0..roster.count() {
            if let Some(client) = roster.get(index)
                && !client.is_ai_controlled()
            {
                client.send_load_info(&load_info);
            }
        }
        self.session.load_info = Some(load_info);

        if self.config.skips_load_pause(is_first_load) {
            return self.load_mission_stage2(roster, events);
        }

        self.session.state = LifecycleState::Pausing;
        let delay = self.config.mission_load_pause_ms;
        let due = self.scheduler.now().saturating_add(delay);
        self.scheduler.schedule(
            delay,
            self.server_scope,
            ScheduledEventKind::LoadStage2 {
                generation: sequence,
            },
        );
        debug!("stage 2 for sequence {sequence} scheduled at {due}");
        events.push(self.event(LifecycleEventKind::Stage2Scheduled { sequence, due }));
        Ok(())
    }

    fn load_mission_stage2(
        &mut self,
        roster: &mut dyn ClientRoster,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        let result = self.run_stage2(roster, events);
        if let Err(err) = &result {
            self.abandon_stage2(err);
        }
        result
    }

    fn abandon_stage2(&mut self, err: &LifecycleError) {
        error!(
            "stage 2 of {} failed: {err}",
            self.session.mission_path.as_deref().unwrap_or("<none>")
        );
        self.session.loaded = None;
        self.session.running = false;
        self.session.crc = None;
        self.session.state = LifecycleState::Idle;
        if let Err(clear_err) = self
            .containers
            .clear(self.server_scope)
            .and_then(|()| self.containers.set_active_target(self.server_scope))
        {
            warn!("could not empty server scope after failed load: {clear_err}");
        }
    }

    fn run_stage2(
        &mut self,
        roster: &mut dyn ClientRoster,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        debug!("*** Stage 2 load");
        self.session.state = LifecycleState::LoadingStage2;
        self.containers.set_active_target(self.server_scope)?;

        let Some(path) = self.session.mission_path.clone() else {
            self.session.state = LifecycleState::Idle;
            return Ok(());
        };

        if !self.resources.exists(&path) {
            let failure = LoadFailure::ResourceMissing { path };
            error!("{failure}");
            self.session.state = LifecycleState::Idle;
            events.push(self.event(LifecycleEventKind::LoadFailed { failure }));
            return Ok(());
        }

        let crc = self.resources.fingerprint(&path)?;
        self.session.crc = Some(crc);
        debug!("mission {path} crc {crc}");

        self.resources.instantiate(&path, &mut self.containers)?;

        let Some(mission_group) = self
            .containers
            .find_child(self.server_scope, &self.config.mission_group_name)
        else {
            return self.report_corruption(path, events);
        };

        let cleanup = self.containers.create(
            self.config.mission_cleanup_name.clone(),
            Some(self.server_scope),
        )?;
        self.containers.set_active_target(cleanup)?;
        self.session.loaded = Some(LoadedMission {
            mission_group,
            cleanup,
        });

        self.hooks.build_paths(&mut self.containers)?;
        info!("*** Mission loaded: {path}");
        self.hooks.start_replication(&self.containers)?;

        self.session.running = true;
        self.session.state = LifecycleState::Running;
        let start = MissionStart {
            sequence: self.session.sequence,
            crc,
            mission_path: path.clone(),
        };
        for index in 0..roster.count() {
            if let Some(client) = roster.get(index) {
                client.load_mission(&start);
            }
        }

        self.hooks
            .on_mission_loaded(&self.session, &mut self.containers)?;
        self.hooks.purge_resources()?;

        events.push(self.event(LifecycleEventKind::MissionLoaded {
            mission_path: path,
            sequence: start.sequence,
            crc,
        }));
        Ok(())
    }

    fn report_corruption(
        &mut self,
        path: String,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        let failure = LoadFailure::LoadCorruption {
            path: path.clone(),
            group: self.config.mission_group_name.clone(),
        };
        error!("{failure}");
        events.push(self.event(LifecycleEventKind::LoadFailed { failure }));

        self.session.crc = None;
        // Drop whatever the partial load created; the scope itself stays so
        // the retry below remains bound to it.
        self.containers.clear(self.server_scope)?;

        let delay = self.config.load_retry_delay_ms;
        let due = self.scheduler.now().saturating_add(delay);
        self.scheduler.schedule(
            delay,
            self.server_scope,
            ScheduledEventKind::CycleMissions {
                generation: self.session.sequence,
                failed_mission: path.clone(),
            },
        );
        self.session.state = LifecycleState::RetryScheduled;
        events.push(self.event(LifecycleEventKind::RetryScheduled {
            failed_mission: path,
            due,
        }));
        Ok(())
    }

    fn end_mission_into(
        &mut self,
        roster: &mut dyn ClientRoster,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        let Some(loaded) = self.session.loaded else {
            return Ok(());
        };

        info!("*** ENDING MISSION");
        self.session.state = LifecycleState::Ending;
        self.hooks.on_mission_ended(&self.session, &self.containers)?;

        for index in 0..roster.count() {
            if let Some(client) = roster.get(index) {
                client.end_mission();
                client.reset_ghosting();
                client.clear_paths();
            }
        }

        self.containers.destroy(loaded.mission_group);
        self.containers.destroy(loaded.cleanup);
        self.containers.destroy(self.server_scope);
        self.server_scope = self
            .containers
            .create_root(self.config.server_group_name.clone());

        self.session.loaded = None;
        self.session.running = false;
        self.session.crc = None;
        self.session.load_info = None;
        self.session.state = LifecycleState::Idle;

        events.push(self.event(LifecycleEventKind::MissionEnded {
            mission_path: self.session.mission_path.clone().unwrap_or_default(),
            sequence: self.session.sequence,
        }));
        Ok(())
    }

    fn dispatch(
        &mut self,
        roster: &mut dyn ClientRoster,
        event: ScheduledEvent,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        match event.kind {
            ScheduledEventKind::LoadStage2 { generation } => {
                if generation != self.session.sequence
                    || self.session.state != LifecycleState::Pausing
                {
                    debug!("discarding stale stage 2 from sequence {generation}");
                    events.push(self.event(LifecycleEventKind::StaleEventDiscarded { generation }));
                    return Ok(());
                }
                self.load_mission_stage2(roster, events)
            }
            ScheduledEventKind::CycleMissions {
                generation,
                failed_mission,
            } => {
                if generation != self.session.sequence
                    || self.session.state != LifecycleState::RetryScheduled
                {
                    debug!("discarding stale mission cycle from sequence {generation}");
                    events.push(self.event(LifecycleEventKind::StaleEventDiscarded { generation }));
                    return Ok(());
                }
                self.retry_after_corruption(roster, failed_mission, events)
            }
        }
    }

    fn retry_after_corruption(
        &mut self,
        roster: &mut dyn ClientRoster,
        failed_mission: String,
        events: &mut Vec<LifecycleEvent>,
    ) -> Result<(), LifecycleError> {
        match self.cycler.next_after(Some(&failed_mission)) {
            Some(next) if next != failed_mission => {
                info!("cycling away from broken mission {failed_mission} to {next}");
                self.load_mission_into(roster, &next, false, events)
            }
            _ => {
                error!("no mission to cycle to after broken mission {failed_mission}");
                self.session.state = LifecycleState::Idle;
                events.push(self.event(LifecycleEventKind::CycleAbandoned {
                    from: Some(failed_mission),
                }));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::NoHooks;
    use crate::resource::MissionStore;
    use crate::roster::ClientGroup;
    use crate::types::ClientId;

    const GOOD: &str = r#"{
        "info": { "name": "Good" },
        "objects": [ { "class": "SimGroup", "name": "MissionGroup", "children": [
            { "class": "Marker", "name": "Spawn" }
        ] } ]
    }"#;

    #[derive(Debug, Default)]
    struct Counter {
        ai: bool,
        infos: u32,
        loads: u32,
        ends: u32,
    }

    impl ClientSession for Counter {
        fn is_ai_controlled(&self) -> bool {
            self.ai
        }
        fn send_load_info(&mut self, _info: &LoadInfo) {
            self.infos += 1;
        }
        fn load_mission(&mut self, _start: &MissionStart) {
            self.loads += 1;
        }
        fn end_mission(&mut self) {
            self.ends += 1;
        }
        fn reset_ghosting(&mut self) {}
        fn clear_paths(&mut self) {}
    }

    fn lifecycle() -> MissionLifecycle<MissionStore, NoHooks> {
        let store = MissionStore::in_memory().with_mission("good.mis", GOOD);
        MissionLifecycle::new(LifecycleConfig::default(), store, NoHooks)
    }

    #[test]
    fn first_load_runs_both_stages_inline() {
        let mut lc = lifecycle();
        let mut roster = ClientGroup::new();
        roster.add(ClientId(1), Counter::default());

        let result = lc.load_mission(&mut roster, "good.mis", true).unwrap();

        assert!(lc.session().is_running());
        assert_eq!(lc.session().state(), LifecycleState::Running);
        assert_eq!(lc.session().sequence(), MissionSequence(1));
        assert!(lc.session().crc().is_some());
        assert_eq!(roster.get_by_id(ClientId(1)).unwrap().loads, 1);
        assert!(matches!(
            result.events.last().unwrap().kind,
            LifecycleEventKind::MissionLoaded { .. }
        ));
    }

    #[test]
    fn cleanup_is_sibling_of_mission_group() {
        let mut lc = lifecycle();
        let mut roster: ClientGroup<Counter> = ClientGroup::new();
        lc.load_mission(&mut roster, "good.mis", true).unwrap();

        let loaded = lc.session().loaded().unwrap();
        let containers = lc.containers();
        let group_parent = containers.get(loaded.mission_group).unwrap().parent;
        let cleanup_parent = containers.get(loaded.cleanup).unwrap().parent;
        assert_eq!(group_parent, Some(lc.server_scope()));
        assert_eq!(cleanup_parent, group_parent);
        assert_eq!(containers.active_target(), Some(loaded.cleanup));
    }

    #[test]
    fn end_replaces_server_scope_with_empty_one() {
        let mut lc = lifecycle();
        let mut roster = ClientGroup::new();
        roster.add(ClientId(1), Counter::default());
        lc.load_mission(&mut roster, "good.mis", true).unwrap();
        let old_scope = lc.server_scope();

        lc.end_mission(&mut roster).unwrap();

        assert!(!lc.containers().exists(old_scope));
        let new_scope = lc.server_scope();
        assert_ne!(new_scope, old_scope);
        assert!(lc.containers().get(new_scope).unwrap().children().is_empty());
        assert_eq!(lc.containers().len(), 1);
        assert!(lc.session().loaded().is_none());
        assert!(!lc.session().is_running());
        assert_eq!(roster.get_by_id(ClientId(1)).unwrap().ends, 1);
    }

    #[test]
    fn late_joiner_gets_info_and_load_when_running() {
        let mut lc = lifecycle();
        let mut roster: ClientGroup<Counter> = ClientGroup::new();
        lc.load_mission(&mut roster, "good.mis", true).unwrap();

        let mut human = Counter::default();
        lc.client_connected(&mut human);
        assert_eq!((human.infos, human.loads), (1, 1));

        let mut bot = Counter {
            ai: true,
            ..Counter::default()
        };
        lc.client_connected(&mut bot);
        assert_eq!((bot.infos, bot.loads), (0, 1));
    }

    #[test]
    fn late_joiner_during_pause_gets_info_only() {
        let mut lc = lifecycle();
        let mut roster: ClientGroup<Counter> = ClientGroup::new();
        lc.load_mission(&mut roster, "good.mis", false).unwrap();
        assert_eq!(lc.session().state(), LifecycleState::Pausing);

        let mut human = Counter::default();
        lc.client_connected(&mut human);
        assert_eq!((human.infos, human.loads), (1, 0));
    }

    #[test]
    fn cycle_with_empty_rotation_is_abandoned() {
        let mut lc = lifecycle();
        let mut roster: ClientGroup<Counter> = ClientGroup::new();
        let result = lc.cycle_missions(&mut roster).unwrap();
        assert_eq!(
            result.events[0].kind,
            LifecycleEventKind::CycleAbandoned { from: None }
        );
        assert_eq!(lc.session().sequence(), MissionSequence(0));
    }

    #[test]
    fn reset_with_nothing_loaded_is_a_no_op() {
        let mut lc = lifecycle();
        let result = lc.reset_mission().unwrap();
        assert!(result.events.is_empty());
        assert_eq!(lc.containers().len(), 1);
    }
}
