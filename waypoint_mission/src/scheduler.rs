// Scope-bound delayed events for the mission lifecycle.
//
// The lifecycle never sleeps. A "pause" is an event pushed into this queue
// with a due time; the host drives time forward with
// `MissionLifecycle::advance_to`, which pops due events and dispatches them
// on the same logical thread as every other lifecycle operation.
//
// Events are ordered by `(due, sequence)` in a min-heap. `sequence` is a
// monotonic counter, so events due at the same time fire in the order they
// were scheduled.
//
// **Cancellation is scope destruction.** Every event is bound to a target
// container. `pop_due` silently discards events whose target no longer
// exists in `ObjectContainers`, so tearing down the server scope at mission
// end drops every callback that was pending against it. There is no
// explicit cancel call.
//
// Events also carry the mission sequence they were scheduled under (see
// `ScheduledEventKind`), which `lifecycle.rs` checks before acting: the
// second guard for callbacks whose scope survived a newer load.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use tracing::trace;

use crate::container::ObjectContainers;
use crate::types::{ContainerId, MissionSequence};

/// What a scheduled event does when it fires.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScheduledEventKind {
    /// Run stage 2 of the load started under `generation`.
    LoadStage2 { generation: MissionSequence },
    /// Cycle away from `failed_mission` after a corrupt load under `generation`.
    CycleMissions {
        generation: MissionSequence,
        failed_mission: String,
    },
}

/// Handle returned by `Scheduler::schedule`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

/// An event waiting in the queue.
#[derive(Clone, Debug)]
pub struct ScheduledEvent {
    /// Time (ms) at which the event becomes due.
    pub due: u64,
    /// Scheduling order, for deterministic tiebreaking at equal `due`.
    pub sequence: u64,
    /// Scope whose destruction cancels this event.
    pub target: ContainerId,
    pub kind: ScheduledEventKind,
}

impl ScheduledEvent {
    pub fn handle(&self) -> EventHandle {
        EventHandle(self.sequence)
    }
}

// Min-heap on (due, sequence): BinaryHeap is a max-heap, so reverse.
impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.sequence == other.sequence
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Single-threaded timer queue with its own clock (ms).
#[derive(Debug, Default)]
pub struct Scheduler {
    heap: BinaryHeap<ScheduledEvent>,
    next_sequence: u64,
    now: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current scheduler time.
    pub fn now(&self) -> u64 {
        self.now
    }

    /// Schedule `kind` to fire `delay` ms from now, bound to `target`.
    pub fn schedule(
        &mut self,
        delay: u64,
        target: ContainerId,
        kind: ScheduledEventKind,
    ) -> EventHandle {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(ScheduledEvent {
            due: self.now.saturating_add(delay),
            sequence,
            target,
            kind,
        });
        EventHandle(sequence)
    }

    /// Whether the event is still queued. Cancelled events stay queued until
    /// `pop_due` reaches and discards them.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.heap.iter().any(|e| e.sequence == handle.0)
    }

    /// Due time of the earliest queued event.
    pub fn peek_due(&self) -> Option<u64> {
        self.heap.peek().map(|e| e.due)
    }

    /// Pop the earliest event due at or before `until` whose target scope is
    /// still alive. Advances the clock to the popped event's due time.
    /// Events bound to destroyed scopes are dropped on the way.
    pub fn pop_due(&mut self, until: u64, containers: &ObjectContainers) -> Option<ScheduledEvent> {
        while self.heap.peek().is_some_and(|e| e.due <= until) {
            let event = self.heap.pop()?;
            self.now = self.now.max(event.due);
            if containers.exists(event.target) {
                return Some(event);
            }
            trace!(
                "dropping {:?}: scope {:?} was destroyed",
                event.kind, event.target
            );
        }
        None
    }

    /// Move the clock forward to `until` once every due event is handled.
    /// The clock never moves backwards.
    pub fn settle(&mut self, until: u64) {
        self.now = self.now.max(until);
    }

    /// Number of queued events, including not-yet-discarded cancelled ones.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stage2(n: u64) -> ScheduledEventKind {
        ScheduledEventKind::LoadStage2 {
            generation: MissionSequence(n),
        }
    }

    #[test]
    fn events_pop_in_due_then_schedule_order() {
        let mut containers = ObjectContainers::new();
        let scope = containers.create("ServerGroup", None).unwrap();
        let mut scheduler = Scheduler::new();

        scheduler.schedule(100, scope, stage2(1));
        scheduler.schedule(50, scope, stage2(2));
        scheduler.schedule(50, scope, stage2(3));

        let first = scheduler.pop_due(200, &containers).unwrap();
        assert_eq!(first.due, 50);
        assert_eq!(first.kind, stage2(2));
        assert_eq!(scheduler.now(), 50);

        let second = scheduler.pop_due(200, &containers).unwrap();
        assert_eq!(second.kind, stage2(3));

        let third = scheduler.pop_due(200, &containers).unwrap();
        assert_eq!(third.due, 100);
        assert!(scheduler.pop_due(200, &containers).is_none());
    }

    #[test]
    fn nothing_fires_before_its_delay() {
        let mut containers = ObjectContainers::new();
        let scope = containers.create("ServerGroup", None).unwrap();
        let mut scheduler = Scheduler::new();
        scheduler.settle(1000);
        scheduler.schedule(5000, scope, stage2(1));

        assert!(scheduler.pop_due(5999, &containers).is_none());
        let event = scheduler.pop_due(6000, &containers).unwrap();
        assert_eq!(event.due, 6000);
    }

    #[test]
    fn destroyed_scope_cancels_its_events() {
        let mut containers = ObjectContainers::new();
        let doomed = containers.create("ServerGroup", None).unwrap();
        let mut scheduler = Scheduler::new();
        let handle = scheduler.schedule(10, doomed, stage2(1));
        assert!(scheduler.is_pending(handle));

        containers.destroy(doomed);
        let replacement = containers.create("ServerGroup", None).unwrap();
        scheduler.schedule(20, replacement, stage2(2));

        let event = scheduler.pop_due(100, &containers).unwrap();
        assert_eq!(event.kind, stage2(2));
        assert!(!scheduler.is_pending(handle));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn events_fire_at_most_once() {
        let mut containers = ObjectContainers::new();
        let scope = containers.create("ServerGroup", None).unwrap();
        let mut scheduler = Scheduler::new();
        scheduler.schedule(0, scope, stage2(1));

        assert!(scheduler.pop_due(0, &containers).is_some());
        assert!(scheduler.pop_due(u64::MAX, &containers).is_none());
    }

    #[test]
    fn settle_never_rewinds_the_clock() {
        let mut scheduler = Scheduler::new();
        scheduler.settle(500);
        scheduler.settle(100);
        assert_eq!(scheduler.now(), 500);
    }
}
