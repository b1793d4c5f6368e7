//! The central processing sequencer.
//!
//! Every inbound message, whatever its origin (live feed, recording,
//! archive), flows through the same invariant: snapshot the state before
//! the diff, apply the diff, run the detectors on the (before, after)
//! pair, and hand the result to the driving layer. Drivers (the live loop
//! and the playback controller) own one pipeline each and are responsible
//! for fanning the update out to observers, events before the aggregate
//! update.

use metrics::counter;

use crate::detect;
use crate::events::SessionEvent;
use crate::state::StateAccumulator;
use crate::timeline::TimelineEntry;
use crate::types::SessionState;

/// The result of processing one message.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineUpdate {
    /// Snapshot after the diff was applied (owned copy).
    pub snapshot: SessionState,
    /// Events detected on this message, in detector order.
    pub events: Vec<SessionEvent>,
    /// The raw message that produced this update.
    pub entry: TimelineEntry,
}

/// Sequencer owning one accumulator. Single-writer: exactly one logical
/// task calls [`Pipeline::process`] on a given instance.
#[derive(Debug, Default)]
pub struct Pipeline {
    accumulator: StateAccumulator,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pipeline seeded with an initial snapshot (deep copy taken).
    pub fn with_initial(initial: &SessionState) -> Self {
        Pipeline {
            accumulator: StateAccumulator::with_initial(initial),
        }
    }

    /// Current snapshot by reference.
    pub fn state(&self) -> &SessionState {
        self.accumulator.get()
    }

    /// Owned copy of the current snapshot.
    pub fn snapshot(&self) -> SessionState {
        self.accumulator.snapshot()
    }

    /// Reset the accumulator to a copy of the given snapshot.
    pub fn reset_to(&mut self, initial: &SessionState) {
        self.accumulator.reset_to(initial);
    }

    /// Process one message: copy the prior snapshot, apply the diff, run
    /// all detectors on the pair.
    pub fn process(&mut self, entry: &TimelineEntry) -> PipelineUpdate {
        let prev = self.accumulator.snapshot();
        self.accumulator
            .apply(&entry.topic, &entry.data, Some(&entry.timestamp));
        let snapshot = self.accumulator.snapshot();
        let events = detect::detect(&prev, &snapshot);

        counter!("pipeline_messages_total").increment(1);
        if !events.is_empty() {
            counter!("pipeline_events_total").increment(events.len() as u64);
        }

        PipelineUpdate {
            snapshot,
            events,
            entry: entry.clone(),
        }
    }

    /// Apply a message without running detectors or producing an update.
    /// Seek replay uses this to fast-forward state silently.
    pub fn apply_silent(&mut self, entry: &TimelineEntry) {
        self.accumulator
            .apply(&entry.topic, &entry.data, Some(&entry.timestamp));
    }
}
