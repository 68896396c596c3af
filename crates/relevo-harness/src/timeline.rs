//! Scripted parameter automation for validation runs.

use relevo_core::ParameterEvent;

/// A parameter change scheduled at an absolute sample position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedEvent {
    /// Automation slot.
    pub slot: u32,
    /// Plain value to apply.
    pub value: f32,
    /// Absolute frame position within the run.
    pub time: u64,
}

/// A time-ordered script of parameter changes.
///
/// Events may be pushed in any order; the timeline keeps them sorted by
/// time, with equal times preserving push order. During a run the harness
/// slices the script per block, rebasing each event to a block-relative
/// offset the unit can split on.
#[derive(Debug, Clone, Default)]
pub struct ParameterTimeline {
    events: Vec<TimedEvent>,
}

impl ParameterTimeline {
    /// An empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `value` on `slot` at absolute frame `time`.
    pub fn push(&mut self, slot: u32, value: f32, time: u64) {
        let at = self.events.partition_point(|e| e.time <= time);
        self.events.insert(at, TimedEvent { slot, value, time });
    }

    /// Number of scheduled events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the script is empty.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in time order.
    pub fn events(&self) -> &[TimedEvent] {
        &self.events
    }

    /// Events landing in `[start, start + len)`, rebased to block-relative
    /// offsets.
    pub fn events_in(&self, start: u64, len: usize) -> Vec<ParameterEvent> {
        let end = start + len as u64;
        let from = self.events.partition_point(|e| e.time < start);
        let to = self.events.partition_point(|e| e.time < end);
        self.events[from..to]
            .iter()
            .map(|e| ParameterEvent::at(e.slot, e.value, (e.time - start) as u32))
            .collect()
    }
}
