//! The interpreting backend.
//!
//! [`InterpretedUnit`] executes a [`Schedule`] by walking it, stage by
//! stage, once per frame. Always available, cheap to build, and the
//! reference semantics every other backend is measured against.
//!
//! Automation events split the block: processing runs up to each event's
//! frame offset, applies the event, and continues, so a change lands
//! exactly where its timestamp says.

use relevo_core::{ParameterEvent, RenderUnit};

use crate::nodes::StageProc;
use crate::schedule::{Schedule, Tap};

/// A unit that walks the schedule at runtime.
#[derive(Debug)]
pub struct InterpretedUnit {
    schedule: Schedule,
    procs: Vec<StageProc>,
    /// Per-frame stage outputs; stage order guarantees every read hits a
    /// value written earlier in the same frame.
    values: Vec<f32>,
    slots: u32,
}

impl InterpretedUnit {
    /// Builds an interpreter over a lowered schedule.
    pub fn new(schedule: Schedule, sample_rate: f32) -> Self {
        let procs = schedule
            .stages
            .iter()
            .map(|stage| StageProc::from_op(&stage.op, sample_rate))
            .collect();
        Self::from_parts(schedule, procs)
    }

    /// Builds an interpreter around externally constructed processors.
    ///
    /// `procs` must parallel `schedule.stages`.
    pub(crate) fn from_parts(schedule: Schedule, procs: Vec<StageProc>) -> Self {
        debug_assert_eq!(procs.len(), schedule.stages.len());
        let values = vec![0.0; schedule.stages.len()];
        let slots = schedule.slot_count();
        Self {
            schedule,
            procs,
            values,
            slots,
        }
    }

    fn apply(&mut self, slot: u32, value: f32) {
        for binding in &self.schedule.bindings {
            if binding.slot == slot {
                self.procs[binding.stage].set_knob(binding.knob, value);
            }
        }
    }

    #[inline]
    fn frame(&mut self, input: f32) -> f32 {
        for (index, proc) in self.procs.iter_mut().enumerate() {
            let stage = &self.schedule.stages[index];
            let mut acc = [0.0f32; 2];
            for (port, taps) in stage.inputs.iter().enumerate() {
                for tap in taps {
                    acc[port] += match *tap {
                        Tap::Source => input,
                        Tap::Stage(i) => self.values[i],
                    };
                }
            }
            self.values[index] = proc.tick(acc[0], acc[1]);
        }
        let mut out = 0.0;
        for tap in &self.schedule.output {
            out += match *tap {
                Tap::Source => input,
                Tap::Stage(i) => self.values[i],
            };
        }
        out
    }
}

impl RenderUnit for InterpretedUnit {
    fn prepare(&mut self, sample_rate: f32, _max_block: usize) {
        for proc in &mut self.procs {
            proc.set_sample_rate(sample_rate);
        }
    }

    fn process(&mut self, buffer: &mut [f32], events: &[ParameterEvent]) {
        let mut pos = 0;
        let mut next = 0;
        while pos < buffer.len() {
            while next < events.len() && events[next].offset as usize <= pos {
                self.apply(events[next].slot, events[next].value);
                next += 1;
            }
            let end = events
                .get(next)
                .map_or(buffer.len(), |e| (e.offset as usize).min(buffer.len()));
            for sample in &mut buffer[pos..end] {
                *sample = self.frame(*sample);
            }
            pos = end;
        }
        // Offsets at or past the block end still take effect for the next one.
        for event in &events[next..] {
            self.apply(event.slot, event.value);
        }
    }

    fn set_parameter(&mut self, slot: u32, value: f32) {
        self.apply(slot, value);
    }

    fn parameter_count(&self) -> u32 {
        self.slots
    }

    fn reset(&mut self) {
        for proc in &mut self.procs {
            proc.reset();
        }
    }
}
