//! The render-thread half of the engine.
//!
//! [`AudioRenderEntry`] is handed to the audio host once and lives on the
//! render thread from then on. Per block it adopts any pending unit swap,
//! applies queued parameter changes, runs the active unit, and keeps a
//! watchdog on the output: a block containing non-finite samples is
//! scrubbed to silence, and after enough consecutive bad blocks the unit
//! is poisoned and the control thread is asked for a forced recompile.

use relevo_core::{ParameterEvent, RenderUnit};
use rtrb::Consumer;

use crate::events::EngineState;
use crate::holder::GraphHolder;
use crate::shared::EngineShared;

/// Real-time entry point owned by the audio host.
///
/// Not `Sync`; the host drives it from a single render thread. All work
/// in [`process`](Self::process) is wait-free against the control thread.
pub struct AudioRenderEntry {
    holder: GraphHolder,
    shared: EngineShared,
    params: Consumer<ParameterEvent>,
    unit: Option<Box<dyn RenderUnit>>,
    bad_blocks: u32,
    poison_after: u32,
}

impl AudioRenderEntry {
    pub(crate) fn new(
        holder: GraphHolder,
        shared: EngineShared,
        params: Consumer<ParameterEvent>,
        poison_after: u32,
    ) -> Self {
        Self {
            holder,
            shared,
            params,
            unit: None,
            bad_blocks: 0,
            poison_after,
        }
    }

    /// Records the host format and forwards it to the unit currently
    /// owned, if any. Units adopted later were already prepared with this
    /// exact format by the validation harness.
    pub fn prepare(&mut self, sample_rate: f32, max_block: usize) {
        self.shared.set_host_format(sample_rate, max_block);
        if let Some(unit) = self.unit.as_mut() {
            unit.prepare(sample_rate, max_block);
        }
    }

    /// Renders one block in place.
    ///
    /// Queued parameter changes from the control thread are applied before
    /// the block; `events` are the host's own sample-accurate changes and
    /// go to the unit untouched. With no unit adopted yet, or while
    /// poisoned, the buffer is silenced and nothing is consumed.
    pub fn process(&mut self, buffer: &mut [f32], events: &[ParameterEvent]) {
        if self.holder.adopt(&mut self.unit) {
            self.bad_blocks = 0;
            self.shared.clear_poisoned();
            self.shared.set_state(EngineState::Active);
        }

        if self.shared.is_poisoned() {
            buffer.fill(0.0);
            return;
        }
        let Some(unit) = self.unit.as_mut() else {
            buffer.fill(0.0);
            return;
        };

        while let Ok(event) = self.params.pop() {
            unit.set_parameter(event.slot, event.value);
        }

        unit.process(buffer, events);

        if buffer.iter().all(|sample| sample.is_finite()) {
            self.bad_blocks = 0;
        } else {
            buffer.fill(0.0);
            self.bad_blocks += 1;
            if self.bad_blocks >= self.poison_after {
                self.shared.flag_poisoned();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relevo_core::{SourceMode, UnitMeta};
    use rtrb::RingBuffer;

    /// Writes its gain value; `set_parameter(0, v)` changes the gain.
    struct GainFake {
        gain: f32,
    }

    impl RenderUnit for GainFake {
        fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {}
        fn process(&mut self, buffer: &mut [f32], events: &[ParameterEvent]) {
            for event in events {
                self.set_parameter(event.slot, event.value);
            }
            buffer.fill(self.gain);
        }
        fn set_parameter(&mut self, slot: u32, value: f32) {
            if slot == 0 {
                self.gain = value;
            }
        }
        fn parameter_count(&self) -> u32 {
            1
        }
        fn reset(&mut self) {}
    }

    /// Emits NaN on the call indices in `bad`, clean output otherwise.
    struct NanFake {
        calls: u32,
        bad: std::ops::Range<u32>,
    }

    impl RenderUnit for NanFake {
        fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {}
        fn process(&mut self, buffer: &mut [f32], _events: &[ParameterEvent]) {
            let value = if self.bad.contains(&self.calls) {
                f32::NAN
            } else {
                0.25
            };
            self.calls += 1;
            buffer.fill(value);
        }
        fn set_parameter(&mut self, _slot: u32, _value: f32) {}
        fn parameter_count(&self) -> u32 {
            0
        }
        fn reset(&mut self) {}
    }

    fn meta() -> UnitMeta {
        UnitMeta {
            graph: "fake".into(),
            mode: SourceMode::Interpreted,
            stamp: 1,
            parameter_count: 1,
        }
    }

    fn entry(poison_after: u32) -> (AudioRenderEntry, rtrb::Producer<ParameterEvent>) {
        let (tx, rx) = RingBuffer::new(8);
        let holder = GraphHolder::new();
        let shared = EngineShared::new();
        (AudioRenderEntry::new(holder, shared, rx, poison_after), tx)
    }

    #[test]
    fn silence_until_a_unit_is_adopted() {
        let (mut entry, _tx) = entry(2);
        let mut buffer = [0.7f32; 16];
        entry.process(&mut buffer, &[]);
        assert_eq!(buffer, [0.0; 16]);
    }

    #[test]
    fn adoption_happens_at_the_block_boundary() {
        let (mut entry, _tx) = entry(2);
        entry.holder.park(Box::new(GainFake { gain: 0.5 }), meta());

        let mut buffer = [0.0f32; 8];
        entry.process(&mut buffer, &[]);
        assert_eq!(buffer, [0.5; 8]);
        assert_eq!(entry.shared.state(), EngineState::Active);
    }

    #[test]
    fn queued_parameters_apply_before_the_block() {
        let (mut entry, mut tx) = entry(2);
        entry.holder.park(Box::new(GainFake { gain: 0.5 }), meta());

        let mut buffer = [0.0f32; 4];
        entry.process(&mut buffer, &[]);

        assert!(tx.push(ParameterEvent::new(0, 0.125)).is_ok());
        entry.process(&mut buffer, &[]);
        assert_eq!(buffer, [0.125; 4]);
    }

    #[test]
    fn host_events_reach_the_unit_unchanged() {
        let (mut entry, _tx) = entry(2);
        entry.holder.park(Box::new(GainFake { gain: 0.5 }), meta());

        let mut buffer = [0.0f32; 4];
        entry.process(&mut buffer, &[ParameterEvent::at(0, 0.25, 2)]);
        assert_eq!(buffer, [0.25; 4]);
    }

    #[test]
    fn one_bad_block_is_scrubbed_but_forgiven() {
        let (mut entry, _tx) = entry(2);
        entry.holder.park(
            Box::new(NanFake {
                calls: 0,
                bad: 1..2,
            }),
            meta(),
        );

        let mut buffer = [0.0f32; 8];
        entry.process(&mut buffer, &[]); // clean
        entry.process(&mut buffer, &[]); // NaN, scrubbed
        assert_eq!(buffer, [0.0; 8]);
        assert!(!entry.shared.is_poisoned());

        // The unit recovers, so the consecutive counter resets and a later
        // isolated bad block still does not reach the threshold of two.
        entry.process(&mut buffer, &[]);
        assert_eq!(buffer, [0.25; 8]);
        entry.unit = Some(Box::new(NanFake {
            calls: 0,
            bad: 0..1,
        }));
        entry.process(&mut buffer, &[]);
        assert!(!entry.shared.is_poisoned());
    }

    #[test]
    fn consecutive_bad_blocks_poison_and_silence() {
        let (mut entry, _tx) = entry(2);
        entry.holder.park(
            Box::new(NanFake {
                calls: 0,
                bad: 0..u32::MAX,
            }),
            meta(),
        );

        let mut buffer = [0.0f32; 8];
        entry.process(&mut buffer, &[]);
        assert!(!entry.shared.is_poisoned(), "first bad block only scrubs");
        entry.process(&mut buffer, &[]);
        assert!(entry.shared.is_poisoned());
        assert!(entry.shared.take_needs_recompile());
        assert_eq!(entry.shared.state(), EngineState::Poisoned);

        // From here on the unit is not run at all.
        entry.process(&mut buffer, &[]);
        assert_eq!(buffer, [0.0; 8]);
    }

    #[test]
    fn adopting_a_fresh_unit_clears_the_poison() {
        let (mut entry, _tx) = entry(1);
        entry.holder.park(
            Box::new(NanFake {
                calls: 0,
                bad: 0..u32::MAX,
            }),
            meta(),
        );

        let mut buffer = [0.0f32; 8];
        entry.process(&mut buffer, &[]);
        entry.process(&mut buffer, &[]);
        assert!(entry.shared.is_poisoned());

        entry.holder.dispose_retired();
        entry.holder.park(Box::new(GainFake { gain: 0.5 }), meta());
        entry.process(&mut buffer, &[]);
        assert!(!entry.shared.is_poisoned());
        assert_eq!(buffer, [0.5; 8]);
    }
}
