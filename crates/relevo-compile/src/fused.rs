//! The fused backend.
//!
//! [`FusedUnit`] is built for the jit source mode: at build time the
//! schedule is flattened into a straight-line op sequence with every tap
//! pre-resolved to a scratch-buffer index, and at run time each op sweeps
//! a whole block segment before the next op starts. No per-frame tap
//! dispatch, no per-frame stage lookup; the interpreter pays both.
//!
//! Output is functionally identical to [`InterpretedUnit`]: same
//! processors, same stage order, same tap summation order.
//!
//! [`InterpretedUnit`]: crate::interp::InterpretedUnit

use relevo_core::{ParameterEvent, RenderUnit};

use crate::nodes::StageProc;
use crate::schedule::{Binding, Schedule, Tap};

/// One flattened stage: processor plus resolved buffer bindings.
#[derive(Debug)]
struct FusedOp {
    proc: StageProc,
    /// Buffers summed into the first input.
    a: Vec<usize>,
    /// Buffers summed into the second input (two-port stages only).
    b: Vec<usize>,
    /// Buffer this op writes. Always greater than every read index.
    out: usize,
}

/// A unit executing the schedule as a pre-resolved op sequence.
///
/// Buffer 0 holds the block input; op `i` writes buffer `i + 1`.
#[derive(Debug)]
pub struct FusedUnit {
    ops: Vec<FusedOp>,
    output: Vec<usize>,
    bindings: Vec<Binding>,
    buffers: Vec<Vec<f32>>,
    slots: u32,
}

fn buffer_of(tap: Tap) -> usize {
    match tap {
        Tap::Source => 0,
        Tap::Stage(i) => i + 1,
    }
}

impl FusedUnit {
    /// Flattens a lowered schedule into the op sequence.
    pub fn new(schedule: Schedule, sample_rate: f32) -> Self {
        let slots = schedule.slot_count();
        let mut ops = Vec::with_capacity(schedule.stages.len());
        for (index, stage) in schedule.stages.iter().enumerate() {
            let mut lanes = [Vec::new(), Vec::new()];
            for (port, taps) in stage.inputs.iter().enumerate() {
                lanes[port] = taps.iter().map(|t| buffer_of(*t)).collect();
            }
            let [a, b] = lanes;
            ops.push(FusedOp {
                proc: StageProc::from_op(&stage.op, sample_rate),
                a,
                b,
                out: index + 1,
            });
        }
        let output = schedule.output.iter().map(|t| buffer_of(*t)).collect();
        let buffers = vec![Vec::new(); schedule.stages.len() + 1];
        Self {
            ops,
            output,
            bindings: schedule.bindings,
            buffers,
            slots,
        }
    }

    fn apply(&mut self, slot: u32, value: f32) {
        for binding in &self.bindings {
            if binding.slot == slot {
                self.ops[binding.stage].proc.set_knob(binding.knob, value);
            }
        }
    }

    /// Runs the op sequence over one event-free segment.
    fn sweep(&mut self, buffer: &mut [f32]) {
        let len = buffer.len().min(self.buffers[0].len());
        debug_assert_eq!(len, buffer.len(), "segment exceeds prepared block size");
        self.buffers[0][..len].copy_from_slice(&buffer[..len]);

        for op in &mut self.ops {
            // Topological order keeps every read index below `out`.
            let (read, rest) = self.buffers.split_at_mut(op.out);
            let dst = &mut rest[0];
            for f in 0..len {
                let mut a = 0.0;
                for &src in &op.a {
                    a += read[src][f];
                }
                let mut b = 0.0;
                for &src in &op.b {
                    b += read[src][f];
                }
                dst[f] = op.proc.tick(a, b);
            }
        }

        for (f, sample) in buffer[..len].iter_mut().enumerate() {
            let mut acc = 0.0;
            for &src in &self.output {
                acc += self.buffers[src][f];
            }
            *sample = acc;
        }
    }
}

impl RenderUnit for FusedUnit {
    fn prepare(&mut self, sample_rate: f32, max_block: usize) {
        for op in &mut self.ops {
            op.proc.set_sample_rate(sample_rate);
        }
        for buffer in &mut self.buffers {
            buffer.clear();
            buffer.resize(max_block.max(1), 0.0);
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
            self.sweep(&mut buffer[pos..end]);
            pos = end;
        }
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
        for op in &mut self.ops {
            op.proc.reset();
        }
    }
}
