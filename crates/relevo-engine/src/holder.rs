//! Hand-off point between the compile pipeline and the render thread.
//!
//! The control thread parks a validated unit in the mailbox; the render
//! thread adopts it at a block boundary and parks the unit it was running
//! in return. The render side never blocks on the mailbox: it checks an
//! atomic flag first and then `try_lock`s, and on contention simply keeps
//! processing with the unit it already owns. It also never frees memory;
//! retired units ride back through the mailbox and are dropped by the
//! control thread's pump.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use relevo_core::{RenderUnit, UnitMeta};
use std::sync::atomic::{AtomicBool, Ordering};

/// A validated unit waiting for the render thread, with its metadata
/// pre-wrapped so adoption allocates nothing.
struct Parked {
    unit: Box<dyn RenderUnit>,
    meta: Arc<UnitMeta>,
}

/// A displaced unit riding back to the control thread for disposal.
struct Retired {
    unit: Box<dyn RenderUnit>,
    meta: Option<Arc<UnitMeta>>,
}

#[derive(Default)]
struct Mailbox {
    candidate: Option<Parked>,
    retired: Option<Retired>,
}

struct HolderInner {
    mailbox: Mutex<Mailbox>,
    /// Cheap render-side check that skips the lock entirely when nothing
    /// is parked.
    pending: AtomicBool,
    /// Metadata of whatever the render thread currently runs.
    meta: ArcSwapOption<UnitMeta>,
}

/// Cloneable handle to the unit hand-off mailbox.
#[derive(Clone)]
pub(crate) struct GraphHolder {
    inner: Arc<HolderInner>,
}

impl GraphHolder {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(HolderInner {
                mailbox: Mutex::new(Mailbox::default()),
                pending: AtomicBool::new(false),
                meta: ArcSwapOption::const_empty(),
            }),
        }
    }

    // ── Control side ─────────────────────────────────────────────────────

    /// Parks a validated unit for adoption. If an earlier candidate was
    /// never adopted it is superseded and dropped here, on the control
    /// thread.
    pub(crate) fn park(&self, unit: Box<dyn RenderUnit>, meta: UnitMeta) {
        let mut mailbox = self.inner.mailbox.lock();
        if mailbox.candidate.is_some() {
            tracing::debug!("superseding a never-adopted candidate unit");
        }
        mailbox.candidate = Some(Parked {
            unit,
            meta: Arc::new(meta),
        });
        self.inner.pending.store(true, Ordering::Release);
    }

    /// Collects and drops whatever the render thread retired. Returns the
    /// number of units disposed of.
    pub(crate) fn dispose_retired(&self) -> usize {
        let retired = self.inner.mailbox.lock().retired.take();
        match retired {
            Some(_) => 1,
            None => 0,
        }
    }

    /// Metadata of the unit the render thread currently runs, if any.
    pub(crate) fn active_meta(&self) -> Option<UnitMeta> {
        self.inner.meta.load_full().map(|meta| (*meta).clone())
    }

    pub(crate) fn has_active(&self) -> bool {
        self.inner.meta.load().is_some()
    }

    // ── Render side ──────────────────────────────────────────────────────

    /// Adopts a parked candidate if one is ready, exchanging it for
    /// `current`. Returns `true` when the swap happened.
    ///
    /// Wait-free for the render thread: one atomic load when idle, and a
    /// `try_lock` that gives up on contention otherwise. If the previous
    /// retiree has not been collected yet the adoption is deferred a
    /// block, so the render thread never drops a unit itself.
    pub(crate) fn adopt(&self, current: &mut Option<Box<dyn RenderUnit>>) -> bool {
        if !self.inner.pending.load(Ordering::Acquire) {
            return false;
        }
        let Some(mut mailbox) = self.inner.mailbox.try_lock() else {
            return false;
        };
        if mailbox.retired.is_some() {
            return false;
        }
        let Some(parked) = mailbox.candidate.take() else {
            self.inner.pending.store(false, Ordering::Release);
            return false;
        };
        let old_meta = self.inner.meta.swap(Some(parked.meta));
        if let Some(unit) = current.replace(parked.unit) {
            mailbox.retired = Some(Retired {
                unit,
                meta: old_meta,
            });
        }
        self.inner.pending.store(false, Ordering::Release);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relevo_core::{ParameterEvent, SourceMode};

    struct Tagged(u32);

    impl RenderUnit for Tagged {
        fn prepare(&mut self, _sample_rate: f32, _max_block: usize) {}
        fn process(&mut self, buffer: &mut [f32], _events: &[ParameterEvent]) {
            buffer.fill(self.0 as f32);
        }
        fn set_parameter(&mut self, _slot: u32, _value: f32) {}
        fn parameter_count(&self) -> u32 {
            0
        }
        fn reset(&mut self) {}
    }

    fn meta(stamp: u64) -> UnitMeta {
        UnitMeta {
            graph: "test".into(),
            mode: SourceMode::Interpreted,
            stamp,
            parameter_count: 0,
        }
    }

    #[test]
    fn adopt_swaps_unit_and_publishes_meta() {
        let holder = GraphHolder::new();
        let mut current: Option<Box<dyn RenderUnit>> = None;

        assert!(!holder.adopt(&mut current), "nothing parked yet");
        holder.park(Box::new(Tagged(1)), meta(1));
        assert!(holder.adopt(&mut current));
        assert!(current.is_some());
        assert_eq!(holder.active_meta().map(|m| m.stamp), Some(1));

        // First adoption displaced nothing, so there is nothing to collect.
        assert_eq!(holder.dispose_retired(), 0);
    }

    #[test]
    fn displaced_unit_rides_back_for_disposal() {
        let holder = GraphHolder::new();
        let mut current: Option<Box<dyn RenderUnit>> = None;

        holder.park(Box::new(Tagged(1)), meta(1));
        assert!(holder.adopt(&mut current));
        holder.park(Box::new(Tagged(2)), meta(2));
        assert!(holder.adopt(&mut current));

        let mut buffer = [0.0f32; 4];
        if let Some(unit) = current.as_mut() {
            unit.process(&mut buffer, &[]);
        }
        assert_eq!(buffer, [2.0; 4]);
        assert_eq!(holder.dispose_retired(), 1);
        assert_eq!(holder.dispose_retired(), 0);
    }

    #[test]
    fn adoption_defers_while_a_retiree_waits() {
        let holder = GraphHolder::new();
        let mut current: Option<Box<dyn RenderUnit>> = None;

        holder.park(Box::new(Tagged(1)), meta(1));
        assert!(holder.adopt(&mut current));
        holder.park(Box::new(Tagged(2)), meta(2));
        assert!(holder.adopt(&mut current));

        // A third candidate arrives before the pump collected the retiree.
        holder.park(Box::new(Tagged(3)), meta(3));
        assert!(!holder.adopt(&mut current), "retired slot still occupied");
        assert_eq!(holder.active_meta().map(|m| m.stamp), Some(2));

        holder.dispose_retired();
        assert!(holder.adopt(&mut current));
        assert_eq!(holder.active_meta().map(|m| m.stamp), Some(3));
    }

    #[test]
    fn superseded_candidate_is_replaced_in_place() {
        let holder = GraphHolder::new();
        let mut current: Option<Box<dyn RenderUnit>> = None;

        holder.park(Box::new(Tagged(1)), meta(1));
        holder.park(Box::new(Tagged(2)), meta(2));
        assert!(holder.adopt(&mut current));

        let mut buffer = [0.0f32; 2];
        if let Some(unit) = current.as_mut() {
            unit.process(&mut buffer, &[]);
        }
        assert_eq!(buffer, [2.0; 2], "the later candidate wins");
    }
}
