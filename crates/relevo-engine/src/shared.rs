//! Lock-free state shared between the control thread and the render thread.
//!
//! A cloneable handle around a single atomic block: the host audio format
//! recorded by `prepare`, the observable lifecycle state, and the two
//! watchdog flags. The render thread only ever does atomic loads and
//! stores here; everything heavier lives in the graph holder's mailbox.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use crate::events::EngineState;

/// Host format fallbacks used until `prepare` records the real values.
const DEFAULT_SAMPLE_RATE: f32 = 48_000.0;
const DEFAULT_BLOCK_SIZE: u32 = 512;

struct SharedData {
    /// Host sample rate, stored as `f32` bits.
    sample_rate: AtomicU32,
    /// Host maximum block size in frames.
    block_size: AtomicU32,
    /// Current [`EngineState`] as its `u8` form.
    state: AtomicU8,
    /// Set by the render watchdog; cleared when a fresh unit is adopted.
    poisoned: AtomicBool,
    /// Raised alongside `poisoned`; consumed once by the control thread,
    /// which converts it into a forced recompile.
    needs_recompile: AtomicBool,
}

/// Cloneable handle to the shared engine state.
#[derive(Clone)]
pub(crate) struct EngineShared {
    inner: Arc<SharedData>,
}

impl EngineShared {
    pub(crate) fn new() -> Self {
        Self {
            inner: Arc::new(SharedData {
                sample_rate: AtomicU32::new(DEFAULT_SAMPLE_RATE.to_bits()),
                block_size: AtomicU32::new(DEFAULT_BLOCK_SIZE),
                state: AtomicU8::new(EngineState::Idle.to_u8()),
                poisoned: AtomicBool::new(false),
                needs_recompile: AtomicBool::new(false),
            }),
        }
    }

    // ── Host format ──────────────────────────────────────────────────────

    /// Records the host format. Called from `prepare` on the render side.
    pub(crate) fn set_host_format(&self, sample_rate: f32, block_size: usize) {
        self.inner
            .sample_rate
            .store(sample_rate.to_bits(), Ordering::Release);
        self.inner
            .block_size
            .store(block_size as u32, Ordering::Release);
    }

    /// Last recorded host sample rate.
    pub(crate) fn sample_rate(&self) -> f32 {
        f32::from_bits(self.inner.sample_rate.load(Ordering::Acquire))
    }

    /// Last recorded host block size.
    pub(crate) fn block_size(&self) -> usize {
        self.inner.block_size.load(Ordering::Acquire) as usize
    }

    // ── Lifecycle state ──────────────────────────────────────────────────

    pub(crate) fn set_state(&self, state: EngineState) {
        self.inner.state.store(state.to_u8(), Ordering::Release);
    }

    pub(crate) fn state(&self) -> EngineState {
        EngineState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    // ── Watchdog flags ───────────────────────────────────────────────────

    /// Marks the active unit as untrusted and requests a forced recompile.
    /// Called by the render watchdog.
    pub(crate) fn flag_poisoned(&self) {
        self.inner.poisoned.store(true, Ordering::Release);
        self.inner.needs_recompile.store(true, Ordering::Release);
        self.set_state(EngineState::Poisoned);
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.inner.poisoned.load(Ordering::Acquire)
    }

    /// Clears the poison mark. Called when the render side adopts a
    /// freshly validated unit.
    pub(crate) fn clear_poisoned(&self) {
        self.inner.poisoned.store(false, Ordering::Release);
    }

    /// Takes the forced-recompile request, if one is pending. Returns
    /// `true` at most once per request.
    pub(crate) fn take_needs_recompile(&self) -> bool {
        self.inner.needs_recompile.swap(false, Ordering::AcqRel)
    }
}
