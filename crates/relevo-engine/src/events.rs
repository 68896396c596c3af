//! Engine events: the bounded feed from the engine to its observers.
//!
//! Observers (editors, CLI status lines) receive an [`EngineEvent`] for
//! every compile attempt, mode change, validation verdict, and lifecycle
//! transition. The channel is bounded so a stalled observer can never
//! back-pressure the control thread; a full channel drops the event with
//! a warning instead of blocking.

use std::sync::mpsc::{Receiver, SyncSender, TrySendError, sync_channel};

use relevo_core::SourceMode;
use relevo_harness::TestRun;

/// Event channel depth. Bursts larger than this drop their oldest-undrained
/// overflow on the floor.
pub(crate) const EVENT_CAPACITY: usize = 64;

/// Observable engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    /// No compile in flight. There may or may not be an active unit.
    #[default]
    Idle,
    /// A compile request is in the pipeline.
    Compiling,
    /// A built unit is being exercised by the validation harness.
    Validating,
    /// A validated unit is live on the render side.
    Active,
    /// The watchdog tripped; the render side plays silence until a forced
    /// recompile produces a fresh unit.
    Poisoned,
}

impl EngineState {
    /// Stable numeric form for the shared atomic.
    pub(crate) const fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Compiling => 1,
            Self::Validating => 2,
            Self::Active => 3,
            Self::Poisoned => 4,
        }
    }

    /// Inverse of [`to_u8`](Self::to_u8). Unknown values read as `Idle`.
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Compiling,
            2 => Self::Validating,
            3 => Self::Active,
            4 => Self::Poisoned,
            _ => Self::Idle,
        }
    }
}

/// What the engine reports to its observers.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A compile attempt finished. `diagnostic` is `None` on success and
    /// holds the failure text otherwise.
    Recompiled {
        /// Mode the attempt was built for.
        mode: SourceMode,
        /// Failure text, if the attempt did not produce an active unit.
        diagnostic: Option<String>,
    },
    /// The source mode changed.
    ModeChanged(SourceMode),
    /// A validation run finished, pass or fail.
    TestCompleted(TestRun),
    /// The engine lifecycle state changed.
    StateChanged(EngineState),
}

/// Sending half of the event feed, with drop-on-full semantics.
pub(crate) struct EventSink {
    tx: SyncSender<EngineEvent>,
}

impl EventSink {
    /// Creates the bounded feed. The receiver goes to the engine's owner.
    pub(crate) fn channel() -> (Self, Receiver<EngineEvent>) {
        let (tx, rx) = sync_channel(EVENT_CAPACITY);
        (Self { tx }, rx)
    }

    /// Emits an event, dropping it if the observer is behind or gone.
    pub(crate) fn emit(&self, event: EngineEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::warn!(?event, "event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("event receiver dropped, discarding event");
            }
        }
    }
}
