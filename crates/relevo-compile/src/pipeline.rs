//! The background compile worker.
//!
//! [`CompilePipeline`] owns a dedicated thread that turns netlist text
//! into render units, strictly off the render path. The protocol is
//! latest-wins throughout:
//!
//! - every submission gets a monotonically increasing request id
//! - the worker coalesces its inbox to the newest job before building
//! - a finished build whose id is no longer the newest submitted id is
//!   discarded without delivery
//!
//! There is no cancellation signal; a stale build simply completes and its
//! result is suppressed. Builds are bounded by a wall-clock budget checked
//! between phases (parse, validate, build, lower); blowing the budget
//! yields [`CompileError::Timeout`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use relevo_core::{RenderUnit, SourceMode};
use tracing::{debug, warn};

use crate::error::CompileError;
use crate::fused::FusedUnit;
use crate::interp::InterpretedUnit;
use crate::library::{DynamicArtifact, LibraryUnit};
use crate::parse::parse_netlist;
use crate::schedule::Schedule;

/// A successfully built candidate. Not yet validated; the harness gets it
/// before the render thread ever does.
pub struct BuiltUnit {
    /// The unit, ready for harness preparation.
    pub unit: Box<dyn RenderUnit>,
    /// Name of the graph it was built from.
    pub graph: String,
    /// Automation slots the unit responds to.
    pub slots: u32,
}

impl std::fmt::Debug for BuiltUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltUnit")
            .field("graph", &self.graph)
            .field("slots", &self.slots)
            .finish_non_exhaustive()
    }
}

/// Outcome of one compile request.
#[derive(Debug)]
pub struct CompileOutcome {
    /// Request id assigned at submission.
    pub id: u64,
    /// Mode the request was built for.
    pub mode: SourceMode,
    /// Wall time the build took.
    pub elapsed: Duration,
    /// The built unit, or why the build failed.
    pub result: Result<BuiltUnit, CompileError>,
}

struct Job {
    id: u64,
    text: String,
    mode: SourceMode,
    sample_rate: f32,
    artifact: Option<Arc<DynamicArtifact>>,
}

/// Handle to the compile worker thread.
pub struct CompilePipeline {
    jobs: Option<mpsc::Sender<Job>>,
    outcomes: mpsc::Receiver<CompileOutcome>,
    /// Newest submitted id; the worker reads it to suppress stale work.
    latest: Arc<AtomicU64>,
    next_id: u64,
    worker: Option<thread::JoinHandle<()>>,
}

impl CompilePipeline {
    /// Spawns the worker with a per-build wall-clock budget.
    pub fn new(timeout: Duration) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (out_tx, out_rx) = mpsc::channel::<CompileOutcome>();
        let latest = Arc::new(AtomicU64::new(0));

        let worker_latest = Arc::clone(&latest);
        let worker = thread::Builder::new()
            .name("relevo-compile".into())
            .spawn(move || worker_loop(&job_rx, &out_tx, &worker_latest, timeout));
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("failed to spawn compile worker: {e}");
                None
            }
        };

        Self {
            jobs: Some(job_tx),
            outcomes: out_rx,
            latest,
            next_id: 0,
            worker,
        }
    }

    /// Submits netlist text for compilation and returns its request id.
    ///
    /// `artifact` is the bound library for dynamic-mode requests; other
    /// modes ignore it.
    pub fn submit(
        &mut self,
        text: impl Into<String>,
        mode: SourceMode,
        sample_rate: f32,
        artifact: Option<Arc<DynamicArtifact>>,
    ) -> Result<u64, CompileError> {
        self.next_id += 1;
        let id = self.next_id;
        self.latest.store(id, Ordering::Release);

        let job = Job {
            id,
            text: text.into(),
            mode,
            sample_rate,
            artifact,
        };
        match &self.jobs {
            Some(tx) if tx.send(job).is_ok() => Ok(id),
            _ => Err(CompileError::WorkerGone),
        }
    }

    /// Id of the most recent submission, 0 before the first.
    pub fn latest_id(&self) -> u64 {
        self.latest.load(Ordering::Acquire)
    }

    /// Drains finished builds, returning the newest still-current one.
    ///
    /// Never blocks. Results superseded between delivery and this call are
    /// dropped here; the worker already suppresses ones superseded during
    /// the build.
    pub fn try_outcome(&self) -> Option<CompileOutcome> {
        let mut fresh = None;
        while let Ok(outcome) = self.outcomes.try_recv() {
            if outcome.id == self.latest.load(Ordering::Acquire) {
                fresh = Some(outcome);
            } else {
                debug!(id = outcome.id, "discarding superseded compile result");
            }
        }
        fresh
    }
}

impl Drop for CompilePipeline {
    fn drop(&mut self) {
        // Closing the inbox ends the worker loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            worker.join().ok();
        }
    }
}

fn worker_loop(
    jobs: &mpsc::Receiver<Job>,
    outcomes: &mpsc::Sender<CompileOutcome>,
    latest: &AtomicU64,
    budget: Duration,
) {
    while let Ok(mut job) = jobs.recv() {
        // Coalesce: a burst of edits builds once, from the newest text.
        while let Ok(newer) = jobs.try_recv() {
            debug!(superseded = job.id, by = newer.id, "coalescing compile request");
            job = newer;
        }
        if job.id != latest.load(Ordering::Acquire) {
            continue;
        }

        let id = job.id;
        let outcome = build(job, budget);
        if outcome.id != latest.load(Ordering::Acquire) {
            debug!(id, "suppressing stale compile result");
            continue;
        }
        if outcomes.send(outcome).is_err() {
            break;
        }
    }
}

fn build(job: Job, budget: Duration) -> CompileOutcome {
    let started = Instant::now();
    let result = run_phases(&job, started, budget);
    let elapsed = started.elapsed();
    match &result {
        Ok(built) => debug!(
            id = job.id,
            mode = %job.mode,
            graph = %built.graph,
            elapsed_us = elapsed.as_micros() as u64,
            "compile finished"
        ),
        Err(e) => debug!(id = job.id, mode = %job.mode, error = %e, "compile failed"),
    }
    CompileOutcome {
        id: job.id,
        mode: job.mode,
        elapsed,
        result,
    }
}

fn run_phases(
    job: &Job,
    started: Instant,
    budget: Duration,
) -> Result<BuiltUnit, CompileError> {
    // parse
    let graph = parse_netlist(&job.text)?;
    deadline(job.id, started, budget)?;

    // validate
    graph.validate()?;
    deadline(job.id, started, budget)?;

    // build
    let schedule = Schedule::from_graph(&graph)?;
    deadline(job.id, started, budget)?;

    // lower
    let graph_name = schedule.graph_name.clone();
    let slots = schedule.slot_count();
    let unit: Box<dyn RenderUnit> = match job.mode {
        SourceMode::Interpreted | SourceMode::CustomCode => {
            Box::new(InterpretedUnit::new(schedule, job.sample_rate))
        }
        SourceMode::JitCompiled => Box::new(FusedUnit::new(schedule, job.sample_rate)),
        SourceMode::DynamicLibrary => match &job.artifact {
            Some(artifact) => {
                Box::new(LibraryUnit::from_schedule(schedule, artifact, job.sample_rate)?)
            }
            None => {
                // The controller refuses the mode switch without a bound
                // artifact, so this is a belt for hand-driven pipelines.
                warn!(id = job.id, "dynamic request without an artifact, interpreting");
                Box::new(InterpretedUnit::new(schedule, job.sample_rate))
            }
        },
    };

    Ok(BuiltUnit {
        unit,
        graph: graph_name,
        slots,
    })
}

fn deadline(id: u64, started: Instant, budget: Duration) -> Result<(), CompileError> {
    if started.elapsed() >= budget {
        Err(CompileError::Timeout {
            id,
            timeout_ms: budget.as_millis() as u64,
        })
    } else {
        Ok(())
    }
}
