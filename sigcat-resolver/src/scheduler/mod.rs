//! Background scheduler
//!
//! One poll loop fires every tick and owns a registry of recurring jobs. A job
//! starts on a tick when all of these hold:
//! - it is not disabled and not already running
//! - its interval has elapsed since its last start, or it was forced
//! - no running job blocks it
//!
//! Blocking is declared by the blocker ("while I run, X may not start", or
//! "nothing may start") and is evaluated against the live running set on
//! every tick. Different jobs may overlap; a job never overlaps itself.
//!
//! Each run gets a fresh [`RunContext`]; its span carries the correlation id
//! through everything the job logs.

pub mod jobs;

use crate::context::RunContext;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

pub use jobs::{default_jobs, LinkBackfillJob, MetadataSweepJob, VoteTallyJob};

/// Recurring job types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum JobKind {
    MetadataSweep,
    VoteTally,
    LinkBackfill,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::MetadataSweep => "MetadataSweep",
            JobKind::VoteTally => "VoteTally",
            JobKind::LinkBackfill => "LinkBackfill",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a running job keeps from starting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockTarget {
    Job(JobKind),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    NeverStarted,
    Running,
    Stopped,
    Disabled,
}

/// A recurring unit of background work
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    fn kind(&self) -> JobKind;

    /// Minimum time between two starts
    fn interval(&self) -> Duration;

    /// Jobs that may not start while this one runs
    fn blocks(&self) -> Vec<BlockTarget> {
        Vec::new()
    }

    async fn run(&self, ctx: &RunContext) -> anyhow::Result<()>;
}

/// Whether a job of `kind` is blocked by the currently running jobs
pub fn is_blocked(kind: JobKind, running: &[(JobKind, Vec<BlockTarget>)]) -> bool {
    running
        .iter()
        .filter(|(other, _)| *other != kind)
        .any(|(_, blocks)| {
            blocks
                .iter()
                .any(|target| matches!(target, BlockTarget::All) || *target == BlockTarget::Job(kind))
        })
}

/// Whether the interval since the last start has elapsed
pub fn is_due(last_started: Option<Instant>, interval: Duration, now: Instant) -> bool {
    match last_started {
        None => true,
        Some(started) => now.saturating_duration_since(started) >= interval,
    }
}

/// Point-in-time view of one registered job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub kind: JobKind,
    pub status: JobStatus,
    pub interval_secs: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub runs: u64,
}

struct JobEntry {
    job: Arc<dyn ScheduledJob>,
    running: bool,
    disabled: bool,
    forced: bool,
    last_started: Option<Instant>,
    last_started_at: Option<DateTime<Utc>>,
    last_finished_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    runs: u64,
    handle: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn new(job: Arc<dyn ScheduledJob>) -> Self {
        Self {
            job,
            running: false,
            disabled: false,
            forced: false,
            last_started: None,
            last_started_at: None,
            last_finished_at: None,
            last_error: None,
            runs: 0,
            handle: None,
        }
    }

    fn status(&self) -> JobStatus {
        if self.disabled {
            JobStatus::Disabled
        } else if self.running {
            JobStatus::Running
        } else if self.last_started.is_none() {
            JobStatus::NeverStarted
        } else {
            JobStatus::Stopped
        }
    }

    fn snapshot(&self) -> JobSnapshot {
        JobSnapshot {
            kind: self.job.kind(),
            status: self.status(),
            interval_secs: self.job.interval().as_secs(),
            last_started: self.last_started_at,
            last_finished: self.last_finished_at,
            last_error: self.last_error.clone(),
            runs: self.runs,
        }
    }
}

/// Job registry and poll loop
#[derive(Clone)]
pub struct Scheduler {
    jobs: Arc<Mutex<BTreeMap<JobKind, JobEntry>>>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(tick: Duration) -> Self {
        Self {
            jobs: Arc::new(Mutex::new(BTreeMap::new())),
            tick,
        }
    }

    /// Register a job, replacing any job of the same kind
    pub async fn register(&self, job: Arc<dyn ScheduledJob>) {
        let kind = job.kind();
        self.jobs.lock().await.insert(kind, JobEntry::new(job));
        debug!(job = %kind, "Job registered");
    }

    /// Start the job on the next tick regardless of its interval
    pub async fn force(&self, kind: JobKind) -> bool {
        self.update(kind, |entry| entry.forced = true).await
    }

    pub async fn disable(&self, kind: JobKind) -> bool {
        self.update(kind, |entry| entry.disabled = true).await
    }

    pub async fn enable(&self, kind: JobKind) -> bool {
        self.update(kind, |entry| entry.disabled = false).await
    }

    async fn update(&self, kind: JobKind, f: impl FnOnce(&mut JobEntry)) -> bool {
        match self.jobs.lock().await.get_mut(&kind) {
            Some(entry) => {
                f(entry);
                true
            }
            None => false,
        }
    }

    pub async fn status(&self, kind: JobKind) -> Option<JobStatus> {
        self.jobs.lock().await.get(&kind).map(JobEntry::status)
    }

    pub async fn snapshot(&self) -> Vec<JobSnapshot> {
        self.jobs
            .lock()
            .await
            .values()
            .map(JobEntry::snapshot)
            .collect()
    }

    /// Evaluate every job once and start those that may run; returns the
    /// kinds started on this tick
    pub async fn tick(&self) -> Vec<JobKind> {
        let now = Instant::now();
        let mut jobs = self.jobs.lock().await;

        let mut running: Vec<(JobKind, Vec<BlockTarget>)> = jobs
            .iter()
            .filter(|(_, entry)| entry.running)
            .map(|(kind, entry)| (*kind, entry.job.blocks()))
            .collect();

        let mut started = Vec::new();
        for (kind, entry) in jobs.iter_mut() {
            if entry.disabled || entry.running {
                continue;
            }
            if !entry.forced && !is_due(entry.last_started, entry.job.interval(), now) {
                continue;
            }
            if is_blocked(*kind, &running) {
                debug!(job = %kind, "Job blocked by a running job");
                continue;
            }

            entry.running = true;
            entry.forced = false;
            entry.last_started = Some(now);
            entry.last_started_at = Some(Utc::now());
            entry.runs += 1;
            entry.handle = Some(self.spawn_run(entry.job.clone()));

            running.push((*kind, entry.job.blocks()));
            started.push(*kind);
        }
        started
    }

    fn spawn_run(&self, job: Arc<dyn ScheduledJob>) -> JoinHandle<()> {
        let jobs = Arc::clone(&self.jobs);
        let kind = job.kind();
        let ctx = RunContext::new(kind.as_str());
        let span = ctx.span();

        tokio::spawn(
            async move {
                info!("Job started");
                let started = Instant::now();

                // Run in its own task so a panic still marks the job stopped
                let inner = tokio::spawn(async move { job.run(&ctx).await }.in_current_span());
                let outcome = match inner.await {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(format!("{:#}", e)),
                    Err(e) => Some(format!("job task failed: {}", e)),
                };

                match &outcome {
                    None => info!(elapsed_ms = started.elapsed().as_millis() as u64, "Job finished"),
                    Some(e) => error!(error = %e, "Job failed"),
                }

                let mut jobs = jobs.lock().await;
                if let Some(entry) = jobs.get_mut(&kind) {
                    entry.running = false;
                    entry.last_finished_at = Some(Utc::now());
                    entry.last_error = outcome;
                    entry.handle = None;
                }
            }
            .instrument(span),
        )
    }

    /// Wait for every running job to finish
    pub async fn wait_idle(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .jobs
            .lock()
            .await
            .values_mut()
            .filter_map(|entry| entry.handle.take())
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Job wrapper task failed");
            }
        }
    }

    /// Tick until cancelled, then wait for running jobs
    pub async fn run(&self, cancel: CancellationToken) {
        info!(tick_secs = self.tick.as_secs_f64(), "Scheduler started");
        let mut ticker = tokio::time::interval(self.tick);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let started = self.tick().await;
                    if !started.is_empty() {
                        debug!(jobs = ?started, "Jobs started");
                    }
                }
            }
        }

        info!("Scheduler stopping, waiting for running jobs");
        self.wait_idle().await;
        info!("Scheduler stopped");
    }
}
