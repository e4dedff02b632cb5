//! Recurring catalog jobs

use super::{BlockTarget, JobKind, ScheduledJob};
use crate::catalog::Catalog;
use crate::context::RunContext;
use crate::db::links;
use crate::models::ObjectType;
use async_trait::async_trait;
use sigcat_common::config::SchedulerConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Platforms and companies first so game searches can anchor on them
const SWEEP_ORDER: [ObjectType; 3] = [ObjectType::Platform, ObjectType::Company, ObjectType::Game];

/// Bulk metadata search over stale objects
pub struct MetadataSweepJob {
    catalog: Catalog,
    interval: Duration,
}

impl MetadataSweepJob {
    pub fn new(catalog: Catalog, interval: Duration) -> Self {
        Self { catalog, interval }
    }
}

#[async_trait]
impl ScheduledJob for MetadataSweepJob {
    fn kind(&self) -> JobKind {
        JobKind::MetadataSweep
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn run(&self, _ctx: &RunContext) -> anyhow::Result<()> {
        let limit = self.catalog.sweep_limit();
        let mut failures = 0;
        for object_type in SWEEP_ORDER {
            // One type failing does not stop the others
            if let Err(e) = self.catalog.matcher().sweep(object_type, limit).await {
                failures += 1;
                warn!(%object_type, error = %e, "Metadata sweep failed");
            }
        }
        if failures == SWEEP_ORDER.len() {
            anyhow::bail!("metadata sweep failed for every object type");
        }
        Ok(())
    }
}

/// Vote consensus tally
pub struct VoteTallyJob {
    catalog: Catalog,
    interval: Duration,
}

impl VoteTallyJob {
    pub fn new(catalog: Catalog, interval: Duration) -> Self {
        Self { catalog, interval }
    }
}

#[async_trait]
impl ScheduledJob for VoteTallyJob {
    fn kind(&self) -> JobKind {
        JobKind::VoteTally
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn blocks(&self) -> Vec<BlockTarget> {
        vec![BlockTarget::Job(JobKind::MetadataSweep)]
    }

    async fn run(&self, _ctx: &RunContext) -> anyhow::Result<()> {
        self.catalog.voting().tally().await?;
        Ok(())
    }
}

/// Creates missing metadata links
pub struct LinkBackfillJob {
    catalog: Catalog,
    interval: Duration,
}

impl LinkBackfillJob {
    pub fn new(catalog: Catalog, interval: Duration) -> Self {
        Self { catalog, interval }
    }
}

#[async_trait]
impl ScheduledJob for LinkBackfillJob {
    fn kind(&self) -> JobKind {
        JobKind::LinkBackfill
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn blocks(&self) -> Vec<BlockTarget> {
        vec![BlockTarget::All]
    }

    async fn run(&self, _ctx: &RunContext) -> anyhow::Result<()> {
        let created = links::backfill_missing(&self.catalog.pool).await?;
        info!(created, "Metadata link backfill finished");
        Ok(())
    }
}

/// The catalog's recurring jobs with intervals from configuration
pub fn default_jobs(catalog: &Catalog, config: &SchedulerConfig) -> Vec<Arc<dyn ScheduledJob>> {
    vec![
        Arc::new(MetadataSweepJob::new(
            catalog.clone(),
            Duration::from_secs(config.metadata_sweep_seconds),
        )),
        Arc::new(VoteTallyJob::new(
            catalog.clone(),
            Duration::from_secs(config.vote_tally_seconds),
        )),
        Arc::new(LinkBackfillJob::new(
            catalog.clone(),
            Duration::from_secs(config.link_backfill_seconds),
        )),
    ]
}
