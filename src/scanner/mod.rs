//! Periodic queue scanner
//!
//! Every tick reads the pending entities (NOT_SYNCED or FAILED, oldest
//! first) and asks the engine to start one workflow each. Starting is
//! deduplicated by execution key, so a tick overlapping a still-running
//! sync is harmless. Store trouble is logged and the tick skipped; the
//! scanner itself never dies.

use crate::error::Result;
use crate::records::RecordStore;
use crate::workflow::{StartOutcome, SyncEngine};
use std::time::Duration;
use tracing::{debug, info, warn};

pub struct Scanner {
    records: RecordStore,
    engine: SyncEngine,
    interval: Duration,
    batch_limit: usize,
}

impl Scanner {
    pub fn new(
        records: RecordStore,
        engine: SyncEngine,
        interval: Duration,
        batch_limit: usize,
    ) -> Self {
        Self {
            records,
            engine,
            interval,
            batch_limit,
        }
    }

    /// Run scan ticks forever
    pub async fn run(&self) -> Result<()> {
        info!("Scanner started, scanning every {:?}", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            self.tick().await;
        }
    }

    /// One scan pass; returns how many workflow executions were started
    pub async fn tick(&self) -> usize {
        let pending = match self.records.list_pending(self.batch_limit).await {
            Ok(pending) => pending,
            Err(e) => {
                warn!("Scan tick skipped, could not list pending entities: {}", e);
                return 0;
            }
        };

        if pending.is_empty() {
            debug!("Scan tick found nothing to sync");
            return 0;
        }

        let mut started = 0;
        for entity in pending {
            let kind = match entity.entity_kind() {
                Ok(kind) => kind,
                Err(e) => {
                    warn!("Skipping pending entity {}: {}", entity.id, e);
                    continue;
                }
            };

            match self.engine.start(kind, &entity.id).await {
                Ok(StartOutcome::Started) => {
                    debug!("Enqueued {} {} for sync", kind, entity.id);
                    started += 1;
                }
                Ok(StartOutcome::AlreadyRunning) => {
                    debug!("{} {} already has a running sync", kind, entity.id);
                }
                Err(e) => {
                    warn!("Could not enqueue {} {}: {}", kind, entity.id, e);
                }
            }
        }

        info!("Scan tick started {} sync execution(s)", started);
        started
    }
}
