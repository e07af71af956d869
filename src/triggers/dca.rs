use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builder::VenueTag;
use crate::coordinator::types::TradeIntent;
use crate::coordinator::Coordinator;
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus};
use crate::utils::time::now_ts;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DcaRecord {
    pub id: String,
    pub mint: String,
    pub sol_per_interval: f64,
    pub interval_ms: u64,
    pub total_intervals: u32,
    pub completed_intervals: u32,
    pub enabled: bool,
    pub next_execution_ms: u64,
    pub wallets: Option<Vec<String>>,
    pub venue: Option<VenueTag>,
}

/// Time-based buying. Each active record owns one timer task; pausing
/// stops the timer and keeps the progress counter.
pub struct DcaScheduler {
    records: DashMap<String, DcaRecord>,
    timers: DashMap<String, JoinHandle<()>>,
    coordinator: Arc<Coordinator>,
    events: EventBus,
}

impl DcaScheduler {
    pub fn new(coordinator: Arc<Coordinator>, events: EventBus) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            timers: DashMap::new(),
            coordinator,
            events,
        })
    }

    pub fn schedule(
        self: &Arc<Self>,
        mint: &str,
        sol_per_interval: f64,
        interval_ms: u64,
        total_intervals: u32,
        wallets: Option<Vec<String>>,
        venue: Option<VenueTag>,
    ) -> Result<String> {
        if sol_per_interval <= 0.0 {
            return Err(AppError::Config("DCA amount must be positive".into()));
        }
        if interval_ms == 0 || total_intervals == 0 {
            return Err(AppError::Config("DCA interval and count must be positive".into()));
        }

        let id = Uuid::new_v4().to_string();
        self.records.insert(
            id.clone(),
            DcaRecord {
                id: id.clone(),
                mint: mint.to_string(),
                sol_per_interval,
                interval_ms,
                total_intervals,
                completed_intervals: 0,
                enabled: true,
                next_execution_ms: now_ts() + interval_ms,
                wallets,
                venue,
            },
        );
        self.spawn_timer(&id, interval_ms);

        info!(
            "DCA {} scheduled: {} SOL into {} every {}ms x {}",
            id, sol_per_interval, mint, interval_ms, total_intervals
        );
        Ok(id)
    }

    pub fn list(&self) -> Vec<DcaRecord> {
        self.records.iter().map(|r| r.clone()).collect()
    }

    pub fn get(&self, id: &str) -> Option<DcaRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    pub fn cancel(&self, id: &str) -> Result<()> {
        if let Some((_, handle)) = self.timers.remove(id) {
            handle.abort();
        }
        self.records
            .remove(id)
            .map(|_| info!("DCA {} cancelled", id))
            .ok_or_else(|| AppError::Config(format!("unknown DCA {}", id)))
    }

    pub fn pause(&self, id: &str) -> Result<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| AppError::Config(format!("unknown DCA {}", id)))?;
        record.enabled = false;
        drop(record);

        if let Some((_, handle)) = self.timers.remove(id) {
            handle.abort();
        }
        info!("DCA {} paused", id);
        Ok(())
    }

    pub fn resume(self: &Arc<Self>, id: &str) -> Result<()> {
        let interval_ms = {
            let mut record = self
                .records
                .get_mut(id)
                .ok_or_else(|| AppError::Config(format!("unknown DCA {}", id)))?;
            record.enabled = true;
            record.next_execution_ms = now_ts() + record.interval_ms;
            record.interval_ms
        };

        self.spawn_timer(id, interval_ms);
        info!("DCA {} resumed", id);
        Ok(())
    }

    pub fn destroy(&self) {
        for entry in self.timers.iter() {
            entry.abort();
        }
        self.timers.clear();
        info!("DCA scheduler stopped");
    }

    fn spawn_timer(self: &Arc<Self>, id: &str, interval_ms: u64) {
        let scheduler = Arc::clone(self);
        let id_owned = id.to_string();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
            interval.tick().await; // consume the immediate first tick
            loop {
                interval.tick().await;
                if scheduler.tick(&id_owned).await {
                    break;
                }
            }
        });

        if let Some(old) = self.timers.insert(id.to_string(), handle) {
            old.abort();
        }
    }

    /// One interval firing. Returns true when the record is finished (or
    /// gone) and the timer should stop. Public so tests can drive ticks.
    pub async fn tick(self: &Arc<Self>, id: &str) -> bool {
        let record = match self.records.get(id) {
            Some(r) => r.clone(),
            None => return true,
        };
        if !record.enabled {
            debug!("DCA {} disabled, skipping tick", id);
            return false;
        }

        let mut intent = TradeIntent::buy(&record.mint, record.sol_per_interval);
        intent.wallets = record.wallets.clone();
        intent.venue = record.venue;

        match self.coordinator.coordinated_buy(intent).await {
            Ok(result) => {
                let (completed, finished) = {
                    let mut entry = match self.records.get_mut(id) {
                        Some(e) => e,
                        None => return true,
                    };
                    entry.completed_intervals += 1;
                    entry.next_execution_ms = now_ts() + entry.interval_ms;
                    (
                        entry.completed_intervals,
                        entry.completed_intervals >= entry.total_intervals,
                    )
                };

                debug!(
                    "DCA {} tick {}/{}: {}/{} wallets ok",
                    id,
                    completed,
                    record.total_intervals,
                    result.succeeded(),
                    result.wallet_results.len()
                );
                self.events.publish(Event::DcaExecuted {
                    id: id.to_string(),
                    mint: record.mint.clone(),
                    completed,
                    total: record.total_intervals,
                });

                if finished {
                    self.records.remove(id);
                    self.timers.remove(id);
                    info!("DCA {} completed", id);
                    self.events.publish(Event::DcaCompleted {
                        id: id.to_string(),
                        mint: record.mint,
                    });
                    return true;
                }
                false
            }
            Err(e) => {
                // The record stays armed; the next tick retries.
                warn!("DCA {} tick failed: {}", id, e);
                self.events.publish(Event::DcaError {
                    id: id.to_string(),
                    mint: record.mint,
                    error: e.to_string(),
                });
                false
            }
        }
    }
}
