use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::builder::VenueTag;
use crate::coordinator::types::TradeIntent;
use crate::coordinator::Coordinator;
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus};
use crate::price::PriceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerKind {
    StopLoss,
    TakeProfit,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub id: String,
    pub kind: TriggerKind,
    pub mint: String,
    pub trigger_price: f64,
    pub sell_percent: f64,
    pub enabled: bool,
    pub wallets: Option<Vec<String>>,
    pub venue: Option<VenueTag>,
}

impl TriggerRecord {
    fn fires_at(&self, current: f64) -> bool {
        match self.kind {
            TriggerKind::StopLoss => current <= self.trigger_price,
            TriggerKind::TakeProfit => current >= self.trigger_price,
        }
    }
}

/// Single loop watching the union of trigger mints. Records are one-shot:
/// a fire disables the record until someone re-enables it.
pub struct TriggerScheduler {
    records: DashMap<String, TriggerRecord>,
    coordinator: Arc<Coordinator>,
    price: Arc<dyn PriceSource>,
    events: EventBus,
    /// Latest observed prices, readable without locking the scheduler.
    latest: ArcSwap<HashMap<String, f64>>,
    poll_interval: Duration,
    stop_loss_slippage_bps: u16,
    nominal_slippage_bps: u16,
    monitor: RwLock<Option<JoinHandle<()>>>,
}

impl TriggerScheduler {
    pub fn new(
        coordinator: Arc<Coordinator>,
        price: Arc<dyn PriceSource>,
        events: EventBus,
        poll_interval: Duration,
        nominal_slippage_bps: u16,
        stop_loss_slippage_bps: u16,
    ) -> Arc<Self> {
        Arc::new(Self {
            records: DashMap::new(),
            coordinator,
            price,
            events,
            latest: ArcSwap::from_pointee(HashMap::new()),
            poll_interval,
            stop_loss_slippage_bps,
            nominal_slippage_bps,
            monitor: RwLock::new(None),
        })
    }

    pub fn add(
        &self,
        kind: TriggerKind,
        mint: &str,
        trigger_price: f64,
        sell_percent: f64,
        wallets: Option<Vec<String>>,
        venue: Option<VenueTag>,
    ) -> Result<String> {
        if trigger_price <= 0.0 {
            return Err(AppError::Config("trigger price must be positive".into()));
        }
        if sell_percent <= 0.0 || sell_percent > 100.0 {
            return Err(AppError::Config("sell percent must be in (0, 100]".into()));
        }

        let id = Uuid::new_v4().to_string();
        self.records.insert(
            id.clone(),
            TriggerRecord {
                id: id.clone(),
                kind,
                mint: mint.to_string(),
                trigger_price,
                sell_percent,
                enabled: true,
                wallets,
                venue,
            },
        );
        info!("{:?} armed on {} at {}", kind, mint, trigger_price);
        Ok(id)
    }

    pub fn list(&self) -> Vec<TriggerRecord> {
        self.records.iter().map(|r| r.clone()).collect()
    }

    pub fn remove(&self, id: &str) -> Result<()> {
        self.records
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| AppError::Config(format!("unknown trigger {}", id)))
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| AppError::Config(format!("unknown trigger {}", id)))?;
        record.enabled = enabled;
        Ok(())
    }

    pub fn latest_price(&self, mint: &str) -> Option<f64> {
        self.latest.load().get(mint).copied()
    }

    pub fn start(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(scheduler.poll_interval);
            loop {
                interval.tick().await;
                scheduler.evaluate_tick().await;
            }
        });

        let mut slot = self.monitor.write();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(handle);
    }

    pub fn destroy(&self) {
        if let Some(handle) = self.monitor.write().take() {
            handle.abort();
        }
        info!("trigger scheduler stopped");
    }

    /// One monitor round: fetch prices for every referenced mint, then
    /// evaluate the records. Public so tests can drive ticks directly.
    pub async fn evaluate_tick(&self) {
        let mints: HashSet<String> = self
            .records
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.mint.clone())
            .collect();
        if mints.is_empty() {
            return;
        }

        let mut prices = HashMap::new();
        for mint in mints {
            // One bad mint must not cost the others their tick.
            match self.price.price_of(&mint).await {
                Ok(Some(price)) => {
                    prices.insert(mint, price);
                }
                Ok(None) => debug!("no price tick for {}", mint),
                Err(e) => debug!("price fetch failed for {}: {}", mint, e),
            }
        }
        if prices.is_empty() {
            return;
        }
        self.latest.store(Arc::new(prices.clone()));

        let fired: Vec<TriggerRecord> = self
            .records
            .iter()
            .filter(|r| r.enabled)
            .filter(|r| prices.get(&r.mint).is_some_and(|p| r.fires_at(*p)))
            .map(|r| r.clone())
            .collect();

        for record in fired {
            // Disable before dispatch: one-shot even if the sell fails.
            if let Some(mut entry) = self.records.get_mut(&record.id) {
                if !entry.enabled {
                    continue;
                }
                entry.enabled = false;
            }

            let price = prices[&record.mint];
            match record.kind {
                TriggerKind::StopLoss => {
                    warn!(
                        "stop-loss fired on {} at {} (trigger {})",
                        record.mint, price, record.trigger_price
                    );
                    self.events.publish(Event::StopLossTriggered {
                        mint: record.mint.clone(),
                        price,
                    });
                }
                TriggerKind::TakeProfit => {
                    info!(
                        "take-profit fired on {} at {} (trigger {})",
                        record.mint, price, record.trigger_price
                    );
                    self.events.publish(Event::TakeProfitTriggered {
                        mint: record.mint.clone(),
                        price,
                    });
                }
            }

            let slippage = match record.kind {
                TriggerKind::StopLoss => self.stop_loss_slippage_bps,
                TriggerKind::TakeProfit => self.nominal_slippage_bps,
            };

            let mut intent =
                TradeIntent::sell_percent(&record.mint, record.sell_percent)
                    .with_slippage(slippage);
            intent.wallets = record.wallets.clone();
            intent.venue = record.venue;

            match self.coordinator.coordinated_sell(intent).await {
                Ok(result) => info!(
                    "triggered exit on {}: {}/{} wallets ok",
                    record.mint,
                    result.succeeded(),
                    result.wallet_results.len()
                ),
                // Swallowed: the position is still there, the operator can
                // re-arm.
                Err(e) => warn!("triggered exit on {} failed: {}", record.mint, e),
            }
        }
    }
}
