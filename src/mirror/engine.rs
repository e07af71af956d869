use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use rand::Rng;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::protocol::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::coordinator::types::{TradeAction, TradeIntent};
use crate::coordinator::Coordinator;
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus};
use crate::mirror::cache::DedupCache;
use crate::mirror::decoder::decode_trade;
use crate::mirror::types::{
    copy_amount, filter_trade, DetectedTrade, MirrorConfig, MirrorStats, MirrorTarget,
};
use crate::rpc::ChainRpc;
use crate::utils::time::now_ts;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const DEDUP_TTL: Duration = Duration::from_secs(300);
const DEDUP_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);
const FETCH_RETRIES: u32 = 3;
const FETCH_RETRY_DELAY: Duration = Duration::from_millis(500);

struct TargetEntry {
    target: RwLock<MirrorTarget>,
    subscription: RwLock<Option<JoinHandle<()>>>,
}

/// Watches external addresses and replays their trades across the pool.
/// One subscription per enabled target; all copies flow through the
/// coordinator.
pub struct MirrorEngine {
    targets: DashMap<String, Arc<TargetEntry>>,
    coordinator: Arc<Coordinator>,
    chain: Arc<dyn ChainRpc>,
    events: EventBus,
    ws_url: String,
    seen: DedupCache,
    /// Target address → currently processing flag. A notification that
    /// lands while its target is busy is dropped, not queued.
    in_flight: Arc<DashMap<String, ()>>,
    cleanup: RwLock<Option<JoinHandle<()>>>,
}

impl MirrorEngine {
    pub fn new(
        coordinator: Arc<Coordinator>,
        chain: Arc<dyn ChainRpc>,
        events: EventBus,
        ws_url: String,
    ) -> Arc<Self> {
        let engine = Arc::new(Self {
            targets: DashMap::new(),
            coordinator,
            chain,
            events,
            ws_url,
            seen: DedupCache::new(DEDUP_TTL),
            in_flight: Arc::new(DashMap::new()),
            cleanup: RwLock::new(None),
        });

        let seen = engine.seen.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(DEDUP_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                seen.cleanup();
            }
        });
        *engine.cleanup.write() = Some(handle);

        engine
    }

    pub fn add_target(
        self: &Arc<Self>,
        address: &str,
        name: &str,
        config: MirrorConfig,
    ) -> Result<()> {
        if self.targets.contains_key(address) {
            return Err(AppError::Config(format!("target {} already exists", address)));
        }
        address
            .parse::<solana_sdk::pubkey::Pubkey>()
            .map_err(|e| AppError::Config(format!("target address {}: {}", address, e)))?;

        let entry = Arc::new(TargetEntry {
            target: RwLock::new(MirrorTarget {
                address: address.to_string(),
                name: name.to_string(),
                enabled: true,
                config,
                stats: MirrorStats::new(),
            }),
            subscription: RwLock::new(None),
        });

        self.targets.insert(address.to_string(), Arc::clone(&entry));
        self.spawn_subscription(address);
        info!("mirroring {} ({})", address, name);
        Ok(())
    }

    pub fn remove_target(&self, address: &str) -> Result<()> {
        let (_, entry) = self
            .targets
            .remove(address)
            .ok_or_else(|| AppError::Config(format!("unknown target {}", address)))?;
        if let Some(handle) = entry.subscription.write().take() {
            handle.abort();
        }
        info!("stopped mirroring {}", address);
        Ok(())
    }

    /// A disabled target keeps its entry and stats but drops its
    /// subscription.
    pub fn set_enabled(self: &Arc<Self>, address: &str, enabled: bool) -> Result<()> {
        let entry = self
            .targets
            .get(address)
            .map(|e| Arc::clone(e.value()))
            .ok_or_else(|| AppError::Config(format!("unknown target {}", address)))?;

        entry.target.write().enabled = enabled;
        if enabled {
            self.spawn_subscription(address);
        } else if let Some(handle) = entry.subscription.write().take() {
            handle.abort();
        }
        Ok(())
    }

    pub fn update_config(&self, address: &str, config: MirrorConfig) -> Result<()> {
        let entry = self
            .targets
            .get(address)
            .ok_or_else(|| AppError::Config(format!("unknown target {}", address)))?;
        entry.target.write().config = config;
        Ok(())
    }

    pub fn list(&self) -> Vec<MirrorTarget> {
        self.targets
            .iter()
            .map(|entry| entry.target.read().clone())
            .collect()
    }

    pub fn stats(&self, address: &str) -> Option<MirrorStats> {
        self.targets
            .get(address)
            .map(|entry| entry.target.read().stats.clone())
    }

    /// Drop every subscription and the cleanup task.
    pub fn destroy(&self) {
        for entry in self.targets.iter() {
            if let Some(handle) = entry.subscription.write().take() {
                handle.abort();
            }
        }
        if let Some(handle) = self.cleanup.write().take() {
            handle.abort();
        }
        info!("mirror engine stopped");
    }

    fn spawn_subscription(self: &Arc<Self>, address: &str) {
        let entry = match self.targets.get(address) {
            Some(e) => Arc::clone(e.value()),
            None => return,
        };

        let engine = Arc::clone(self);
        let address = address.to_string();
        let handle = tokio::spawn(async move {
            loop {
                match engine.subscription_loop(&address).await {
                    Ok(()) => warn!("subscription for {} ended, reconnecting", address),
                    Err(e) => warn!("subscription for {} failed: {}, reconnecting", address, e),
                }
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        });

        let mut slot = entry.subscription.write();
        if let Some(old) = slot.take() {
            old.abort();
        }
        *slot = Some(handle);
    }

    /// One connection lifetime: subscribe, keep alive, forward
    /// notifications. Returning (either way) triggers a reconnect.
    async fn subscription_loop(self: &Arc<Self>, address: &str) -> Result<()> {
        let url = Url::parse(&self.ws_url)
            .map_err(|e| AppError::Config(format!("ws url: {}", e)))?;

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        debug!("websocket connected for {}", address);

        let (mut write, mut read) = ws_stream.split();

        let subscribe_msg = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "logsSubscribe",
            "params": [
                { "mentions": [address] },
                { "commitment": "confirmed" }
            ]
        });
        write.send(Message::Text(subscribe_msg.to_string())).await?;

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if let Err(e) = write.send(Message::Ping(vec![])).await {
                        warn!("ping failed for {}: {}", address, e);
                        return Ok(());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_message(address, &text),
                        Some(Ok(Message::Close(_))) => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn handle_message(self: &Arc<Self>, address: &str, text: &str) {
        if !text.contains("logsNotification") {
            return;
        }

        let parsed: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                error!("bad websocket payload: {}", e);
                return;
            }
        };

        let value = &parsed["params"]["result"]["value"];
        let signature = match value.get("signature").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => return,
        };
        // Failed transactions carry an error object; nothing to copy.
        if !value.get("err").map(Value::is_null).unwrap_or(true) {
            return;
        }

        if !self.seen.check_and_insert(&signature) {
            debug!("{} already seen", signature);
            return;
        }

        // One notification at a time per target; a busy target drops the
        // new one (dedup has already recorded it).
        if self.in_flight.insert(address.to_string(), ()).is_some() {
            debug!("{} busy, dropping {}", address, signature);
            return;
        }

        let engine = Arc::clone(self);
        let address = address.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.process_signature(&address, &signature).await {
                info!("mirror processing for {} skipped {}: {}", address, signature, e);
            }
            engine.in_flight.remove(&address);
        });
    }

    /// Decode one confirmed signature and copy it if it survives the
    /// filter chain. Normally driven by the subscription; callable
    /// directly for replay and testing.
    pub async fn process_signature(self: &Arc<Self>, address: &str, signature: &str) -> Result<()> {
        let tx = self.fetch_with_retry(signature).await?;

        let trade = match decode_trade(address, signature, &tx)? {
            Some(trade) => trade,
            None => {
                debug!("{} is not a swap by {}", signature, address);
                return Ok(());
            }
        };

        self.events.publish(Event::TradeDetected {
            target: address.to_string(),
            mint: trade.mint.clone(),
            action: trade.action.to_string(),
            sol_amount: trade.sol_amount,
        });

        let entry = match self.targets.get(address) {
            Some(e) => Arc::clone(e.value()),
            None => return Ok(()),
        };

        // Snapshot config and stats for the filter; stats mutation happens
        // only after dispatch.
        let (config, stats, enabled) = {
            let target = entry.target.read();
            (target.config.clone(), target.stats.clone(), target.enabled)
        };
        if !enabled {
            return Ok(());
        }

        if let Err(reason) = filter_trade(&config, &stats, &trade) {
            info!("{}: skipping {} ({})", address, signature, reason);
            self.events.publish(Event::MirrorSkipped {
                target: address.to_string(),
                signature: signature.to_string(),
                reason: reason.to_string(),
            });
            return Ok(());
        }

        self.stealth_delay(&config).await;
        self.dispatch_copy(&entry, &config, &trade).await
    }

    async fn fetch_with_retry(&self, signature: &str) -> Result<Value> {
        let mut last_err = None;
        for attempt in 0..FETCH_RETRIES {
            match self.chain.get_transaction_json(signature).await {
                Ok(tx) if !tx.is_null() => return Ok(tx),
                Ok(_) => {
                    debug!("{} not yet available (attempt {})", signature, attempt + 1);
                }
                Err(e) => last_err = Some(e),
            }
            tokio::time::sleep(FETCH_RETRY_DELAY).await;
        }

        Err(last_err
            .unwrap_or_else(|| AppError::Decode(format!("{} never became available", signature))))
    }

    async fn stealth_delay(&self, config: &MirrorConfig) {
        let variance = if config.delay_variance_ms > 0 {
            rand::thread_rng().gen_range(0..=config.delay_variance_ms)
        } else {
            0
        };
        let total = config.delay_ms + variance;
        if total > 0 {
            tokio::time::sleep(Duration::from_millis(total)).await;
        }
    }

    async fn dispatch_copy(
        &self,
        entry: &TargetEntry,
        config: &MirrorConfig,
        trade: &DetectedTrade,
    ) -> Result<()> {
        let venue = config.venue.or(trade.venue);

        let (intent, copy_sol) = match trade.action {
            TradeAction::Buy => {
                let amount = copy_amount(trade.sol_amount, config);
                let mut intent = TradeIntent::buy(&trade.mint, amount);
                intent.venue = venue;
                intent.mode = config.mode;
                (intent, amount)
            }
            TradeAction::Sell => {
                let mut intent =
                    TradeIntent::sell_percent(&trade.mint, config.sell_fraction_pct);
                intent.venue = venue;
                intent.mode = config.mode;
                // Estimated proceeds for the stats; reconciliation follows
                // the position refresh.
                let estimate = copy_amount(trade.sol_amount, config);
                (intent, estimate)
            }
        };

        let result = match trade.action {
            TradeAction::Buy => self.coordinator.coordinated_buy(intent).await?,
            TradeAction::Sell => self.coordinator.coordinated_sell(intent).await?,
        };

        {
            let mut target = entry.target.write();
            if result.success {
                let realized = match trade.action {
                    TradeAction::Buy => result.total_sol_in,
                    TradeAction::Sell => copy_sol,
                };
                target.stats.record_copy(trade.action, realized, now_ts());
            }
        }

        self.events.publish(Event::TradeCopied {
            target: trade.target.clone(),
            mint: trade.mint.clone(),
            action: trade.action.to_string(),
            sol_amount: copy_sol,
            success: result.success,
        });

        info!(
            "copied {} {} from {}: {}/{} wallets ok",
            trade.action,
            trade.mint,
            trade.target,
            result.succeeded(),
            result.wallet_results.len()
        );

        Ok(())
    }
}
