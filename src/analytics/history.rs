use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::info;

use crate::coordinator::types::{TradeAction, TradeResult};
use crate::utils::time::now_ts;

#[derive(Debug, Clone)]
pub struct TradeRecord {
    pub mint: String,
    pub action: TradeAction,
    pub sol_amount: Option<f64>,
    pub token_amount: Option<u64>,
    pub signature: Option<String>,
    pub timestamp_ms: u64,
}

/// Per-wallet ordered trade log plus aggregate counters. Appends for one
/// wallet are totally ordered by the per-wallet mutex.
pub struct TradeHistory {
    by_wallet: Mutex<HashMap<String, Vec<TradeRecord>>>,
    pub trades_submitted: AtomicU64,
    pub trades_failed: AtomicU64,
    pub bundles_submitted: AtomicU64,
}

impl TradeHistory {
    pub fn new() -> Self {
        Self {
            by_wallet: Mutex::new(HashMap::new()),
            trades_submitted: AtomicU64::new(0),
            trades_failed: AtomicU64::new(0),
            bundles_submitted: AtomicU64::new(0),
        }
    }

    pub fn record(&self, mint: &str, action: TradeAction, result: &TradeResult) {
        let mut by_wallet = self.by_wallet.lock();
        for wallet_result in &result.wallet_results {
            if wallet_result.success {
                self.trades_submitted.fetch_add(1, Ordering::Relaxed);
            } else {
                self.trades_failed.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            by_wallet
                .entry(wallet_result.wallet_id.clone())
                .or_default()
                .push(TradeRecord {
                    mint: mint.to_string(),
                    action,
                    sol_amount: wallet_result.sol_amount,
                    token_amount: wallet_result.token_amount,
                    signature: wallet_result.signature.clone(),
                    timestamp_ms: now_ts(),
                });
        }

        self.bundles_submitted
            .fetch_add(result.bundle_ids.len() as u64, Ordering::Relaxed);
    }

    pub fn for_wallet(&self, wallet_id: &str) -> Vec<TradeRecord> {
        self.by_wallet
            .lock()
            .get(wallet_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn log_stats(&self) {
        info!(
            "history: {} submitted, {} failed, {} bundles",
            self.trades_submitted.load(Ordering::Relaxed),
            self.trades_failed.load(Ordering::Relaxed),
            self.bundles_submitted.load(Ordering::Relaxed),
        );
    }
}

impl Default for TradeHistory {
    fn default() -> Self {
        Self::new()
    }
}
