use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::builder::VenueTag;
use crate::coordinator::types::{ExecutionMode, TradeAction};

/// Per-target copy policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Copy size = target size * multiplier, clamped below.
    pub multiplier: f64,
    pub min_per_trade_sol: f64,
    pub max_per_trade_sol: f64,
    /// Stealth delay before dispatch.
    pub delay_ms: u64,
    pub delay_variance_ms: u64,
    pub copy_buys: bool,
    pub copy_sells: bool,
    /// When present, only these mints are copied.
    pub allow_mints: Option<HashSet<String>>,
    pub block_mints: HashSet<String>,
    /// Ignore target trades below this size.
    pub min_target_sol: f64,
    pub daily_trade_cap: Option<u32>,
    pub daily_sol_cap: Option<f64>,
    /// Stop copying once realized losses exceed this share of volume.
    pub stop_after_loss_pct: Option<f64>,
    /// Fraction of each wallet's own position sold when the target sells.
    pub sell_fraction_pct: f64,
    pub mode: Option<ExecutionMode>,
    pub venue: Option<VenueTag>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.0,
            min_per_trade_sol: 0.01,
            max_per_trade_sol: 0.5,
            delay_ms: 0,
            delay_variance_ms: 0,
            copy_buys: true,
            copy_sells: true,
            allow_mints: None,
            block_mints: HashSet::new(),
            min_target_sol: 0.01,
            daily_trade_cap: None,
            daily_sol_cap: None,
            stop_after_loss_pct: None,
            sell_fraction_pct: 100.0,
            mode: None,
            venue: None,
        }
    }
}

/// Running per-target accounting. Mutated only by the target's own
/// processing path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorStats {
    pub trades_copied: u64,
    pub volume_in_sol: f64,
    pub volume_out_sol: f64,
    pub realized_pnl_sol: f64,
    pub today: NaiveDate,
    pub today_trades: u32,
    pub today_volume_sol: f64,
    pub last_trade_ms: u64,
}

impl MirrorStats {
    pub fn new() -> Self {
        Self {
            trades_copied: 0,
            volume_in_sol: 0.0,
            volume_out_sol: 0.0,
            realized_pnl_sol: 0.0,
            today: Utc::now().date_naive(),
            today_trades: 0,
            today_volume_sol: 0.0,
            last_trade_ms: 0,
        }
    }

    /// Reset the daily counters when the UTC day rolls over.
    pub fn roll_day(&mut self) {
        let today = Utc::now().date_naive();
        if today != self.today {
            self.today = today;
            self.today_trades = 0;
            self.today_volume_sol = 0.0;
        }
    }

    pub fn record_copy(&mut self, action: TradeAction, sol_amount: f64, now_ms: u64) {
        self.roll_day();
        self.trades_copied += 1;
        self.today_trades += 1;
        self.today_volume_sol += sol_amount;
        self.last_trade_ms = now_ms;

        match action {
            TradeAction::Buy => self.volume_in_sol += sol_amount,
            TradeAction::Sell => self.volume_out_sol += sol_amount,
        }
        self.realized_pnl_sol = self.volume_out_sol - self.volume_in_sol;
    }

    /// Loss as a percentage of volume in; `None` while not losing.
    pub fn loss_ratio_pct(&self) -> Option<f64> {
        if self.realized_pnl_sol < 0.0 && self.volume_in_sol > 0.0 {
            Some(-self.realized_pnl_sol / self.volume_in_sol * 100.0)
        } else {
            None
        }
    }
}

impl Default for MirrorStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorTarget {
    pub address: String,
    pub name: String,
    pub enabled: bool,
    pub config: MirrorConfig,
    pub stats: MirrorStats,
}

/// A confirmed target transaction decoded into a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedTrade {
    pub target: String,
    pub signature: String,
    pub action: TradeAction,
    pub mint: String,
    /// Absolute SOL moved by the target.
    pub sol_amount: f64,
    /// Absolute raw token amount moved by the target.
    pub token_amount: u64,
    pub venue: Option<VenueTag>,
    pub block_time: Option<i64>,
}

/// Why a detected trade produced no copy. Observable, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    ActionDisabled,
    Blocklisted,
    NotAllowlisted,
    BelowMinimum,
    DailyTradeCap,
    DailyVolumeCap,
    LossCutoff,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SkipReason::ActionDisabled => "action disabled",
            SkipReason::Blocklisted => "mint blocklisted",
            SkipReason::NotAllowlisted => "mint not on allow list",
            SkipReason::BelowMinimum => "below minimum target size",
            SkipReason::DailyTradeCap => "daily trade cap reached",
            SkipReason::DailyVolumeCap => "daily volume cap reached",
            SkipReason::LossCutoff => "loss cutoff reached",
        };
        f.write_str(s)
    }
}

/// `clamp(target_sol * multiplier, min, max)`.
pub fn copy_amount(target_sol: f64, config: &MirrorConfig) -> f64 {
    (target_sol * config.multiplier)
        .clamp(config.min_per_trade_sol, config.max_per_trade_sol)
}

/// The filter chain, in evaluation order.
pub fn filter_trade(
    config: &MirrorConfig,
    stats: &MirrorStats,
    trade: &DetectedTrade,
) -> Result<(), SkipReason> {
    let copying = match trade.action {
        TradeAction::Buy => config.copy_buys,
        TradeAction::Sell => config.copy_sells,
    };
    if !copying {
        return Err(SkipReason::ActionDisabled);
    }

    if config.block_mints.contains(&trade.mint) {
        return Err(SkipReason::Blocklisted);
    }
    if let Some(allow) = &config.allow_mints {
        if !allow.contains(&trade.mint) {
            return Err(SkipReason::NotAllowlisted);
        }
    }

    if trade.sol_amount < config.min_target_sol {
        return Err(SkipReason::BelowMinimum);
    }

    if let Some(cap) = config.daily_trade_cap {
        if stats.today_trades >= cap {
            return Err(SkipReason::DailyTradeCap);
        }
    }
    if let Some(cap) = config.daily_sol_cap {
        if stats.today_volume_sol >= cap {
            return Err(SkipReason::DailyVolumeCap);
        }
    }

    if let Some(cutoff) = config.stop_after_loss_pct {
        if let Some(loss_pct) = stats.loss_ratio_pct() {
            if loss_pct > cutoff {
                return Err(SkipReason::LossCutoff);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trade(action: TradeAction, sol: f64) -> DetectedTrade {
        DetectedTrade {
            target: "target".into(),
            signature: "sig".into(),
            action,
            mint: "MintA".into(),
            sol_amount: sol,
            token_amount: 100,
            venue: None,
            block_time: None,
        }
    }

    #[test]
    fn test_copy_amount_clamps() {
        let config = MirrorConfig {
            multiplier: 0.5,
            min_per_trade_sol: 0.01,
            max_per_trade_sol: 0.2,
            ..Default::default()
        };

        // 0.8 * 0.5 = 0.4, clamped to 0.2
        assert!((copy_amount(0.8, &config) - 0.2).abs() < 1e-9);
        // 0.01 * 0.5 = 0.005, clamped up to 0.01
        assert!((copy_amount(0.01, &config) - 0.01).abs() < 1e-9);
        // in range passes through
        assert!((copy_amount(0.2, &config) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_filter_action_toggles() {
        let config = MirrorConfig { copy_sells: false, ..Default::default() };
        let stats = MirrorStats::new();

        assert_eq!(
            filter_trade(&config, &stats, &trade(TradeAction::Sell, 1.0)),
            Err(SkipReason::ActionDisabled)
        );
        assert!(filter_trade(&config, &stats, &trade(TradeAction::Buy, 1.0)).is_ok());
    }

    #[test]
    fn test_filter_mint_lists() {
        let mut config = MirrorConfig::default();
        config.block_mints.insert("MintA".into());
        let stats = MirrorStats::new();
        assert_eq!(
            filter_trade(&config, &stats, &trade(TradeAction::Buy, 1.0)),
            Err(SkipReason::Blocklisted)
        );

        let config = MirrorConfig {
            allow_mints: Some(["MintB".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert_eq!(
            filter_trade(&config, &stats, &trade(TradeAction::Buy, 1.0)),
            Err(SkipReason::NotAllowlisted)
        );
    }

    #[test]
    fn test_filter_caps_and_cutoff() {
        let config = MirrorConfig { daily_trade_cap: Some(2), ..Default::default() };
        let mut stats = MirrorStats::new();
        stats.today_trades = 2;
        assert_eq!(
            filter_trade(&config, &stats, &trade(TradeAction::Buy, 1.0)),
            Err(SkipReason::DailyTradeCap)
        );

        let config = MirrorConfig {
            stop_after_loss_pct: Some(20.0),
            ..Default::default()
        };
        let mut stats = MirrorStats::new();
        stats.volume_in_sol = 10.0;
        stats.volume_out_sol = 7.0;
        stats.realized_pnl_sol = -3.0;
        assert_eq!(
            filter_trade(&config, &stats, &trade(TradeAction::Buy, 1.0)),
            Err(SkipReason::LossCutoff)
        );
    }

    #[test]
    fn test_filter_minimum_size() {
        let config = MirrorConfig { min_target_sol: 0.05, ..Default::default() };
        let stats = MirrorStats::new();
        assert_eq!(
            filter_trade(&config, &stats, &trade(TradeAction::Buy, 0.01)),
            Err(SkipReason::BelowMinimum)
        );
    }

    #[test]
    fn test_stats_loss_ratio() {
        let mut stats = MirrorStats::new();
        assert!(stats.loss_ratio_pct().is_none());

        stats.record_copy(TradeAction::Buy, 10.0, 1);
        stats.record_copy(TradeAction::Sell, 8.0, 2);
        let loss = stats.loss_ratio_pct().unwrap();
        assert!((loss - 20.0).abs() < 1e-9);
        assert_eq!(stats.trades_copied, 2);
    }
}
