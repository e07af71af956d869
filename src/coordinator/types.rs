use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::builder::VenueTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl std::fmt::Display for TradeAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeAction::Buy => f.write_str("buy"),
            TradeAction::Sell => f.write_str("sell"),
        }
    }
}

/// How much each selected wallet trades.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountSpec {
    /// Fixed SOL per wallet (buys).
    Sol(f64),
    /// Fixed raw token quantity per wallet (sells).
    Tokens(u64),
    /// Percentage of each wallet's own position (sells).
    PercentOfPosition(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    Parallel,
    Bundle,
    MultiBundle,
    Sequential,
}

impl ExecutionMode {
    /// Auto-selection from the surviving wallet count. Sequential is only
    /// ever chosen explicitly.
    pub fn auto(wallet_count: usize, bundle_limit: usize, bundles_enabled: bool) -> Self {
        if !bundles_enabled || wallet_count <= 1 {
            ExecutionMode::Parallel
        } else if wallet_count <= bundle_limit {
            ExecutionMode::Bundle
        } else {
            ExecutionMode::MultiBundle
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Parallel => "parallel",
            ExecutionMode::Bundle => "bundle",
            ExecutionMode::MultiBundle => "multi-bundle",
            ExecutionMode::Sequential => "sequential",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub mint: String,
    pub action: TradeAction,
    pub amount: AmountSpec,
    /// Restrict to these wallet ids; `None` means every enabled wallet.
    pub wallets: Option<Vec<String>>,
    pub mode: Option<ExecutionMode>,
    pub slippage_bps: Option<u16>,
    pub priority_fee_micro_lamports: Option<u64>,
    pub venue: Option<VenueTag>,
    pub pool: Option<String>,
}

impl TradeIntent {
    pub fn buy(mint: impl Into<String>, sol_per_wallet: f64) -> Self {
        Self {
            mint: mint.into(),
            action: TradeAction::Buy,
            amount: AmountSpec::Sol(sol_per_wallet),
            wallets: None,
            mode: None,
            slippage_bps: None,
            priority_fee_micro_lamports: None,
            venue: None,
            pool: None,
        }
    }

    pub fn sell_percent(mint: impl Into<String>, percent: f64) -> Self {
        Self {
            action: TradeAction::Sell,
            amount: AmountSpec::PercentOfPosition(percent),
            ..Self::buy(mint, 0.0)
        }
    }

    pub fn sell_tokens(mint: impl Into<String>, tokens: u64) -> Self {
        Self {
            action: TradeAction::Sell,
            amount: AmountSpec::Tokens(tokens),
            ..Self::buy(mint, 0.0)
        }
    }

    pub fn with_wallets(mut self, wallets: Vec<String>) -> Self {
        self.wallets = Some(wallets);
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_venue(mut self, venue: VenueTag) -> Self {
        self.venue = Some(venue);
        self
    }

    pub fn with_slippage(mut self, slippage_bps: u16) -> Self {
        self.slippage_bps = Some(slippage_bps);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletResult {
    pub wallet_id: String,
    pub address: String,
    pub success: bool,
    pub signature: Option<String>,
    pub sol_amount: Option<f64>,
    pub token_amount: Option<u64>,
    pub error: Option<String>,
}

impl WalletResult {
    pub fn ok(
        wallet_id: impl Into<String>,
        address: impl Into<String>,
        signature: Option<String>,
        sol_amount: Option<f64>,
        token_amount: Option<u64>,
    ) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            address: address.into(),
            success: true,
            signature,
            sol_amount,
            token_amount,
            error: None,
        }
    }

    pub fn failed(
        wallet_id: impl Into<String>,
        address: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            wallet_id: wallet_id.into(),
            address: address.into(),
            success: false,
            signature: None,
            sol_amount: None,
            token_amount: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    /// True iff at least one wallet succeeded.
    pub success: bool,
    pub wallet_results: Vec<WalletResult>,
    pub bundle_ids: Vec<String>,
    pub total_sol_in: f64,
    pub duration_ms: u64,
    pub mode: ExecutionMode,
    pub errors: Vec<String>,
}

impl TradeResult {
    pub fn from_parts(
        mode: ExecutionMode,
        wallet_results: Vec<WalletResult>,
        bundle_ids: Vec<String>,
        mut errors: Vec<String>,
        duration_ms: u64,
    ) -> Self {
        let success = wallet_results.iter().any(|r| r.success);
        let total_sol_in = wallet_results
            .iter()
            .filter(|r| r.success)
            .filter_map(|r| r.sol_amount)
            .sum();

        errors.extend(
            wallet_results
                .iter()
                .filter_map(|r| r.error.as_ref())
                .map(|e| e.to_string()),
        );

        Self {
            success,
            wallet_results,
            bundle_ids,
            total_sol_in,
            duration_ms,
            mode,
            errors,
        }
    }

    pub fn succeeded(&self) -> usize {
        self.wallet_results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.wallet_results.len() - self.succeeded()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletQuote {
    pub wallet_id: String,
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_pct: Option<f64>,
}

/// Aggregated dry-run quote across the selected wallets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteBundle {
    pub mint: String,
    pub action: TradeAction,
    pub venue: VenueTag,
    pub per_wallet: Vec<WalletQuote>,
    pub total_input: u64,
    pub total_output: u64,
    pub worst_price_impact_pct: Option<f64>,
}

/// Feasibility report: what a dispatch would do, without touching the
/// chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationReport {
    pub mint: String,
    pub action: TradeAction,
    pub mode: ExecutionMode,
    pub eligible: Vec<PlannedWallet>,
    pub skipped: Vec<(String, String)>,
    pub estimated_sol_in: f64,
    pub estimated_tip_lamports: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedWallet {
    pub wallet_id: String,
    pub sol_amount: Option<f64>,
    pub token_amount: Option<u64>,
}

/// Per-wallet buy amount: the fixed figure plus uniform jitter of
/// ±`variance_pct`, floored at zero.
pub fn jittered_sol(base: f64, variance_pct: f64) -> f64 {
    if variance_pct <= 0.0 {
        return base.max(0.0);
    }

    let factor = rand::thread_rng().gen_range(-variance_pct..=variance_pct) / 100.0;
    (base * (1.0 + factor)).max(0.0)
}

/// `floor(position * pct / 100)` for percentage sells.
pub fn percent_of_position(position: u64, pct: f64) -> u64 {
    ((position as f64) * pct / 100.0).floor() as u64
}
