use std::sync::Arc;
use std::time::{Duration, Instant};

use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::analytics::TradeHistory;
use crate::builder::{BuildRequest, BuilderRegistry};
use crate::bundle::BundleSubmitter;
use crate::config::Config;
use crate::coordinator::modes::{dispatch, DispatchCtx, PlannedTrade};
use crate::coordinator::types::{
    jittered_sol, percent_of_position, AmountSpec, ExecutionMode, PlannedWallet, QuoteBundle,
    SimulationReport, TradeAction, TradeIntent, TradeResult, WalletQuote, WalletResult,
};
use crate::error::{AppError, Result};
use crate::events::{Event, EventBus};
use crate::rpc::ChainRpc;
use crate::utils::{sol_to_lamports, time::elapsed_ms};
use crate::wallet::{WalletPool, WalletSnapshot};

/// Execution tunables snapshotted from `Config` at startup.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    pub slippage_bps: u16,
    pub priority_fee_micro_lamports: u64,
    pub amount_variance_pct: f64,
    pub min_reserve_sol: f64,
    pub bundle_size_limit: usize,
    pub bundles_enabled: bool,
    pub tip_lamports: u64,
    pub stagger_delay_ms: u64,
    pub rate_limit_ms: u64,
    pub confirm_timeout_ms: u64,
    pub position_refresh_delay_secs: u64,
}

impl ExecSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            slippage_bps: config.slippage_bps,
            priority_fee_micro_lamports: config.priority_fee_micro_lamports,
            amount_variance_pct: config.amount_variance_pct,
            min_reserve_sol: config.min_reserve_sol,
            bundle_size_limit: config.bundle_size_limit,
            bundles_enabled: config.bundles_enabled,
            tip_lamports: config.tip_lamports,
            stagger_delay_ms: config.stagger_delay_ms,
            rate_limit_ms: config.rate_limit_ms,
            confirm_timeout_ms: config.confirm_timeout_ms,
            position_refresh_delay_secs: config.position_refresh_delay_secs,
        }
    }
}

/// The single control point every trade flows through: direct callers,
/// mirrored trades, DCA ticks, and triggered exits all end up here.
pub struct Coordinator {
    pool: Arc<WalletPool>,
    builders: Arc<BuilderRegistry>,
    bundle: Arc<dyn BundleSubmitter>,
    chain: Arc<dyn ChainRpc>,
    events: EventBus,
    history: Arc<TradeHistory>,
    settings: ExecSettings,
}

impl Coordinator {
    pub fn new(
        pool: Arc<WalletPool>,
        builders: Arc<BuilderRegistry>,
        bundle: Arc<dyn BundleSubmitter>,
        chain: Arc<dyn ChainRpc>,
        events: EventBus,
        history: Arc<TradeHistory>,
        settings: ExecSettings,
    ) -> Self {
        Self { pool, builders, bundle, chain, events, history, settings }
    }

    pub fn pool(&self) -> &Arc<WalletPool> {
        &self.pool
    }

    pub fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    pub async fn coordinated_buy(&self, intent: TradeIntent) -> Result<TradeResult> {
        let started = Instant::now();
        let sol_per_wallet = match intent.amount {
            AmountSpec::Sol(v) if v > 0.0 => v,
            AmountSpec::Sol(_) => {
                return Err(AppError::Config("buy amount must be positive".into()))
            }
            _ => return Err(AppError::Config("buys take a fixed SOL amount".into())),
        };

        self.pool.refresh_balances().await?;

        let (selected, mut skipped, mut errors) = self.select_for_buy(&intent, sol_per_wallet);
        let mode = intent
            .mode
            .unwrap_or_else(|| self.auto_mode(selected.len()));

        if selected.is_empty() {
            warn!("buy {}: no eligible wallets", intent.mint);
            errors.push("no wallets with sufficient balance".into());
            return Ok(TradeResult::from_parts(
                mode,
                skipped,
                Vec::new(),
                errors,
                elapsed_ms(started),
            ));
        }

        // Per-wallet jitter is applied after selection; a jitter that
        // collapses the amount to zero fails that wallet without an
        // attempt.
        let mut planned = Vec::new();
        for wallet in selected {
            let amount = jittered_sol(sol_per_wallet, self.settings.amount_variance_pct);
            if amount <= 0.0 {
                skipped.push(WalletResult::failed(
                    &wallet.id,
                    wallet.address.to_string(),
                    "zero amount",
                ));
                continue;
            }
            planned.push(PlannedTrade {
                wallet,
                action: TradeAction::Buy,
                sol_lamports: sol_to_lamports(amount),
                token_amount: 0,
            });
        }

        let result = self
            .execute(&intent, TradeAction::Buy, mode, planned, skipped, errors, started)
            .await?;
        Ok(result)
    }

    pub async fn coordinated_sell(&self, intent: TradeIntent) -> Result<TradeResult> {
        let started = Instant::now();
        match intent.amount {
            AmountSpec::Tokens(_) => {}
            AmountSpec::PercentOfPosition(p) if p > 0.0 && p <= 100.0 => {}
            AmountSpec::PercentOfPosition(_) => {
                return Err(AppError::Config("sell percentage must be in (0, 100]".into()))
            }
            AmountSpec::Sol(_) => {
                return Err(AppError::Config(
                    "sells take a token amount or percentage".into(),
                ))
            }
        }

        self.pool.refresh_positions(&intent.mint).await?;

        let (selected, mut skipped, mut errors) = self.select_for_sell(&intent);
        let mode = intent
            .mode
            .unwrap_or_else(|| self.auto_mode(selected.len()));

        if selected.is_empty() {
            warn!("sell {}: no wallets hold the token", intent.mint);
            errors.push("no wallets with a position".into());
            return Ok(TradeResult::from_parts(
                mode,
                skipped,
                Vec::new(),
                errors,
                elapsed_ms(started),
            ));
        }

        let mut planned = Vec::new();
        for wallet in selected {
            let position = wallet.position_of(&intent.mint);
            let tokens = match intent.amount {
                AmountSpec::Tokens(t) => t,
                AmountSpec::PercentOfPosition(p) => percent_of_position(position, p),
                AmountSpec::Sol(_) => unreachable!("validated above"),
            };

            if tokens == 0 {
                skipped.push(WalletResult::failed(
                    &wallet.id,
                    wallet.address.to_string(),
                    "zero amount",
                ));
                continue;
            }
            planned.push(PlannedTrade {
                wallet,
                action: TradeAction::Sell,
                sol_lamports: 0,
                token_amount: tokens,
            });
        }

        let result = self
            .execute(&intent, TradeAction::Sell, mode, planned, skipped, errors, started)
            .await?;
        Ok(result)
    }

    /// Dry-run price discovery across the wallets the intent would hit.
    pub async fn coordinated_quote(&self, intent: TradeIntent) -> Result<QuoteBundle> {
        let (venue, builder) = self.builders.get(intent.venue)?;
        let mint = parse_mint(&intent.mint)?;
        let pool_address = parse_pool(&intent.pool)?;

        let (selected, per_wallet_amounts) = match intent.action {
            TradeAction::Buy => {
                let sol = match intent.amount {
                    AmountSpec::Sol(v) if v > 0.0 => v,
                    _ => return Err(AppError::Config("buys take a fixed SOL amount".into())),
                };
                self.pool.refresh_balances().await?;
                let (selected, _, _) = self.select_for_buy(&intent, sol);
                let amounts = selected
                    .iter()
                    .map(|_| (sol_to_lamports(sol), 0u64))
                    .collect::<Vec<_>>();
                (selected, amounts)
            }
            TradeAction::Sell => {
                self.pool.refresh_positions(&intent.mint).await?;
                let (selected, _, _) = self.select_for_sell(&intent);
                let amounts = selected
                    .iter()
                    .map(|w| {
                        let position = w.position_of(&intent.mint);
                        let tokens = match intent.amount {
                            AmountSpec::Tokens(t) => t,
                            AmountSpec::PercentOfPosition(p) => {
                                percent_of_position(position, p)
                            }
                            AmountSpec::Sol(_) => 0,
                        };
                        (0u64, tokens)
                    })
                    .collect::<Vec<_>>();
                (selected, amounts)
            }
        };

        let mut per_wallet = Vec::new();
        let mut total_input = 0u64;
        let mut total_output = 0u64;
        let mut worst_impact: Option<f64> = None;

        for (wallet, (sol_lamports, token_amount)) in selected.iter().zip(per_wallet_amounts) {
            let req = BuildRequest {
                wallet: wallet.address,
                mint,
                sol_lamports,
                token_amount,
                slippage_bps: intent.slippage_bps.unwrap_or(self.settings.slippage_bps),
                priority_fee_micro_lamports: intent
                    .priority_fee_micro_lamports
                    .unwrap_or(self.settings.priority_fee_micro_lamports),
                pool: pool_address,
                recent_blockhash: Hash::default(),
            };

            match builder.quote(&req, intent.action).await {
                Ok(quote) => {
                    total_input += quote.input_amount;
                    total_output += quote.output_amount;
                    if let Some(impact) = quote.price_impact_pct {
                        worst_impact =
                            Some(worst_impact.map_or(impact, |w: f64| w.max(impact)));
                    }
                    per_wallet.push(WalletQuote {
                        wallet_id: wallet.id.clone(),
                        input_amount: quote.input_amount,
                        output_amount: quote.output_amount,
                        price_impact_pct: quote.price_impact_pct,
                    });
                }
                Err(e) => debug!("quote failed for {}: {}", wallet.id, e),
            }
        }

        Ok(QuoteBundle {
            mint: intent.mint,
            action: intent.action,
            venue,
            per_wallet,
            total_input,
            total_output,
            worst_price_impact_pct: worst_impact,
        })
    }

    /// Feasibility report from cached state; never touches the chain.
    pub fn simulate(&self, intent: &TradeIntent) -> Result<SimulationReport> {
        let (selected, skipped) = match intent.action {
            TradeAction::Buy => {
                let sol = match intent.amount {
                    AmountSpec::Sol(v) if v > 0.0 => v,
                    _ => return Err(AppError::Config("buys take a fixed SOL amount".into())),
                };
                let (selected, skipped, _) = self.select_for_buy(intent, sol);
                let eligible = selected
                    .into_iter()
                    .map(|w| PlannedWallet {
                        wallet_id: w.id,
                        sol_amount: Some(sol),
                        token_amount: None,
                    })
                    .collect::<Vec<_>>();
                (eligible, skipped)
            }
            TradeAction::Sell => {
                let (selected, skipped, _) = self.select_for_sell(intent);
                let eligible = selected
                    .into_iter()
                    .map(|w| {
                        let position = w.position_of(&intent.mint);
                        let tokens = match intent.amount {
                            AmountSpec::Tokens(t) => t,
                            AmountSpec::PercentOfPosition(p) => {
                                percent_of_position(position, p)
                            }
                            AmountSpec::Sol(_) => 0,
                        };
                        PlannedWallet {
                            wallet_id: w.id,
                            sol_amount: None,
                            token_amount: Some(tokens),
                        }
                    })
                    .collect::<Vec<_>>();
                (eligible, skipped)
            }
        };

        let mode = intent
            .mode
            .unwrap_or_else(|| self.auto_mode(selected.len()));

        let bundles = match mode {
            ExecutionMode::Bundle => 1,
            ExecutionMode::MultiBundle => {
                selected.len().div_ceil(self.settings.bundle_size_limit)
            }
            _ => 0,
        };

        let estimated_sol_in = selected.iter().filter_map(|p| p.sol_amount).sum();

        Ok(SimulationReport {
            mint: intent.mint.clone(),
            action: intent.action,
            mode,
            eligible: selected,
            skipped: skipped
                .into_iter()
                .map(|r| (r.wallet_id, r.error.unwrap_or_default()))
                .collect(),
            estimated_sol_in,
            estimated_tip_lamports: bundles as u64 * self.settings.tip_lamports,
        })
    }

    fn auto_mode(&self, wallet_count: usize) -> ExecutionMode {
        ExecutionMode::auto(
            wallet_count,
            self.settings.bundle_size_limit,
            self.settings.bundles_enabled,
        )
    }

    /// Candidates = explicit subset ∩ enabled, or every enabled wallet.
    fn candidates(&self, intent: &TradeIntent, errors: &mut Vec<String>) -> Vec<WalletSnapshot> {
        let enabled = self.pool.enabled();
        match &intent.wallets {
            None => enabled,
            Some(subset) => {
                let mut picked = Vec::new();
                for id in subset {
                    match enabled.iter().find(|w| &w.id == id) {
                        Some(w) => picked.push(w.clone()),
                        None => errors.push(format!("wallet {} is unknown or disabled", id)),
                    }
                }
                picked
            }
        }
    }

    fn select_for_buy(
        &self,
        intent: &TradeIntent,
        sol_per_wallet: f64,
    ) -> (Vec<WalletSnapshot>, Vec<WalletResult>, Vec<String>) {
        let mut errors = Vec::new();
        let mut skipped = Vec::new();
        let mut selected = Vec::new();

        let required = sol_per_wallet + self.settings.min_reserve_sol;
        for wallet in self.candidates(intent, &mut errors) {
            if wallet.sol_balance < required {
                let err = AppError::InsufficientFunds {
                    wallet: wallet.id.clone(),
                    needed: required,
                    available: wallet.sol_balance,
                };
                skipped.push(WalletResult::failed(
                    &wallet.id,
                    wallet.address.to_string(),
                    err.to_string(),
                ));
            } else {
                selected.push(wallet);
            }
        }

        (selected, skipped, errors)
    }

    fn select_for_sell(
        &self,
        intent: &TradeIntent,
    ) -> (Vec<WalletSnapshot>, Vec<WalletResult>, Vec<String>) {
        let mut errors = Vec::new();
        let mut skipped = Vec::new();
        let mut selected = Vec::new();

        for wallet in self.candidates(intent, &mut errors) {
            if wallet.position_of(&intent.mint) == 0 {
                skipped.push(WalletResult::failed(
                    &wallet.id,
                    wallet.address.to_string(),
                    "no position",
                ));
            } else {
                selected.push(wallet);
            }
        }

        (selected, skipped, errors)
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute(
        &self,
        intent: &TradeIntent,
        action: TradeAction,
        mode: ExecutionMode,
        planned: Vec<PlannedTrade>,
        skipped: Vec<WalletResult>,
        errors: Vec<String>,
        started: Instant,
    ) -> Result<TradeResult> {
        let (_, builder) = self.builders.get(intent.venue)?;
        let mint = parse_mint(&intent.mint)?;
        let pool_address = parse_pool(&intent.pool)?;

        let ctx = DispatchCtx {
            chain: Arc::clone(&self.chain),
            bundle: Arc::clone(&self.bundle),
            builder,
            pool: Arc::clone(&self.pool),
            settings: self.settings.clone(),
            mint,
            pool_address,
            slippage_bps: intent.slippage_bps.unwrap_or(self.settings.slippage_bps),
            priority_fee_micro_lamports: intent
                .priority_fee_micro_lamports
                .unwrap_or(self.settings.priority_fee_micro_lamports),
        };

        info!(
            "{} {} across {} wallets via {}",
            action,
            intent.mint,
            planned.len(),
            mode
        );

        let outcome = dispatch(&ctx, mode, planned).await;

        let mut wallet_results = outcome.wallet_results;
        wallet_results.extend(skipped);

        let mut all_errors = errors;
        all_errors.extend(outcome.errors);

        let result = TradeResult::from_parts(
            mode,
            wallet_results,
            outcome.bundle_ids,
            all_errors,
            elapsed_ms(started),
        );

        self.history.record(&intent.mint, action, &result);
        self.events.publish(Event::TradeExecuted {
            mint: intent.mint.clone(),
            action: action.to_string(),
            mode: mode.to_string(),
            success: result.success,
            wallets_ok: result.succeeded(),
            wallets_failed: result.failed(),
            total_sol_in: result.total_sol_in,
        });

        self.schedule_position_refresh(&intent.mint);

        Ok(result)
    }

    /// Let confirmations land, then reconcile cached positions in the
    /// background.
    fn schedule_position_refresh(&self, mint: &str) {
        let pool = Arc::clone(&self.pool);
        let mint = mint.to_string();
        let delay = Duration::from_secs(self.settings.position_refresh_delay_secs);

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match pool.refresh_positions(&mint).await {
                Ok(view) => debug!("reconciled {}: total {}", mint, view.total),
                Err(e) => warn!("position reconciliation failed for {}: {}", mint, e),
            }
        });
    }
}

fn parse_mint(mint: &str) -> Result<Pubkey> {
    mint.parse()
        .map_err(|e| AppError::Parse(format!("mint {}: {}", mint, e)))
}

fn parse_pool(pool: &Option<String>) -> Result<Option<Pubkey>> {
    match pool {
        None => Ok(None),
        Some(p) => p
            .parse()
            .map(Some)
            .map_err(|e| AppError::Parse(format!("pool {}: {}", p, e))),
    }
}
