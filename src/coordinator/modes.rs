use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use rand::Rng;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, info, warn};

use crate::builder::{BuildRequest, VenueBuilder};
use crate::bundle::{tip_transaction, BundleSubmitter};
use crate::coordinator::engine::ExecSettings;
use crate::coordinator::types::{ExecutionMode, TradeAction, WalletResult};
use crate::error::{AppError, Result};
use crate::rpc::ChainRpc;
use crate::utils::{lamports_to_sol, time::now_ts};
use crate::wallet::{WalletPool, WalletSnapshot};
use crate::wallet::keys::sign_message;

/// Shared collaborators for one dispatch.
pub(crate) struct DispatchCtx {
    pub chain: Arc<dyn ChainRpc>,
    pub bundle: Arc<dyn BundleSubmitter>,
    pub builder: Arc<dyn VenueBuilder>,
    pub pool: Arc<WalletPool>,
    pub settings: ExecSettings,
    pub mint: Pubkey,
    pub pool_address: Option<Pubkey>,
    pub slippage_bps: u16,
    pub priority_fee_micro_lamports: u64,
}

/// One wallet's slice of the intent, fixed at planning time.
pub(crate) struct PlannedTrade {
    pub wallet: WalletSnapshot,
    pub action: TradeAction,
    pub sol_lamports: u64,
    pub token_amount: u64,
}

impl PlannedTrade {
    fn sol_amount(&self) -> Option<f64> {
        match self.action {
            TradeAction::Buy => Some(lamports_to_sol(self.sol_lamports)),
            TradeAction::Sell => None,
        }
    }

    fn tokens(&self) -> Option<u64> {
        match self.action {
            TradeAction::Buy => None,
            TradeAction::Sell => Some(self.token_amount),
        }
    }
}

pub(crate) struct DispatchOutcome {
    pub wallet_results: Vec<WalletResult>,
    pub bundle_ids: Vec<String>,
    pub errors: Vec<String>,
}

pub(crate) async fn dispatch(
    ctx: &DispatchCtx,
    mode: ExecutionMode,
    planned: Vec<PlannedTrade>,
) -> DispatchOutcome {
    match mode {
        ExecutionMode::Parallel => dispatch_parallel(ctx, planned).await,
        ExecutionMode::Bundle if fits_one_bundle(ctx, &planned) => {
            dispatch_bundle(ctx, planned).await
        }
        ExecutionMode::Bundle | ExecutionMode::MultiBundle => {
            dispatch_multi_bundle(ctx, planned).await
        }
        ExecutionMode::Sequential => dispatch_sequential(ctx, planned).await,
    }
}

async fn build_and_sign(
    ctx: &DispatchCtx,
    trade: &PlannedTrade,
    recent_blockhash: Hash,
) -> Result<VersionedTransaction> {
    let req = BuildRequest {
        wallet: trade.wallet.address,
        mint: ctx.mint,
        sol_lamports: trade.sol_lamports,
        token_amount: trade.token_amount,
        slippage_bps: ctx.slippage_bps,
        priority_fee_micro_lamports: ctx.priority_fee_micro_lamports,
        pool: ctx.pool_address,
        recent_blockhash,
    };

    let built = match trade.action {
        TradeAction::Buy => ctx.builder.build_buy(&req).await?,
        TradeAction::Sell => ctx.builder.build_sell(&req).await?,
    };

    sign_message(built.message, &trade.wallet.keypair)
}

/// Submit one signed transaction; confirmation is watched in the
/// background and never gates the result.
async fn submit_detached(ctx: &DispatchCtx, trade: &PlannedTrade, tx: &VersionedTransaction) -> WalletResult {
    match ctx.chain.send_transaction(tx).await {
        Ok(signature) => {
            ctx.pool.record_trade(&trade.wallet.id);
            spawn_background_confirm(ctx, &trade.wallet.id, signature.clone());
            WalletResult::ok(
                &trade.wallet.id,
                trade.wallet.address.to_string(),
                Some(signature),
                trade.sol_amount(),
                trade.tokens(),
            )
        }
        Err(e) => {
            warn!("submit failed for {}: {}", trade.wallet.id, e);
            WalletResult::failed(&trade.wallet.id, trade.wallet.address.to_string(), e.to_string())
        }
    }
}

fn spawn_background_confirm(ctx: &DispatchCtx, wallet_id: &str, signature: String) {
    let chain = Arc::clone(&ctx.chain);
    let timeout = Duration::from_millis(ctx.settings.confirm_timeout_ms);
    let wallet_id = wallet_id.to_string();

    tokio::spawn(async move {
        match chain.confirm_signature(&signature, timeout).await {
            Ok(true) => debug!("{} confirmed for {}", signature, wallet_id),
            Ok(false) => warn!("{} unconfirmed after budget for {}", signature, wallet_id),
            Err(e) => warn!("{} confirmation check failed for {}: {}", signature, wallet_id, e),
        }
    });
}

async fn dispatch_parallel(ctx: &DispatchCtx, planned: Vec<PlannedTrade>) -> DispatchOutcome {
    let recent_blockhash = match ctx.chain.latest_blockhash().await {
        Ok(hash) => hash,
        Err(e) => return all_failed(&planned, &e),
    };

    let attempts = planned.iter().map(|trade| async move {
        match build_and_sign(ctx, trade, recent_blockhash).await {
            Ok(tx) => submit_detached(ctx, trade, &tx).await,
            Err(e) => {
                warn!("build failed for {}: {}", trade.wallet.id, e);
                WalletResult::failed(&trade.wallet.id, trade.wallet.address.to_string(), e.to_string())
            }
        }
    });

    DispatchOutcome {
        wallet_results: join_all(attempts).await,
        bundle_ids: Vec::new(),
        errors: Vec::new(),
    }
}

async fn dispatch_bundle(ctx: &DispatchCtx, planned: Vec<PlannedTrade>) -> DispatchOutcome {
    let recent_blockhash = match ctx.chain.latest_blockhash().await {
        Ok(hash) => hash,
        Err(e) => return all_failed(&planned, &e),
    };

    let (outcome, _) = bundle_chunk(ctx, &planned, recent_blockhash).await;
    outcome
}

/// Execute one chunk as an atomic bundle, falling back to per-wallet
/// submission of the already-signed transactions if the bundle service
/// rejects it. Returns whether the fallback path ran.
async fn bundle_chunk(
    ctx: &DispatchCtx,
    planned: &[PlannedTrade],
    recent_blockhash: Hash,
) -> (DispatchOutcome, bool) {
    debug_assert!(planned.len() <= ctx.settings.bundle_size_limit);

    // Build and sign everything first; build failures drop out of the
    // bundle but stay in the result.
    let built = join_all(planned.iter().map(|trade| async move {
        (trade, build_and_sign(ctx, trade, recent_blockhash).await)
    }))
    .await;

    let mut wallet_results = Vec::new();
    let mut bundled: Vec<(&PlannedTrade, VersionedTransaction)> = Vec::new();

    for (trade, outcome) in built {
        match outcome {
            Ok(tx) => bundled.push((trade, tx)),
            Err(e) => {
                warn!("build failed for {}: {}", trade.wallet.id, e);
                wallet_results.push(WalletResult::failed(
                    &trade.wallet.id,
                    trade.wallet.address.to_string(),
                    e.to_string(),
                ));
            }
        }
    }

    if bundled.is_empty() {
        return (
            DispatchOutcome { wallet_results, bundle_ids: Vec::new(), errors: Vec::new() },
            false,
        );
    }

    let mut txs: Vec<VersionedTransaction> =
        bundled.iter().map(|(_, tx)| tx.clone()).collect();

    match tip_transaction(
        &bundled[0].0.wallet.keypair,
        recent_blockhash,
        ctx.settings.tip_lamports,
    ) {
        Ok(tip) => txs.push(tip),
        Err(e) => {
            warn!("tip construction failed, submitting individually: {}", e);
            let fallback = submit_signed(ctx, &bundled).await;
            wallet_results.extend(fallback);
            return (
                DispatchOutcome {
                    wallet_results,
                    bundle_ids: Vec::new(),
                    errors: vec![e.to_string()],
                },
                true,
            );
        }
    }

    match ctx.bundle.submit_bundle(&txs).await {
        Ok(bundle_id) => {
            // Tentative success for every bundled wallet; the scheduled
            // position refresh validates actual landing.
            for (trade, tx) in &bundled {
                ctx.pool.record_trade(&trade.wallet.id);
                wallet_results.push(WalletResult::ok(
                    &trade.wallet.id,
                    trade.wallet.address.to_string(),
                    tx.signatures.first().map(|s| s.to_string()),
                    trade.sol_amount(),
                    trade.tokens(),
                ));
            }
            (
                DispatchOutcome {
                    wallet_results,
                    bundle_ids: vec![bundle_id],
                    errors: Vec::new(),
                },
                false,
            )
        }
        Err(e) => {
            info!("bundle rejected ({}), falling back to parallel submission", e);
            let fallback = submit_signed(ctx, &bundled).await;
            wallet_results.extend(fallback);
            (
                DispatchOutcome {
                    wallet_results,
                    bundle_ids: Vec::new(),
                    errors: vec![e.to_string()],
                },
                true,
            )
        }
    }
}

/// Parallel submission of transactions that are already signed.
async fn submit_signed(
    ctx: &DispatchCtx,
    bundled: &[(&PlannedTrade, VersionedTransaction)],
) -> Vec<WalletResult> {
    join_all(
        bundled
            .iter()
            .map(|(trade, tx)| async move { submit_detached(ctx, *trade, tx).await }),
    )
    .await
}

/// Bundle mode accepts any wallet count; past the venue cap it degrades
/// to chunked bundles.
fn fits_one_bundle(ctx: &DispatchCtx, planned: &[PlannedTrade]) -> bool {
    planned.len() <= ctx.settings.bundle_size_limit
}

async fn dispatch_multi_bundle(ctx: &DispatchCtx, planned: Vec<PlannedTrade>) -> DispatchOutcome {
    let recent_blockhash = match ctx.chain.latest_blockhash().await {
        Ok(hash) => hash,
        Err(e) => return all_failed(&planned, &e),
    };

    let chunks: Vec<&[PlannedTrade]> =
        planned.chunks(ctx.settings.bundle_size_limit).collect();
    debug!("multi-bundle dispatch across {} chunks", chunks.len());

    let outcomes = join_all(
        chunks
            .into_iter()
            .map(|chunk| async move { bundle_chunk(ctx, chunk, recent_blockhash).await }),
    )
    .await;

    let mut merged = DispatchOutcome {
        wallet_results: Vec::new(),
        bundle_ids: Vec::new(),
        errors: Vec::new(),
    };

    for (outcome, _fell_back) in outcomes {
        merged.wallet_results.extend(outcome.wallet_results);
        merged.bundle_ids.extend(outcome.bundle_ids);
        merged.errors.extend(outcome.errors);
    }

    merged
}

async fn dispatch_sequential(ctx: &DispatchCtx, planned: Vec<PlannedTrade>) -> DispatchOutcome {
    let mut wallet_results = Vec::new();
    let last = planned.len().saturating_sub(1);

    for (i, trade) in planned.iter().enumerate() {
        wait_for_rate_limit(ctx, &trade.wallet.id).await;

        let result = execute_one_confirmed(ctx, trade).await;
        wallet_results.push(result);

        if i < last {
            let stagger = ctx.settings.stagger_delay_ms;
            let jitter = if stagger > 0 { rand::thread_rng().gen_range(0..=stagger) } else { 0 };
            tokio::time::sleep(Duration::from_millis(stagger + jitter)).await;
        }
    }

    DispatchOutcome { wallet_results, bundle_ids: Vec::new(), errors: Vec::new() }
}

/// Honour the per-wallet cadence floor before touching the chain again.
async fn wait_for_rate_limit(ctx: &DispatchCtx, wallet_id: &str) {
    let last_trade_ms = ctx
        .pool
        .get(wallet_id)
        .map(|w| w.last_trade_ms)
        .unwrap_or(0);
    if last_trade_ms == 0 {
        return;
    }

    let elapsed = now_ts().saturating_sub(last_trade_ms);
    if elapsed < ctx.settings.rate_limit_ms {
        let remaining = ctx.settings.rate_limit_ms - elapsed;
        debug!("rate limit: {} sleeping {}ms", wallet_id, remaining);
        tokio::time::sleep(Duration::from_millis(remaining)).await;
    }
}

/// Build, submit, then poll confirmation within the per-wallet budget.
/// A timeout keeps the signature in the result: the transaction may still
/// land.
async fn execute_one_confirmed(ctx: &DispatchCtx, trade: &PlannedTrade) -> WalletResult {
    let recent_blockhash = match ctx.chain.latest_blockhash().await {
        Ok(hash) => hash,
        Err(e) => {
            return WalletResult::failed(
                &trade.wallet.id,
                trade.wallet.address.to_string(),
                e.to_string(),
            )
        }
    };

    let tx = match build_and_sign(ctx, trade, recent_blockhash).await {
        Ok(tx) => tx,
        Err(e) => {
            return WalletResult::failed(
                &trade.wallet.id,
                trade.wallet.address.to_string(),
                e.to_string(),
            )
        }
    };

    let signature = match ctx.chain.send_transaction(&tx).await {
        Ok(signature) => {
            ctx.pool.record_trade(&trade.wallet.id);
            signature
        }
        Err(e) => {
            return WalletResult::failed(
                &trade.wallet.id,
                trade.wallet.address.to_string(),
                e.to_string(),
            )
        }
    };

    let timeout = Duration::from_millis(ctx.settings.confirm_timeout_ms);
    match ctx.chain.confirm_signature(&signature, timeout).await {
        Ok(true) => WalletResult::ok(
            &trade.wallet.id,
            trade.wallet.address.to_string(),
            Some(signature),
            trade.sol_amount(),
            trade.tokens(),
        ),
        Ok(false) => {
            let err = AppError::ConfirmTimeout { signature: signature.clone() };
            WalletResult {
                wallet_id: trade.wallet.id.clone(),
                address: trade.wallet.address.to_string(),
                success: false,
                signature: Some(signature),
                sol_amount: None,
                token_amount: None,
                error: Some(err.to_string()),
            }
        }
        Err(e) => WalletResult {
            wallet_id: trade.wallet.id.clone(),
            address: trade.wallet.address.to_string(),
            success: false,
            signature: Some(signature),
            sol_amount: None,
            token_amount: None,
            error: Some(e.to_string()),
        },
    }
}

fn all_failed(planned: &[PlannedTrade], error: &AppError) -> DispatchOutcome {
    DispatchOutcome {
        wallet_results: planned
            .iter()
            .map(|trade| {
                WalletResult::failed(
                    &trade.wallet.id,
                    trade.wallet.address.to_string(),
                    error.to_string(),
                )
            })
            .collect(),
        bundle_ids: Vec::new(),
        errors: vec![error.to_string()],
    }
}
