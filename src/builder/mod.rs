pub mod meteora;
pub mod pumpfun;
pub mod raydium;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0::Message as V0Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;

use crate::coordinator::types::TradeAction;
use crate::error::{AppError, Result};

/// The venues the swarm can trade on. Construction details live behind
/// `VenueBuilder`; everything upstream treats the tag as opaque.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueTag {
    PumpFun,
    Raydium,
    Meteora,
}

impl VenueTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueTag::PumpFun => "pumpfun",
            VenueTag::Raydium => "raydium",
            VenueTag::Meteora => "meteora",
        }
    }

    /// Classify a transaction by the program ids it touches. Used by the
    /// mirror decoder to tag detected trades.
    pub fn from_program_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Option<VenueTag> {
        for id in ids {
            match id {
                pumpfun::PROGRAM_ID => return Some(VenueTag::PumpFun),
                raydium::PROGRAM_ID => return Some(VenueTag::Raydium),
                meteora::PROGRAM_ID => return Some(VenueTag::Meteora),
                _ => {}
            }
        }
        None
    }
}

impl std::fmt::Display for VenueTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a venue needs to construct one wallet's transaction.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub wallet: Pubkey,
    pub mint: Pubkey,
    /// Lamports in for buys.
    pub sol_lamports: u64,
    /// Raw token amount for sells.
    pub token_amount: u64,
    pub slippage_bps: u16,
    pub priority_fee_micro_lamports: u64,
    pub pool: Option<Pubkey>,
    pub recent_blockhash: Hash,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_amount: u64,
    pub output_amount: u64,
    pub price_impact_pct: Option<f64>,
}

/// A pre-finalized unsigned transaction for one wallet, plus whatever the
/// venue could tell us about the expected fill.
pub struct BuiltTransaction {
    pub message: VersionedMessage,
    pub quote: Option<Quote>,
}

#[async_trait]
pub trait VenueBuilder: Send + Sync {
    async fn build_buy(&self, req: &BuildRequest) -> Result<BuiltTransaction>;

    async fn build_sell(&self, req: &BuildRequest) -> Result<BuiltTransaction>;

    /// Dry-run price discovery. Venues without a quote path keep the
    /// default.
    async fn quote(&self, _req: &BuildRequest, _action: TradeAction) -> Result<Quote> {
        Err(AppError::Build("venue does not support quotes".into()))
    }
}

pub struct BuilderRegistry {
    builders: HashMap<VenueTag, Arc<dyn VenueBuilder>>,
    default_tag: VenueTag,
}

impl BuilderRegistry {
    pub fn new(default_tag: VenueTag) -> Self {
        Self { builders: HashMap::new(), default_tag }
    }

    pub fn register(mut self, tag: VenueTag, builder: Arc<dyn VenueBuilder>) -> Self {
        self.builders.insert(tag, builder);
        self
    }

    pub fn get(&self, tag: Option<VenueTag>) -> Result<(VenueTag, Arc<dyn VenueBuilder>)> {
        let tag = tag.unwrap_or(self.default_tag);
        self.builders
            .get(&tag)
            .map(|b| (tag, Arc::clone(b)))
            .ok_or_else(|| AppError::Build(format!("no builder registered for venue {}", tag)))
    }
}

/// Compile a payer-first v0 message with the compute-budget prefix every
/// venue transaction carries.
pub(crate) fn compile_message(
    payer: &Pubkey,
    compute_units: u32,
    priority_fee_micro_lamports: u64,
    mut instructions: Vec<Instruction>,
    recent_blockhash: Hash,
) -> Result<VersionedMessage> {
    let mut all = vec![
        ComputeBudgetInstruction::set_compute_unit_limit(compute_units),
        ComputeBudgetInstruction::set_compute_unit_price(priority_fee_micro_lamports),
    ];
    all.append(&mut instructions);

    let message = V0Message::try_compile(payer, &all, &[], recent_blockhash)
        .map_err(|e| AppError::Build(format!("message compile: {}", e)))?;

    Ok(VersionedMessage::V0(message))
}

/// `amount` grown by the slippage tolerance (worst acceptable cost).
pub(crate) fn with_slippage_up(amount: u64, slippage_bps: u16) -> u64 {
    (amount as u128 * (10_000 + slippage_bps as u128) / 10_000) as u64
}

/// `amount` shrunk by the slippage tolerance (worst acceptable proceeds).
pub(crate) fn with_slippage_down(amount: u64, slippage_bps: u16) -> u64 {
    (amount as u128 * (10_000 - slippage_bps as u128) / 10_000) as u64
}
