use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::{system_program, sysvar};

use crate::builder::{
    compile_message, with_slippage_down, with_slippage_up, BuildRequest, BuiltTransaction, Quote,
    VenueBuilder,
};
use crate::coordinator::types::TradeAction;
use crate::error::{AppError, Result};
use crate::price::{PriceSource, TOKEN_UNITS};
use crate::utils::LAMPORTS_PER_SOL;

pub const PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";
const GLOBAL: &str = "4wTV1YmiEkRvAtNtsSGPtUrqRYQMe5SKy2uB4Jjaxnjf";
const FEE_RECIPIENT: &str = "CebN5WGQ4jvEPvsVU4EoHEpgzq1VV7AbicfhtW4xC9iM";
const EVENT_AUTHORITY: &str = "Ce6TQqeHC9p8KetsN6JsjHK7UTZk7nasjjnr7XxXp9F1";

const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];

const COMPUTE_UNITS: u32 = 120_000;

/// Bonding-curve venue. Token sizing comes from the venue's spot price;
/// the curve program enforces the max-cost / min-proceeds bounds.
pub struct PumpFunBuilder {
    price: Arc<dyn PriceSource>,
}

impl PumpFunBuilder {
    pub fn new(price: Arc<dyn PriceSource>) -> Self {
        Self { price }
    }

    async fn spot_price(&self, mint: &Pubkey) -> Result<f64> {
        self.price
            .price_of(&mint.to_string())
            .await?
            .ok_or_else(|| AppError::Build(format!("no price for {}", mint)))
    }

    fn swap_instruction(
        &self,
        req: &BuildRequest,
        data: Vec<u8>,
        is_buy: bool,
    ) -> Result<Instruction> {
        let program = pubkey(PROGRAM_ID)?;
        let bonding_curve =
            Pubkey::find_program_address(&[b"bonding-curve", req.mint.as_ref()], &program).0;
        let curve_ata =
            spl_associated_token_account::get_associated_token_address(&bonding_curve, &req.mint);
        let user_ata =
            spl_associated_token_account::get_associated_token_address(&req.wallet, &req.mint);

        let mut accounts = vec![
            AccountMeta::new_readonly(pubkey(GLOBAL)?, false),
            AccountMeta::new(pubkey(FEE_RECIPIENT)?, false),
            AccountMeta::new_readonly(req.mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(curve_ata, false),
            AccountMeta::new(user_ata, false),
            AccountMeta::new(req.wallet, true),
            AccountMeta::new_readonly(system_program::id(), false),
        ];
        if is_buy {
            accounts.push(AccountMeta::new_readonly(spl_token::id(), false));
            accounts.push(AccountMeta::new_readonly(sysvar::rent::id(), false));
        } else {
            accounts.push(AccountMeta::new_readonly(
                spl_associated_token_account::id(),
                false,
            ));
            accounts.push(AccountMeta::new_readonly(spl_token::id(), false));
        }
        accounts.push(AccountMeta::new_readonly(pubkey(EVENT_AUTHORITY)?, false));
        accounts.push(AccountMeta::new_readonly(program, false));

        Ok(Instruction { program_id: program, accounts, data })
    }
}

#[async_trait]
impl VenueBuilder for PumpFunBuilder {
    async fn build_buy(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        let quote = self.quote(req, TradeAction::Buy).await?;

        let max_sol_cost = with_slippage_up(req.sol_lamports, req.slippage_bps);
        let mut data = BUY_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&quote.output_amount.to_le_bytes());
        data.extend_from_slice(&max_sol_cost.to_le_bytes());

        let create_ata =
            spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                &req.wallet,
                &req.wallet,
                &req.mint,
                &spl_token::id(),
            );
        let swap = self.swap_instruction(req, data, true)?;

        let message = compile_message(
            &req.wallet,
            COMPUTE_UNITS,
            req.priority_fee_micro_lamports,
            vec![create_ata, swap],
            req.recent_blockhash,
        )?;

        Ok(BuiltTransaction { message, quote: Some(quote) })
    }

    async fn build_sell(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        let quote = self.quote(req, TradeAction::Sell).await?;

        let min_sol_output = with_slippage_down(quote.output_amount, req.slippage_bps);
        let mut data = SELL_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&req.token_amount.to_le_bytes());
        data.extend_from_slice(&min_sol_output.to_le_bytes());

        let swap = self.swap_instruction(req, data, false)?;

        let message = compile_message(
            &req.wallet,
            COMPUTE_UNITS,
            req.priority_fee_micro_lamports,
            vec![swap],
            req.recent_blockhash,
        )?;

        Ok(BuiltTransaction { message, quote: Some(quote) })
    }

    async fn quote(&self, req: &BuildRequest, action: TradeAction) -> Result<Quote> {
        let price = self.spot_price(&req.mint).await?;

        match action {
            TradeAction::Buy => {
                let sol = req.sol_lamports as f64 / LAMPORTS_PER_SOL as f64;
                let tokens = ((sol / price) * TOKEN_UNITS) as u64;
                Ok(Quote {
                    input_amount: req.sol_lamports,
                    output_amount: tokens,
                    price_impact_pct: None,
                })
            }
            TradeAction::Sell => {
                let tokens = req.token_amount as f64 / TOKEN_UNITS;
                let lamports = (tokens * price * LAMPORTS_PER_SOL as f64) as u64;
                Ok(Quote {
                    input_amount: req.token_amount,
                    output_amount: lamports,
                    price_impact_pct: None,
                })
            }
        }
    }
}

fn pubkey(s: &str) -> Result<Pubkey> {
    Pubkey::from_str(s).map_err(|e| AppError::Build(format!("bad program constant {}: {}", s, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;

    struct FixedPrice(f64);

    #[async_trait]
    impl PriceSource for FixedPrice {
        async fn price_of(&self, _mint: &str) -> Result<Option<f64>> {
            Ok(Some(self.0))
        }
    }

    fn request(sol_lamports: u64, token_amount: u64) -> BuildRequest {
        BuildRequest {
            wallet: Pubkey::new_unique(),
            mint: Pubkey::new_unique(),
            sol_lamports,
            token_amount,
            slippage_bps: 100,
            priority_fee_micro_lamports: 1_000,
            pool: None,
            recent_blockhash: Hash::default(),
        }
    }

    #[tokio::test]
    async fn test_buy_quote_sizes_tokens_from_price() {
        let builder = PumpFunBuilder::new(Arc::new(FixedPrice(0.00002)));
        let req = request(100_000_000, 0); // 0.1 SOL

        let quote = builder.quote(&req, TradeAction::Buy).await.unwrap();
        // 0.1 SOL / 0.00002 SOL-per-token = 5000 tokens
        assert_eq!(quote.output_amount, 5_000 * TOKEN_UNITS as u64);
    }

    #[tokio::test]
    async fn test_build_buy_produces_signable_message() {
        let builder = PumpFunBuilder::new(Arc::new(FixedPrice(0.00002)));
        let req = request(100_000_000, 0);

        let built = builder.build_buy(&req).await.unwrap();
        assert!(built.quote.is_some());
        // compute budget prefix + create-ata + swap
        assert_eq!(built.message.instructions().len(), 4);
    }

    #[tokio::test]
    async fn test_no_price_is_a_build_error() {
        struct NoPrice;

        #[async_trait]
        impl PriceSource for NoPrice {
            async fn price_of(&self, _mint: &str) -> Result<Option<f64>> {
                Ok(None)
            }
        }

        let builder = PumpFunBuilder::new(Arc::new(NoPrice));
        assert!(builder.build_buy(&request(1_000_000, 0)).await.is_err());
    }
}
