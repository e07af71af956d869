use std::str::FromStr;

use async_trait::async_trait;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use crate::builder::{compile_message, BuildRequest, BuiltTransaction, VenueBuilder};
use crate::error::{AppError, Result};

pub const PROGRAM_ID: &str = "LBUZKhRxPF3XUpBCjp4YzTKgLccjZhTSDM9YuVaPwxo";

const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

const SWAP_DISCRIMINATOR: [u8; 8] = [248, 198, 158, 145, 225, 117, 135, 200];
const COMPUTE_UNITS: u32 = 180_000;

/// DLMM venue. Like Raydium, an explicit pool (lb pair) address is
/// required on the intent.
pub struct MeteoraBuilder;

impl MeteoraBuilder {
    fn swap_instruction(
        &self,
        req: &BuildRequest,
        source_mint: &Pubkey,
        dest_mint: &Pubkey,
        amount_in: u64,
        min_amount_out: u64,
    ) -> Result<Instruction> {
        let program = Pubkey::from_str(PROGRAM_ID)
            .map_err(|e| AppError::Build(format!("bad program constant: {}", e)))?;
        let lb_pair = req
            .pool
            .ok_or_else(|| AppError::Build("meteora requires an lb pair address".into()))?;

        let user_source =
            spl_associated_token_account::get_associated_token_address(&req.wallet, source_mint);
        let user_destination =
            spl_associated_token_account::get_associated_token_address(&req.wallet, dest_mint);

        let accounts = vec![
            AccountMeta::new(lb_pair, false),
            AccountMeta::new(user_source, false),
            AccountMeta::new(user_destination, false),
            AccountMeta::new_readonly(req.wallet, true),
            AccountMeta::new_readonly(spl_token::id(), false),
        ];

        let mut data = SWAP_DISCRIMINATOR.to_vec();
        data.extend_from_slice(&amount_in.to_le_bytes());
        data.extend_from_slice(&min_amount_out.to_le_bytes());

        Ok(Instruction { program_id: program, accounts, data })
    }
}

#[async_trait]
impl VenueBuilder for MeteoraBuilder {
    async fn build_buy(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        let wsol = Pubkey::from_str(WSOL_MINT)
            .map_err(|e| AppError::Build(format!("bad WSOL constant: {}", e)))?;

        let create_ata =
            spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                &req.wallet,
                &req.wallet,
                &req.mint,
                &spl_token::id(),
            );
        let swap = self.swap_instruction(req, &wsol, &req.mint, req.sol_lamports, 0)?;

        let message = compile_message(
            &req.wallet,
            COMPUTE_UNITS,
            req.priority_fee_micro_lamports,
            vec![create_ata, swap],
            req.recent_blockhash,
        )?;

        Ok(BuiltTransaction { message, quote: None })
    }

    async fn build_sell(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        let wsol = Pubkey::from_str(WSOL_MINT)
            .map_err(|e| AppError::Build(format!("bad WSOL constant: {}", e)))?;

        let swap = self.swap_instruction(req, &req.mint, &wsol, req.token_amount, 0)?;

        let message = compile_message(
            &req.wallet,
            COMPUTE_UNITS,
            req.priority_fee_micro_lamports,
            vec![swap],
            req.recent_blockhash,
        )?;

        Ok(BuiltTransaction { message, quote: None })
    }
}
