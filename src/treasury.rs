use std::sync::Arc;

use futures_util::future::join_all;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0::Message as V0Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{info, warn};

use crate::coordinator::types::WalletResult;
use crate::error::{AppError, Result};
use crate::rpc::ChainRpc;
use crate::utils::sol_to_lamports;
use crate::wallet::{WalletPool, WalletSnapshot};

/// SOL and token housekeeping across the pool: fund the swarm from the
/// primary wallet, sweep it back, gather token dust.
pub struct Treasury {
    pool: Arc<WalletPool>,
    chain: Arc<dyn ChainRpc>,
}

impl Treasury {
    pub fn new(pool: Arc<WalletPool>, chain: Arc<dyn ChainRpc>) -> Self {
        Self { pool, chain }
    }

    /// Send `sol_each` from the primary wallet to every other enabled
    /// wallet (or the named subset).
    pub async fn distribute_sol(
        &self,
        sol_each: f64,
        wallet_ids: Option<Vec<String>>,
    ) -> Result<Vec<WalletResult>> {
        if sol_each <= 0.0 {
            return Err(AppError::Config("distribution amount must be positive".into()));
        }

        let primary = self.pool.primary();
        let recipients = self.non_primary(wallet_ids);
        let lamports = sol_to_lamports(sol_each);
        let blockhash = self.chain.latest_blockhash().await?;

        info!(
            "distributing {} SOL from {} to {} wallets",
            sol_each,
            primary.id,
            recipients.len()
        );

        let sends = recipients.into_iter().map(|wallet| {
            let primary = primary.clone();
            async move {
                let transfer =
                    system_instruction::transfer(&primary.address, &wallet.address, lamports);
                self.send_simple(&primary.keypair, &primary.address, vec![transfer], blockhash, &wallet)
                    .await
            }
        });

        Ok(join_all(sends).await)
    }

    /// Sweep each wallet's SOL above `reserve_sol` back to the primary.
    pub async fn consolidate_sol(&self, reserve_sol: f64) -> Result<Vec<WalletResult>> {
        self.pool.refresh_balances().await?;

        let primary = self.pool.primary();
        let sources = self.non_primary(None);
        let blockhash = self.chain.latest_blockhash().await?;

        let sends = sources.into_iter().filter_map(|wallet| {
            let surplus = wallet.sol_balance - reserve_sol;
            if surplus <= 0.0 {
                return None;
            }
            let lamports = sol_to_lamports(surplus);
            let primary_address = primary.address;

            Some(async move {
                let transfer =
                    system_instruction::transfer(&wallet.address, &primary_address, lamports);
                self.send_simple(
                    &wallet.keypair,
                    &wallet.address,
                    vec![transfer],
                    blockhash,
                    &wallet,
                )
                .await
            })
        });

        Ok(join_all(sends).await)
    }

    /// Move every wallet's holding of `mint` into the primary wallet's
    /// token account, creating it if needed.
    pub async fn consolidate_tokens(&self, mint: &str) -> Result<Vec<WalletResult>> {
        let mint_key: Pubkey = mint
            .parse()
            .map_err(|e| AppError::Parse(format!("mint {}: {}", mint, e)))?;

        let view = self.pool.refresh_positions(mint).await?;
        if view.total == 0 {
            return Ok(Vec::new());
        }

        let primary = self.pool.primary();
        let primary_ata =
            spl_associated_token_account::get_associated_token_address(&primary.address, &mint_key);
        let blockhash = self.chain.latest_blockhash().await?;

        let sources: Vec<WalletSnapshot> = self
            .non_primary(None)
            .into_iter()
            .filter(|w| view.by_wallet.get(&w.id).copied().unwrap_or(0) > 0)
            .collect();

        let sends = sources.into_iter().map(|wallet| {
            let amount = view.by_wallet[&wallet.id];
            let primary_address = primary.address;

            async move {
                let source_ata = spl_associated_token_account::get_associated_token_address(
                    &wallet.address,
                    &mint_key,
                );
                let create_dest =
                    spl_associated_token_account::instruction::create_associated_token_account_idempotent(
                        &wallet.address,
                        &primary_address,
                        &mint_key,
                        &spl_token::id(),
                    );
                let transfer = match spl_token::instruction::transfer(
                    &spl_token::id(),
                    &source_ata,
                    &primary_ata,
                    &wallet.address,
                    &[],
                    amount,
                ) {
                    Ok(ix) => ix,
                    Err(e) => {
                        return WalletResult::failed(
                            &wallet.id,
                            wallet.address.to_string(),
                            format!("transfer instruction: {}", e),
                        )
                    }
                };

                self.send_simple(
                    &wallet.keypair,
                    &wallet.address,
                    vec![create_dest, transfer],
                    blockhash,
                    &wallet,
                )
                .await
            }
        });

        Ok(join_all(sends).await)
    }

    fn non_primary(&self, wallet_ids: Option<Vec<String>>) -> Vec<WalletSnapshot> {
        let primary_id = self.pool.primary().id;
        self.pool
            .enabled()
            .into_iter()
            .filter(|w| w.id != primary_id)
            .filter(|w| {
                wallet_ids
                    .as_ref()
                    .map(|ids| ids.contains(&w.id))
                    .unwrap_or(true)
            })
            .collect()
    }

    async fn send_simple(
        &self,
        signer: &Keypair,
        payer: &Pubkey,
        instructions: Vec<Instruction>,
        blockhash: Hash,
        wallet: &WalletSnapshot,
    ) -> WalletResult {
        let message = match V0Message::try_compile(payer, &instructions, &[], blockhash) {
            Ok(m) => VersionedMessage::V0(m),
            Err(e) => {
                return WalletResult::failed(&wallet.id, wallet.address.to_string(), e.to_string())
            }
        };
        let tx = match VersionedTransaction::try_new(message, &[signer]) {
            Ok(tx) => tx,
            Err(e) => {
                return WalletResult::failed(&wallet.id, wallet.address.to_string(), e.to_string())
            }
        };

        match self.chain.send_transaction(&tx).await {
            Ok(signature) => {
                WalletResult::ok(&wallet.id, wallet.address.to_string(), Some(signature), None, None)
            }
            Err(e) => {
                warn!("treasury transfer failed for {}: {}", wallet.id, e);
                WalletResult::failed(&wallet.id, wallet.address.to_string(), e.to_string())
            }
        }
    }
}
