use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::seq::SliceRandom;
use reqwest::Client;
use serde_json::{json, Value};
use solana_sdk::hash::Hash;
use solana_sdk::message::{v0::Message as V0Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;
use tracing::{debug, info};

use crate::error::{AppError, Result};

/// Operator tip accounts; one is picked uniformly at random per bundle.
const TIP_ACCOUNTS: [&str; 8] = [
    "96gYZGLnJYVFmbjzopPSU6QiEV5fGqZNyN9nmNhvrZU5",
    "HFqU5x63VTqvQss8hp11i4wVV8bD44PvwucfZ2bU7gRe",
    "Cw8CFyM9FkoMi7K7Crf6HNQqf4uEMzpKw6QNghXLvLkY",
    "ADaUMid9yfUytqMBgopwjb2DTLSokTSzL1zt6iGPaS49",
    "DfXygSm4jCyNCybVYYK6DwvWqjKee8pbDmJGcLWNDXjh",
    "ADuUkR4vqLUMWXxW9gh6D6L8pMSawimctcNZ5pGwDcEt",
    "DttWaMuVvTiduZRnguLF7jNxTgiMBZ1hyAumKUiL2KRL",
    "3AVi9Tg9Uo68tJfuvoKvqKNWKkC5wPdSSdeBnizKZ6jT",
];

#[async_trait]
pub trait BundleSubmitter: Send + Sync {
    /// Submit signed transactions as one atomic bundle; returns the
    /// bundle id on acceptance.
    async fn submit_bundle(&self, txs: &[VersionedTransaction]) -> Result<String>;
}

pub struct JitoBundleClient {
    http: Client,
    url: String,
}

impl JitoBundleClient {
    pub fn new(url: &str) -> Result<Self> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self { http, url: url.to_string() })
    }
}

#[async_trait]
impl BundleSubmitter for JitoBundleClient {
    async fn submit_bundle(&self, txs: &[VersionedTransaction]) -> Result<String> {
        let encoded: Vec<String> = txs
            .iter()
            .map(|tx| {
                bincode::serialize(tx)
                    .map(|bytes| STANDARD.encode(bytes))
                    .map_err(|e| AppError::Bundle(format!("serialize: {}", e)))
            })
            .collect::<Result<_>>()?;

        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "sendBundle",
            "params": [encoded]
        });

        let response = self
            .http
            .post(&self.url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::Bundle(format!("transport: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Bundle(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Bundle(format!("body: {}", e)))?;

        if let Some(error) = body.get("error") {
            return Err(AppError::Bundle(format!("{}", error)));
        }

        let bundle_id = body["result"]
            .as_str()
            .ok_or_else(|| AppError::Bundle("sendBundle result is not a string".into()))?
            .to_string();

        info!("bundle accepted: {}", bundle_id);
        Ok(bundle_id)
    }
}

pub fn random_tip_account() -> Result<Pubkey> {
    let picked = TIP_ACCOUNTS
        .choose(&mut rand::thread_rng())
        .expect("tip account table is non-empty");
    Pubkey::from_str(picked).map_err(|e| AppError::Bundle(format!("bad tip account: {}", e)))
}

/// The tip transfer appended to every bundle, paid by the bundle's first
/// wallet.
pub fn tip_transaction(
    payer: &Keypair,
    recent_blockhash: Hash,
    lamports: u64,
) -> Result<VersionedTransaction> {
    let tip_account = random_tip_account()?;
    debug!("tipping {} lamports to {}", lamports, tip_account);

    let transfer = system_instruction::transfer(&payer.pubkey(), &tip_account, lamports);
    let message = V0Message::try_compile(&payer.pubkey(), &[transfer], &[], recent_blockhash)
        .map_err(|e| AppError::Bundle(format!("tip compile: {}", e)))?;

    VersionedTransaction::try_new(VersionedMessage::V0(message), &[payer])
        .map_err(|e| AppError::Bundle(format!("tip sign: {}", e)))
}
