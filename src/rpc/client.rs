use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde_json::{json, Value};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{AppError, Result};

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);
const STATUS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Chain access behind a trait so execution paths can be exercised against
/// an in-memory chain in tests.
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Lamport balance of an account.
    async fn get_sol_balance(&self, owner: &Pubkey) -> Result<u64>;

    /// Raw token amount held by `owner`'s associated token account for
    /// `mint`. `None` when the account does not exist.
    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<u64>>;

    async fn latest_blockhash(&self) -> Result<Hash>;

    /// Submit a signed transaction. Returns the signature on acceptance;
    /// acceptance means the node took it for propagation, not inclusion.
    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<String>;

    /// Poll signature status until confirmed or `timeout` elapses.
    /// `Ok(false)` means the budget ran out with the signature still
    /// pending.
    async fn confirm_signature(&self, signature: &str, timeout: Duration) -> Result<bool>;

    /// Fetch a transaction in `jsonParsed` encoding.
    async fn get_transaction_json(&self, signature: &str) -> Result<Value>;
}

pub struct HttpChainClient {
    rpc: RpcClient,
    http: Client,
    rpc_url: String,
    limiter: Arc<Semaphore>,
    skip_preflight: bool,
}

impl HttpChainClient {
    pub fn new(rpc_url: &str, max_concurrency: usize, skip_preflight: bool) -> Result<Self> {
        let rpc = RpcClient::new_with_commitment(rpc_url.to_string(), CommitmentConfig::confirmed());
        let http = create_http_client()?;

        Ok(Self {
            rpc,
            http,
            rpc_url: rpc_url.to_string(),
            limiter: Arc::new(Semaphore::new(max_concurrency)),
            skip_preflight,
        })
    }

    /// The limiter is never closed; a failed acquire is unreachable.
    async fn permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.limiter.acquire().await.expect("RPC limiter closed")
    }

    /// Raw JSON-RPC 2.0 call for the methods where the typed client is not
    /// a good fit (parsed-JSON transaction fetch, base64 submission).
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value> {
        let _permit = self.permit().await;

        let request_body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| AppError::Rpc(format!("transport: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Rpc(format!("HTTP {}", status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Parse(format!("JSON body: {}", e)))?;

        if let Some(error) = body.get("error") {
            return Err(AppError::Rpc(format!("{}", error)));
        }

        Ok(body["result"].clone())
    }
}

#[async_trait]
impl ChainRpc for HttpChainClient {
    async fn get_sol_balance(&self, owner: &Pubkey) -> Result<u64> {
        let _permit = self.permit().await;
        self.rpc
            .get_balance(owner)
            .await
            .map_err(|e| AppError::Rpc(format!("getBalance: {}", e)))
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<u64>> {
        let ata = spl_associated_token_account::get_associated_token_address(owner, mint);

        let _permit = self.permit().await;
        match self.rpc.get_token_account_balance(&ata).await {
            Ok(balance) => {
                let amount = balance
                    .amount
                    .parse::<u64>()
                    .map_err(|e| AppError::Parse(format!("token amount: {}", e)))?;
                Ok(Some(amount))
            }
            // A missing account is the common case for wallets that never
            // held the mint.
            Err(e) => {
                debug!("token account lookup for {} failed: {}", ata, e);
                Ok(None)
            }
        }
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        let _permit = self.permit().await;
        self.rpc
            .get_latest_blockhash()
            .await
            .map_err(|e| AppError::Rpc(format!("getLatestBlockhash: {}", e)))
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<String> {
        let bytes = bincode::serialize(tx)
            .map_err(|e| AppError::Submit(format!("serialize: {}", e)))?;
        let encoded = STANDARD.encode(bytes);

        let params = json!([
            encoded,
            {
                "encoding": "base64",
                "skipPreflight": self.skip_preflight,
                "preflightCommitment": "confirmed",
                "maxRetries": 0
            }
        ]);

        let result = self
            .rpc_call("sendTransaction", params)
            .await
            .map_err(|e| AppError::Submit(e.to_string()))?;

        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::Submit("sendTransaction result is not a string".into()))
    }

    async fn confirm_signature(&self, signature: &str, timeout: Duration) -> Result<bool> {
        let sig = Signature::from_str(signature)
            .map_err(|e| AppError::Parse(format!("signature: {}", e)))?;
        let deadline = Instant::now() + timeout;

        loop {
            let statuses = {
                let _permit = self.permit().await;
                self.rpc
                    .get_signature_statuses(&[sig])
                    .await
                    .map_err(|e| AppError::Rpc(format!("getSignatureStatuses: {}", e)))?
            };

            if let Some(Some(status)) = statuses.value.first() {
                if let Some(err) = &status.err {
                    return Err(AppError::Submit(format!("transaction failed: {:?}", err)));
                }
                if status.satisfies_commitment(CommitmentConfig::confirmed()) {
                    return Ok(true);
                }
            }

            if Instant::now() >= deadline {
                warn!("confirmation budget exhausted for {}", signature);
                return Ok(false);
            }

            tokio::time::sleep(STATUS_POLL_INTERVAL).await;
        }
    }

    async fn get_transaction_json(&self, signature: &str) -> Result<Value> {
        let params = json!([
            signature,
            {
                "encoding": "jsonParsed",
                "commitment": "confirmed",
                "maxSupportedTransactionVersion": 0
            }
        ]);

        self.rpc_call("getTransaction", params).await
    }
}

fn create_http_client() -> Result<Client> {
    let client = Client::builder()
        .tcp_nodelay(true)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(10)
        .connect_timeout(CONNECTION_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()?;

    Ok(client)
}
