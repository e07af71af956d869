use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::RwLock;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::rpc::ChainRpc;
use crate::utils::{lamports_to_sol, time::now_ts};
use crate::wallet::keys::parse_secret_key;

/// One trading identity. Fields are mutated only by the pool.
struct Wallet {
    id: String,
    keypair: Arc<Keypair>,
    address: Pubkey,
    sol_balance: f64,
    /// mint → raw token amount, refreshed on demand.
    positions: HashMap<String, u64>,
    last_trade_ms: u64,
    enabled: bool,
}

/// Read-only view of a wallet handed out to the execution paths. The
/// keypair travels with the snapshot so dispatch never needs the pool lock
/// while signing.
#[derive(Clone)]
pub struct WalletSnapshot {
    pub id: String,
    pub keypair: Arc<Keypair>,
    pub address: Pubkey,
    pub sol_balance: f64,
    pub positions: HashMap<String, u64>,
    pub last_trade_ms: u64,
    pub enabled: bool,
}

impl WalletSnapshot {
    pub fn position_of(&self, mint: &str) -> u64 {
        self.positions.get(mint).copied().unwrap_or(0)
    }
}

/// Aggregated holdings of one mint across the pool.
#[derive(Debug, Clone)]
pub struct SwarmPosition {
    pub mint: String,
    pub total: u64,
    pub by_wallet: HashMap<String, u64>,
    pub last_updated: u64,
}

pub struct WalletPool {
    wallets: RwLock<Vec<Wallet>>,
    chain: Arc<dyn ChainRpc>,
    fanout: Arc<Semaphore>,
}

impl WalletPool {
    /// Build the pool from configured key strings. The first key is the
    /// primary wallet (`wallet_0`).
    pub fn new(keys: &[String], chain: Arc<dyn ChainRpc>, max_fanout: usize) -> Result<Self> {
        if keys.is_empty() {
            return Err(AppError::Config("at least one wallet key is required".into()));
        }

        let keypairs = keys
            .iter()
            .map(|k| parse_secret_key(k))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self::from_keypairs(keypairs, chain, max_fanout))
    }

    /// Build the pool from already-parsed keypairs (embedding and tests).
    pub fn from_keypairs(
        keypairs: Vec<Keypair>,
        chain: Arc<dyn ChainRpc>,
        max_fanout: usize,
    ) -> Self {
        let wallets = keypairs
            .into_iter()
            .enumerate()
            .map(|(i, keypair)| {
                let address = keypair.pubkey();
                Wallet {
                    id: format!("wallet_{}", i),
                    keypair: Arc::new(keypair),
                    address,
                    sol_balance: 0.0,
                    positions: HashMap::new(),
                    last_trade_ms: 0,
                    enabled: true,
                }
            })
            .collect::<Vec<_>>();

        info!("wallet pool initialised with {} wallets", wallets.len());

        Self {
            wallets: RwLock::new(wallets),
            chain,
            fanout: Arc::new(Semaphore::new(max_fanout.max(1))),
        }
    }

    pub fn list(&self) -> Vec<WalletSnapshot> {
        self.wallets.read().iter().map(snapshot).collect()
    }

    pub fn enabled(&self) -> Vec<WalletSnapshot> {
        self.wallets
            .read()
            .iter()
            .filter(|w| w.enabled)
            .map(snapshot)
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<WalletSnapshot> {
        self.wallets.read().iter().find(|w| w.id == id).map(snapshot)
    }

    /// The primary wallet, used for tips and treasury operations.
    pub fn primary(&self) -> WalletSnapshot {
        snapshot(&self.wallets.read()[0])
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        let mut wallets = self.wallets.write();
        let wallet = wallets
            .iter_mut()
            .find(|w| w.id == id)
            .ok_or_else(|| AppError::Config(format!("unknown wallet {}", id)))?;
        wallet.enabled = enabled;
        info!("wallet {} {}", id, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Stamp a wallet's last-trade time; called by dispatch after a
    /// submission attempt.
    pub fn record_trade(&self, id: &str) {
        if let Some(wallet) = self.wallets.write().iter_mut().find(|w| w.id == id) {
            wallet.last_trade_ms = now_ts();
        }
    }

    /// Refresh every wallet's SOL balance concurrently. A failed fetch
    /// keeps the previous cached value.
    pub async fn refresh_balances(&self) -> Result<()> {
        let targets: Vec<(String, Pubkey)> = self
            .wallets
            .read()
            .iter()
            .map(|w| (w.id.clone(), w.address))
            .collect();

        let fetches = targets.into_iter().map(|(id, address)| {
            let chain = Arc::clone(&self.chain);
            let fanout = Arc::clone(&self.fanout);
            async move {
                let _permit = fanout.acquire().await.expect("fanout limiter closed");
                (id, chain.get_sol_balance(&address).await)
            }
        });

        for (id, fetched) in join_all(fetches).await {
            match fetched {
                Ok(lamports) => {
                    let mut wallets = self.wallets.write();
                    if let Some(wallet) = wallets.iter_mut().find(|w| w.id == id) {
                        wallet.sol_balance = lamports_to_sol(lamports);
                        debug!("balance {} = {:.6} SOL", id, wallet.sol_balance);
                    }
                }
                Err(e) => warn!("balance refresh failed for {}: {}", id, e),
            }
        }

        Ok(())
    }

    /// Refresh every wallet's holding of one mint concurrently and return
    /// the aggregated view. An absent token account clears the cache entry.
    pub async fn refresh_positions(&self, mint: &str) -> Result<SwarmPosition> {
        let mint_key: Pubkey = mint
            .parse()
            .map_err(|e| AppError::Parse(format!("mint {}: {}", mint, e)))?;

        let targets: Vec<(String, Pubkey)> = self
            .wallets
            .read()
            .iter()
            .map(|w| (w.id.clone(), w.address))
            .collect();

        let fetches = targets.into_iter().map(|(id, address)| {
            let chain = Arc::clone(&self.chain);
            let fanout = Arc::clone(&self.fanout);
            let mint_key = mint_key;
            async move {
                let _permit = fanout.acquire().await.expect("fanout limiter closed");
                (id, chain.get_token_balance(&address, &mint_key).await)
            }
        });

        let mut by_wallet = HashMap::new();
        let mut total: u64 = 0;

        for (id, fetched) in join_all(fetches).await {
            match fetched {
                Ok(amount) => {
                    let mut wallets = self.wallets.write();
                    if let Some(wallet) = wallets.iter_mut().find(|w| w.id == id) {
                        match amount {
                            Some(amount) if amount > 0 => {
                                wallet.positions.insert(mint.to_string(), amount);
                                by_wallet.insert(id.clone(), amount);
                                total += amount;
                            }
                            _ => {
                                wallet.positions.remove(mint);
                            }
                        }
                    }
                }
                Err(e) => warn!("position refresh failed for {}: {}", id, e),
            }
        }

        Ok(SwarmPosition {
            mint: mint.to_string(),
            total,
            by_wallet,
            last_updated: now_ts(),
        })
    }

    /// Current cached view of one mint without touching the chain.
    pub fn cached_position(&self, mint: &str) -> SwarmPosition {
        let mut by_wallet = HashMap::new();
        let mut total = 0;

        for wallet in self.wallets.read().iter() {
            if let Some(&amount) = wallet.positions.get(mint) {
                if amount > 0 {
                    by_wallet.insert(wallet.id.clone(), amount);
                    total += amount;
                }
            }
        }

        SwarmPosition {
            mint: mint.to_string(),
            total,
            by_wallet,
            last_updated: now_ts(),
        }
    }
}

fn snapshot(wallet: &Wallet) -> WalletSnapshot {
    WalletSnapshot {
        id: wallet.id.clone(),
        keypair: Arc::clone(&wallet.keypair),
        address: wallet.address,
        sol_balance: wallet.sol_balance,
        positions: wallet.positions.clone(),
        last_trade_ms: wallet.last_trade_ms,
        enabled: wallet.enabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use solana_sdk::hash::Hash;
    use solana_sdk::transaction::VersionedTransaction;
    use std::time::Duration;

    struct FixedChain {
        lamports: u64,
        tokens: Option<u64>,
    }

    #[async_trait]
    impl ChainRpc for FixedChain {
        async fn get_sol_balance(&self, _owner: &Pubkey) -> crate::error::Result<u64> {
            Ok(self.lamports)
        }

        async fn get_token_balance(
            &self,
            _owner: &Pubkey,
            _mint: &Pubkey,
        ) -> crate::error::Result<Option<u64>> {
            Ok(self.tokens)
        }

        async fn latest_blockhash(&self) -> crate::error::Result<Hash> {
            Ok(Hash::default())
        }

        async fn send_transaction(
            &self,
            _tx: &VersionedTransaction,
        ) -> crate::error::Result<String> {
            Ok("sig".into())
        }

        async fn confirm_signature(
            &self,
            _signature: &str,
            _timeout: Duration,
        ) -> crate::error::Result<bool> {
            Ok(true)
        }

        async fn get_transaction_json(&self, _signature: &str) -> crate::error::Result<Value> {
            Ok(Value::Null)
        }
    }

    fn pool_of(n: usize, chain: Arc<dyn ChainRpc>) -> WalletPool {
        let keypairs = (0..n).map(|_| Keypair::new()).collect();
        WalletPool::from_keypairs(keypairs, chain, 4)
    }

    #[tokio::test]
    async fn test_refresh_balances_updates_cache() {
        let chain = Arc::new(FixedChain { lamports: 1_500_000_000, tokens: None });
        let pool = pool_of(3, chain);

        pool.refresh_balances().await.unwrap();

        for wallet in pool.list() {
            assert!((wallet.sol_balance - 1.5).abs() < 1e-9);
        }
    }

    #[tokio::test]
    async fn test_refresh_positions_totals_match() {
        let chain = Arc::new(FixedChain { lamports: 0, tokens: Some(250) });
        let pool = pool_of(4, chain);

        let view = pool.refresh_positions(&Pubkey::new_unique().to_string()).await.unwrap();

        assert_eq!(view.total, 1_000);
        assert_eq!(view.by_wallet.len(), 4);
        assert_eq!(view.total, view.by_wallet.values().sum::<u64>());
    }

    #[tokio::test]
    async fn test_absent_account_clears_cache() {
        let mint = Pubkey::new_unique().to_string();
        let chain = Arc::new(FixedChain { lamports: 0, tokens: None });
        let pool = pool_of(2, chain);

        let view = pool.refresh_positions(&mint).await.unwrap();
        assert_eq!(view.total, 0);
        assert!(view.by_wallet.is_empty());
        assert_eq!(pool.cached_position(&mint).total, 0);
    }

    #[test]
    fn test_enable_disable_gate() {
        let chain = Arc::new(FixedChain { lamports: 0, tokens: None });
        let pool = pool_of(3, chain);

        pool.set_enabled("wallet_1", false).unwrap();
        let enabled: Vec<String> = pool.enabled().into_iter().map(|w| w.id).collect();
        assert_eq!(enabled, vec!["wallet_0", "wallet_2"]);

        assert!(pool.set_enabled("wallet_9", false).is_err());
    }
}
