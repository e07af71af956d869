#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use solana_sdk::hash::Hash;
use solana_sdk::message::{v0::Message as V0Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::VersionedTransaction;

use swarm_trader::analytics::TradeHistory;
use swarm_trader::builder::{
    BuildRequest, BuilderRegistry, BuiltTransaction, Quote, VenueBuilder, VenueTag,
};
use swarm_trader::bundle::BundleSubmitter;
use swarm_trader::coordinator::types::TradeAction;
use swarm_trader::coordinator::{Coordinator, ExecSettings};
use swarm_trader::error::{AppError, Result};
use swarm_trader::events::EventBus;
use swarm_trader::price::PriceSource;
use swarm_trader::rpc::ChainRpc;
use swarm_trader::utils::sol_to_lamports;
use swarm_trader::wallet::WalletPool;

/// In-memory chain: fixed balances, recorded submissions, scripted
/// confirmation behaviour.
pub struct MockChain {
    pub sol_balances: Mutex<HashMap<Pubkey, u64>>,
    pub token_balances: Mutex<HashMap<(Pubkey, Pubkey), u64>>,
    pub transactions: Mutex<HashMap<String, Value>>,
    /// Payer of every transaction accepted, in submission order.
    pub sent: Mutex<Vec<Pubkey>>,
    pub confirm_result: bool,
    send_counter: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sol_balances: Mutex::new(HashMap::new()),
            token_balances: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            confirm_result: true,
            send_counter: AtomicUsize::new(0),
        })
    }

    pub fn unconfirmable() -> Arc<Self> {
        Arc::new(Self {
            sol_balances: Mutex::new(HashMap::new()),
            token_balances: Mutex::new(HashMap::new()),
            transactions: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            confirm_result: false,
            send_counter: AtomicUsize::new(0),
        })
    }

    pub fn set_sol(&self, owner: Pubkey, sol: f64) {
        self.sol_balances.lock().insert(owner, sol_to_lamports(sol));
    }

    pub fn set_tokens(&self, owner: Pubkey, mint: Pubkey, amount: u64) {
        self.token_balances.lock().insert((owner, mint), amount);
    }

    pub fn set_transaction(&self, signature: &str, tx: Value) {
        self.transactions.lock().insert(signature.to_string(), tx);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl ChainRpc for MockChain {
    async fn get_sol_balance(&self, owner: &Pubkey) -> Result<u64> {
        Ok(self.sol_balances.lock().get(owner).copied().unwrap_or(0))
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> Result<Option<u64>> {
        Ok(self.token_balances.lock().get(&(*owner, *mint)).copied())
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::default())
    }

    async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<String> {
        let payer = tx.message.static_account_keys()[0];
        self.sent.lock().push(payer);
        let n = self.send_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("sig_{}", n))
    }

    async fn confirm_signature(&self, _signature: &str, _timeout: Duration) -> Result<bool> {
        Ok(self.confirm_result)
    }

    async fn get_transaction_json(&self, signature: &str) -> Result<Value> {
        Ok(self
            .transactions
            .lock()
            .get(signature)
            .cloned()
            .unwrap_or(Value::Null))
    }
}

/// Bundle service double: optionally rejects the first N submissions,
/// records the size of every accepted bundle.
pub struct MockBundle {
    pub accepted_sizes: Mutex<Vec<usize>>,
    fail_remaining: AtomicUsize,
    id_counter: AtomicUsize,
}

impl MockBundle {
    pub fn new() -> Arc<Self> {
        Self::failing_first(0)
    }

    pub fn failing_first(n: usize) -> Arc<Self> {
        Arc::new(Self {
            accepted_sizes: Mutex::new(Vec::new()),
            fail_remaining: AtomicUsize::new(n),
            id_counter: AtomicUsize::new(0),
        })
    }

    pub fn accepted(&self) -> usize {
        self.accepted_sizes.lock().len()
    }
}

#[async_trait]
impl BundleSubmitter for MockBundle {
    async fn submit_bundle(&self, txs: &[VersionedTransaction]) -> Result<String> {
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(AppError::Bundle("bundle service rejected the request".into()));
        }

        self.accepted_sizes.lock().push(txs.len());
        let n = self.id_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("bundle_{}", n))
    }
}

/// Builder double: produces a minimal self-transfer message for the
/// wallet, so signing and submission work end to end.
pub struct MockBuilder;

impl MockBuilder {
    fn build(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        let transfer = system_instruction::transfer(&req.wallet, &req.wallet, 0);
        let message = V0Message::try_compile(&req.wallet, &[transfer], &[], req.recent_blockhash)
            .map_err(|e| AppError::Build(e.to_string()))?;

        Ok(BuiltTransaction { message: VersionedMessage::V0(message), quote: None })
    }
}

#[async_trait]
impl VenueBuilder for MockBuilder {
    async fn build_buy(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        self.build(req)
    }

    async fn build_sell(&self, req: &BuildRequest) -> Result<BuiltTransaction> {
        self.build(req)
    }

    async fn quote(&self, req: &BuildRequest, action: TradeAction) -> Result<Quote> {
        let input = match action {
            TradeAction::Buy => req.sol_lamports,
            TradeAction::Sell => req.token_amount,
        };
        Ok(Quote { input_amount: input, output_amount: input * 2, price_impact_pct: Some(0.1) })
    }
}

/// Price feed double replaying a fixed tick sequence, then holding the
/// last value.
pub struct ScriptedPrice {
    ticks: Vec<Option<f64>>,
    cursor: AtomicUsize,
}

impl ScriptedPrice {
    pub fn new(ticks: Vec<Option<f64>>) -> Arc<Self> {
        Arc::new(Self { ticks, cursor: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl PriceSource for ScriptedPrice {
    async fn price_of(&self, _mint: &str) -> Result<Option<f64>> {
        let i = self.cursor.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .ticks
            .get(i)
            .copied()
            .unwrap_or_else(|| self.ticks.last().copied().flatten()))
    }
}

pub struct Harness {
    pub coordinator: Arc<Coordinator>,
    pub pool: Arc<WalletPool>,
    pub chain: Arc<MockChain>,
    pub bundle: Arc<MockBundle>,
    pub events: EventBus,
    pub history: Arc<TradeHistory>,
    pub wallets: Vec<Pubkey>,
}

pub fn test_settings() -> ExecSettings {
    ExecSettings {
        slippage_bps: 100,
        priority_fee_micro_lamports: 1_000,
        amount_variance_pct: 0.0,
        min_reserve_sol: 0.01,
        bundle_size_limit: 5,
        bundles_enabled: true,
        tip_lamports: 10_000,
        stagger_delay_ms: 1,
        rate_limit_ms: 0,
        confirm_timeout_ms: 200,
        position_refresh_delay_secs: 0,
    }
}

pub fn harness_with(
    balances_sol: &[f64],
    chain: Arc<MockChain>,
    bundle: Arc<MockBundle>,
    settings: ExecSettings,
) -> Harness {
    let keypairs: Vec<Keypair> = balances_sol.iter().map(|_| Keypair::new()).collect();
    let addresses: Vec<Pubkey> = keypairs.iter().map(|k| k.pubkey()).collect();

    for (address, sol) in addresses.iter().zip(balances_sol) {
        chain.set_sol(*address, *sol);
    }

    let chain_dyn: Arc<dyn ChainRpc> = chain.clone();
    let pool = Arc::new(WalletPool::from_keypairs(keypairs, Arc::clone(&chain_dyn), 8));

    let builders = Arc::new(
        BuilderRegistry::new(VenueTag::PumpFun)
            .register(VenueTag::PumpFun, Arc::new(MockBuilder)),
    );

    let events = EventBus::new();
    let history = Arc::new(TradeHistory::new());

    let coordinator = Arc::new(Coordinator::new(
        Arc::clone(&pool),
        builders,
        bundle.clone(),
        chain_dyn,
        events.clone(),
        Arc::clone(&history),
        settings,
    ));

    Harness { coordinator, pool, chain, bundle, events, history, wallets: addresses }
}

pub fn harness(balances_sol: &[f64]) -> Harness {
    harness_with(balances_sol, MockChain::new(), MockBundle::new(), test_settings())
}

pub fn test_mint() -> Pubkey {
    Pubkey::new_unique()
}
