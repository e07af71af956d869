//! Programmatic surface mirroring the CLI verbs. Everything here is a
//! thin delegation; the CLI collaborator talks to this and nothing else.

use crate::context::AppContext;
use crate::coordinator::types::{
    QuoteBundle, SimulationReport, TradeIntent, TradeResult, WalletResult,
};
use crate::error::Result;
use crate::mirror::{MirrorConfig, MirrorStats, MirrorTarget};
use crate::presets::Preset;
use crate::triggers::{DcaRecord, TriggerKind, TriggerRecord};
use crate::wallet::{SwarmPosition, WalletSnapshot};

impl AppContext {
    // wallets

    pub fn wallet_list(&self) -> Vec<WalletSnapshot> {
        self.pool.list()
    }

    pub fn wallet_enable(&self, id: &str) -> Result<()> {
        self.pool.set_enabled(id, true)
    }

    pub fn wallet_disable(&self, id: &str) -> Result<()> {
        self.pool.set_enabled(id, false)
    }

    pub async fn refresh_balances(&self) -> Result<()> {
        self.pool.refresh_balances().await
    }

    pub async fn refresh_positions(&self, mint: &str) -> Result<SwarmPosition> {
        self.pool.refresh_positions(mint).await
    }

    // treasury

    pub async fn distribute_sol(
        &self,
        sol_each: f64,
        wallets: Option<Vec<String>>,
    ) -> Result<Vec<WalletResult>> {
        self.treasury.distribute_sol(sol_each, wallets).await
    }

    pub async fn consolidate_sol(&self, reserve_sol: f64) -> Result<Vec<WalletResult>> {
        self.treasury.consolidate_sol(reserve_sol).await
    }

    pub async fn consolidate_tokens(&self, mint: &str) -> Result<Vec<WalletResult>> {
        self.treasury.consolidate_tokens(mint).await
    }

    // trading

    pub async fn buy(&self, intent: TradeIntent) -> Result<TradeResult> {
        self.coordinator.coordinated_buy(intent).await
    }

    pub async fn sell(&self, intent: TradeIntent) -> Result<TradeResult> {
        self.coordinator.coordinated_sell(intent).await
    }

    pub async fn quote(&self, intent: TradeIntent) -> Result<QuoteBundle> {
        self.coordinator.coordinated_quote(intent).await
    }

    pub fn simulate(&self, intent: &TradeIntent) -> Result<SimulationReport> {
        self.coordinator.simulate(intent)
    }

    // triggers

    pub fn stop_loss(
        &self,
        mint: &str,
        trigger_price: f64,
        sell_percent: f64,
        wallets: Option<Vec<String>>,
    ) -> Result<String> {
        self.triggers
            .add(TriggerKind::StopLoss, mint, trigger_price, sell_percent, wallets, None)
    }

    pub fn take_profit(
        &self,
        mint: &str,
        trigger_price: f64,
        sell_percent: f64,
        wallets: Option<Vec<String>>,
    ) -> Result<String> {
        self.triggers
            .add(TriggerKind::TakeProfit, mint, trigger_price, sell_percent, wallets, None)
    }

    pub fn list_triggers(&self) -> Vec<TriggerRecord> {
        self.triggers.list()
    }

    pub fn remove_trigger(&self, id: &str) -> Result<()> {
        self.triggers.remove(id)
    }

    // DCA

    pub fn dca_create(
        &self,
        mint: &str,
        sol_per_interval: f64,
        interval_ms: u64,
        total_intervals: u32,
    ) -> Result<String> {
        self.dca
            .schedule(mint, sol_per_interval, interval_ms, total_intervals, None, None)
    }

    pub fn dca_list(&self) -> Vec<DcaRecord> {
        self.dca.list()
    }

    pub fn dca_cancel(&self, id: &str) -> Result<()> {
        self.dca.cancel(id)
    }

    pub fn dca_pause(&self, id: &str) -> Result<()> {
        self.dca.pause(id)
    }

    pub fn dca_resume(&self, id: &str) -> Result<()> {
        self.dca.resume(id)
    }

    // mirroring

    pub fn mirror_add(&self, address: &str, name: &str, config: MirrorConfig) -> Result<()> {
        self.mirror.add_target(address, name, config)
    }

    pub fn mirror_remove(&self, address: &str) -> Result<()> {
        self.mirror.remove_target(address)
    }

    pub fn mirror_list(&self) -> Vec<MirrorTarget> {
        self.mirror.list()
    }

    pub fn mirror_config(&self, address: &str, config: MirrorConfig) -> Result<()> {
        self.mirror.update_config(address, config)
    }

    pub fn mirror_stats(&self, address: &str) -> Option<MirrorStats> {
        self.mirror.stats(address)
    }

    pub fn mirror_enable(&self, address: &str) -> Result<()> {
        self.mirror.set_enabled(address, true)
    }

    pub fn mirror_disable(&self, address: &str) -> Result<()> {
        self.mirror.set_enabled(address, false)
    }

    // presets

    pub fn preset_save(&self, user_id: &str, preset: Preset) -> Result<()> {
        self.presets.save(user_id, preset)
    }

    pub fn preset_list(&self, user_id: &str) -> Vec<Preset> {
        self.presets.list(user_id)
    }

    pub fn preset_show(&self, user_id: &str, name: &str) -> Option<Preset> {
        self.presets.get(user_id, name)
    }

    pub fn preset_delete(&self, user_id: &str, name: &str) -> Result<()> {
        self.presets.delete(user_id, name)
    }
}
