use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use tracing::info;

use crate::analytics::TradeHistory;
use crate::builder::{
    meteora::MeteoraBuilder, pumpfun::PumpFunBuilder, raydium::RaydiumBuilder, BuilderRegistry,
    VenueTag,
};
use crate::bundle::JitoBundleClient;
use crate::config::Config;
use crate::coordinator::{Coordinator, ExecSettings};
use crate::error::Result;
use crate::events::EventBus;
use crate::mirror::MirrorEngine;
use crate::presets::PresetStore;
use crate::price::VenuePriceClient;
use crate::rpc::{ChainRpc, HttpChainClient};
use crate::treasury::Treasury;
use crate::triggers::{DcaScheduler, TriggerScheduler};
use crate::wallet::WalletPool;

static DEFAULT_CONTEXT: OnceCell<Arc<AppContext>> = OnceCell::new();

/// Explicit wiring of every subsystem. Everything is reachable from here;
/// the module-level default below exists only for the CLI collaborator.
pub struct AppContext {
    pub config: Config,
    pub chain: Arc<dyn ChainRpc>,
    pub pool: Arc<WalletPool>,
    pub coordinator: Arc<Coordinator>,
    pub mirror: Arc<MirrorEngine>,
    pub triggers: Arc<TriggerScheduler>,
    pub dca: Arc<DcaScheduler>,
    pub presets: Arc<PresetStore>,
    pub treasury: Arc<Treasury>,
    pub history: Arc<TradeHistory>,
    pub events: EventBus,
}

impl AppContext {
    /// Wire everything up. Must run inside a tokio runtime (background
    /// tasks are spawned during construction).
    pub fn build(config: Config) -> Result<Arc<Self>> {
        let chain: Arc<dyn ChainRpc> = Arc::new(HttpChainClient::new(
            &config.rpc_url,
            config.max_rpc_concurrency,
            config.skip_preflight,
        )?);

        let pool = Arc::new(WalletPool::new(
            &config.wallet_keys,
            Arc::clone(&chain),
            config.max_rpc_concurrency,
        )?);

        let price = Arc::new(VenuePriceClient::new(
            &config.venue_api_url,
            config.venue_auth_token.clone(),
        )?);

        let builders = Arc::new(
            BuilderRegistry::new(VenueTag::PumpFun)
                .register(VenueTag::PumpFun, Arc::new(PumpFunBuilder::new(price.clone())))
                .register(VenueTag::Raydium, Arc::new(RaydiumBuilder))
                .register(VenueTag::Meteora, Arc::new(MeteoraBuilder)),
        );

        let bundle = Arc::new(JitoBundleClient::new(&config.bundle_url)?);
        let events = EventBus::new();
        let history = Arc::new(TradeHistory::new());

        let coordinator = Arc::new(Coordinator::new(
            Arc::clone(&pool),
            builders,
            bundle,
            Arc::clone(&chain),
            events.clone(),
            Arc::clone(&history),
            ExecSettings::from_config(&config),
        ));

        let mirror = MirrorEngine::new(
            Arc::clone(&coordinator),
            Arc::clone(&chain),
            events.clone(),
            config.ws_url.clone(),
        );

        let triggers = TriggerScheduler::new(
            Arc::clone(&coordinator),
            price,
            events.clone(),
            Duration::from_secs(config.price_poll_secs),
            config.slippage_bps,
            config.stop_loss_slippage_bps,
        );

        let dca = DcaScheduler::new(Arc::clone(&coordinator), events.clone());
        let treasury = Arc::new(Treasury::new(Arc::clone(&pool), Arc::clone(&chain)));

        Ok(Arc::new(Self {
            config,
            chain,
            pool,
            coordinator,
            mirror,
            triggers,
            dca,
            presets: Arc::new(PresetStore::new()),
            treasury,
            history,
            events,
        }))
    }

    /// Start the background producers that need an explicit kick.
    pub fn start(&self) {
        self.triggers.start();
        info!("swarm context started");
    }

    /// Stop every subsystem: unsubscribe mirrors, stop the price monitor
    /// and DCA timers.
    pub fn destroy(&self) {
        self.mirror.destroy();
        self.triggers.destroy();
        self.dca.destroy();
        self.history.log_stats();
        info!("swarm context destroyed");
    }

    /// Install this context as the process-wide default. Only the first
    /// call wins.
    pub fn set_default(ctx: Arc<Self>) {
        let _ = DEFAULT_CONTEXT.set(ctx);
    }

    pub fn default_context() -> Option<Arc<Self>> {
        DEFAULT_CONTEXT.get().cloned()
    }
}
