use anyhow::Context as _;
use tracing::info;
use tracing_subscriber::EnvFilter;

use swarm_trader::config::Config;
use swarm_trader::context::AppContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(
        "starting swarm-trader: {} wallets, rpc {}",
        config.wallet_keys.len(),
        config.rpc_url
    );

    let ctx = AppContext::build(config).context("building context")?;
    AppContext::set_default(ctx.clone());

    ctx.refresh_balances().await.context("initial balance refresh")?;
    ctx.start();

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutdown requested");
    ctx.destroy();

    Ok(())
}
