use std::env;

use crate::error::{AppError, Result};

const DEFAULT_RPC_URL: &str = "https://api.mainnet-beta.solana.com";
const DEFAULT_WS_URL: &str = "wss://api.mainnet-beta.solana.com";
const DEFAULT_VENUE_API_URL: &str = "https://frontend-api.pump.fun";
const DEFAULT_BUNDLE_URL: &str = "https://mainnet.block-engine.jito.wtf/api/v1/bundles";

/// Upper bound on the wallet pool size, including the primary wallet.
pub const MAX_WALLETS: usize = 20;

#[derive(Debug, Clone)]
pub struct Config {
    // General
    pub log_level: String,

    // Keys. `wallet_keys[0]` is the primary wallet.
    pub wallet_keys: Vec<String>,

    // Chain access
    pub rpc_url: String,
    pub ws_url: String,
    /// Snapshot of SWARM_SKIP_PREFLIGHT taken at load time.
    pub skip_preflight: bool,
    pub max_rpc_concurrency: usize,

    // Venue
    pub venue_api_url: String,
    pub venue_auth_token: Option<String>,

    // Bundle service
    pub bundle_url: String,
    pub bundles_enabled: bool,
    pub tip_lamports: u64,
    pub bundle_size_limit: usize,

    // Execution tunables
    pub slippage_bps: u16,
    pub stop_loss_slippage_bps: u16,
    pub priority_fee_micro_lamports: u64,
    pub amount_variance_pct: f64,
    pub min_reserve_sol: f64,
    pub stagger_delay_ms: u64,
    pub rate_limit_ms: u64,
    pub confirm_timeout_ms: u64,
    pub position_refresh_delay_secs: u64,

    // Triggers
    pub price_poll_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let primary = env::var("SWARM_PRIMARY_KEY")
            .map_err(|_| AppError::Config("SWARM_PRIMARY_KEY must be set".into()))?;

        // Numbered mirror-wallet key series: SWARM_WALLET_KEY_1..N. Gaps end
        // the series.
        let mut wallet_keys = vec![primary];
        for i in 1..MAX_WALLETS {
            match env::var(format!("SWARM_WALLET_KEY_{}", i)) {
                Ok(val) if !val.trim().is_empty() => wallet_keys.push(val.trim().to_string()),
                _ => break,
            }
        }

        let rpc_url = env::var("SWARM_RPC_URL").unwrap_or_else(|_| DEFAULT_RPC_URL.to_string());
        let ws_url = env::var("SWARM_WS_URL").unwrap_or_else(|_| derive_ws_url(&rpc_url));

        let venue_api_url =
            env::var("SWARM_VENUE_API_URL").unwrap_or_else(|_| DEFAULT_VENUE_API_URL.to_string());
        let venue_auth_token = env::var("SWARM_VENUE_AUTH_TOKEN").ok().filter(|t| !t.is_empty());

        let bundle_url =
            env::var("SWARM_BUNDLE_URL").unwrap_or_else(|_| DEFAULT_BUNDLE_URL.to_string());

        Ok(Self {
            log_level: env::var("SWARM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            wallet_keys,
            rpc_url,
            ws_url,
            skip_preflight: env_parse("SWARM_SKIP_PREFLIGHT", true),
            max_rpc_concurrency: env_parse("SWARM_MAX_RPC_CONCURRENCY", 10),
            venue_api_url,
            venue_auth_token,
            bundle_url,
            bundles_enabled: env_parse("SWARM_BUNDLES_ENABLED", true),
            tip_lamports: env_parse("SWARM_TIP_LAMPORTS", 10_000),
            bundle_size_limit: env_parse("SWARM_BUNDLE_SIZE_LIMIT", 5),
            slippage_bps: env_parse("SWARM_SLIPPAGE_BPS", 100),
            stop_loss_slippage_bps: env_parse("SWARM_STOP_LOSS_SLIPPAGE_BPS", 1_000),
            priority_fee_micro_lamports: env_parse("SWARM_PRIORITY_FEE", 1_000),
            amount_variance_pct: env_parse("SWARM_AMOUNT_VARIANCE_PCT", 0.0),
            min_reserve_sol: env_parse("SWARM_MIN_RESERVE_SOL", 0.01),
            stagger_delay_ms: env_parse("SWARM_STAGGER_DELAY_MS", 500),
            rate_limit_ms: env_parse("SWARM_RATE_LIMIT_MS", 1_000),
            confirm_timeout_ms: env_parse("SWARM_CONFIRM_TIMEOUT_MS", 30_000),
            position_refresh_delay_secs: env_parse("SWARM_POSITION_REFRESH_DELAY_SECS", 8),
            price_poll_secs: env_parse("SWARM_PRICE_POLL_SECS", 5),
        })
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn derive_ws_url(rpc_url: &str) -> String {
    if let Some(rest) = rpc_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = rpc_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        DEFAULT_WS_URL.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::derive_ws_url;

    #[test]
    fn test_derive_ws_url() {
        assert_eq!(
            derive_ws_url("https://api.mainnet-beta.solana.com"),
            "wss://api.mainnet-beta.solana.com"
        );
        assert_eq!(derive_ws_url("http://localhost:8899"), "ws://localhost:8899");
    }
}
