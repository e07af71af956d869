use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AppError, Result};

/// Raw token units per whole token on the bonding-curve venue.
pub const TOKEN_UNITS: f64 = 1_000_000.0;
const LAMPORTS_PER_SOL_F: f64 = 1_000_000_000.0;

/// Spot-price lookup. One implementation talks to the venue's public API;
/// tests substitute scripted feeds.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Price in SOL per whole token. `None` means no usable tick right
    /// now; callers treat that as "try again later", never as zero.
    async fn price_of(&self, mint: &str) -> Result<Option<f64>>;
}

#[derive(Debug, Deserialize)]
struct CoinReserves {
    #[serde(default)]
    virtual_sol_reserves: u64,
    #[serde(default)]
    virtual_token_reserves: u64,
}

pub struct VenuePriceClient {
    http: Client,
    base_url: String,
    auth_token: Option<String>,
}

impl VenuePriceClient {
    pub fn new(base_url: &str, auth_token: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
        })
    }
}

#[async_trait]
impl PriceSource for VenuePriceClient {
    async fn price_of(&self, mint: &str) -> Result<Option<f64>> {
        let url = format!("{}/coins/{}", self.base_url, mint);

        let mut request = self.http.get(&url);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(AppError::Http)?;
        if !response.status().is_success() {
            return Err(AppError::Rpc(format!(
                "price endpoint HTTP {} for {}",
                response.status(),
                mint
            )));
        }

        let reserves: CoinReserves = response.json().await.map_err(AppError::Http)?;
        Ok(implied_price(reserves.virtual_sol_reserves, reserves.virtual_token_reserves))
    }
}

/// SOL per whole token from the virtual reserves; zero or missing
/// reserves yield no tick.
pub fn implied_price(virtual_sol_reserves: u64, virtual_token_reserves: u64) -> Option<f64> {
    if virtual_sol_reserves == 0 || virtual_token_reserves == 0 {
        return None;
    }

    let sol = virtual_sol_reserves as f64 / LAMPORTS_PER_SOL_F;
    let tokens = virtual_token_reserves as f64 / TOKEN_UNITS;
    let price = sol / tokens;

    debug!("implied price {:.12} SOL/token", price);
    Some(price)
}
