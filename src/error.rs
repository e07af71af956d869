use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Parsing error: {0}")]
    Parse(String),

    #[error("Solana SDK error: {0}")]
    Solana(#[from] solana_sdk::pubkey::ParsePubkeyError),

    #[error("wallet {wallet}: insufficient funds (need {needed} SOL, have {available} SOL)")]
    InsufficientFunds {
        wallet: String,
        needed: f64,
        available: f64,
    },

    #[error("Build error: {0}")]
    Build(String),

    #[error("Submit error: {0}")]
    Submit(String),

    #[error("Bundle error: {0}")]
    Bundle(String),

    #[error("confirmation timed out for {signature}")]
    ConfirmTimeout { signature: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
