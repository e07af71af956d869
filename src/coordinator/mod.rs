pub mod engine;
pub mod modes;
pub mod types;

pub use engine::{Coordinator, ExecSettings};
pub use types::{
    AmountSpec, ExecutionMode, QuoteBundle, SimulationReport, TradeAction, TradeIntent,
    TradeResult, WalletResult,
};
