pub mod history;

pub use history::{TradeHistory, TradeRecord};
