pub mod dca;
pub mod price;

pub use dca::{DcaRecord, DcaScheduler};
pub use price::{TriggerKind, TriggerRecord, TriggerScheduler};
