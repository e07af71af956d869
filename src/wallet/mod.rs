pub mod keys;
pub mod pool;

pub use pool::{SwarmPosition, WalletPool, WalletSnapshot};
