pub mod client;

pub use client::{ChainRpc, HttpChainClient};
