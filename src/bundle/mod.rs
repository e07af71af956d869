pub mod client;

pub use client::{tip_transaction, BundleSubmitter, JitoBundleClient};
