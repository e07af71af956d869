pub mod cache;
pub mod decoder;
pub mod engine;
pub mod types;

pub use engine::MirrorEngine;
pub use types::{DetectedTrade, MirrorConfig, MirrorStats, MirrorTarget, SkipReason};
