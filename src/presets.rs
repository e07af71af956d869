use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::coordinator::types::ExecutionMode;
use crate::error::{AppError, Result};

/// Named execution profiles. Built-ins cover the common postures; user
/// presets are keyed by `(user_id, lowercased name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preset {
    pub name: String,
    pub mode: Option<ExecutionMode>,
    pub slippage_bps: u16,
    pub priority_fee_micro_lamports: u64,
    pub tip_lamports: u64,
    pub amount_variance_pct: f64,
    pub stagger_delay_ms: u64,
}

const RESERVED: [&str; 5] = ["fast", "atomic", "stealth", "aggressive", "safe"];

fn built_in(name: &str) -> Option<Preset> {
    let preset = match name {
        "fast" => Preset {
            name: "fast".into(),
            mode: Some(ExecutionMode::Parallel),
            slippage_bps: 300,
            priority_fee_micro_lamports: 10_000,
            tip_lamports: 0,
            amount_variance_pct: 0.0,
            stagger_delay_ms: 0,
        },
        "atomic" => Preset {
            name: "atomic".into(),
            mode: Some(ExecutionMode::Bundle),
            slippage_bps: 100,
            priority_fee_micro_lamports: 1_000,
            tip_lamports: 50_000,
            amount_variance_pct: 0.0,
            stagger_delay_ms: 0,
        },
        "stealth" => Preset {
            name: "stealth".into(),
            mode: Some(ExecutionMode::Sequential),
            slippage_bps: 200,
            priority_fee_micro_lamports: 1_000,
            tip_lamports: 0,
            amount_variance_pct: 15.0,
            stagger_delay_ms: 2_000,
        },
        "aggressive" => Preset {
            name: "aggressive".into(),
            mode: Some(ExecutionMode::MultiBundle),
            slippage_bps: 500,
            priority_fee_micro_lamports: 20_000,
            tip_lamports: 100_000,
            amount_variance_pct: 5.0,
            stagger_delay_ms: 0,
        },
        "safe" => Preset {
            name: "safe".into(),
            mode: Some(ExecutionMode::Parallel),
            slippage_bps: 50,
            priority_fee_micro_lamports: 1_000,
            tip_lamports: 0,
            amount_variance_pct: 0.0,
            stagger_delay_ms: 0,
        },
        _ => return None,
    };
    Some(preset)
}

pub struct PresetStore {
    store: DashMap<(String, String), Preset>,
}

impl PresetStore {
    pub fn new() -> Self {
        Self { store: DashMap::new() }
    }

    pub fn save(&self, user_id: &str, preset: Preset) -> Result<()> {
        let key = preset.name.to_lowercase();
        if RESERVED.contains(&key.as_str()) {
            return Err(AppError::Config(format!("preset {} is read-only", key)));
        }

        self.store.insert((user_id.to_string(), key), preset);
        Ok(())
    }

    pub fn get(&self, user_id: &str, name: &str) -> Option<Preset> {
        let key = name.to_lowercase();
        built_in(&key)
            .or_else(|| self.store.get(&(user_id.to_string(), key)).map(|p| p.clone()))
    }

    pub fn list(&self, user_id: &str) -> Vec<Preset> {
        let mut presets: Vec<Preset> =
            RESERVED.iter().filter_map(|name| built_in(name)).collect();

        presets.extend(
            self.store
                .iter()
                .filter(|entry| entry.key().0 == user_id)
                .map(|entry| entry.clone()),
        );
        presets
    }

    pub fn delete(&self, user_id: &str, name: &str) -> Result<()> {
        let key = name.to_lowercase();
        if RESERVED.contains(&key.as_str()) {
            return Err(AppError::Config(format!("preset {} is read-only", key)));
        }

        self.store
            .remove(&(user_id.to_string(), key.clone()))
            .map(|_| ())
            .ok_or_else(|| AppError::Config(format!("unknown preset {}", key)))
    }
}

impl Default for PresetStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn custom(name: &str) -> Preset {
        Preset {
            name: name.into(),
            mode: None,
            slippage_bps: 75,
            priority_fee_micro_lamports: 500,
            tip_lamports: 0,
            amount_variance_pct: 0.0,
            stagger_delay_ms: 100,
        }
    }

    #[test]
    fn test_built_ins_are_read_only() {
        let store = PresetStore::new();
        assert!(store.save("user1", custom("FAST")).is_err());
        assert!(store.delete("user1", "atomic").is_err());
    }

    #[test]
    fn test_save_and_lookup_is_case_insensitive() {
        let store = PresetStore::new();
        store.save("user1", custom("MyPreset")).unwrap();

        assert!(store.get("user1", "mypreset").is_some());
        assert!(store.get("user1", "MYPRESET").is_some());
        // other users do not see it
        assert!(store.get("user2", "mypreset").is_none());
    }

    #[test]
    fn test_list_includes_built_ins() {
        let store = PresetStore::new();
        store.save("user1", custom("extra")).unwrap();

        let names: Vec<String> =
            store.list("user1").into_iter().map(|p| p.name).collect();
        assert!(names.contains(&"fast".to_string()));
        assert!(names.contains(&"safe".to_string()));
        assert!(names.contains(&"extra".to_string()));
        assert_eq!(names.len(), 6);
    }

    #[test]
    fn test_delete_unknown_fails() {
        let store = PresetStore::new();
        assert!(store.delete("user1", "missing").is_err());
    }
}
