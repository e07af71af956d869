use std::collections::HashMap;

use serde_json::Value;

use crate::builder::VenueTag;
use crate::coordinator::types::TradeAction;
use crate::error::{AppError, Result};
use crate::mirror::types::DetectedTrade;
use crate::price::TOKEN_UNITS;
use crate::utils::LAMPORTS_PER_SOL;

/// Below this SOL delta a balance change is fee noise, not a trade leg.
pub const EPSILON_SOL: f64 = 0.001;

const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Decode a confirmed `jsonParsed` transaction into the target's trade,
/// if it contains one. `Ok(None)` means "not a swap by this target".
pub fn decode_trade(
    target: &str,
    signature: &str,
    tx: &Value,
) -> Result<Option<DetectedTrade>> {
    if tx.is_null() {
        return Err(AppError::Decode(format!("{} not found or pending", signature)));
    }

    let meta = tx
        .get("meta")
        .ok_or_else(|| AppError::Decode("missing meta".into()))?;
    if !meta.get("err").map(Value::is_null).unwrap_or(true) {
        return Ok(None);
    }

    let account_keys = collect_account_keys(tx, meta)?;

    let sol_delta_lamports = target_sol_delta(target, meta, &account_keys);
    let token_deltas = target_token_deltas(target, meta);

    // The traded mint is the non-base mint with the largest quantity
    // change.
    let (mint, token_delta) = match token_deltas
        .into_iter()
        .filter(|(mint, delta)| mint != WSOL_MINT && *delta != 0)
        .max_by_key(|(_, delta)| delta.unsigned_abs())
    {
        Some(entry) => entry,
        None => return Ok(None),
    };

    let sol_delta = sol_delta_lamports as f64 / LAMPORTS_PER_SOL as f64;

    let action = if token_delta > 0 && sol_delta < -EPSILON_SOL {
        TradeAction::Buy
    } else if token_delta < 0 && sol_delta > EPSILON_SOL {
        TradeAction::Sell
    } else {
        return Ok(None);
    };

    Ok(Some(DetectedTrade {
        target: target.to_string(),
        signature: signature.to_string(),
        action,
        mint,
        sol_amount: sol_delta.abs(),
        token_amount: token_delta.unsigned_abs() as u64,
        venue: detect_venue(tx),
        block_time: tx.get("blockTime").and_then(Value::as_i64),
    }))
}

/// Static keys plus the loaded addresses of versioned transactions, in
/// index order.
fn collect_account_keys(tx: &Value, meta: &Value) -> Result<Vec<String>> {
    let message = tx
        .get("transaction")
        .and_then(|t| t.get("message"))
        .ok_or_else(|| AppError::Decode("missing message".into()))?;

    let mut keys = Vec::new();

    if let Some(arr) = message.get("accountKeys").and_then(Value::as_array) {
        for key in arr {
            // jsonParsed account keys are objects {pubkey, …}; raw keys
            // are plain strings.
            if let Some(s) = key.as_str() {
                keys.push(s.to_string());
            } else if let Some(pk) = key.get("pubkey").and_then(Value::as_str) {
                keys.push(pk.to_string());
            }
        }
    }

    if let Some(loaded) = meta.get("loadedAddresses") {
        for group in ["writable", "readonly"] {
            if let Some(arr) = loaded.get(group).and_then(Value::as_array) {
                keys.extend(arr.iter().filter_map(Value::as_str).map(String::from));
            }
        }
    }

    if keys.is_empty() {
        return Err(AppError::Decode("no account keys".into()));
    }
    Ok(keys)
}

fn target_sol_delta(target: &str, meta: &Value, account_keys: &[String]) -> i64 {
    let index = match account_keys.iter().position(|k| k == target) {
        Some(i) => i,
        None => return 0,
    };

    let pre = meta
        .get("preBalances")
        .and_then(Value::as_array)
        .and_then(|a| a.get(index))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let post = meta
        .get("postBalances")
        .and_then(Value::as_array)
        .and_then(|a| a.get(index))
        .and_then(Value::as_u64)
        .unwrap_or(0);

    post as i64 - pre as i64
}

/// mint → raw amount delta across the token accounts the target owns.
/// Keyed by owner rather than account index: the token account address is
/// the ATA, not the wallet.
fn target_token_deltas(target: &str, meta: &Value) -> HashMap<String, i128> {
    let mut deltas: HashMap<String, i128> = HashMap::new();

    for (key, sign) in [("preTokenBalances", -1i128), ("postTokenBalances", 1i128)] {
        if let Some(balances) = meta.get(key).and_then(Value::as_array) {
            for balance in balances {
                let owner = balance.get("owner").and_then(Value::as_str);
                if owner != Some(target) {
                    continue;
                }
                let mint = match balance.get("mint").and_then(Value::as_str) {
                    Some(m) => m,
                    None => continue,
                };
                let amount = balance
                    .get("uiTokenAmount")
                    .and_then(|a| a.get("amount"))
                    .and_then(Value::as_str)
                    .and_then(|s| s.parse::<i128>().ok())
                    .unwrap_or(0);

                *deltas.entry(mint.to_string()).or_default() += sign * amount;
            }
        }
    }

    deltas
}

fn detect_venue(tx: &Value) -> Option<VenueTag> {
    let instructions = tx
        .get("transaction")
        .and_then(|t| t.get("message"))
        .and_then(|m| m.get("instructions"))
        .and_then(Value::as_array)?;

    let program_ids: Vec<&str> = instructions
        .iter()
        .filter_map(|ix| ix.get("programId").and_then(Value::as_str))
        .collect();

    VenueTag::from_program_ids(program_ids)
}

/// Whole-token convenience view of a raw delta.
pub fn ui_token_amount(raw: u64) -> f64 {
    raw as f64 / TOKEN_UNITS
}
