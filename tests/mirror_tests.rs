mod common;

use std::sync::Arc;

use common::{harness, test_mint};
use serde_json::json;
use solana_sdk::pubkey::Pubkey;
use swarm_trader::events::Event;
use swarm_trader::mirror::{MirrorConfig, MirrorEngine};
use swarm_trader::rpc::ChainRpc;

fn target_buy_tx(target: &Pubkey, mint: &Pubkey, sol_spent: u64, tokens_gained: u64) -> serde_json::Value {
    json!({
        "blockTime": 1_700_000_000,
        "transaction": {
            "message": {
                "accountKeys": [
                    {"pubkey": target.to_string()},
                    {"pubkey": Pubkey::new_unique().to_string()}
                ],
                "instructions": []
            }
        },
        "meta": {
            "err": null,
            "preBalances": [5_000_000_000u64, 0],
            "postBalances": [5_000_000_000u64 - sol_spent, 0],
            "preTokenBalances": [
                {
                    "accountIndex": 2,
                    "mint": mint.to_string(),
                    "owner": target.to_string(),
                    "uiTokenAmount": {"amount": "0", "decimals": 6}
                }
            ],
            "postTokenBalances": [
                {
                    "accountIndex": 2,
                    "mint": mint.to_string(),
                    "owner": target.to_string(),
                    "uiTokenAmount": {"amount": tokens_gained.to_string(), "decimals": 6}
                }
            ]
        }
    })
}

fn engine_for(h: &common::Harness) -> Arc<MirrorEngine> {
    let chain: Arc<dyn ChainRpc> = h.chain.clone();
    MirrorEngine::new(
        Arc::clone(&h.coordinator),
        chain,
        h.events.clone(),
        "ws://127.0.0.1:1".to_string(),
    )
}

#[tokio::test]
async fn copied_buy_is_clamped_and_dispatched_once() {
    // Whale buys for 0.8 SOL; multiplier 0.5 with a 0.2 cap copies 0.2
    // per wallet across the whole pool.
    let h = harness(&[1.0, 1.0, 1.0]);
    let engine = engine_for(&h);
    let mut rx = h.events.subscribe();

    let target = Pubkey::new_unique();
    let mint = test_mint();
    h.chain
        .set_transaction("whale_sig", target_buy_tx(&target, &mint, 800_000_000, 5_000_000));

    let config = MirrorConfig {
        multiplier: 0.5,
        min_per_trade_sol: 0.01,
        max_per_trade_sol: 0.2,
        ..Default::default()
    };
    engine
        .add_target(&target.to_string(), "whale", config)
        .unwrap();

    engine
        .process_signature(&target.to_string(), "whale_sig")
        .await
        .unwrap();

    // One coordinated buy happened: one bundle of 3 wallets + tip.
    assert_eq!(h.bundle.accepted_sizes.lock().as_slice(), &[4]);

    let stats = engine.stats(&target.to_string()).unwrap();
    assert_eq!(stats.trades_copied, 1);
    // 3 wallets x 0.2 SOL
    assert!((stats.volume_in_sol - 0.6).abs() < 1e-9);

    let mut saw_detected = false;
    let mut copied_amount = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::TradeDetected { sol_amount, .. } => {
                saw_detected = true;
                assert!((sol_amount - 0.8).abs() < 1e-9);
            }
            Event::TradeCopied { sol_amount, success, .. } => {
                copied_amount = Some(sol_amount);
                assert!(success);
            }
            _ => {}
        }
    }
    assert!(saw_detected);
    assert!((copied_amount.unwrap() - 0.2).abs() < 1e-9);
}

#[tokio::test]
async fn filtered_trade_emits_skip_and_no_dispatch() {
    let h = harness(&[1.0, 1.0]);
    let engine = engine_for(&h);
    let mut rx = h.events.subscribe();

    let target = Pubkey::new_unique();
    let mint = test_mint();
    h.chain
        .set_transaction("small_sig", target_buy_tx(&target, &mint, 5_000_000, 1_000));

    // 0.005 SOL is below the default 0.01 minimum target size.
    engine
        .add_target(&target.to_string(), "whale", MirrorConfig::default())
        .unwrap();

    engine
        .process_signature(&target.to_string(), "small_sig")
        .await
        .unwrap();

    assert_eq!(h.bundle.accepted(), 0);
    assert_eq!(h.chain.sent_count(), 0);
    assert_eq!(engine.stats(&target.to_string()).unwrap().trades_copied, 0);

    let mut saw_skip = false;
    while let Ok(event) = rx.try_recv() {
        if let Event::MirrorSkipped { reason, .. } = event {
            saw_skip = true;
            assert!(reason.contains("minimum"));
        }
    }
    assert!(saw_skip);
}

#[tokio::test]
async fn disabled_action_is_not_copied() {
    let h = harness(&[1.0]);
    let engine = engine_for(&h);

    let target = Pubkey::new_unique();
    let mint = test_mint();
    h.chain
        .set_transaction("buy_sig", target_buy_tx(&target, &mint, 500_000_000, 1_000_000));

    let config = MirrorConfig { copy_buys: false, ..Default::default() };
    engine.add_target(&target.to_string(), "whale", config).unwrap();

    engine
        .process_signature(&target.to_string(), "buy_sig")
        .await
        .unwrap();

    assert_eq!(h.bundle.accepted(), 0);
    assert_eq!(h.chain.sent_count(), 0);
}

#[tokio::test]
async fn non_swap_transaction_is_ignored() {
    let h = harness(&[1.0]);
    let engine = engine_for(&h);

    let target = Pubkey::new_unique();
    // Plain SOL transfer: no token delta at all.
    h.chain.set_transaction(
        "transfer_sig",
        json!({
            "transaction": {
                "message": {
                    "accountKeys": [{"pubkey": target.to_string()}],
                    "instructions": []
                }
            },
            "meta": {
                "err": null,
                "preBalances": [1_000_000_000u64],
                "postBalances": [900_000_000u64],
                "preTokenBalances": [],
                "postTokenBalances": []
            }
        }),
    );

    engine
        .add_target(&target.to_string(), "whale", MirrorConfig::default())
        .unwrap();
    engine
        .process_signature(&target.to_string(), "transfer_sig")
        .await
        .unwrap();

    assert_eq!(h.chain.sent_count(), 0);
    assert_eq!(h.bundle.accepted(), 0);
}

#[tokio::test]
async fn removed_target_rejects_management_calls() {
    let h = harness(&[1.0]);
    let engine = engine_for(&h);

    let target = Pubkey::new_unique().to_string();
    engine.add_target(&target, "whale", MirrorConfig::default()).unwrap();
    assert_eq!(engine.list().len(), 1);

    engine.remove_target(&target).unwrap();
    assert!(engine.remove_target(&target).is_err());
    assert!(engine.stats(&target).is_none());
    assert!(engine.set_enabled(&target, false).is_err());
}

#[tokio::test]
async fn duplicate_target_is_rejected() {
    let h = harness(&[1.0]);
    let engine = engine_for(&h);

    let target = Pubkey::new_unique().to_string();
    engine.add_target(&target, "a", MirrorConfig::default()).unwrap();
    assert!(engine.add_target(&target, "b", MirrorConfig::default()).is_err());
    assert!(engine.add_target("not-an-address", "c", MirrorConfig::default()).is_err());
}
