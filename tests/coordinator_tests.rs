mod common;

use common::{harness, harness_with, test_mint, test_settings, MockBundle, MockChain};
use swarm_trader::coordinator::types::{ExecutionMode, TradeIntent};

#[tokio::test]
async fn simple_buy_bundles_and_succeeds_for_all() {
    // Three funded wallets, auto mode: 3 <= K=5 means one bundle.
    let h = harness(&[1.0, 1.0, 1.0]);
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.mode, ExecutionMode::Bundle);
    assert_eq!(result.bundle_ids.len(), 1);
    assert_eq!(result.wallet_results.len(), 3);
    assert!(result.wallet_results.iter().all(|r| r.success));
    assert!((result.total_sol_in - 0.3).abs() < 1e-9);

    // three wallet transactions plus the tip, within the K+1 cap
    assert_eq!(h.bundle.accepted_sizes.lock().as_slice(), &[4]);
}

#[tokio::test]
async fn underfunded_wallet_is_dropped_but_batch_succeeds() {
    let h = harness(&[1.0, 1.0, 0.02]);
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.wallet_results.len(), 3);
    assert_eq!(result.succeeded(), 2);

    let dropped = result
        .wallet_results
        .iter()
        .find(|r| r.wallet_id == "wallet_2")
        .unwrap();
    assert!(!dropped.success);
    assert!(dropped.error.as_ref().unwrap().contains("insufficient"));

    // Only the two funded wallets made it into the bundle (+ tip).
    assert_eq!(h.bundle.accepted_sizes.lock().as_slice(), &[3]);
}

#[tokio::test]
async fn no_eligible_wallet_fails_the_batch() {
    let h = harness(&[0.05, 0.05]);
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.succeeded(), 0);
    assert!(result.errors.iter().any(|e| e.contains("no wallets")));
    assert_eq!(h.chain.sent_count(), 0);
    assert_eq!(h.bundle.accepted(), 0);
}

#[tokio::test]
async fn multi_bundle_falls_back_per_chunk() {
    // Eight wallets chunk into 5 + 3; the first submission is rejected,
    // only that chunk re-runs as individual sends.
    let chain = MockChain::new();
    let bundle = MockBundle::failing_first(1);
    let h = harness_with(&[1.0; 8], chain, bundle, test_settings());
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.05))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.mode, ExecutionMode::MultiBundle);
    assert_eq!(result.wallet_results.len(), 8);
    assert!(result.wallet_results.iter().all(|r| r.success));

    // Exactly one chunk kept its bundle id; the other's wallets were
    // submitted individually.
    assert_eq!(result.bundle_ids.len(), 1);
    assert!(result.errors.iter().any(|e| e.contains("rejected")));
    let fallback_sends = h.chain.sent_count();
    assert!(fallback_sends == 5 || fallback_sends == 3, "got {}", fallback_sends);
}

#[tokio::test]
async fn bundle_mode_falls_back_to_parallel() {
    let chain = MockChain::new();
    let bundle = MockBundle::failing_first(1);
    let h = harness_with(&[1.0, 1.0, 1.0], chain, bundle, test_settings());
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1).with_mode(ExecutionMode::Bundle))
        .await
        .unwrap();

    assert!(result.success);
    assert!(result.bundle_ids.is_empty());
    assert_eq!(result.succeeded(), 3);
    assert_eq!(h.chain.sent_count(), 3);
    assert!(!result.errors.is_empty());
}

#[tokio::test]
async fn percentage_sell_floors_per_wallet() {
    let h = harness(&[1.0, 1.0, 1.0]);
    let mint = test_mint();

    h.chain.set_tokens(h.wallets[0], mint, 1_000_000);
    h.chain.set_tokens(h.wallets[1], mint, 500_000);
    // wallet_2 never held the mint

    let result = h
        .coordinator
        .coordinated_sell(TradeIntent::sell_percent(mint.to_string(), 50.0))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.wallet_results.len(), 3);

    let amount_of = |id: &str| {
        result
            .wallet_results
            .iter()
            .find(|r| r.wallet_id == id)
            .unwrap()
            .clone()
    };
    assert_eq!(amount_of("wallet_0").token_amount, Some(500_000));
    assert_eq!(amount_of("wallet_1").token_amount, Some(250_000));

    let dropped = amount_of("wallet_2");
    assert!(!dropped.success);
    assert_eq!(dropped.error.as_deref(), Some("no position"));
}

#[tokio::test]
async fn tiny_position_percentage_sell_is_zero_amount() {
    let h = harness(&[1.0]);
    let mint = test_mint();
    h.chain.set_tokens(h.wallets[0], mint, 1);

    let result = h
        .coordinator
        .coordinated_sell(TradeIntent::sell_percent(mint.to_string(), 50.0))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(
        result.wallet_results[0].error.as_deref(),
        Some("zero amount")
    );
    assert_eq!(h.chain.sent_count(), 0);
}

#[tokio::test]
async fn disabled_wallets_are_never_selected() {
    let h = harness(&[1.0, 1.0, 1.0]);
    let mint = test_mint().to_string();
    h.pool.set_enabled("wallet_1", false).unwrap();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert_eq!(result.wallet_results.len(), 2);
    assert!(result.wallet_results.iter().all(|r| r.wallet_id != "wallet_1"));
}

#[tokio::test]
async fn explicit_subset_restricts_selection() {
    let h = harness(&[1.0, 1.0, 1.0]);
    let mint = test_mint().to_string();

    let intent = TradeIntent::buy(&mint, 0.1)
        .with_wallets(vec!["wallet_0".into(), "wallet_2".into()]);
    let result = h.coordinator.coordinated_buy(intent).await.unwrap();

    let ids: Vec<&str> = result
        .wallet_results
        .iter()
        .map(|r| r.wallet_id.as_str())
        .collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&"wallet_0") && ids.contains(&"wallet_2"));
}

#[tokio::test]
async fn sequential_mode_preserves_wallet_order() {
    let h = harness(&[1.0, 1.0, 1.0]);
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1).with_mode(ExecutionMode::Sequential))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.mode, ExecutionMode::Sequential);

    let sent = h.chain.sent.lock().clone();
    assert_eq!(sent, h.wallets, "submissions must follow the wallet order");
}

#[tokio::test]
async fn sequential_confirm_timeout_keeps_signature() {
    let chain = MockChain::unconfirmable();
    let bundle = MockBundle::new();
    let h = harness_with(&[1.0, 1.0], chain, bundle, test_settings());
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1).with_mode(ExecutionMode::Sequential))
        .await
        .unwrap();

    // Both wallets timed out, neither succeeded, but the loop visited
    // both and kept the signatures.
    assert!(!result.success);
    assert_eq!(result.wallet_results.len(), 2);
    for r in &result.wallet_results {
        assert!(r.signature.is_some());
        assert!(r.error.as_ref().unwrap().contains("timed out"));
    }
    assert_eq!(h.chain.sent_count(), 2);
}

#[tokio::test]
async fn one_wallet_auto_selects_parallel() {
    let h = harness(&[1.0]);
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert_eq!(result.mode, ExecutionMode::Parallel);
    assert!(result.bundle_ids.is_empty());
    assert_eq!(h.chain.sent_count(), 1);
}

#[tokio::test]
async fn bundles_disabled_forces_parallel() {
    let mut settings = test_settings();
    settings.bundles_enabled = false;
    let h = harness_with(&[1.0, 1.0, 1.0], MockChain::new(), MockBundle::new(), settings);
    let mint = test_mint().to_string();

    let result = h
        .coordinator
        .coordinated_buy(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert_eq!(result.mode, ExecutionMode::Parallel);
    assert_eq!(h.bundle.accepted(), 0);
    assert_eq!(h.chain.sent_count(), 3);
}

#[tokio::test]
async fn percentage_buy_is_rejected() {
    let h = harness(&[1.0]);
    let mut intent = TradeIntent::sell_percent(test_mint().to_string(), 50.0);
    intent.action = swarm_trader::coordinator::types::TradeAction::Buy;

    assert!(h.coordinator.coordinated_buy(intent).await.is_err());
}

#[tokio::test]
async fn quote_aggregates_across_wallets() {
    let h = harness(&[1.0, 1.0]);
    let mint = test_mint().to_string();

    let quote = h
        .coordinator
        .coordinated_quote(TradeIntent::buy(&mint, 0.1))
        .await
        .unwrap();

    assert_eq!(quote.per_wallet.len(), 2);
    assert_eq!(quote.total_input, 200_000_000);
    assert_eq!(quote.total_output, 400_000_000);
    assert_eq!(quote.worst_price_impact_pct, Some(0.1));
}

#[tokio::test]
async fn simulate_reports_mode_and_eligibility() {
    let h = harness(&[1.0, 1.0, 0.02]);
    let mint = test_mint().to_string();

    // cached balances come from an explicit refresh
    h.pool.refresh_balances().await.unwrap();

    let report = h
        .coordinator
        .simulate(&TradeIntent::buy(&mint, 0.1))
        .unwrap();

    assert_eq!(report.mode, ExecutionMode::Bundle);
    assert_eq!(report.eligible.len(), 2);
    assert_eq!(report.skipped.len(), 1);
    assert!((report.estimated_sol_in - 0.2).abs() < 1e-9);
    assert_eq!(report.estimated_tip_lamports, 10_000);
    assert_eq!(h.chain.sent_count(), 0);
}
