use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use std::hint::black_box;
use swarm_trader::mirror::decoder::decode_trade;

const TARGET: &str = "User111111111111111111111111111111111111111";
const MINT: &str = "MintUSDC11111111111111111111111111111111111";

fn swap_tx() -> serde_json::Value {
    json!({
        "blockTime": 1_700_000_000,
        "transaction": {
            "message": {
                "accountKeys": [
                    {"pubkey": TARGET},
                    {"pubkey": "Pool111111111111111111111111111111111111111"},
                    {"pubkey": "SystemProgram111111111111111111111111111111"}
                ],
                "instructions": [
                    {"programId": "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P"}
                ]
            }
        },
        "meta": {
            "err": null,
            "preBalances": [1_000_000_000u64, 5_000_000_000u64, 0],
            "postBalances": [900_000_000u64, 5_100_000_000u64, 0],
            "preTokenBalances": [
                {
                    "accountIndex": 3,
                    "mint": MINT,
                    "owner": TARGET,
                    "uiTokenAmount": { "amount": "0", "decimals": 6 }
                }
            ],
            "postTokenBalances": [
                {
                    "accountIndex": 3,
                    "mint": MINT,
                    "owner": TARGET,
                    "uiTokenAmount": { "amount": "1000000", "decimals": 6 }
                }
            ],
            "loadedAddresses": {
                "writable": [],
                "readonly": []
            }
        }
    })
}

fn bench_decode_trade(c: &mut Criterion) {
    let tx = swap_tx();

    c.bench_function("decode_trade_buy", |b| {
        b.iter(|| decode_trade(black_box(TARGET), black_box("sig"), black_box(&tx)))
    });
}

criterion_group!(benches, bench_decode_trade);
criterion_main!(benches);
