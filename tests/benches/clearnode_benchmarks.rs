//! # Clearnode Benchmarks
//!
//! | Area | Operation |
//! |------|-----------|
//! | cn-01 Signature Verification | recover signer of a request half |
//! | cn-01 Signature Verification | sign a response half |
//! | cn-02 Ledger | balance over a growing entry log |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rust_decimal::prelude::dec;
use serde_json::json;
use std::time::Duration;

use cn_01_signature_verification::{recover, Signer};
use cn_02_ledger::Ledger;
use cn_tests::harness::{random_signer, START_MS};
use shared_types::RpcData;

// ============================================================================
// CN-01: Signature Verification
// ============================================================================

fn bench_signatures(c: &mut Criterion) {
    let mut group = c.benchmark_group("cn-01-signature-verification");
    group.measurement_time(Duration::from_secs(10));

    let signer = random_signer();
    let req = RpcData::new(
        1,
        "get_ledger_balances",
        vec![json!({"account_id": signer.address()})],
        START_MS as u64,
    );
    let bytes = req.canonical_bytes().unwrap();
    let sig = signer.sign(&bytes).unwrap().to_hex();

    group.bench_function("recover_request_signer", |b| {
        b.iter(|| black_box(recover(black_box(&bytes), black_box(&sig)).unwrap()))
    });

    group.bench_function("sign_response", |b| {
        b.iter(|| {
            let bytes = black_box(&req).canonical_bytes().unwrap();
            black_box(signer.sign(&bytes).unwrap())
        })
    });

    group.finish();
}

// ============================================================================
// CN-02: Ledger
// ============================================================================

fn bench_ledger_balance(c: &mut Criterion) {
    let mut group = c.benchmark_group("cn-02-ledger");

    for entries in [10usize, 100, 1_000] {
        let owner = random_signer().address();
        let ledger = Ledger::in_memory();
        let view = ledger.participant(owner);
        let account = owner.to_string();
        for i in 0..entries {
            let amount = if i % 3 == 0 { dec!(-0.25) } else { dec!(1.125) };
            view.record(&account, "usdc", amount).unwrap();
        }

        group.throughput(Throughput::Elements(entries as u64));
        group.bench_with_input(BenchmarkId::new("balance", entries), &entries, |b, _| {
            b.iter(|| black_box(view.balance(&account, "usdc").unwrap()))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_signatures, bench_ledger_balance);
criterion_main!(benches);
