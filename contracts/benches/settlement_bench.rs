// Settlement benchmarks for the carbon market.
//
// Covers the list-then-buy round trip, plain transfers, and state root
// computation over markets of increasing size.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};

use carbon_contracts::{CarbonMarket, CreditIssuance};
use carbon_ledger::{ManualClock, MarketConfig, PaymentLedger, Principal};

type Market = CarbonMarket<PaymentLedger, ManualClock>;

/// Builds a market with `credits` minted credits of 1,000 tons each, all
/// held by `dev`, and a buyer funded for a long benchmark run.
fn setup_market(credits: u64) -> Market {
    let admin = Principal::from("admin");
    let verifier = Principal::from("verifier");
    let dev = Principal::from("dev");

    let mut market = CarbonMarket::new(
        admin.clone(),
        MarketConfig::default(),
        PaymentLedger::new(),
        ManualClock::default(),
    )
    .unwrap();
    market.add_verifier(&admin, verifier.clone()).unwrap();
    market.register_developer(&verifier, dev.clone(), "Benchmark Forest").unwrap();
    for i in 0..credits {
        market
            .mint(
                &dev,
                CreditIssuance {
                    amount: 1_000,
                    project_type: "Reforestation".into(),
                    location: "Borneo".into(),
                    standard: "VCS".into(),
                    vintage_year: 2024,
                    serial_number: format!("BENCH-{i}"),
                },
            )
            .unwrap();
    }
    market
        .payments_mut()
        .deposit(&Principal::from("buyer"), u64::MAX / 2)
        .unwrap();
    market
}

fn bench_list_and_buy(c: &mut Criterion) {
    let dev = Principal::from("dev");
    let buyer = Principal::from("buyer");

    let mut group = c.benchmark_group("list_and_buy");
    group.throughput(Throughput::Elements(1));
    group.bench_function("single_credit", |b| {
        b.iter_batched(
            || setup_market(1),
            |mut market| {
                let listing = market.list(&dev, 1, 10, 25).unwrap();
                black_box(market.buy(&buyer, listing).unwrap())
            },
            BatchSize::SmallInput,
        );
    });
    group.finish();
}

fn bench_transfer(c: &mut Criterion) {
    let dev = Principal::from("dev");
    let holder = Principal::from("holder");
    let mut market = setup_market(1);

    c.bench_function("transfer_round_trip", |b| {
        b.iter(|| {
            market.transfer(&dev, &holder, 1, 1).unwrap();
            market.transfer(&holder, &dev, 1, 1).unwrap();
        });
    });
}

fn bench_state_root(c: &mut Criterion) {
    let mut group = c.benchmark_group("state_root");
    for credits in [10u64, 100, 1_000] {
        let market = setup_market(credits);
        group.throughput(Throughput::Elements(credits));
        group.bench_with_input(BenchmarkId::from_parameter(credits), &market, |b, market| {
            b.iter(|| black_box(market.state_root().unwrap()));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_list_and_buy, bench_transfer, bench_state_root);
criterion_main!(benches);
