//! Compaction benchmarks
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kline_loader::{reduce_mem_usage, Kline, KlineTable};

/// Two weeks of 5-minute candles
fn two_weeks() -> KlineTable {
    let klines: Vec<Kline> = (0..4032)
        .map(|i| {
            let price = 16500.0 + (i % 200) as f64 * 0.5;
            Kline {
                open_time: 1_672_531_200_000 + i as i64 * 300_000,
                open: price,
                high: price + 3.0,
                low: price - 3.0,
                close: price + 0.5,
                volume: 80.0 + (i % 40) as f64,
            }
        })
        .collect();
    KlineTable::from_klines(&klines).expect("valid klines")
}

fn benchmark_reduce_mem_usage(c: &mut Criterion) {
    let table = two_weeks();
    c.bench_function("reduce_mem_usage_two_weeks_5m", |b| {
        b.iter(|| reduce_mem_usage(black_box(table.batch().clone())))
    });
}

fn benchmark_build_table(c: &mut Criterion) {
    let klines: Vec<Kline> = two_weeks()
        .index()
        .iter()
        .map(|t| Kline {
            open_time: t.timestamp_millis(),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        })
        .collect();
    c.bench_function("kline_table_from_klines", |b| {
        b.iter(|| KlineTable::from_klines(black_box(&klines)))
    });
}

criterion_group!(benches, benchmark_reduce_mem_usage, benchmark_build_table);
criterion_main!(benches);
