use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use depot_core::ProductId;
use depot_engine::{CommitmentTracker, EngineConfig, KeyLocks, MemoryLedgerStore, StockLedger};
use depot_stock::{Attribution, OperationCode};

/// Naive counter simulation: direct map updates (no journal, no per-key
/// locks, no invariant checks beyond non-negative availability).
#[derive(Debug, Clone)]
struct NaiveCounterStore {
    inner: Arc<RwLock<HashMap<ProductId, NaiveCounters>>>,
}

#[derive(Debug, Clone, Copy)]
struct NaiveCounters {
    stock_on_hand: i64,
    committed_stock: i64,
}

impl NaiveCounterStore {
    fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn create(&self, product_id: ProductId) {
        let mut map = self.inner.write().unwrap();
        map.insert(
            product_id,
            NaiveCounters {
                stock_on_hand: 0,
                committed_stock: 0,
            },
        );
    }

    fn debit(&self, product_id: ProductId, amount: i64) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        match map.get_mut(&product_id) {
            Some(counters) => {
                counters.stock_on_hand += amount;
                Ok(())
            }
            None => Err(()),
        }
    }

    fn reserve(&self, product_id: ProductId, amount: i64) -> Result<(), ()> {
        let mut map = self.inner.write().unwrap();
        match map.get_mut(&product_id) {
            Some(counters) if counters.stock_on_hand - counters.committed_stock >= amount => {
                counters.committed_stock += amount;
                Ok(())
            }
            _ => Err(()),
        }
    }
}

fn setup_ledger() -> (Arc<StockLedger>, Arc<CommitmentTracker>, ProductId) {
    let store = Arc::new(MemoryLedgerStore::new());
    let locks = Arc::new(KeyLocks::new());
    let config = EngineConfig::default();

    let ledger = Arc::new(StockLedger::new(store.clone(), locks.clone(), &config));
    let tracker = Arc::new(CommitmentTracker::new(store, locks, &config));
    let product_id = ProductId::new();
    ledger.create_sku(product_id, 0).unwrap();
    (ledger, tracker, product_id)
}

fn bench_guarded_operation_latency(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_operation_latency");
    group.sample_size(1000);

    // Benchmark: journaled stock movement (lock + counter + journal append)
    group.bench_function("journaled_debit", |b| {
        let (ledger, _, product_id) = setup_ledger();
        b.iter(|| {
            ledger
                .debit(
                    product_id,
                    black_box(3),
                    250,
                    OperationCode::Purchase,
                    Attribution::none(),
                )
                .unwrap();
        });
    });

    // Benchmark: reservation round trip (counters only, no journal entry)
    group.bench_function("reserve_release_cycle", |b| {
        let (ledger, tracker, product_id) = setup_ledger();
        ledger
            .debit(
                product_id,
                1_000_000,
                250,
                OperationCode::Purchase,
                Attribution::none(),
            )
            .unwrap();

        b.iter(|| {
            tracker.reserve(product_id, black_box(5)).unwrap();
            tracker.release(product_id, 5).unwrap();
        });
    });

    group.finish();
}

fn bench_journal_append_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("journal_append_throughput");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::new("journaled_debits", batch_size),
            batch_size,
            |b, &size| {
                let (ledger, _, product_id) = setup_ledger();
                b.iter(|| {
                    for _ in 0..size {
                        black_box(
                            ledger
                                .debit(
                                    product_id,
                                    1,
                                    250,
                                    OperationCode::Purchase,
                                    Attribution::none(),
                                )
                                .unwrap(),
                        );
                    }
                });
            },
        );
    }

    group.finish();
}

fn bench_guarded_ledger_vs_naive_counters(c: &mut Criterion) {
    let mut group = c.benchmark_group("guarded_ledger_vs_naive_counters");
    group.sample_size(1000);

    // Benchmark: the real thing (locks, journal, invariants)
    group.bench_function("guarded_debit_and_reserve", |b| {
        let (ledger, tracker, product_id) = setup_ledger();
        b.iter(|| {
            ledger
                .debit(
                    product_id,
                    10,
                    250,
                    OperationCode::Purchase,
                    Attribution::none(),
                )
                .unwrap();
            tracker.reserve(product_id, 10).unwrap();
        });
    });

    // Benchmark: bare map updates (what the guards cost on top of)
    group.bench_function("naive_debit_and_reserve", |b| {
        let store = NaiveCounterStore::new();
        let product_id = ProductId::new();
        store.create(product_id);
        b.iter(|| {
            store.debit(product_id, 10).unwrap();
            store.reserve(product_id, 10).unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_guarded_operation_latency,
    bench_journal_append_throughput,
    bench_guarded_ledger_vs_naive_counters
);
criterion_main!(benches);
