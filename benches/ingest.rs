//! Bulk-write throughput of the embedded backends.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use tempfile::TempDir;

use gutencache::model::{EtextId, Triple};
use gutencache::store::MetadataStore;
use gutencache::store::kv::KvStore;
use gutencache::store::relational::RelationalStore;
use gutencache::vocabulary::Predicate;

fn synthetic_batch(size: usize) -> Vec<Triple> {
    (0..size)
        .map(|i| {
            let id = EtextId::new(i as u64 + 1).unwrap();
            let predicate = Predicate::ALL[i % Predicate::ALL.len()];
            Triple::new(id, predicate, format!("value {i}"))
        })
        .collect()
}

fn bench_put_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("put_batch");
    for size in [1_000usize, 10_000] {
        let batch = synthetic_batch(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("kv", size), &batch, |b, batch| {
            let dir = TempDir::new().unwrap();
            let store = KvStore::open(dir.path()).unwrap();
            b.iter(|| store.put_batch(batch).unwrap());
        });

        group.bench_with_input(BenchmarkId::new("relational", size), &batch, |b, batch| {
            let store = RelationalStore::in_memory().unwrap();
            b.iter(|| store.put_batch(batch).unwrap());
        });
    }
    group.finish();
}

fn bench_lookups(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let store = KvStore::open(dir.path()).unwrap();
    store.put_batch(&synthetic_batch(50_000)).unwrap();
    let id = EtextId::new(2_701).unwrap();

    c.bench_function("get_attributes", |b| {
        b.iter(|| store.get_attributes(id).unwrap())
    });
    c.bench_function("find_etexts", |b| {
        b.iter(|| store.find_etexts(Predicate::Title, "value 2700").unwrap())
    });
}

criterion_group!(benches, bench_put_batch, bench_lookups);
criterion_main!(benches);
