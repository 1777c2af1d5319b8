use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::sync::Arc;
use stratus_cache::{CacheData, CacheOptions, MemoryStore, StoreCache, WriteableCache};

fn server_groups(count: usize) -> Vec<CacheData> {
    (0..count)
        .map(|i| {
            CacheData::new(format!("app-main-v{i:03}"))
                .with_attribute("capacity", i)
                .with_relationship("clusters", [format!("app-main-{}", i % 10)])
                .with_relationship("instances", [format!("i-{i}-a"), format!("i-{i}-b")])
        })
        .collect()
}

fn bench_merge_all(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("build runtime");
    let mut group = c.benchmark_group("merge_all");

    for size in [10usize, 100, 500] {
        let items = server_groups(size);

        group.bench_with_input(BenchmarkId::new("fresh", size), &items, |b, items| {
            b.to_async(&runtime).iter(|| async {
                let cache = StoreCache::new("aws", Arc::new(MemoryStore::new()), CacheOptions::default())
                    .expect("valid options");
                cache
                    .merge_all("serverGroups", black_box(items.clone()), true)
                    .await
                    .expect("merge");
            });
        });

        let cache = StoreCache::new("aws", Arc::new(MemoryStore::new()), CacheOptions::default())
            .expect("valid options");
        runtime
            .block_on(cache.merge_all("serverGroups", items.clone(), true))
            .expect("seed cache");

        group.bench_with_input(BenchmarkId::new("unchanged", size), &items, |b, items| {
            b.to_async(&runtime).iter(|| async {
                cache
                    .merge_all("serverGroups", black_box(items.clone()), true)
                    .await
                    .expect("merge");
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge_all);
criterion_main!(benches);
