use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use memkv::{MemKv, PoolConfig, SymbolTable};

const N_KEYS: usize = 10_000;
const VALUE_SIZE: usize = 100;
const POOL_SIZE: usize = 64 * 1024 * 1024;

fn fresh_store() -> MemKv<Vec<u8>, SymbolTable> {
    MemKv::init(
        vec![0u8; POOL_SIZE],
        SymbolTable::compact(),
        &PoolConfig::default(),
    )
    .unwrap()
}

fn filled_store() -> MemKv<Vec<u8>, SymbolTable> {
    let mut kv = fresh_store();
    for i in 0..N_KEYS {
        kv.set(format!("key{}", i).as_bytes(), &[b'x'; VALUE_SIZE])
            .unwrap();
    }
    kv
}

fn set_benchmark(c: &mut Criterion) {
    c.bench_function("memkv_set_10k", |b| {
        b.iter_batched(
            fresh_store,
            |mut kv| {
                for i in 0..N_KEYS {
                    kv.set(format!("key{}", i).as_bytes(), &[b'x'; VALUE_SIZE])
                        .unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn get_hit_benchmark(c: &mut Criterion) {
    let kv = filled_store();
    c.bench_function("memkv_get_hit_10k", |b| {
        b.iter(|| {
            for i in 0..N_KEYS {
                let v = kv.get(format!("key{}", i).as_bytes()).unwrap();
                assert!(v.is_some());
            }
        });
    });
}

fn overwrite_benchmark(c: &mut Criterion) {
    c.bench_function("memkv_overwrite_10k", |b| {
        b.iter_batched(
            filled_store,
            |mut kv| {
                for i in 0..N_KEYS {
                    kv.set(format!("key{}", i).as_bytes(), &[b'y'; VALUE_SIZE / 2])
                        .unwrap();
                }
            },
            BatchSize::LargeInput,
        );
    });
}

fn keys_benchmark(c: &mut Criterion) {
    let kv = filled_store();
    c.bench_function("memkv_keys_all_10k", |b| {
        b.iter(|| {
            let mut n = 0usize;
            kv.keys(b"", |_| n += 1).unwrap();
            assert_eq!(n, N_KEYS);
        });
    });
}

criterion_group!(
    benches,
    set_benchmark,
    get_hit_benchmark,
    overwrite_benchmark,
    keys_benchmark
);
criterion_main!(benches);
