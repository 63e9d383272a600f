//! Checkout/return cost of the pool, uncontended and under thread contention.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sphinx_pool::{FactoryError, Pool, PoolConfiguration, ResourceFactory};
use std::thread;
use std::time::{Duration, Instant};

struct Buffers;

impl ResourceFactory for Buffers {
    type Resource = Vec<u8>;

    fn create(&self) -> Result<Vec<u8>, FactoryError> {
        Ok(Vec::with_capacity(4096))
    }

    fn passivate(&self, buffer: &mut Vec<u8>) -> Result<(), FactoryError> {
        buffer.clear();
        Ok(())
    }
}

fn bench_uncontended(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_uncontended");

    for validate in [false, true] {
        let config = PoolConfiguration::new()
            .with_max_total(8)
            .with_test_on_borrow(validate)
            .with_test_on_return(validate);
        let pool = Pool::new(Buffers, config);

        group.bench_with_input(BenchmarkId::new("acquire_close", validate), &pool, |b, pool| {
            b.iter(|| {
                let proxy = pool.acquire().unwrap();
                proxy.with(|buffer| buffer.push(1)).unwrap();
                black_box(proxy.close()).unwrap();
            });
        });
    }

    group.finish();
}

fn bench_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("acquire_contended");

    for threads in [2usize, 8] {
        group.bench_with_input(BenchmarkId::new("threads", threads), &threads, |b, &threads| {
            b.iter_custom(|iters| {
                let mut total = Duration::ZERO;
                for _ in 0..iters {
                    let pool = Pool::new(Buffers, PoolConfiguration::new().with_max_total(4));
                    let start = Instant::now();

                    thread::scope(|scope| {
                        for _ in 0..threads {
                            let pool = pool.clone();
                            scope.spawn(move || {
                                for _ in 0..100 {
                                    let proxy = pool.acquire().unwrap();
                                    black_box(proxy.id());
                                }
                            });
                        }
                    });

                    total += start.elapsed();
                }
                total
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_uncontended, bench_contended);
criterion_main!(benches);
