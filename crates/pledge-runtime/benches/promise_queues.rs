use std::sync::Arc;
use std::thread;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use pledge_runtime::{DeferredQueue, Promise, Runtime};
use serde_json::json;
use std::hint::black_box;

fn bench_deferred_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("deferred_queue");
    let n = 20_000usize;

    group.bench_function("single_thread_enqueue_run", |b| {
        b.iter_batched(
            DeferredQueue::new,
            |q| {
                for _ in 0..n {
                    q.enqueue(|| Ok(()));
                }
                black_box(q.run_until_idle().expect("drain failed"));
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("mpsc_4_producers_enqueue_then_run", |b| {
        b.iter(|| {
            let q = Arc::new(DeferredQueue::new());
            let per_producer = n / 4;
            let mut threads = Vec::with_capacity(4);

            for _ in 0..4 {
                let q = Arc::clone(&q);
                threads.push(thread::spawn(move || {
                    for _ in 0..per_producer {
                        q.enqueue(|| Ok(()));
                    }
                }));
            }

            for t in threads {
                t.join().expect("producer thread failed");
            }

            black_box(q.run_until_idle().expect("drain failed"));
        });
    });

    group.finish();
}

fn bench_promise_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("promise_chain");
    let depth = 1_000usize;

    group.bench_function("then_chain_1k", |b| {
        b.iter_batched(
            || Arc::new(DeferredQueue::new()),
            |queue| {
                let mut tail = Promise::<u64, String>::resolved(Arc::clone(&queue), 0);
                for _ in 0..depth {
                    tail = tail.then(|v| Ok(v + 1));
                }
                queue.run_until_idle().expect("drain failed");
                black_box(tail.state());
            },
            BatchSize::SmallInput,
        );
    });

    group.bench_function("handle_wrapper_resolve_1k", |b| {
        b.iter_batched(
            Runtime::new,
            |runtime| {
                for i in 0..depth {
                    let handle = runtime.wrapper(|_| Ok(())).expect("wrapper failed");
                    runtime.then(handle, Ok).expect("then failed");
                    runtime.resolve(handle, json!(i)).expect("resolve failed");
                }
                black_box(runtime.run_until_idle().expect("drain failed"));
            },
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

criterion_group!(promise_queues, bench_deferred_queue, bench_promise_chain);
criterion_main!(promise_queues);
