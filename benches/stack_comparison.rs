use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use std::hint::black_box;
use std::mem::ManuallyDrop;
use std::ptr;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use treiber_epoch::TreiberStack;

const OPS_PER_THREAD: usize = 10_000;

// Baseline: heap-allocated Treiber stack on crossbeam-epoch
struct EpochStack<T> {
    head: Atomic<Node<T>>,
}

struct Node<T> {
    value: ManuallyDrop<T>,
    next: Atomic<Node<T>>,
}

impl<T> EpochStack<T> {
    fn new() -> Self {
        Self {
            head: Atomic::null(),
        }
    }

    fn push(&self, value: T) {
        let mut node = Owned::new(Node {
            value: ManuallyDrop::new(value),
            next: Atomic::null(),
        });
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Relaxed, &guard);
            node.next.store(head, Ordering::Relaxed);
            match self
                .head
                .compare_exchange(head, node, Ordering::Release, Ordering::Relaxed, &guard)
            {
                Ok(_) => break,
                Err(e) => node = e.new,
            }
        }
    }

    fn pop(&self) -> Option<T> {
        let guard = epoch::pin();
        loop {
            let head = self.head.load(Ordering::Acquire, &guard);
            let h = unsafe { head.as_ref() }?;
            let next = h.next.load(Ordering::Relaxed, &guard);
            if self
                .head
                .compare_exchange(head, next, Ordering::Relaxed, Ordering::Relaxed, &guard)
                .is_ok()
            {
                unsafe {
                    guard.defer_destroy(head);
                    return Some(ManuallyDrop::into_inner(ptr::read(&h.value)));
                }
            }
        }
    }
}

impl<T> Drop for EpochStack<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}

// Benchmark 1: Single-threaded push/pop pairs
fn bench_single_thread(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_thread_push_pop");

    group.bench_function("treiber_epoch", |b| {
        let stack = TreiberStack::new();
        let mut handle = stack.register();
        b.iter(|| {
            handle.push(black_box(1u64)).unwrap();
            black_box(handle.pop());
        });
    });

    group.bench_function("crossbeam_epoch", |b| {
        let stack = EpochStack::new();
        b.iter(|| {
            stack.push(black_box(1u64));
            black_box(stack.pop());
        });
    });

    group.bench_function("mutex_vec", |b| {
        let stack = Mutex::new(Vec::new());
        b.iter(|| {
            stack.lock().unwrap().push(black_box(1u64));
            black_box(stack.lock().unwrap().pop());
        });
    });

    group.finish();
}

// Benchmark 2: Every thread alternates push and pop on one shared stack
fn bench_mixed_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("mixed_push_pop");
    group.sample_size(10);

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("treiber_epoch", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let stack = TreiberStack::new();
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                let mut handle = stack.register();
                                for i in 0..OPS_PER_THREAD {
                                    handle.push(i).unwrap();
                                    black_box(handle.pop());
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        let _ = handle.join();
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("crossbeam_epoch", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let stack = Arc::new(EpochStack::new());
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                for i in 0..OPS_PER_THREAD {
                                    stack.push(i);
                                    black_box(stack.pop());
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        let _ = handle.join();
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("mutex_vec", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let stack = Arc::new(Mutex::new(Vec::new()));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                for i in 0..OPS_PER_THREAD {
                                    stack.lock().unwrap().push(i);
                                    black_box(stack.lock().unwrap().pop());
                                }
                            })
                        })
                        .collect();
                    for handle in handles {
                        let _ = handle.join();
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 3: Producers fill, then consumers drain
fn bench_fill_then_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("fill_then_drain");
    group.sample_size(10);

    for num_threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("treiber_epoch", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let stack = TreiberStack::new();
                    let producers: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                let mut handle = stack.register();
                                for i in 0..OPS_PER_THREAD {
                                    handle.push(i).unwrap();
                                }
                            })
                        })
                        .collect();
                    for producer in producers {
                        let _ = producer.join();
                    }

                    let consumers: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                let mut handle = stack.register();
                                while let Some(v) = handle.pop() {
                                    black_box(v);
                                }
                            })
                        })
                        .collect();
                    for consumer in consumers {
                        let _ = consumer.join();
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("crossbeam_epoch", num_threads),
            num_threads,
            |b, &num_threads| {
                b.iter(|| {
                    let stack = Arc::new(EpochStack::new());
                    let producers: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                for i in 0..OPS_PER_THREAD {
                                    stack.push(i);
                                }
                            })
                        })
                        .collect();
                    for producer in producers {
                        let _ = producer.join();
                    }

                    let consumers: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let stack = stack.clone();
                            thread::spawn(move || {
                                while let Some(v) = stack.pop() {
                                    black_box(v);
                                }
                            })
                        })
                        .collect();
                    for consumer in consumers {
                        let _ = consumer.join();
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 4: One spliced batch against the same number of single pushes
fn bench_batch_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_publish");

    for batch_len in [8, 64, 512].iter() {
        group.bench_with_input(
            BenchmarkId::new("push_batch", batch_len),
            batch_len,
            |b, &batch_len| {
                let stack = TreiberStack::new();
                let mut handle = stack.register();
                b.iter(|| {
                    handle.push_batch(0..batch_len).unwrap();
                    while let Some(v) = handle.pop() {
                        black_box(v);
                    }
                });
            },
        );

        group.bench_with_input(
            BenchmarkId::new("push_each", batch_len),
            batch_len,
            |b, &batch_len| {
                let stack = TreiberStack::new();
                let mut handle = stack.register();
                b.iter(|| {
                    for i in 0..batch_len {
                        handle.push(i).unwrap();
                    }
                    while let Some(v) = handle.pop() {
                        black_box(v);
                    }
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_single_thread,
    bench_mixed_workload,
    bench_fill_then_drain,
    bench_batch_publish
);
criterion_main!(benches);
