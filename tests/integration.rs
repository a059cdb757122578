use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use hazqueue::{Config, Queue};

struct DropCount(Arc<AtomicUsize>);
impl Drop for DropCount {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn single_participant_baseline() {
    let queue = Queue::new();
    assert_eq!(queue.pop().unwrap(), None);

    for i in 0..16 {
        queue.push(i).unwrap();
    }
    for i in 0..16 {
        assert_eq!(queue.pop().unwrap(), Some(i));
    }
    assert_eq!(queue.pop().unwrap(), None);
}

#[test]
fn drains_on_drop() {
    let drop_count = Arc::new(AtomicUsize::new(0));

    let queue = Queue::new();
    for _ in 0..32 {
        queue.push(DropCount(Arc::clone(&drop_count))).unwrap();
    }
    assert_eq!(drop_count.load(Ordering::Relaxed), 0, "nothing dropped before destruction");

    drop(queue);
    assert_eq!(drop_count.load(Ordering::Relaxed), 32);
}

#[test]
fn four_producers_four_consumers_conserve_every_value() {
    const PRODUCERS: usize = 4;
    const CONSUMERS: usize = 4;
    const PER_PRODUCER: usize = 1000;
    const TOTAL: usize = PRODUCERS * PER_PRODUCER;

    let queue = Arc::new(Queue::new());
    let barrier = Arc::new(Barrier::new(PRODUCERS + CONSUMERS));
    let popped_count = Arc::new(AtomicUsize::new(0));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for seq in 0..PER_PRODUCER {
                    queue.push(id * PER_PRODUCER + seq).unwrap();
                }
            })
        })
        .collect();

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let popped_count = Arc::clone(&popped_count);
            thread::spawn(move || {
                barrier.wait();
                let mut seen = Vec::new();
                loop {
                    match queue.pop().unwrap() {
                        Some(v) => {
                            seen.push(v);
                            popped_count.fetch_add(1, Ordering::Relaxed);
                        }
                        None => {
                            if popped_count.load(Ordering::Relaxed) >= TOTAL {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                seen
            })
        })
        .collect();

    for handle in producers {
        handle.join().unwrap();
    }

    let mut all_popped = HashSet::with_capacity(TOTAL);
    for handle in consumers {
        for value in handle.join().unwrap() {
            assert!(all_popped.insert(value), "value {} popped more than once", value);
        }
    }

    assert_eq!(all_popped.len(), TOTAL);
    assert_eq!(queue.pop().unwrap(), None);
}

#[test]
fn single_producer_single_consumer_preserves_fifo_order() {
    const COUNT: usize = 5_000;

    let queue = Arc::new(Queue::new());
    let barrier = Arc::new(Barrier::new(2));

    let producer = {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 0..COUNT {
                queue.push(i).unwrap();
            }
        })
    };

    let consumer = {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            let mut next_expected = 0;
            while next_expected < COUNT {
                if let Some(v) = queue.pop().unwrap() {
                    assert_eq!(v, next_expected, "pop must return values in push order");
                    next_expected += 1;
                } else {
                    thread::yield_now();
                }
            }
        })
    };

    producer.join().unwrap();
    consumer.join().unwrap();
}

#[test]
fn interleaved_push_pop_churn_conserves_values() {
    const ROUNDS: usize = 2_000;

    let queue = Arc::new(Queue::with_config(Config::with_scan_threshold(2)));
    let barrier = Arc::new(Barrier::new(3));
    let popped_total = Arc::new(AtomicUsize::new(0));

    let pusher = {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            barrier.wait();
            for i in 0..ROUNDS {
                queue.push(i).unwrap();
            }
        })
    };

    let poppers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let popped_total = Arc::clone(&popped_total);
            thread::spawn(move || {
                barrier.wait();
                let mut local = 0;
                loop {
                    match queue.pop().unwrap() {
                        Some(_) => local += 1,
                        None => {
                            if popped_total.load(Ordering::Relaxed) + local >= ROUNDS {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                popped_total.fetch_add(local, Ordering::Relaxed);
            })
        })
        .collect();

    pusher.join().unwrap();
    for handle in poppers {
        handle.join().unwrap();
    }

    // a low scan threshold forces frequent reclamation scans throughout the
    // run; conservation must still hold exactly.
    assert_eq!(popped_total.load(Ordering::Relaxed), ROUNDS);
}

#[test]
fn stalled_consumer_survives_concurrent_reclamation() {
    // A slow `Drop` widens the window between a consumer publishing its
    // hazard and completing its dequeue, while other threads churn the
    // queue with an aggressive scan threshold - stressing exactly the race
    // the hazard-pointer protocol exists to prevent.
    struct SlowDrop(Arc<AtomicUsize>);
    impl Drop for SlowDrop {
        fn drop(&mut self) {
            thread::yield_now();
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    let queue = Arc::new(Queue::with_config(Config::with_scan_threshold(1)));
    let drop_count = Arc::new(AtomicUsize::new(0));
    let pushed = 2_000;

    for _ in 0..pushed {
        queue.push(SlowDrop(Arc::clone(&drop_count))).unwrap();
    }

    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut count = 0;
                while queue.pop().unwrap().is_some() {
                    count += 1;
                }
                count
            })
        })
        .collect();

    let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    assert_eq!(total, pushed);
    assert_eq!(drop_count.load(Ordering::Relaxed), pushed);
}
