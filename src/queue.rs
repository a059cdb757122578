//! The lock-free, multi-producer/multi-consumer FIFO queue, reclaimed via the
//! hazard-pointer registry in [`crate::global`] and [`crate::local`].

use std::fmt;
use std::mem::{self, MaybeUninit};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicPtr, Ordering};

use crate::config::Config;
use crate::error::QueueError;
use crate::local;
use crate::shield::Shield;

////////////////////////////////////////////////////////////////////////////////////////////////////
// Node
////////////////////////////////////////////////////////////////////////////////////////////////////

/// One link in the queue's singly-linked chain.
///
/// `value` is only ever read once, by whichever [`Queue::pop`] call
/// successfully swings head past this node's predecessor – from that point
/// on the node is the sentinel and its `value` must never be read or dropped
/// again, which is why it is stored as `MaybeUninit` rather than `T`: the
/// node's own destructor, run by [`destroy_node`], never touches it.
struct Node<T> {
    value: MaybeUninit<T>,
    next: AtomicPtr<Node<T>>,
}

impl<T> Node<T> {
    #[inline]
    fn sentinel() -> *mut Self {
        Box::into_raw(Box::new(Self { value: MaybeUninit::uninit(), next: AtomicPtr::new(ptr::null_mut()) }))
    }

    #[inline]
    fn with_value(value: T) -> *mut Self {
        Box::into_raw(Box::new(Self { value: MaybeUninit::new(value), next: AtomicPtr::new(ptr::null_mut()) }))
    }
}

/// The destructor registered with [`local::retire`] for retired nodes.
///
/// # Safety
///
/// `ptr` must point at a `Node<T>` allocated by [`Node::sentinel`] or
/// [`Node::with_value`], and must not be read or destroyed by anyone else
/// afterwards.
unsafe fn destroy_node<T>(ptr: NonNull<()>) {
    // `value` is `MaybeUninit`, so this `Box`'s drop glue never reads it –
    // correct whether or not this node's value was ever consumed by a pop.
    drop(unsafe { Box::from_raw(ptr.cast::<Node<T>>().as_ptr()) });
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// Queue
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A lock-free, multi-producer/multi-consumer FIFO queue.
///
/// Reclamation of unlinked nodes is deferred through the process-wide hazard
/// pointer registry: a node detached by a successful [`pop`](Queue::pop) is
/// not freed immediately, only once no participant's hazard slot still
/// protects it.
pub struct Queue<T> {
    head: AtomicPtr<Node<T>>,
    tail: AtomicPtr<Node<T>>,
    scan_threshold: u32,
}

// SAFETY: `T` crosses thread boundaries on every successful `pop`, and nodes
// are shared between threads while linked into the chain; no operation ever
// hands out a `&T` that outlives the call, so `T: Sync` is not required.
unsafe impl<T: Send> Send for Queue<T> {}
unsafe impl<T: Send> Sync for Queue<T> {}

impl<T> fmt::Debug for Queue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue").field("scan_threshold", &self.scan_threshold).finish()
    }
}

impl<T> Default for Queue<T> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    /// Creates a new, empty queue with the default [`Config`].
    #[inline]
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new, empty queue, overriding the per-participant scan
    /// threshold via `config`.
    #[inline]
    pub fn with_config(config: Config) -> Self {
        let sentinel = Node::<T>::sentinel();
        Self {
            head: AtomicPtr::new(sentinel),
            tail: AtomicPtr::new(sentinel),
            scan_threshold: config.scan_threshold(),
        }
    }

    /// Appends `value` to the tail of the queue.
    ///
    /// Always succeeds, retrying internally on contention with other
    /// producers; it never acquires a hazard slot since it only ever reads
    /// the current tail node, which – being the last node – cannot be
    /// retired by a concurrent `pop` until some other node succeeds it.
    pub fn push(&self, value: T) -> Result<(), QueueError> {
        let new_node = Node::with_value(value);

        loop {
            let last = self.tail.load(Ordering::Acquire);
            // SAFETY: `last` was read from `self.tail` and the queue never
            // destroys a node still reachable as tail.
            let next = unsafe { (*last).next.load(Ordering::Acquire) };

            if self.tail.load(Ordering::Acquire) != last {
                continue;
            }

            if next.is_null() {
                // SAFETY: same as above.
                let succ = unsafe { &(*last).next };
                if succ
                    .compare_exchange_weak(ptr::null_mut(), new_node, Ordering::Release, Ordering::Relaxed)
                    .is_ok()
                {
                    let _ = self.tail.compare_exchange_weak(
                        last,
                        new_node,
                        Ordering::Release,
                        Ordering::Relaxed,
                    );
                    return Ok(());
                }
            } else {
                let _ = self.tail.compare_exchange_weak(last, next, Ordering::Release, Ordering::Relaxed);
            }
        }
    }

    /// Removes and returns the value at the head of the queue, or `None` if
    /// the queue was empty at the linearization point.
    ///
    /// Retries internally on contention. Surfaces [`QueueError::OutOfSlots`]
    /// only if the global hazard table has no free slot to acquire, which is
    /// unreachable in a correctly dimensioned deployment.
    pub fn pop(&self) -> Result<Option<T>, QueueError> {
        let shield = Shield::acquire()?;

        loop {
            let first = self.head.load(Ordering::Acquire);
            // SAFETY: `first` is never null; the sentinel is never unlinked.
            let first_addr = unsafe { NonNull::new_unchecked(first as *mut ()) };
            shield.set_protected(first_addr);

            // (QUE:1) this `SeqCst` reload pairs with the `SeqCst` store in
            // `HazardSlot::set_protected`: without a full fence between the
            // publish and this reload, the two could be reordered and a
            // concurrent scan could reclaim `first` before the protection
            // became visible to it.
            if self.head.load(Ordering::SeqCst) != first {
                continue;
            }

            // SAFETY: `first` is hazard-protected, so it has not been
            // reclaimed; its `next` pointer is never reassigned once set.
            let next = unsafe { (*first).next.load(Ordering::Acquire) };
            if next.is_null() {
                return Ok(None);
            }

            // SAFETY: `next` has not yet been unlinked from head – it only
            // becomes eligible for retirement once some `pop` advances head
            // past it, which cannot yet have happened while head still
            // equals the hazard-protected `first`. Reading its value here,
            // before racing the head CAS, is what lets this design use a
            // single hazard slot per `pop` instead of one per node visited.
            let value = unsafe { ptr::read((*next).value.as_ptr()) };

            match self.head.compare_exchange_weak(first, next, Ordering::Release, Ordering::Relaxed) {
                Ok(_) => {
                    // SAFETY: `destroy_node::<T>` matches how `first` was allocated.
                    unsafe { local::retire(self.scan_threshold, first_addr, destroy_node::<T>) };
                    return Ok(Some(value));
                }
                Err(_) => {
                    // lost the race; some other thread may go on to consume
                    // `next`'s value itself, so this copy must not be dropped.
                    mem::forget(value);
                }
            }
        }
    }
}

impl<T> Drop for Queue<T> {
    fn drop(&mut self) {
        while let Ok(Some(value)) = self.pop() {
            drop(value);
        }

        local::force_cleanup();

        let sentinel = *self.head.get_mut();
        // SAFETY: destruction is documented as not thread-safe, so by the
        // time this runs no other participant holds a reference into the
        // queue; the final node is always an unconsumed sentinel.
        unsafe { destroy_node::<T>(NonNull::new_unchecked(sentinel as *mut ())) };
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::Queue;
    use crate::config::ConfigBuilder;

    #[test]
    fn fifo_single_threaded() {
        let queue = Queue::new();
        for i in 0..8 {
            queue.push(i).unwrap();
        }
        for i in 0..8 {
            assert_eq!(queue.pop().unwrap(), Some(i));
        }
        assert_eq!(queue.pop().unwrap(), None);
    }

    #[test]
    fn empty_queue_pops_none() {
        let queue: Queue<u32> = Queue::new();
        assert_eq!(queue.pop().unwrap(), None);
    }

    #[test]
    fn drop_runs_value_destructors_exactly_once() {
        let count = Arc::new(AtomicUsize::new(0));

        struct DropCount(Arc<AtomicUsize>);
        impl Drop for DropCount {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let queue = Queue::new();
        for _ in 0..5 {
            queue.push(DropCount(Arc::clone(&count))).unwrap();
        }
        drop(queue);

        assert_eq!(count.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn concurrent_producers_and_consumers_preserve_all_values() {
        const PRODUCERS: usize = 4;
        const CONSUMERS: usize = 4;
        const PER_PRODUCER: usize = 1000;

        let queue = Arc::new(Queue::with_config(ConfigBuilder::new().scan_threshold(4).build()));
        let barrier = Arc::new(Barrier::new(PRODUCERS + CONSUMERS));
        let popped = Arc::new(AtomicUsize::new(0));

        let producers: Vec<_> = (0..PRODUCERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_PRODUCER {
                        queue.push(i).unwrap();
                    }
                })
            })
            .collect();

        let consumers: Vec<_> = (0..CONSUMERS)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let barrier = Arc::clone(&barrier);
                let popped = Arc::clone(&popped);
                thread::spawn(move || {
                    barrier.wait();
                    loop {
                        match queue.pop().unwrap() {
                            Some(_) => {
                                popped.fetch_add(1, Ordering::Relaxed);
                            }
                            None => {
                                if popped.load(Ordering::Relaxed) >= PRODUCERS * PER_PRODUCER {
                                    break;
                                }
                                thread::yield_now();
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in producers {
            handle.join().unwrap();
        }
        for handle in consumers {
            handle.join().unwrap();
        }

        assert_eq!(popped.load(Ordering::Relaxed), PRODUCERS * PER_PRODUCER);
    }
}
