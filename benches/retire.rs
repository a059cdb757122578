#![feature(test)]

extern crate test;

use test::Bencher;

use hazqueue::Queue;

/// Benches the retire path in isolation: a single push immediately followed
/// by the pop that retires its node, so every iteration exercises one full
/// allocate-link-unlink-retire cycle.
#[bench]
fn retire_one_node_per_iteration(b: &mut Bencher) {
    let queue = Queue::new();
    queue.push(0).unwrap();

    b.iter(|| {
        queue.push(1).unwrap();
        test::black_box(queue.pop().unwrap());
    })
}
