// SPDX-License-Identifier: Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use depthbridge::StreamPair;

const FRAME_LEN: usize = 512 * 424;

fn bench_produce_swap(c: &mut Criterion) {
    // One full producer/consumer cycle: fill the back buffer, publish, swap.
    let pair: StreamPair<u16> = StreamPair::new(FRAME_LEN);
    let frame = vec![1234u16; FRAME_LEN];

    c.bench_function("produce_swap_512x424", |b| {
        b.iter(|| {
            pair.produce(|dst| {
                dst.copy_from_slice(black_box(&frame));
                Ok(true)
            })
            .unwrap();
            assert!(pair.try_swap());
        });
    });
}

fn bench_swap_only(c: &mut Criterion) {
    // The consumer-side publish step alone must be O(1) in frame size.
    let pair: StreamPair<u16> = StreamPair::new(FRAME_LEN);

    c.bench_function("try_swap_pending", |b| {
        b.iter(|| {
            pair.produce(|_| Ok(true)).unwrap();
            black_box(pair.try_swap());
        });
    });
}

fn bench_read_front(c: &mut Criterion) {
    let pair: StreamPair<u16> = StreamPair::new(FRAME_LEN);
    pair.produce(|_| Ok(true)).unwrap();
    pair.try_swap();

    c.bench_function("read_front", |b| {
        b.iter(|| {
            let front = pair.read_front();
            black_box(front[0]);
        });
    });
}

criterion_group!(benches, bench_produce_swap, bench_swap_only, bench_read_front);
criterion_main!(benches);
