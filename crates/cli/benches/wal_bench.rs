use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use memtable::SkipList;
use tempfile::tempdir;
use wal::{Wal, WalOp};

const N: usize = 5_000;

fn wal_append_sync_every_record(c: &mut Criterion) {
    c.bench_function("wal_append_sync_1k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("wal.log");
                let w = Wal::with_sync_threshold(&path, 1).unwrap();
                (dir, w)
            },
            |(_dir, mut w)| {
                for i in 1..=1_000u64 {
                    w.append(WalOp::Put, &format!("k{}", i), &"x".repeat(100), i)
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn wal_append_batched_sync(c: &mut Criterion) {
    c.bench_function("wal_append_batched_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("wal.log");
                let w = Wal::open(&path).unwrap();
                (dir, w)
            },
            |(_dir, mut w)| {
                for i in 1..=N as u64 {
                    w.append(WalOp::Put, &format!("k{}", i), &"x".repeat(100), i)
                        .unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn wal_append_del_records(c: &mut Criterion) {
    c.bench_function("wal_append_del_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("wal.log");
                let w = Wal::open(&path).unwrap();
                (dir, w)
            },
            |(_dir, mut w)| {
                for i in 1..=N as u64 {
                    w.append(WalOp::Del, &format!("k{}", i), "", i).unwrap();
                }
            },
            BatchSize::SmallInput,
        );
    });
}

fn wal_replay(c: &mut Criterion) {
    c.bench_function("wal_replay_5k", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                let path = dir.path().join("wal.log");

                {
                    let mut w = Wal::open(&path).unwrap();
                    for i in 1..=N as u64 {
                        w.append(WalOp::Put, &format!("k{}", i), &"x".repeat(100), i)
                            .unwrap();
                    }
                }

                (dir, path)
            },
            |(_dir, path)| {
                let mut w = Wal::open(&path).unwrap();
                let mut mem = SkipList::with_seed(1);
                let max_seq = w.load(&mut mem).unwrap();

                assert_eq!(max_seq, N as u64);
                assert_eq!(mem.len(), N);
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    wal_append_sync_every_record,
    wal_append_batched_sync,
    wal_append_del_records,
    wal_replay,
);

criterion_main!(benches);
