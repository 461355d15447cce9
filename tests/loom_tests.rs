//! Loom-based concurrency tests
//!
//! These tests use the `loom` library to exhaustively check thread
//! interleavings of pinning, publishing, retiring and collecting.
//!
//! Run with: `cargo test --features loom --test loom_tests --release`

#![cfg(feature = "loom")]

use loom::sync::Arc;
use loom::sync::atomic::{AtomicBool, Ordering};
use loom::thread;
use version_epoch::{BucketTable, Collected, ContainerBuilder, TableContainer};

/// Table entry that flags its own destruction.
struct Tracked {
    version: u64,
    freed: Arc<AtomicBool>,
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.freed.store(true, Ordering::SeqCst);
    }
}

fn tracked(version: u64) -> (BucketTable<Tracked>, Arc<AtomicBool>) {
    let freed = Arc::new(AtomicBool::new(false));
    let mut table = BucketTable::with_buckets(1);
    table.insert(
        0,
        Tracked {
            version,
            freed: freed.clone(),
        },
    );
    (table, freed)
}

fn manual_container(version: u64) -> (TableContainer<Tracked>, Arc<AtomicBool>) {
    let (table, freed) = tracked(version);
    (ContainerBuilder::new().collect_every(None).build(table), freed)
}

/// Test: Concurrent registration links every record
#[test]
fn loom_concurrent_registration() {
    loom::model(|| {
        let container = ContainerBuilder::new()
            .collect_every(None)
            .build(BucketTable::<u64>::with_buckets(1));

        let handles: Vec<_> = (0..2)
            .map(|id| {
                let container = container.clone();
                thread::spawn(move || container.register_thread(id).unwrap().id())
            })
            .collect();

        let mut ids: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        ids.sort();

        assert_eq!(ids, vec![0, 1]);
        assert_eq!(container.registered_threads(), 2);
    });
}

/// Test: A pinned table is never freed by a concurrent retire and collect
#[test]
fn loom_pinned_table_survives_collection() {
    loom::model(|| {
        let (container, freed0) = manual_container(0);
        let handle = container.register_thread(1).unwrap();

        let reader = thread::spawn(move || {
            let guard = handle.pin();
            let entry = guard.table().iter().next().unwrap();
            assert_eq!(entry.version, guard.version());
            assert!(!entry.freed.load(Ordering::SeqCst));

            thread::yield_now();

            assert!(!entry.freed.load(Ordering::SeqCst));
            guard.version()
        });

        let (table1, _freed1) = tracked(1);
        container.retire_version(table1);
        container.collect().unwrap();
        let (table2, _freed2) = tracked(2);
        container.retire_version(table2);
        container.collect().unwrap();

        let seen = reader.join().unwrap();
        assert!(seen <= 2);

        // The reader left its record at `seen`; everything below it may go.
        container.collect().unwrap();
        assert_eq!(container.version_floor(), seen);
        assert_eq!(freed0.load(Ordering::SeqCst), seen > 0);
    });
}

/// Test: Simultaneous collectors sweep each version exactly once
#[test]
fn loom_single_collector() {
    loom::model(|| {
        let (container, freed0) = manual_container(0);
        let (table1, freed1) = tracked(1);
        let (table2, freed2) = tracked(2);
        container.retire_version(table1);
        container.retire_version(table2);

        let collectors: Vec<_> = (0..2)
            .map(|_| {
                let container = container.clone();
                thread::spawn(move || container.collect().unwrap())
            })
            .collect();

        let results: Vec<Collected> = collectors.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().map(Collected::reclaimed).sum::<usize>(), 2);
        assert_eq!(
            results
                .iter()
                .filter(|c| matches!(c, Collected::Reclaimed(_)))
                .count(),
            1
        );
        assert_eq!(container.chain_versions(), vec![2]);
        assert!(freed0.load(Ordering::SeqCst));
        assert!(freed1.load(Ordering::SeqCst));
        assert!(!freed2.load(Ordering::SeqCst));
    });
}

/// Test: Reentrant pinning keeps the outermost version protected
#[test]
fn loom_reentrant_pinning() {
    loom::model(|| {
        let (container, freed0) = manual_container(0);
        let handle = container.register_thread(1).unwrap();

        let reader = thread::spawn(move || {
            let outer = handle.pin();
            let inner = handle.pin();
            assert!(inner.version() >= outer.version());

            drop(inner);
            thread::yield_now();

            let entry = outer.table().iter().next().unwrap();
            assert!(!entry.freed.load(Ordering::SeqCst));
            outer.version()
        });

        let (table1, _freed1) = tracked(1);
        container.retire_version(table1);
        container.collect().unwrap();

        // Version 0 may only go once the reader has published version 1.
        if reader.join().unwrap() == 0 {
            assert!(!freed0.load(Ordering::SeqCst));
            assert_eq!(container.version_floor(), 0);
        }
    });
}

/// Test: Dropping the last reference on another thread frees every version
#[test]
fn loom_last_reference_tears_down() {
    loom::model(|| {
        let (container, freed0) = manual_container(0);
        let (table1, freed1) = tracked(1);
        let handle = container.register_thread(1).unwrap();

        let worker = {
            let container = container.clone();
            thread::spawn(move || {
                let guard = handle.pin();
                let _ = guard.version();
                drop(guard);
                drop(handle);
                drop(container);
            })
        };

        container.retire_version(table1);
        drop(container);
        worker.join().unwrap();

        assert!(freed0.load(Ordering::SeqCst));
        assert!(freed1.load(Ordering::SeqCst));
    });
}
