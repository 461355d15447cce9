//! Epoch-based reclamation of superseded table versions.
//!
//! Resizing a hash table under concurrency produces a sequence of table
//! versions. A superseded version cannot be freed right away because a thread
//! may still be in the middle of an operation on it. This crate tracks which
//! versions are still in use and reclaims everything strictly older than the
//! oldest version any thread may touch, without blocking readers or writers.
//!
//! - Every participating thread registers once and gets an [`EpochHandle`].
//!   Before each table operation it pins the current table
//!   ([`EpochHandle::pin`]), which publishes the version it is about to use.
//! - The resize path publishes new tables with
//!   [`TableContainer::retire_version`].
//! - Any thread may call [`TableContainer::collect`]. At most one collection
//!   sweeps at a time; others return immediately.
//! - Reclaimed storage is either freed ([`HardFree`]) or returned to a
//!   [`BucketPool`] for reuse ([`PooledRelease`]).
//!
//! ```
//! use std::thread;
//! use version_epoch::{BucketTable, TableContainer};
//!
//! let container = TableContainer::new(BucketTable::<u64>::with_buckets(4));
//! let worker = container.register_thread(1).unwrap();
//!
//! let reader = thread::spawn(move || {
//!     let guard = worker.pin();
//!     guard.table().num_buckets()
//! });
//!
//! container.retire_version(BucketTable::with_buckets(8));
//! let buckets = reader.join().unwrap();
//! assert!(buckets == 4 || buckets == 8);
//! ```
//!
//! 基于纪元的被取代表版本回收。
//!
//! 并发扩容哈希表会产生一系列表版本。被取代的版本不能立即释放，
//! 因为某个线程可能仍在对其进行操作。此 crate 跟踪哪些版本仍在使用，
//! 并回收所有严格早于任何线程可能访问的最旧版本的内容，且不阻塞读者或写者。

mod chain;
mod container;
mod error;
mod handle;
mod pool;
mod reclaim;
mod registry;
mod state;
mod sync;
mod table;

pub use chain::VersionedTable;
pub use container::{ContainerBuilder, TableContainer};
pub use error::{Error, ReclaimFailure, Result};
pub use handle::{EpochHandle, VersionGuard};
pub use pool::{BucketPool, DEFAULT_POOL_CAPACITY};
pub use reclaim::{HardFree, PooledRelease, Reclaimer};
pub use state::Collected;
pub use table::{Bucket, BucketTable, ENTRIES_PER_BUCKET};

#[cfg(test)]
mod tests;
