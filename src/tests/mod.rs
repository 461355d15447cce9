mod edge_case_tests;

use crate::{BucketTable, ReclaimFailure, Reclaimer};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Entry that records its table version in a shared set when dropped.
/// 被 drop 时将其表版本记录到共享集合中的条目。
pub(crate) struct Sentinel {
    pub(crate) version: u64,
    dropped: Arc<Mutex<HashSet<u64>>>,
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.dropped.lock().unwrap().insert(self.version);
    }
}

/// Tracks which table versions have had their entries dropped.
/// 跟踪哪些表版本的条目已被 drop。
#[derive(Clone, Default)]
pub(crate) struct DropLog {
    dropped: Arc<Mutex<HashSet<u64>>>,
}

impl DropLog {
    pub(crate) fn table(&self, version: u64, num_buckets: usize) -> BucketTable<Sentinel> {
        let mut table = BucketTable::with_buckets(num_buckets);
        table.insert(
            version,
            Sentinel {
                version,
                dropped: self.dropped.clone(),
            },
        );
        table
    }

    pub(crate) fn is_dropped(&self, version: u64) -> bool {
        self.dropped.lock().unwrap().contains(&version)
    }

    pub(crate) fn count(&self) -> usize {
        self.dropped.lock().unwrap().len()
    }
}

/// Reclaimer that refuses every version listed in `refuse` and counts the rest.
/// 拒绝 `refuse` 中列出的每个版本并统计其余版本的回收器。
#[derive(Default)]
pub(crate) struct FlakyReclaimer {
    pub(crate) refuse: Mutex<HashSet<usize>>,
    pub(crate) reclaimed: AtomicUsize,
}

impl Reclaimer<usize> for FlakyReclaimer {
    fn reclaim(&self, table: BucketTable<usize>) -> Result<usize, ReclaimFailure<usize>> {
        let tag = table.iter().next().copied().unwrap_or(usize::MAX);
        if self.refuse.lock().unwrap().contains(&tag) {
            return Err(ReclaimFailure::new(table, "allocator refused the release"));
        }
        self.reclaimed.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }
}

/// A table tagged with a single entry equal to `tag`.
pub(crate) fn tagged(tag: usize) -> BucketTable<usize> {
    let mut table = BucketTable::with_buckets(2);
    table.insert(tag as u64, tag);
    table
}
