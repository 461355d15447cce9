use crate::sync::Mutex;
use crate::table::{Bucket, BucketTable};
use log::trace;

/// Default bound on the number of allocations a pool keeps cached.
/// 池默认缓存的分配数量上限。
pub const DEFAULT_POOL_CAPACITY: usize = 1024;

struct PoolInner<E> {
    overflow: Vec<Box<Bucket<E>>>,
    heads: Vec<Box<[Bucket<E>]>>,
    released: u64,
    trimmed: u64,
}

impl<E> PoolInner<E> {
    #[inline]
    fn cached(&self) -> usize {
        self.overflow.len() + self.heads.len()
    }

    /// Drop cached allocations until at most `keep` remain. Overflow buckets
    /// go first, then the oldest head arrays.
    fn trim_to(&mut self, keep: usize) -> usize {
        let mut freed = 0;
        while self.cached() > keep {
            if self.overflow.pop().is_none() {
                self.heads.remove(0);
            }
            freed += 1;
        }
        self.trimmed += freed as u64;
        freed
    }
}

/// Slab-style cache of bucket allocations released by superseded table versions.
///
/// Released buckets are cleared and kept for reuse by future resizes instead of
/// being handed back to the global allocator. The pool holds at most
/// `capacity` allocations; anything beyond that is freed when the pool trims.
///
/// 被取代的表版本释放的桶分配的 slab 式缓存。
///
/// 被释放的桶会被清空并保留给之后的扩容复用，而不是交还给全局分配器。
/// 池最多保留 `capacity` 个分配，超出部分会在池修剪时被释放。
pub struct BucketPool<E> {
    inner: Mutex<PoolInner<E>>,
    capacity: usize,
}

impl<E> BucketPool<E> {
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                overflow: Vec::new(),
                heads: Vec::new(),
                released: 0,
                trimmed: 0,
            }),
            capacity,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return every allocation of `table` to the pool.
    ///
    /// Each overflow chain is walked and unlinked bucket by bucket; entries are
    /// dropped before the pool lock is taken. Returns the number of allocations
    /// handed to the pool (overflow buckets plus the head array). If the pool
    /// grows past its capacity it trims itself afterwards.
    ///
    /// 将 `table` 的所有分配归还到池中。
    ///
    /// 逐个遍历并断开每条溢出链；条目在获取池锁之前被 drop。
    /// 返回交给池的分配数量（溢出桶加上头桶数组）。
    /// 如果池超过容量，随后会自行修剪。
    pub fn release_table(&self, table: BucketTable<E>) -> usize {
        let mut heads = table.heads;
        let mut overflow = Vec::new();

        for head in heads.iter_mut() {
            head.clear_entries();
            let mut next = head.next.take();
            while let Some(mut bucket) = next {
                next = bucket.next.take();
                bucket.clear_entries();
                overflow.push(bucket);
            }
        }

        let released = overflow.len() + 1;
        let mut inner = self.inner.lock();
        inner.overflow.append(&mut overflow);
        inner.heads.push(heads);
        inner.released += released as u64;

        if inner.cached() > self.capacity {
            let freed = inner.trim_to(self.capacity);
            trace!("bucket pool over capacity, trimmed {} allocations", freed);
        }

        released
    }

    /// Take a cleared overflow bucket from the pool, allocating if none is cached.
    /// 从池中取出一个已清空的溢出桶，如果没有缓存则新分配。
    pub fn acquire_overflow(&self) -> Box<Bucket<E>> {
        self.inner
            .lock()
            .overflow
            .pop()
            .unwrap_or_else(|| Box::new(Bucket::empty()))
    }

    /// Take a cleared head array of exactly `num_buckets` buckets from the pool,
    /// allocating if none of that size is cached.
    pub fn acquire_heads(&self, num_buckets: usize) -> Box<[Bucket<E>]> {
        let cached = {
            let mut inner = self.inner.lock();
            inner
                .heads
                .iter()
                .position(|heads| heads.len() == num_buckets)
                .map(|index| inner.heads.swap_remove(index))
        };
        cached.unwrap_or_else(|| (0..num_buckets).map(|_| Bucket::empty()).collect())
    }

    /// Free cached allocations until at most `keep` remain.
    /// Returns the number of allocations freed.
    ///
    /// 释放缓存的分配，直到最多保留 `keep` 个。返回被释放的分配数量。
    pub fn trim(&self, keep: usize) -> usize {
        self.inner.lock().trim_to(keep)
    }

    /// Allocations currently cached.
    #[inline]
    pub fn cached(&self) -> usize {
        self.inner.lock().cached()
    }

    #[inline]
    pub fn cached_overflow(&self) -> usize {
        self.inner.lock().overflow.len()
    }

    #[inline]
    pub fn cached_heads(&self) -> usize {
        self.inner.lock().heads.len()
    }

    /// Total allocations ever released into the pool.
    #[inline]
    pub fn released(&self) -> u64 {
        self.inner.lock().released
    }

    /// Total allocations ever freed by trimming.
    #[inline]
    pub fn trimmed(&self) -> u64 {
        self.inner.lock().trimmed
    }
}

impl<E> Default for BucketPool<E> {
    fn default() -> Self {
        Self::new()
    }
}
