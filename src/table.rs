use crate::pool::BucketPool;
use std::iter;

/// Number of entry slots in every bucket before an overflow bucket is chained.
/// 每个桶在链接溢出桶之前的条目槽数量。
pub const ENTRIES_PER_BUCKET: usize = 3;

/// A fixed-size bucket with an optional chain of overflow buckets.
///
/// 固定大小的桶，带有可选的溢出桶链。
pub struct Bucket<E> {
    entries: [Option<E>; ENTRIES_PER_BUCKET],
    pub(crate) next: Option<Box<Bucket<E>>>,
}

impl<E> Bucket<E> {
    pub(crate) fn empty() -> Self {
        Self {
            entries: std::array::from_fn(|_| None),
            next: None,
        }
    }

    /// Entries stored directly in this bucket, overflow excluded.
    #[inline]
    pub fn entries(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().flatten()
    }

    /// This bucket followed by every overflow bucket chained behind it.
    /// 此桶及其后链接的所有溢出桶。
    #[inline]
    pub fn chain(&self) -> impl Iterator<Item = &Bucket<E>> {
        iter::successors(Some(self), |bucket| bucket.next.as_deref())
    }

    #[inline]
    pub fn overflow(&self) -> Option<&Bucket<E>> {
        self.next.as_deref()
    }

    fn try_push(&mut self, entry: E) -> Option<E> {
        match self.entries.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(entry);
                None
            }
            None => Some(entry),
        }
    }

    /// Drop all entries but keep the allocation and the chain link untouched.
    pub(crate) fn clear_entries(&mut self) {
        for slot in self.entries.iter_mut() {
            *slot = None;
        }
    }
}

impl<E> Drop for Bucket<E> {
    // Unlink the overflow chain iteratively so long chains cannot blow the stack
    // through recursive `Box` drops.
    fn drop(&mut self) {
        let mut next = self.next.take();
        while let Some(mut bucket) = next {
            next = bucket.next.take();
        }
    }
}

/// Bucket storage of one table version.
///
/// The layout is a head array of `num_buckets` buckets, each of which may grow
/// a singly linked chain of heap allocated overflow buckets. The reclamation
/// layer does not interpret entries; it only needs to know how the storage is
/// split into allocations so that every one of them can be freed or pooled.
///
/// 一个表版本的桶存储。
///
/// 布局为 `num_buckets` 个头桶组成的数组，每个头桶可以增长出一条
/// 在堆上分配的溢出桶单链表。回收层不解释条目内容，
/// 只需要知道存储如何划分为各个分配，以便逐一释放或归还到池中。
pub struct BucketTable<E> {
    pub(crate) heads: Box<[Bucket<E>]>,
    len: usize,
    overflow: usize,
}

impl<E> BucketTable<E> {
    /// Allocate a table with `num_buckets` empty head buckets (at least one).
    /// 分配一个带有 `num_buckets` 个空头桶的表（至少一个）。
    pub fn with_buckets(num_buckets: usize) -> Self {
        let heads = (0..num_buckets.max(1)).map(|_| Bucket::empty()).collect();
        Self::from_heads(heads)
    }

    /// Allocate a table, reusing a head array released into `pool` if one of
    /// the right size is cached.
    ///
    /// 分配一个表，如果池中缓存了大小合适的头桶数组则复用它。
    pub fn with_pool(num_buckets: usize, pool: &BucketPool<E>) -> Self {
        Self::from_heads(pool.acquire_heads(num_buckets.max(1)))
    }

    pub(crate) fn from_heads(heads: Box<[Bucket<E>]>) -> Self {
        Self {
            heads,
            len: 0,
            overflow: 0,
        }
    }

    #[inline]
    pub fn num_buckets(&self) -> usize {
        self.heads.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of overflow buckets currently chained off the head array.
    #[inline]
    pub fn overflow_buckets(&self) -> usize {
        self.overflow
    }

    /// Head bucket responsible for `hash`.
    #[inline]
    pub fn bucket(&self, hash: u64) -> &Bucket<E> {
        &self.heads[self.index(hash)]
    }

    #[inline]
    fn index(&self, hash: u64) -> usize {
        (hash % self.heads.len() as u64) as usize
    }

    /// Append `entry` to the chain of the bucket responsible for `hash`,
    /// chaining a freshly allocated overflow bucket when the chain is full.
    ///
    /// 将 `entry` 追加到负责 `hash` 的桶链中，链满时链接一个新分配的溢出桶。
    pub fn insert(&mut self, hash: u64, entry: E) {
        self.insert_with(hash, entry, || Box::new(Bucket::empty()));
    }

    /// Like [`insert`](Self::insert), but overflow buckets come from `pool`.
    /// 与 `insert` 相同，但溢出桶从 `pool` 中获取。
    pub fn insert_pooled(&mut self, hash: u64, entry: E, pool: &BucketPool<E>) {
        self.insert_with(hash, entry, || pool.acquire_overflow());
    }

    fn insert_with(&mut self, hash: u64, mut entry: E, mut alloc: impl FnMut() -> Box<Bucket<E>>) {
        let index = self.index(hash);
        let mut bucket = &mut self.heads[index];
        loop {
            match bucket.try_push(entry) {
                None => break,
                Some(rejected) => entry = rejected,
            }
            if bucket.next.is_none() {
                self.overflow += 1;
            }
            bucket = &mut **bucket.next.get_or_insert_with(&mut alloc);
        }
        self.len += 1;
    }

    /// First entry in the chain of `hash` matching `pred`.
    pub fn find(&self, hash: u64, mut pred: impl FnMut(&E) -> bool) -> Option<&E> {
        self.bucket(hash)
            .chain()
            .flat_map(Bucket::entries)
            .find(|entry| pred(entry))
    }

    /// Every entry of the table, bucket by bucket.
    /// 表中的所有条目，逐桶遍历。
    pub fn iter(&self) -> impl Iterator<Item = &E> {
        self.heads
            .iter()
            .flat_map(Bucket::chain)
            .flat_map(Bucket::entries)
    }
}

impl<E> std::fmt::Debug for BucketTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketTable")
            .field("num_buckets", &self.num_buckets())
            .field("len", &self.len)
            .field("overflow", &self.overflow)
            .finish()
    }
}
