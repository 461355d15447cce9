use crate::error::ReclaimFailure;
use crate::pool::BucketPool;
use crate::table::BucketTable;
use log::trace;

/// Strategy for releasing the storage of a table version that no thread can
/// reach anymore.
///
/// The collector hands each swept version to the reclaimer exactly once,
/// right after unlinking it from the chain. On success the reclaimer returns
/// the number of allocations it released. On failure it must hand the table
/// back inside [`ReclaimFailure`]; the collector relinks it and retries on a
/// later collection.
///
/// The strategy is fixed when the container is built.
///
/// 释放不再被任何线程访问的表版本存储的策略。
///
/// 回收器在将每个版本从链中断开后，立即把它交给回收器，且恰好一次。
/// 成功时回收器返回释放的分配数量。失败时必须通过 [`ReclaimFailure`]
/// 交还表；回收器会重新链接它并在之后的回收中重试。
///
/// 策略在容器构建时确定。
pub trait Reclaimer<E>: Send + Sync {
    fn reclaim(&self, table: BucketTable<E>) -> Result<usize, ReclaimFailure<E>>;
}

/// Return every allocation of a version straight to the global allocator.
///
/// Overflow chains are walked and freed one bucket at a time, then the head
/// array and the descriptor go.
///
/// 将版本的每个分配直接交还给全局分配器。
/// 逐个遍历并释放溢出链中的桶，然后释放头桶数组和描述符。
#[derive(Debug, Default, Clone, Copy)]
pub struct HardFree;

impl<E> Reclaimer<E> for HardFree {
    fn reclaim(&self, table: BucketTable<E>) -> Result<usize, ReclaimFailure<E>> {
        let mut heads = table.heads;
        let mut freed = 0;

        for head in heads.iter_mut() {
            let mut next = head.next.take();
            while let Some(mut bucket) = next {
                next = bucket.next.take();
                drop(bucket);
                freed += 1;
            }
        }

        drop(heads);
        freed += 1;
        trace!("hard free released {} allocations", freed);
        Ok(freed)
    }
}

/// Return a version's allocations to a [`BucketPool`] for reuse by later
/// resizes. The pool decides when memory really goes back to the allocator.
///
/// 将版本的分配归还给 [`BucketPool`] 以供之后的扩容复用。
/// 由池决定内存何时真正交还给分配器。
pub struct PooledRelease<E> {
    pool: BucketPool<E>,
}

impl<E> PooledRelease<E> {
    pub fn new(pool: BucketPool<E>) -> Self {
        Self { pool }
    }

    /// The pool resizes should allocate from.
    /// 扩容时应从中分配的池。
    #[inline]
    pub fn pool(&self) -> &BucketPool<E> {
        &self.pool
    }
}

impl<E> Default for PooledRelease<E> {
    fn default() -> Self {
        Self::new(BucketPool::new())
    }
}

impl<E: Send> Reclaimer<E> for PooledRelease<E> {
    fn reclaim(&self, table: BucketTable<E>) -> Result<usize, ReclaimFailure<E>> {
        let released = self.pool.release_table(table);
        trace!("pooled release returned {} allocations", released);
        Ok(released)
    }
}

impl<E> std::fmt::Debug for PooledRelease<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledRelease")
            .field("cached", &self.pool.cached())
            .field("capacity", &self.pool.capacity())
            .finish()
    }
}
