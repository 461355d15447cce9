use crate::table::BucketTable;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the reclamation layer.
///
/// Neither variant leaves shared state inconsistent: a failed registration
/// never links a record, and a failed sweep commits the progress made before
/// the failing version and keeps that version in the chain for the next round.
///
/// 回收层对外暴露的错误。
/// 两种错误都不会破坏共享状态。
#[derive(Debug, Error)]
pub enum Error {
    /// The cache-line aligned epoch record for a thread could not be allocated.
    /// 无法为线程分配缓存行对齐的纪元记录。
    #[error("out of memory while allocating the epoch record of thread {thread_id}")]
    OutOfMemory { thread_id: usize },

    /// The reclaimer refused the storage of `version`.
    /// 回收器拒绝释放 `version` 的存储。
    #[error(
        "failed to reclaim table version {version} after reclaiming {reclaimed} older versions: {reason}"
    )]
    Reclaim {
        version: u64,
        reclaimed: usize,
        reason: String,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Returned by a [`Reclaimer`](crate::Reclaimer) that could not release a table.
///
/// The table is handed back so the sweep can relink it and retry later.
///
/// 回收器无法释放表时返回，表会被交还以便之后重试。
#[derive(Error)]
#[error("{reason}")]
pub struct ReclaimFailure<E> {
    pub table: BucketTable<E>,
    pub reason: String,
}

impl<E> ReclaimFailure<E> {
    pub fn new(table: BucketTable<E>, reason: impl Into<String>) -> Self {
        Self {
            table,
            reason: reason.into(),
        }
    }
}

impl<E> fmt::Debug for ReclaimFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimFailure")
            .field("num_buckets", &self.table.num_buckets())
            .field("reason", &self.reason)
            .finish()
    }
}
