use crate::error::{Error, Result};
use crate::sync::{AtomicPtr, AtomicU64, Ordering};
use std::alloc::{self, Layout};
use std::marker::PhantomData;
use std::ptr::{self, NonNull};

/// Per-thread record of the table version the thread last observed.
///
/// Cache-aligned to prevent false sharing between threads publishing their
/// versions. Only the owning thread writes `version`; any thread may read it.
///
/// 每个线程记录其最后观察到的表版本。
/// 缓存对齐以防止发布版本的线程之间的伪共享。
/// 只有所属线程写入 `version`；任何线程都可以读取它。
#[derive(Debug)]
#[repr(align(64))]
pub(crate) struct EpochRecord {
    id: usize,
    version: AtomicU64,
    /// Fixed once the record is linked into the registry.
    /// 记录被链接进注册表后固定不变。
    next: AtomicPtr<EpochRecord>,
}

impl EpochRecord {
    #[inline]
    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Last version published by the owning thread.
    ///
    /// Acquire pairs with the Release in `publish`: once a scan sees a newer
    /// version, every access the owner made to older tables happened before it.
    #[inline]
    pub(crate) fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn publish(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }
}

/// Append-only, lock-free list of every registered [`EpochRecord`].
///
/// Records are inserted at the head with a CAS retry loop and are never
/// unlinked; they are freed together with the registry, which requires that no
/// handle referring to them is still alive.
///
/// 所有已注册 [`EpochRecord`] 的只追加无锁链表。
///
/// 记录通过 CAS 重试循环插入到头部，永远不会被断开；
/// 它们随注册表一起被释放，这要求不再有引用它们的句柄存活。
#[derive(Debug)]
pub(crate) struct EpochRegistry {
    head: AtomicPtr<EpochRecord>,
}

impl EpochRegistry {
    pub(crate) fn new() -> Self {
        Self {
            head: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Allocate a cache-line aligned record for `id` holding `version` and link
    /// it at the head. The record is visible to every scan started after the
    /// successful swap.
    ///
    /// 为 `id` 分配一个持有 `version` 的缓存行对齐记录并链接到头部。
    /// 成功交换后开始的每次扫描都能看到该记录。
    pub(crate) fn register(&self, id: usize, version: u64) -> Result<NonNull<EpochRecord>> {
        let layout = Layout::new::<EpochRecord>();
        // SAFETY: `EpochRecord` is not zero-sized.
        let raw = unsafe { alloc::alloc(layout) } as *mut EpochRecord;
        let record = NonNull::new(raw).ok_or(Error::OutOfMemory { thread_id: id })?;

        // SAFETY: `record` is a fresh allocation with the layout of `EpochRecord`.
        unsafe {
            record.as_ptr().write(EpochRecord {
                id,
                version: AtomicU64::new(version),
                next: AtomicPtr::new(ptr::null_mut()),
            });
        }

        let mut head = self.head.load(Ordering::Acquire);
        loop {
            // SAFETY: the record is still private to this thread.
            unsafe { record.as_ref() }.next.store(head, Ordering::Relaxed);
            match self.head.compare_exchange_weak(
                head,
                record.as_ptr(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => head = actual,
            }
        }

        Ok(record)
    }

    /// Global lower bound on the versions any registered thread may still use.
    ///
    /// Starts from `current_version` and takes the minimum over every record.
    /// The walk takes no lock. A record appended concurrently may or may not be
    /// seen; either way the result is conservative, because a new record
    /// starts at a version no older than the current one.
    ///
    /// 任何已注册线程仍可能使用的版本的全局下界。
    ///
    /// 从 `current_version` 开始，对每条记录取最小值。遍历不加锁。
    /// 并发追加的记录可能被看到也可能看不到；两种结果都是保守的，
    /// 因为新记录的起始版本不会早于当前版本。
    pub(crate) fn safe_floor(&self, current_version: u64) -> u64 {
        self.iter()
            .map(EpochRecord::version)
            .fold(current_version, u64::min)
    }

    pub(crate) fn len(&self) -> usize {
        self.iter().count()
    }

    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            cursor: self.head.load(Ordering::Acquire),
            _registry: PhantomData,
        }
    }
}

impl Drop for EpochRegistry {
    fn drop(&mut self) {
        let layout = Layout::new::<EpochRecord>();
        let mut cursor = self.head.load(Ordering::Acquire);
        while let Some(record) = NonNull::new(cursor) {
            // SAFETY: every record was allocated in `register` with `layout`,
            // and `&mut self` means no handle can still reach it.
            unsafe {
                cursor = record.as_ref().next.load(Ordering::Acquire);
                ptr::drop_in_place(record.as_ptr());
                alloc::dealloc(record.as_ptr() as *mut u8, layout);
            }
        }
    }
}

pub(crate) struct Iter<'a> {
    cursor: *mut EpochRecord,
    _registry: PhantomData<&'a EpochRegistry>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a EpochRecord;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: linked records live as long as the registry borrowed by `'a`.
        let record = unsafe { self.cursor.as_ref()? };
        self.cursor = record.next.load(Ordering::Acquire);
        Some(record)
    }
}
