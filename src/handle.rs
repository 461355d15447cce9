use crate::chain::VersionedTable;
use crate::error::Result;
use crate::reclaim::{HardFree, Reclaimer};
use crate::registry::EpochRecord;
use crate::state::{CollectMode, Collected, ContainerState};
use crate::sync::{Arc, Cell};
use std::ops::Deref;
use std::ptr::NonNull;

/// A thread's registration with a [`TableContainer`](crate::TableContainer).
///
/// Obtained once per thread via `TableContainer::register_thread()` and passed
/// explicitly to every operation that needs the thread's epoch record. It is
/// `Send` so it can be created before a thread is spawned, but `!Sync` (due to
/// `Cell`): only one thread may use it at a time.
///
/// The handle is used to:
/// - Publish the version the thread is about to use via `publish_version()`.
/// - Pin the current table via `pin()` and read it through a `VersionGuard`.
///
/// 线程在 [`TableContainer`](crate::TableContainer) 中的注册。
///
/// 每个线程通过 `TableContainer::register_thread()` 获取一次，并显式传递给
/// 每个需要该线程纪元记录的操作。它是 `Send` 的，因此可以在线程启动前创建，
/// 但它是 `!Sync` 的（因为 `Cell`）：同一时间只能由一个线程使用。
///
/// 句柄用于：
/// - 通过 `publish_version()` 发布线程即将使用的版本。
/// - 通过 `pin()` 钉住当前表，并通过 `VersionGuard` 读取它。
pub struct EpochHandle<E, R: Reclaimer<E> = HardFree> {
    state: Arc<ContainerState<E, R>>,
    record: NonNull<EpochRecord>,
    pin_count: Cell<usize>,
    pinned_version: Cell<u64>,
}

// SAFETY: the record lives as long as the registry inside `state`, which the
// handle keeps alive. Only the thread currently owning the handle writes to it.
unsafe impl<E: Send + Sync, R: Reclaimer<E>> Send for EpochHandle<E, R> {}

impl<E, R: Reclaimer<E>> EpochHandle<E, R> {
    pub(crate) fn new(state: Arc<ContainerState<E, R>>, record: NonNull<EpochRecord>) -> Self {
        Self {
            state,
            record,
            pin_count: Cell::new(0),
            pinned_version: Cell::new(0),
        }
    }

    #[inline]
    fn record(&self) -> &EpochRecord {
        // SAFETY: see the `Send` impl.
        unsafe { self.record.as_ref() }
    }

    /// Identifier given at registration.
    #[inline]
    pub fn id(&self) -> usize {
        self.record().id()
    }

    /// Last version published by this handle.
    /// 此句柄最后发布的版本。
    #[inline]
    pub fn published_version(&self) -> u64 {
        self.record().version()
    }

    /// Record that this thread is about to use table `version`.
    ///
    /// Call it before an operation that dereferences the table so that
    /// concurrent collections see an up-to-date lower bound. Versions only move
    /// forward: publishing an older version than the last one is a contract
    /// violation. The published value never exceeds the container's current
    /// version, nor, while pinned, the version the thread is pinned at.
    ///
    /// 记录此线程即将使用表版本 `version`。
    ///
    /// 在解引用表的操作之前调用，使并发回收看到最新的下界。
    /// 版本只能前进：发布比上一次更旧的版本违反约定。
    /// 发布的值永远不会超过容器的当前版本，被钉住时也不会超过钉住的版本。
    #[inline]
    pub fn publish_version(&self, version: u64) {
        debug_assert!(
            version >= self.record().version(),
            "published versions must not go backwards ({} < {})",
            version,
            self.record().version()
        );

        let mut version = version.min(self.state.current_version());
        if self.pin_count.get() > 0 {
            version = version.min(self.pinned_version.get());
        }
        self.record().publish(version);
    }

    /// Pin the current table version.
    ///
    /// Loads the container's current table, publishes its version and returns
    /// a `VersionGuard` through which the table can be read. While any guard
    /// of this handle is alive, the pinned version and every newer one stay
    /// allocated.
    ///
    /// **Reentrancy**: nested calls and guard clones are allowed. Only the
    /// outermost pin publishes; inner guards may observe a newer table, which
    /// the outer pin protects as well.
    ///
    /// 钉住当前表版本。
    ///
    /// 加载容器的当前表，发布其版本，并返回可以读取该表的 `VersionGuard`。
    /// 只要此句柄的任何守卫存活，被钉住的版本及所有更新的版本都保持已分配。
    ///
    /// **可重入性**：允许嵌套调用和克隆守卫。只有最外层的 pin 会发布；
    /// 内层守卫可能观察到更新的表，外层 pin 同样保护它。
    #[inline]
    pub fn pin(&self) -> VersionGuard<'_, E, R> {
        let pin_count = self.pin_count.get();
        let table = self.state.load_current();

        if pin_count == 0 {
            // SAFETY: the record still holds a version no newer than any table
            // this thread has loaded, and `current` only moves forward, so the
            // table just loaded cannot have been reclaimed.
            let version = unsafe { table.as_ref() }.version();
            self.record().publish(version);
            self.pinned_version.set(version);
        }

        self.pin_count.set(pin_count + 1);

        VersionGuard {
            handle: self,
            table,
        }
    }

    /// Publish this thread's view of the current version, then run a
    /// conditional collection.
    ///
    /// 发布此线程对当前版本的视图，然后执行一次有条件回收。
    pub fn collect(&self) -> Result<Collected> {
        if self.pin_count.get() == 0 {
            self.record().publish(self.state.current_version());
        }
        self.state.collect_with(CollectMode::Conditional)
    }
}

impl<E, R: Reclaimer<E>> std::fmt::Debug for EpochHandle<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EpochHandle")
            .field("id", &self.id())
            .field("version", &self.published_version())
            .field("pin_count", &self.pin_count.get())
            .finish()
    }
}

/// A guard that keeps one table version readable.
///
/// `VersionGuard` is obtained by calling `EpochHandle::pin()` and dereferences
/// to the [`VersionedTable`] that was current at that moment. It is `!Send`
/// and `!Sync` and cannot outlive the handle it came from.
///
/// 保持一个表版本可读的守卫。
///
/// `VersionGuard` 通过调用 `EpochHandle::pin()` 获得，解引用为当时的
/// 当前 [`VersionedTable`]。它是 `!Send` 和 `!Sync` 的，不能比来源句柄活得更久。
#[must_use]
pub struct VersionGuard<'a, E, R: Reclaimer<E> = HardFree> {
    handle: &'a EpochHandle<E, R>,
    table: NonNull<VersionedTable<E>>,
}

impl<E, R: Reclaimer<E>> Deref for VersionGuard<'_, E, R> {
    type Target = VersionedTable<E>;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: the handle stays pinned at a version no newer than this
        // table for as long as the guard lives.
        unsafe { self.table.as_ref() }
    }
}

impl<E, R: Reclaimer<E>> Clone for VersionGuard<'_, E, R> {
    #[inline]
    fn clone(&self) -> Self {
        let pin_count = self.handle.pin_count.get();

        assert!(
            pin_count > 0,
            "BUG: Cloning a VersionGuard in an unpinned state (pin_count = 0). \
             This indicates incorrect API usage or a library bug."
        );

        self.handle.pin_count.set(pin_count + 1);

        VersionGuard {
            handle: self.handle,
            table: self.table,
        }
    }
}

impl<E, R: Reclaimer<E>> Drop for VersionGuard<'_, E, R> {
    #[inline]
    fn drop(&mut self) {
        let pin_count = self.handle.pin_count.get();

        assert!(
            pin_count > 0,
            "BUG: Dropping a VersionGuard in an unpinned state (pin_count = 0). \
             This indicates incorrect API usage or a library bug."
        );

        // The record keeps the pinned version after the last guard is gone;
        // it only advances on the next publish.
        self.handle.pin_count.set(pin_count - 1);
    }
}
