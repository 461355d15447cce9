use crate::error::Result;
use crate::handle::EpochHandle;
use crate::reclaim::{HardFree, Reclaimer};
use crate::state::{CollectMode, Collected, ContainerState, DEFAULT_COLLECT_EVERY};
use crate::sync::{Arc, Ordering};
use crate::table::BucketTable;
use log::debug;

/// Builder for configuring a `TableContainer`.
///
/// Use this builder to customize reclamation behavior:
/// - `collect_every`: Run a conditional collection after every N retired versions
/// - `reclaimer`: Choose how the storage of reclaimed versions is released
///
/// # Example
/// ```
/// use version_epoch::{BucketPool, BucketTable, ContainerBuilder, PooledRelease};
///
/// let container = ContainerBuilder::new()
///     .collect_every(8)
///     .reclaimer(PooledRelease::new(BucketPool::with_capacity(256)))
///     .build(BucketTable::<u64>::with_buckets(16));
/// ```
///
/// 用于配置 `TableContainer` 的构建器。
pub struct ContainerBuilder<R = HardFree> {
    collect_every: Option<usize>,
    reclaimer: R,
}

impl ContainerBuilder<HardFree> {
    /// Create a new builder with default settings.
    /// 创建一个带有默认设置的新构建器。
    #[inline]
    pub fn new() -> Self {
        Self {
            collect_every: Some(DEFAULT_COLLECT_EVERY),
            reclaimer: HardFree,
        }
    }
}

impl Default for ContainerBuilder<HardFree> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> ContainerBuilder<R> {
    /// Set the automatic collection interval.
    ///
    /// Every `n`-th call to `retire_version()` runs a conditional collection
    /// before returning. Pass `None` (or `0`) to leave collection entirely to
    /// the caller.
    ///
    /// Default: `Some(4)`
    ///
    /// 设置自动回收间隔。
    /// 每第 `n` 次调用 `retire_version()` 会在返回前执行一次有条件回收。
    /// 传递 `None`（或 `0`）将回收完全交给调用者。
    #[inline]
    pub fn collect_every(mut self, n: impl Into<Option<usize>>) -> Self {
        self.collect_every = n.into().filter(|&n| n > 0);
        self
    }

    /// Set the strategy used to release reclaimed versions.
    ///
    /// Default: [`HardFree`]
    ///
    /// 设置释放已回收版本所用的策略。
    #[inline]
    pub fn reclaimer<R2>(self, reclaimer: R2) -> ContainerBuilder<R2> {
        ContainerBuilder {
            collect_every: self.collect_every,
            reclaimer,
        }
    }

    /// Build the `TableContainer` around its first table version.
    /// 围绕第一个表版本构建 `TableContainer`。
    #[inline]
    pub fn build<E>(self, table: BucketTable<E>) -> TableContainer<E, R>
    where
        R: Reclaimer<E>,
    {
        TableContainer {
            state: Arc::new(ContainerState::new(
                table,
                self.reclaimer,
                self.collect_every,
            )),
        }
    }
}

/// The versioned storage of a concurrently resized hash table.
///
/// `TableContainer` tracks every table version that has not been reclaimed
/// yet, the thread registrations, and the reclamation floor. It manages:
/// - Registration of participating threads.
/// - Publication of new table versions by the resize path.
/// - Collection of versions no registered thread can still reach.
///
/// `TableContainer` is `Clone` and can be safely shared across threads.
/// Typically, you create one container at startup and clone it to threads
/// that need it.
///
/// **Typical Usage**:
/// ```
/// use version_epoch::{BucketTable, TableContainer};
///
/// let container = TableContainer::new(BucketTable::<u64>::with_buckets(4));
///
/// // Worker threads: register once, pin per operation
/// let handle = container.register_thread(0).unwrap();
/// {
///     let guard = handle.pin();
///     assert_eq!(guard.version(), 0);
/// }
///
/// // Resize path: publish a bigger table
/// let version = container.retire_version(BucketTable::with_buckets(8));
/// assert_eq!(version, 1);
///
/// // Version 0 is reclaimed once the worker has moved on
/// let _guard = handle.pin();
/// assert_eq!(container.collect().unwrap().reclaimed(), 1);
/// ```
///
/// 并发扩容哈希表的版本化存储。
///
/// `TableContainer` 跟踪所有尚未回收的表版本、线程注册和回收下界。它管理：
/// - 参与线程的注册。
/// - 扩容路径发布新的表版本。
/// - 回收任何已注册线程都无法再访问的版本。
///
/// `TableContainer` 是 `Clone` 的，可以安全地在线程间共享。
/// 通常，你在启动时创建一个容器并将其克隆到需要它的线程。
pub struct TableContainer<E, R: Reclaimer<E> = HardFree> {
    state: Arc<ContainerState<E, R>>,
}

impl<E, R: Reclaimer<E>> Clone for TableContainer<E, R> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<E> TableContainer<E, HardFree> {
    /// Create a container with default settings around its first table.
    /// 使用默认设置围绕第一个表创建容器。
    #[inline]
    pub fn new(table: BucketTable<E>) -> Self {
        Self::builder().build(table)
    }

    /// Create a builder for configuring the container.
    ///
    /// The entry type cannot be inferred from this call alone; write
    /// `TableContainer::<E>::builder()` or use `ContainerBuilder::new()`.
    ///
    /// 创建一个用于配置容器的构建器。
    #[inline]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }
}

impl<E, R: Reclaimer<E>> TableContainer<E, R> {
    /// Register the calling thread.
    ///
    /// Allocates a cache-line aligned epoch record starting at the current
    /// version and links it into the registry without taking a lock. Returns
    /// an `EpochHandle` that should be kept by the thread for its lifetime.
    ///
    /// # Errors
    /// `Error::OutOfMemory` if the record cannot be allocated. The thread must
    /// not touch the table without a registration.
    ///
    /// 注册调用线程。
    ///
    /// 分配一个从当前版本开始的缓存行对齐纪元记录，并以无锁方式链接进注册表。
    /// 返回一个应由线程在其生命周期内持有的 `EpochHandle`。
    pub fn register_thread(&self, thread_id: usize) -> Result<EpochHandle<E, R>> {
        let version = self.state.current_version();
        let record = self.state.registry.register(thread_id, version)?;
        debug!("registered thread {} at version {}", thread_id, version);
        Ok(EpochHandle::new(self.state.clone(), record))
    }

    /// Publish `table` as the new current version.
    ///
    /// Called by the resize path. The new version is linked after the newest
    /// one and made current atomically; its predecessor becomes eligible for
    /// reclamation once no thread uses it. May run a conditional collection,
    /// see `ContainerBuilder::collect_every`.
    ///
    /// Returns the version number assigned to `table`.
    ///
    /// 将 `table` 发布为新的当前版本。
    ///
    /// 由扩容路径调用。新版本被链接到最新版本之后并原子地成为当前版本；
    /// 一旦没有线程使用其前驱，前驱就可以被回收。可能会执行一次有条件回收，
    /// 参见 `ContainerBuilder::collect_every`。
    ///
    /// 返回分配给 `table` 的版本号。
    #[inline]
    pub fn retire_version(&self, table: BucketTable<E>) -> u64 {
        self.state.retire_version(table)
    }

    /// Reclaim every version older than the oldest version any registered
    /// thread has published.
    ///
    /// Never blocks: if another thread is already collecting this returns
    /// `Collected::AlreadyCollecting` immediately. Safe to call even if there
    /// is nothing to reclaim.
    ///
    /// # Errors
    /// `Error::Reclaim` if the reclaimer refused a version. Everything older
    /// than that version stays reclaimed; the version itself is retried on the
    /// next collection.
    ///
    /// 回收比任何已注册线程发布的最旧版本更旧的所有版本。
    ///
    /// 永不阻塞：如果另一个线程已经在回收，立即返回 `Collected::AlreadyCollecting`。
    /// 即使没有可回收的内容也可以安全调用。
    pub fn collect(&self) -> Result<Collected> {
        self.state.collect_with(CollectMode::Conditional)
    }

    /// Reclaim every version older than the current one, ignoring the
    /// versions published by registered threads.
    ///
    /// # Safety
    /// No other thread may hold a `VersionGuard` of this container or
    /// dereference any of its tables while this runs, e.g. during shutdown.
    ///
    /// 回收所有比当前版本更旧的版本，忽略已注册线程发布的版本。
    ///
    /// # Safety
    /// 运行期间不能有其他线程持有此容器的 `VersionGuard` 或解引用其任何表，
    /// 例如在关闭期间。
    pub unsafe fn collect_all(&self) -> Result<Collected> {
        self.state.collect_with(CollectMode::All)
    }

    /// Tear the container down: reclaim every version including the current
    /// one.
    ///
    /// Only succeeds when this is the last reference to the container, i.e.
    /// no clone and no `EpochHandle` is alive anywhere. Otherwise the
    /// container is handed back unchanged. Dropping the last reference tears
    /// down in the same way.
    ///
    /// Returns the number of versions freed.
    ///
    /// 拆除容器：回收包括当前版本在内的所有版本。
    ///
    /// 只有当这是容器的最后一个引用时才会成功，即任何地方都没有存活的克隆或
    /// `EpochHandle`。否则容器会被原样交还。丢弃最后一个引用会以同样方式拆除。
    ///
    /// 返回释放的版本数量。
    pub fn destroy(self) -> std::result::Result<usize, Self> {
        if Arc::strong_count(&self.state) != 1 {
            return Err(self);
        }
        Ok(self.state.teardown())
    }

    /// Version of the current table.
    #[inline]
    pub fn current_version(&self) -> u64 {
        self.state.current_version()
    }

    /// Every version below this one has been reclaimed.
    /// 低于此版本的所有版本都已被回收。
    #[inline]
    pub fn version_floor(&self) -> u64 {
        self.state.version_floor.load(Ordering::Acquire)
    }

    /// The floor a conditional collection started now would target.
    /// 现在开始的有条件回收将使用的目标下界。
    #[inline]
    pub fn safe_floor(&self) -> u64 {
        self.state.registry.safe_floor(self.current_version())
    }

    /// Number of versions not yet reclaimed, the current one included.
    #[inline]
    pub fn live_versions(&self) -> usize {
        self.state.chain.lock().len()
    }

    /// Versions not yet reclaimed, oldest first.
    /// 尚未回收的版本，从旧到新。
    pub fn chain_versions(&self) -> Vec<u64> {
        self.state.chain.lock().versions()
    }

    #[inline]
    pub fn registered_threads(&self) -> usize {
        self.state.registry.len()
    }

    /// The reclaimer this container was built with.
    #[inline]
    pub fn reclaimer(&self) -> &R {
        &self.state.reclaimer
    }
}

impl<E, R: Reclaimer<E>> std::fmt::Debug for TableContainer<E, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableContainer")
            .field("current_version", &self.current_version())
            .field("version_floor", &self.version_floor())
            .field("registered_threads", &self.registered_threads())
            .finish()
    }
}
