use crate::chain::{VersionChain, VersionedTable};
use crate::error::{Error, Result};
use crate::reclaim::Reclaimer;
use crate::registry::EpochRegistry;
use crate::sync::{AtomicBool, AtomicPtr, AtomicU64, Mutex, Ordering};
use crate::table::BucketTable;
use log::{debug, warn};
use std::ptr::{self, NonNull};
use std::time::Instant;

/// Default number of retired versions between automatic collections.
/// 两次自动回收之间退休版本的默认数量。
pub(crate) const DEFAULT_COLLECT_EVERY: usize = 4;

/// Version number of the table a container is built with.
/// 容器构建时表的版本号。
pub(crate) const INITIAL_VERSION: u64 = 0;

/// How the collector picks its target floor.
/// 回收器选择目标下界的方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CollectMode {
    /// Respect every registered thread's published version.
    Conditional,
    /// Reclaim everything older than the current version regardless of
    /// registered threads. Only sound when no other thread is active.
    All,
}

/// Outcome of a collection attempt.
///
/// Only `Reclaimed` means the collector ran a sweep. The other two are the
/// normal result of no-op or concurrent invocations, not errors.
///
/// 一次回收尝试的结果。
///
/// 只有 `Reclaimed` 表示回收器执行了清扫。另外两种是无操作
/// 或并发调用的正常结果，不是错误。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collected {
    /// A sweep ran and freed this many versions.
    /// 执行了清扫，释放了这么多个版本。
    Reclaimed(usize),
    /// The floor already covers every version that may be collected.
    /// 下界已经覆盖了所有可回收的版本。
    NothingToCollect,
    /// Another thread holds the reclaim gate.
    /// 另一个线程持有回收闸门。
    AlreadyCollecting,
}

impl Collected {
    /// Number of versions reclaimed by this call. Advisory only.
    /// 本次调用回收的版本数量。仅供参考。
    #[inline]
    pub fn reclaimed(&self) -> usize {
        match self {
            Collected::Reclaimed(count) => *count,
            Collected::NothingToCollect | Collected::AlreadyCollecting => 0,
        }
    }
}

/// Non-blocking mutual exclusion for sweeps.
#[derive(Debug)]
struct ReclaimGate {
    held: AtomicBool,
}

impl ReclaimGate {
    fn new() -> Self {
        Self {
            held: AtomicBool::new(false),
        }
    }

    #[inline]
    fn try_acquire(&self) -> Option<GateGuard<'_>> {
        self.held
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| GateGuard { gate: self })
    }
}

struct GateGuard<'a> {
    gate: &'a ReclaimGate,
}

impl Drop for GateGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.gate.held.store(false, Ordering::Release);
    }
}

/// Shared state of one table container.
///
/// `current` and `current_version` always describe the newest version; the
/// chain (behind its lock) owns every version not yet reclaimed, except those a
/// running sweep has unlinked;
/// `version_floor` equals the oldest chain version whenever no sweep runs.
///
/// 一个表容器的共享状态。
///
/// `current` 和 `current_version` 始终描述最新版本；链（在其锁之后）
/// 拥有所有尚未回收的版本，正在进行的清扫已断开的版本除外；没有清扫进行时，`version_floor` 等于链中最旧的版本。
#[repr(align(64))]
pub(crate) struct ContainerState<E, R: Reclaimer<E>> {
    /// Newest table, the one new operations target.
    /// 最新的表，新操作的目标。
    pub(crate) current: AtomicPtr<VersionedTable<E>>,
    /// Version of `current`, readable without dereferencing it.
    /// `current` 的版本，无需解引用即可读取。
    pub(crate) current_version: AtomicU64,
    /// Everything below this version has been reclaimed.
    /// 低于此版本的所有内容都已被回收。
    pub(crate) version_floor: AtomicU64,
    pub(crate) registry: EpochRegistry,
    pub(crate) chain: Mutex<VersionChain<E>>,
    gate: ReclaimGate,
    pub(crate) reclaimer: R,
    collect_every: Option<usize>,
    retired: AtomicU64,
}

impl<E, R: Reclaimer<E>> ContainerState<E, R> {
    pub(crate) fn new(table: BucketTable<E>, reclaimer: R, collect_every: Option<usize>) -> Self {
        let (chain, current) = VersionChain::new(INITIAL_VERSION, table);
        Self {
            current: AtomicPtr::new(current.as_ptr()),
            current_version: AtomicU64::new(INITIAL_VERSION),
            version_floor: AtomicU64::new(INITIAL_VERSION),
            registry: EpochRegistry::new(),
            chain: Mutex::new(chain),
            gate: ReclaimGate::new(),
            reclaimer,
            collect_every,
            retired: AtomicU64::new(0),
        }
    }

    #[inline]
    pub(crate) fn current_version(&self) -> u64 {
        self.current_version.load(Ordering::Acquire)
    }

    /// Load the current table pointer.
    ///
    /// Dereferencing it is only sound for a caller whose published version is
    /// not newer than the version of the loaded table; see `EpochHandle::pin`.
    #[inline]
    pub(crate) fn load_current(&self) -> NonNull<VersionedTable<E>> {
        let ptr = self.current.load(Ordering::Acquire);
        debug_assert!(!ptr.is_null(), "BUG: current table loaded after teardown");
        // SAFETY: only teardown nulls `current`, and it runs with exclusive access.
        unsafe { NonNull::new_unchecked(ptr) }
    }

    /// Publish `table` as the new current version and link it into the chain.
    ///
    /// The version number is assigned under the chain lock, so concurrent
    /// resizers still produce a gap-free, strictly increasing chain.
    ///
    /// 将 `table` 发布为新的当前版本并链接进链中。
    /// 版本号在链锁下分配，因此并发的扩容者仍然产生无间隙、严格递增的链。
    pub(crate) fn retire_version(&self, table: BucketTable<E>) -> u64 {
        let version = {
            let mut chain = self.chain.lock();
            let (version, ptr) = chain.push_newest(table);
            self.current.store(ptr.as_ptr(), Ordering::Release);
            self.current_version.store(version, Ordering::Release);
            version
        };

        let retired = self.retired.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(every) = self.collect_every {
            if retired % every as u64 == 0 {
                if let Err(err) = self.collect_with(CollectMode::Conditional) {
                    warn!("automatic collection after version {} failed: {}", version, err);
                }
            }
        }

        version
    }

    /// Run one collection cycle.
    ///
    /// `Idle -> Scanning -> Sweeping -> Idle`. The gate is acquired without
    /// blocking. The chain lock is only held to unlink the versions below the
    /// target; the reclaimer runs without it, so resizes never wait for a
    /// sweep. The floor is updated before the gate is released. If the
    /// reclaimer fails on a version, the versions swept before it stay
    /// reclaimed, the failing one and every later unlinked one are relinked in
    /// version order, and the error is returned.
    ///
    /// 执行一次回收周期。
    ///
    /// `Idle -> Scanning -> Sweeping -> Idle`。闸门以非阻塞方式获取。
    /// 链锁只在断开低于目标的版本时持有；回收器在锁外运行，因此扩容永远不会等待清扫。
    /// 下界在释放闸门之前更新。如果回收器在某个版本上失败，之前清扫的版本保持已回收，
    /// 失败的版本及之后断开的版本按版本顺序重新链接，并返回错误。
    pub(crate) fn collect_with(&self, mode: CollectMode) -> Result<Collected> {
        let current_version = self.current_version();
        if self.version_floor.load(Ordering::Acquire) >= current_version {
            return Ok(Collected::NothingToCollect);
        }

        let Some(_gate) = self.gate.try_acquire() else {
            return Ok(Collected::AlreadyCollecting);
        };

        // Scanning
        let target = match mode {
            CollectMode::Conditional => self.registry.safe_floor(current_version),
            CollectMode::All => current_version,
        };

        let floor = self.version_floor.load(Ordering::Acquire);
        if floor >= target {
            return Ok(Collected::NothingToCollect);
        }

        // Sweeping. Only the gate holder removes from the old end of the chain
        // and resizes only append, so `new_floor` stays the oldest version
        // until this sweep relinks something.
        let started = Instant::now();
        let (unlinked, new_floor) = {
            let mut chain = self.chain.lock();
            let mut unlinked = Vec::new();
            while let Some(node) = chain.pop_oldest_below(target) {
                unlinked.push(node);
            }
            (unlinked, chain.oldest_version())
        };

        let mut reclaimed = 0;
        let mut failed = None;
        let mut nodes = unlinked.into_iter();
        for node in nodes.by_ref() {
            let (version, table) = node.into_parts();
            match self.reclaimer.reclaim(table) {
                Ok(_) => reclaimed += 1,
                Err(failure) => {
                    failed = Some((version, failure));
                    break;
                }
            }
        }

        let outcome = match failed {
            None => {
                if let Some(oldest) = new_floor {
                    self.version_floor.store(oldest, Ordering::Release);
                }
                Ok(Collected::Reclaimed(reclaimed))
            }
            Some((version, failure)) => {
                warn!(
                    "reclaimer failed on table version {}: {}",
                    version, failure.reason
                );
                let mut chain = self.chain.lock();
                for node in nodes.rev() {
                    chain.restore_oldest(node);
                }
                chain.restore_oldest(Box::new(VersionedTable::from_parts(
                    version,
                    failure.table,
                )));
                if let Some(oldest) = chain.oldest_version() {
                    self.version_floor.store(oldest, Ordering::Release);
                }
                Err(Error::Reclaim {
                    version,
                    reclaimed,
                    reason: failure.reason,
                })
            }
        };

        debug!(
            "collected {} versions in [{}, {}) (current {}) in {:?}",
            reclaimed,
            floor,
            target,
            current_version,
            started.elapsed()
        );

        outcome
    }

    /// Free every version, including the current one.
    ///
    /// Requires that no other thread can reach the container anymore. Safe to
    /// call repeatedly; later calls find nothing left. Returns the number of
    /// versions freed.
    ///
    /// 释放所有版本，包括当前版本。
    /// 要求不再有其他线程能访问容器。可以重复调用；之后的调用不会找到任何内容。
    /// 返回释放的版本数量。
    pub(crate) fn teardown(&self) -> usize {
        let mut freed = match self.collect_with(CollectMode::All) {
            Ok(collected) => collected.reclaimed(),
            Err(err) => {
                warn!("unconditional collection during teardown failed: {}", err);
                match err {
                    Error::Reclaim { reclaimed, .. } => reclaimed,
                    Error::OutOfMemory { .. } => 0,
                }
            }
        };

        let remaining = self.chain.lock().drain();
        if remaining.is_empty() {
            return freed;
        }
        self.current.store(ptr::null_mut(), Ordering::Release);

        for node in remaining {
            let (version, table) = node.into_parts();
            if let Err(failure) = self.reclaimer.reclaim(table) {
                warn!(
                    "reclaimer failed on table version {} during teardown, dropping it: {}",
                    version, failure.reason
                );
                drop(failure.table);
            }
            freed += 1;
        }

        debug!("container torn down, {} versions freed", freed);
        freed
    }
}

impl<E, R: Reclaimer<E>> Drop for ContainerState<E, R> {
    fn drop(&mut self) {
        self.teardown();
    }
}
