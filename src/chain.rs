use crate::table::BucketTable;
use slotmap::{SlotMap, new_key_type};
use std::ptr::NonNull;

new_key_type! {
    /// Generation-checked handle of a node in the version chain.
    pub(crate) struct VersionKey;
}

/// One generation of the table.
///
/// Once a newer version becomes current, a `VersionedTable` is never mutated
/// again; it stays readable by in-flight operations until the collector proves
/// no thread can reach it.
///
/// 表的一个世代。
///
/// 一旦更新的版本成为当前版本，`VersionedTable` 就不再被修改；
/// 在回收器证明没有线程能访问它之前，它对进行中的操作保持可读。
pub struct VersionedTable<E> {
    version: u64,
    table: BucketTable<E>,
}

impl<E> VersionedTable<E> {
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn table(&self) -> &BucketTable<E> {
        &self.table
    }
}

impl<E> std::fmt::Debug for VersionedTable<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedTable")
            .field("version", &self.version)
            .field("table", &self.table)
            .finish()
    }
}

/// Arena slot. The table itself lives in its own heap allocation so that the
/// address handed to readers stays stable while the arena grows and while the
/// links of the slot are rewritten.
struct ChainNode<E> {
    table: NonNull<VersionedTable<E>>,
    newer: Option<VersionKey>,
    older: Option<VersionKey>,
}

// SAFETY: a node owns its `VersionedTable` exclusively; readers only ever get
// shared references, which requires `E: Sync`.
unsafe impl<E: Send + Sync> Send for ChainNode<E> {}

/// Oldest-to-newest spine of all table versions not yet reclaimed.
///
/// Neighbours are linked by [`VersionKey`] instead of raw pointers, so removing
/// a node can never leave a dangling neighbour link: a stale key simply misses
/// in the arena. The chain is only touched under the container's chain lock.
///
/// 所有尚未回收的表版本从旧到新的主干。
///
/// 相邻节点通过 [`VersionKey`] 而不是原始指针链接，因此移除节点
/// 永远不会留下悬空的邻居链接：过期的键只会在 arena 中查找失败。
/// 链只在容器的链锁下被访问。
pub(crate) struct VersionChain<E> {
    nodes: SlotMap<VersionKey, ChainNode<E>>,
    oldest: VersionKey,
    newest: VersionKey,
}

impl<E> VersionChain<E> {
    /// Start a chain with a single version. Returns the chain and the stable
    /// address of the table.
    pub(crate) fn new(version: u64, table: BucketTable<E>) -> (Self, NonNull<VersionedTable<E>>) {
        let mut nodes = SlotMap::with_key();
        let ptr = into_raw(VersionedTable { version, table });
        let key = nodes.insert(ChainNode {
            table: ptr,
            newer: None,
            older: None,
        });
        let chain = Self {
            nodes,
            oldest: key,
            newest: key,
        };
        (chain, ptr)
    }

    #[inline]
    fn node_version(&self, key: VersionKey) -> Option<u64> {
        // SAFETY: a table is owned by its node until the node is removed.
        self.nodes
            .get(key)
            .map(|node| unsafe { node.table.as_ref() }.version)
    }

    #[inline]
    pub(crate) fn oldest_version(&self) -> Option<u64> {
        self.node_version(self.oldest)
    }

    #[inline]
    pub(crate) fn newest_version(&self) -> Option<u64> {
        self.node_version(self.newest)
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Versions from oldest to newest, following the links.
    pub(crate) fn versions(&self) -> Vec<u64> {
        let mut versions = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.nodes.get(self.oldest).map(|_| self.oldest);
        while let Some(key) = cursor {
            let Some(node) = self.nodes.get(key) else {
                break;
            };
            // SAFETY: see `node_version`.
            versions.push(unsafe { node.table.as_ref() }.version);
            cursor = node.newer;
        }
        versions
    }

    /// Link `table` after the newest node with the next version number.
    /// Returns the assigned version and the stable address of the table.
    ///
    /// 将 `table` 以下一个版本号链接到最新节点之后。
    /// 返回分配的版本号和表的稳定地址。
    pub(crate) fn push_newest(&mut self, table: BucketTable<E>) -> (u64, NonNull<VersionedTable<E>>) {
        let version = self.newest_version().map_or(0, |newest| newest + 1);
        let ptr = into_raw(VersionedTable { version, table });
        let previous = self.nodes.contains_key(self.newest).then_some(self.newest);
        let key = self.nodes.insert(ChainNode {
            table: ptr,
            newer: None,
            older: previous,
        });

        match previous.and_then(|prev| self.nodes.get_mut(prev)) {
            Some(prev) => prev.newer = Some(key),
            None => self.oldest = key,
        }
        self.newest = key;

        (version, ptr)
    }

    /// Unlink and return the oldest version if it is strictly older than
    /// `floor`. The newest version is never unlinked here.
    ///
    /// 如果最旧版本严格早于 `floor`，断开并返回它。最新版本永远不会在此被断开。
    pub(crate) fn pop_oldest_below(&mut self, floor: u64) -> Option<Box<VersionedTable<E>>> {
        if self.oldest == self.newest || self.oldest_version()? >= floor {
            return None;
        }

        let node = self.nodes.remove(self.oldest)?;
        if let Some(newer) = node.newer {
            if let Some(next) = self.nodes.get_mut(newer) {
                next.older = None;
            }
            self.oldest = newer;
        }

        // SAFETY: the node owned the table and has just been removed from the
        // arena, so this is the only remaining owner.
        Some(unsafe { Box::from_raw(node.table.as_ptr()) })
    }

    /// Relink a version that was popped but could not be reclaimed as the new
    /// oldest node.
    ///
    /// 将已弹出但无法回收的版本重新链接为最旧节点。
    pub(crate) fn restore_oldest(&mut self, table: Box<VersionedTable<E>>) {
        let ptr = NonNull::from(Box::leak(table));
        let newer = self.nodes.contains_key(self.oldest).then_some(self.oldest);
        let key = self.nodes.insert(ChainNode {
            table: ptr,
            newer,
            older: None,
        });

        match newer.and_then(|next| self.nodes.get_mut(next)) {
            Some(next) => next.older = Some(key),
            None => self.newest = key,
        }
        self.oldest = key;
    }

    /// Unlink every version, oldest first. Only valid once no thread can
    /// reach any of them.
    pub(crate) fn drain(&mut self) -> Vec<Box<VersionedTable<E>>> {
        let mut tables = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.nodes.get(self.oldest).map(|_| self.oldest);
        while let Some(key) = cursor {
            let Some(node) = self.nodes.remove(key) else {
                break;
            };
            cursor = node.newer;
            // SAFETY: see `pop_oldest_below`.
            tables.push(unsafe { Box::from_raw(node.table.as_ptr()) });
        }
        tables
    }
}

impl<E> Drop for VersionChain<E> {
    fn drop(&mut self) {
        for (_, node) in self.nodes.drain() {
            // SAFETY: the arena is the last owner of every remaining table.
            drop(unsafe { Box::from_raw(node.table.as_ptr()) });
        }
    }
}

fn into_raw<E>(table: VersionedTable<E>) -> NonNull<VersionedTable<E>> {
    NonNull::from(Box::leak(Box::new(table)))
}

impl<E> VersionedTable<E> {
    /// Split into the version number and the storage handed to a reclaimer.
    pub(crate) fn into_parts(self) -> (u64, BucketTable<E>) {
        (self.version, self.table)
    }

    pub(crate) fn from_parts(version: u64, table: BucketTable<E>) -> Self {
        Self { version, table }
    }
}
