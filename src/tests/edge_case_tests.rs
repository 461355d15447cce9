/// 边界情况测试模块
/// 测试无操作回收、回收失败、版本钳制和长溢出链
use super::{FlakyReclaimer, tagged};
use crate::{BucketTable, Collected, ContainerBuilder, Error, TableContainer};

/// 测试1: 只有当前版本时无可回收内容
#[test]
fn test_nothing_to_collect_on_fresh_container() {
    let container = TableContainer::new(BucketTable::<u64>::with_buckets(2));

    assert_eq!(container.collect().unwrap(), Collected::NothingToCollect);
    assert_eq!(container.collect().unwrap().reclaimed(), 0);
}

/// 测试2: 下界等于当前版本时回收是幂等的
#[test]
fn test_collect_is_idempotent_at_current_version() {
    let container = ContainerBuilder::new().collect_every(None).build(tagged(0));
    let handle = container.register_thread(0).unwrap();
    container.retire_version(tagged(1));
    container.retire_version(tagged(2));
    handle.publish_version(2);

    assert_eq!(container.collect().unwrap(), Collected::Reclaimed(2));
    let floor = container.version_floor();
    let chain = container.chain_versions();

    for _ in 0..3 {
        assert_eq!(container.collect().unwrap(), Collected::NothingToCollect);
        assert_eq!(container.version_floor(), floor);
        assert_eq!(container.chain_versions(), chain);
        assert_eq!(handle.published_version(), 2);
    }
}

/// 测试3: "没有新内容" 与 "别人已经推进得更远" 都是无操作
#[test]
fn test_floor_already_past_target_is_noop() {
    let container = ContainerBuilder::new().collect_every(None).build(tagged(0));
    let slow = container.register_thread(0).unwrap();
    for version in 1..=4 {
        container.retire_version(tagged(version));
    }

    // 无条件回收把下界推进到 4
    unsafe { container.collect_all() }.unwrap();
    assert_eq!(container.version_floor(), 4);

    // 慢线程仍记录版本 0，安全下界为 0 < 下界 4
    assert_eq!(slow.published_version(), 0);
    assert_eq!(container.safe_floor(), 0);
    container.retire_version(tagged(5));
    assert_eq!(container.collect().unwrap(), Collected::NothingToCollect);
    assert_eq!(container.chain_versions(), vec![4, 5]);
    assert_eq!(container.version_floor(), 4);
}

/// 测试4: 回收器失败时保留已完成的进度，之后可以重试
#[test]
fn test_reclaim_failure_is_restartable() {
    let container = ContainerBuilder::new()
        .collect_every(None)
        .reclaimer(FlakyReclaimer::default())
        .build(tagged(0));
    for version in 1..=5 {
        container.retire_version(tagged(version));
    }
    container.reclaimer().refuse.lock().unwrap().insert(2);

    let err = container.collect().unwrap_err();
    match err {
        Error::Reclaim {
            version, reclaimed, ..
        } => {
            assert_eq!(version, 2);
            assert_eq!(reclaimed, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(container.version_floor(), 2);
    assert_eq!(container.chain_versions(), vec![2, 3, 4, 5]);

    // 再次失败时状态不变
    assert!(container.collect().is_err());
    assert_eq!(container.chain_versions(), vec![2, 3, 4, 5]);

    container.reclaimer().refuse.lock().unwrap().clear();
    assert_eq!(container.collect().unwrap(), Collected::Reclaimed(3));
    assert_eq!(container.chain_versions(), vec![5]);
    assert_eq!(container.version_floor(), 5);
}

/// 测试5: 发布的版本不会超过当前版本
#[test]
fn test_publish_clamped_to_current_version() {
    let container = ContainerBuilder::new().collect_every(None).build(tagged(0));
    let handle = container.register_thread(0).unwrap();
    container.retire_version(tagged(1));

    handle.publish_version(1_000);
    assert_eq!(handle.published_version(), 1);
}

/// 测试6: 被钉住时发布不会越过钉住的版本
#[test]
fn test_publish_while_pinned_keeps_pinned_version() {
    let container = ContainerBuilder::new().collect_every(None).build(tagged(0));
    let handle = container.register_thread(0).unwrap();

    let guard = handle.pin();
    container.retire_version(tagged(1));
    container.retire_version(tagged(2));

    handle.publish_version(2);
    assert_eq!(handle.published_version(), 0);
    assert_eq!(container.collect().unwrap(), Collected::NothingToCollect);
    assert_eq!(guard.table().iter().next(), Some(&0));

    drop(guard);
    handle.publish_version(2);
    assert_eq!(handle.published_version(), 2);
    assert_eq!(container.collect().unwrap(), Collected::Reclaimed(2));
}

/// 测试7: 嵌套 pin 只有最外层发布
#[test]
fn test_nested_pin_publishes_once() {
    let container = ContainerBuilder::new().collect_every(None).build(tagged(0));
    let handle = container.register_thread(0).unwrap();

    let outer = handle.pin();
    container.retire_version(tagged(1));
    let inner = handle.pin();
    let cloned = inner.clone();

    assert_eq!(outer.version(), 0);
    assert_eq!(inner.version(), 1);
    assert_eq!(cloned.version(), 1);
    assert_eq!(handle.published_version(), 0);

    drop(outer);
    drop(inner);
    drop(cloned);

    let guard = handle.pin();
    assert_eq!(guard.version(), 1);
    assert_eq!(handle.published_version(), 1);
}

/// 测试8: collect_every(0) 等同于禁用自动回收
#[test]
fn test_collect_every_zero_disables_auto_collection() {
    let container = ContainerBuilder::new().collect_every(0).build(tagged(0));
    for version in 1..=10 {
        container.retire_version(tagged(version));
    }
    assert_eq!(container.live_versions(), 11);
}

/// 测试9: 自动回收按间隔执行
#[test]
fn test_auto_collection_runs_every_n_retires() {
    let container = ContainerBuilder::new().collect_every(3).build(tagged(0));

    container.retire_version(tagged(1));
    container.retire_version(tagged(2));
    assert_eq!(container.live_versions(), 3);

    container.retire_version(tagged(3));
    assert_eq!(container.chain_versions(), vec![3]);
}

/// 测试10: 非常长的溢出链可以被释放而不会栈溢出
#[test]
fn test_long_overflow_chain_release() {
    let mut table = BucketTable::with_buckets(1);
    for i in 0..30_000u64 {
        table.insert(0, i);
    }
    assert_eq!(table.overflow_buckets(), 30_000 / crate::ENTRIES_PER_BUCKET - 1);

    let container = ContainerBuilder::new().collect_every(None).build(table);
    container.retire_version(BucketTable::with_buckets(1));
    assert_eq!(container.collect().unwrap(), Collected::Reclaimed(1));

    // 直接 drop 同样是迭代的
    let mut table = BucketTable::with_buckets(1);
    for i in 0..30_000u64 {
        table.insert(0, i);
    }
    drop(table);
}

/// 测试11: 拆除时回收器失败，返回值仍计入失败前已回收的版本
#[test]
fn test_destroy_counts_versions_swept_before_failure() {
    let container = ContainerBuilder::new()
        .collect_every(None)
        .reclaimer(FlakyReclaimer::default())
        .build(tagged(0));
    for version in 1..=3 {
        container.retire_version(tagged(version));
    }
    container.reclaimer().refuse.lock().unwrap().insert(2);

    // 版本 0、1 在无条件回收中释放，版本 2 被拒绝后直接 drop，版本 3 在最后释放
    assert_eq!(container.destroy().unwrap(), 4);
}
