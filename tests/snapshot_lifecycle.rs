// tests/snapshot_lifecycle.rs
//
// Жизненный цикл снапшотов через SnapshotManager поверх MemEngine:
// - до первого set_committed_snapshot чтение majority: retryable ошибка;
// - committed snapshot видит состояние на момент захвата;
// - cleanup удаляет только то, что старше committed;
// - читатель, держащий Arc, переживает cleanup; view освобождается ровно один раз;
// - drop менеджера освобождает все views.
//
// Запуск:
//   cargo test --test snapshot_lifecycle -- --nocapture

use std::sync::Arc;
use std::thread;

use anyhow::{anyhow, Result};

use QuiverSnap::{MemEngine, SnapConfig, SnapError, SnapshotEngine, SnapshotManager, Timestamp};

fn ts(n: u64) -> Timestamp {
    Timestamp::from_u64(n)
}

fn setup(cfg: SnapConfig) -> (Arc<MemEngine>, SnapshotManager) {
    let mem = Arc::new(MemEngine::new());
    let engine: Arc<dyn SnapshotEngine> = mem.clone();
    (mem, SnapshotManager::new(engine, cfg))
}

#[test]
fn majority_read_before_first_commit_is_retryable() {
    let (_mem, mgr) = setup(SnapConfig::default());
    assert!(!mgr.have_committed_snapshot());

    let err = mgr.get_committed_snapshot().unwrap_err();
    assert_eq!(err, SnapError::ReadConcernMajorityNotAvailableYet);
    assert!(err.is_retryable());
    assert_eq!(
        mgr.committed_snapshot_name().unwrap_err(),
        SnapError::ReadConcernMajorityNotAvailableYet
    );
}

#[test]
fn committed_snapshot_reads_point_in_time() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default());
    mem.put(b"a", b"1");
    mgr.set_committed_snapshot(ts(10));
    mem.put(b"a", b"2");
    mem.delete(b"a");
    mem.put(b"b", b"x");

    let snap = mgr.get_committed_snapshot()?;
    assert_eq!(snap.name(), ts(10));
    assert_eq!(snap.get(b"a")?, Some(b"1".to_vec()));
    assert_eq!(snap.get(b"b")?, None);
    assert_eq!(mem.get(b"a"), None);
    assert_eq!(mgr.committed_snapshot_name()?, ts(10));
    Ok(())
}

#[test]
fn cleanup_keeps_committed_and_newer() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default());
    mgr.capture_snapshot(ts(5))?;
    mgr.capture_snapshot(ts(7))?;
    mgr.set_committed_snapshot(ts(20));
    mgr.capture_snapshot(ts(30))?;
    assert_eq!(mem.live_views(), 4);

    assert_eq!(mgr.cleanup_unneeded_snapshots(), 2);
    assert_eq!(mgr.status().snapshots, vec![ts(20), ts(30)]);
    assert_eq!(mem.live_views(), 2);

    // Повторная очистка без сдвига committed: no-op.
    assert_eq!(mgr.cleanup_unneeded_snapshots(), 0);

    // Сдвиг на уже зарегистрированный 30 не захватывает новый view.
    mgr.set_committed_snapshot(ts(30));
    assert_eq!(mem.live_views(), 2);
    assert_eq!(mgr.cleanup_unneeded_snapshots(), 1);
    assert_eq!(mgr.status().snapshots, vec![ts(30)]);
    assert_eq!(mem.live_views(), 1);
    Ok(())
}

#[test]
fn auto_cleanup_runs_on_advance() {
    let (mem, mgr) = setup(SnapConfig::default().with_auto_cleanup(true));
    for n in 1..=50 {
        mgr.set_committed_snapshot(ts(n));
    }
    assert_eq!(mgr.status().snapshots, vec![ts(50)]);
    assert!(!mgr.status().dirty);
    assert_eq!(mem.live_views(), 1);
    assert_eq!(mem.captured_total(), 50);
}

#[test]
fn same_timestamp_is_noop() {
    let (mem, mgr) = setup(SnapConfig::default());
    mgr.set_committed_snapshot(ts(3));
    mgr.set_committed_snapshot(ts(3));
    assert_eq!(mem.captured_total(), 1);
    assert_eq!(mgr.status().snapshots.len(), 1);
}

#[test]
#[should_panic(expected = "committed snapshot regression")]
fn committed_regression_panics() {
    let (_mem, mgr) = setup(SnapConfig::default());
    mgr.set_committed_snapshot(ts(9));
    mgr.set_committed_snapshot(ts(8));
}

#[test]
fn reader_outlives_cleanup_and_releases_once() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default());
    mem.put(b"k", b"old");
    mgr.set_committed_snapshot(ts(1));
    let held = mgr.get_committed_snapshot()?;

    mem.put(b"k", b"new");
    mgr.set_committed_snapshot(ts(2));
    assert_eq!(mgr.cleanup_unneeded_snapshots(), 1);

    // Запись удалена из реестра, но view жив, пока читатель держит Arc.
    assert_eq!(mgr.status().snapshots, vec![ts(2)]);
    assert_eq!(mem.live_views(), 2);
    assert_eq!(held.get(b"k")?, Some(b"old".to_vec()));

    let reader = thread::spawn(move || -> Result<Option<Vec<u8>>> { held.get(b"k") });
    let got = reader.join().map_err(|_| anyhow!("reader panicked"))??;
    assert_eq!(got, Some(b"old".to_vec()));

    assert_eq!(mem.live_views(), 1);
    assert_eq!(mem.released_total(), 1);
    Ok(())
}

#[test]
fn insert_at_existing_key_is_rejected_by_default() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default());
    let v1 = mem.capture_view();
    mgr.insert_snapshot(ts(4), v1)?;

    let v2 = mem.capture_view();
    let err = mgr.insert_snapshot(ts(4), v2).unwrap_err();
    assert_eq!(err, SnapError::SnapshotExists { ts: ts(4) });
    assert!(!err.is_retryable());

    // Отклонённый view освобождён, зарегистрированный: нет.
    assert_eq!(mem.live_views(), 1);
    assert_eq!(mem.view_seq(v1), Some(0));
    assert_eq!(mem.view_seq(v2), None);
    Ok(())
}

#[test]
fn insert_overwrite_releases_previous_view() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default().with_allow_overwrite(true));
    let v1 = mem.capture_view();
    mgr.insert_snapshot(ts(4), v1)?;
    mem.put(b"k", b"v");
    let v2 = mem.capture_view();
    mgr.insert_snapshot(ts(4), v2)?;

    assert_eq!(mem.live_views(), 1);
    assert_eq!(mem.view_seq(v1), None);

    mgr.set_committed_snapshot(ts(4));
    let snap = mgr.get_committed_snapshot()?;
    assert_eq!(snap.view(), v2);
    assert_eq!(snap.get(b"k")?, Some(b"v".to_vec()));
    Ok(())
}

#[test]
fn drop_all_forgets_committed() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default());
    mgr.set_committed_snapshot(ts(1));
    mgr.capture_snapshot(ts(2))?;
    assert_eq!(mgr.drop_all_snapshots(), 2);
    assert!(!mgr.have_committed_snapshot());
    assert!(mgr.get_committed_snapshot().is_err());
    assert_eq!(mem.live_views(), 0);

    // После drop_all допустим любой timestamp, в том числе меньший.
    mgr.set_committed_snapshot(ts(1));
    assert!(mgr.have_committed_snapshot());
    Ok(())
}

#[test]
fn dropping_manager_releases_every_view() -> Result<()> {
    let (mem, mgr) = setup(SnapConfig::default());
    mgr.set_committed_snapshot(ts(1));
    mgr.capture_snapshot(ts(2))?;
    mgr.capture_snapshot(ts(3))?;
    assert_eq!(mem.live_views(), 3);

    drop(mgr);
    assert_eq!(mem.live_views(), 0);
    assert_eq!(mem.captured_total(), mem.released_total());
    Ok(())
}
