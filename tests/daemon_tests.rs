use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use kvlog::daemon::CompactionDaemon;
use tempfile::tempdir;

#[test]
fn test_daemon_compacts_in_background() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let store = Arc::new(kvlog::Store::open(temp.path().join("kvlog.db"))?);

    for i in 0..100 {
        store.set("churn", format!("v{}", i).as_bytes())?;
    }
    let size_before = fs::metadata(store.path())?.len();

    let daemon = CompactionDaemon::start(Arc::clone(&store), Duration::from_millis(20));
    thread::sleep(Duration::from_millis(300));
    daemon.stop();

    let size_after = fs::metadata(store.path())?.len();
    assert!(
        size_after < size_before,
        "expected background compaction to shrink the log ({} -> {})",
        size_before,
        size_after
    );
    assert_eq!(store.get("churn")?, Some(b"v99".to_vec()));

    Ok(())
}

#[test]
fn test_writes_proceed_while_daemon_runs() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let store = Arc::new(kvlog::Store::open(temp.path().join("kvlog.db"))?);

    let daemon = CompactionDaemon::start(Arc::clone(&store), Duration::from_millis(10));
    for i in 0..200 {
        store.set(&format!("key{}", i % 10), format!("v{}", i).as_bytes())?;
    }
    daemon.stop();

    for i in 0..10 {
        let expected = format!("v{}", 190 + i).into_bytes();
        assert_eq!(store.get(&format!("key{}", i))?, Some(expected));
    }

    Ok(())
}

#[test]
fn test_stop_prevents_further_runs() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let store = Arc::new(kvlog::Store::open(temp.path().join("kvlog.db"))?);

    let daemon = CompactionDaemon::start(Arc::clone(&store), Duration::from_millis(10));
    daemon.stop();

    // Duplicates written after stop must stay on disk.
    store.set("key", b"first")?;
    store.set("key", b"second")?;
    let size = fs::metadata(store.path())?.len();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fs::metadata(store.path())?.len(), size);

    Ok(())
}

#[test]
fn test_daemon_survives_compaction_failures() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let path = temp.path().join("kvlog.db");
    let store = Arc::new(kvlog::Store::open(&path)?);
    store.set("a", b"1")?;

    // A directory squatting on the default side path makes every
    // compaction attempt fail.
    let side_path = temp.path().join("kvlog.db.compact");
    fs::create_dir(&side_path)?;

    let daemon = CompactionDaemon::start(Arc::clone(&store), Duration::from_millis(10));

    // Failures are reported through the error channel...
    let first = daemon.errors().recv_timeout(Duration::from_secs(5))?;
    assert!(matches!(first, kvlog::Error::Compaction(_)));

    // ...and the loop keeps going: another attempt, another error.
    let second = daemon.errors().recv_timeout(Duration::from_secs(5))?;
    assert!(matches!(second, kvlog::Error::Compaction(_)));

    // The store is untouched by the failed runs.
    assert_eq!(store.get("a")?, Some(b"1".to_vec()));

    // Once the obstacle is gone the schedule recovers on its own.
    fs::remove_dir(&side_path)?;
    store.set("a", b"2")?;
    store.set("a", b"3")?;
    thread::sleep(Duration::from_millis(200));
    daemon.stop();

    assert_eq!(store.get("a")?, Some(b"3".to_vec()));
    assert_eq!(store.items()?.len(), 1);

    Ok(())
}

#[test]
fn test_drop_stops_daemon() -> anyhow::Result<()> {
    let temp = tempdir()?;
    let store = Arc::new(kvlog::Store::open(temp.path().join("kvlog.db"))?);

    {
        let _daemon = CompactionDaemon::start(Arc::clone(&store), Duration::from_millis(10));
    }

    store.set("key", b"first")?;
    store.set("key", b"second")?;
    let size = fs::metadata(store.path())?.len();

    thread::sleep(Duration::from_millis(100));
    assert_eq!(fs::metadata(store.path())?.len(), size);

    Ok(())
}
