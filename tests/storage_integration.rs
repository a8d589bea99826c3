use chrono::{Duration as ChronoDuration, Utc};
use media_library_core::domain::{FileType, FileUpsert, UpsertOutcome};
use media_library_core::search::SearchOptions;
use media_library_core::{Database, LibraryConfig, LibraryError, LibraryResult};
use std::time::Duration;
use tempfile::TempDir;

async fn open(tmpdir: &TempDir) -> LibraryResult<Database> {
    Database::open_path(tmpdir.path().join("library.db")).await
}

fn image(path: &str, size: i64) -> FileUpsert {
    let mod_time = Utc::now() - ChronoDuration::hours(1);
    FileUpsert::new(path, FileType::Image, size, mod_time)
}

#[tokio::test]
async fn open_creates_database_in_missing_directory() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("nested").join("state").join("library.db");

    let db = Database::open_path(&path).await?;
    assert!(path.exists());

    // Reopening runs migrations again without complaint
    db.close().await;
    let db = Database::open_path(&path).await?;
    assert!(db.get_all_indexed_paths().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn upsert_is_idempotent_for_unchanged_content() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    let file = image("trips/beach.jpg", 1024);

    assert_eq!(db.upsert_file(&file).await?, UpsertOutcome::Inserted);
    let first = db.get_file_timestamps("trips/beach.jpg").await?.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(db.upsert_file(&file).await?, UpsertOutcome::Touched);
    let second = db.get_file_timestamps("trips/beach.jpg").await?.unwrap();

    assert_eq!(first.content_updated_at, second.content_updated_at);
    assert!(second.updated_at > first.updated_at);

    Ok(())
}

#[tokio::test]
async fn upsert_moves_content_timestamp_when_size_changes() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    let file = image("trips/beach.jpg", 1024);

    db.upsert_file(&file).await?;
    let first = db.get_file_timestamps("trips/beach.jpg").await?.unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;

    let resized = FileUpsert {
        size: 4096,
        ..file.clone()
    };
    assert_eq!(db.upsert_file(&resized).await?, UpsertOutcome::ContentChanged);
    let second = db.get_file_timestamps("trips/beach.jpg").await?.unwrap();
    assert!(second.content_updated_at > first.content_updated_at);

    let stored = db.get_file("trips/beach.jpg").await?.unwrap();
    assert_eq!(stored.size, 4096);
    assert_eq!(stored.parent_path, "trips");

    Ok(())
}

#[tokio::test]
async fn missing_hash_keeps_stored_hash() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;

    let hashed = image("a.jpg", 10).with_hash("abc123");
    db.upsert_file(&hashed).await?;

    let unhashed = FileUpsert {
        file_hash: None,
        ..hashed
    };
    assert_eq!(db.upsert_file(&unhashed).await?, UpsertOutcome::Touched);

    let stored = db.get_file("a.jpg").await?.unwrap();
    assert_eq!(stored.file_hash.as_deref(), Some("abc123"));

    Ok(())
}

#[tokio::test]
async fn delete_missing_removes_files_not_seen_since_cutoff() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;

    db.upsert_file(&image("keep.jpg", 1)).await?;
    db.upsert_file(&image("gone.jpg", 1)).await?;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let cutoff = Utc::now();
    tokio::time::sleep(Duration::from_millis(20)).await;

    // A new scan only sees one of them
    db.upsert_file(&image("keep.jpg", 1)).await?;
    let removed = db.delete_missing(cutoff).await?;

    assert_eq!(removed, 1);
    let paths = db.get_all_indexed_paths().await?;
    assert!(paths.contains("keep.jpg"));
    assert!(!paths.contains("gone.jpg"));

    Ok(())
}

#[tokio::test]
async fn failed_batch_is_rolled_back() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;

    let mut batch = db.begin_batch().await?;
    batch.upsert_file(&image("first.jpg", 1)).await?;
    batch.upsert_file(&image("second.jpg", 1)).await?;

    let result = db
        .end_batch::<()>(batch, Err(LibraryError::InvalidInput("scan aborted".into())))
        .await;

    assert!(matches!(result, Err(LibraryError::InvalidInput(_))));
    assert!(db.get_file("first.jpg").await?.is_none());
    assert!(db.get_file("second.jpg").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn readers_wait_for_open_batch_and_see_only_committed_rows() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    db.upsert_file(&image("sunset_old.jpg", 1)).await?;

    let mut batch = db.begin_batch().await?;
    batch.upsert_file(&image("sunset_new.jpg", 1)).await?;

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.search(&SearchOptions::new("sunset")).await })
        })
        .collect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    for reader in &readers {
        assert!(!reader.is_finished(), "reader ran while a batch was open");
    }

    db.end_batch(batch, Ok(())).await?;

    for reader in readers {
        let result = reader.await.unwrap()?;
        assert_eq!(result.total_items, 2);
    }

    Ok(())
}

#[tokio::test]
async fn concurrent_readers_all_complete_without_a_batch() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    db.upsert_file(&image("sunset.jpg", 1)).await?;

    let readers: Vec<_> = (0..8)
        .map(|_| {
            let db = db.clone();
            tokio::spawn(async move { db.search(&SearchOptions::new("sunset")).await })
        })
        .collect();

    for reader in readers {
        let result = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader finished")
            .unwrap()?;
        assert_eq!(result.total_items, 1);
    }

    Ok(())
}

#[tokio::test]
async fn reads_time_out_behind_a_long_batch() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let config = LibraryConfig::new(tmpdir.path().join("library.db")).with_timeouts(
        Duration::from_millis(50),
        Duration::from_millis(50),
        Duration::from_millis(50),
    );
    let db = Database::open(config).await?;

    let batch = db.begin_batch().await?;
    let err = db.get_file("anything.jpg").await.unwrap_err();
    assert!(matches!(
        err,
        LibraryError::Timeout {
            operation: "get_file",
            ..
        }
    ));
    assert!(!err.is_storage());

    db.end_batch(batch, Ok(())).await?;
    assert!(db.get_file("anything.jpg").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn every_pooled_connection_has_mmap_disabled() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;

    // Hold several connections at once so the pool has to open new ones
    let mut conns = Vec::new();
    for _ in 0..3 {
        conns.push(db.pool().acquire().await?);
    }

    for conn in conns.iter_mut() {
        let mmap: i64 = sqlx::query_scalar("PRAGMA mmap_size")
            .fetch_one(&mut **conn)
            .await?;
        assert_eq!(mmap, 0);
    }

    Ok(())
}

#[tokio::test]
async fn storage_check_passes_on_healthy_files() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    db.upsert_file(&image("a.jpg", 1)).await?;

    let report = db.check_storage().await;
    assert!(report.is_ok(), "failures: {:?}", report.failures);
    assert!(report.checked.contains(&tmpdir.path().join("library.db")));

    let health = db.health();
    assert_eq!(health.health_checks, 1);
    assert_eq!(health.health_check_failures, 0);
    assert!(health.last_check_ok);

    Ok(())
}

#[tokio::test]
async fn storage_check_reports_missing_database_file() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;

    std::fs::remove_file(tmpdir.path().join("library.db"))?;

    let report = db.check_storage().await;
    assert!(!report.is_ok());
    assert!(!db.health().last_check_ok);
    assert_eq!(db.health().health_check_failures, 1);

    Ok(())
}

#[tokio::test]
async fn health_monitor_checks_periodically() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let config = LibraryConfig::new(tmpdir.path().join("library.db"))
        .with_health_check_interval(Duration::from_millis(20));
    let db = Database::open(config).await?;

    let monitor = db.spawn_health_monitor();
    tokio::time::sleep(Duration::from_millis(150)).await;
    monitor.abort();

    let health = db.health();
    assert!(health.health_checks >= 2, "checks: {}", health.health_checks);
    assert_eq!(health.health_check_failures, 0);
    assert!(health.last_check_ok);

    Ok(())
}
