use chrono::{Duration as ChronoDuration, Utc};
use media_library_core::domain::{FileType, FileUpsert};
use media_library_core::{Database, LibraryError, LibraryResult};
use std::time::Duration;
use tempfile::TempDir;

async fn open(tmpdir: &TempDir) -> LibraryResult<Database> {
    Database::open_path(tmpdir.path().join("library.db")).await
}

async fn add(db: &Database, path: &str, file_type: FileType) -> LibraryResult<()> {
    db.upsert_file(&FileUpsert::new(path, file_type, 10, Utc::now()))
        .await?;
    Ok(())
}

async fn file_tag_links(db: &Database) -> LibraryResult<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM file_tags")
        .fetch_one(db.pool())
        .await?;
    Ok(count)
}

#[tokio::test]
async fn get_file_returns_enriched_row() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    add(&db, "music/live.mp4", FileType::Video).await?;
    db.tag_file("music/live.mp4", "concert").await?;

    let file = db.get_file("music/live.mp4").await?.unwrap();
    assert_eq!(file.name, "live.mp4");
    assert_eq!(file.file_type, FileType::Video);
    assert_eq!(file.tags, vec!["concert".to_string()]);
    assert!(!file.is_favorite);

    assert!(db.get_file("music/missing.mp4").await?.is_none());

    Ok(())
}

#[tokio::test]
async fn favorites_survive_their_file() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    add(&db, "a.jpg", FileType::Image).await?;

    assert!(db.add_favorite("a.jpg", "a.jpg").await?);
    assert!(!db.add_favorite("a.jpg", "a.jpg").await?);
    assert!(db.add_favorite("gone/b.mp4", "b.mp4").await?);

    let favorites = db.get_favorites().await?;
    assert_eq!(favorites.len(), 2);
    assert_eq!(favorites[0].file_type, Some(FileType::Image));
    assert_eq!(favorites[1].path, "gone/b.mp4");
    assert!(favorites[1].file_type.is_none());
    assert!(favorites[1].thumbnail_url.is_none());

    assert!(db.remove_favorite("a.jpg").await?);
    assert_eq!(db.get_favorites().await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn tags_are_counted_and_case_insensitive() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    add(&db, "a.jpg", FileType::Image).await?;
    add(&db, "b.jpg", FileType::Image).await?;

    db.create_tag("Beach", Some("#00aaff")).await?;
    db.tag_file("a.jpg", "beach").await?;
    db.tag_file("b.jpg", "BEACH").await?;
    db.tag_file("b.jpg", "night").await?;

    let tags = db.get_all_tags_with_counts().await?;
    let summary: Vec<(&str, i64)> = tags.iter().map(|t| (t.name.as_str(), t.item_count)).collect();
    assert_eq!(summary, vec![("Beach", 2), ("night", 1)]);
    assert_eq!(tags[0].color.as_deref(), Some("#00aaff"));

    assert!(db.untag_file("b.jpg", "night").await?);
    assert!(db.delete_tag("beach").await?);
    assert!(db.get_all_tags_with_counts().await?.iter().all(|t| t.item_count == 0));
    assert_eq!(file_tag_links(&db).await?, 0);

    Ok(())
}

#[tokio::test]
async fn invalid_tag_names_are_rejected() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;

    let err = db.create_tag("   ", None).await.unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)));

    let err = db.create_tag("a\u{1f}b", None).await.unwrap_err();
    assert!(matches!(err, LibraryError::InvalidInput(_)));

    Ok(())
}

#[tokio::test]
async fn files_by_tag_prunes_orphaned_links_in_background() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    add(&db, "kept.jpg", FileType::Image).await?;
    db.tag_file("kept.jpg", "trip").await?;
    // Tagged path that the crawler never indexed
    db.tag_file("ghost.jpg", "trip").await?;
    assert_eq!(file_tag_links(&db).await?, 2);

    let result = db.get_files_by_tag("trip", 1, 10).await?;
    assert_eq!(result.total_items, 1);
    assert_eq!(result.items[0].path, "kept.jpg");
    assert_eq!(result.query, "tag:trip");

    let mut links = file_tag_links(&db).await?;
    for _ in 0..50 {
        if links == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        links = file_tag_links(&db).await?;
    }
    assert_eq!(links, 1);

    Ok(())
}

#[tokio::test]
async fn change_feeds_report_content_updates() -> LibraryResult<()> {
    let tmpdir = TempDir::new().unwrap();
    let db = open(&tmpdir).await?;
    add(&db, "trips", FileType::Folder).await?;
    add(&db, "trips/old.jpg", FileType::Image).await?;
    add(&db, "home", FileType::Folder).await?;

    tokio::time::sleep(Duration::from_millis(20)).await;
    let since = Utc::now();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let changed = FileUpsert::new(
        "trips/new.jpg",
        FileType::Image,
        99,
        Utc::now() - ChronoDuration::minutes(1),
    );
    db.upsert_file(&changed).await?;

    let updated = db.get_files_updated_since(since).await?;
    let paths: Vec<&str> = updated.iter().map(|f| f.path.as_str()).collect();
    assert_eq!(paths, vec!["trips/new.jpg"]);

    let folders = db.get_folders_with_updated_contents(since).await?;
    assert_eq!(folders, vec!["trips".to_string()]);

    let indexed = db.get_all_indexed_paths().await?;
    assert_eq!(indexed.len(), 4);
    assert!(indexed.contains("home"));

    Ok(())
}
