use crate::config::Budget;
use crate::domain::{Favorite, FileTimestamps, FileType, MediaFile, PageRequest, Tag, millis_to_datetime};
use crate::error::{LibraryError, LibraryResult};
use crate::search::plan::SearchPlan;
use crate::search::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, SearchResult};
use crate::storage::Database;
use crate::storage::rows::{ENRICHMENT_JOINS, FILE_COLUMNS, FileRow, thumbnail_url};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

impl Database {
    /// A single enriched file by path.
    pub async fn get_file(&self, path: &str) -> LibraryResult<Option<MediaFile>> {
        self.bounded("get_file", Budget::Lookup, async {
            let _guard = self.read_guard().await;

            let row: Option<FileRow> = sqlx::query_as(&format!(
                "SELECT {FILE_COLUMNS} FROM files f{ENRICHMENT_JOINS} WHERE f.path = ? GROUP BY f.id"
            ))
            .bind(path)
            .fetch_optional(&self.pool)
            .await?;

            Ok(row.map(|row| row.into_media_file(&self.config().thumbnail_base)))
        })
        .await
    }

    pub async fn get_file_timestamps(&self, path: &str) -> LibraryResult<Option<FileTimestamps>> {
        self.bounded("get_file_timestamps", Budget::Lookup, async {
            let _guard = self.read_guard().await;

            let row: Option<(i64, i64)> =
                sqlx::query_as("SELECT updated_at, content_updated_at FROM files WHERE path = ?")
                    .bind(path)
                    .fetch_optional(&self.pool)
                    .await?;

            Ok(row.map(|(updated_at, content_updated_at)| FileTimestamps {
                updated_at: millis_to_datetime(updated_at),
                content_updated_at: millis_to_datetime(content_updated_at),
            }))
        })
        .await
    }

    pub async fn get_favorites(&self) -> LibraryResult<Vec<Favorite>> {
        self.bounded("get_favorites", Budget::Lookup, async {
            let _guard = self.read_guard().await;
            self.favorites_unlocked().await
        })
        .await
    }

    /// [`Database::get_favorites`] for callers already holding the read lock.
    pub(crate) async fn favorites_unlocked(&self) -> LibraryResult<Vec<Favorite>> {
        let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(
            "SELECT fav.path, fav.name, f.type
            FROM favorites fav
            LEFT JOIN files f ON f.path = fav.path
            ORDER BY fav.name COLLATE NOCASE, fav.path",
        )
        .fetch_all(&self.pool)
        .await?;

        let base = &self.config().thumbnail_base;
        Ok(rows
            .into_iter()
            .map(|(path, name, file_type)| {
                let file_type = file_type.as_deref().map(FileType::from_db);
                let thumbnail_url = file_type.and_then(|t| thumbnail_url(base, &path, t));
                Favorite {
                    path,
                    name,
                    file_type,
                    thumbnail_url,
                }
            })
            .collect())
    }

    /// Files carrying `tag`, paginated like search results.
    ///
    /// Tag links whose file is no longer indexed are pruned in the
    /// background when this notices them.
    pub async fn get_files_by_tag(
        &self,
        tag: &str,
        page: i64,
        page_size: i64,
    ) -> LibraryResult<SearchResult> {
        let page = PageRequest::clamp(page, page_size, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE);
        let tag = tag.trim().to_string();
        let label = format!("tag:{tag}");

        if tag.is_empty() {
            return Ok(SearchResult::empty(&label, page));
        }

        let included = vec![tag.clone()];
        let (result, orphans) = self
            .bounded("get_files_by_tag", Budget::Query, async {
                let _guard = self.read_guard().await;

                let plan = SearchPlan::tags_only(&included, &[], None);
                let result = self.run_plan(&plan, page, &label).await?;

                let orphans: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM file_tags ft
                    JOIN tags t ON t.id = ft.tag_id
                    WHERE t.name = ?
                    AND NOT EXISTS (SELECT 1 FROM files f WHERE f.path = ft.file_path)",
                )
                .bind(&tag)
                .fetch_one(&self.pool)
                .await?;

                Ok((result, orphans))
            })
            .await?;

        if orphans > 0 {
            self.spawn_cleanup("prune_tag_links", move |pool| async move {
                let res = sqlx::query(
                    "DELETE FROM file_tags
                    WHERE tag_id = (SELECT id FROM tags WHERE name = ?)
                    AND NOT EXISTS (SELECT 1 FROM files f WHERE f.path = file_tags.file_path)",
                )
                .bind(tag)
                .execute(&pool)
                .await?;
                Ok::<_, LibraryError>(res.rows_affected())
            });
        }

        Ok(result)
    }

    /// All tags with the number of files carrying each, by name.
    pub async fn get_all_tags_with_counts(&self) -> LibraryResult<Vec<Tag>> {
        self.bounded("get_all_tags_with_counts", Budget::Query, async {
            let _guard = self.read_guard().await;

            let tags: Vec<Tag> = sqlx::query_as(
                "SELECT t.id, t.name, t.color, COUNT(ft.file_path) AS item_count
                FROM tags t
                LEFT JOIN file_tags ft ON ft.tag_id = t.id
                GROUP BY t.id
                ORDER BY t.name COLLATE NOCASE",
            )
            .fetch_all(&self.pool)
            .await?;

            Ok(tags)
        })
        .await
    }

    /// Files whose content changed after `since`, oldest change first.
    pub async fn get_files_updated_since(
        &self,
        since: DateTime<Utc>,
    ) -> LibraryResult<Vec<MediaFile>> {
        self.bounded("get_files_updated_since", Budget::Scan, async {
            let _guard = self.read_guard().await;

            let rows: Vec<FileRow> = sqlx::query_as(&format!(
                "SELECT {FILE_COLUMNS} FROM files f{ENRICHMENT_JOINS}
                WHERE f.content_updated_at > ?
                GROUP BY f.id
                ORDER BY f.content_updated_at, f.id"
            ))
            .bind(since.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

            let base = &self.config().thumbnail_base;
            Ok(rows
                .into_iter()
                .map(|row| row.into_media_file(base))
                .collect())
        })
        .await
    }

    /// Paths of folders with at least one direct child whose content
    /// changed after `since`. Used to refresh folder thumbnails.
    pub async fn get_folders_with_updated_contents(
        &self,
        since: DateTime<Utc>,
    ) -> LibraryResult<Vec<String>> {
        self.bounded("get_folders_with_updated_contents", Budget::Scan, async {
            let _guard = self.read_guard().await;

            let paths: Vec<String> = sqlx::query_scalar(
                "SELECT f.path FROM files f
                WHERE f.type = 'folder'
                AND EXISTS (
                    SELECT 1 FROM files c
                    WHERE c.parent_path = f.path AND c.content_updated_at > ?
                )
                ORDER BY f.path",
            )
            .bind(since.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

            Ok(paths)
        })
        .await
    }

    /// Every indexed path, for finding thumbnails whose file is gone.
    pub async fn get_all_indexed_paths(&self) -> LibraryResult<HashSet<String>> {
        self.bounded("get_all_indexed_paths", Budget::Scan, async {
            let _guard = self.read_guard().await;

            let paths: Vec<String> = sqlx::query_scalar("SELECT path FROM files")
                .fetch_all(&self.pool)
                .await?;

            Ok(paths.into_iter().collect())
        })
        .await
    }
}
