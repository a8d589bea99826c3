use super::Database;
use crate::config::Budget;
use crate::domain::{FileUpsert, UpsertOutcome};
use crate::error::{LibraryError, LibraryResult};
use chrono::{DateTime, Utc};
use sqlx::{Row, Sqlite, Transaction};
use std::time::Instant;
use tokio::sync::OwnedRwLockWriteGuard;
use tracing::{debug, warn};
use uuid::Uuid;

/// A write transaction holding the exclusive side of the database lock.
///
/// Obtained from [`Database::begin_batch`] and finished with
/// [`Database::end_batch`]. Readers wait until the batch ends, so none of
/// them observe a partially applied batch. Dropping a batch without ending
/// it rolls the transaction back.
pub struct Batch {
    id: Uuid,
    started: Instant,
    tx: Transaction<'static, Sqlite>,
    guard: OwnedRwLockWriteGuard<()>,
}

impl Database {
    /// Waits for exclusive access and opens a transaction.
    pub async fn begin_batch(&self) -> LibraryResult<Batch> {
        let lock = self.lock.clone();
        self.bounded("begin_batch", Budget::Query, async move {
            let guard = lock.write_owned().await;
            let tx = self.pool.begin().await?;
            let id = Uuid::new_v4();
            debug!(batch = %id, "batch started");

            Ok(Batch {
                id,
                started: Instant::now(),
                tx,
                guard,
            })
        })
        .await
    }

    /// Commits the batch if `outcome` is `Ok`, otherwise rolls it back.
    ///
    /// A failed rollback is reported together with the error that caused it
    /// as [`LibraryError::Rollback`]. Nothing is retried.
    pub async fn end_batch<T>(&self, batch: Batch, outcome: LibraryResult<T>) -> LibraryResult<T> {
        let Batch {
            id,
            started,
            tx,
            guard,
        } = batch;

        let result = match outcome {
            Ok(value) => match tx.commit().await {
                Ok(()) => {
                    debug!(
                        batch = %id,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "batch committed"
                    );
                    Ok(value)
                }
                Err(err) => Err(LibraryError::from(err)),
            },
            Err(err) => {
                warn!(batch = %id, error = %err, "rolling back batch");
                match tx.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback) => Err(LibraryError::Rollback {
                        source: Box::new(err),
                        rollback,
                    }),
                }
            }
        };
        drop(guard);

        if let Err(err) = &result {
            self.observe_error("end_batch", err);
        }
        result
    }

    /// Upserts one file in its own batch.
    pub async fn upsert_file(&self, file: &FileUpsert) -> LibraryResult<UpsertOutcome> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.upsert_file(file).await;
        self.end_batch(batch, outcome).await
    }

    /// Removes files last seen before `cutoff` in its own batch.
    pub async fn delete_missing(&self, cutoff: DateTime<Utc>) -> LibraryResult<u64> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.delete_missing(cutoff).await;
        self.end_batch(batch, outcome).await
    }

    pub async fn add_favorite(&self, path: &str, name: &str) -> LibraryResult<bool> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.add_favorite(path, name).await;
        self.end_batch(batch, outcome).await
    }

    pub async fn remove_favorite(&self, path: &str) -> LibraryResult<bool> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.remove_favorite(path).await;
        self.end_batch(batch, outcome).await
    }

    pub async fn create_tag(&self, name: &str, color: Option<&str>) -> LibraryResult<i64> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.create_tag(name, color).await;
        self.end_batch(batch, outcome).await
    }

    pub async fn delete_tag(&self, name: &str) -> LibraryResult<bool> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.delete_tag(name).await;
        self.end_batch(batch, outcome).await
    }

    pub async fn tag_file(&self, path: &str, tag: &str) -> LibraryResult<bool> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.tag_file(path, tag).await;
        self.end_batch(batch, outcome).await
    }

    pub async fn untag_file(&self, path: &str, tag: &str) -> LibraryResult<bool> {
        let mut batch = self.begin_batch().await?;
        let outcome = batch.untag_file(path, tag).await;
        self.end_batch(batch, outcome).await
    }
}

impl Batch {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Inserts or updates the row for `file.path`.
    ///
    /// `updated_at` always moves to now. `content_updated_at` moves only
    /// when size, type, modification time, or hash differ from the stored
    /// row. A missing hash keeps the stored one.
    pub async fn upsert_file(&mut self, file: &FileUpsert) -> LibraryResult<UpsertOutcome> {
        let now = Utc::now().timestamp_millis();
        let mod_time = file.mod_time.timestamp_millis();

        let existing =
            sqlx::query("SELECT size, mod_time, type, file_hash FROM files WHERE path = ?")
                .bind(&file.path)
                .fetch_optional(&mut *self.tx)
                .await?;

        let outcome = match existing {
            None => UpsertOutcome::Inserted,
            Some(row) => {
                let size: i64 = row.get(0);
                let stored_mod_time: i64 = row.get(1);
                let stored_type: String = row.get(2);
                let stored_hash: Option<String> = row.get(3);

                let hash_changed = match (&file.file_hash, &stored_hash) {
                    (Some(new), Some(old)) => new != old,
                    (Some(_), None) => true,
                    (None, _) => false,
                };

                if size != file.size
                    || stored_mod_time != mod_time
                    || stored_type != file.file_type.as_str()
                    || hash_changed
                {
                    UpsertOutcome::ContentChanged
                } else {
                    UpsertOutcome::Touched
                }
            }
        };

        sqlx::query(
            "INSERT INTO files (name, path, parent_path, type, size, mod_time, mime_type, file_hash, updated_at, content_updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(path) DO UPDATE SET
                name = excluded.name,
                parent_path = excluded.parent_path,
                type = excluded.type,
                size = excluded.size,
                mod_time = excluded.mod_time,
                mime_type = excluded.mime_type,
                file_hash = COALESCE(excluded.file_hash, files.file_hash),
                updated_at = excluded.updated_at,
                content_updated_at = CASE WHEN ? THEN excluded.content_updated_at ELSE files.content_updated_at END",
        )
        .bind(&file.name)
        .bind(&file.path)
        .bind(&file.parent_path)
        .bind(file.file_type.as_str())
        .bind(file.size)
        .bind(mod_time)
        .bind(&file.mime_type)
        .bind(&file.file_hash)
        .bind(now)
        .bind(now)
        .bind(outcome != UpsertOutcome::Touched)
        .execute(&mut *self.tx)
        .await?;

        Ok(outcome)
    }

    /// Deletes files whose "last seen" timestamp predates `cutoff`.
    pub async fn delete_missing(&mut self, cutoff: DateTime<Utc>) -> LibraryResult<u64> {
        let res = sqlx::query("DELETE FROM files WHERE updated_at < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&mut *self.tx)
            .await?;

        debug!(batch = %self.id, removed = res.rows_affected(), "deleted missing files");
        Ok(res.rows_affected())
    }

    /// Returns `false` if the path was already a favorite.
    pub async fn add_favorite(&mut self, path: &str, name: &str) -> LibraryResult<bool> {
        let res = sqlx::query(
            "INSERT INTO favorites (path, name, created_at) VALUES (?, ?, ?)
            ON CONFLICT(path) DO NOTHING",
        )
        .bind(path)
        .bind(name)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *self.tx)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    pub async fn remove_favorite(&mut self, path: &str) -> LibraryResult<bool> {
        let res = sqlx::query("DELETE FROM favorites WHERE path = ?")
            .bind(path)
            .execute(&mut *self.tx)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    /// Creates a tag, or updates the color of an existing one with the same
    /// name (compared case-insensitively). Returns the tag id.
    pub async fn create_tag(&mut self, name: &str, color: Option<&str>) -> LibraryResult<i64> {
        let name = valid_tag_name(name)?;

        let row = sqlx::query(
            "INSERT INTO tags (name, color, created_at) VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET color = COALESCE(excluded.color, tags.color)
            RETURNING id",
        )
        .bind(name)
        .bind(color)
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.get(0))
    }

    /// Deletes a tag. Its file links go with it.
    pub async fn delete_tag(&mut self, name: &str) -> LibraryResult<bool> {
        let res = sqlx::query("DELETE FROM tags WHERE name = ?")
            .bind(name.trim())
            .execute(&mut *self.tx)
            .await?;

        Ok(res.rows_affected() > 0)
    }

    /// Tags `path`, creating the tag on first use. Returns `false` if the
    /// link already existed.
    pub async fn tag_file(&mut self, path: &str, tag: &str) -> LibraryResult<bool> {
        let tag_id = self.create_tag(tag, None).await?;

        let res = sqlx::query(
            "INSERT INTO file_tags (file_path, tag_id, created_at) VALUES (?, ?, ?)
            ON CONFLICT(file_path, tag_id) DO NOTHING",
        )
        .bind(path)
        .bind(tag_id)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *self.tx)
        .await?;

        Ok(res.rows_affected() > 0)
    }

    pub async fn untag_file(&mut self, path: &str, tag: &str) -> LibraryResult<bool> {
        let res = sqlx::query(
            "DELETE FROM file_tags
            WHERE file_path = ? AND tag_id = (SELECT id FROM tags WHERE name = ?)",
        )
        .bind(path)
        .bind(tag.trim())
        .execute(&mut *self.tx)
        .await?;

        Ok(res.rows_affected() > 0)
    }
}

fn valid_tag_name(name: &str) -> LibraryResult<&str> {
    let trimmed = name.trim();

    if trimmed.is_empty() {
        return Err(LibraryError::InvalidInput("tag name cannot be empty".into()));
    }

    if trimmed.contains(super::rows::TAG_SEPARATOR) {
        return Err(LibraryError::InvalidInput(
            "tag name contains a control character".into(),
        ));
    }

    Ok(trimmed)
}
