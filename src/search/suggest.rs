//! Autocomplete for the search box.
//!
//! The raw input is first classified by what the user seems to be typing:
//! an exclusion (`-`, `NOT tag:`), an inclusion (`tag:`), or plain text.
//! Tag states list or filter tags; plain text mixes tag names with
//! full-text file-name matches.

use super::highlight::highlight;
use super::plan::{fts_phrase, like_pattern};
use super::query::strip_prefix_ci;
use crate::config::Budget;
use crate::domain::FileType;
use crate::error::LibraryResult;
use crate::storage::Database;
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use tracing::warn;

pub const DEFAULT_SUGGESTIONS: i64 = 10;
pub const MAX_SUGGESTIONS: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionKind {
    Tag,
    TagExclude,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    /// For files the file path; for tags the query token to insert,
    /// e.g. `tag:beach` or `-tag:beach`.
    pub path: String,
    pub name: String,
    pub kind: SuggestionKind,
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
    /// `name` with the matched part wrapped in `<mark>`.
    pub highlight: String,
    /// Files carrying the tag. Only set for tag kinds.
    pub item_count: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent<'q> {
    /// Search tag names containing `filter`; an empty filter lists all tags.
    Tags { filter: &'q str, excluded: bool },
    Regular(&'q str),
    Nothing,
}

/// True if `typed` could still grow into `word` (case-insensitive).
fn could_become(typed: &str, word: &str) -> bool {
    word.get(..typed.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(typed))
}

pub(crate) fn classify(query: &str) -> Intent<'_> {
    let query = query.trim_start();

    if let Some(rest) = query.strip_prefix('-') {
        if let Some(name) = strip_prefix_ci(rest, "tag:") {
            return Intent::Tags {
                filter: name.trim(),
                excluded: true,
            };
        }
        if could_become(rest, "tag") {
            return Intent::Tags {
                filter: "",
                excluded: true,
            };
        }
        return Intent::Tags {
            filter: rest.trim(),
            excluded: true,
        };
    }

    if let Some(name) = strip_prefix_ci(query, "not tag:") {
        return Intent::Tags {
            filter: name.trim(),
            excluded: true,
        };
    }

    if let Some(rest) = strip_prefix_ci(query, "not ") {
        if could_become(rest, "tag:") {
            return Intent::Tags {
                filter: "",
                excluded: true,
            };
        }
    }

    if let Some(name) = strip_prefix_ci(query, "tag:") {
        return Intent::Tags {
            filter: name.trim(),
            excluded: false,
        };
    }

    let text = query.trim();
    if text.chars().count() < 2 {
        return Intent::Nothing;
    }

    Intent::Regular(text)
}

fn clamp_limit(limit: i64) -> i64 {
    if limit <= 0 {
        DEFAULT_SUGGESTIONS
    } else {
        limit.min(MAX_SUGGESTIONS)
    }
}

impl Database {
    /// Suggestions for the partially typed `query`, at most `limit` of them
    /// (clamped to 1..=20, 10 when not positive).
    pub async fn suggest(&self, query: &str, limit: i64) -> LibraryResult<Vec<Suggestion>> {
        let limit = clamp_limit(limit);

        match classify(query) {
            Intent::Nothing => Ok(Vec::new()),
            Intent::Tags { filter, excluded } => {
                self.bounded("suggest", Budget::Lookup, async {
                    let _guard = self.read_guard().await;
                    self.tag_suggestions(filter, excluded, limit).await
                })
                .await
            }
            Intent::Regular(text) => {
                self.bounded("suggest", Budget::Lookup, async {
                    let _guard = self.read_guard().await;
                    let mut suggestions = self.tag_suggestions(text, false, limit / 2).await?;
                    let remaining = limit - suggestions.len() as i64;

                    match self.file_suggestions(text, remaining).await {
                        Ok(files) => suggestions.extend(files),
                        Err(err) if err.is_query_shape() => {
                            warn!(query = text, error = %err, "file suggestions unavailable");
                        }
                        Err(err) => return Err(err),
                    }

                    Ok(suggestions)
                })
                .await
            }
        }
    }

    /// Tags ordered by usage, then name. Caller holds the read lock.
    async fn tag_suggestions(
        &self,
        filter: &str,
        excluded: bool,
        limit: i64,
    ) -> LibraryResult<Vec<Suggestion>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
            "SELECT t.name, COUNT(ft.file_path) AS item_count FROM tags t \
            LEFT JOIN file_tags ft ON ft.tag_id = t.id",
        );
        if !filter.is_empty() {
            qb.push(" WHERE t.name LIKE ");
            qb.push_bind(like_pattern(filter));
            qb.push(" ESCAPE '\\'");
        }
        qb.push(" GROUP BY t.id ORDER BY item_count DESC, t.name COLLATE NOCASE LIMIT ");
        qb.push_bind(limit);

        let rows: Vec<(String, i64)> = qb.build_query_as().fetch_all(&self.pool).await?;

        let (prefix, kind) = if excluded {
            ("-tag:", SuggestionKind::TagExclude)
        } else {
            ("tag:", SuggestionKind::Tag)
        };

        Ok(rows
            .into_iter()
            .map(|(name, count)| Suggestion {
                path: format!("{prefix}{name}"),
                highlight: highlight(&name, filter),
                name,
                kind,
                file_type: None,
                item_count: Some(count),
            })
            .collect())
    }

    /// File names matching `text`, best full-text rank first. Caller holds
    /// the read lock.
    async fn file_suggestions(&self, text: &str, limit: i64) -> LibraryResult<Vec<Suggestion>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT f.path, f.name, f.type
            FROM files_fts
            JOIN files f ON f.id = files_fts.rowid
            WHERE files_fts MATCH ?
            ORDER BY files_fts.rank
            LIMIT ?",
        )
        .bind(format!("name : {}", fts_phrase(text)))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(path, name, file_type)| Suggestion {
                path,
                highlight: highlight(&name, text),
                name,
                kind: SuggestionKind::File,
                file_type: Some(FileType::from_db(&file_type)),
                item_count: None,
            })
            .collect())
    }
}
