//! Search over the library.
//!
//! A search string goes through the [query language](query) first, which
//! splits it into free text and tag filters. Then one of two paths runs:
//!
//! - **Tag filters only**: every included tag must be present (one join per
//!   tag), every excluded tag must be absent (`NOT EXISTS` per tag).
//! - **Text**: files whose name or path contains the text (trigram FTS5
//!   index) are unioned with files carrying a tag whose name contains it.
//!   Both branches carry the same tag and type filters.
//!
//! If the full-text branch fails at the statement level, the search drops
//! the text and answers with the tag filters alone instead of failing.
//! Every returned row carries its favorite flag and tag list, fetched by the
//! same statement that fetches the page.
//!
//! # Usage
//!
//! ```rust,no_run
//! use media_library_core::search::SearchOptions;
//! use media_library_core::storage::Database;
//!
//! # async fn run() -> media_library_core::LibraryResult<()> {
//! let db = Database::open_path("/tmp/library.db").await?;
//!
//! let results = db
//!     .search(&SearchOptions::new("sunset tag:beach -tag:blurry").with_page(1, 25))
//!     .await?;
//! println!("{} of {} matches", results.items.len(), results.total_items);
//! # Ok(())
//! # }
//! ```

pub mod highlight;
pub(crate) mod plan;
pub mod query;
pub mod suggest;

pub use query::{ParsedQuery, TagFilter, parse};
pub use suggest::{Suggestion, SuggestionKind};

use crate::config::Budget;
use crate::domain::{FileType, MediaFile, PageRequest};
use crate::error::LibraryResult;
use crate::storage::Database;
use crate::storage::rows::FileRow;
use plan::SearchPlan;
use serde::Serialize;
use tracing::{debug, warn};

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Raw search string, including any `tag:` tokens.
    pub query: String,
    pub filter_type: Option<FileType>,
    /// 1-based. Values below 1 are treated as 1.
    pub page: i64,
    /// Defaults to 50 when not positive, capped at 200.
    pub page_size: i64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            query: String::new(),
            filter_type: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl SearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_type(mut self, file_type: FileType) -> Self {
        self.filter_type = Some(file_type);
        self
    }

    pub fn with_page(mut self, page: i64, page_size: i64) -> Self {
        self.page = page;
        self.page_size = page_size;
        self
    }
}

/// One page of search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub items: Vec<MediaFile>,
    pub query: String,
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl SearchResult {
    pub(crate) fn empty(query: &str, page: PageRequest) -> Self {
        Self {
            items: Vec::new(),
            query: query.to_string(),
            page: page.page,
            page_size: page.page_size,
            total_items: 0,
            total_pages: 0,
        }
    }
}

impl Database {
    /// Runs a search. An empty query returns an empty page without touching
    /// the database.
    pub async fn search(&self, options: &SearchOptions) -> LibraryResult<SearchResult> {
        let page = PageRequest::clamp(
            options.page,
            options.page_size,
            DEFAULT_PAGE_SIZE,
            MAX_PAGE_SIZE,
        );

        if options.query.trim().is_empty() {
            return Ok(SearchResult::empty(&options.query, page));
        }

        self.bounded("search", Budget::Query, async {
            let _guard = self.read_guard().await;
            self.search_unlocked(options, page).await
        })
        .await
    }

    /// [`Database::search`] for callers already holding the read lock.
    pub(crate) async fn search_unlocked(
        &self,
        options: &SearchOptions,
        page: PageRequest,
    ) -> LibraryResult<SearchResult> {
        let parsed = query::parse(&options.query);
        let included = parsed.included();
        let excluded = parsed.excluded();
        let tags_only = SearchPlan::tags_only(&included, &excluded, options.filter_type);

        if parsed.is_unfinished_exclusion() {
            return Ok(SearchResult::empty(&options.query, page));
        }

        if parsed.text.is_empty() {
            if tags_only.is_unfiltered() {
                return Ok(SearchResult::empty(&options.query, page));
            }
            return self.run_plan(&tags_only, page, &options.query).await;
        }

        let combined = tags_only.with_text(&parsed.text);
        match self.run_plan(&combined, page, &options.query).await {
            Ok(result) => Ok(result),
            Err(err) if err.is_query_shape() => {
                warn!(
                    query = %options.query,
                    error = %err,
                    "full-text search failed, falling back to tag filters"
                );
                if tags_only.is_unfiltered() {
                    return Ok(SearchResult::empty(&options.query, page));
                }
                self.run_plan(&tags_only, page, &options.query).await
            }
            Err(err) => Err(err),
        }
    }

    /// Counts and fetches one page for `plan`. Caller holds the read lock.
    pub(crate) async fn run_plan(
        &self,
        plan: &SearchPlan<'_>,
        page: PageRequest,
        query: &str,
    ) -> LibraryResult<SearchResult> {
        let mut count = plan.count_query();
        let total_items: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = plan.page_query(page);
        let rows: Vec<FileRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let base = &self.config().thumbnail_base;
        let items: Vec<MediaFile> = rows
            .into_iter()
            .map(|row| row.into_media_file(base))
            .collect();

        debug!(query, total_items, returned = items.len(), "search finished");

        Ok(SearchResult {
            items,
            query: query.to_string(),
            page: page.page,
            page_size: page.page_size,
            total_items,
            total_pages: page.total_pages(total_items),
        })
    }
}
