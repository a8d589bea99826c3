//! Paginated listing of one directory level.
//!
//! Only direct children are read, by equality on the materialized
//! `parent_path` column, so the cost of a listing depends on the size of the
//! directory and not of the library. Folders always sort before files; the
//! requested sort applies within each group.

use crate::config::Budget;
use crate::domain::{Favorite, FileType, MediaFile, PageRequest};
use crate::error::LibraryResult;
use crate::storage::Database;
use crate::storage::rows::{ENRICHMENT_JOINS, FILE_COLUMNS, FileRow};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite};
use std::str::FromStr;

pub const DEFAULT_LISTING_PAGE_SIZE: i64 = 100;
/// Large enough for bulk operations (select all, download folder).
pub const MAX_LISTING_PAGE_SIZE: i64 = 10_000;

const ROOT_LABEL: &str = "Home";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Name,
    Date,
    Size,
    Type,
}

impl SortField {
    fn column(&self) -> &'static str {
        match self {
            SortField::Name => "f.name COLLATE NOCASE",
            SortField::Date => "f.mod_time",
            SortField::Size => "f.size",
            SortField::Type => "f.type",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "name" => Ok(SortField::Name),
            "date" | "modified" => Ok(SortField::Date),
            "size" => Ok(SortField::Size),
            "type" => Ok(SortField::Type),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ListOptions {
    /// Directory relative to the library root. `""` and `"."` mean the root.
    pub path: String,
    pub sort: SortField,
    pub order: SortOrder,
    pub filter_type: Option<FileType>,
    pub page: i64,
    pub page_size: i64,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            path: String::new(),
            sort: SortField::Name,
            order: SortOrder::Asc,
            filter_type: None,
            page: 1,
            page_size: DEFAULT_LISTING_PAGE_SIZE,
        }
    }
}

impl ListOptions {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn sorted_by(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
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

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryListing {
    pub path: String,
    pub name: String,
    /// `None` at the root.
    pub parent_path: Option<String>,
    pub breadcrumb: Vec<Breadcrumb>,
    pub items: Vec<MediaFile>,
    pub page: i64,
    pub page_size: i64,
    pub total_items: i64,
    pub total_pages: i64,
    /// Only attached to the first page of the root directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub favorites: Option<Vec<Favorite>>,
}

/// `"."`, `"/"`, and surrounding slashes all reduce to the canonical
/// relative form; the root is `""`.
pub fn normalize_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed == "." {
        String::new()
    } else {
        trimmed.to_string()
    }
}

/// Root crumb followed by one crumb per path segment. Pure string work.
pub fn breadcrumbs(path: &str) -> Vec<Breadcrumb> {
    let mut crumbs = vec![Breadcrumb {
        name: ROOT_LABEL.to_string(),
        path: String::new(),
    }];

    let mut prefix = String::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(segment);
        crumbs.push(Breadcrumb {
            name: segment.to_string(),
            path: prefix.clone(),
        });
    }

    crumbs
}

fn push_filters(qb: &mut QueryBuilder<'static, Sqlite>, path: &str, filter_type: Option<FileType>) {
    qb.push(" WHERE f.parent_path = ");
    qb.push_bind(path.to_string());
    if let Some(file_type) = filter_type {
        qb.push(" AND f.type = ");
        qb.push_bind(file_type.as_str());
    }
}

impl Database {
    /// Lists the direct children of `options.path`, one page at a time.
    pub async fn list_directory(&self, options: &ListOptions) -> LibraryResult<DirectoryListing> {
        let path = normalize_path(&options.path);
        let page = PageRequest::clamp(
            options.page,
            options.page_size,
            DEFAULT_LISTING_PAGE_SIZE,
            MAX_LISTING_PAGE_SIZE,
        );

        self.bounded("list_directory", Budget::Query, async {
            let _guard = self.read_guard().await;

            let mut count = QueryBuilder::new("SELECT COUNT(*) FROM files f");
            push_filters(&mut count, &path, options.filter_type);
            let total_items: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

            let mut select = QueryBuilder::new(format!(
                "SELECT {FILE_COLUMNS} FROM files f{ENRICHMENT_JOINS}"
            ));
            push_filters(&mut select, &path, options.filter_type);
            select.push(format!(
                " GROUP BY f.id ORDER BY CASE WHEN f.type = 'folder' THEN 0 ELSE 1 END, {} {}, f.name COLLATE NOCASE, f.id LIMIT ",
                options.sort.column(),
                options.order.keyword()
            ));
            select.push_bind(page.page_size);
            select.push(" OFFSET ");
            select.push_bind(page.offset());

            let rows: Vec<FileRow> = select.build_query_as().fetch_all(&self.pool).await?;
            let base = &self.config().thumbnail_base;
            let items = rows
                .into_iter()
                .map(|row| row.into_media_file(base))
                .collect();

            let favorites = if path.is_empty() && page.page == 1 {
                Some(self.favorites_unlocked().await?)
            } else {
                None
            };

            let (parent_path, name) = match path.rsplit_once('/') {
                Some((parent, name)) => (Some(parent.to_string()), name.to_string()),
                None if path.is_empty() => (None, ROOT_LABEL.to_string()),
                None => (Some(String::new()), path.clone()),
            };

            Ok(DirectoryListing {
                breadcrumb: breadcrumbs(&path),
                path: path.clone(),
                name,
                parent_path,
                items,
                page: page.page,
                page_size: page.page_size,
                total_items,
                total_pages: page.total_pages(total_items),
                favorites,
            })
        })
        .await
    }
}
