use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Kind of entry in the library, stored as lowercase text in `files.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Folder,
    Image,
    Video,
    Playlist,
    Other,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Folder => "folder",
            FileType::Image => "image",
            FileType::Video => "video",
            FileType::Playlist => "playlist",
            FileType::Other => "other",
        }
    }

    /// Reads a stored type. Unknown values become [`FileType::Other`].
    pub fn from_db(value: &str) -> Self {
        value.parse().unwrap_or(FileType::Other)
    }

    /// Whether a thumbnail can be produced for this kind of entry.
    pub fn has_thumbnail(&self) -> bool {
        matches!(self, FileType::Folder | FileType::Image | FileType::Video)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "folder" => Ok(FileType::Folder),
            "image" => Ok(FileType::Image),
            "video" => Ok(FileType::Video),
            "playlist" => Ok(FileType::Playlist),
            "other" => Ok(FileType::Other),
            other => Err(format!("unknown file type: {other}")),
        }
    }
}

/// A file, folder, or playlist known to the library, enriched with the
/// per-user data the query engine joins in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub parent_path: String,
    #[serde(rename = "type")]
    pub file_type: FileType,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    pub mime_type: Option<String>,
    pub file_hash: Option<String>,
    pub thumbnail_url: Option<String>,
    /// Number of direct children. Only set for folders.
    pub item_count: Option<i64>,
    pub is_favorite: bool,
    pub tags: Vec<String>,
}

/// Metadata the crawler reports for one path.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpsert {
    pub path: String,
    pub name: String,
    pub parent_path: String,
    pub file_type: FileType,
    pub size: i64,
    pub mod_time: DateTime<Utc>,
    pub mime_type: Option<String>,
    pub file_hash: Option<String>,
}

impl FileUpsert {
    /// Builds an upsert for `path`, deriving `name` and `parent_path` from it.
    ///
    /// Paths are relative to the library root and use `/` as separator;
    /// the root itself is the empty string.
    pub fn new(path: &str, file_type: FileType, size: i64, mod_time: DateTime<Utc>) -> Self {
        let path = path.trim_matches('/');
        let (parent_path, name) = match path.rsplit_once('/') {
            Some((parent, name)) => (parent.to_string(), name.to_string()),
            None => (String::new(), path.to_string()),
        };
        Self {
            path: path.to_string(),
            name,
            parent_path,
            file_type,
            size,
            mod_time,
            mime_type: None,
            file_hash: None,
        }
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.file_hash = Some(hash.into());
        self
    }
}

/// What an upsert did to the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// Size, type, modification time, or hash changed.
    ContentChanged,
    /// Only the "last seen" timestamp moved.
    Touched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileTimestamps {
    /// Last time the crawler saw the path.
    pub updated_at: DateTime<Utc>,
    /// Last time the content attributes actually changed.
    pub content_updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub color: Option<String>,
    pub item_count: i64,
}

/// A favorited path. The file itself may no longer be indexed, in which
/// case `file_type` is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub file_type: Option<FileType>,
    pub thumbnail_url: Option<String>,
}

/// A clamped page request. Malformed values are corrected, never rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    /// Clamps `page` to at least 1 and `page_size` to `[1, max]`,
    /// substituting `default` when `page_size` is not positive.
    pub fn clamp(page: i64, page_size: i64, default: i64, max: i64) -> Self {
        let page_size = if page_size <= 0 {
            default
        } else {
            page_size.min(max)
        };
        Self {
            page: page.max(1),
            page_size,
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.page_size)
    }

    pub fn total_pages(&self, total_items: i64) -> i64 {
        if total_items <= 0 {
            0
        } else {
            (total_items + self.page_size - 1) / self.page_size
        }
    }
}

pub(crate) fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}
