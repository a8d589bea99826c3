use crate::domain::{FileType, MediaFile, millis_to_datetime};
use sqlx::FromRow;

/// Separator used by `GROUP_CONCAT` when folding tag names into one column.
/// Tag names are rejected if they contain it.
pub(crate) const TAG_SEPARATOR: char = '\u{1f}';

/// Columns of an enriched file row. Expects `files f` joined with
/// [`ENRICHMENT_JOINS`] and grouped by `f.id`.
pub(crate) const FILE_COLUMNS: &str = "f.id, f.name, f.path, f.parent_path, f.type AS file_type, \
    f.size, f.mod_time, f.mime_type, f.file_hash, \
    CASE WHEN fav.path IS NULL THEN 0 ELSE 1 END AS is_favorite, \
    GROUP_CONCAT(et.name, char(31)) AS tag_names, \
    CASE WHEN f.type = 'folder' THEN (SELECT COUNT(*) FROM files c WHERE c.parent_path = f.path) END AS item_count";

/// Favorite flag and tag list joined in the same query as the page of files.
pub(crate) const ENRICHMENT_JOINS: &str = " LEFT JOIN favorites fav ON fav.path = f.path \
    LEFT JOIN file_tags eft ON eft.file_path = f.path \
    LEFT JOIN tags et ON et.id = eft.tag_id";

#[derive(Debug, FromRow)]
pub(crate) struct FileRow {
    id: i64,
    name: String,
    path: String,
    parent_path: String,
    file_type: String,
    size: i64,
    mod_time: i64,
    mime_type: Option<String>,
    file_hash: Option<String>,
    is_favorite: i64,
    tag_names: Option<String>,
    item_count: Option<i64>,
}

impl FileRow {
    pub(crate) fn into_media_file(self, thumbnail_base: &str) -> MediaFile {
        let file_type = FileType::from_db(&self.file_type);
        let thumbnail_url = thumbnail_url(thumbnail_base, &self.path, file_type);

        MediaFile {
            id: self.id,
            name: self.name,
            path: self.path,
            parent_path: self.parent_path,
            file_type,
            size: self.size,
            mod_time: millis_to_datetime(self.mod_time),
            mime_type: self.mime_type,
            file_hash: self.file_hash,
            thumbnail_url,
            item_count: self.item_count,
            is_favorite: self.is_favorite != 0,
            tags: split_tags(self.tag_names.as_deref()),
        }
    }
}

pub(crate) fn thumbnail_url(base: &str, path: &str, file_type: FileType) -> Option<String> {
    file_type
        .has_thumbnail()
        .then(|| format!("{base}/{path}"))
}

fn split_tags(joined: Option<&str>) -> Vec<String> {
    let mut tags: Vec<String> = joined
        .unwrap_or_default()
        .split(TAG_SEPARATOR)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
    tags.sort_by_key(|name| name.to_lowercase());
    tags
}
