//! SQL assembly for search.
//!
//! The number of joins depends on how many tags are included, so statements
//! are built with [`QueryBuilder`]. Aliases and column names come from the
//! constants below; every user-supplied value goes through `push_bind`, in
//! the same order its placeholder is appended.

use crate::domain::{FileType, PageRequest};
use crate::storage::rows::{ENRICHMENT_JOINS, FILE_COLUMNS};
use sqlx::{QueryBuilder, Sqlite};

/// Wraps `text` as one FTS5 phrase: trimmed, inner quotes doubled.
///
/// The index uses the trigram tokenizer, so a quoted phrase gives substring
/// matching and keeps FTS operators in user input from being interpreted.
pub(crate) fn fts_phrase(text: &str) -> String {
    format!("\"{}\"", text.trim().replace('"', "\"\""))
}

/// `%text%` with LIKE wildcards in `text` escaped by `\`.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[derive(Clone, Copy)]
enum Source<'q> {
    /// Every file, narrowed only by filters.
    All,
    FullText(&'q str),
    TagName(&'q str),
}

/// The predicate set of one search: tag filters, type filter, and optional
/// free text. Count and page statements are built from the same plan.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SearchPlan<'q> {
    pub included: &'q [String],
    pub excluded: &'q [String],
    pub file_type: Option<FileType>,
    pub text: Option<&'q str>,
}

impl<'q> SearchPlan<'q> {
    pub fn tags_only(
        included: &'q [String],
        excluded: &'q [String],
        file_type: Option<FileType>,
    ) -> Self {
        Self {
            included,
            excluded,
            file_type,
            text: None,
        }
    }

    pub fn with_text(self, text: &'q str) -> Self {
        Self {
            text: Some(text),
            ..self
        }
    }

    /// True when the plan would match every file.
    pub fn is_unfiltered(&self) -> bool {
        self.text.is_none() && self.included.is_empty() && self.excluded.is_empty()
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM (");
        self.push_candidates(&mut qb);
        qb.push(")");
        qb
    }

    pub fn page_query(&self, page: PageRequest) -> QueryBuilder<'static, Sqlite> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {FILE_COLUMNS} FROM files f{ENRICHMENT_JOINS} WHERE f.id IN ("
        ));
        self.push_candidates(&mut qb);
        qb.push(") GROUP BY f.id ORDER BY f.name COLLATE NOCASE, f.id LIMIT ");
        qb.push_bind(page.page_size);
        qb.push(" OFFSET ");
        qb.push_bind(page.offset());
        qb
    }

    /// Ids of matching files. With text, the full-text branch and the
    /// tag-name branch are unioned so each file appears once.
    fn push_candidates(&self, qb: &mut QueryBuilder<'static, Sqlite>) {
        match self.text {
            None => self.push_branch(qb, Source::All),
            Some(text) => {
                self.push_branch(qb, Source::FullText(text));
                qb.push(" UNION ");
                self.push_branch(qb, Source::TagName(text));
            }
        }
    }

    fn push_branch(&self, qb: &mut QueryBuilder<'static, Sqlite>, source: Source<'_>) {
        qb.push("SELECT f.id FROM files f");

        match source {
            Source::All => {}
            Source::FullText(_) => {
                qb.push(" JOIN files_fts ON files_fts.rowid = f.id");
            }
            Source::TagName(_) => {
                qb.push(" JOIN file_tags mft ON mft.file_path = f.path JOIN tags mt ON mt.id = mft.tag_id");
            }
        }

        // One alias pair per included tag: a file must carry all of them.
        for (n, name) in self.included.iter().enumerate() {
            qb.push(format!(
                " JOIN file_tags ift{n} ON ift{n}.file_path = f.path \
                JOIN tags it{n} ON it{n}.id = ift{n}.tag_id AND it{n}.name = "
            ));
            qb.push_bind(name.clone());
        }

        qb.push(" WHERE 1 = 1");

        match source {
            Source::All => {}
            Source::FullText(text) => {
                qb.push(" AND files_fts MATCH ");
                qb.push_bind(fts_phrase(text));
            }
            Source::TagName(text) => {
                qb.push(" AND mt.name LIKE ");
                qb.push_bind(like_pattern(text));
                qb.push(" ESCAPE '\\'");
            }
        }

        if let Some(file_type) = self.file_type {
            qb.push(" AND f.type = ");
            qb.push_bind(file_type.as_str());
        }

        for name in self.excluded {
            qb.push(
                " AND NOT EXISTS (SELECT 1 FROM file_tags xft JOIN tags xt ON xt.id = xft.tag_id \
                WHERE xft.file_path = f.path AND xt.name = ",
            );
            qb.push_bind(name.clone());
            qb.push(")");
        }
    }
}
