//! # media_library_core
//!
//! The query engine behind a self-hosted media library: a SQLite index of
//! files, folders, and playlists with per-user favorites and tags, searched
//! through a small query language and browsed folder by folder.
//!
//! ## Features
//!
//! - **Search**: free text over names and paths (trigram FTS5) combined with
//!   `tag:`, `-tag:`, and `NOT tag:` filters, paginated
//! - **Suggestions**: typeahead for tags and file names while the user types
//! - **Directory Listing**: sorted, paginated folder contents with breadcrumbs
//! - **Favorites and Tags**: stored per path, joined into every result row
//! - **Storage Discipline**: one writer at a time, bounded reads, no
//!   memory-mapped I/O, and a health check of the database files
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use media_library_core::domain::{FileType, FileUpsert};
//! use media_library_core::search::SearchOptions;
//! use media_library_core::{Database, LibraryConfig};
//! use chrono::Utc;
//!
//! # async fn run() -> media_library_core::LibraryResult<()> {
//! let db = Database::open(LibraryConfig::new("/var/lib/media/library.db")).await?;
//!
//! // The crawler reports what it finds
//! let mut batch = db.begin_batch().await?;
//! let outcome = batch
//!     .upsert_file(&FileUpsert::new("trips/beach.jpg", FileType::Image, 2048, Utc::now()))
//!     .await;
//! db.end_batch(batch, outcome.map(|_| ())).await?;
//!
//! // Users search it
//! let results = db.search(&SearchOptions::new("beach -tag:blurry")).await?;
//! println!("{} matches", results.total_items);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **[`storage`]**: the [`Database`] handle, write batches, and health checks
//! - **[`search`]**: query language, search execution, and suggestions
//! - **[`listing`]**: directory listing and breadcrumbs
//! - **[`catalog`]**: point lookups and maintenance reads
//! - **[`domain`]**: the view models every query returns
//! - **[`config`]**: connection settings and operation deadlines
//! - **[`error`]**: the unified error type
//!
//! ## Error Handling
//!
//! All operations return [`LibraryResult<T>`]. Errors can be classified with
//! [`LibraryError::is_storage`] (the disk or file under the database failed)
//! and [`LibraryError::is_query_shape`] (the statement was rejected, e.g. a
//! full-text expression the index cannot parse).

pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod listing;
pub mod search;
pub mod storage;

/// Re-exports the most commonly used types for convenience.
pub use config::{Budget, LibraryConfig};
pub use domain::{FileType, MediaFile, PageRequest};
pub use error::{LibraryError, LibraryResult};
pub use storage::Database;
