//! Storage functionality for thesis-qa
//!
//! This module provides database operations using embedded SQLite.

pub mod database;
pub mod schema;

use crate::error::Result;
use std::path::Path;

// Re-export main types
pub use database::{Database, decode_vector, encode_vector};

/// File name of the index database inside the index directory
pub const INDEX_FILE: &str = "index.db";

/// SQLite side files that may sit next to the index database
const INDEX_SIDE_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// Delete the index database and its SQLite side files from `dir`
///
/// Other files in `dir` are left alone. Returns whether an index was present.
pub fn remove_index<P: AsRef<Path>>(dir: P) -> Result<bool> {
    let dir = dir.as_ref();
    let db_path = dir.join(INDEX_FILE);
    let existed = db_path.is_file();

    let side_files = INDEX_SIDE_SUFFIXES
        .iter()
        .map(|suffix| dir.join(format!("{}{}", INDEX_FILE, suffix)));
    for path in std::iter::once(db_path).chain(side_files) {
        match std::fs::remove_file(&path) {
            Ok(()) => log::debug!("Removed {}", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }

    Ok(existed)
}
