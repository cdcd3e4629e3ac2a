//! SQLite persistence for the vector index
//!
//! Each chunk row carries its embedding as a little-endian `f32` blob.
//! Index-level facts (model name, dimension, creation time) live in the
//! key/value `metadata` table.

use crate::error::{QaError, Result};
use crate::ml::embedding::Embedding;
use crate::storage::schema::*;
use crate::text::Chunk;
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;

/// Database connection and operations
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Create (or reuse) a database file and its schema
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path.as_ref())
            .map_err(|e| QaError::Storage(format!("Failed to open database: {}", e)))?;

        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Open an existing index database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(QaError::IndexUnavailable(format!(
                "No index database at {}",
                path.display()
            )));
        }

        let conn = Connection::open(path)
            .map_err(|e| QaError::Storage(format!("Failed to open database: {}", e)))?;
        let db = Self { conn };

        match db.get_metadata(KEY_SCHEMA_VERSION)? {
            Some(version) if version == SCHEMA_VERSION.to_string() => Ok(db),
            Some(version) => Err(QaError::Storage(format!(
                "Index schema version {} is not supported (expected {}), rebuild the index",
                version, SCHEMA_VERSION
            ))),
            None => Err(QaError::Storage(format!(
                "{} is not an index database",
                path.display()
            ))),
        }
    }

    /// Create an in-memory database (for testing)
    pub fn memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            QaError::Storage(format!("Failed to create in-memory database: {}", e))
        })?;

        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(CREATE_CHUNKS_TABLE)
            .map_err(|e| QaError::Storage(format!("Failed to create chunks table: {}", e)))?;
        self.conn
            .execute_batch(CREATE_METADATA_TABLE)
            .map_err(|e| QaError::Storage(format!("Failed to create metadata table: {}", e)))?;
        self.conn
            .execute_batch(CREATE_CHUNKS_INDEXES)
            .map_err(|e| QaError::Storage(format!("Failed to create indexes: {}", e)))?;

        self.set_metadata(KEY_SCHEMA_VERSION, &SCHEMA_VERSION.to_string())?;
        log::debug!("Database initialized with schema version {}", SCHEMA_VERSION);
        Ok(())
    }

    /// Insert chunks and their vectors in one transaction
    pub fn insert_entries(&mut self, chunks: &[Chunk], embeddings: &[Embedding]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(QaError::Storage(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let tx = self
            .conn
            .transaction()
            .map_err(|e| QaError::Storage(format!("Failed to start transaction: {}", e)))?;

        {
            let mut stmt = tx
                .prepare(
                    r#"
                    INSERT INTO chunks (id, text, source, page, split_index, embedding)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .map_err(|e| QaError::Storage(format!("Failed to prepare statement: {}", e)))?;

            for (chunk, embedding) in chunks.iter().zip(embeddings) {
                stmt.execute(params![
                    chunk.id as i64,
                    chunk.text,
                    chunk.source,
                    chunk.page as i64,
                    chunk.split_index as i64,
                    encode_vector(embedding)?,
                ])
                .map_err(|e| QaError::Storage(format!("Failed to insert chunk {}: {}", chunk.id, e)))?;
            }
        }

        tx.commit()
            .map_err(|e| QaError::Storage(format!("Failed to commit transaction: {}", e)))?;

        log::info!("Inserted {} chunks into database", chunks.len());
        Ok(())
    }

    /// All chunks with their vectors, in id order
    pub fn load_entries(&self) -> Result<Vec<(Chunk, Embedding)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, text, source, page, split_index, embedding FROM chunks ORDER BY id")
            .map_err(|e| QaError::Storage(format!("Failed to prepare query: {}", e)))?;

        let rows = stmt
            .query_map([], row_to_entry)
            .map_err(|e| QaError::Storage(format!("Failed to query chunks: {}", e)))?;

        let mut entries = Vec::new();
        for row in rows {
            let (chunk, blob) =
                row.map_err(|e| QaError::Storage(format!("Failed to process chunk row: {}", e)))?;
            let embedding = decode_vector(&blob)
                .map_err(|e| QaError::Storage(format!("Chunk {}: {}", chunk.id, e)))?;
            entries.push((chunk, embedding));
        }

        Ok(entries)
    }

    /// Get total chunk count
    pub fn chunk_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .map_err(|e| QaError::Storage(format!("Failed to count chunks: {}", e)))?;

        Ok(count as usize)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES (?, ?)",
                params![key, value],
            )
            .map_err(|e| QaError::Storage(format!("Failed to set metadata {}: {}", key, e)))?;
        Ok(())
    }

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let exists: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'metadata')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| QaError::Storage(format!("Failed to inspect schema: {}", e)))?;
        if !exists {
            return Ok(None);
        }

        self.conn
            .query_row("SELECT value FROM metadata WHERE key = ?", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| QaError::Storage(format!("Failed to read metadata {}: {}", key, e)))
    }
}

fn row_to_entry(row: &Row) -> rusqlite::Result<(Chunk, Vec<u8>)> {
    let chunk = Chunk {
        id: row.get::<_, i64>(0)? as usize,
        text: row.get(1)?,
        source: row.get(2)?,
        page: row.get::<_, i64>(3)? as u32,
        split_index: row.get::<_, i64>(4)? as usize,
    };
    Ok((chunk, row.get(5)?))
}

/// Serialize a vector as little-endian `f32`s
pub fn encode_vector(vector: &[f32]) -> Result<Vec<u8>> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &value in vector {
        bytes.write_f32::<LittleEndian>(value)?;
    }
    Ok(bytes)
}

/// Inverse of [`encode_vector`]
pub fn decode_vector(bytes: &[u8]) -> Result<Embedding> {
    if bytes.len() % 4 != 0 {
        return Err(QaError::Storage(format!(
            "Vector blob length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let mut vector = vec![0.0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(bytes, &mut vector);
    Ok(vector)
}
