//! Database schema definitions

/// Database schema version
pub const SCHEMA_VERSION: u32 = 1;

/// Chunks with their embedding vectors, one row per chunk
pub const CREATE_CHUNKS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY,
    text TEXT NOT NULL,
    source TEXT NOT NULL,
    page INTEGER NOT NULL,
    split_index INTEGER NOT NULL,
    embedding BLOB NOT NULL
);
"#;

/// SQL for creating the metadata table
pub const CREATE_METADATA_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS metadata (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub const CREATE_CHUNKS_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_chunks_source ON chunks(source);
"#;

// Metadata keys
pub const KEY_SCHEMA_VERSION: &str = "schema_version";
pub const KEY_MODEL_NAME: &str = "model_name";
pub const KEY_DIMENSION: &str = "dimension";
pub const KEY_CHUNK_COUNT: &str = "chunk_count";
pub const KEY_CREATED_AT: &str = "created_at";
