//! Vector Database module using SQLite and sqlite-vec
use rusqlite::{Connection, OptionalExtension, Result, params};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;
use tracing::info;

pub mod documents;
pub mod models;
pub mod search;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL,
    file_name TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    created_at DATETIME NOT NULL,
    modified_at DATETIME NOT NULL,
    user_id TEXT NOT NULL DEFAULT 'global',
    chunk_index INTEGER NOT NULL,
    content TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chunks_path ON chunks(path);
CREATE INDEX IF NOT EXISTS idx_chunks_user ON chunks(user_id);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

static INIT_VEC: Once = Once::new();

/// Initialize the sqlite-vec extension. Safe to call multiple times.
fn init_sqlite_vec() {
    INIT_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// A SQLite connection holding chunk metadata next to a `vec0` table of
/// embeddings sized for one embedding model.
pub struct Db {
    pub(crate) conn: Connection,
    dimensions: usize,
}

impl Db {
    /// Open (or create) the index at `path`.
    ///
    /// `dimensions` only applies to a fresh index; an existing file keeps the
    /// width it was created with, see [`Db::dimensions`].
    pub fn open<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        info!("Initializing database: {}", path.display());

        init_sqlite_vec();
        let conn = Connection::open(path)?;
        Self::init(conn, dimensions)
    }

    /// Open an in-memory database connection (useful for testing).
    pub fn open_in_memory(dimensions: usize) -> Result<Self> {
        init_sqlite_vec();
        let conn = Connection::open_in_memory()?;
        Self::init(conn, dimensions)
    }

    fn init(conn: Connection, dimensions: usize) -> Result<Self> {
        let vec_version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        info!("sqlite-vec version: {}", vec_version);

        conn.execute_batch(SCHEMA_SQL)?;

        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimensions'",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let dimensions = match stored.and_then(|v| v.parse::<usize>().ok()) {
            Some(existing) => existing,
            None => {
                conn.execute(
                    "INSERT OR REPLACE INTO index_meta (key, value) VALUES ('dimensions', ?)",
                    params![dimensions.to_string()],
                )?;
                dimensions
            }
        };

        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(embedding FLOAT[{dimensions}]);"
        ))?;

        info!("Database initialized ({dimensions} dimensions)");

        Ok(Self { conn, dimensions })
    }

    /// Embedding width this index was created with.
    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// Helper to serialize a float32 vector into bytes for vec0 virtual table
pub fn serialize_vector(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_init() {
        let db = Db::open_in_memory(8).expect("Failed to open in-memory DB");

        let tables: usize = db
            .conn
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name IN ('chunks', 'index_meta', 'vec_chunks');",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 3);
        assert_eq!(db.dimensions(), 8);
    }

    #[test]
    fn test_reopen_keeps_original_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.db");

        {
            let db = Db::open(&path, 16).unwrap();
            assert_eq!(db.dimensions(), 16);
        }
        let reopened = Db::open(&path, 32).unwrap();
        assert_eq!(reopened.dimensions(), 16);
    }

    #[test]
    fn test_serialize_vector() {
        let vec = vec![1.0, 2.0, -3.5];
        let bytes = serialize_vector(&vec);
        assert_eq!(bytes.len(), 12);

        // 1.0f32 in hex: 0x3f800000 -> little endian: 00 00 80 3f
        assert_eq!(&bytes[0..4], &[0x00, 0x00, 0x80, 0x3f]);
        // -3.5f32 in hex: 0xc0600000 -> little endian: 00 00 60 c0
        assert_eq!(&bytes[8..12], &[0x00, 0x00, 0x60, 0xc0]);
    }
}
