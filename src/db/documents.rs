use super::{Db, models::*, serialize_vector};
use chrono::{DateTime, Utc};
use rusqlite::{Result, params};

fn map_metadata_row(row: &rusqlite::Row<'_>) -> Result<ChunkMetadata> {
    Ok(ChunkMetadata {
        path: row.get(0)?,
        file_name: row.get(1)?,
        fingerprint: row.get(2)?,
        created_at: row.get::<_, DateTime<Utc>>(3)?,
        modified_at: row.get::<_, DateTime<Utc>>(4)?,
        user_id: row.get(5)?,
        chunk_index: row.get::<_, i64>(6)? as usize,
    })
}

impl Db {
    /// Inserts chunks with their embeddings in a single transaction
    pub fn insert_chunks(&mut self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        assert_eq!(
            chunks.len(),
            embeddings.len(),
            "chunks and embeddings length mismatch"
        );

        let tx = self.conn.transaction()?;

        for (chunk, embedding) in chunks.iter().zip(embeddings) {
            let m = &chunk.metadata;
            tx.execute(
                r#"
                INSERT INTO chunks
                    (path, file_name, fingerprint, created_at, modified_at, user_id, chunk_index, content)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    m.path,
                    m.file_name,
                    m.fingerprint,
                    m.created_at,
                    m.modified_at,
                    m.user_id,
                    m.chunk_index as i64,
                    chunk.content
                ],
            )?;
            let chunk_id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO vec_chunks (rowid, embedding) VALUES (?, ?)",
                params![chunk_id, serialize_vector(embedding)],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Deletes every chunk stored for `path`, returning how many were removed
    pub fn delete_by_path(&mut self, path: &str) -> Result<usize> {
        let tx = self.conn.transaction()?;

        // Virtual table cascade deletion workaround
        tx.execute(
            "DELETE FROM vec_chunks WHERE rowid IN (SELECT id FROM chunks WHERE path = ?)",
            params![path],
        )?;
        let removed = tx.execute("DELETE FROM chunks WHERE path = ?", params![path])?;

        tx.commit()?;
        Ok(removed)
    }

    /// Metadata of every stored chunk, ordered by path and position
    pub fn all_metadata(&self) -> Result<Vec<ChunkMetadata>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT path, file_name, fingerprint, created_at, modified_at, user_id, chunk_index
            FROM chunks
            ORDER BY path, chunk_index
            "#,
        )?;
        let rows = stmt.query_map([], map_metadata_row)?;
        rows.collect()
    }

    /// One summary per indexed path
    pub fn document_summaries(&self) -> Result<Vec<DocumentSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT path, MAX(fingerprint), COUNT(*)
            FROM chunks
            GROUP BY path
            ORDER BY path
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(DocumentSummary {
                path: row.get(0)?,
                fingerprint: row.get(1)?,
                chunks: row.get::<_, i64>(2)? as usize,
            })
        })?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(path: &str, fingerprint: &str, index: usize, content: &str) -> Chunk {
        let now = Utc::now();
        Chunk {
            content: content.to_string(),
            metadata: ChunkMetadata {
                path: path.to_string(),
                file_name: path.rsplit('/').next().unwrap_or(path).to_string(),
                fingerprint: fingerprint.to_string(),
                created_at: now,
                modified_at: now,
                user_id: GLOBAL_SCOPE.to_string(),
                chunk_index: index,
            },
        }
    }

    #[test]
    fn test_insert_and_list_metadata() {
        let mut db = Db::open_in_memory(3).unwrap();
        let chunks = vec![
            chunk("docs/a.md", "fa", 0, "alpha"),
            chunk("docs/a.md", "fa", 1, "beta"),
            chunk("docs/b.md", "fb", 0, "gamma"),
        ];
        let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0], vec![0.0, 0.0, 1.0]];
        db.insert_chunks(&chunks, &vectors).unwrap();

        let meta = db.all_metadata().unwrap();
        assert_eq!(meta.len(), 3);
        assert_eq!(meta[0].path, "docs/a.md");
        assert_eq!(meta[1].chunk_index, 1);
        assert_eq!(meta[2].file_name, "b.md");

        let summaries = db.document_summaries().unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].chunks, 2);
        assert_eq!(summaries[1].fingerprint, "fb");
    }

    #[test]
    fn test_delete_by_path() {
        let mut db = Db::open_in_memory(2).unwrap();
        let chunks = vec![
            chunk("a.md", "x", 0, "one"),
            chunk("a.md", "x", 1, "two"),
            chunk("b.md", "y", 0, "three"),
        ];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.5, 0.5]];
        db.insert_chunks(&chunks, &vectors).unwrap();

        assert_eq!(db.delete_by_path("a.md").unwrap(), 2);
        assert_eq!(db.delete_by_path("a.md").unwrap(), 0);
        assert_eq!(db.all_metadata().unwrap().len(), 1);

        let vec_rows: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM vec_chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(vec_rows, 1);
    }
}
