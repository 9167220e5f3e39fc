use super::{Db, models::*, serialize_vector};
use chrono::{DateTime, Utc};
use rusqlite::Result;
use rusqlite::types::Value;

fn map_search_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScoredChunk> {
    let distance: f64 = row.get(8)?;
    let score = 1.0 - (distance / 2.0);

    Ok(ScoredChunk {
        chunk: Chunk {
            content: row.get(7)?,
            metadata: ChunkMetadata {
                path: row.get(0)?,
                file_name: row.get(1)?,
                fingerprint: row.get(2)?,
                created_at: row.get::<_, DateTime<Utc>>(3)?,
                modified_at: row.get::<_, DateTime<Utc>>(4)?,
                user_id: row.get(5)?,
                chunk_index: row.get::<_, i64>(6)? as usize,
            },
        },
        score,
    })
}

impl Db {
    /// Perform vector similarity search using cosine distance, optionally
    /// restricted to chunks whose `user_id` equals `scope`.
    pub fn search(
        &self,
        query_vector: &[f32],
        top_k: usize,
        scope: Option<&str>,
    ) -> Result<Vec<ScoredChunk>> {
        let mut query = String::from(
            r#"
            SELECT
                c.path,
                c.file_name,
                c.fingerprint,
                c.created_at,
                c.modified_at,
                c.user_id,
                c.chunk_index,
                c.content,
                vec_distance_cosine(v.embedding, ?) as distance
            FROM vec_chunks v
            JOIN chunks c ON v.rowid = c.id
            "#,
        );

        let mut params: Vec<Value> = vec![Value::Blob(serialize_vector(query_vector))];

        if let Some(scope) = scope {
            query.push_str(" WHERE c.user_id = ?");
            params.push(Value::Text(scope.to_string()));
        }

        query.push_str(" ORDER BY distance ASC, c.id ASC LIMIT ?");
        params.push(Value::Integer(top_k as i64));

        let param_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let mut stmt = self.conn.prepare(&query)?;
        let rows = stmt.query_map(param_refs.as_slice(), map_search_row)?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }

        Ok(results)
    }
}
