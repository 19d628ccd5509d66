//! Vector index adapter.
//!
//! One SQLite table per vault holds document chunks with their embeddings
//! (little-endian `f32` BLOBs). The only write path is delete-by-hash
//! followed by a batch insert inside one transaction, so a document's
//! chunk set is replaced atomically from a reader's perspective.
//!
//! Search scans the vault table, computes Euclidean distance in process,
//! and returns the k nearest records with their raw distance; the
//! orchestrator converts distance to similarity.

use anyhow::{bail, Result};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::models::{DocumentMeta, EmbeddedChunk};

/// Per-path index state used by the change detector.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMeta {
    pub file_hash: String,
    pub mtime: f64,
}

/// Filters pushed down into the vault-table scan.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorFilters<'a> {
    pub category: Option<&'a str>,
    pub person: Option<&'a str>,
    pub date_from: Option<&'a str>,
    pub date_to: Option<&'a str>,
}

/// One nearest-neighbor result, annotated with the raw distance.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub distance: f64,
    pub file_path: String,
    pub title: String,
    pub content: String,
    pub date: Option<String>,
    pub people: Vec<String>,
    pub category: String,
    pub page_number: Option<i64>,
}

pub struct VectorIndex {
    pool: SqlitePool,
}

impl VectorIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotently create the per-vault chunk tables.
    pub async fn ensure_tables(&self, vaults: &[&str]) -> Result<()> {
        for vault in vaults {
            let table = table_name(vault)?;
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS "{table}" (
                    id TEXT PRIMARY KEY,
                    file_path TEXT NOT NULL,
                    file_hash TEXT NOT NULL,
                    mtime REAL NOT NULL,
                    title TEXT NOT NULL,
                    category TEXT NOT NULL,
                    people TEXT NOT NULL DEFAULT '[]',
                    projects TEXT NOT NULL DEFAULT '[]',
                    date TEXT,
                    vault TEXT NOT NULL,
                    chunk_index INTEGER NOT NULL,
                    content TEXT NOT NULL,
                    source_type TEXT NOT NULL,
                    page_number INTEGER,
                    embedding BLOB NOT NULL
                )
                "#
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                r#"CREATE INDEX IF NOT EXISTS "idx_{table}_file_path" ON "{table}"(file_path)"#
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                r#"CREATE INDEX IF NOT EXISTS "idx_{table}_file_hash" ON "{table}"(file_hash)"#
            ))
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Replace the chunk set for a document: delete records carrying the
    /// target hash, then insert the new batch, in one transaction.
    pub async fn upsert_chunks(
        &self,
        vault: &str,
        meta: &DocumentMeta,
        mtime: f64,
        chunks: &[EmbeddedChunk],
    ) -> Result<()> {
        let table = table_name(vault)?;
        let people_json = serde_json::to_string(&meta.people)?;
        let projects_json = serde_json::to_string(&meta.projects)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE file_hash = ?"#))
            .bind(&meta.file_hash)
            .execute(&mut *tx)
            .await?;

        let insert_sql = format!(
            r#"
            INSERT INTO "{table}"
                (id, file_path, file_hash, mtime, title, category, people, projects,
                 date, vault, chunk_index, content, source_type, page_number, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#
        );
        for embedded in chunks {
            let id = format!("{}_{}", meta.file_hash, embedded.chunk.chunk_index);
            sqlx::query(&insert_sql)
                .bind(&id)
                .bind(&meta.file_path)
                .bind(&meta.file_hash)
                .bind(mtime)
                .bind(&meta.title)
                .bind(&meta.category)
                .bind(&people_json)
                .bind(&projects_json)
                .bind(&meta.date)
                .bind(&meta.vault)
                .bind(embedded.chunk.chunk_index)
                .bind(&embedded.chunk.content)
                .bind(meta.source_type.as_str())
                .bind(embedded.chunk.page_number)
                .bind(vec_to_blob(&embedded.vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_by_path(&self, vault: &str, path: &str) -> Result<u64> {
        let table = table_name(vault)?;
        let result = sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE file_path = ?"#))
            .bind(path)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_by_hash(&self, vault: &str, hash: &str) -> Result<u64> {
        let table = table_name(vault)?;
        let result = sqlx::query(&format!(r#"DELETE FROM "{table}" WHERE file_hash = ?"#))
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Update only the stored mtime for a path (tier-2 skip: content hash
    /// unchanged after a touch or copy).
    pub async fn refresh_mtime(&self, vault: &str, path: &str, mtime: f64) -> Result<()> {
        let table = table_name(vault)?;
        sqlx::query(&format!(
            r#"UPDATE "{table}" SET mtime = ? WHERE file_path = ?"#
        ))
        .bind(mtime)
        .bind(path)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Path → (hash, mtime), de-duplicated across chunks.
    pub async fn list_paths_with_meta(&self, vault: &str) -> Result<HashMap<String, PathMeta>> {
        let table = table_name(vault)?;
        let rows = sqlx::query(&format!(
            r#"SELECT file_path, file_hash, mtime FROM "{table}""#
        ))
        .fetch_all(&self.pool)
        .await?;

        let mut map = HashMap::new();
        for row in rows {
            let path: String = row.get("file_path");
            map.entry(path).or_insert_with(|| PathMeta {
                file_hash: row.get("file_hash"),
                mtime: row.get("mtime"),
            });
        }
        Ok(map)
    }

    /// Scan the vault table and return the k nearest chunks by Euclidean
    /// distance, filters applied in SQL where the schema supports them.
    pub async fn search(
        &self,
        vault: &str,
        query_vector: &[f32],
        filters: VectorFilters<'_>,
        k: usize,
    ) -> Result<Vec<VectorHit>> {
        let table = table_name(vault)?;

        let mut sql = format!(
            r#"
            SELECT file_path, title, category, people, date, content, page_number, embedding
            FROM "{table}" WHERE 1=1
            "#
        );
        let mut binds: Vec<String> = Vec::new();
        if let Some(category) = filters.category {
            sql.push_str(" AND category = ?");
            binds.push(category.to_string());
        }
        if let Some(person) = filters.person {
            // People are stored as a JSON array of strings.
            sql.push_str(" AND people LIKE ?");
            binds.push(format!("%\"{}\"%", person));
        }
        if let Some(from) = filters.date_from {
            sql.push_str(" AND date IS NOT NULL AND date >= ?");
            binds.push(from.to_string());
        }
        if let Some(to) = filters.date_to {
            sql.push_str(" AND date IS NOT NULL AND date <= ?");
            binds.push(to.to_string());
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let mut hits: Vec<VectorHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let people_json: String = row.get("people");
                VectorHit {
                    distance: l2_distance(query_vector, &vector),
                    file_path: row.get("file_path"),
                    title: row.get("title"),
                    content: row.get("content"),
                    date: row.get("date"),
                    people: serde_json::from_str(&people_json).unwrap_or_default(),
                    category: row.get("category"),
                    page_number: row.get("page_number"),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        Ok(hits)
    }

    /// Number of distinct documents in a vault.
    pub async fn count_documents(&self, vault: &str) -> Result<i64> {
        let table = table_name(vault)?;
        let count: i64 =
            sqlx::query_scalar(&format!(r#"SELECT COUNT(DISTINCT file_path) FROM "{table}""#))
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    /// Number of chunk records in a vault.
    pub async fn count_chunks(&self, vault: &str) -> Result<i64> {
        let table = table_name(vault)?;
        let count: i64 = sqlx::query_scalar(&format!(r#"SELECT COUNT(*) FROM "{table}""#))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn clear_vault(&self, vault: &str) -> Result<()> {
        let table = table_name(vault)?;
        sqlx::query(&format!(r#"DELETE FROM "{table}""#))
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Table names come from the vault set; reject anything that is not a
/// plain lowercase identifier before splicing into SQL.
fn table_name(vault: &str) -> Result<&str> {
    if vault.is_empty()
        || !vault
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        bail!("invalid vault name: {}", vault);
    }
    Ok(vault)
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for &v in vector {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes back into a vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Euclidean distance; mismatched lengths rank last.
fn l2_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return f64::MAX;
    }
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = (*x - *y) as f64;
            d * d
        })
        .sum();
    sum.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, SourceType};

    fn meta(path: &str, hash: &str) -> DocumentMeta {
        DocumentMeta {
            file_path: path.to_string(),
            file_hash: hash.to_string(),
            title: "Title".to_string(),
            category: "meetings".to_string(),
            people: vec!["Nikhil".to_string()],
            projects: Vec::new(),
            date: Some("2026-02-09".to_string()),
            vault: "work".to_string(),
            source_type: SourceType::Markdown,
        }
    }

    fn embedded(index: i64, content: &str, vector: Vec<f32>) -> EmbeddedChunk {
        EmbeddedChunk {
            chunk: Chunk {
                chunk_index: index,
                content: content.to_string(),
                page_number: None,
            },
            vector,
        }
    }

    async fn test_index() -> (tempfile::TempDir, VectorIndex) {
        let dir = tempfile::tempdir().unwrap();
        let pool = crate::db::connect(&dir.path().join("vectors.sqlite"))
            .await
            .unwrap();
        let index = VectorIndex::new(pool);
        index.ensure_tables(&["work", "personal"]).await.unwrap();
        (dir, index)
    }

    #[test]
    fn blob_round_trip() {
        let v = vec![1.0f32, -2.5, 3.125, 0.0];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    #[test]
    fn l2_basics() {
        assert!((l2_distance(&[0.0, 0.0], &[3.0, 4.0]) - 5.0).abs() < 1e-9);
        assert_eq!(l2_distance(&[1.0], &[1.0, 2.0]), f64::MAX);
    }

    #[test]
    fn vault_names_validated() {
        assert!(table_name("work").is_ok());
        assert!(table_name("work; DROP TABLE x").is_err());
        assert!(table_name("").is_err());
    }

    #[tokio::test]
    async fn upsert_replaces_prior_hash() {
        let (_dir, index) = test_index().await;
        let m = meta("/v/a.md", "hash1");
        index
            .upsert_chunks(
                "work",
                &m,
                100.0,
                &[
                    embedded(0, "first", vec![1.0, 0.0]),
                    embedded(1, "second", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(index.count_chunks("work").await.unwrap(), 2);

        // Same hash upserted again: still exactly two records.
        index
            .upsert_chunks(
                "work",
                &m,
                101.0,
                &[
                    embedded(0, "first", vec![1.0, 0.0]),
                    embedded(1, "second", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        assert_eq!(index.count_chunks("work").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_paths_dedupes_chunks() {
        let (_dir, index) = test_index().await;
        index
            .upsert_chunks(
                "work",
                &meta("/v/a.md", "h1"),
                42.0,
                &[
                    embedded(0, "x", vec![1.0, 0.0]),
                    embedded(1, "y", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let paths = index.list_paths_with_meta("work").await.unwrap();
        assert_eq!(paths.len(), 1);
        let pm = &paths["/v/a.md"];
        assert_eq!(pm.file_hash, "h1");
        assert!((pm.mtime - 42.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn search_orders_by_distance_and_filters() {
        let (_dir, index) = test_index().await;
        index
            .upsert_chunks(
                "work",
                &meta("/v/a.md", "h1"),
                1.0,
                &[embedded(0, "near", vec![1.0, 0.0])],
            )
            .await
            .unwrap();
        let mut other = meta("/v/b.md", "h2");
        other.category = "projects".to_string();
        other.people = Vec::new();
        other.date = Some("2026-01-01".to_string());
        index
            .upsert_chunks("work", &other, 1.0, &[embedded(0, "far", vec![0.0, 1.0])])
            .await
            .unwrap();

        let hits = index
            .search("work", &[1.0, 0.0], VectorFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].file_path, "/v/a.md");
        assert!(hits[0].distance < hits[1].distance);

        let filtered = index
            .search(
                "work",
                &[1.0, 0.0],
                VectorFilters {
                    category: Some("meetings"),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);

        let by_person = index
            .search(
                "work",
                &[1.0, 0.0],
                VectorFilters {
                    person: Some("Nikhil"),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(by_person.len(), 1);
        assert_eq!(by_person[0].people, vec!["Nikhil"]);

        let in_range = index
            .search(
                "work",
                &[1.0, 0.0],
                VectorFilters {
                    date_from: Some("2026-02-01"),
                    date_to: Some("2026-02-28"),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].date.as_deref(), Some("2026-02-09"));
    }

    #[tokio::test]
    async fn delete_paths_and_refresh_mtime() {
        let (_dir, index) = test_index().await;
        index
            .upsert_chunks(
                "work",
                &meta("/v/a.md", "h1"),
                10.0,
                &[embedded(0, "x", vec![1.0, 0.0])],
            )
            .await
            .unwrap();

        index.refresh_mtime("work", "/v/a.md", 99.0).await.unwrap();
        let paths = index.list_paths_with_meta("work").await.unwrap();
        assert!((paths["/v/a.md"].mtime - 99.0).abs() < 1e-9);

        let deleted = index.delete_by_path("work", "/v/a.md").await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(index.count_chunks("work").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_by_hash_removes_the_chunk_set() {
        let (_dir, index) = test_index().await;
        index
            .upsert_chunks(
                "work",
                &meta("/v/a.md", "h1"),
                10.0,
                &[
                    embedded(0, "x", vec![1.0, 0.0]),
                    embedded(1, "y", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();

        let deleted = index.delete_by_hash("work", "h1").await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(index.count_chunks("work").await.unwrap(), 0);
        assert_eq!(index.delete_by_hash("work", "h1").await.unwrap(), 0);
    }
}
