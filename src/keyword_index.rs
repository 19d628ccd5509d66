//! Keyword index adapter: BM25 full-text search over SQLite FTS5.
//!
//! One record per document, keyed by path. A plain content table holds the
//! metadata and body; an external-content FTS5 table indexes path, title,
//! body, and people, kept in sync by triggers. Queries are always wrapped
//! as a quoted phrase so FTS operators (`:`, `-`, `*`) in user text never
//! reach the engine's parser.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::metadata::md5_hex;
use crate::models::truncate_chars;

/// BM25 column weights for (file_path, title, content, people): titles
/// count double, people mentions half.
const BM25_WEIGHTS: &str = "1.0, 2.0, 1.0, 0.5";

/// One BM25 result. `score` is the absolute value of the engine's rank
/// (FTS5 reports negative BM25; higher is better here).
#[derive(Debug, Clone)]
pub struct KeywordHit {
    pub file_path: String,
    pub title: String,
    pub vault: String,
    pub category: String,
    pub people: Vec<String>,
    pub date: Option<String>,
    pub snippet: String,
    pub score: f64,
}

pub struct KeywordIndex {
    pool: SqlitePool,
}

impl KeywordIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotently create the content table, FTS5 table, and sync triggers.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS fts_documents (
                id INTEGER PRIMARY KEY,
                file_path TEXT UNIQUE,
                file_hash TEXT,
                title TEXT,
                vault TEXT,
                category TEXT,
                people TEXT,
                date TEXT,
                content TEXT,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE IF NOT EXISTS documents_fts USING fts5(
                file_path,
                title,
                content,
                people,
                content='fts_documents',
                content_rowid='id',
                tokenize='porter unicode61 remove_diacritics 1'
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS fts_documents_ai AFTER INSERT ON fts_documents BEGIN
                INSERT INTO documents_fts(rowid, file_path, title, content, people)
                VALUES (new.id, new.file_path, new.title, new.content, new.people);
            END
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS fts_documents_ad AFTER DELETE ON fts_documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, file_path, title, content, people)
                VALUES ('delete', old.id, old.file_path, old.title, old.content, old.people);
            END
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TRIGGER IF NOT EXISTS fts_documents_au AFTER UPDATE ON fts_documents BEGIN
                INSERT INTO documents_fts(documents_fts, rowid, file_path, title, content, people)
                VALUES ('delete', old.id, old.file_path, old.title, old.content, old.people);
                INSERT INTO documents_fts(rowid, file_path, title, content, people)
                VALUES (new.id, new.file_path, new.title, new.content, new.people);
            END
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert-or-replace a document record by path.
    #[allow(clippy::too_many_arguments)]
    pub async fn upsert_document(
        &self,
        file_path: &str,
        title: &str,
        content: &str,
        vault: &str,
        category: &str,
        people: &[String],
        date: Option<&str>,
    ) -> Result<()> {
        let file_hash = md5_hex(content.as_bytes());
        let people_joined = people.join(", ");

        sqlx::query(
            r#"
            INSERT INTO fts_documents (file_path, file_hash, title, vault, category, people, date, content)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(file_path) DO UPDATE SET
                file_hash = excluded.file_hash,
                title = excluded.title,
                vault = excluded.vault,
                category = excluded.category,
                people = excluded.people,
                date = excluded.date,
                content = excluded.content,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(file_path)
        .bind(&file_hash)
        .bind(title)
        .bind(vault)
        .bind(category)
        .bind(&people_joined)
        .bind(date)
        .bind(content)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Remove a document by path, optionally scoped to a vault.
    pub async fn delete_document(&self, file_path: &str, vault: Option<&str>) -> Result<()> {
        match vault {
            Some(vault) => {
                sqlx::query("DELETE FROM fts_documents WHERE file_path = ? AND vault = ?")
                    .bind(file_path)
                    .bind(vault)
                    .execute(&self.pool)
                    .await?;
            }
            None => {
                sqlx::query("DELETE FROM fts_documents WHERE file_path = ?")
                    .bind(file_path)
                    .execute(&self.pool)
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn clear_vault(&self, vault: &str) -> Result<()> {
        sqlx::query("DELETE FROM fts_documents WHERE vault = ?")
            .bind(vault)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count(&self, vault: Option<&str>) -> Result<i64> {
        let count: i64 = match vault {
            Some(vault) => {
                sqlx::query_scalar("SELECT COUNT(*) FROM fts_documents WHERE vault = ?")
                    .bind(vault)
                    .fetch_one(&self.pool)
                    .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM fts_documents")
                    .fetch_one(&self.pool)
                    .await?
            }
        };
        Ok(count)
    }

    /// BM25 search with optional vault, person, and date-range filters.
    /// A query the FTS parser rejects yields an empty list, not an error.
    pub async fn search(
        &self,
        query: &str,
        vault: Option<&str>,
        person: Option<&str>,
        date_from: Option<&str>,
        date_to: Option<&str>,
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        let fts_query = quote_query(query);

        let mut sql = format!(
            r#"
            SELECT d.file_path, d.title, d.vault, d.category, d.people, d.date,
                   snippet(documents_fts, 2, '<mark>', '</mark>', '...', 64) AS snippet,
                   bm25(documents_fts, {BM25_WEIGHTS}) AS score
            FROM documents_fts
            JOIN fts_documents d ON d.id = documents_fts.rowid
            WHERE documents_fts MATCH ?
            "#
        );
        let mut binds: Vec<String> = vec![fts_query];
        if let Some(vault) = vault {
            sql.push_str(" AND d.vault = ?");
            binds.push(vault.to_string());
        }
        if let Some(person) = person {
            sql.push_str(" AND d.people LIKE ?");
            binds.push(format!("%{}%", person));
        }
        if let Some(from) = date_from {
            sql.push_str(" AND d.date IS NOT NULL AND d.date >= ?");
            binds.push(from.to_string());
        }
        if let Some(to) = date_to {
            sql.push_str(" AND d.date IS NOT NULL AND d.date <= ?");
            binds.push(to.to_string());
        }
        sql.push_str(" ORDER BY score LIMIT ?");

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        q = q.bind(limit as i64);

        let rows = match q.fetch_all(&self.pool).await {
            Ok(rows) => rows,
            Err(e) if e.to_string().contains("fts5") => {
                tracing::trace!(query, error = %e, "FTS query rejected, returning empty");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        Ok(rows.iter().map(|row| row_to_hit(row)).collect())
    }

    /// Chronological top documents within a date range; serves queries that
    /// were purely temporal after the expression was stripped.
    pub async fn recent_in_range(
        &self,
        vault: Option<&str>,
        date_from: &str,
        date_to: &str,
        limit: usize,
    ) -> Result<Vec<KeywordHit>> {
        let mut sql = String::from(
            r#"
            SELECT file_path, title, vault, category, people, date, content
            FROM fts_documents
            WHERE date IS NOT NULL AND date >= ? AND date <= ?
            "#,
        );
        let mut binds: Vec<String> = vec![date_from.to_string(), date_to.to_string()];
        if let Some(vault) = vault {
            sql.push_str(" AND vault = ?");
            binds.push(vault.to_string());
        }
        sql.push_str(" ORDER BY date DESC LIMIT ?");

        let mut q = sqlx::query(&sql);
        for bind in &binds {
            q = q.bind(bind);
        }
        q = q.bind(limit as i64);

        let rows = q.fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                let content: String = row.get("content");
                KeywordHit {
                    file_path: row.get("file_path"),
                    title: row.get("title"),
                    vault: row.get("vault"),
                    category: row.get("category"),
                    people: split_people(row.get("people")),
                    date: row.get("date"),
                    snippet: truncate_chars(&content, 300),
                    score: 0.0,
                }
            })
            .collect())
    }
}

fn row_to_hit(row: &sqlx::sqlite::SqliteRow) -> KeywordHit {
    let score: f64 = row.get("score");
    KeywordHit {
        file_path: row.get("file_path"),
        title: row.get("title"),
        vault: row.get("vault"),
        category: row.get("category"),
        people: split_people(row.get("people")),
        date: row.get("date"),
        snippet: row.get("snippet"),
        score: score.abs(),
    }
}

fn split_people(joined: String) -> Vec<String> {
    joined
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Wrap the query as a quoted phrase so FTS special tokens stay literal.
fn quote_query(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}
