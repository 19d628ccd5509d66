//! Core data types shared across the indexing and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Kind of source artifact a chunk was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Markdown,
    Pdf,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Markdown => "markdown",
            SourceType::Pdf => "pdf",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "markdown" => Ok(SourceType::Markdown),
            "pdf" => Ok(SourceType::Pdf),
            other => anyhow::bail!("unknown source type: {}", other),
        }
    }
}

/// Metadata derived from one source document. Every chunk of the document
/// carries a copy of this into the vector index.
#[derive(Debug, Clone)]
pub struct DocumentMeta {
    /// Absolute path; the stable document key.
    pub file_path: String,
    /// MD5 fingerprint of the document content, used for change detection.
    pub file_hash: String,
    pub title: String,
    pub category: String,
    pub people: Vec<String>,
    pub projects: Vec<String>,
    /// `YYYY-MM-DD` when known.
    pub date: Option<String>,
    pub vault: String,
    pub source_type: SourceType,
}

/// A bounded span of one document, the unit of vector indexing.
///
/// Identity is `(file_hash, chunk_index)`; indices are contiguous from 0
/// in emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_index: i64,
    pub content: String,
    /// 1-indexed page of the first contained page (PDF only).
    pub page_number: Option<i64>,
}

/// A chunk paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// A ranked hit flowing through the retrieval pipeline. `content` holds the
/// full chunk text for reranking and answer synthesis; the HTTP and CLI
/// surfaces expose only the excerpt.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f64,
    pub file_path: String,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub date: Option<String>,
    pub people: Vec<String>,
    pub category: String,
    pub vault: String,
    /// Which engine produced the hit: `"vector"` or `"bm25"`.
    pub engine: &'static str,
}

/// The uniform per-hit record returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub score: f64,
    pub file_path: String,
    pub title: String,
    pub excerpt: String,
    pub date: Option<String>,
    pub people: Vec<String>,
    pub category: String,
    pub vault: String,
}

impl SearchHit {
    pub fn into_result(self) -> SearchResult {
        let excerpt = if self.excerpt.is_empty() {
            truncate_chars(&self.content, 300)
        } else {
            self.excerpt
        };
        SearchResult {
            score: self.score,
            file_path: self.file_path,
            title: self.title,
            excerpt,
            date: self.date,
            people: self.people,
            category: self.category,
            vault: self.vault,
        }
    }
}

/// Truncate to at most `max` characters, appending an ellipsis when cut.
pub fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let cut: String = s.chars().take(max).collect();
    format!("{}...", cut)
}

/// Lifecycle state of an indexing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// Progress of the currently running indexing job.
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
    pub percent: f64,
    pub current_file: String,
    pub eta_seconds: Option<f64>,
}

/// One entry in the in-memory job table. Lost on restart by design.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub job_id: String,
    pub status: JobStatus,
    pub vault: String,
    pub full: bool,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub duration_seconds: Option<f64>,
    pub indexed_count: Option<u64>,
    pub deleted_count: Option<u64>,
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_short_string_unchanged() {
        assert_eq!(truncate_chars("hello", 300), "hello");
    }

    #[test]
    fn truncate_long_string_appends_ellipsis() {
        let long = "x".repeat(400);
        let out = truncate_chars(&long, 300);
        assert_eq!(out.chars().count(), 303);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn source_type_round_trip() {
        assert_eq!("markdown".parse::<SourceType>().unwrap(), SourceType::Markdown);
        assert_eq!(SourceType::Pdf.as_str(), "pdf");
        assert!("docx".parse::<SourceType>().is_err());
    }
}
