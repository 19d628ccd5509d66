//! Structure-aware text chunker.
//!
//! Splits document bodies into size-bounded chunks that respect the source
//! structure: markdown is split on blank lines and `##`/`###` headings, PDFs
//! accumulate whole pages. Consecutive chunks share a text-based overlap so
//! that content near a split boundary stays retrievable. Chunk indices are
//! contiguous starting at 0.
//!
//! Budgets are expressed in characters (`tokens × 4`); exact token counts
//! are not needed because the embedder truncates its input anyway.

use crate::config::ChunkingConfig;
use crate::models::Chunk;

/// Approximate chars-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// Split a markdown body into overlapping chunks.
pub fn chunk_markdown(body: &str, params: &ChunkingConfig) -> Vec<Chunk> {
    let max_chars = params.chunk_size_tokens * CHARS_PER_TOKEN;
    let overlap_chars = params.chunk_overlap_tokens * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut chunk_index: i64 = 0;

    for section in split_sections(body) {
        let section = section.trim();
        if section.is_empty() {
            continue;
        }

        if current.len() + section.len() > max_chars {
            if !current.is_empty() {
                chunks.push(Chunk {
                    chunk_index,
                    content: current.trim().to_string(),
                    page_number: None,
                });
                chunk_index += 1;
                // Seed the next chunk with the tail of the previous one.
                let tail = tail_chars(&current, overlap_chars);
                current = format!("{}\n\n{}", tail, section);
            } else {
                current = section.to_string();
            }
        } else if current.is_empty() {
            current = section.to_string();
        } else {
            current.push_str("\n\n");
            current.push_str(section);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(Chunk {
            chunk_index,
            content: current.trim().to_string(),
            page_number: None,
        });
    }

    chunks
}

/// Accumulate extracted PDF pages into chunks, recording the page number of
/// each chunk's first contained page. Overlap is text-based; a page never
/// appears in full in two chunks.
pub fn chunk_pdf_pages(pages: &[(u32, String)], params: &ChunkingConfig) -> Vec<Chunk> {
    let max_chars = params.chunk_size_tokens * CHARS_PER_TOKEN;
    let overlap_chars = params.chunk_overlap_tokens * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_page: i64 = 1;
    let mut chunk_index: i64 = 0;

    for (page_num, page_text) in pages {
        let page_text = page_text.trim();
        if page_text.is_empty() {
            continue;
        }

        if !current.is_empty() && current.len() + page_text.len() > max_chars {
            chunks.push(Chunk {
                chunk_index,
                content: current.trim().to_string(),
                page_number: Some(current_page),
            });
            chunk_index += 1;
            let tail = tail_chars(&current, overlap_chars.min(current.len()));
            current = format!("{}\n\n{}", tail, page_text);
            current_page = *page_num as i64;
        } else {
            if current.is_empty() {
                current_page = *page_num as i64;
                current = page_text.to_string();
            } else {
                current.push_str("\n\n");
                current.push_str(page_text);
            }
        }
    }

    if !current.trim().is_empty() {
        chunks.push(Chunk {
            chunk_index,
            content: current.trim().to_string(),
            page_number: Some(current_page),
        });
    }

    chunks
}

/// Split a body into sections at blank-line runs and `##`/`###` heading
/// starts. Returns sections in document order, blank runs dropped.
fn split_sections(body: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();

    for line in body.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                sections.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            continue;
        }
        let is_heading = line.starts_with("## ") || line.starts_with("### ");
        if is_heading && !current.trim().is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.trim().is_empty() {
        sections.push(current);
    }

    sections
}

/// Last `max_bytes` of `s`, adjusted forward to a char boundary.
fn tail_chars(s: &str, max_bytes: usize) -> &str {
    if max_bytes >= s.len() {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(size: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            chunk_size_tokens: size,
            chunk_overlap_tokens: overlap,
        }
    }

    #[test]
    fn small_body_single_chunk() {
        let chunks = chunk_markdown("Hello, world!", &params(500, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[0].content, "Hello, world!");
        assert_eq!(chunks[0].page_number, None);
    }

    #[test]
    fn empty_body_no_chunks() {
        assert!(chunk_markdown("", &params(500, 50)).is_empty());
        assert!(chunk_markdown("\n\n\n", &params(500, 50)).is_empty());
    }

    #[test]
    fn headings_open_new_sections() {
        let body = "Intro text here.\n## First\nAlpha content.\n### Sub\nBeta content.";
        let sections = split_sections(body);
        assert_eq!(sections.len(), 3);
        assert!(sections[1].starts_with("## First"));
        assert!(sections[2].starts_with("### Sub"));
    }

    #[test]
    fn indices_contiguous_from_zero() {
        let body = (0..40)
            .map(|i| format!("Paragraph number {} with some filler words.", i))
            .collect::<Vec<_>>()
            .join("\n\n");
        let chunks = chunk_markdown(&body, &params(20, 5));
        assert!(chunks.len() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn overlap_carries_tail_of_previous_chunk() {
        let body = format!("{}\n\n{}", "a".repeat(90), "b".repeat(90));
        // 25 tokens * 4 = 100 chars budget, 5 tokens * 4 = 20 chars overlap
        let chunks = chunk_markdown(&body, &params(25, 5));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].content.starts_with(&"a".repeat(20)));
        assert!(chunks[1].content.ends_with(&"b".repeat(90)));
    }

    #[test]
    fn pdf_chunks_record_first_page() {
        let pages = vec![
            (1, "x".repeat(80)),
            (2, "y".repeat(80)),
            (3, "z".repeat(80)),
        ];
        let chunks = chunk_pdf_pages(&pages, &params(25, 5));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].page_number, Some(1));
        // Later chunks start at the page that overflowed the budget.
        assert!(chunks[1].page_number.unwrap() > 1);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.chunk_index, i as i64);
        }
    }

    #[test]
    fn pdf_empty_pages_dropped() {
        let pages = vec![(1, String::new()), (2, "content".to_string())];
        let chunks = chunk_pdf_pages(&pages, &params(500, 50));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_number, Some(2));
    }

    #[test]
    fn deterministic() {
        let body = "Alpha\n\nBeta\n\n## Gamma\nDelta";
        let a = chunk_markdown(body, &params(5, 1));
        let b = chunk_markdown(body, &params(5, 1));
        assert_eq!(a, b);
    }

    #[test]
    fn tail_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = tail_chars(s, 5);
        assert!(t.len() <= 5);
        assert!(s.ends_with(t));
    }
}
