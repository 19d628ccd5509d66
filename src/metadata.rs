//! Document metadata extraction.
//!
//! Parses optional YAML frontmatter from markdown notes, derives title,
//! date, category, people, and projects, and computes the MD5 fingerprint
//! used for change detection. Frontmatter is an open record: missing or
//! malformed blocks degrade to defaults, never to an error.

use md5::{Digest, Md5};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use crate::models::{DocumentMeta, SourceType};

/// MD5 digest as lowercase hex.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4}-\d{2}-\d{2})").unwrap())
}

fn mmddyy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{2})(\d{2})(\d{2})").unwrap())
}

/// Split a leading `---`-delimited YAML frontmatter block from the body.
/// Returns `(None, content)` when no well-formed block is present.
pub fn split_frontmatter(content: &str) -> (Option<serde_yml::Value>, &str) {
    if !(content.starts_with("---\n") || content.starts_with("---\r\n")) {
        return (None, content);
    }
    let after = match content.find('\n') {
        Some(i) => &content[i + 1..],
        None => return (None, content),
    };

    let mut offset = 0;
    for line in after.split_inclusive('\n') {
        if line.trim_end() == "---" {
            let yaml = &after[..offset];
            let body = &after[offset + line.len()..];
            return match serde_yml::from_str::<serde_yml::Value>(yaml) {
                Ok(value) if value.is_mapping() => (Some(value), body),
                _ => (None, content),
            };
        }
        offset += line.len();
    }

    (None, content)
}

/// A scalar frontmatter value rendered as a string.
fn fm_string(fm: &serde_yml::Value, key: &str) -> Option<String> {
    match fm.get(key)? {
        serde_yml::Value::String(s) => Some(s.clone()),
        serde_yml::Value::Number(n) => Some(n.to_string()),
        serde_yml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// A frontmatter list of scalars; a scalar value is comma-split.
fn fm_list(fm: &serde_yml::Value, key: &str) -> Vec<String> {
    match fm.get(key) {
        Some(serde_yml::Value::Sequence(seq)) => seq
            .iter()
            .filter_map(|v| match v {
                serde_yml::Value::String(s) => Some(s.trim().to_string()),
                serde_yml::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        Some(serde_yml::Value::String(s)) => s
            .split(',')
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

/// First `YYYY-MM-DD` in a filename; PDFs additionally accept `MMDDYY`.
fn date_from_filename(name: &str, source: SourceType) -> Option<String> {
    if let Some(m) = iso_date_re().captures(name) {
        return Some(m[1].to_string());
    }
    if source == SourceType::Pdf {
        if let Some(m) = mmddyy_re().captures(name) {
            return Some(format!("20{}-{}-{}", &m[3], &m[1], &m[2]));
        }
    }
    None
}

/// First path segment under the vault root, or `"documents"` for files at
/// the root (or outside it).
fn category_for(path: &Path, root: &Path) -> String {
    let relative = match path.strip_prefix(root) {
        Ok(r) => r,
        Err(_) => return "documents".to_string(),
    };
    let parts: Vec<_> = relative.components().collect();
    if parts.len() > 1 {
        parts[0].as_os_str().to_string_lossy().to_string()
    } else {
        "documents".to_string()
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Extract metadata from a markdown note. Returns the metadata and the body
/// (content minus frontmatter). The fingerprint covers the full raw content,
/// frontmatter included.
pub fn extract_markdown_meta(
    path: &Path,
    content: &str,
    vault: &str,
    vault_root: &Path,
) -> (DocumentMeta, String) {
    let (fm, body) = split_frontmatter(content);

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let title = fm
        .as_ref()
        .and_then(|f| fm_string(f, "title"))
        .unwrap_or_else(|| file_stem(path));

    let date = fm
        .as_ref()
        .and_then(|f| fm_string(f, "date"))
        .or_else(|| date_from_filename(&filename, SourceType::Markdown));

    let people = fm.as_ref().map(|f| fm_list(f, "people")).unwrap_or_default();
    let projects = fm
        .as_ref()
        .map(|f| fm_list(f, "projects"))
        .unwrap_or_default();

    let meta = DocumentMeta {
        file_path: path.to_string_lossy().to_string(),
        file_hash: md5_hex(content.as_bytes()),
        title,
        category: category_for(path, vault_root),
        people,
        projects,
        date,
        vault: vault.to_string(),
        source_type: SourceType::Markdown,
    };

    (meta, body.to_string())
}

/// Extract metadata from a PDF's path and raw bytes. The fingerprint covers
/// the raw file bytes.
pub fn extract_pdf_meta(path: &Path, bytes: &[u8], vault: &str, pdf_root: &Path) -> DocumentMeta {
    static TIMESTAMP_SUFFIX: OnceLock<Regex> = OnceLock::new();
    static DATE_PREFIX: OnceLock<Regex> = OnceLock::new();
    let ts_re = TIMESTAMP_SUFFIX.get_or_init(|| Regex::new(r"-?\d{6}-\d{6}$").unwrap());
    let dp_re = DATE_PREFIX.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}\s*").unwrap());

    let stem = file_stem(path);
    // Scanner exports carry timestamp suffixes and date prefixes; strip both.
    let mut title = ts_re.replace(&stem, "").to_string();
    title = dp_re.replace(&title, "").to_string();
    if title.is_empty() {
        title = stem.clone();
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    DocumentMeta {
        file_path: path.to_string_lossy().to_string(),
        file_hash: md5_hex(bytes),
        title,
        category: category_for(path, pdf_root),
        people: Vec::new(),
        projects: Vec::new(),
        date: date_from_filename(&filename, SourceType::Pdf),
        vault: vault.to_string(),
        source_type: SourceType::Pdf,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn frontmatter_parsed_and_stripped() {
        let content = "---\ntitle: Weekly Sync\ndate: 2026-02-09\npeople:\n  - Nikhil\n  - Arnab\n---\n# Notes\n\nBody text.";
        let (fm, body) = split_frontmatter(content);
        let fm = fm.unwrap();
        assert_eq!(fm_string(&fm, "title").as_deref(), Some("Weekly Sync"));
        assert_eq!(fm_list(&fm, "people"), vec!["Nikhil", "Arnab"]);
        assert!(body.starts_with("# Notes"));
    }

    #[test]
    fn missing_frontmatter_returns_full_body() {
        let content = "# Just a note\n\nNo metadata here.";
        let (fm, body) = split_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn malformed_frontmatter_degrades() {
        let content = "---\n: [unbalanced\n---\nBody.";
        let (fm, body) = split_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn unterminated_frontmatter_degrades() {
        let content = "---\ntitle: open block\nno closing line";
        let (fm, body) = split_frontmatter(content);
        assert!(fm.is_none());
        assert_eq!(body, content);
    }

    #[test]
    fn scalar_people_comma_split() {
        let content = "---\npeople: Nikhil, Arnab\n---\nBody.";
        let (fm, _) = split_frontmatter(content);
        assert_eq!(fm_list(&fm.unwrap(), "people"), vec!["Nikhil", "Arnab"]);
    }

    #[test]
    fn title_falls_back_to_stem_and_date_to_filename() {
        let root = PathBuf::from("/vault/work");
        let path = root.join("meetings/2026-02-09 standup.md");
        let (meta, _) = extract_markdown_meta(&path, "Body only, no frontmatter.", "work", &root);
        assert_eq!(meta.title, "2026-02-09 standup");
        assert_eq!(meta.date.as_deref(), Some("2026-02-09"));
        assert_eq!(meta.category, "meetings");
        assert_eq!(meta.vault, "work");
    }

    #[test]
    fn root_level_file_gets_documents_category() {
        let root = PathBuf::from("/vault/work");
        let path = root.join("inbox.md");
        let (meta, _) = extract_markdown_meta(&path, "Quick capture.", "work", &root);
        assert_eq!(meta.category, "documents");
    }

    #[test]
    fn hash_covers_frontmatter() {
        let root = PathBuf::from("/vault/work");
        let path = root.join("n.md");
        let (a, _) = extract_markdown_meta(&path, "---\ntitle: A\n---\nSame body.", "work", &root);
        let (b, _) = extract_markdown_meta(&path, "---\ntitle: B\n---\nSame body.", "work", &root);
        assert_ne!(a.file_hash, b.file_hash);
    }

    #[test]
    fn pdf_title_cleanup_and_mmddyy_date() {
        let root = PathBuf::from("/pdfs/personal");
        let path = root.join("statements/Statement-021026-134501.pdf");
        let meta = extract_pdf_meta(&path, b"%PDF-1.4", "personal", &root);
        assert_eq!(meta.title, "Statement");
        assert_eq!(meta.date.as_deref(), Some("2026-02-10"));
        assert_eq!(meta.category, "statements");
        assert_eq!(meta.source_type, SourceType::Pdf);
    }

    #[test]
    fn pdf_iso_date_preferred() {
        let root = PathBuf::from("/pdfs/work");
        let path = root.join("2026-03-01 Offsite Agenda.pdf");
        let meta = extract_pdf_meta(&path, b"%PDF-1.4", "work", &root);
        assert_eq!(meta.date.as_deref(), Some("2026-03-01"));
        assert_eq!(meta.title, "Offsite Agenda");
    }

    #[test]
    fn md5_is_stable() {
        assert_eq!(md5_hex(b"abc"), "900150983cd24fb0d6963f7d28e17f72");
    }
}
