//! Seed list loading.
//!
//! The seed file is a JSON document with a `titles` array. Files exported from
//! Windows tools often carry a UTF-8 byte-order mark, which is stripped before parsing.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

use crate::error::{LinkGraphError, Result};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Deserialize)]
struct SeedFile {
    titles: Vec<String>,
}

/// Read and normalise the seed titles from `path`.
pub fn load_seed_file(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|e| LinkGraphError::io(path, e))?;
    parse_seeds(&bytes).map_err(|e| match e {
        LinkGraphError::Parse { message } => {
            LinkGraphError::parse(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

/// Parse a seed document from raw bytes.
///
/// Blank titles are dropped and duplicates collapse onto their first occurrence;
/// titles are otherwise kept verbatim (keys are case-sensitive).
pub fn parse_seeds(bytes: &[u8]) -> Result<Vec<String>> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let text = std::str::from_utf8(bytes)
        .map_err(|e| LinkGraphError::parse(format!("seed file is not valid UTF-8: {e}")))?;

    let doc: SeedFile = serde_json::from_str(text)
        .map_err(|e| LinkGraphError::parse(format!("invalid seed document: {e}")))?;

    let mut seen = HashSet::new();
    let mut titles = Vec::with_capacity(doc.titles.len());
    let mut blank = 0usize;
    for title in doc.titles {
        if title.trim().is_empty() {
            blank += 1;
            continue;
        }
        if seen.insert(title.clone()) {
            titles.push(title);
        }
    }

    if blank > 0 {
        tracing::warn!(blank, "skipped blank seed titles");
    }
    Ok(titles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_titles_in_order() {
        let titles = parse_seeds(br#"{"titles": ["Rust", "Go", "Zig"]}"#).unwrap();
        assert_eq!(titles, vec!["Rust", "Go", "Zig"]);
    }

    #[test]
    fn strips_byte_order_mark() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(r#"{"titles": ["Ångström"]}"#.as_bytes());
        let titles = parse_seeds(&bytes).unwrap();
        assert_eq!(titles, vec!["Ångström"]);
    }

    #[test]
    fn drops_blanks_and_duplicates() {
        let titles = parse_seeds(br#"{"titles": ["A", "", "B", "A", "  ", "a"]}"#).unwrap();
        assert_eq!(titles, vec!["A", "B", "a"]);
    }

    #[test]
    fn missing_titles_field_is_a_parse_error() {
        let err = parse_seeds(br#"{"articles": []}"#).unwrap_err();
        assert!(matches!(err, LinkGraphError::Parse { .. }));
    }

    #[test]
    fn load_reports_missing_file_path() {
        let path = std::env::temp_dir().join("linkgraph-no-such-seeds.json");
        let err = load_seed_file(&path).unwrap_err();
        assert!(matches!(err, LinkGraphError::Io { .. }));
    }

    #[test]
    fn load_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "lg_seeds_{}.json",
            uuid::Uuid::now_v7()
        ));
        std::fs::write(&path, b"\xEF\xBB\xBF{\"titles\": [\"A\", \"B\"]}").unwrap();
        let titles = load_seed_file(&path).unwrap();
        assert_eq!(titles, vec!["A", "B"]);
        let _ = std::fs::remove_file(&path);
    }
}
