//! Pre-transfer validation and metadata sanitization.
//!
//! A file that fails validation never becomes an upload task; it is
//! surfaced as a batch-level rejection and does not affect sibling files.
//! User-editable metadata passes through [`sanitize_text`] on every
//! mutation, not just at creation.

use crate::config::IngestConfig;
use crate::error::IngestError;

/// Document formats accepted by the knowledge base.
pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "text/plain",
    "text/csv",
];

/// Characters never allowed in a filename.
const RESERVED_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];

pub(crate) fn is_pdf(mime_type: &str) -> bool {
    mime_type.eq_ignore_ascii_case("application/pdf")
}

/// Validate a candidate file before it becomes an upload task.
pub fn validate_file(
    file_name: &str,
    mime_type: &str,
    size: u64,
    config: &IngestConfig,
) -> Result<(), IngestError> {
    if file_name.trim().is_empty() {
        return Err(IngestError::Validation("file name is empty".into()));
    }

    if file_name.contains("..")
        || file_name.contains('/')
        || file_name.contains('\\')
        || file_name.contains(RESERVED_FILENAME_CHARS)
        || file_name.chars().any(char::is_control)
    {
        return Err(IngestError::Validation(format!(
            "file name contains forbidden characters: {file_name}"
        )));
    }

    if !ACCEPTED_MIME_TYPES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(mime_type))
    {
        return Err(IngestError::Validation(format!(
            "unsupported document type: {mime_type}"
        )));
    }

    if size == 0 {
        return Err(IngestError::Validation(format!("{file_name} is empty")));
    }

    let cap = if is_pdf(mime_type) {
        config.max_pdf_bytes
    } else {
        config.max_document_bytes
    };
    if size > cap {
        return Err(IngestError::Validation(format!(
            "{} exceeds the {} MiB limit for {}",
            file_name,
            cap / (1024 * 1024),
            mime_type
        )));
    }

    Ok(())
}

/// Sanitize user-editable text: strip control and markup characters,
/// collapse whitespace runs, and bound the length in characters.
pub fn sanitize_text(input: &str, max_chars: usize) -> String {
    let mut out = String::with_capacity(input.len().min(max_chars * 4));
    let mut kept = 0usize;
    let mut last_was_space = true;

    for c in input.chars() {
        if kept >= max_chars {
            break;
        }
        if c.is_control() || matches!(c, '<' | '>' | '{' | '}') {
            continue;
        }
        if c.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                kept += 1;
                last_was_space = true;
            }
            continue;
        }
        out.push(c);
        kept += 1;
        last_was_space = false;
    }

    out.trim_end().to_string()
}

/// Sanitize a tag list: each tag bounded, empties dropped, count capped.
pub fn sanitize_tags(tags: &[String], config: &IngestConfig) -> Vec<String> {
    tags.iter()
        .map(|tag| sanitize_text(tag, config.tag_max_chars))
        .filter(|tag| !tag.is_empty())
        .take(config.max_tags)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn test_accepts_supported_documents() {
        let config = IngestConfig::default();
        assert!(validate_file("report.pdf", "application/pdf", 10 * MIB, &config).is_ok());
        assert!(validate_file("notes.txt", "text/plain", 1024, &config).is_ok());
        assert!(validate_file("data.csv", "text/csv", 2 * MIB, &config).is_ok());
    }

    #[test]
    fn test_rejects_unsupported_mime_type() {
        let config = IngestConfig::default();
        let err = validate_file("movie.mp4", "video/mp4", 1024, &config);
        assert!(matches!(err, Err(IngestError::Validation(_))));
    }

    #[test]
    fn test_rejects_path_traversal_names() {
        let config = IngestConfig::default();
        for name in ["../etc/passwd", "a/b.pdf", "a\\b.pdf", "sneaky..pdf"] {
            assert!(
                validate_file(name, "application/pdf", 1024, &config).is_err(),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_reserved_characters() {
        let config = IngestConfig::default();
        assert!(validate_file("bad<name>.pdf", "application/pdf", 1024, &config).is_err());
        assert!(validate_file("bad|name.pdf", "application/pdf", 1024, &config).is_err());
    }

    #[test]
    fn test_size_caps_per_type() {
        let config = IngestConfig::default();

        // PDF: 500 MiB cap.
        assert!(validate_file("big.pdf", "application/pdf", 500 * MIB, &config).is_ok());
        assert!(validate_file("big.pdf", "application/pdf", 500 * MIB + 1, &config).is_err());

        // Everything else: 25 MiB cap.
        assert!(validate_file("big.txt", "text/plain", 25 * MIB, &config).is_ok());
        assert!(validate_file("big.txt", "text/plain", 25 * MIB + 1, &config).is_err());
    }

    #[test]
    fn test_rejects_empty_file() {
        let config = IngestConfig::default();
        assert!(validate_file("empty.pdf", "application/pdf", 0, &config).is_err());
    }

    #[test]
    fn test_sanitize_strips_markup_and_control_characters() {
        assert_eq!(
            sanitize_text("Hello <script>bad</script>\u{0007} world", 100),
            "Hello scriptbad/script world"
        );
        assert_eq!(sanitize_text("tabs\tand\nnewlines", 100), "tabs and newlines");
    }

    #[test]
    fn test_sanitize_bounds_length_at_char_boundary() {
        let long = "ä".repeat(300);
        let out = sanitize_text(&long, 10);
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn test_sanitize_tags_drops_empties_and_caps_count() {
        let config = IngestConfig::default();
        let mut tags: Vec<String> = (0..30).map(|i| format!("tag{i}")).collect();
        tags.push("   ".to_string());
        tags.push("<>".to_string());

        let out = sanitize_tags(&tags, &config);
        assert_eq!(out.len(), config.max_tags);
        assert!(out.iter().all(|t| !t.is_empty()));
    }
}
