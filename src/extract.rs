//! Text extraction from uploaded document bytes.
//!
//! Extraction is a collaborator seam: the clustering core consumes plain
//! UTF-8 text and never parses document formats itself. The shipped
//! [`MultiFormatExtractor`] handles PDF and plain-text formats; callers
//! needing other formats supply their own [`TextExtractor`].

/// Extraction error. Extraction never panics; a failed item is surfaced
/// to the caller, which skips or reports it.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Pdf(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Turns uploaded bytes into plain text.
pub trait TextExtractor: Send + Sync {
    /// Extract plain UTF-8 text from `bytes`, using `filename` to
    /// determine the format.
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractError>;
}

/// Extractor for the formats the service accepts: PDF, plain text, and
/// markdown.
pub struct MultiFormatExtractor;

impl TextExtractor for MultiFormatExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> Result<String, ExtractError> {
        match file_extension(filename).as_str() {
            "pdf" => pdf_extract::extract_text_from_mem(bytes)
                .map_err(|e| ExtractError::Pdf(e.to_string())),
            // Lossy decoding: a stray invalid byte should not reject a
            // whole document.
            "txt" | "md" | "markdown" => Ok(String::from_utf8_lossy(bytes).to_string()),
            other => Err(ExtractError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Lowercased extension of a filename, or empty string.
fn file_extension(filename: &str) -> String {
    filename
        .rsplit('.')
        .next()
        .filter(|ext| *ext != filename)
        .unwrap_or("")
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_passthrough() {
        let extractor = MultiFormatExtractor;
        let text = extractor.extract(b"hello world", "notes.txt").unwrap();
        assert_eq!(text, "hello world");
    }

    #[test]
    fn test_markdown_passthrough() {
        let extractor = MultiFormatExtractor;
        let text = extractor.extract(b"# Title\n\nBody", "README.md").unwrap();
        assert!(text.contains("# Title"));
    }

    #[test]
    fn test_extension_is_case_insensitive() {
        let extractor = MultiFormatExtractor;
        assert!(extractor.extract(b"x", "FILE.TXT").is_ok());
    }

    #[test]
    fn test_unsupported_format() {
        let extractor = MultiFormatExtractor;
        let err = extractor.extract(b"binary", "image.png").unwrap_err();
        assert!(err.to_string().contains("unsupported"));
    }

    #[test]
    fn test_no_extension_is_unsupported() {
        let extractor = MultiFormatExtractor;
        assert!(extractor.extract(b"x", "Makefile").is_err());
    }

    #[test]
    fn test_invalid_utf8_is_lossy_not_fatal() {
        let extractor = MultiFormatExtractor;
        let text = extractor.extract(&[0x68, 0x69, 0xFF], "weird.txt").unwrap();
        assert!(text.starts_with("hi"));
    }
}
