//! Text source and tokenization
//!
//! A [`TextSource`] produces a fresh [`TextDocument`] on every load. The
//! document keeps the raw text verbatim (served by the full-text endpoint)
//! next to the tokens derived from it (streamed one per `word` event).

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

/// Whether `c` separates tokens
///
/// Unicode White_Space, except that a byte-order mark separates and NEL
/// does not. This is the ECMAScript `\s` class, so a BOM at the start of a
/// file never sticks to the first word.
fn is_separator(c: char) -> bool {
    match c {
        '\u{feff}' => true,
        '\u{0085}' => false,
        c => c.is_whitespace(),
    }
}

/// Split text into whitespace-delimited tokens
///
/// Runs of whitespace collapse to a single separator, leading and trailing
/// whitespace is dropped, and no token is ever empty.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(is_separator)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// An immutable loaded text and its token sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextDocument {
    raw: String,
    tokens: Vec<String>,
}

impl TextDocument {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let tokens = tokenize(&raw);
        Self { raw, tokens }
    }

    /// The text exactly as loaded
    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Give up the document, keeping only its tokens
    pub fn into_tokens(self) -> Vec<String> {
        self.tokens
    }
}

/// Errors raised while loading a text source
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A backing artifact that yields the text to serve
///
/// The `#[async_trait]` macro keeps the trait object-safe so the server can
/// hold it as `Arc<dyn TextSource>`.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Load the current text
    ///
    /// Implementations must never return content that is stale relative to
    /// the backing artifact.
    async fn load(&self) -> Result<TextDocument, SourceError>;
}

/// Text read from a UTF-8 file on every load
#[derive(Debug, Clone)]
pub struct FileTextSource {
    path: PathBuf,
}

impl FileTextSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TextSource for FileTextSource {
    async fn load(&self) -> Result<TextDocument, SourceError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })?;

        let raw = String::from_utf8(bytes).map_err(|e| SourceError::Read {
            path: self.path.clone(),
            source: io::Error::new(io::ErrorKind::InvalidData, e),
        })?;

        let document = TextDocument::new(raw);
        debug!(
            path = %self.path.display(),
            tokens = document.tokens().len(),
            "loaded text source"
        );
        Ok(document)
    }
}

/// Text held in memory
#[derive(Debug, Clone)]
pub struct StaticTextSource {
    text: String,
}

impl StaticTextSource {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl TextSource for StaticTextSource {
    async fn load(&self) -> Result<TextDocument, SourceError> {
        Ok(TextDocument::new(self.text.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tokenize_collapses_whitespace() {
        let tokens = tokenize("  hello \t world\n\nthis   is\r\n a  test  ");
        assert_eq!(tokens, vec!["hello", "world", "this", "is", "a", "test"]);
    }

    #[test]
    fn test_tokenize_empty_and_blank() {
        assert!(tokenize("").is_empty());
        assert!(tokenize(" \n\t ").is_empty());
    }

    #[test]
    fn test_tokenize_keeps_punctuation() {
        assert_eq!(tokenize("Hi, there. [DONE]"), vec!["Hi,", "there.", "[DONE]"]);
    }

    #[test]
    fn test_tokenize_byte_order_mark_separates() {
        assert_eq!(tokenize("\u{feff}Title line"), vec!["Title", "line"]);
        assert_eq!(tokenize("a\u{feff}b"), vec!["a", "b"]);
    }

    #[test]
    fn test_tokenize_next_line_is_not_whitespace() {
        assert_eq!(tokenize("a\u{0085}b c"), vec!["a\u{0085}b", "c"]);
    }

    #[test]
    fn test_tokenize_is_deterministic() {
        let samples = [
            "hello world this is a full stream test",
            "\u{00a0}non\u{2003}breaking spaces\u{3000}too",
            "line one\nline two\r\nline three",
            "",
        ];
        for text in samples {
            assert_eq!(tokenize(text), tokenize(text));
        }
    }

    #[test]
    fn test_document_keeps_raw_text_verbatim() {
        let raw = "  spaced\n\nout  ";
        let document = TextDocument::new(raw);
        assert_eq!(document.raw(), raw);
        assert_eq!(document.tokens(), ["spaced", "out"]);
    }

    #[tokio::test]
    async fn test_static_source_load() {
        let source = StaticTextSource::new("a b  c");
        let document = source.load().await.unwrap();
        assert_eq!(document.into_tokens(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_file_source_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"from\ta file\n").unwrap();

        let source = FileTextSource::new(file.path());
        let document = source.load().await.unwrap();
        assert_eq!(document.raw(), "from\ta file\n");
        assert_eq!(document.tokens(), ["from", "a", "file"]);
    }

    #[tokio::test]
    async fn test_file_source_reads_fresh_each_time() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "first").unwrap();
        let source = FileTextSource::new(file.path());
        assert_eq!(source.load().await.unwrap().raw(), "first");

        std::fs::write(file.path(), "second version").unwrap();
        assert_eq!(source.load().await.unwrap().raw(), "second version");
    }

    #[tokio::test]
    async fn test_file_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.txt");
        let source = FileTextSource::new(&path);

        match source.load().await {
            Err(SourceError::Read { path: p, source }) => {
                assert_eq!(p, path);
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            Ok(_) => panic!("expected read error"),
        }
    }

    #[tokio::test]
    async fn test_file_source_rejects_invalid_utf8() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), [0xffu8, 0xfe, 0x00]).unwrap();
        let source = FileTextSource::new(file.path());

        match source.load().await {
            Err(SourceError::Read { source, .. }) => {
                assert_eq!(source.kind(), io::ErrorKind::InvalidData);
            }
            Ok(_) => panic!("expected invalid data error"),
        }
    }

    #[test]
    fn test_text_source_is_object_safe() {
        fn _assert_object_safe(_: Box<dyn TextSource>) {}
    }
}
