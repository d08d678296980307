//! Separator-based text splitter used before embedding.
//!
//! The text is cut on every occurrence of the separator (which is dropped),
//! then adjacent pieces are re-joined with the separator for as long as the
//! joined chunk stays within `chunk_size` characters. A single piece larger
//! than `chunk_size` becomes its own oversized chunk. No overlap.

use tracing::warn;

/// Literal token marking a listing boundary.
pub const LISTING_SEPARATOR: &str = "Listing";
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

#[derive(Debug, Clone)]
pub struct TextSplitter {
    separator: String,
    chunk_size: usize,
}

impl Default for TextSplitter {
    fn default() -> Self {
        Self::new(LISTING_SEPARATOR, DEFAULT_CHUNK_SIZE)
    }
}

impl TextSplitter {
    pub fn new(separator: impl Into<String>, chunk_size: usize) -> Self {
        Self {
            separator: separator.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let separator_len = self.separator.chars().count();
        let pieces: Vec<&str> = if self.separator.is_empty() {
            vec![text]
        } else {
            text.split(self.separator.as_str())
                .filter(|p| !p.is_empty())
                .collect()
        };

        let mut chunks = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut total = 0usize;

        for piece in pieces {
            let len = piece.chars().count();
            let joiner = if current.is_empty() { 0 } else { separator_len };

            if !current.is_empty() && total + joiner + len > self.chunk_size {
                self.flush(&current, total, &mut chunks);
                current.clear();
                total = 0;
            }

            total += if current.is_empty() { len } else { separator_len + len };
            current.push(piece);
        }

        self.flush(&current, total, &mut chunks);
        chunks
    }

    fn flush(&self, pieces: &[&str], total: usize, chunks: &mut Vec<String>) {
        if pieces.is_empty() {
            return;
        }
        if total > self.chunk_size {
            warn!(
                "Created a chunk of size {total}, which is longer than the specified {}",
                self.chunk_size
            );
        }
        let chunk = pieces.join(&self.separator);
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_is_one_chunk() {
        let splitter = TextSplitter::default();
        let text = "neighborhood:Lakeside\ndescription:Listing with a pool.";
        assert_eq!(splitter.split(text), vec![text.to_string()]);
    }

    #[test]
    fn test_splits_on_separator_when_too_long() {
        let splitter = TextSplitter::new("|", 10);
        let chunks = splitter.split("aaaa|bbbb|cccccccc|dd");
        assert_eq!(chunks, vec!["aaaa|bbbb", "cccccccc", "dd"]);
    }

    #[test]
    fn test_oversized_piece_kept_whole() {
        let splitter = TextSplitter::new("|", 5);
        let chunks = splitter.split("abcdefghij|xy");
        assert_eq!(chunks, vec!["abcdefghij", "xy"]);
    }

    #[test]
    fn test_empty_pieces_and_whitespace_dropped() {
        let splitter = TextSplitter::new("|", 3);
        let chunks = splitter.split("||  |ab||");
        assert_eq!(chunks, vec!["ab"]);
    }

    #[test]
    fn test_listing_boundary_splits_long_serialization() {
        let splitter = TextSplitter::default();
        let first = "x".repeat(700);
        let second = "y".repeat(700);
        let text = format!("{first}Listing{second}");
        let chunks = splitter.split(&text);
        assert_eq!(chunks, vec![first, second]);
    }
}
