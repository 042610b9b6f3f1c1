use unicode_segmentation::UnicodeSegmentation;

use crate::chunk::Chunk;
use crate::error::{Error, Result};

/// Sizes are measured in extended grapheme clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::UsagePrecondition(
                "chunk size must be positive".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::UsagePrecondition(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    /// How far before the target end we look for a natural split point
    fn tolerance(&self) -> usize {
        (self.chunk_size / 5).max(1)
    }
}

/// Split-point preference, strongest first.
#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

pub struct Chunker {
    config: ChunkerConfig,
}

impl Chunker {
    pub fn new(config: ChunkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split text into ordered, overlapping chunks.
    ///
    /// Empty or whitespace-only input produces no chunks. Every chunk's text is
    /// exactly `text[start_offset..start_offset + chunk.text.len()]`.
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let units: Vec<(usize, &str)> = text.grapheme_indices(true).collect();
        let total = units.len();
        let byte_at = |i: usize| if i < total { units[i].0 } else { text.len() };

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            let end = if total - start <= self.config.chunk_size {
                total
            } else {
                self.split_point(&units, start, start + self.config.chunk_size)
            };

            let span = &text[byte_at(start)..byte_at(end)];
            if !span.trim().is_empty() {
                chunks.push(Chunk::new(chunks.len(), span.to_string(), byte_at(start)));
            }

            if end >= total {
                break;
            }

            // Step back by the overlap, but advance by at least the
            // non-overlapping span unless the cut came earlier than that
            let min_start = (start + self.config.chunk_size - self.config.chunk_overlap).min(end);
            start = end
                .saturating_sub(self.config.chunk_overlap)
                .max(min_start);
        }

        chunks
    }

    /// Pick the end (exclusive) of the chunk starting at `start`.
    /// Only the tolerance window before `target` is scanned; if it holds no
    /// boundary the chunk is cut hard at `target`. Cuts closer to `start`
    /// than the overlap are skipped, otherwise the next chunk would not
    /// move past this one.
    fn split_point(&self, units: &[(usize, &str)], start: usize, target: usize) -> usize {
        let window_start = target
            .saturating_sub(self.config.tolerance())
            .max(start + self.config.chunk_overlap + 1);

        for boundary in BOUNDARIES {
            for cut in (window_start..=target).rev() {
                if Self::is_boundary(units, start, cut, boundary) {
                    return cut;
                }
            }
        }

        target
    }

    /// Whether cutting before `units[cut]` ends the chunk on `boundary`
    fn is_boundary(units: &[(usize, &str)], start: usize, cut: usize, boundary: Boundary) -> bool {
        let last = units[cut - 1].1;
        let before_last = if cut >= start + 2 {
            Some(units[cut - 2].1)
        } else {
            None
        };

        match boundary {
            Boundary::Paragraph => is_newline(last) && before_last.is_some_and(is_newline),
            Boundary::Line => is_newline(last),
            Boundary::Sentence => {
                is_whitespace(last) && before_last.is_some_and(|g| matches!(g, "." | "!" | "?"))
            }
            Boundary::Word => is_whitespace(last),
        }
    }
}

fn is_newline(grapheme: &str) -> bool {
    matches!(grapheme, "\n" | "\r\n" | "\r")
}

fn is_whitespace(grapheme: &str) -> bool {
    grapheme.chars().all(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(size: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkerConfig {
            chunk_size: size,
            chunk_overlap: overlap,
        })
        .unwrap()
    }

    #[test]
    fn test_basic_chunking() {
        let chunker = Chunker::new(ChunkerConfig::default()).unwrap();
        let text = "This is a test paragraph.\n\nThis is another paragraph.";
        let chunks = chunker.chunk(text);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[0].start_offset, 0);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn test_empty_and_whitespace_input() {
        let chunker = chunker(100, 10);
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n\t  ").is_empty());
    }

    #[test]
    fn test_rejects_invalid_config() {
        assert!(Chunker::new(ChunkerConfig { chunk_size: 0, chunk_overlap: 0 }).is_err());
        assert!(Chunker::new(ChunkerConfig { chunk_size: 10, chunk_overlap: 10 }).is_err());
        assert!(Chunker::new(ChunkerConfig { chunk_size: 10, chunk_overlap: 9 }).is_ok());
    }

    #[test]
    fn test_hard_cut_without_whitespace() {
        let chunker = chunker(50, 10);
        let text = "a".repeat(200);
        let chunks = chunker.chunk(&text);

        let starts: Vec<usize> = chunks.iter().map(|c| c.start_offset).collect();
        assert_eq!(starts, vec![0, 40, 80, 120, 160]);
        assert!(chunks.iter().all(|c| c.text.len() <= 50));
        assert_eq!(chunks.last().unwrap().end_offset(), 200);
    }

    #[test]
    fn test_prefers_paragraph_boundary() {
        let chunker = chunker(60, 5);
        let text = format!("{}\n\n{}", "word ".repeat(10).trim_end(), "more ".repeat(20));
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() > 1);
        assert!(chunks[0].text.ends_with("\n\n"));
    }

    #[test]
    fn test_chunks_are_slices_of_source() {
        let chunker = chunker(40, 8);
        let text = "Alice works at Acme. Bob manages Alice!\nAcme is based in Paris. \
                    The office opened in 2020? Yes it did.\n\nNew paragraph here.";
        let chunks = chunker.chunk(text);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert_eq!(&text[chunk.start_offset..chunk.end_offset()], chunk.text);
        }
    }

    #[test]
    fn test_neighbours_overlap() {
        let chunker = chunker(30, 10);
        let text = "abcdefghij".repeat(10);
        let chunks = chunker.chunk(&text);

        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset < pair[0].end_offset());
        }
    }

    #[test]
    fn test_unicode_is_never_split() {
        let chunker = chunker(7, 2);
        let text = "日本語のテキスト👩‍👩‍👧é\u{301}".repeat(20);
        let chunks = chunker.chunk(&text);

        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(text.is_char_boundary(chunk.start_offset));
            assert!(text.is_char_boundary(chunk.end_offset()));
        }
    }

    #[test]
    fn test_massive_line_is_bounded() {
        let chunker = chunker(1000, 200);
        let text = "x".repeat(100_000);
        let chunks = chunker.chunk(&text);

        assert!(chunks.iter().all(|c| c.text.len() <= 1000));
        assert_eq!(chunks.last().unwrap().end_offset(), text.len());
    }

    #[test]
    fn test_deterministic() {
        let chunker = chunker(64, 16);
        let text = "Sentence one. Sentence two!\nLine three\n\nParagraph four. ".repeat(30);
        assert_eq!(chunker.chunk(&text), chunker.chunk(&text));
    }

    #[test]
    fn test_large_overlap_still_advances() {
        let chunker = chunker(100, 90);
        let text = format!("{}\n\n", "w".repeat(80)).repeat(10);
        let total = text.graphemes(true).count();
        let chunks = chunker.chunk(&text);

        assert!(chunks.len() <= total / (100 - 90) + 1, "{} chunks", chunks.len());
        for pair in chunks.windows(2) {
            assert!(pair[1].start_offset > pair[0].start_offset);
            assert!(pair[1].start_offset <= pair[0].end_offset());
            assert_ne!(pair[0].end_offset(), pair[1].end_offset());
        }
        assert_eq!(chunks.last().unwrap().end_offset(), text.len());
    }

    #[test]
    fn test_single_character() {
        let chunks = chunker(10, 2).chunk("x");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "x");
    }
}
