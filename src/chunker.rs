//! Recursive character text splitter.
//!
//! Splits document text into overlapping spans of at most `chunk_size`
//! characters, preferring paragraph (`\n\n`), line (`\n`), sentence (`. `)
//! and word (` `) boundaries before falling back to a hard character cut.
//! Separators stay attached to the preceding span, so concatenating the
//! chunks with overlaps removed reproduces the input exactly.
//!
//! Consecutive chunks share up to `chunk_overlap` characters of trailing
//! context. Every input always yields at least one chunk.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::{Chunk, ChunkMeta};

/// Boundary preference order. The empty string means hard character cut.
const SEPARATORS: [&str; 4] = ["\n\n", "\n", ". ", " "];

/// Configured splitter. Construct once per ingestion run.
#[derive(Debug, Clone)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Rejects `chunk_overlap >= chunk_size` before any chunk is produced.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::invalid("chunk_size must be > 0"));
        }
        if chunk_overlap >= chunk_size {
            return Err(Error::invalid(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Split `text` into ordered spans. Always returns at least one span.
    pub fn split(&self, text: &str) -> Vec<String> {
        if char_len(text) <= self.chunk_size {
            return vec![text.to_string()];
        }
        self.split_recursive(text, &SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let Some(pos) = separators.iter().position(|sep| text.contains(sep)) else {
            return self.hard_split(text);
        };
        let sep = separators[pos];
        let rest = &separators[pos + 1..];

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in split_keep_separator(text, sep) {
            if char_len(&piece) > self.chunk_size {
                // Oversized piece: flush what we have, then descend to finer
                // separators for this piece alone.
                if !pending.is_empty() {
                    chunks.extend(self.merge(std::mem::take(&mut pending)));
                }
                chunks.extend(self.split_recursive(&piece, rest));
            } else {
                pending.push(piece);
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge(pending));
        }

        chunks
    }

    /// Greedily merge pieces into chunks of at most `chunk_size` characters,
    /// carrying up to `chunk_overlap` trailing characters into the next chunk.
    fn merge(&self, pieces: Vec<String>) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut buf: std::collections::VecDeque<String> = std::collections::VecDeque::new();
        let mut total = 0usize;

        for piece in pieces {
            let piece_len = char_len(&piece);

            if total + piece_len > self.chunk_size && !buf.is_empty() {
                chunks.push(buf.iter().map(String::as_str).collect::<String>());

                // Drop head pieces until what remains fits the overlap budget
                // and leaves room for the incoming piece.
                while total > self.chunk_overlap
                    || (total + piece_len > self.chunk_size && total > 0)
                {
                    let Some(head) = buf.pop_front() else { break };
                    total -= char_len(&head);
                }
            }

            total += piece_len;
            buf.push_back(piece);
        }

        if !buf.is_empty() {
            chunks.push(buf.iter().map(String::as_str).collect::<String>());
        }

        chunks
    }

    /// Character-window fallback when no separator is available: windows of
    /// `chunk_size` characters advancing by `chunk_size - chunk_overlap`.
    fn hard_split(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        let step = self.chunk_size - self.chunk_overlap;
        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let end = (start + self.chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Split `text` on `sep`, keeping the separator attached to the preceding
/// piece so no character of the input is lost.
fn split_keep_separator(text: &str, sep: &str) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut start = 0usize;

    while let Some(found) = text[start..].find(sep) {
        let end = start + found + sep.len();
        pieces.push(text[start..end].to_string());
        start = end;
    }
    if start < text.len() {
        pieces.push(text[start..].to_string());
    }

    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Attach provenance to every span produced from one document. Pure.
pub fn tag_chunks(
    spans: Vec<String>,
    filename: &str,
    client_id: &str,
    upload_date: DateTime<Utc>,
    file_size: u64,
) -> Vec<Chunk> {
    spans
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            text,
            index,
            meta: ChunkMeta {
                filename: filename.to_string(),
                client_id: client_id.to_string(),
                upload_date,
                file_size,
            },
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn splitter(size: usize, overlap: usize) -> TextSplitter {
        TextSplitter::new(size, overlap).unwrap()
    }

    /// Rejoin chunks by stripping each chunk's leading overlap with the
    /// text accumulated so far.
    fn reassemble(chunks: &[String]) -> String {
        let mut out = chunks[0].clone();
        for chunk in &chunks[1..] {
            let mut k = out.len().min(chunk.len());
            while k > 0 && !out.ends_with(&chunk[..k]) {
                k -= 1;
            }
            out.push_str(&chunk[k..]);
        }
        out
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(TextSplitter::new(100, 100).is_err());
        assert!(TextSplitter::new(100, 150).is_err());
        assert!(TextSplitter::new(100, 99).is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        assert!(TextSplitter::new(0, 0).is_err());
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = splitter(1000, 200).split("Hello, world!");
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn test_empty_text_single_chunk() {
        let chunks = splitter(1000, 200).split("");
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_2500_chars_default_settings_three_chunks() {
        // Separator-less text falls through to the character window:
        // 0..1000, 800..1800, 1600..2500.
        let text = "a".repeat(2500);
        let chunks = splitter(1000, 200).split(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 1000);
        assert_eq!(chunks[1].len(), 1000);
        assert_eq!(chunks[2].len(), 900);
    }

    #[test]
    fn test_hard_split_windows_overlap() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 23) as u8)).collect();
        let chunks = splitter(1000, 200).split(&text);
        assert_eq!(chunks.len(), 3);
        // Each window starts 200 characters before the previous one ended.
        assert_eq!(&chunks[1][..200], &chunks[0][800..]);
        assert_eq!(&chunks[2][..200], &chunks[1][800..]);
    }

    #[test]
    fn test_prefers_paragraph_boundaries() {
        let para = "x".repeat(400);
        let text = format!("{para}\n\n{para}\n\n{para}");
        let chunks = splitter(1000, 200).split(&text);
        assert!(chunks.len() >= 2);
        // No chunk cuts a paragraph in half.
        for chunk in &chunks {
            for piece in chunk.split("\n\n").filter(|p| !p.is_empty()) {
                assert_eq!(piece.len(), 400, "paragraph was cut: {} chars", piece.len());
            }
        }
    }

    #[test]
    fn test_rejoined_chunks_reproduce_input() {
        let text: String = (0..120)
            .map(|i| format!("Sentence number {i} talks about topic {}. ", i * 7))
            .collect();
        let chunks = splitter(300, 60).split(&text);
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_rejoin_exact_on_hard_split() {
        // Concatenated integers: aperiodic, so the overlap match is unambiguous.
        let text: String = (0..1500).map(|i| i.to_string()).collect();
        let chunks = splitter(1000, 200).split(&text);
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks), text);
    }

    #[test]
    fn test_deterministic() {
        let text = "Alpha.\n\nBeta gamma delta.\n\nEpsilon zeta.".repeat(50);
        let a = splitter(200, 40).split(&text);
        let b = splitter(200, 40).split(&text);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_chunk_exceeds_size_on_word_text() {
        let text = "word ".repeat(1000);
        let chunks = splitter(100, 20).split(&text);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 100, "chunk too long: {}", chunk.len());
        }
    }

    #[test]
    fn test_tag_chunks_attaches_provenance() {
        let now = Utc::now();
        let chunks = tag_chunks(
            vec!["one".to_string(), "two".to_string()],
            "notes.txt",
            "acme",
            now,
            42,
        );
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        for c in &chunks {
            assert_eq!(c.meta.filename, "notes.txt");
            assert_eq!(c.meta.client_id, "acme");
            assert_eq!(c.meta.upload_date, now);
            assert_eq!(c.meta.file_size, 42);
        }
    }

    #[test]
    fn test_split_keep_separator_loses_nothing() {
        let text = "a b  c ";
        let pieces = split_keep_separator(text, " ");
        assert_eq!(pieces.concat(), text);
    }
}
