use sha2::{Digest, Sha256};

/// One fixed-width window over a document's extracted text. Chunks are
/// computed on demand and never persisted standalone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    /// Start offset in characters, not bytes.
    pub start: usize,
    pub index: usize,
    pub hash: String,
}

/// Deterministic sliding window over characters: window `i` starts at
/// `i * (size - overlap)` and covers `[start, start + size)` clamped to the
/// text length. No sentence or paragraph awareness. The caller guarantees
/// `overlap < size` (validated at startup); windows never split a code
/// point because offsets are computed per character.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<Chunk> {
    if text.is_empty() || size == 0 || overlap >= size {
        return Vec::new();
    }

    let byte_offsets: Vec<usize> = text.char_indices().map(|(offset, _)| offset).collect();
    let char_count = byte_offsets.len();
    let step = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut index = 0;
    while start < char_count {
        let end = start.saturating_add(size).min(char_count);
        let byte_start = byte_offsets.get(start).copied().unwrap_or(text.len());
        let byte_end = byte_offsets.get(end).copied().unwrap_or(text.len());
        let window = text.get(byte_start..byte_end).unwrap_or_default();

        chunks.push(Chunk {
            text: window.to_string(),
            start,
            index,
            hash: chunk_hash(window),
        });

        start = start.saturating_add(step);
        index += 1;
    }

    chunks
}

fn chunk_hash(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    format!("{digest:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunks = chunk_text("hello world", 500, 50);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].index, 0);
    }

    #[test]
    fn windows_cover_the_whole_text() {
        let text: String = ('a'..='z').cycle().take(137).collect();
        let size = 40;
        let overlap = 10;
        let chunks = chunk_text(&text, size, overlap);

        // Every chunk except possibly the last has exactly `size` chars.
        for chunk in chunks.iter().take(chunks.len() - 1) {
            assert_eq!(chunk.text.chars().count(), size);
        }

        // The union of covered offsets equals [0, len).
        let mut covered = vec![false; text.chars().count()];
        for chunk in &chunks {
            for offset in chunk.start..chunk.start + chunk.text.chars().count() {
                covered[offset] = true;
            }
        }
        assert!(covered.iter().all(|seen| *seen));

        // Window starts follow i * (size - overlap).
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start, i * (size - overlap));
            assert_eq!(chunk.index, i);
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = "the quick brown fox jumps over the lazy dog".repeat(20);
        let first = chunk_text(&text, 100, 25);
        let second = chunk_text(&text, 100, 25);
        assert_eq!(first, second);
        assert!(first
            .iter()
            .zip(second.iter())
            .all(|(a, b)| a.hash == b.hash));
    }

    #[test]
    fn multibyte_text_never_splits_code_points() {
        let text = "héllo wörld ünïcode çontent".repeat(10);
        let chunks = chunk_text(&text, 16, 4);

        let reassembled_chars: usize = chunks
            .iter()
            .map(|chunk| chunk.text.chars().count())
            .sum();
        // With overlap 4, everything but the first chunk re-counts 4 chars.
        let expected = text.chars().count() + (chunks.len() - 1) * 4;
        assert_eq!(reassembled_chars, expected);
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 500, 50).is_empty());
    }

    #[test]
    fn degenerate_bounds_yield_no_chunks() {
        assert!(chunk_text("some text", 0, 0).is_empty());
        assert!(chunk_text("some text", 10, 10).is_empty());
        assert!(chunk_text("some text", 10, 20).is_empty());
    }
}
