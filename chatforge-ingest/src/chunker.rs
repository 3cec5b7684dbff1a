//! Paragraph chunker.
//!
//! Text is split on blank lines, each paragraph trimmed, and paragraphs
//! longer than `max_size` characters are cut into fixed-width slices. There
//! is no overlap and no word-boundary awareness.

use std::sync::LazyLock;

use chatforge_core::config::RetrievalConfig;
use regex::Regex;

pub const DEFAULT_CHUNK_SIZE: usize = 700;
pub const DEFAULT_MAX_CHUNKS: usize = 1000;

/// A newline, one or more whitespace-only lines, a newline.
static PARAGRAPH_BREAK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\r?\n(?:[ \t]*\r?\n)+").expect("paragraph break pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk. 0 is treated as 1.
    pub max_size: usize,
    /// Chunks past this count are dropped.
    pub max_chunks: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_CHUNK_SIZE,
            max_chunks: DEFAULT_MAX_CHUNKS,
        }
    }
}

impl From<&RetrievalConfig> for ChunkingConfig {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            max_size: config.chunk_size,
            max_chunks: config.max_chunks,
        }
    }
}

/// Chunk `text` with the default chunk cap.
pub fn chunk(text: &str, max_size: usize) -> Vec<String> {
    chunk_with_limit(
        text,
        &ChunkingConfig {
            max_size,
            ..ChunkingConfig::default()
        },
    )
}

pub fn chunk_with_limit(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let max_size = config.max_size.max(1);

    let mut chunks = Vec::new();
    for paragraph in PARAGRAPH_BREAK.split(text) {
        let paragraph = paragraph.trim();
        if paragraph.is_empty() {
            continue;
        }

        if paragraph.chars().count() <= max_size {
            chunks.push(paragraph.to_string());
            continue;
        }

        let chars: Vec<char> = paragraph.chars().collect();
        chunks.extend(chars.chunks(max_size).map(|slice| slice.iter().collect::<String>()));
    }

    if chunks.len() > config.max_chunks {
        tracing::warn!(
            produced = chunks.len(),
            kept = config.max_chunks,
            "Knowledge text exceeds chunk cap; trailing chunks dropped"
        );
        chunks.truncate(config.max_chunks);
    }

    chunks
}
