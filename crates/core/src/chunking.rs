use crate::error::IngestError;
use crate::models::TextChunk;

pub const DEFAULT_CHUNK_SIZE: usize = 1_000;
pub const DEFAULT_OVERLAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    /// Soft character budget per chunk.
    pub chunk_size: usize,
    /// Carry-over between chunks; every 10 units repeat one trailing word.
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, IngestError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidArgument(
                "chunk_size must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }

    pub fn overlap_words(&self) -> usize {
        self.overlap / 10
    }
}

/// Splits `text` into overlapping, word-aligned chunks.
///
/// Words are packed greedily until the next one would push the running
/// length (each word counts its characters plus one separator) past
/// `chunk_size`. The closed chunk's last `overlap / 10` words then seed the
/// next chunk. A word longer than the budget is never split.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Result<Vec<TextChunk>, IngestError> {
    let config = ChunkingConfig::new(chunk_size, overlap)?;
    Ok(chunk_with(text, &config))
}

pub fn chunk_with(text: &str, config: &ChunkingConfig) -> Vec<TextChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_length = 0usize;
    let seed_words = config.overlap_words();

    for word in text.split_whitespace() {
        let contribution = word_cost(word);

        if current_length + contribution > config.chunk_size && !current.is_empty() {
            let seed_start = current.len().saturating_sub(seed_words);
            let mut next = if config.overlap > 0 {
                current[seed_start..].to_vec()
            } else {
                Vec::new()
            };

            chunks.push(make_chunk(chunks.len() as u64, &current));

            next.push(word);
            current_length = next.iter().map(|w| word_cost(w)).sum();
            current = next;
        } else {
            current.push(word);
            current_length += contribution;
        }
    }

    if !current.is_empty() {
        chunks.push(make_chunk(chunks.len() as u64, &current));
    }

    chunks
}

fn word_cost(word: &str) -> usize {
    word.chars().count() + 1
}

fn make_chunk(chunk_id: u64, words: &[&str]) -> TextChunk {
    let text = words.join(" ");
    TextChunk {
        chunk_id,
        length: text.chars().count(),
        word_count: words.len(),
        text,
    }
}
