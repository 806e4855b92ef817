//! Sentence-aligned chunking.
//!
//! Text is split into sentence-like units at terminal punctuation (`.`, `!`, `?` followed by
//! whitespace) and at blank lines. Sentences are then packed greedily: the running buffer is
//! flushed as soon as the next sentence would push it past `chunk_size` characters, and the
//! sentence that did not fit opens the next chunk.
//!
//! - The size bound is soft. A sentence longer than `chunk_size` becomes a chunk of its own and
//!   is never truncated.
//! - `chunk_overlap` carries trailing whole sentences of the flushed chunk into the next one,
//!   up to that many characters, but only when the carried sentences and the sentence that
//!   opened the new chunk still fit. Zero disables it.
//! - Lengths are counted in `char`s, not bytes.

use crate::config::ChunkingSettings;

use super::types::{Chunk, ChunkMetadata, ChunkingError};

/// Chunk extracted text and stamp each chunk with a copy of `template` carrying its index.
pub fn chunk_document(
    text: &str,
    template: &ChunkMetadata,
    settings: ChunkingSettings,
) -> Result<Vec<Chunk>, ChunkingError> {
    let chunks = chunk_text(text, settings)?
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| Chunk {
            text,
            metadata: ChunkMetadata {
                chunk_index,
                ..template.clone()
            },
        })
        .collect();
    Ok(chunks)
}

/// Split text into sentence-aligned chunks.
///
/// Returns an empty vector when the input contains only whitespace.
pub fn chunk_text(text: &str, settings: ChunkingSettings) -> Result<Vec<String>, ChunkingError> {
    let ChunkingSettings {
        chunk_size,
        chunk_overlap,
    } = settings;
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }

    let mut chunks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut buffer_len = 0;

    for sentence in split_sentences(text) {
        let sentence_len = char_len(sentence);
        if buffer.is_empty() || buffer_len + 1 + sentence_len <= chunk_size {
            buffer_len = joined_len(buffer_len, buffer.len(), sentence_len);
            buffer.push(sentence);
            continue;
        }

        chunks.push(buffer.join(" "));
        let carried = overlap_tail(&buffer, chunk_overlap, sentence_len, chunk_size);
        buffer = buffer[buffer.len() - carried..].to_vec();
        buffer_len = buffer.iter().fold(0, |len, part| {
            joined_len(len, usize::from(len > 0), char_len(part))
        });
        buffer_len = joined_len(buffer_len, buffer.len(), sentence_len);
        buffer.push(sentence);
    }

    if !buffer.is_empty() {
        chunks.push(buffer.join(" "));
    }

    Ok(chunks)
}

/// Number of trailing sentences of `buffer` to carry into the next chunk.
fn overlap_tail(buffer: &[&str], overlap: usize, next_len: usize, chunk_size: usize) -> usize {
    if overlap == 0 {
        return 0;
    }

    let mut carried = 0;
    let mut carried_len = 0;
    for sentence in buffer.iter().rev() {
        let candidate = joined_len(carried_len, carried, char_len(sentence));
        if candidate > overlap || candidate + 1 + next_len > chunk_size {
            break;
        }
        carried += 1;
        carried_len = candidate;
    }
    carried
}

fn joined_len(current_len: usize, parts: usize, next_len: usize) -> usize {
    if parts == 0 {
        next_len
    } else {
        current_len + 1 + next_len
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Split text into trimmed, non-empty sentence-like units.
pub(crate) fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((offset, current)) = chars.next() {
        let next = chars.peek().map(|(_, next)| *next);
        let boundary = match current {
            '.' | '!' | '?' => next.is_none_or(char::is_whitespace),
            '\n' => next == Some('\n') || next == Some('\r'),
            _ => false,
        };
        if boundary {
            let end = offset + current.len_utf8();
            push_trimmed(&mut sentences, &text[start..end]);
            start = end;
        }
    }
    push_trimmed(&mut sentences, &text[start..]);
    sentences
}

fn push_trimmed<'a>(sentences: &mut Vec<&'a str>, candidate: &'a str) {
    let trimmed = candidate.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }
}
