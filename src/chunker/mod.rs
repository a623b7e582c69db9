//! Deterministic overlapping-window text chunker
//!
//! Splits source text into windows of at most `chunk_size` bytes that
//! advance by `chunk_size - overlap`. A window ends preferentially at a
//! paragraph boundary (`\n\n`); a paragraph longer than `chunk_size` falls
//! back to a fixed-size slice. Windows record byte offsets into the
//! original text, so concatenating the non-overlapping regions of
//! consecutive windows reconstructs the input exactly.

use crate::error::{MindsongError, Result};

/// One window over the source text
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkWindow {
    /// Zero-based position within the file's window sequence
    pub index: usize,
    /// Byte offset of the window start in the original text
    pub start: usize,
    /// Byte offset one past the window end
    pub end: usize,
    /// The window's text, an exact slice of the original
    pub text: String,
}

/// Splitter with validated geometry
///
/// Splitting is pure: identical input and parameters always yield identical
/// window boundaries and count.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(MindsongError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(MindsongError::Config(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split text into overlapping windows.
    ///
    /// Empty or whitespace-only input yields no windows; callers skip such
    /// files upstream.
    pub fn split(&self, text: &str) -> Vec<ChunkWindow> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let len = text.len();
        let mut windows = Vec::new();
        let mut start = 0usize;
        let mut index = 0usize;

        loop {
            let mut end = if start + self.chunk_size >= len {
                len
            } else {
                floor_char_boundary(text, start + self.chunk_size)
            };

            if end < len {
                // Prefer the last paragraph break in the window, as long as
                // it lies beyond the overlap region so the next window still
                // advances.
                if let Some(rel) = text[start..end].rfind("\n\n") {
                    let candidate = start + rel + 2;
                    if candidate - start > self.overlap {
                        end = candidate;
                    }
                }
            }

            windows.push(ChunkWindow {
                index,
                start,
                end,
                text: text[start..end].to_string(),
            });

            if end >= len {
                break;
            }

            let mut next = floor_char_boundary(text, end - self.overlap);
            if next <= start {
                // Degenerate geometry (multi-byte flooring); force progress.
                next = next_char_boundary(text, start);
            }
            start = next;
            index += 1;
        }

        windows
    }
}

fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    if idx >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn next_char_boundary(text: &str, idx: usize) -> usize {
    let mut next = idx + 1;
    while next < text.len() && !text.is_char_boundary(next) {
        next += 1;
    }
    next.min(text.len())
}
