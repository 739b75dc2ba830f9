//! Line-aligned text chunking with overlapping windows.
//!
//! Files are split into windows of whole lines bounded by a character
//! budget. Consecutive windows share a trailing run of lines so that a
//! match near a chunk boundary is still visible in at least one chunk
//! together with its surrounding context.
//!
//! # Algorithm
//!
//! 1. Split the text into lines, keeping each line's terminator.
//! 2. Accumulate lines into a pending window, counting characters
//!    (terminator included).
//! 3. When the next line would push the window past `chunk_size` and the
//!    window is non-empty, emit it, then seed the next window with the
//!    shortest trailing run of its lines reaching `overlap` characters.
//! 4. Emit whatever remains once every line has been consumed.
//!
//! The carried run is capped at the whole closed window. Every close
//! consumes one new line, so windows always end strictly after their
//! predecessor and chunking terminates even when `overlap >= chunk_size`.
//! In that case each window re-carries its predecessor in full.

use thiserror::Error;

/// Errors that can occur when configuring the chunker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkerError {
    #[error("Invalid chunker configuration: {0}")]
    InvalidConfig(String),
}

/// A contiguous run of lines taken from a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Exact text of the lines in this chunk, terminators included
    pub text: String,

    /// First line (1-indexed)
    pub line_start: usize,

    /// Last line (1-indexed, inclusive)
    pub line_end: usize,
}

/// Splits file content into overlapping line windows.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker with the given character budgets.
    ///
    /// # Arguments
    /// * `chunk_size` - Advisory maximum characters per chunk; must be non-zero
    /// * `overlap` - Characters of trailing context carried into the next chunk
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkerError> {
        if chunk_size == 0 {
            return Err(ChunkerError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
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

    /// Split `content` into ordered, gap-free windows.
    ///
    /// Empty input yields no chunks. A single line longer than the budget is
    /// emitted whole rather than truncated.
    pub fn split(&self, content: &str) -> Vec<TextChunk> {
        if content.is_empty() {
            return Vec::new();
        }

        let lines: Vec<&str> = content.split_inclusive('\n').collect();
        let lengths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();

        let mut chunks = Vec::new();
        // Pending window is lines[start..i]
        let mut start = 0usize;
        let mut window_chars = 0usize;

        for (i, &len) in lengths.iter().enumerate() {
            if window_chars + len > self.chunk_size && i > start {
                chunks.push(make_chunk(&lines, start, i));

                let mut next_start = i;
                let mut carried = 0usize;
                while next_start > start && carried < self.overlap {
                    next_start -= 1;
                    carried += lengths[next_start];
                }

                start = next_start;
                window_chars = carried;
            }

            window_chars += len;
        }

        if start < lines.len() {
            chunks.push(make_chunk(&lines, start, lines.len()));
        }

        chunks
    }
}

/// Build a chunk from `lines[start..end]`.
fn make_chunk(lines: &[&str], start: usize, end: usize) -> TextChunk {
    TextChunk {
        text: lines[start..end].concat(),
        line_start: start + 1,
        line_end: end,
    }
}
