//! Byte-offset to line/column mapping.
//!
//! The injector and the detectors resolve many offsets per file, so the
//! newline positions are collected once and each lookup is a binary search.

/// Precomputed newline table for one source buffer.
pub struct LineIndex {
    /// Byte offset of the start of each line; `line_starts[0] == 0`.
    line_starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self { line_starts }
    }

    /// 1-indexed line containing `offset`.
    pub fn line(&self, offset: usize) -> usize {
        self.line_starts.partition_point(|&s| s <= offset)
    }

    /// (line, col), both 1-indexed.
    pub fn line_col(&self, offset: usize) -> (usize, usize) {
        let line = self.line(offset);
        let start = self.line_starts[line - 1];
        (line, offset.saturating_sub(start) + 1)
    }

    /// Number of lines in the indexed buffer.
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}
