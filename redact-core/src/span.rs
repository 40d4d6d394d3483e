//! Source span representation shared by the syntax tree and the records

use serde::{Deserialize, Serialize};

/// Contiguous region of the parsed source
///
/// Spans are copied verbatim onto rewritten nodes so that line information
/// survives the body substitution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Byte offset of the start of the span (inclusive)
    pub start: usize,
    /// Byte offset of the end of the span (exclusive)
    pub end: usize,
    /// Line number of the start (1-indexed)
    pub start_line: u32,
    /// Line number of the end (1-indexed)
    pub end_line: u32,
    /// Column number of the start (0-indexed, in bytes)
    pub start_col: u32,
}

impl SourceSpan {
    /// Create a new source span
    pub fn new(start: usize, end: usize, start_line: u32, end_line: u32, start_col: u32) -> Self {
        SourceSpan {
            start,
            end,
            start_line,
            end_line,
            start_col,
        }
    }

    /// Span covering a tree-sitter node
    pub fn of(node: tree_sitter::Node<'_>) -> Self {
        // tree-sitter rows are 0-indexed
        SourceSpan::new(
            node.start_byte(),
            node.end_byte(),
            node.start_position().row as u32 + 1,
            node.end_position().row as u32 + 1,
            node.start_position().column as u32,
        )
    }

    /// Span from the start of `self` to the end of `other`
    pub fn to(&self, other: &SourceSpan) -> Self {
        SourceSpan {
            start: self.start,
            end: other.end,
            start_line: self.start_line,
            end_line: other.end_line,
            start_col: self.start_col,
        }
    }
}
