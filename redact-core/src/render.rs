//! Rendering a syntax tree back to source text
//!
//! Unchanged regions are copied byte-for-byte from the parsed source, so a
//! tree without rewritten bodies renders to exactly its input.

use crate::tree::{Body, FunctionDef, Node, Suite, SyntaxTree};

/// Replacement of `source[start..end]`
struct Edit {
    start: usize,
    end: usize,
    text: String,
}

/// Render `tree` as Python source
pub fn render(tree: &SyntaxTree) -> String {
    let source = tree.source();
    let mut edits = Vec::new();
    collect_edits(tree.module(), &mut edits);
    edits.sort_by_key(|edit| edit.start);

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        // Rewritten bodies are never descended into, so edits are disjoint
        debug_assert!(
            edit.start >= cursor,
            "overlapping body edits at byte {}",
            edit.start
        );
        if edit.start < cursor {
            continue;
        }
        out.push_str(source.get(cursor..edit.start).unwrap_or_default());
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(source.get(cursor..).unwrap_or_default());
    out
}

fn collect_edits(suite: &Suite, edits: &mut Vec<Edit>) {
    for node in suite.iter() {
        if let Node::FunctionDef(def) = node {
            if let Body::Explanation(text) = &def.body {
                edits.push(body_edit(def, text));
                continue;
            }
        }
        for child in node.suites() {
            collect_edits(child, edits);
        }
    }
}

/// Header is kept through its `:`; the body becomes one indented `return`
fn body_edit(def: &FunctionDef, explanation: &str) -> Edit {
    Edit {
        start: def.header.end,
        end: def.body_span.end,
        text: format!(
            "\n{}return {}",
            def.body_indent,
            quote_python_string(explanation)
        ),
    }
}

/// Double-quoted Python string literal holding `text` exactly
pub fn quote_python_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let code = c as u32;
                if code <= 0xff {
                    out.push_str(&format!("\\x{:02x}", code));
                } else {
                    out.push_str(&format!("\\u{:04x}", code));
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
