//! Python parser using tree-sitter
//!
//! Global invariants enforced:
//! - A tree containing ERROR or MISSING nodes is rejected, never partially used
//! - Statements are collected in source order
//! - Comments are kept as statements so the tree covers the whole source

use crate::span::SourceSpan;
use crate::tree::{
    Annotation, Body, ClassDef, Compound, Decorator, FunctionDef, Node, Parameter, ParameterKind,
    Parameters, Statement, Suite, SyntaxTree,
};
use std::sync::Arc;
use thiserror::Error;
use tree_sitter::Parser;

/// Longest snippet of offending source quoted in a syntax error
const SNIPPET_LIMIT: usize = 40;

/// Indentation added to an inline body when it is moved onto its own line
const INDENT_UNIT: &str = "    ";

/// Reasons the source could not be turned into a syntax tree
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to load the Python grammar: {0}")]
    Language(#[from] tree_sitter::LanguageError),

    #[error("the parser did not produce a syntax tree")]
    NoTree,

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: u32,
        column: u32,
        message: String,
    },
}

/// Python parser using tree-sitter
pub struct PythonParser;

impl PythonParser {
    /// Create a new Python parser
    pub fn new() -> Result<Self, ParseError> {
        // Just validate that the grammar loads
        new_ts_parser()?;
        Ok(PythonParser)
    }

    /// Parse `source` into a [`SyntaxTree`]
    ///
    /// A leading byte-order mark is dropped before parsing.
    pub fn parse(&self, source: &str) -> Result<SyntaxTree, ParseError> {
        // tree-sitter needs a mutable parser, so one is built per call
        let mut parser = new_ts_parser()?;
        let source = source.strip_prefix('\u{feff}').unwrap_or(source);

        let tree = parser.parse(source, None).ok_or(ParseError::NoTree)?;
        let root = tree.root_node();
        if root.has_error() {
            return Err(syntax_error(root, source));
        }

        let builder = TreeBuilder { source };
        let module = builder.suite(root);
        Ok(SyntaxTree::new(Arc::from(source), module))
    }
}

/// Parse `source` with a fresh [`PythonParser`]
pub fn parse(source: &str) -> Result<SyntaxTree, ParseError> {
    PythonParser::new()?.parse(source)
}

fn new_ts_parser() -> Result<Parser, ParseError> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into())?;
    Ok(parser)
}

fn syntax_error(root: tree_sitter::Node<'_>, source: &str) -> ParseError {
    let Some(node) = first_error(root) else {
        return ParseError::Syntax {
            line: 1,
            column: 0,
            message: "invalid syntax".to_string(),
        };
    };

    let message = if node.is_missing() {
        format!("missing `{}`", node.kind())
    } else {
        let text = source.get(node.byte_range()).unwrap_or_default();
        let first_line = text.lines().next().unwrap_or_default();
        let snippet: String = first_line.chars().take(SNIPPET_LIMIT).collect();
        format!("unexpected `{}`", snippet)
    };

    ParseError::Syntax {
        line: node.start_position().row as u32 + 1,
        column: node.start_position().column as u32,
        message,
    }
}

/// First ERROR or MISSING node in document order
fn first_error(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    let mut cursor = node.walk();
    let children: Vec<_> = node.children(&mut cursor).collect();
    children.into_iter().find_map(first_error)
}

fn is_definition(kind: &str) -> bool {
    matches!(
        kind,
        "function_definition" | "class_definition" | "decorated_definition"
    )
}

/// Converts tree-sitter nodes into the owned [`SyntaxTree`] representation
struct TreeBuilder<'s> {
    source: &'s str,
}

impl<'s> TreeBuilder<'s> {
    fn text(&self, node: tree_sitter::Node<'_>) -> &'s str {
        self.source.get(node.byte_range()).unwrap_or_default()
    }

    fn suite(&self, container: tree_sitter::Node<'_>) -> Suite {
        let mut cursor = container.walk();
        let nodes = container
            .named_children(&mut cursor)
            .map(|child| Arc::new(self.node(child)))
            .collect();
        Suite {
            nodes,
            span: SourceSpan::of(container),
        }
    }

    fn node(&self, node: tree_sitter::Node<'_>) -> Node {
        let span = SourceSpan::of(node);
        let built = match node.kind() {
            "function_definition" => self.function(node, Vec::new(), span).map(Node::FunctionDef),
            "class_definition" => self.class(node, Vec::new(), span).map(Node::ClassDef),
            "decorated_definition" => self.decorated(node),
            _ => None,
        };
        built.unwrap_or_else(|| self.statement(node))
    }

    fn statement(&self, node: tree_sitter::Node<'_>) -> Node {
        let mut suites = Vec::new();
        self.collect_blocks(node, &mut suites);
        if suites.is_empty() {
            Node::Statement(Statement {
                kind: node.kind(),
                span: SourceSpan::of(node),
            })
        } else {
            Node::Compound(Compound {
                kind: node.kind(),
                span: SourceSpan::of(node),
                suites,
            })
        }
    }

    /// Blocks owned by a compound statement, including those of its clauses
    fn collect_blocks(&self, node: tree_sitter::Node<'_>, suites: &mut Vec<Suite>) {
        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            if child.kind() == "block" {
                suites.push(self.suite(child));
            } else if !is_definition(child.kind()) {
                self.collect_blocks(child, suites);
            }
        }
    }

    fn decorated(&self, node: tree_sitter::Node<'_>) -> Option<Node> {
        let span = SourceSpan::of(node);
        let mut cursor = node.walk();
        let decorators: Vec<Decorator> = node
            .named_children(&mut cursor)
            .filter(|child| child.kind() == "decorator")
            .map(|child| Decorator {
                text: self.text(child).to_string(),
                span: SourceSpan::of(child),
            })
            .collect();

        let definition = node.child_by_field_name("definition")?;
        match definition.kind() {
            "function_definition" => self
                .function(definition, decorators, span)
                .map(Node::FunctionDef),
            "class_definition" => self.class(definition, decorators, span).map(Node::ClassDef),
            _ => None,
        }
    }

    fn class(
        &self,
        node: tree_sitter::Node<'_>,
        decorators: Vec<Decorator>,
        span: SourceSpan,
    ) -> Option<ClassDef> {
        let name = self.text(node.child_by_field_name("name")?).to_string();
        let bases = node
            .child_by_field_name("superclasses")
            .map(|bases| self.text(bases).to_string());
        let body = self.suite(node.child_by_field_name("body")?);
        Some(ClassDef {
            name,
            decorators,
            bases,
            body,
            span,
        })
    }

    fn function(
        &self,
        node: tree_sitter::Node<'_>,
        decorators: Vec<Decorator>,
        span: SourceSpan,
    ) -> Option<FunctionDef> {
        let name = self.text(node.child_by_field_name("name")?).to_string();
        let parameters = self.parameters(node.child_by_field_name("parameters")?);
        let returns = node.child_by_field_name("return_type").map(|ty| Annotation {
            text: self.text(ty).to_string(),
            span: SourceSpan::of(ty),
        });
        let block = node.child_by_field_name("body")?;

        let mut cursor = node.walk();
        let children: Vec<_> = node.children(&mut cursor).collect();
        let is_async = children.first().is_some_and(|c| c.kind() == "async");
        let colon = children
            .iter()
            .rev()
            .find(|c| c.kind() == ":" && c.end_byte() <= block.start_byte())?;
        let header = SourceSpan::of(node).to(&SourceSpan::of(*colon));

        let body_span = self.trimmed_span(block);
        let body_indent = self.body_indent(node, colon.end_byte(), block.start_byte());

        let mut cursor = block.walk();
        let dump = block
            .named_children(&mut cursor)
            .filter(|stmt| stmt.kind() != "comment")
            .map(|stmt| stmt.to_sexp())
            .collect();

        Some(FunctionDef {
            name,
            is_async,
            decorators,
            parameters,
            returns,
            body: Body::Source {
                suite: self.suite(block),
                dump,
            },
            span,
            header,
            body_span,
            body_indent,
        })
    }

    /// Span of a block without trailing whitespace
    fn trimmed_span(&self, block: tree_sitter::Node<'_>) -> SourceSpan {
        let full = SourceSpan::of(block);
        let text = self.text(block).trim_end();
        let end_line = full.start_line + text.matches('\n').count() as u32;
        SourceSpan::new(
            full.start,
            full.start + text.len(),
            full.start_line,
            end_line,
            full.start_col,
        )
    }

    fn body_indent(&self, def: tree_sitter::Node<'_>, colon_end: usize, block_start: usize) -> String {
        let between = self.source.get(colon_end..block_start).unwrap_or_default();
        if between.contains('\n') {
            let prefix = self.line_prefix(block_start);
            if prefix.chars().all(|c| c == ' ' || c == '\t') {
                return prefix.to_string();
            }
        }
        let def_line = self.line_prefix(def.start_byte());
        let indent = &def_line[..def_line.len() - def_line.trim_start().len()];
        format!("{}{}", indent, INDENT_UNIT)
    }

    /// Text between the start of the line containing `offset` and `offset`
    fn line_prefix(&self, offset: usize) -> &'s str {
        let before = self.source.get(..offset).unwrap_or_default();
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        &before[line_start..]
    }

    fn parameters(&self, node: tree_sitter::Node<'_>) -> Parameters {
        let mut params: Vec<Parameter> = Vec::new();
        let mut keyword_only = false;

        let mut cursor = node.walk();
        for child in node.named_children(&mut cursor) {
            match child.kind() {
                "positional_separator" => {
                    for param in params.iter_mut() {
                        if param.kind == ParameterKind::PositionalOrKeyword {
                            param.kind = ParameterKind::PositionalOnly;
                        }
                    }
                }
                "keyword_separator" => keyword_only = true,
                _ => {
                    if let Some(param) = self.parameter(child, keyword_only) {
                        if param.kind == ParameterKind::VarPositional {
                            keyword_only = true;
                        }
                        params.push(param);
                    }
                }
            }
        }

        Parameters {
            params,
            text: self.text(node).to_string(),
            span: SourceSpan::of(node),
        }
    }

    fn parameter(&self, node: tree_sitter::Node<'_>, keyword_only: bool) -> Option<Parameter> {
        let plain = if keyword_only {
            ParameterKind::KeywordOnly
        } else {
            ParameterKind::PositionalOrKeyword
        };
        let field_text = |field: &str| node.child_by_field_name(field).map(|n| self.text(n).to_string());

        let (name, kind, annotation, default) = match node.kind() {
            "identifier" | "tuple_pattern" => (self.text(node).to_string(), plain, None, None),
            "default_parameter" => (field_text("name")?, plain, None, field_text("value")),
            "typed_default_parameter" => (
                field_text("name")?,
                plain,
                field_text("type"),
                field_text("value"),
            ),
            "typed_parameter" => {
                let mut cursor = node.walk();
                let target = node
                    .named_children(&mut cursor)
                    .find(|child| child.kind() != "type")?;
                let (name, kind) = self.target_name(target, plain);
                (name, kind, field_text("type"), None)
            }
            "list_splat_pattern" | "dictionary_splat_pattern" => {
                let (name, kind) = self.target_name(node, plain);
                (name, kind, None, None)
            }
            _ => return None,
        };

        Some(Parameter {
            name,
            kind,
            annotation,
            default,
            span: SourceSpan::of(node),
        })
    }

    /// Name and kind of a parameter target (`x`, `*args`, `**kwargs`)
    fn target_name(&self, node: tree_sitter::Node<'_>, plain: ParameterKind) -> (String, ParameterKind) {
        let kind = match node.kind() {
            "list_splat_pattern" => ParameterKind::VarPositional,
            "dictionary_splat_pattern" => ParameterKind::VarKeyword,
            _ => plain,
        };
        let name = self.text(node).trim_start_matches('*').trim().to_string();
        (name, kind)
    }
}

#[cfg(test)]
mod tests;
