//! Syntax tree for a single Python source unit
//!
//! Global invariants enforced:
//! - Every node keeps the span it was parsed from
//! - Subtrees are shared through `Arc`; a rewrite rebuilds only the path
//!   leading to a changed function definition
//! - Untouched nodes compare equal (and pointer-equal) to their originals

use crate::span::SourceSpan;
use std::sync::Arc;

/// Parsed representation of a whole module
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxTree {
    source: Arc<str>,
    module: Suite,
}

impl SyntaxTree {
    pub(crate) fn new(source: Arc<str>, module: Suite) -> Self {
        SyntaxTree { source, module }
    }

    /// Source text the tree was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Module-level statements
    pub fn module(&self) -> &Suite {
        &self.module
    }

    /// Same source, different module body
    pub(crate) fn with_module(&self, module: Suite) -> Self {
        SyntaxTree {
            source: Arc::clone(&self.source),
            module,
        }
    }

    /// All function definitions in pre-order, at any depth
    pub fn functions(&self) -> Vec<&FunctionDef> {
        let mut out = Vec::new();
        collect_functions(&self.module, &mut out);
        out
    }
}

fn collect_functions<'a>(suite: &'a Suite, out: &mut Vec<&'a FunctionDef>) {
    for node in suite.iter() {
        if let Node::FunctionDef(def) = node {
            out.push(def);
        }
        for child in node.suites() {
            collect_functions(child, out);
        }
    }
}

/// Ordered sequence of statements (a module body or an indented block)
#[derive(Debug, Clone, PartialEq)]
pub struct Suite {
    pub nodes: Vec<Arc<Node>>,
    pub span: SourceSpan,
}

impl Suite {
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().map(|node| node.as_ref())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Node kinds the pipeline distinguishes
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    /// Control-flow statement owning one or more blocks (`if`, `for`, `try`, ...)
    Compound(Compound),
    /// Simple statement or comment; never contains definitions
    Statement(Statement),
}

impl Node {
    pub fn span(&self) -> SourceSpan {
        match self {
            Node::FunctionDef(def) => def.span,
            Node::ClassDef(class) => class.span,
            Node::Compound(compound) => compound.span,
            Node::Statement(statement) => statement.span,
        }
    }

    /// tree-sitter kind of the node this was built from
    pub fn kind(&self) -> &'static str {
        match self {
            Node::FunctionDef(_) => "function_definition",
            Node::ClassDef(_) => "class_definition",
            Node::Compound(compound) => compound.kind,
            Node::Statement(statement) => statement.kind,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(self, Node::Statement(s) if s.kind == "comment")
    }

    /// Nested scopes directly owned by this node
    pub fn suites(&self) -> Vec<&Suite> {
        match self {
            Node::FunctionDef(def) => match &def.body {
                Body::Source { suite, .. } => vec![suite],
                Body::Explanation(_) => Vec::new(),
            },
            Node::ClassDef(class) => vec![&class.body],
            Node::Compound(compound) => compound.suites.iter().collect(),
            Node::Statement(_) => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub kind: &'static str,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Compound {
    pub kind: &'static str,
    pub span: SourceSpan,
    pub suites: Vec<Suite>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub decorators: Vec<Decorator>,
    /// Text of the superclass list including parentheses, if any
    pub bases: Option<String>,
    pub body: Suite,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decorator {
    /// Decorator text including the leading `@`
    pub text: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub text: String,
    pub span: SourceSpan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParameterKind {
    pub fn is_positional(self) -> bool {
        matches!(
            self,
            ParameterKind::PositionalOnly | ParameterKind::PositionalOrKeyword
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub annotation: Option<String>,
    pub default: Option<String>,
    pub span: SourceSpan,
}

/// Parameter list of a definition, text included
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub params: Vec<Parameter>,
    /// Text between and including the parentheses
    pub text: String,
    pub span: SourceSpan,
}

impl Parameters {
    /// Names of positional parameters in declaration order
    pub fn positional_names(&self) -> Vec<String> {
        self.params
            .iter()
            .filter(|p| p.kind.is_positional())
            .map(|p| p.name.clone())
            .collect()
    }
}

/// Body of a function definition
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Statements as parsed, with one structural dump per non-comment statement
    Source { suite: Suite, dump: Vec<String> },
    /// Single `return "<explanation>"` statement
    Explanation(String),
}

impl Body {
    pub fn dump(&self) -> Vec<String> {
        match self {
            Body::Source { dump, .. } => dump.clone(),
            Body::Explanation(_) => vec!["(return_statement (string))".to_string()],
        }
    }

    pub fn explanation(&self) -> Option<&str> {
        match self {
            Body::Source { .. } => None,
            Body::Explanation(text) => Some(text),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    pub decorators: Vec<Decorator>,
    pub parameters: Parameters,
    pub returns: Option<Annotation>,
    pub body: Body,
    /// Whole definition, decorators included
    pub span: SourceSpan,
    /// From `def` (or `async`) through the `:` that opens the body
    pub header: SourceSpan,
    /// Original body block, trailing whitespace excluded
    pub body_span: SourceSpan,
    /// Indentation to use for statements of the body
    pub body_indent: String,
}

impl FunctionDef {
    /// Copy of this definition whose body returns `explanation`
    ///
    /// Name, parameters, decorators, return annotation and every span are
    /// carried over unchanged.
    pub fn with_explanation(&self, explanation: &str) -> FunctionDef {
        FunctionDef {
            body: Body::Explanation(explanation.to_string()),
            ..self.clone()
        }
    }

    pub fn line(&self) -> u32 {
        self.header.start_line
    }
}
