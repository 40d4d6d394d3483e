//! Function extraction
//!
//! Global invariants enforced:
//! - Records come out in pre-order, which is source order for definitions
//! - Extraction never mutates the tree
//! - No validation beyond parsing: duplicate names, empty parameter lists
//!   and trivial bodies are all accepted

use crate::parser::{self, ParseError};
use crate::span::SourceSpan;
use crate::tree::{FunctionDef, Node, Suite, SyntaxTree};
use std::sync::OnceLock;

/// Which definitions produce records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractScope {
    /// Every function definition, nested ones and methods included
    #[default]
    AllDefinitions,
    /// Only definitions at module scope (including under module-level `if`/`try`)
    TopLevel,
}

/// Structured description of one function definition
#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub name: String,
    /// Positional parameter names in declaration order
    pub parameters: Vec<String>,
    /// One structural dump per body statement, used only as prompt input
    pub body_signature: Vec<String>,
    pub span: SourceSpan,
    explanation: OnceLock<String>,
}

impl FunctionRecord {
    pub fn new(name: impl Into<String>, parameters: Vec<String>, body_signature: Vec<String>) -> Self {
        FunctionRecord {
            name: name.into(),
            parameters,
            body_signature,
            span: SourceSpan::new(0, 0, 1, 1, 0),
            explanation: OnceLock::new(),
        }
    }

    fn from_def(def: &FunctionDef) -> Self {
        FunctionRecord {
            name: def.name.clone(),
            parameters: def.parameters.positional_names(),
            body_signature: def.body.dump(),
            span: def.span,
            explanation: OnceLock::new(),
        }
    }

    pub fn line(&self) -> u32 {
        self.span.start_line
    }

    pub fn explanation(&self) -> Option<&str> {
        self.explanation.get().map(String::as_str)
    }

    /// Attach the explanation; a record is explained at most once
    ///
    /// Returns the rejected text if an explanation was already set.
    pub fn set_explanation(&self, explanation: String) -> Result<(), String> {
        self.explanation.set(explanation)
    }
}

/// Collect records for the function definitions in `tree`
pub fn extract_functions(tree: &SyntaxTree) -> Vec<FunctionRecord> {
    extract_functions_with_scope(tree, ExtractScope::default())
}

pub fn extract_functions_with_scope(tree: &SyntaxTree, scope: ExtractScope) -> Vec<FunctionRecord> {
    let mut records = Vec::new();
    visit_suite(tree.module(), scope, true, &mut records);
    records
}

/// Parse `source` and extract its function records
pub fn extract_from_source(source: &str) -> Result<Vec<FunctionRecord>, ParseError> {
    let tree = parser::parse(source)?;
    Ok(extract_functions(&tree))
}

fn visit_suite(suite: &Suite, scope: ExtractScope, module_scope: bool, records: &mut Vec<FunctionRecord>) {
    for node in suite.iter() {
        visit_node(node, scope, module_scope, records);
    }
}

fn visit_node(node: &Node, scope: ExtractScope, module_scope: bool, records: &mut Vec<FunctionRecord>) {
    match node {
        Node::FunctionDef(def) => {
            if module_scope || scope == ExtractScope::AllDefinitions {
                records.push(FunctionRecord::from_def(def));
            }
            for suite in node.suites() {
                visit_suite(suite, scope, false, records);
            }
        }
        Node::ClassDef(class) => visit_suite(&class.body, scope, false, records),
        // Blocks of `if`/`for`/`try` stay in the enclosing scope
        Node::Compound(compound) => {
            for suite in &compound.suites {
                visit_suite(suite, scope, module_scope, records);
            }
        }
        Node::Statement(_) => {}
    }
}
