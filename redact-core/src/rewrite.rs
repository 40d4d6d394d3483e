//! Body rewriting
//!
//! Global invariants enforced:
//! - Only function definitions whose name maps to an explanation change
//! - Every other node is shared with the input tree (`Arc::ptr_eq` holds)
//! - Name, parameters, decorators, return annotation and spans are carried
//!   over unchanged into a rewritten definition

use crate::extract::FunctionRecord;
use crate::tree::{Body, ClassDef, Compound, FunctionDef, Node, Suite, SyntaxTree};
use std::collections::HashMap;
use std::sync::Arc;

/// Function name to explanation, built once after all requests finished
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExplanationMap {
    entries: HashMap<String, Option<String>>,
}

impl ExplanationMap {
    /// Later records win over earlier ones with the same name, even when the
    /// later record has no explanation
    pub fn from_records(records: &[FunctionRecord]) -> Self {
        let mut entries = HashMap::new();
        for record in records {
            entries.insert(record.name.clone(), record.explanation().map(str::to_string));
        }
        ExplanationMap { entries }
    }

    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        ExplanationMap {
            entries: pairs
                .into_iter()
                .map(|(name, text)| (name.into(), Some(text.into())))
                .collect(),
        }
    }

    /// Explanation to substitute for `name`; empty explanations do not count
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(name)
            .and_then(|entry| entry.as_deref())
            .filter(|text| !text.is_empty())
    }

    /// Number of names with a usable explanation
    pub fn explained(&self) -> usize {
        self.entries.keys().filter(|name| self.get(name).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.explained() == 0
    }
}

/// Rewrite every matching function definition in `tree`
///
/// Returns a tree sharing all untouched subtrees with the input.
pub fn rewrite(tree: &SyntaxTree, explanations: &ExplanationMap) -> SyntaxTree {
    match rewrite_suite(tree.module(), explanations) {
        Some(module) => tree.with_module(module),
        None => tree.clone(),
    }
}

/// `None` when nothing in the suite changed
fn rewrite_suite(suite: &Suite, explanations: &ExplanationMap) -> Option<Suite> {
    let mut changed = false;
    let nodes: Vec<Arc<Node>> = suite
        .nodes
        .iter()
        .map(|node| match rewrite_node(node, explanations) {
            Some(new_node) => {
                changed = true;
                Arc::new(new_node)
            }
            None => Arc::clone(node),
        })
        .collect();

    changed.then(|| Suite {
        nodes,
        span: suite.span,
    })
}

fn rewrite_node(node: &Node, explanations: &ExplanationMap) -> Option<Node> {
    match node {
        Node::FunctionDef(def) => rewrite_function(def, explanations).map(Node::FunctionDef),
        Node::ClassDef(class) => {
            let body = rewrite_suite(&class.body, explanations)?;
            Some(Node::ClassDef(ClassDef {
                name: class.name.clone(),
                decorators: class.decorators.clone(),
                bases: class.bases.clone(),
                body,
                span: class.span,
            }))
        }
        Node::Compound(compound) => {
            let rewritten: Vec<Option<Suite>> = compound
                .suites
                .iter()
                .map(|suite| rewrite_suite(suite, explanations))
                .collect();
            if rewritten.iter().all(Option::is_none) {
                return None;
            }
            let suites = rewritten
                .into_iter()
                .zip(&compound.suites)
                .map(|(new_suite, old_suite)| new_suite.unwrap_or_else(|| old_suite.clone()))
                .collect();
            Some(Node::Compound(Compound {
                kind: compound.kind,
                span: compound.span,
                suites,
            }))
        }
        Node::Statement(_) => None,
    }
}

fn rewrite_function(def: &FunctionDef, explanations: &ExplanationMap) -> Option<FunctionDef> {
    if let Some(explanation) = explanations.get(&def.name) {
        if def.body.explanation() == Some(explanation) {
            return None;
        }
        return Some(def.with_explanation(explanation));
    }

    // Unmatched definitions may still contain matching nested ones
    let Body::Source { suite, dump } = &def.body else {
        return None;
    };
    let suite = rewrite_suite(suite, explanations)?;
    Some(FunctionDef {
        body: Body::Source {
            suite,
            dump: dump.clone(),
        },
        ..def.clone()
    })
}
