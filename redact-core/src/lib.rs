//! Redact core library - replaces Python function bodies with generated explanations

// Global invariants enforced in this crate:
// - A source that fails to parse is never partially rewritten
// - Only function bodies change; every other byte of the input is preserved
// - One function's failed request never aborts the others
// - Records, outcomes and reports follow source order

pub mod config;
pub mod discover;
pub mod extract;
pub mod parser;
pub mod pipeline;
pub mod prompt;
pub mod render;
pub mod report;
pub mod request;
pub mod retry;
pub mod rewrite;
pub mod service;
pub mod span;
pub mod tree;

pub use config::{RedactConfig, ResolvedConfig};
pub use extract::{extract_functions, ExtractScope, FunctionRecord};
pub use parser::{parse, ParseError};
pub use pipeline::{transform, Pipeline, PipelineObserver, Transformation};
pub use render::render;
pub use report::{render_json, render_text, FunctionEntry, RunSummary};
pub use request::{ExplanationRequester, ExplanationStatus, RequestOutcome, RequestSettings};
pub use retry::{Cancellation, Clock, RetryPolicy, SystemClock};
pub use rewrite::{rewrite, ExplanationMap};
pub use service::{GenerationConfig, GenerationService, OpenAiService, ServiceError};
pub use tree::SyntaxTree;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Python files under `path` that pass the config include/exclude filters
pub fn input_files(path: &Path, config: Option<&ResolvedConfig>) -> Result<Vec<PathBuf>> {
    let files = discover::collect_python_files(path)?;
    Ok(match config {
        Some(config) => files
            .into_iter()
            .filter(|file| config.should_include(file))
            .collect(),
        None => files,
    })
}

/// Read a Python source file; non-UTF-8 content is an error
pub fn read_source(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

/// Extracted functions of every Python file under `path`
///
/// Files that cannot be read or parsed are skipped with a warning.
pub fn list_functions(
    path: &Path,
    config: Option<&ResolvedConfig>,
    scope: ExtractScope,
) -> Result<Vec<FunctionEntry>> {
    let mut entries = Vec::new();
    let mut skipped_files: usize = 0;

    for file_path in input_files(path, config)? {
        let file_name = file_path.display().to_string();
        let source = match read_source(&file_path) {
            Ok(source) => source,
            Err(e) => {
                warn!(file = %file_name, error = %format!("{:#}", e), "skipping file");
                skipped_files += 1;
                continue;
            }
        };

        match parse(&source) {
            Ok(tree) => {
                let records = extract::extract_functions_with_scope(&tree, scope);
                entries.extend(records.iter().map(|record| FunctionEntry::new(&file_name, record)));
            }
            Err(e) => {
                warn!(file = %file_name, error = %e, "skipping file");
                skipped_files += 1;
            }
        }
    }
    if skipped_files > 0 {
        warn!(skipped_files, "some files could not be parsed");
    }

    Ok(entries)
}
