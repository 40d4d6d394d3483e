//! Run summaries and function listings
//!
//! Global invariants enforced:
//! - Deterministic output ordering (file, then source line)
//! - Byte-for-byte identical output for identical outcomes

use crate::extract::FunctionRecord;
use crate::pipeline::Transformation;
use crate::request::ExplanationStatus;
use serde::Serialize;

/// Outcome of one function in a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionSummary {
    pub file: String,
    pub function: String,
    pub line: u32,
    pub parameters: Vec<String>,
    pub status: ExplanationStatus,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A file left untouched because it could not be processed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub file: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub files: usize,
    pub skipped_files: usize,
    pub functions: usize,
    pub explained: usize,
    pub exhausted: usize,
    pub rejected: usize,
    pub cancelled: usize,
}

/// Everything a run did, file by file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub functions: Vec<FunctionSummary>,
    pub skipped: Vec<SkippedFile>,
    files: usize,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of one transformed file
    pub fn add_file(&mut self, file: &str, transformation: &Transformation) {
        self.files += 1;
        for (record, outcome) in transformation.records.iter().zip(&transformation.outcomes) {
            self.functions.push(FunctionSummary {
                file: file.to_string(),
                function: record.name.clone(),
                line: record.line(),
                parameters: record.parameters.clone(),
                status: outcome.status,
                attempts: outcome.attempts,
                error: outcome.error.clone(),
            });
        }
    }

    pub fn add_skipped(&mut self, file: &str, reason: impl Into<String>) {
        self.files += 1;
        self.skipped.push(SkippedFile {
            file: file.to_string(),
            reason: reason.into(),
        });
    }

    pub fn totals(&self) -> Totals {
        let count = |status: ExplanationStatus| {
            self.functions
                .iter()
                .filter(|f| f.status == status)
                .count()
        };
        Totals {
            files: self.files,
            skipped_files: self.skipped.len(),
            functions: self.functions.len(),
            explained: count(ExplanationStatus::Explained),
            exhausted: count(ExplanationStatus::Exhausted),
            rejected: count(ExplanationStatus::Rejected),
            cancelled: count(ExplanationStatus::Cancelled),
        }
    }

    /// True when files were given but none could be parsed
    pub fn all_files_failed(&self) -> bool {
        self.files > 0 && self.skipped.len() == self.files
    }

    fn sorted(&self) -> (Vec<&FunctionSummary>, Vec<&SkippedFile>) {
        let mut functions: Vec<&FunctionSummary> = self.functions.iter().collect();
        functions.sort_by(|a, b| a.file.cmp(&b.file).then_with(|| a.line.cmp(&b.line)));
        let mut skipped: Vec<&SkippedFile> = self.skipped.iter().collect();
        skipped.sort_by(|a, b| a.file.cmp(&b.file));
        (functions, skipped)
    }
}

/// Render a run summary as an aligned table followed by totals
pub fn render_text(summary: &RunSummary) -> String {
    let (functions, skipped) = summary.sorted();
    let mut output = String::new();

    output.push_str(&format!(
        "{:<10} {:<8} {:<30} {:<6} {}\n",
        "STATUS", "ATTEMPTS", "FILE", "LINE", "FUNCTION"
    ));
    for f in functions {
        output.push_str(&format!(
            "{:<10} {:<8} {:<30} {:<6} {}\n",
            f.status.as_str(),
            f.attempts,
            truncate_or_pad(&f.file, 30),
            f.line,
            f.function
        ));
    }

    if !skipped.is_empty() {
        output.push('\n');
        for s in skipped {
            output.push_str(&format!("skipped {}: {}\n", s.file, s.reason));
        }
    }

    let totals = summary.totals();
    output.push('\n');
    output.push_str(&format!(
        "{} files ({} skipped), {} functions: {} explained, {} exhausted, {} rejected, {} cancelled\n",
        totals.files,
        totals.skipped_files,
        totals.functions,
        totals.explained,
        totals.exhausted,
        totals.rejected,
        totals.cancelled
    ));
    output
}

/// Render a run summary as pretty JSON
pub fn render_json(summary: &RunSummary) -> String {
    #[derive(Serialize)]
    struct View<'a> {
        functions: Vec<&'a FunctionSummary>,
        skipped: Vec<&'a SkippedFile>,
        totals: Totals,
    }

    let (functions, skipped) = summary.sorted();
    let view = View {
        functions,
        skipped,
        totals: summary.totals(),
    };
    serde_json::to_string_pretty(&view).unwrap_or_else(|_| "{}".to_string())
}

/// One extracted function, as listed without contacting any service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionEntry {
    pub file: String,
    pub function: String,
    pub line: u32,
    pub parameters: Vec<String>,
    pub body_statements: usize,
}

impl FunctionEntry {
    pub fn new(file: &str, record: &FunctionRecord) -> Self {
        FunctionEntry {
            file: file.to_string(),
            function: record.name.clone(),
            line: record.line(),
            parameters: record.parameters.clone(),
            body_statements: record.body_signature.len(),
        }
    }
}

/// Render extracted functions as text output
pub fn render_functions_text(entries: &[FunctionEntry]) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{:<30} {:<6} {:<30} {}\n",
        "FILE", "LINE", "FUNCTION", "PARAMETERS"
    ));
    for entry in entries {
        output.push_str(&format!(
            "{:<30} {:<6} {:<30} ({})\n",
            truncate_or_pad(&entry.file, 30),
            entry.line,
            truncate_or_pad(&entry.function, 30),
            entry.parameters.join(", ")
        ));
    }
    output
}

/// Render extracted functions as JSON output
pub fn render_functions_json(entries: &[FunctionEntry]) -> String {
    serde_json::to_string_pretty(entries).unwrap_or_else(|_| "[]".to_string())
}

/// Truncate or pad string to fixed width
fn truncate_or_pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let kept: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", kept)
    } else {
        format!("{:<width$}", s, width = width)
    }
}
