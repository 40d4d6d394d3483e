//! Prompt construction for explanation requests

use crate::extract::FunctionRecord;

/// Sections every explanation must contain, in order
const SECTION_INSTRUCTIONS: &str = "Provide only the following sections:\n\
- Purpose: Explain what the function does in one sentence.\n\
- Contract: Describe the function signature, including input types and output types.\n\
- Effects: State any side effects or modifications the function makes.";

/// Build the prompt sent to the generation service for `record`
///
/// Name, parameter list and body dump are embedded verbatim.
pub fn build_prompt(record: &FunctionRecord) -> String {
    format!(
        "Explain the Python function {} with parameters {} and body {}. {}",
        record.name,
        list_literal(&record.parameters),
        list_literal(&record.body_signature),
        SECTION_INSTRUCTIONS
    )
}

/// `['a', 'b']`
fn list_literal(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|item| format!("'{}'", item)).collect();
    format!("[{}]", quoted.join(", "))
}
