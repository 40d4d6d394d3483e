//! Explanation requests against a generation service
//!
//! Global invariants enforced:
//! - Fragments are concatenated in arrival order, nothing reordered or dropped
//! - Each attempt starts from an empty buffer
//! - A failed record never aborts the remaining ones
//! - Outcomes are returned in record order regardless of parallelism

use crate::extract::FunctionRecord;
use crate::prompt::build_prompt;
use crate::retry::{always_retry, Cancellation, Clock, RetryOutcome, RetryPolicy};
use crate::service::{GenerationConfig, GenerationService, ServiceError};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info_span, warn};

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

/// Everything that shapes a single explanation request
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSettings {
    pub model: String,
    pub generation: GenerationConfig,
    pub retry: RetryPolicy,
}

impl Default for RequestSettings {
    fn default() -> Self {
        RequestSettings {
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// How a record's request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplanationStatus {
    Explained,
    Exhausted,
    Rejected,
    Cancelled,
}

impl ExplanationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ExplanationStatus::Explained => "explained",
            ExplanationStatus::Exhausted => "exhausted",
            ExplanationStatus::Rejected => "rejected",
            ExplanationStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub explanation: Option<String>,
    pub attempts: u32,
    pub status: ExplanationStatus,
    /// Message of the last failed attempt
    pub error: Option<String>,
}

/// Callback invoked once per finished record
pub type ProgressFn<'p> = dyn Fn(&FunctionRecord, &RequestOutcome) + Sync + 'p;

/// Drives the generation service for function records
pub struct ExplanationRequester<'a> {
    service: &'a dyn GenerationService,
    clock: &'a dyn Clock,
    settings: RequestSettings,
    cancellation: Cancellation,
    retryable: fn(&ServiceError) -> bool,
}

impl<'a> ExplanationRequester<'a> {
    pub fn new(
        service: &'a dyn GenerationService,
        clock: &'a dyn Clock,
        settings: RequestSettings,
    ) -> Self {
        ExplanationRequester {
            service,
            clock,
            settings,
            cancellation: Cancellation::new(),
            retryable: always_retry,
        }
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Replace the predicate deciding which service errors are retried
    pub fn with_retryable(mut self, retryable: fn(&ServiceError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn settings(&self) -> &RequestSettings {
        &self.settings
    }

    /// Obtain an explanation for `record` and attach it on success
    ///
    /// A record that already carries an explanation is not requested again.
    pub fn request_explanation(&self, record: &FunctionRecord) -> RequestOutcome {
        if let Some(existing) = record.explanation() {
            return RequestOutcome {
                explanation: Some(existing.to_string()),
                attempts: 0,
                status: ExplanationStatus::Explained,
                error: None,
            };
        }

        let span = info_span!("explain", function = %record.name, line = record.line());
        let _guard = span.enter();

        let prompt = build_prompt(record);
        let outcome = self.settings.retry.run(
            self.clock,
            &self.cancellation,
            self.retryable,
            |attempt| {
                debug!(attempt, model = %self.settings.model, "requesting explanation");
                self.attempt(&prompt)
            },
        );

        let attempts = outcome.attempts();
        match outcome {
            RetryOutcome::Succeeded { value, .. } => {
                // Another worker may have won the race; its text stands
                if record.set_explanation(value).is_err() {
                    debug!("explanation already attached");
                }
                RequestOutcome {
                    explanation: record.explanation().map(str::to_string),
                    attempts,
                    status: ExplanationStatus::Explained,
                    error: None,
                }
            }
            RetryOutcome::Exhausted { error, .. } => {
                warn!(attempts, "retries exhausted, body left unchanged");
                failed(ExplanationStatus::Exhausted, attempts, Some(error))
            }
            RetryOutcome::Rejected { error, .. } => {
                warn!(attempts, "non-retryable error, body left unchanged");
                failed(ExplanationStatus::Rejected, attempts, Some(error))
            }
            RetryOutcome::Cancelled { error, .. } => {
                warn!(attempts, "cancelled, body left unchanged");
                failed(ExplanationStatus::Cancelled, attempts, error)
            }
        }
    }

    /// Request explanations for every record, `jobs` at a time
    ///
    /// `progress` runs after each record finishes, possibly from a worker
    /// thread.
    pub fn explain_all(
        &self,
        records: &[FunctionRecord],
        jobs: usize,
        progress: &ProgressFn<'_>,
    ) -> Vec<RequestOutcome> {
        let run_one = |record: &FunctionRecord| {
            let outcome = self.request_explanation(record);
            progress(record, &outcome);
            outcome
        };

        if jobs <= 1 || records.len() <= 1 {
            return records.iter().map(run_one).collect();
        }

        match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
            Ok(pool) => pool.install(|| records.par_iter().map(run_one).collect()),
            Err(e) => {
                warn!(error = %e, "could not start worker pool, requesting sequentially");
                records.iter().map(run_one).collect()
            }
        }
    }

    /// One call to the service, fully drained
    fn attempt(&self, prompt: &str) -> Result<String, ServiceError> {
        let stream = self
            .service
            .generate(&self.settings.model, prompt, &self.settings.generation)?;

        let mut text = String::new();
        for fragment in stream {
            text.push_str(&fragment?);
        }
        if text.is_empty() {
            return Err(ServiceError::EmptyResponse);
        }
        Ok(text)
    }
}

fn failed(status: ExplanationStatus, attempts: u32, error: Option<ServiceError>) -> RequestOutcome {
    RequestOutcome {
        explanation: None,
        attempts,
        status,
        error: error.map(|e| e.to_string()),
    }
}
