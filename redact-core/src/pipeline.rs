//! Parse, extract, explain, rewrite and render in one pass
//!
//! Extraction finishes before the first request; rewriting starts only after
//! every request has finished, failed or been cancelled.

use crate::extract::{extract_functions_with_scope, ExtractScope, FunctionRecord};
use crate::parser::{self, ParseError};
use crate::render::render;
use crate::request::{ExplanationRequester, ExplanationStatus, RequestOutcome, RequestSettings};
use crate::retry::{Cancellation, Clock, SystemClock};
use crate::rewrite::{rewrite, ExplanationMap};
use crate::service::GenerationService;
use tracing::info;

static SYSTEM_CLOCK: SystemClock = SystemClock;

/// Hooks into the progress of a pipeline run
///
/// Methods may be called from worker threads when `jobs > 1`.
pub trait PipelineObserver: Sync {
    /// Records were extracted and requests are about to start
    fn extracted(&self, _records: &[FunctionRecord]) {}

    /// One record's request finished
    fn explained(&self, _record: &FunctionRecord, _outcome: &RequestOutcome) {}
}

/// Observer that ignores everything
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

/// Result of a pipeline run
#[derive(Debug)]
pub struct Transformation {
    /// Rewritten source text
    pub output: String,
    /// Extracted records, explanations attached where obtained
    pub records: Vec<FunctionRecord>,
    /// One outcome per record, same order
    pub outcomes: Vec<RequestOutcome>,
}

impl Transformation {
    pub fn explained(&self) -> usize {
        self.count(ExplanationStatus::Explained)
    }

    pub fn count(&self, status: ExplanationStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

/// Configurable transformation pipeline
pub struct Pipeline<'a> {
    service: &'a dyn GenerationService,
    clock: &'a dyn Clock,
    settings: RequestSettings,
    scope: ExtractScope,
    jobs: usize,
    cancellation: Cancellation,
}

impl<'a> Pipeline<'a> {
    pub fn new(service: &'a dyn GenerationService) -> Self {
        Pipeline {
            service,
            clock: &SYSTEM_CLOCK,
            settings: RequestSettings::default(),
            scope: ExtractScope::default(),
            jobs: 1,
            cancellation: Cancellation::new(),
        }
    }

    pub fn with_clock(mut self, clock: &'a dyn Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: RequestSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_scope(mut self, scope: ExtractScope) -> Self {
        self.scope = scope;
        self
    }

    /// Number of concurrent requests; 1 keeps them sequential
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn run(&self, source: &str) -> Result<Transformation, ParseError> {
        self.run_observed(source, &NoopObserver)
    }

    pub fn run_observed(
        &self,
        source: &str,
        observer: &dyn PipelineObserver,
    ) -> Result<Transformation, ParseError> {
        let tree = parser::parse(source)?;
        let records = extract_functions_with_scope(&tree, self.scope);
        info!(functions = records.len(), "extracted function records");
        observer.extracted(&records);

        let requester = ExplanationRequester::new(self.service, self.clock, self.settings.clone())
            .with_cancellation(self.cancellation.clone());
        let outcomes = requester.explain_all(
            &records,
            self.jobs,
            &|record: &FunctionRecord, outcome: &RequestOutcome| observer.explained(record, outcome),
        );

        let explanations = ExplanationMap::from_records(&records);
        let rewritten = rewrite(&tree, &explanations);
        let output = render(&rewritten);
        info!(
            explained = explanations.explained(),
            functions = records.len(),
            "rewrote function bodies"
        );

        Ok(Transformation {
            output,
            records,
            outcomes,
        })
    }
}

/// Transform `source` with default settings
pub fn transform(source: &str, service: &dyn GenerationService) -> Result<String, ParseError> {
    Pipeline::new(service).run(source).map(|t| t.output)
}
