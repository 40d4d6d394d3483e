//! End-to-end tests for the redact pipeline

use redact_core::{
    extract::extract_from_source, parse, transform, Clock, ExplanationStatus, ExtractScope,
    GenerationConfig, GenerationService, ParseError, Pipeline, RequestSettings, RetryPolicy,
    ServiceError,
};
use redact_core::service::FragmentStream;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .unwrap()
        .join("tests")
        .join("fixtures")
        .join("python")
        .join(name)
}

fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name)).unwrap()
}

fn function_name(prompt: &str) -> String {
    prompt
        .trim_start_matches("Explain the Python function ")
        .split(' ')
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Streams a fixed answer per function name, a few characters at a time
struct CannedService {
    answers: HashMap<String, String>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

impl CannedService {
    fn new(answers: &[(&str, &str)]) -> Self {
        CannedService {
            answers: answers
                .iter()
                .map(|(name, answer)| (name.to_string(), answer.to_string()))
                .collect(),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `count` requests for `name`
    fn failing(self, name: &str, count: u32) -> Self {
        self.failures.lock().unwrap().insert(name.to_string(), count);
        self
    }

    fn calls_for(&self, name: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|n| *n == name).count()
    }
}

impl GenerationService for CannedService {
    fn generate<'a>(
        &'a self,
        _model: &str,
        prompt: &str,
        _config: &GenerationConfig,
    ) -> Result<FragmentStream<'a>, ServiceError> {
        let name = function_name(prompt);
        self.calls.lock().unwrap().push(name.clone());

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(&name) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ServiceError::Status {
                    status: 503,
                    message: "overloaded".to_string(),
                });
            }
        }

        let Some(answer) = self.answers.get(&name) else {
            return Err(ServiceError::Status {
                status: 400,
                message: format!("no answer for {name}"),
            });
        };
        let chars: Vec<char> = answer.chars().collect();
        let fragments: Vec<Result<String, ServiceError>> = chars
            .chunks(5)
            .map(|chunk| Ok(chunk.iter().collect::<String>()))
            .collect();
        Ok(Box::new(fragments.into_iter()))
    }
}

/// Clock whose sleeps only advance a counter
struct InstantClock {
    start: Instant,
    slept: Mutex<Duration>,
}

impl InstantClock {
    fn new() -> Self {
        InstantClock {
            start: Instant::now(),
            slept: Mutex::new(Duration::ZERO),
        }
    }

    fn slept(&self) -> Duration {
        *self.slept.lock().unwrap()
    }
}

impl Clock for InstantClock {
    fn now(&self) -> Instant {
        self.start + self.slept()
    }

    fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap() += duration;
    }
}

fn settings(max_retries: u32, delay_seconds: u64) -> RequestSettings {
    RequestSettings {
        retry: RetryPolicy::new(max_retries, Duration::from_secs(delay_seconds)),
        ..RequestSettings::default()
    }
}

#[test]
fn test_simple_fixture_end_to_end() {
    let source = read_fixture("simple.py");
    let service = CannedService::new(&[
        ("foo", "Purpose: adds two numbers."),
        ("bar", "Purpose: multiplies two numbers."),
    ]);

    let output = transform(&source, &service).unwrap();
    assert_eq!(
        output,
        "\ndef foo(x, y):\n    return \"Purpose: adds two numbers.\"\n\ndef bar(a, b):\n    return \"Purpose: multiplies two numbers.\"\n"
    );
    assert_eq!(service.calls_for("foo"), 1);
    assert_eq!(service.calls_for("bar"), 1);
}

#[test]
fn test_records_follow_source_order() {
    let source = read_fixture("classes.py");
    let records = extract_from_source(&source).unwrap();
    let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(
        names,
        vec!["__init__", "total", "__init__", "add", "value", "line_total"]
    );
    assert_eq!(records[0].parameters, vec!["self", "name", "price"]);
    assert!(records.windows(2).all(|w| w[0].line() <= w[1].line()));
}

#[test]
fn test_classes_fixture_keeps_everything_but_bodies() {
    let source = read_fixture("classes.py");
    let service = CannedService::new(&[
        ("__init__", "Purpose: initialises state."),
        ("total", "Purpose: gross price."),
        ("add", "Purpose: stores an item."),
        ("value", "Purpose: sums the inventory."),
        ("line_total", "Purpose: one line."),
    ]);

    let output = transform(&source, &service).unwrap();
    assert!(output.starts_with("\"\"\"Inventory helpers.\"\"\"\n\nTAX_RATE = 0.2\n"));
    assert!(output.contains(
        "class Item:\n    def __init__(self, name, price):\n        return \"Purpose: initialises state.\"\n"
    ));
    assert!(output.contains("    def total(self, quantity):\n        return \"Purpose: gross price.\"\n"));
    assert!(output.contains("    def value(self):\n        return \"Purpose: sums the inventory.\"\n"));
    assert!(!output.contains("line_total"));
    assert!(!output.contains("gross price for a quantity"));
    assert!(output.ends_with("if __name__ == \"__main__\":\n    print(Inventory().value())\n"));

    let reparsed = parse(&output).unwrap();
    assert_eq!(reparsed.functions().len(), 5);
}

#[test]
fn test_decorated_fixture() {
    let source = read_fixture("decorated.py");
    let service = CannedService::new(&[
        ("logged", "Purpose: logs calls."),
        ("wrapper", "Purpose: forwards."),
        ("scale", "Purpose: scales a value."),
        ("fetch", "Purpose: downloads a URL."),
        ("ping", "Purpose: answers pong."),
    ]);

    let transformation = Pipeline::new(&service).run(&source).unwrap();
    let names: Vec<&str> = transformation
        .records
        .iter()
        .map(|r| r.name.as_str())
        .collect();
    assert_eq!(names, vec!["logged", "wrapper", "scale", "fetch", "ping"]);
    assert_eq!(transformation.records[3].parameters, vec!["url"]);
    assert_eq!(transformation.explained(), 5);

    let output = &transformation.output;
    assert!(output.starts_with("import functools\n\n\ndef logged(fn):\n    return \"Purpose: logs calls.\"\n"));
    assert!(output.contains(
        "@logged\ndef scale(value: float, factor: float = 2.0) -> float:\n    return \"Purpose: scales a value.\"\n"
    ));
    assert!(output.contains(
        "async def fetch(url, *, timeout=10):\n    return \"Purpose: downloads a URL.\"\n"
    ));
    assert!(output.ends_with("def ping():\n    return \"Purpose: answers pong.\"\n"));
    assert!(parse(output).is_ok());
}

#[test]
fn test_top_level_scope_skips_methods() {
    let source = read_fixture("decorated.py");
    let service = CannedService::new(&[("logged", "a"), ("scale", "b"), ("fetch", "c"), ("ping", "d")]);
    let transformation = Pipeline::new(&service)
        .with_scope(ExtractScope::TopLevel)
        .run(&source)
        .unwrap();
    assert_eq!(transformation.records.len(), 4);
    assert_eq!(service.calls_for("wrapper"), 0);
}

#[test]
fn test_output_is_idempotent() {
    let source = read_fixture("simple.py");
    let service = CannedService::new(&[("foo", "Adds."), ("bar", "Multiplies.")]);

    let once = transform(&source, &service).unwrap();
    for record in extract_from_source(&once).unwrap() {
        assert_eq!(record.body_signature.len(), 1);
        assert!(record.body_signature[0].starts_with("(return_statement (string"));
    }

    let twice = transform(&once, &service).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn test_malformed_fixture_is_rejected() {
    let source = read_fixture("malformed.py");
    let service = CannedService::new(&[("fine", "never asked")]);

    let err = transform(&source, &service).unwrap_err();
    match err {
        ParseError::Syntax { line, .. } => assert!(line <= 2, "error reported at line {line}"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(service.calls_for("fine"), 0);
}

#[test]
fn test_transient_failures_are_retried() {
    let source = read_fixture("simple.py");
    let service = CannedService::new(&[("foo", "Adds."), ("bar", "Multiplies.")]).failing("foo", 2);
    let clock = InstantClock::new();

    let transformation = Pipeline::new(&service)
        .with_clock(&clock)
        .with_settings(settings(3, 3))
        .run(&source)
        .unwrap();

    assert_eq!(transformation.outcomes[0].status, ExplanationStatus::Explained);
    assert_eq!(transformation.outcomes[0].attempts, 3);
    assert_eq!(transformation.outcomes[1].attempts, 1);
    assert_eq!(clock.slept(), Duration::from_secs(6));
    assert!(transformation.output.contains("return \"Adds.\""));
}

#[test]
fn test_exhausted_retries_leave_body_unchanged() {
    let source = read_fixture("simple.py");
    let service =
        CannedService::new(&[("foo", "Adds."), ("bar", "Multiplies.")]).failing("foo", 10);
    let clock = InstantClock::new();

    let transformation = Pipeline::new(&service)
        .with_clock(&clock)
        .with_settings(settings(3, 3))
        .run(&source)
        .unwrap();

    assert_eq!(transformation.outcomes[0].status, ExplanationStatus::Exhausted);
    assert_eq!(transformation.outcomes[0].attempts, 4);
    assert_eq!(service.calls_for("foo"), 4);
    // No sleep after the final attempt
    assert_eq!(clock.slept(), Duration::from_secs(9));
    assert!(transformation.output.contains("def foo(x, y):\n    return x + y\n"));
    assert!(transformation.output.contains("return \"Multiplies.\""));
}

#[test]
fn test_parallel_run_matches_sequential() {
    let source = read_fixture("classes.py");
    let answers = [
        ("__init__", "Init."),
        ("total", "Total."),
        ("add", "Add."),
        ("value", "Value."),
        ("line_total", "Line."),
    ];
    let sequential = Pipeline::new(&CannedService::new(&answers))
        .run(&source)
        .unwrap();
    let parallel = Pipeline::new(&CannedService::new(&answers))
        .with_jobs(4)
        .run(&source)
        .unwrap();

    assert_eq!(sequential.output, parallel.output);
    let names = |t: &redact_core::Transformation| -> Vec<String> {
        t.records.iter().map(|r| r.name.clone()).collect()
    };
    assert_eq!(names(&sequential), names(&parallel));
}

#[test]
fn test_source_without_functions_is_unchanged() {
    let source = "import os\n\nx = os.getcwd()  # where we are\n";
    let service = CannedService::new(&[]);
    assert_eq!(transform(source, &service).unwrap(), source);
    assert!(service.calls.lock().unwrap().is_empty());
}
