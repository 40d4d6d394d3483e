//! Configuration file support for Redact
//!
//! Loads project-specific configuration from JSON files.
//!
//! Search order:
//! 1. Explicit path (--config CLI flag)
//! 2. `.redactrc.json` in project root
//! 3. `redact.config.json` in project root
//! 4. `[tool.redact]` table in `pyproject.toml`
//!
//! All fields are optional. CLI flags take precedence over config file values.

use crate::extract::ExtractScope;
use crate::request::{RequestSettings, DEFAULT_MODEL};
use crate::retry::RetryPolicy;
use crate::service::openai::DEFAULT_ENDPOINT;
use crate::service::GenerationConfig;
use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
const DEFAULT_MAX_OUTPUT_LENGTH: u32 = 5000;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_DELAY_SECONDS: f64 = 3.0;
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Default exclude patterns applied when no config is specified
const DEFAULT_EXCLUDES: &[&str] = &[
    "**/venv/**",
    "**/.venv/**",
    "**/__pycache__/**",
    "**/site-packages/**",
    "**/.tox/**",
    "**/build/**",
    "**/dist/**",
];

/// Redact configuration loaded from a JSON config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedactConfig {
    /// Glob patterns for files to include (default: every Python file)
    #[serde(default)]
    pub include: Vec<String>,

    /// Glob patterns for files to exclude (default: virtualenvs, caches, build output)
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Model identifier passed to the generation service
    #[serde(default)]
    pub model: Option<String>,

    /// Chat-completions endpoint URL
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Upper bound on generated output length (default: 5000)
    #[serde(default)]
    pub max_output_length: Option<u32>,

    /// Retries after the first failed attempt (default: 3)
    #[serde(default)]
    pub max_retries: Option<u32>,

    /// Fixed delay between attempts in seconds (default: 3.0)
    #[serde(default)]
    pub delay_seconds: Option<f64>,

    /// Per-request timeout in seconds (default: 60)
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,

    /// Overall deadline for the request phase in seconds (default: none)
    #[serde(default)]
    pub deadline_seconds: Option<f64>,

    /// Concurrent requests (default: 1, sequential)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// Only module-scope definitions produce records (default: false)
    #[serde(default)]
    pub top_level_only: Option<bool>,
}

/// Resolved configuration with compiled glob patterns
#[derive(Debug)]
pub struct ResolvedConfig {
    /// Compiled include patterns (None means include all)
    pub include: Option<GlobSet>,
    /// Compiled exclude patterns
    pub exclude: GlobSet,
    /// Model, output bound and retry policy
    pub settings: RequestSettings,
    pub endpoint: String,
    pub api_key_env: String,
    pub request_timeout: Duration,
    pub deadline: Option<Duration>,
    pub jobs: usize,
    pub scope: ExtractScope,
    /// Path the config was loaded from (None if defaults)
    pub config_path: Option<PathBuf>,
}

impl RedactConfig {
    /// Validate the configuration for logical errors
    pub fn validate(&self) -> Result<()> {
        if let Some(ref model) = self.model {
            if model.trim().is_empty() {
                anyhow::bail!("model must not be empty");
            }
        }
        if let Some(ref endpoint) = self.endpoint {
            if endpoint.trim().is_empty() {
                anyhow::bail!("endpoint must not be empty");
            }
        }
        if let Some(ref var) = self.api_key_env {
            if var.trim().is_empty() {
                anyhow::bail!("api_key_env must not be empty");
            }
        }

        if self.max_output_length == Some(0) {
            anyhow::bail!("max_output_length must be positive");
        }

        if let Some(delay) = self.delay_seconds {
            if Duration::try_from_secs_f64(delay).is_err() {
                anyhow::bail!(
                    "delay_seconds must be a non-negative number of seconds (got {})",
                    delay
                );
            }
        }

        if self.request_timeout_seconds == Some(0) {
            anyhow::bail!("request_timeout_seconds must be positive");
        }

        if let Some(deadline) = self.deadline_seconds {
            if deadline <= 0.0 || Duration::try_from_secs_f64(deadline).is_err() {
                anyhow::bail!("deadline_seconds must be positive (got {})", deadline);
            }
        }

        if self.jobs == Some(0) {
            anyhow::bail!("jobs must be at least 1");
        }

        // Validate glob patterns compile
        for pattern in &self.include {
            Glob::new(pattern).with_context(|| format!("invalid include pattern: {}", pattern))?;
        }
        for pattern in &self.exclude {
            Glob::new(pattern).with_context(|| format!("invalid exclude pattern: {}", pattern))?;
        }

        Ok(())
    }

    /// Resolve config into compiled form ready for use
    pub fn resolve(&self) -> Result<ResolvedConfig> {
        self.validate()?;

        let include = if self.include.is_empty() {
            None
        } else {
            let mut builder = GlobSetBuilder::new();
            for pattern in &self.include {
                builder.add(Glob::new(pattern)?);
            }
            Some(builder.build()?)
        };

        // User excludes replace the defaults
        let exclude = {
            let mut builder = GlobSetBuilder::new();
            if self.exclude.is_empty() {
                for pattern in DEFAULT_EXCLUDES {
                    builder.add(Glob::new(pattern)?);
                }
            } else {
                for pattern in &self.exclude {
                    builder.add(Glob::new(pattern)?);
                }
            }
            builder.build()?
        };

        let settings = RequestSettings {
            model: self.model.clone().unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generation: GenerationConfig {
                max_output_length: self.max_output_length.unwrap_or(DEFAULT_MAX_OUTPUT_LENGTH),
            },
            retry: RetryPolicy::new(
                self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                Duration::from_secs_f64(self.delay_seconds.unwrap_or(DEFAULT_DELAY_SECONDS)),
            ),
        };

        let scope = if self.top_level_only.unwrap_or(false) {
            ExtractScope::TopLevel
        } else {
            ExtractScope::AllDefinitions
        };

        Ok(ResolvedConfig {
            include,
            exclude,
            settings,
            endpoint: self
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            api_key_env: self
                .api_key_env
                .clone()
                .unwrap_or_else(|| DEFAULT_API_KEY_ENV.to_string()),
            request_timeout: Duration::from_secs(
                self.request_timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS),
            ),
            deadline: self.deadline_seconds.map(Duration::from_secs_f64),
            jobs: self.jobs.unwrap_or(1),
            scope,
            config_path: None,
        })
    }
}

impl ResolvedConfig {
    /// Check if a file path should be included based on include/exclude patterns
    pub fn should_include(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        // Check exclude first
        if self.exclude.is_match(path_str.as_ref()) {
            return false;
        }

        // If include patterns exist, file must match at least one
        if let Some(ref include) = self.include {
            return include.is_match(path_str.as_ref());
        }

        true
    }

    /// Build a ResolvedConfig with all defaults (no config file)
    pub fn defaults() -> Result<Self> {
        RedactConfig::default().resolve()
    }
}

/// Discover and load a config file from the project root
///
/// Search order:
/// 1. `.redactrc.json`
/// 2. `redact.config.json`
/// 3. `[tool.redact]` in `pyproject.toml`
///
/// Returns `None` if no config file is found (use defaults).
pub fn discover_config(project_root: &Path) -> Result<Option<(RedactConfig, PathBuf)>> {
    // 1. .redactrc.json
    let rc_path = project_root.join(".redactrc.json");
    if rc_path.exists() {
        let config = load_config_file(&rc_path)?;
        return Ok(Some((config, rc_path)));
    }

    // 2. redact.config.json
    let config_path = project_root.join("redact.config.json");
    if config_path.exists() {
        let config = load_config_file(&config_path)?;
        return Ok(Some((config, config_path)));
    }

    // 3. pyproject.toml [tool.redact]
    let pyproject_path = project_root.join("pyproject.toml");
    if pyproject_path.exists() {
        if let Some(config) = load_from_pyproject(&pyproject_path)? {
            return Ok(Some((config, pyproject_path)));
        }
    }

    Ok(None)
}

/// Load config from an explicit file path
pub fn load_config_file(path: &Path) -> Result<RedactConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;

    let config: RedactConfig = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse config file: {}", path.display()))?;

    config
        .validate()
        .with_context(|| format!("invalid config in: {}", path.display()))?;

    Ok(config)
}

/// Load redact config from the `[tool.redact]` table of pyproject.toml
fn load_from_pyproject(path: &Path) -> Result<Option<RedactConfig>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let pyproject: toml::Table = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", path.display()))?;

    let section = pyproject
        .get("tool")
        .and_then(|tool| tool.get("redact"))
        .cloned();

    match section {
        Some(value) => {
            let config: RedactConfig = value
                .try_into()
                .with_context(|| format!("invalid redact config in {}", path.display()))?;
            config
                .validate()
                .with_context(|| format!("invalid redact config in {}", path.display()))?;
            Ok(Some(config))
        }
        None => Ok(None),
    }
}

/// Load and resolve config for a project
///
/// If `config_path` is provided, loads from that file.
/// Otherwise, discovers config from the project root.
/// Returns default config if nothing is found.
pub fn load_and_resolve(project_root: &Path, config_path: Option<&Path>) -> Result<ResolvedConfig> {
    let (config, source_path) = load_config(project_root, config_path)?;
    let mut resolved = config.resolve()?;
    resolved.config_path = source_path;
    Ok(resolved)
}

/// Load the unresolved config, so callers can apply overrides first
pub fn load_config(
    project_root: &Path,
    config_path: Option<&Path>,
) -> Result<(RedactConfig, Option<PathBuf>)> {
    if let Some(path) = config_path {
        let config = load_config_file(path)?;
        return Ok((config, Some(path.to_path_buf())));
    }
    Ok(match discover_config(project_root)? {
        Some((config, path)) => (config, Some(path)),
        None => (RedactConfig::default(), None),
    })
}
