//! Attribute evaluation against the current checkout
//!
//! Every single evaluation (one attribute, optionally one platform) is
//! isolated: a failure is classified once, from evaluator stderr, and
//! recorded as an [`EvalFailure`] while the remaining evaluations continue.

use crate::process::{run_with_timeout, ProcessError};
use async_trait::async_trait;
use nixdex_core::{EvalOptions, EvaluationResult, PackageSpec, Platform};
use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Why an evaluation produced no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvalFailureKind {
    /// Attribute does not exist at this commit
    AttributeMissing,
    /// Attribute was removed (alias throwing an end-of-life message)
    Removed,
    /// Marked broken, insecure or unsupported on the platform
    Unavailable,
    Timeout,
    /// Any other evaluator error
    Evaluator,
    Spawn,
    EmptyOutput,
}

impl EvalFailureKind {
    /// Failures that are a normal part of walking history
    pub fn is_expected(self) -> bool {
        matches!(
            self,
            EvalFailureKind::AttributeMissing | EvalFailureKind::Removed | EvalFailureKind::Unavailable
        )
    }
}

impl fmt::Display for EvalFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EvalFailureKind::AttributeMissing => "attribute missing",
            EvalFailureKind::Removed => "removed",
            EvalFailureKind::Unavailable => "unavailable",
            EvalFailureKind::Timeout => "timed out",
            EvalFailureKind::Evaluator => "evaluator error",
            EvalFailureKind::Spawn => "evaluator could not be started",
            EvalFailureKind::EmptyOutput => "empty output",
        };
        f.write_str(s)
    }
}

/// Failure of one raw evaluation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct EvalError {
    pub kind: EvalFailureKind,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: EvalFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A failed evaluation with the package context it happened in
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "{package}: {attribute}{} {kind}: {message}",
    .system.as_ref().map(|s| format!(" on {s}")).unwrap_or_default()
)]
pub struct EvalFailure {
    pub package: String,
    pub attribute: String,
    pub system: Option<Platform>,
    pub kind: EvalFailureKind,
    pub message: String,
}

/// Evaluates one attribute path to a raw string
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn eval_raw(
        &self,
        dir: &Path,
        attr_path: &str,
        system: Option<&Platform>,
    ) -> Result<String, EvalError>;
}

/// `nix eval --file . <attr> --raw [--system <sys>]`
pub struct NixEvaluator {
    program: String,
    timeout: Duration,
}

impl NixEvaluator {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "nix".to_string(),
            timeout,
        }
    }

    /// Uses a different `nix` binary
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }
}

#[async_trait]
impl Evaluator for NixEvaluator {
    async fn eval_raw(
        &self,
        dir: &Path,
        attr_path: &str,
        system: Option<&Platform>,
    ) -> Result<String, EvalError> {
        let mut args = vec!["eval", "--file", ".", attr_path, "--raw"];
        if let Some(system) = system {
            args.extend(["--system", system.as_str()]);
        }

        let out = run_with_timeout(&self.program, &args, dir, self.timeout)
            .await
            .map_err(|e| match e {
                ProcessError::Timeout { .. } => EvalError::new(EvalFailureKind::Timeout, e.to_string()),
                ProcessError::Spawn { .. } => EvalError::new(EvalFailureKind::Spawn, e.to_string()),
            })?;

        if !out.success() {
            return Err(EvalError::new(classify_stderr(&out.stderr), error_summary(&out.stderr)));
        }

        let value = out.stdout.trim();
        if value.is_empty() {
            return Err(EvalError::new(EvalFailureKind::EmptyOutput, format!("{} evaluated to an empty string", attr_path)));
        }
        Ok(value.to_string())
    }
}

static REMOVED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)has been removed|end.of.life").expect("valid regex")
});

static UNAVAILABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)is marked as (?:broken|insecure)|is not available on the requested hostPlatform|has an unfree license|refusing to evaluate")
        .expect("valid regex")
});

static ATTRIBUTE_MISSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"attribute '[^']+'(?: in selection path '[^']*')? (?:not found|missing)").expect("valid regex")
});

/// Maps evaluator stderr to a failure kind
pub fn classify_stderr(stderr: &str) -> EvalFailureKind {
    if REMOVED.is_match(stderr) {
        EvalFailureKind::Removed
    } else if UNAVAILABLE.is_match(stderr) {
        EvalFailureKind::Unavailable
    } else if ATTRIBUTE_MISSING.is_match(stderr) {
        EvalFailureKind::AttributeMissing
    } else {
        EvalFailureKind::Evaluator
    }
}

/// The last `error:` line of evaluator stderr, which names the root cause
fn error_summary(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .filter_map(|l| l.strip_prefix("error:").map(str::trim))
        .filter(|l| !l.is_empty())
        .last()
        .or_else(|| stderr.lines().map(str::trim).rfind(|l| !l.is_empty()))
        .unwrap_or("no output")
        .to_string()
}

/// Everything evaluated for one package at one commit
#[derive(Debug, Default)]
pub struct PackageEvaluation {
    /// One result per attribute whose version evaluated
    pub results: Vec<EvaluationResult>,
    pub failures: Vec<EvalFailure>,
}

impl PackageEvaluation {
    /// Number of individual evaluations that failed
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// True when every failure is one a rerun would reproduce (missing,
    /// removed or unavailable attributes)
    pub fn is_complete(&self) -> bool {
        self.failures.iter().all(|f| f.kind.is_expected())
    }
}

/// Evaluates packages' attributes, versions first, then store paths
pub struct AttributeEvaluator<'a, E: Evaluator + ?Sized> {
    evaluator: &'a E,
    dir: &'a Path,
    options: &'a EvalOptions,
}

impl<'a, E: Evaluator + ?Sized> AttributeEvaluator<'a, E> {
    pub fn new(evaluator: &'a E, dir: &'a Path, options: &'a EvalOptions) -> Self {
        Self {
            evaluator,
            dir,
            options,
        }
    }

    /// Evaluates every attribute of `spec`. Failures never stop the
    /// remaining attributes or platforms.
    pub async fn evaluate_package(&self, spec: &PackageSpec) -> PackageEvaluation {
        let mut evaluation = PackageEvaluation::default();

        for attribute in &spec.attributes {
            let version_path = format!("{}.version", attribute);
            let version = match self.evaluator.eval_raw(self.dir, &version_path, None).await {
                Ok(version) => {
                    log::debug!("Eval {}: {}", version_path, version);
                    version
                }
                Err(e) => {
                    evaluation.failures.push(record(spec, attribute, None, e));
                    continue;
                }
            };

            let mut result = EvaluationResult::new(attribute.as_str(), Some(version));
            for system in self.options.target_systems() {
                match self.evaluator.eval_raw(self.dir, attribute, Some(system)).await {
                    Ok(path) => {
                        log::debug!("Eval {} ({}): {}", attribute, system, path);
                        result.store_paths.insert(system.clone(), path);
                    }
                    Err(e) => evaluation.failures.push(record(spec, attribute, Some(system), e)),
                }
            }
            evaluation.results.push(result);
        }

        evaluation
    }
}

fn record(spec: &PackageSpec, attribute: &str, system: Option<&Platform>, err: EvalError) -> EvalFailure {
    let failure = EvalFailure {
        package: spec.name.clone(),
        attribute: attribute.to_string(),
        system: system.cloned(),
        kind: err.kind,
        message: err.message,
    };
    if failure.kind.is_expected() {
        log::debug!("Eval skipped: {}", failure);
    } else {
        log::warn!("Eval failed: {}", failure);
    }
    failure
}
