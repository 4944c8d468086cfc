use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::step::{ActionKind, TestStep};
use super::test_case::TestCaseCreate;
use super::{ExecutionStatus, Phase};

// ============================================================================
// EXECUTION REQUEST
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        })
    }
}

/// Engine configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionOptions {
    #[serde(default)]
    pub browser: BrowserKind,
    #[serde(default = "default_headless")]
    pub headless: bool,
    /// Default per-step timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout: u64,
    #[serde(default = "default_stop_on_failure")]
    pub stop_on_failure: bool,
}

fn default_headless() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    crate::limits::DEFAULT_EXECUTION_TIMEOUT_MS
}

fn default_stop_on_failure() -> bool {
    true
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            browser: BrowserKind::default(),
            headless: default_headless(),
            timeout: default_timeout_ms(),
            stop_on_failure: default_stop_on_failure(),
        }
    }
}

/// Request accepted by the execution service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExecutionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case: Option<TestCaseCreate>,
    #[serde(flatten)]
    pub options: ExecutionOptions,
}

/// What an execution request points at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExecutionSource<'a> {
    Stored(&'a str),
    Inline(&'a TestCaseCreate),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("either test_id or test_case must be provided")]
    MissingSource,
    #[error("test_id and test_case are mutually exclusive")]
    AmbiguousSource,
}

impl ExecutionRequest {
    pub fn for_test(test_id: impl Into<String>) -> Self {
        Self {
            test_id: Some(test_id.into()),
            test_case: None,
            options: ExecutionOptions::default(),
        }
    }

    pub fn inline(test_case: TestCaseCreate) -> Self {
        Self {
            test_id: None,
            test_case: Some(test_case),
            options: ExecutionOptions::default(),
        }
    }

    pub fn source(&self) -> Result<ExecutionSource<'_>, RequestError> {
        match (&self.test_id, &self.test_case) {
            (Some(id), None) => Ok(ExecutionSource::Stored(id)),
            (None, Some(case)) => Ok(ExecutionSource::Inline(case)),
            (None, None) => Err(RequestError::MissingSource),
            (Some(_), Some(_)) => Err(RequestError::AmbiguousSource),
        }
    }
}

// ============================================================================
// STEP RESULT
// ============================================================================

/// Immutable record of one executed step.
///
/// `description` and `element_name` are copied at execution time so history
/// stays readable after the test case is edited. `error_message` is present
/// iff `status` is `failed` or `error`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StepResult {
    pub step_number: u32,
    #[serde(default)]
    pub phase: Phase,
    pub description: String,
    pub status: ExecutionStatus,
    pub action_type: ActionKind,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_name: Option<String>,
    #[serde(default)]
    pub has_screenshot: bool,
}

impl StepResult {
    fn from_step(step: &TestStep, phase: Phase, status: ExecutionStatus) -> Self {
        Self {
            step_number: step.step_number,
            phase,
            description: step.description.clone(),
            status,
            action_type: step.action,
            duration_ms: 0,
            error_message: None,
            element_name: step.element_name().map(str::to_string),
            has_screenshot: false,
        }
    }

    pub fn passed(step: &TestStep, phase: Phase, duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..Self::from_step(step, phase, ExecutionStatus::Passed)
        }
    }

    pub fn failed(step: &TestStep, phase: Phase, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            duration_ms,
            error_message: Some(error.into()),
            ..Self::from_step(step, phase, ExecutionStatus::Failed)
        }
    }

    pub fn errored(step: &TestStep, phase: Phase, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            duration_ms,
            error_message: Some(error.into()),
            ..Self::from_step(step, phase, ExecutionStatus::Error)
        }
    }

    pub fn skipped(step: &TestStep, phase: Phase) -> Self {
        Self::from_step(step, phase, ExecutionStatus::Skipped)
    }

    pub fn with_screenshot(mut self, has_screenshot: bool) -> Self {
        self.has_screenshot = has_screenshot;
        self
    }

    /// Checks the `error_message` iff failed/error rule.
    pub fn is_consistent(&self) -> bool {
        let needs_message = matches!(self.status, ExecutionStatus::Failed | ExecutionStatus::Error);
        needs_message == self.error_message.is_some()
    }
}

// ============================================================================
// TEST EXECUTION
// ============================================================================

/// Run summary of one test case execution.
///
/// Once `completed_at` is set:
/// `total_steps == step_results.len() == passed + failed + skipped + error`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestExecution {
    pub execution_id: String,
    pub test_name: String,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub passed_steps: u32,
    pub failed_steps: u32,
    #[serde(default)]
    pub skipped_steps: u32,
    #[serde(default)]
    pub error_steps: u32,
    pub total_steps: u32,
    pub step_results: Vec<StepResult>,
    /// Set only when a harness fault or cancellation aborted the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_url: Option<String>,
}

impl TestExecution {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }

    /// Whether the run was aborted by the harness rather than by a step.
    pub fn harness_fault(&self) -> bool {
        self.error_message.is_some()
    }

    /// Wall-clock span from start to completion, or to `now` while running.
    pub fn elapsed_ms(&self, now: DateTime<Utc>) -> u64 {
        let end = self.completed_at.unwrap_or(now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }

    /// Checks the count invariants that hold once the run has completed.
    pub fn counts_consistent(&self) -> bool {
        let total = self.step_results.len() as u32;
        self.total_steps == total
            && self.passed_steps + self.failed_steps + self.skipped_steps + self.error_steps == total
    }
}
