//! # Execution Limits
//!
//! Bounds applied to test cases and run options before anything is handed
//! to an engine, plus the per-step timeout policy.
//!
//! Per-step timeout resolution:
//!
//! ```text
//! step.timeout ──or──> options.timeout ──clamp──> [.., max_step_timeout]
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::protocol::test_case::PhasedSteps;
use crate::protocol::{ExecutionOptions, Phase, TestStep};

// ============================================================================
// DEFAULTS
// ============================================================================

/// Maximum steps accepted in a single phase.
pub const DEFAULT_MAX_STEPS_PER_PHASE: usize = 100;

/// Default execution-level step timeout.
pub const DEFAULT_EXECUTION_TIMEOUT_MS: u64 = 30_000;

/// Bounds for the execution-level timeout option.
pub const MIN_EXECUTION_TIMEOUT_MS: u64 = 1_000;
pub const MAX_EXECUTION_TIMEOUT_MS: u64 = 120_000;

/// Hard ceiling for any single step, whatever the step asks for.
pub const DEFAULT_MAX_STEP_TIMEOUT_SECS: u64 = 120;

/// Wall-clock budget for a whole run.
pub const DEFAULT_MAX_EXECUTION_SECS: u64 = 600;

// ============================================================================
// LIMITS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionLimits {
    pub max_steps_per_phase: usize,
    pub min_timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub max_step_timeout: Duration,
    pub max_execution_time: Duration,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self {
            max_steps_per_phase: DEFAULT_MAX_STEPS_PER_PHASE,
            min_timeout_ms: MIN_EXECUTION_TIMEOUT_MS,
            max_timeout_ms: MAX_EXECUTION_TIMEOUT_MS,
            max_step_timeout: Duration::from_secs(DEFAULT_MAX_STEP_TIMEOUT_SECS),
            max_execution_time: Duration::from_secs(DEFAULT_MAX_EXECUTION_SECS),
        }
    }
}

impl ExecutionLimits {
    /// Overrides defaults from the environment.
    ///
    /// - `UI_RUNNER_MAX_STEPS`: steps per phase
    /// - `UI_RUNNER_MAX_STEP_TIMEOUT`: per-step ceiling, seconds
    /// - `UI_RUNNER_MAX_EXECUTION_SECS`: whole-run budget, seconds
    pub fn from_env() -> Self {
        let mut limits = Self::default();

        if let Some(n) = env_parse::<usize>("UI_RUNNER_MAX_STEPS") {
            limits.max_steps_per_phase = n;
        }
        if let Some(n) = env_parse::<u64>("UI_RUNNER_MAX_STEP_TIMEOUT") {
            limits.max_step_timeout = Duration::from_secs(n);
        }
        if let Some(n) = env_parse::<u64>("UI_RUNNER_MAX_EXECUTION_SECS") {
            limits.max_execution_time = Duration::from_secs(n);
        }

        limits
    }

    /// Tight limits for tests.
    pub fn strict() -> Self {
        Self {
            max_steps_per_phase: 10,
            max_step_timeout: Duration::from_secs(5),
            max_execution_time: Duration::from_secs(30),
            ..Self::default()
        }
    }

    /// Timeout for one step: its own override, else the run default,
    /// never above `max_step_timeout`.
    pub fn step_timeout(&self, step: &TestStep, options: &ExecutionOptions) -> Duration {
        let requested = Duration::from_millis(step.timeout.unwrap_or(options.timeout));
        requested.min(self.max_step_timeout)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

// ============================================================================
// VALIDATION
// ============================================================================

#[derive(Debug)]
pub struct LimitValidationResult {
    pub passed: bool,
    pub violations: Vec<LimitViolation>,
}

#[derive(Debug, Clone)]
pub struct LimitViolation {
    pub limit_name: String,
    pub limit_value: String,
    pub actual_value: String,
    pub message: String,
    pub kind: LimitKind,
}

/// Typed form of a violation, for callers that map it to their own errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    StepsPerPhase { phase: Phase, count: usize, max: usize },
    Timeout { timeout_ms: u64 },
}

/// Checks phase sizes of a test case.
pub fn validate_test_limits<T: PhasedSteps + ?Sized>(
    test: &T,
    limits: &ExecutionLimits,
) -> LimitValidationResult {
    let mut violations = Vec::new();

    for phase in Phase::ORDER {
        let count = test.phase_steps(phase).len();
        if count > limits.max_steps_per_phase {
            violations.push(LimitViolation {
                limit_name: "max_steps_per_phase".to_string(),
                limit_value: limits.max_steps_per_phase.to_string(),
                actual_value: count.to_string(),
                message: format!(
                    "{} phase has {} steps, maximum is {}",
                    phase, count, limits.max_steps_per_phase
                ),
                kind: LimitKind::StepsPerPhase {
                    phase,
                    count,
                    max: limits.max_steps_per_phase,
                },
            });
        }
    }

    LimitValidationResult {
        passed: violations.is_empty(),
        violations,
    }
}

/// Checks run options against the configured bounds.
pub fn validate_options(options: &ExecutionOptions, limits: &ExecutionLimits) -> LimitValidationResult {
    let mut violations = Vec::new();

    if options.timeout < limits.min_timeout_ms || options.timeout > limits.max_timeout_ms {
        violations.push(LimitViolation {
            limit_name: "timeout".to_string(),
            limit_value: format!("{}..={}", limits.min_timeout_ms, limits.max_timeout_ms),
            actual_value: options.timeout.to_string(),
            message: format!(
                "timeout {} ms is outside {}..={} ms",
                options.timeout, limits.min_timeout_ms, limits.max_timeout_ms
            ),
            kind: LimitKind::Timeout {
                timeout_ms: options.timeout,
            },
        });
    }

    LimitValidationResult {
        passed: violations.is_empty(),
        violations,
    }
}
