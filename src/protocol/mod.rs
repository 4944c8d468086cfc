//! # Wire Protocol
//!
//! Shared data model exchanged between the generation service, the
//! execution service and any consumer. Every entity here serializes to the
//! JSON shape the services persist: snake_case closed sets, RFC 3339
//! timestamps and opaque string identifiers.
//!
//! ```text
//! TestCaseCreate ──assemble──> TestCase ──execute──> StepResult* ──fold──> TestExecution
//!                                  ^                                            |
//!                                  └──────────── apply_execution ───────────────┘
//! ```

pub mod execution;
pub mod generation;
pub mod locator;
pub mod step;
pub mod test_case;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use execution::{BrowserKind, ExecutionOptions, ExecutionRequest, StepResult, TestExecution};
pub use generation::{GenerationRequest, GenerationResponse};
pub use locator::ElementLocator;
pub use step::{ActionKind, StepAction, TestStep};
pub use test_case::{TestCase, TestCaseCreate, TestCaseUpdate};

// ============================================================================
// EXECUTION STATUS
// ============================================================================

/// Status of a single step or of a whole execution.
///
/// Lifecycle: `Pending` → `Running` → exactly one terminal value. A terminal
/// value never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
    Error,
}

impl ExecutionStatus {
    /// All statuses, in declaration order.
    pub const ALL: [ExecutionStatus; 6] = [
        Self::Pending,
        Self::Running,
        Self::Passed,
        Self::Failed,
        Self::Skipped,
        Self::Error,
    ];

    /// Statuses a concluded step or execution may hold.
    pub const TERMINAL: [ExecutionStatus; 4] =
        [Self::Passed, Self::Failed, Self::Skipped, Self::Error];

    pub fn is_terminal(self) -> bool {
        match self {
            Self::Pending | Self::Running => false,
            Self::Passed | Self::Failed | Self::Skipped | Self::Error => true,
        }
    }

    /// Whether `self → next` is a legal lifecycle move.
    ///
    /// Pending may jump straight to a terminal value (e.g. a step skipped
    /// without ever being dispatched).
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Running) => true,
            (Self::Pending, n) | (Self::Running, n) => n.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// PHASE
// ============================================================================

/// Step sequence a step belongs to. Ordering follows execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Deserialize, Serialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Setup,
    #[default]
    Body,
    Teardown,
}

impl Phase {
    pub const ORDER: [Phase; 3] = [Self::Setup, Self::Body, Self::Teardown];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Setup => "setup",
            Self::Body => "body",
            Self::Teardown => "teardown",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
