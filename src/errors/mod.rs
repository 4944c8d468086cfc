//! # Structured Error Codes
//!
//! Stable codes for every failure the runner can report, so CI jobs,
//! dashboards and support tickets can refer to a failure without parsing
//! its message.
//!
//! | Range | Category            | Meaning                                  |
//! |-------|---------------------|------------------------------------------|
//! | E1xxx | Validation          | Test case rejected before persistence    |
//! | E2xxx | Locator             | Element could not be uniquely resolved   |
//! | E3xxx | Step execution      | Action or assertion failed on the page   |
//! | E4xxx | Configuration       | Settings, files, request shape           |
//! | E5xxx | Harness / internal  | Engine or browser fault, aborts the run  |
//!
//! ```text
//! Error E2001: cannot locate element 'login_button' (step: 4)
//! ```
//!
//! Only E5xxx failures abort a run. Everything below that is captured into
//! the `StepResult` of the step that hit it.

use std::fmt;
use thiserror::Error;

use crate::locator::LocatorResolutionError;
use crate::validation::ValidationError;

// ============================================================================
// ERROR CODE
// ============================================================================

/// Four-digit code: first digit is the category, the rest the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(u16);

impl ErrorCode {
    // ========================================================================
    // E1xxx: Validation
    // ========================================================================

    /// Body has no steps.
    pub const EMPTY_BODY: Self = Self(1001);

    /// Name blank or too long.
    pub const INVALID_NAME: Self = Self(1002);

    /// Step misses a field its action needs (element, value).
    pub const MISSING_STEP_FIELD: Self = Self(1003);

    /// Step field present but unusable (e.g. non-numeric wait).
    pub const INVALID_STEP_FIELD: Self = Self(1004);

    /// Phase exceeds the configured step limit.
    pub const TOO_MANY_STEPS: Self = Self(1005);

    /// Payload is not a valid test case document.
    pub const INVALID_TEST_FORMAT: Self = Self(1006);

    // ========================================================================
    // E2xxx: Locator resolution
    // ========================================================================

    /// No strategy produced exactly one match.
    pub const ELEMENT_NOT_FOUND: Self = Self(2001);

    /// Locator carries no hint at all.
    pub const NO_LOCATOR_STRATEGY: Self = Self(2002);

    // ========================================================================
    // E3xxx: Step execution
    // ========================================================================

    /// Action could not be performed on the resolved element.
    pub const ACTION_FAILED: Self = Self(3001);

    /// Assertion did not hold.
    pub const ASSERTION_FAILED: Self = Self(3002);

    /// Step exceeded its timeout.
    pub const STEP_TIMEOUT: Self = Self(3003);

    /// Navigation did not reach the target URL.
    pub const NAVIGATION_FAILED: Self = Self(3004);

    // ========================================================================
    // E4xxx: Configuration
    // ========================================================================

    /// Run option outside allowed bounds.
    pub const INVALID_OPTION: Self = Self(4001);

    /// Request names neither or both of test id / inline test.
    pub const INVALID_REQUEST: Self = Self(4002);

    /// Input file missing or unreadable.
    pub const FILE_NOT_FOUND: Self = Self(4003);

    /// Referenced test case does not exist.
    pub const TEST_NOT_FOUND: Self = Self(4004);

    // ========================================================================
    // E5xxx: Harness / internal
    // ========================================================================

    /// Engine or browser fault.
    pub const HARNESS_FAULT: Self = Self(5001);

    /// Run cancelled.
    pub const CANCELLED: Self = Self(5002);

    /// Internal bug.
    pub const INTERNAL_ERROR: Self = Self(5003);

    /// Generation backend failure.
    pub const GENERATION_FAILED: Self = Self(5004);

    pub fn code(&self) -> u16 {
        self.0
    }

    /// `E` + zero-padded code, e.g. `E1001`.
    pub fn formatted(&self) -> String {
        format!("E{:04}", self.0)
    }

    pub fn category(&self) -> ErrorCategory {
        match self.0 / 1000 {
            1 => ErrorCategory::Validation,
            2 => ErrorCategory::Locator,
            3 => ErrorCategory::StepExecution,
            4 => ErrorCategory::Configuration,
            5 => ErrorCategory::Harness,
            _ => ErrorCategory::Unknown,
        }
    }

    pub fn description(&self) -> &'static str {
        match self.0 {
            1001 => "Test case has no body steps",
            1002 => "Invalid test case name",
            1003 => "Step is missing a required field",
            1004 => "Step field is invalid",
            1005 => "Too many steps in phase",
            1006 => "Invalid test case format",
            2001 => "Element not found",
            2002 => "Locator has no strategy",
            3001 => "Action failed",
            3002 => "Assertion failed",
            3003 => "Step timed out",
            3004 => "Navigation failed",
            4001 => "Invalid run option",
            4002 => "Invalid execution request",
            4003 => "File not found",
            4004 => "Test case not found",
            5001 => "Harness fault",
            5002 => "Execution cancelled",
            5003 => "Internal error",
            5004 => "Generation failed",
            _ => "Unknown error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.formatted())
    }
}

// ============================================================================
// CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Locator,
    StepExecution,
    Configuration,
    Harness,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "Validation"),
            Self::Locator => write!(f, "Locator"),
            Self::StepExecution => write!(f, "Step execution"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Harness => write!(f, "Harness"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

// ============================================================================
// TAXONOMY
// ============================================================================

/// The four failure classes of a run.
///
/// Step-level variants are captured into a `StepResult` and never escape the
/// execution boundary; only `Harness` aborts the run.
#[derive(Debug, Error)]
pub enum AutomationError {
    #[error("test case rejected: {}", join_messages(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    LocatorResolution(#[from] LocatorResolutionError),

    #[error("step {step_number}: {message}")]
    StepExecution {
        step_number: u32,
        code: ErrorCode,
        message: String,
    },

    #[error("harness fault: {message}")]
    Harness { message: String },
}

fn join_messages(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl AutomationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(errors) => errors
                .first()
                .map(ValidationError::code)
                .unwrap_or(ErrorCode::INVALID_TEST_FORMAT),
            Self::LocatorResolution(err) => err.code(),
            Self::StepExecution { code, .. } => *code,
            Self::Harness { .. } => ErrorCode::HARNESS_FAULT,
        }
    }

    /// Whether this error fails one step rather than the whole run.
    pub fn is_step_level(&self) -> bool {
        match self {
            Self::LocatorResolution(_) | Self::StepExecution { .. } => true,
            Self::Validation(_) | Self::Harness { .. } => false,
        }
    }
}

// ============================================================================
// STRUCTURED ERROR
// ============================================================================

/// Code + message + optional context, rendered for humans.
#[derive(Debug)]
pub struct StructuredError {
    pub code: ErrorCode,
    pub message: String,
    pub context: Option<ErrorContext>,
}

#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    pub step_number: Option<u32>,
    pub element: Option<String>,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

impl StructuredError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_step(mut self, step_number: u32) -> Self {
        self.context.get_or_insert_with(ErrorContext::default).step_number = Some(step_number);
        self
    }

    pub fn user_message(&self) -> String {
        let mut msg = format!("[{}] {}", self.code, self.message);

        if let Some(ctx) = &self.context {
            if let Some(step) = ctx.step_number {
                msg.push_str(&format!(" (step: {})", step));
            }
            if let Some(element) = &ctx.element {
                msg.push_str(&format!(" (element: {})", element));
            }
            if let (Some(expected), Some(actual)) = (&ctx.expected, &ctx.actual) {
                msg.push_str(&format!(" [expected: {}, actual: {}]", expected, actual));
            }
        }

        msg
    }
}

impl fmt::Display for StructuredError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for StructuredError {}

impl From<&AutomationError> for StructuredError {
    fn from(err: &AutomationError) -> Self {
        match err {
            AutomationError::StepExecution {
                step_number,
                code,
                message,
            } => StructuredError::new(*code, message.clone()).with_step(*step_number),
            _ => StructuredError::new(err.code(), err.to_string()),
        }
    }
}
