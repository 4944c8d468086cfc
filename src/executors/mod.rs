//! # Browser Drivers
//!
//! The seam between the execution engine and whatever actually drives a
//! browser. The engine resolves locators through [`PageQuery`] and hands the
//! resolved handle to [`BrowserDriver::perform`].
//!
//! Drivers split failures in two:
//!
//! - [`DriverError::Step`]: the action or assertion did not hold. The step
//!   fails and the run goes on.
//! - [`DriverError::Fault`]: the driver itself broke (crash, disconnect).
//!   The step is recorded as `error` and the run aborts.

pub mod simulated;
pub mod wait;

use async_trait::async_trait;
use thiserror::Error;

use crate::errors::{ErrorCode, StructuredError};
use crate::locator::{ElementHandle, PageQuery};
use crate::protocol::{ExecutionOptions, StepAction};

pub use simulated::SimulatedDriver;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DriverError {
    #[error("{}", step_message(.code, .message))]
    Step { code: ErrorCode, message: String },

    #[error("{0}")]
    Fault(String),
}

fn step_message(code: &ErrorCode, message: &str) -> String {
    StructuredError::new(*code, message).user_message()
}

impl DriverError {
    pub fn action(message: impl Into<String>) -> Self {
        Self::Step {
            code: ErrorCode::ACTION_FAILED,
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Step {
            code: ErrorCode::ASSERTION_FAILED,
            message: message.into(),
        }
    }

    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Step {
            code: ErrorCode::NAVIGATION_FAILED,
            message: message.into(),
        }
    }
}

/// What a performed action produced besides success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutcome {
    pub has_screenshot: bool,
}

/// Contract for anything that can drive a browser page.
///
/// Requires `Send + Sync` so one driver can back a spawned execution.
#[async_trait]
pub trait BrowserDriver: PageQuery {
    /// Opens a browser session for one run.
    async fn launch(&self, options: &ExecutionOptions) -> Result<(), DriverError>;

    /// Performs one action. `target` is the resolved element for actions
    /// that have one.
    async fn perform(
        &self,
        action: &StepAction<'_>,
        target: Option<&ElementHandle>,
    ) -> Result<ActionOutcome, DriverError>;

    /// Last known page URL.
    async fn current_url(&self) -> Option<String>;

    /// Closes the session. Called once per run, whatever the outcome.
    async fn close(&self) -> Result<(), DriverError>;
}
