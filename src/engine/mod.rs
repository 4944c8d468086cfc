//! # Execution Engine
//!
//! Runs one test case against a [`BrowserDriver`] and folds the outcome
//! into a [`TestExecution`].
//!
//! ## Order
//!
//! Steps run strictly one at a time: setup, then body, then teardown, each
//! by `step_number` (ties keep their submitted order). Nothing inside one
//! run is parallel; separate runs may share a test case read-only.
//!
//! ## Failure policy
//!
//! | Event                                 | Step status | Run continues?                         |
//! |---------------------------------------|-------------|----------------------------------------|
//! | element not uniquely resolved         | `failed`    | yes, unless `stop_on_failure`          |
//! | action / assertion failed             | `failed`    | yes, unless `stop_on_failure`          |
//! | step timeout                          | `failed`    | yes, unless `stop_on_failure`          |
//! | driver fault (crash, disconnect)      | `error`     | no; teardown skipped                   |
//! | cancellation / run time budget spent  | n/a         | no; teardown still runs                |
//!
//! With `stop_on_failure`, the setup/body steps after a failure are
//! recorded as `skipped`. Teardown always runs unless the driver faulted,
//! and every teardown step is attempted.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument};

use crate::aggregate::ExecutionFold;
use crate::errors::{AutomationError, ErrorCode, StructuredError};
use crate::executors::wait::{pause, PauseOutcome, POLL_INTERVAL};
use crate::executors::{ActionOutcome, BrowserDriver, DriverError};
use crate::limits::ExecutionLimits;
use crate::locator::{resolve, ResolveError};
use crate::protocol::step::WaitFor;
use crate::protocol::test_case::PhasedSteps;
use crate::protocol::{ExecutionOptions, ExecutionStatus, Phase, StepAction, StepResult, TestExecution, TestStep};
use crate::telemetry::instrumentation::StepSpanContext;
use crate::validation::{renumber, ValidationError};

/// Top-level message of a cancelled run.
pub const CANCELLED_MESSAGE: &str = "Execution cancelled";

/// Live per-step notification.
pub type StepCallback = Arc<dyn Fn(&StepResult) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// `stop_on_failure` tripped: remaining setup/body steps are skipped.
    Halted,
    /// Cancelled or out of time: stop, but still tear down.
    Cancelled,
    /// Driver fault: stop, no teardown.
    Faulted,
}

pub struct ExecutionEngine<D: BrowserDriver + ?Sized> {
    driver: Arc<D>,
    limits: ExecutionLimits,
    cancel: CancellationToken,
    on_step: Option<StepCallback>,
}

impl<D: BrowserDriver + ?Sized> ExecutionEngine<D> {
    pub fn new(driver: Arc<D>, limits: ExecutionLimits) -> Self {
        Self {
            driver,
            limits,
            cancel: CancellationToken::new(),
            on_step: None,
        }
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn on_step(mut self, callback: impl Fn(&StepResult) + Send + Sync + 'static) -> Self {
        self.on_step = Some(Arc::new(callback));
        self
    }

    /// Handle that cancels the runs of this engine.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Runs every phase and returns the completed execution.
    ///
    /// Never fails: step problems land in step results, harness problems
    /// in the top-level `error_message`.
    pub async fn execute<T>(&self, test_name: &str, test: &T, options: &ExecutionOptions) -> TestExecution
    where
        T: PhasedSteps + ?Sized,
    {
        let mut fold = ExecutionFold::new(test_name, Utc::now());
        if let Err(err) = fold.begin(Utc::now()) {
            error!(error = %err, "Fresh execution refused to start");
        }

        info!(
            execution_id = %fold.execution_id(),
            test_name,
            total_steps = test.total_steps(),
            browser = %options.browser,
            stop_on_failure = options.stop_on_failure,
            "🚀 Execution started"
        );

        if let Err(err) = self.driver.launch(options).await {
            fold.abort(harness_message(&err.to_string()));
            return self.conclude(fold).await;
        }

        // No deadline when the budget does not fit in an `Instant`.
        let deadline = Instant::now().checked_add(self.limits.max_execution_time);
        let mut flow = Flow::Continue;

        for phase in [Phase::Setup, Phase::Body] {
            for step in &ordered(test, phase) {
                match flow {
                    Flow::Continue => {}
                    Flow::Halted => {
                        if !self.record(&mut fold, StepResult::skipped(step, phase)) {
                            flow = Flow::Faulted;
                        }
                        continue;
                    }
                    Flow::Cancelled | Flow::Faulted => break,
                }

                if self.cancel.is_cancelled() {
                    warn!(phase = %phase, step = step.step_number, "Cancellation requested");
                    fold.abort(CANCELLED_MESSAGE);
                    flow = Flow::Cancelled;
                    break;
                }
                if budget_spent(deadline) {
                    fold.abort(self.budget_message());
                    flow = Flow::Cancelled;
                    break;
                }

                let result = self.run_step(phase, step, options, &self.cancel, deadline).await;
                flow = match result.status {
                    ExecutionStatus::Error => {
                        fold.abort(result.error_message.clone().unwrap_or_default());
                        Flow::Faulted
                    }
                    _ if self.cancel.is_cancelled() => {
                        fold.abort(CANCELLED_MESSAGE);
                        Flow::Cancelled
                    }
                    _ if budget_spent(deadline) => {
                        warn!(phase = %phase, step = step.step_number, "Run time budget spent");
                        fold.abort(self.budget_message());
                        Flow::Cancelled
                    }
                    ExecutionStatus::Failed if options.stop_on_failure => Flow::Halted,
                    _ => Flow::Continue,
                };
                if !self.record(&mut fold, result) {
                    flow = Flow::Faulted;
                }
            }
        }

        if flow == Flow::Faulted {
            warn!("Skipping teardown after harness fault");
        } else {
            // Teardown is attempted in full, even after cancellation.
            let teardown_token = CancellationToken::new();
            for step in &ordered(test, Phase::Teardown) {
                let result = self
                    .run_step(Phase::Teardown, step, options, &teardown_token, None)
                    .await;
                let faulted = result.status == ExecutionStatus::Error;
                if faulted {
                    fold.abort(result.error_message.clone().unwrap_or_default());
                }
                if !self.record(&mut fold, result) || faulted {
                    break;
                }
            }
        }

        self.conclude(fold).await
    }

    fn budget_message(&self) -> String {
        format!(
            "Execution exceeded its {} ms time budget",
            self.limits.max_execution_time.as_millis()
        )
    }

    /// Folds one result and notifies the callback. A result the fold
    /// refuses is a harness fault; returns `false` then.
    fn record(&self, fold: &mut ExecutionFold, result: StepResult) -> bool {
        match result.status {
            ExecutionStatus::Passed => info!(phase = %result.phase, step = result.step_number, duration_ms = result.duration_ms, "✅ {}", result.description),
            ExecutionStatus::Skipped => info!(phase = %result.phase, step = result.step_number, "⏭️ {}", result.description),
            _ => warn!(
                phase = %result.phase,
                step = result.step_number,
                status = %result.status,
                error = result.error_message.as_deref().unwrap_or(""),
                "❌ {}",
                result.description
            ),
        }

        match fold.record(result.clone()) {
            Ok(()) => {
                if let Some(callback) = &self.on_step {
                    callback(&result);
                }
                true
            }
            Err(err) => {
                error!(error = %err, "Step result rejected by fold");
                fold.abort(
                    StructuredError::new(ErrorCode::INTERNAL_ERROR, format!("step result rejected: {}", err))
                        .user_message(),
                );
                false
            }
        }
    }

    async fn conclude(&self, fold: ExecutionFold) -> TestExecution {
        let page_url = self.driver.current_url().await;
        if let Err(err) = self.driver.close().await {
            warn!(error = %err, "Browser did not close cleanly");
        }

        let execution = fold.finish(Utc::now(), page_url);
        info!(
            execution_id = %execution.execution_id,
            status = %execution.status,
            passed = execution.passed_steps,
            failed = execution.failed_steps,
            skipped = execution.skipped_steps,
            errors = execution.error_steps,
            duration_ms = execution.duration_ms,
            "🏁 Execution finished"
        );
        execution
    }

    async fn run_step(
        &self,
        phase: Phase,
        step: &TestStep,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> StepResult {
        let mut span_ctx = StepSpanContext::new(phase, step);
        let span = span_ctx.span();

        let result = self
            .attempt(phase, step, options, cancel, deadline)
            .instrument(span.clone())
            .await;

        span_ctx.finish(&result);
        span_ctx.record(&span);
        result
    }

    async fn attempt(
        &self,
        phase: Phase,
        step: &TestStep,
        options: &ExecutionOptions,
        cancel: &CancellationToken,
        deadline: Option<Instant>,
    ) -> StepResult {
        let start = Instant::now();

        let action = match step.action() {
            Ok(action) => action,
            Err(err) => {
                let err = ValidationError::from_shape(phase, step.step_number, err);
                return StepResult::failed(step, phase, 0, StructuredError::new(err.code(), err.to_string()).user_message());
            }
        };

        if let StepAction::Wait(WaitFor::Duration(ms)) = action {
            let left = remaining(deadline);
            let budget_bound = left < self.limits.max_step_timeout;
            let capped = ms.min(ceil_millis(self.limits.max_step_timeout.min(left)));
            return match pause(capped, cancel).await {
                PauseOutcome::Cancelled { .. } => StepResult::skipped(step, phase),
                PauseOutcome::Elapsed { .. } if capped < ms && budget_bound => StepResult::skipped(step, phase),
                PauseOutcome::Elapsed { actual_ms } if capped < ms => {
                    let failure = AutomationError::StepExecution {
                        step_number: step.step_number,
                        code: ErrorCode::STEP_TIMEOUT,
                        message: format!("wait of {} ms exceeds the {} ms step limit", ms, capped),
                    };
                    StepResult::failed(step, phase, actual_ms, StructuredError::from(&failure).user_message())
                }
                PauseOutcome::Elapsed { actual_ms } => StepResult::passed(step, phase, actual_ms),
            };
        }

        let limit = self.limits.step_timeout(step, options).min(remaining(deadline));
        let outcome = timeout(limit, self.dispatch(step.step_number, &action)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let failure = match outcome {
            Ok(Ok(outcome)) => {
                return StepResult::passed(step, phase, elapsed).with_screenshot(outcome.has_screenshot)
            }
            Ok(Err(err)) => err,
            // Cut short by the run budget rather than the step's own limit.
            Err(_) if budget_spent(deadline) => return StepResult::skipped(step, phase),
            Err(_) => AutomationError::StepExecution {
                step_number: step.step_number,
                code: ErrorCode::STEP_TIMEOUT,
                message: format!("timed out after {} ms", limit.as_millis()),
            },
        };

        let message = StructuredError::from(&failure).user_message();
        if failure.is_step_level() {
            StepResult::failed(step, phase, elapsed, message)
        } else {
            StepResult::errored(step, phase, elapsed, message)
        }
    }

    /// Resolves the target (if any) and performs the action.
    async fn dispatch(&self, step_number: u32, action: &StepAction<'_>) -> Result<ActionOutcome, AutomationError> {
        let driver = &*self.driver;
        let step_error = |err: DriverError| match err {
            DriverError::Step { code, message } => AutomationError::StepExecution {
                step_number,
                code,
                message,
            },
            DriverError::Fault(message) => AutomationError::Harness { message },
        };

        let handle = match *action {
            StepAction::AssertHidden { target } => {
                match resolve(driver, target).await {
                    Ok(_) => {
                        return Err(AutomationError::StepExecution {
                            step_number,
                            code: ErrorCode::ASSERTION_FAILED,
                            message: format!("element '{}' is visible", target.name),
                        })
                    }
                    Err(ResolveError::NotFound(err)) if err.nothing_matched() && !err.attempts.is_empty() => None,
                    Err(ResolveError::NotFound(err)) => {
                        return Err(AutomationError::StepExecution {
                            step_number,
                            code: ErrorCode::ASSERTION_FAILED,
                            message: format!("element '{}' has visible matches ({})", target.name, err),
                        })
                    }
                    Err(ResolveError::Engine(message)) => return Err(AutomationError::Harness { message }),
                }
            }
            StepAction::Wait(WaitFor::Element(target)) => loop {
                match resolve(driver, target).await {
                    Ok(resolution) => break Some(resolution.handle),
                    Err(ResolveError::NotFound(_)) => sleep(POLL_INTERVAL).await,
                    Err(ResolveError::Engine(message)) => return Err(AutomationError::Harness { message }),
                }
            },
            _ => match action.target() {
                Some(target) => match resolve(driver, target).await {
                    Ok(resolution) => Some(resolution.handle),
                    Err(ResolveError::NotFound(err)) => return Err(AutomationError::LocatorResolution(err)),
                    Err(ResolveError::Engine(message)) => return Err(AutomationError::Harness { message }),
                },
                None => None,
            },
        };

        driver.perform(action, handle.as_ref()).await.map_err(step_error)
    }
}

/// Steps of one phase in execution order, numbered `1..=n`.
///
/// Submitted numbers only order the steps: ties keep their submitted
/// position and gaps close up.
fn ordered<T: PhasedSteps + ?Sized>(test: &T, phase: Phase) -> Vec<TestStep> {
    let mut steps = test.phase_steps(phase).to_vec();
    renumber(&mut steps);
    steps
}

fn remaining(deadline: Option<Instant>) -> Duration {
    deadline.map_or(Duration::MAX, |d| d.saturating_duration_since(Instant::now()))
}

/// Rounds up so a capped pause never ends before its cap.
fn ceil_millis(d: Duration) -> u64 {
    u64::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

fn budget_spent(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

fn harness_message(detail: &str) -> String {
    StructuredError::new(ErrorCode::HARNESS_FAULT, format!("browser launch failed: {}", detail)).user_message()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::SimulatedDriver;
    use crate::locator::{ElementHandle, LocatorStrategy, PageQuery, PageSnapshot, QueryError};
    use crate::protocol::{ActionKind, ElementLocator, TestCaseCreate};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const LOGIN: &str = "https://example.com/login";

    fn pages() -> Vec<PageSnapshot> {
        serde_json::from_value(json!([
            {
                "url": LOGIN,
                "title": "Sign in",
                "elements": [
                    { "handle": "user", "id": "username" },
                    { "handle": "submit", "test_id": "login-submit", "text": "Sign in",
                      "href": "https://example.com/home" },
                    { "handle": "toggle", "test_id": "show-help", "reveals": ["help"] },
                    { "handle": "help", "test_id": "help", "text": "Need help?", "visible": false }
                ]
            },
            {
                "url": "https://example.com/home",
                "title": "Dashboard",
                "elements": [ { "handle": "greeting", "text": "Welcome, testuser" } ]
            }
        ]))
        .unwrap()
    }

    fn testid(id: &str) -> ElementLocator {
        let mut l = ElementLocator::named(id);
        l.data_testid = Some(id.to_string());
        l
    }

    fn open() -> TestStep {
        TestStep::new(1, ActionKind::Navigate, "Open login").with_value(LOGIN)
    }

    fn case(setup: Vec<TestStep>, body: Vec<TestStep>, teardown: Vec<TestStep>) -> TestCaseCreate {
        TestCaseCreate {
            name: "Login".into(),
            description: String::new(),
            tags: vec![],
            steps: body,
            setup_steps: setup,
            teardown_steps: teardown,
        }
    }

    fn engine() -> ExecutionEngine<SimulatedDriver> {
        ExecutionEngine::new(Arc::new(SimulatedDriver::new(pages())), ExecutionLimits::strict())
    }

    fn statuses(execution: &TestExecution) -> Vec<(Phase, u32, ExecutionStatus)> {
        execution
            .step_results
            .iter()
            .map(|r| (r.phase, r.step_number, r.status))
            .collect()
    }

    #[tokio::test]
    async fn test_all_passed() {
        let test = case(
            vec![],
            vec![
                open(),
                TestStep::new(2, ActionKind::Fill, "user").with_element({
                    let mut l = ElementLocator::named("username_field");
                    l.id = Some("username".into());
                    l
                }).with_value("testuser"),
                TestStep::new(3, ActionKind::Click, "submit").with_element(testid("login-submit")),
            ],
            vec![],
        );

        let execution = engine().execute("Login", &test, &ExecutionOptions::default()).await;

        assert_eq!(execution.status, ExecutionStatus::Passed);
        assert_eq!(execution.passed_steps, 3);
        assert_eq!(execution.failed_steps, 0);
        assert!(execution.counts_consistent());
        assert!(execution.error_message.is_none());
        assert_eq!(execution.page_url.as_deref(), Some("https://example.com/home"));
        assert_eq!(execution.step_results[1].element_name.as_deref(), Some("username_field"));
    }

    #[tokio::test]
    async fn test_stop_on_failure_skips_rest_and_tears_down() {
        let test = case(
            vec![open()],
            vec![
                TestStep::new(1, ActionKind::AssertText, "welcome").with_value("Welcome"),
                TestStep::new(2, ActionKind::Screenshot, "snap"),
            ],
            vec![TestStep::new(1, ActionKind::Screenshot, "cleanup snap")],
        );

        let execution = engine().execute("Login", &test, &ExecutionOptions::default()).await;

        assert_eq!(
            statuses(&execution),
            vec![
                (Phase::Setup, 1, ExecutionStatus::Passed),
                (Phase::Body, 1, ExecutionStatus::Failed),
                (Phase::Body, 2, ExecutionStatus::Skipped),
                (Phase::Teardown, 1, ExecutionStatus::Passed),
            ]
        );
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error_message.is_none());
        assert!(execution.step_results[1]
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("[E3002]")));
        assert!(execution.step_results[3].has_screenshot);
    }

    #[tokio::test]
    async fn test_failures_continue_without_stop_on_failure() {
        let test = case(
            vec![],
            vec![
                open(),
                TestStep::new(2, ActionKind::Click, "missing").with_element(testid("nope")),
                TestStep::new(3, ActionKind::Click, "submit").with_element(testid("login-submit")),
            ],
            vec![],
        );
        let options = ExecutionOptions {
            stop_on_failure: false,
            ..ExecutionOptions::default()
        };

        let execution = engine().execute("Login", &test, &options).await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.passed_steps, 2);
        assert_eq!(execution.failed_steps, 1);
        assert!(execution.step_results[1]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("[E2001]") && m.contains("test_id=nope (0 matches)")));
    }

    #[tokio::test]
    async fn test_setup_failure_skips_body() {
        let test = case(
            vec![TestStep::new(1, ActionKind::Navigate, "bad").with_value("https://nowhere.test")],
            vec![open(), TestStep::new(2, ActionKind::Screenshot, "snap")],
            vec![TestStep::new(1, ActionKind::Screenshot, "cleanup")],
        );

        let execution = engine().execute("Login", &test, &ExecutionOptions::default()).await;
        assert_eq!(
            statuses(&execution),
            vec![
                (Phase::Setup, 1, ExecutionStatus::Failed),
                (Phase::Body, 1, ExecutionStatus::Skipped),
                (Phase::Body, 2, ExecutionStatus::Skipped),
                (Phase::Teardown, 1, ExecutionStatus::Passed),
            ]
        );
    }

    #[tokio::test]
    async fn test_harness_fault_aborts_without_teardown() {
        let driver = SimulatedDriver::new(pages()).with_fault_on(ActionKind::Click);
        let engine = ExecutionEngine::new(Arc::new(driver), ExecutionLimits::strict());
        let test = case(
            vec![],
            vec![
                open(),
                TestStep::new(2, ActionKind::Click, "submit").with_element(testid("login-submit")),
                TestStep::new(3, ActionKind::Screenshot, "snap"),
            ],
            vec![TestStep::new(1, ActionKind::Screenshot, "cleanup")],
        );

        let execution = engine.execute("Login", &test, &ExecutionOptions::default()).await;

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(
            statuses(&execution),
            vec![
                (Phase::Body, 1, ExecutionStatus::Passed),
                (Phase::Body, 2, ExecutionStatus::Error),
            ]
        );
        assert!(execution
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("browser crashed")));
        assert!(execution.counts_consistent());
    }

    #[tokio::test]
    async fn test_cancellation_still_tears_down() {
        let engine = engine();
        engine.cancellation().cancel();
        let test = case(
            vec![open()],
            vec![TestStep::new(1, ActionKind::Screenshot, "snap")],
            vec![TestStep::new(1, ActionKind::Screenshot, "cleanup")],
        );

        let execution = engine.execute("Login", &test, &ExecutionOptions::default()).await;

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.error_message.as_deref(), Some(CANCELLED_MESSAGE));
        assert_eq!(statuses(&execution), vec![(Phase::Teardown, 1, ExecutionStatus::Passed)]);
    }

    #[tokio::test]
    async fn test_callback_sees_results_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = engine().on_step(move |r| {
            if let Ok(mut v) = sink.lock() {
                v.push((r.phase, r.step_number));
            }
        });
        let test = case(
            vec![open()],
            vec![TestStep::new(1, ActionKind::Screenshot, "a"), TestStep::new(2, ActionKind::Screenshot, "b")],
            vec![TestStep::new(1, ActionKind::Screenshot, "c")],
        );

        engine.execute("Login", &test, &ExecutionOptions::default()).await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![(Phase::Setup, 1), (Phase::Body, 1), (Phase::Body, 2), (Phase::Teardown, 1)]
        );
    }

    #[tokio::test]
    async fn test_steps_run_by_number_not_by_position() {
        let test = case(
            vec![open()],
            vec![
                TestStep::new(2, ActionKind::Screenshot, "snap"),
                TestStep::new(1, ActionKind::AssertText, "welcome").with_value("Welcome"),
            ],
            vec![],
        );
        let options = ExecutionOptions {
            stop_on_failure: false,
            ..ExecutionOptions::default()
        };

        let execution = engine().execute("Login", &test, &options).await;

        assert_eq!(
            statuses(&execution),
            vec![
                (Phase::Setup, 1, ExecutionStatus::Passed),
                (Phase::Body, 1, ExecutionStatus::Failed),
                (Phase::Body, 2, ExecutionStatus::Passed),
            ]
        );
        assert_eq!(execution.step_results[1].description, "welcome");
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.total_steps, 3);
        assert!(execution.counts_consistent());
        assert!(execution.error_message.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_step_numbers_keep_submitted_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = engine().on_step(move |r| {
            if let Ok(mut v) = sink.lock() {
                v.push(r.description.clone());
            }
        });
        let test = case(
            vec![],
            vec![
                TestStep::new(1, ActionKind::Navigate, "a").with_value(LOGIN),
                TestStep::new(1, ActionKind::Screenshot, "b"),
                TestStep::new(1, ActionKind::AssertText, "c").with_value("Welcome"),
            ],
            vec![],
        );
        let options = ExecutionOptions {
            stop_on_failure: false,
            ..ExecutionOptions::default()
        };

        let execution = engine.execute("Dupes", &test, &options).await;

        assert_eq!(
            statuses(&execution),
            vec![
                (Phase::Body, 1, ExecutionStatus::Passed),
                (Phase::Body, 2, ExecutionStatus::Passed),
                (Phase::Body, 3, ExecutionStatus::Failed),
            ]
        );
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.counts_consistent());
        assert_eq!(*seen.lock().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_refused_result_is_a_harness_fault() {
        let seen = Arc::new(Mutex::new(0));
        let sink = seen.clone();
        let engine = engine().on_step(move |_| {
            if let Ok(mut n) = sink.lock() {
                *n += 1;
            }
        });
        let mut fold = ExecutionFold::new("Login", Utc::now());
        fold.begin(Utc::now()).unwrap();

        let second = TestStep::new(2, ActionKind::Screenshot, "snap");
        let first = TestStep::new(1, ActionKind::AssertText, "welcome").with_value("Welcome");
        assert!(engine.record(&mut fold, StepResult::passed(&second, Phase::Body, 1)));
        assert!(!engine.record(&mut fold, StepResult::failed(&first, Phase::Body, 1, "nope")));

        let execution = fold.finish(Utc::now(), None);
        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.step_results.len(), 1);
        assert!(execution
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("[E5003]")));
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_hidden_and_revealed_elements() {
        let test = case(
            vec![],
            vec![
                open(),
                TestStep::new(2, ActionKind::AssertHidden, "help hidden").with_element(testid("help")),
                TestStep::new(3, ActionKind::Click, "show help").with_element(testid("show-help")),
                TestStep::new(4, ActionKind::Wait, "help appears").with_element(testid("help")),
                TestStep::new(5, ActionKind::AssertVisible, "help visible").with_element(testid("help")),
                TestStep::new(6, ActionKind::AssertHidden, "help gone?").with_element(testid("help")),
            ],
            vec![],
        );
        let options = ExecutionOptions {
            stop_on_failure: false,
            ..ExecutionOptions::default()
        };

        let execution = engine().execute("Help", &test, &options).await;
        let body: Vec<ExecutionStatus> = execution.step_results.iter().map(|r| r.status).collect();
        assert_eq!(
            body,
            vec![
                ExecutionStatus::Passed,
                ExecutionStatus::Passed,
                ExecutionStatus::Passed,
                ExecutionStatus::Passed,
                ExecutionStatus::Passed,
                ExecutionStatus::Failed,
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_step_fails_instead_of_crashing() {
        let test = case(vec![], vec![TestStep::new(1, ActionKind::Click, "no element")], vec![]);
        let execution = engine().execute("Broken", &test, &ExecutionOptions::default()).await;
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.step_results[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.starts_with("[E1003]")));
    }

    /// Delegates to the simulated driver, but every action takes `delay`.
    struct SlowDriver {
        inner: SimulatedDriver,
        delay: Duration,
    }

    #[async_trait]
    impl PageQuery for SlowDriver {
        async fn query(&self, strategy: LocatorStrategy, selector: &str) -> Result<Vec<ElementHandle>, QueryError> {
            self.inner.query(strategy, selector).await
        }
    }

    #[async_trait]
    impl BrowserDriver for SlowDriver {
        async fn launch(&self, options: &ExecutionOptions) -> Result<(), DriverError> {
            self.inner.launch(options).await
        }

        async fn perform(&self, action: &StepAction<'_>, target: Option<&ElementHandle>) -> Result<ActionOutcome, DriverError> {
            sleep(self.delay).await;
            self.inner.perform(action, target).await
        }

        async fn current_url(&self) -> Option<String> {
            self.inner.current_url().await
        }

        async fn close(&self) -> Result<(), DriverError> {
            self.inner.close().await
        }
    }

    #[tokio::test]
    async fn test_step_timeout_is_failure_not_error() {
        let driver = SlowDriver {
            inner: SimulatedDriver::new(pages()),
            delay: Duration::from_millis(300),
        };
        let engine = ExecutionEngine::new(Arc::new(driver), ExecutionLimits::strict());
        let test = case(
            vec![],
            vec![
                TestStep::new(1, ActionKind::Navigate, "slow open").with_value(LOGIN).with_timeout(50),
                TestStep::new(2, ActionKind::Screenshot, "snap").with_timeout(2_000),
            ],
            vec![],
        );
        let options = ExecutionOptions {
            stop_on_failure: false,
            ..ExecutionOptions::default()
        };

        let execution = engine.execute("Slow", &test, &options).await;

        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert!(execution.error_message.is_none());
        assert_eq!(execution.step_results[0].status, ExecutionStatus::Failed);
        assert!(execution.step_results[0]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("[E3003]") && m.contains("timed out after 50 ms")));
        assert_eq!(execution.step_results[1].status, ExecutionStatus::Passed);
    }

    #[tokio::test]
    async fn test_long_wait_is_cut_at_step_ceiling() {
        let limits = ExecutionLimits {
            max_step_timeout: Duration::from_millis(100),
            ..ExecutionLimits::strict()
        };
        let engine = ExecutionEngine::new(Arc::new(SimulatedDriver::new(pages())), limits);
        let test = case(
            vec![],
            vec![
                open(),
                TestStep::new(2, ActionKind::Wait, "long pause").with_value("2000"),
                TestStep::new(3, ActionKind::Screenshot, "snap"),
            ],
            vec![],
        );
        let options = ExecutionOptions {
            stop_on_failure: false,
            ..ExecutionOptions::default()
        };

        let start = Instant::now();
        let execution = engine.execute("Pause", &test, &options).await;

        assert!(start.elapsed() < Duration::from_millis(1_500));
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.step_results[1].status, ExecutionStatus::Failed);
        assert!(execution.step_results[1]
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("[E3003]") && m.contains("wait of 2000 ms")));
        assert_eq!(execution.step_results[2].status, ExecutionStatus::Passed);
    }

    #[tokio::test]
    async fn test_run_budget_cuts_wait_and_still_tears_down() {
        let limits = ExecutionLimits {
            max_execution_time: Duration::from_millis(200),
            ..ExecutionLimits::strict()
        };
        let engine = ExecutionEngine::new(Arc::new(SimulatedDriver::new(pages())), limits);
        let test = case(
            vec![],
            vec![
                open(),
                TestStep::new(2, ActionKind::Wait, "long pause").with_value("2000"),
                TestStep::new(3, ActionKind::Screenshot, "never runs"),
            ],
            vec![TestStep::new(1, ActionKind::Screenshot, "cleanup")],
        );

        let start = Instant::now();
        let execution = engine.execute("Budget", &test, &ExecutionOptions::default()).await;

        assert!(start.elapsed() < Duration::from_millis(1_500));
        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(
            execution.error_message.as_deref(),
            Some("Execution exceeded its 200 ms time budget")
        );
        assert_eq!(
            statuses(&execution),
            vec![
                (Phase::Body, 1, ExecutionStatus::Passed),
                (Phase::Body, 2, ExecutionStatus::Skipped),
                (Phase::Teardown, 1, ExecutionStatus::Passed),
            ]
        );
        assert!(execution.counts_consistent());
    }

    #[tokio::test]
    async fn test_unrepresentable_budget_means_no_deadline() {
        let limits = ExecutionLimits {
            max_execution_time: Duration::MAX,
            ..ExecutionLimits::strict()
        };
        let engine = ExecutionEngine::new(Arc::new(SimulatedDriver::new(pages())), limits);
        let test = case(
            vec![],
            vec![open(), TestStep::new(2, ActionKind::Wait, "short pause").with_value("20")],
            vec![],
        );

        let execution = engine.execute("Unbounded", &test, &ExecutionOptions::default()).await;

        assert_eq!(execution.status, ExecutionStatus::Passed);
        assert_eq!(execution.passed_steps, 2);
        assert!(execution.error_message.is_none());
    }

    struct DeadDriver;

    #[async_trait]
    impl PageQuery for DeadDriver {
        async fn query(&self, _: LocatorStrategy, _: &str) -> Result<Vec<ElementHandle>, QueryError> {
            Ok(Vec::new())
        }
    }

    #[async_trait]
    impl BrowserDriver for DeadDriver {
        async fn launch(&self, _: &ExecutionOptions) -> Result<(), DriverError> {
            Err(DriverError::Fault("executable not found".into()))
        }

        async fn perform(&self, _: &StepAction<'_>, _: Option<&ElementHandle>) -> Result<ActionOutcome, DriverError> {
            Err(DriverError::Fault("not running".into()))
        }

        async fn current_url(&self) -> Option<String> {
            None
        }

        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_launch_failure_is_error_without_steps() {
        let driver: Arc<dyn BrowserDriver> = Arc::new(DeadDriver);
        let engine = ExecutionEngine::new(driver, ExecutionLimits::default());
        let test = case(vec![], vec![open()], vec![]);

        let execution = engine.execute("Dead", &test, &ExecutionOptions::default()).await;
        assert_eq!(execution.status, ExecutionStatus::Error);
        assert!(execution.step_results.is_empty());
        assert!(execution
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("executable not found")));
    }
}
