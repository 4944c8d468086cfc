//! # Execution Result Aggregation
//!
//! Folds an ordered stream of [`StepResult`]s into one [`TestExecution`].
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──begin──> running ──record*──> finish ──> passed | failed | skipped | error
//!                        └──abort (harness fault / cancel)──┘
//! ```
//!
//! ## Terminal status
//!
//! Derived from the multiset of step statuses plus the harness-fault flag,
//! independent of order:
//!
//! | Condition                                  | Status    |
//! |--------------------------------------------|-----------|
//! | harness fault, or any step `error`         | `error`   |
//! | any step `failed`                          | `failed`  |
//! | at least one step `passed`                 | `passed`  |
//! | otherwise (all skipped, or no steps)       | `skipped` |
//!
//! A teardown failure can only escalate `passed` to `failed`; it never
//! clears a failure and never demotes `error`.
//!
//! The fold is deterministic: [`recompute`] rebuilds counts and status from
//! a persisted `step_results` sequence and the top-level `error_message`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol::{ExecutionStatus, Phase, StepResult, TestCase, TestExecution};

// ============================================================================
// STATUS DERIVATION
// ============================================================================

/// Terminal status for a set of step statuses.
///
/// `pending`/`running` entries count as "did not run", like `skipped`.
pub fn derive_status<I>(statuses: I, harness_fault: bool) -> ExecutionStatus
where
    I: IntoIterator<Item = ExecutionStatus>,
{
    if harness_fault {
        return ExecutionStatus::Error;
    }

    let mut any_failed = false;
    let mut any_passed = false;

    for status in statuses {
        match status {
            ExecutionStatus::Error => return ExecutionStatus::Error,
            ExecutionStatus::Failed => any_failed = true,
            ExecutionStatus::Passed => any_passed = true,
            ExecutionStatus::Skipped | ExecutionStatus::Pending | ExecutionStatus::Running => {}
        }
    }

    if any_failed {
        ExecutionStatus::Failed
    } else if any_passed {
        ExecutionStatus::Passed
    } else {
        ExecutionStatus::Skipped
    }
}

// ============================================================================
// LIVE FOLD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FoldError {
    #[error("execution is {0}, expected pending")]
    AlreadyStarted(ExecutionStatus),

    #[error("execution is {0}, expected running")]
    NotRunning(ExecutionStatus),

    #[error("{phase} step {step_number} reported non-terminal status '{status}'")]
    NonTerminalStep {
        phase: Phase,
        step_number: u32,
        status: ExecutionStatus,
    },

    #[error("{phase} step {step_number} arrived after {last_phase} step {last_step}")]
    OutOfOrder {
        phase: Phase,
        step_number: u32,
        last_phase: Phase,
        last_step: u32,
    },
}

/// Live accumulator for one execution.
///
/// While running, `step_results` is always a prefix of the final sequence.
#[derive(Debug, Clone)]
pub struct ExecutionFold {
    execution: TestExecution,
}

impl ExecutionFold {
    pub fn new(test_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), test_name, now)
    }

    pub fn with_id(execution_id: impl Into<String>, test_name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            execution: TestExecution {
                execution_id: execution_id.into(),
                test_name: test_name.into(),
                status: ExecutionStatus::Pending,
                started_at: now,
                completed_at: None,
                duration_ms: 0,
                passed_steps: 0,
                failed_steps: 0,
                skipped_steps: 0,
                error_steps: 0,
                total_steps: 0,
                step_results: Vec::new(),
                error_message: None,
                page_url: None,
            },
        }
    }

    pub fn execution_id(&self) -> &str {
        &self.execution.execution_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.execution.status
    }

    pub fn results(&self) -> &[StepResult] {
        &self.execution.step_results
    }

    /// Whether any recorded step has failed or errored so far.
    pub fn has_failure(&self) -> bool {
        self.execution.failed_steps > 0 || self.execution.error_steps > 0
    }

    /// Marks the first step as dispatched; `started_at` becomes `now`.
    pub fn begin(&mut self, now: DateTime<Utc>) -> Result<(), FoldError> {
        if self.execution.status != ExecutionStatus::Pending {
            return Err(FoldError::AlreadyStarted(self.execution.status));
        }
        self.execution.status = ExecutionStatus::Running;
        self.execution.started_at = now;
        Ok(())
    }

    /// Appends one concluded step.
    pub fn record(&mut self, result: StepResult) -> Result<(), FoldError> {
        if self.execution.status != ExecutionStatus::Running {
            return Err(FoldError::NotRunning(self.execution.status));
        }
        if !result.status.is_terminal() {
            return Err(FoldError::NonTerminalStep {
                phase: result.phase,
                step_number: result.step_number,
                status: result.status,
            });
        }
        if let Some(last) = self.execution.step_results.last() {
            if (result.phase, result.step_number) <= (last.phase, last.step_number) {
                return Err(FoldError::OutOfOrder {
                    phase: result.phase,
                    step_number: result.step_number,
                    last_phase: last.phase,
                    last_step: last.step_number,
                });
            }
        }

        count(&mut self.execution, result.status);
        self.execution.step_results.push(result);
        Ok(())
    }

    /// Flags a harness fault or cancellation. The first message wins.
    pub fn abort(&mut self, message: impl Into<String>) {
        if self.execution.error_message.is_none() {
            self.execution.error_message = Some(message.into());
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.execution.error_message.is_some()
    }

    /// Current view while running; `duration_ms` runs up to `now`.
    pub fn snapshot(&self, now: DateTime<Utc>) -> TestExecution {
        let mut view = self.execution.clone();
        view.duration_ms = view.elapsed_ms(now);
        view
    }

    /// Concludes the run and derives the terminal status.
    pub fn finish(mut self, now: DateTime<Utc>, page_url: Option<String>) -> TestExecution {
        let execution = &mut self.execution;
        let completed_at = now.max(execution.started_at);

        execution.status = derive_status(
            execution.step_results.iter().map(|r| r.status),
            execution.error_message.is_some(),
        );
        execution.completed_at = Some(completed_at);
        execution.duration_ms = execution.elapsed_ms(completed_at);
        if page_url.is_some() {
            execution.page_url = page_url;
        }
        self.execution
    }
}

fn count(execution: &mut TestExecution, status: ExecutionStatus) {
    match status {
        ExecutionStatus::Passed => execution.passed_steps += 1,
        ExecutionStatus::Failed => execution.failed_steps += 1,
        ExecutionStatus::Error => execution.error_steps += 1,
        ExecutionStatus::Skipped | ExecutionStatus::Pending | ExecutionStatus::Running => {
            execution.skipped_steps += 1
        }
    }
    execution.total_steps += 1;
}

// ============================================================================
// RECOMPUTATION
// ============================================================================

/// Rebuilds counts and status from `step_results` and the harness flag.
///
/// A completed execution round-trips unchanged; an incomplete one keeps its
/// non-terminal status and only has its counts refreshed.
pub fn recompute(execution: &TestExecution) -> TestExecution {
    let mut rebuilt = execution.clone();
    rebuilt.passed_steps = 0;
    rebuilt.failed_steps = 0;
    rebuilt.skipped_steps = 0;
    rebuilt.error_steps = 0;
    rebuilt.total_steps = 0;

    for result in &execution.step_results {
        count(&mut rebuilt, result.status);
    }

    if rebuilt.is_complete() {
        rebuilt.status = derive_status(
            execution.step_results.iter().map(|r| r.status),
            execution.harness_fault(),
        );
    }
    rebuilt
}

/// Fields where a persisted execution disagrees with its recomputation.
pub fn drift(execution: &TestExecution) -> Vec<String> {
    let rebuilt = recompute(execution);
    let mut fields = Vec::new();

    let pairs = [
        ("status", execution.status.to_string(), rebuilt.status.to_string()),
        ("passed_steps", execution.passed_steps.to_string(), rebuilt.passed_steps.to_string()),
        ("failed_steps", execution.failed_steps.to_string(), rebuilt.failed_steps.to_string()),
        ("skipped_steps", execution.skipped_steps.to_string(), rebuilt.skipped_steps.to_string()),
        ("error_steps", execution.error_steps.to_string(), rebuilt.error_steps.to_string()),
        ("total_steps", execution.total_steps.to_string(), rebuilt.total_steps.to_string()),
    ];
    for (name, stored, computed) in pairs {
        if stored != computed {
            fields.push(format!("{}: stored {}, computed {}", name, stored, computed));
        }
    }
    fields
}

// ============================================================================
// LAST-RUN DENORMALIZATION
// ============================================================================

/// Copies a completed execution's outcome onto its test case.
///
/// Returns `false` (and changes nothing) when the execution is still
/// running or older than the last run already recorded. `updated_at` is an
/// edit timestamp and is not touched.
pub fn apply_execution(test_case: &mut TestCase, execution: &TestExecution) -> bool {
    let Some(completed_at) = execution.completed_at else {
        return false;
    };
    if test_case.last_run_at.is_some_and(|last| completed_at < last) {
        return false;
    }
    test_case.last_run_status = Some(execution.status);
    test_case.last_run_at = Some(completed_at);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ActionKind, TestStep};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::milliseconds(ms)
    }

    fn result(phase: Phase, n: u32, status: ExecutionStatus) -> StepResult {
        let step = TestStep::new(n, ActionKind::Click, format!("step {}", n));
        match status {
            ExecutionStatus::Passed => StepResult::passed(&step, phase, 10),
            ExecutionStatus::Failed => StepResult::failed(&step, phase, 10, "assertion failed"),
            ExecutionStatus::Error => StepResult::errored(&step, phase, 10, "browser crashed"),
            _ => StepResult::skipped(&step, phase),
        }
    }

    fn run(results: Vec<StepResult>) -> TestExecution {
        let mut fold = ExecutionFold::new("Login Test", at(0));
        fold.begin(at(0)).unwrap();
        for r in results {
            fold.record(r).unwrap();
        }
        fold.finish(at(1_500), Some("https://example.com/home".into()))
    }

    #[test]
    fn test_three_passed_body_steps() {
        let execution = run(vec![
            result(Phase::Body, 1, ExecutionStatus::Passed),
            result(Phase::Body, 2, ExecutionStatus::Passed),
            result(Phase::Body, 3, ExecutionStatus::Passed),
        ]);

        assert_eq!(execution.status, ExecutionStatus::Passed);
        assert_eq!(execution.passed_steps, 3);
        assert_eq!(execution.failed_steps, 0);
        assert!(execution.counts_consistent());
        assert_eq!(execution.page_url.as_deref(), Some("https://example.com/home"));
    }

    #[test]
    fn test_failure_is_never_cleared_by_later_passes() {
        let execution = run(vec![
            result(Phase::Body, 1, ExecutionStatus::Passed),
            result(Phase::Body, 2, ExecutionStatus::Failed),
            result(Phase::Body, 3, ExecutionStatus::Passed),
            result(Phase::Teardown, 1, ExecutionStatus::Passed),
        ]);
        assert_eq!(execution.status, ExecutionStatus::Failed);
        assert_eq!(execution.total_steps, 4);
    }

    #[test]
    fn test_teardown_failure_escalates_passed() {
        let execution = run(vec![
            result(Phase::Body, 1, ExecutionStatus::Passed),
            result(Phase::Teardown, 1, ExecutionStatus::Failed),
        ]);
        assert_eq!(execution.status, ExecutionStatus::Failed);
    }

    #[test]
    fn test_duration_is_wall_clock() {
        let execution = run(vec![result(Phase::Body, 1, ExecutionStatus::Passed)]);
        assert_eq!(execution.duration_ms, 1_500);
        assert_eq!(execution.completed_at, Some(at(1_500)));
    }

    #[test]
    fn test_snapshot_duration_runs_to_now() {
        let mut fold = ExecutionFold::new("t", at(0));
        fold.begin(at(100)).unwrap();
        let view = fold.snapshot(at(400));
        assert_eq!(view.status, ExecutionStatus::Running);
        assert_eq!(view.duration_ms, 300);
        assert!(view.completed_at.is_none());
    }

    #[test]
    fn test_harness_fault_overrides_passes() {
        let mut fold = ExecutionFold::new("t", at(0));
        fold.begin(at(0)).unwrap();
        fold.record(result(Phase::Body, 1, ExecutionStatus::Passed)).unwrap();
        fold.abort("browser disconnected");
        fold.abort("second message ignored");
        let execution = fold.finish(at(10), None);

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.error_message.as_deref(), Some("browser disconnected"));
    }

    #[test]
    fn test_empty_run_is_skipped() {
        assert_eq!(run(vec![]).status, ExecutionStatus::Skipped);
    }

    #[test]
    fn test_record_rejects_bad_input() {
        let mut fold = ExecutionFold::new("t", at(0));
        assert_eq!(
            fold.record(result(Phase::Body, 1, ExecutionStatus::Passed)),
            Err(FoldError::NotRunning(ExecutionStatus::Pending))
        );

        fold.begin(at(0)).unwrap();
        assert!(matches!(fold.begin(at(0)), Err(FoldError::AlreadyStarted(_))));

        let mut running = result(Phase::Body, 1, ExecutionStatus::Passed);
        running.status = ExecutionStatus::Running;
        assert!(matches!(fold.record(running), Err(FoldError::NonTerminalStep { .. })));

        fold.record(result(Phase::Body, 2, ExecutionStatus::Passed)).unwrap();
        assert!(matches!(
            fold.record(result(Phase::Setup, 1, ExecutionStatus::Passed)),
            Err(FoldError::OutOfOrder { .. })
        ));
        assert!(matches!(
            fold.record(result(Phase::Body, 2, ExecutionStatus::Passed)),
            Err(FoldError::OutOfOrder { .. })
        ));
        assert_eq!(fold.results().len(), 1);
    }

    #[test]
    fn test_recompute_round_trips_persisted_execution() {
        let original = run(vec![
            result(Phase::Setup, 1, ExecutionStatus::Passed),
            result(Phase::Body, 1, ExecutionStatus::Failed),
            result(Phase::Body, 2, ExecutionStatus::Skipped),
            result(Phase::Teardown, 1, ExecutionStatus::Passed),
        ]);

        let json = serde_json::to_string(&original).unwrap();
        let persisted: TestExecution = serde_json::from_str(&json).unwrap();
        assert_eq!(recompute(&persisted), original);
        assert!(drift(&persisted).is_empty());
    }

    #[test]
    fn test_drift_reports_tampered_counts() {
        let mut execution = run(vec![result(Phase::Body, 1, ExecutionStatus::Failed)]);
        execution.status = ExecutionStatus::Passed;
        execution.failed_steps = 0;

        let fields = drift(&execution);
        assert_eq!(fields.len(), 2);
        assert!(fields[0].starts_with("status: stored passed, computed failed"));
    }

    #[test]
    fn test_apply_execution_never_regresses() {
        let mut case = crate::validation::assemble(
            crate::protocol::TestCaseCreate {
                name: "t".into(),
                description: String::new(),
                tags: vec![],
                steps: vec![TestStep::new(1, ActionKind::Screenshot, "snap")],
                setup_steps: vec![],
                teardown_steps: vec![],
            },
            at(0),
        )
        .unwrap();
        let updated_at = case.updated_at;

        let newer = run(vec![result(Phase::Body, 1, ExecutionStatus::Passed)]);
        let mut older = run(vec![result(Phase::Body, 1, ExecutionStatus::Failed)]);
        older.completed_at = Some(at(500));

        assert!(apply_execution(&mut case, &newer));
        assert!(!apply_execution(&mut case, &older));
        assert_eq!(case.last_run_status, Some(ExecutionStatus::Passed));
        assert_eq!(case.last_run_at, Some(at(1_500)));
        assert_eq!(case.updated_at, updated_at);

        let mut running = newer.clone();
        running.completed_at = None;
        assert!(!apply_execution(&mut case, &running));
    }

    /// Reference formulation of the precedence table.
    fn expected(statuses: &[ExecutionStatus], fault: bool) -> ExecutionStatus {
        let has = |s| statuses.contains(&s);
        if fault || has(ExecutionStatus::Error) {
            ExecutionStatus::Error
        } else if has(ExecutionStatus::Failed) {
            ExecutionStatus::Failed
        } else if has(ExecutionStatus::Passed) {
            ExecutionStatus::Passed
        } else {
            ExecutionStatus::Skipped
        }
    }

    #[test]
    fn test_precedence_over_every_small_multiset() {
        // Up to two of each terminal status: 3^4 multisets, with and without fault.
        for mask in 0..81u32 {
            let mut statuses = Vec::new();
            let mut rest = mask;
            for status in ExecutionStatus::TERMINAL {
                for _ in 0..rest % 3 {
                    statuses.push(status);
                }
                rest /= 3;
            }
            for fault in [false, true] {
                let mut reversed = statuses.clone();
                reversed.reverse();
                let derived = derive_status(statuses.iter().copied(), fault);
                assert_eq!(derived, expected(&statuses, fault), "{:?} fault={}", statuses, fault);
                assert_eq!(derive_status(reversed, fault), derived);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        /// Status is a function of the multiset: any permutation agrees.
        #[test]
        fn derivation_is_order_independent(
            statuses in prop::collection::vec(prop::sample::select(ExecutionStatus::ALL.to_vec()), 0..16),
            fault in any::<bool>(),
            seed in any::<u64>(),
        ) {
            let mut shuffled = statuses.clone();
            let len = shuffled.len().max(1);
            shuffled.rotate_left((seed as usize) % len);
            shuffled.sort_by_key(|s| s.as_str());

            let derived = derive_status(statuses.iter().copied(), fault);
            prop_assert_eq!(derived, derive_status(shuffled, fault));
            prop_assert_eq!(derived, expected(&statuses, fault));
            prop_assert!(derived.is_terminal());
        }

        /// Live fold and recomputation agree on any terminal sequence.
        #[test]
        fn fold_matches_recompute(
            statuses in prop::collection::vec(prop::sample::select(ExecutionStatus::TERMINAL.to_vec()), 0..12),
            fault in any::<bool>(),
        ) {
            let mut fold = ExecutionFold::new("prop", at(0));
            fold.begin(at(0)).unwrap();
            for (i, status) in statuses.iter().enumerate() {
                fold.record(result(Phase::Body, i as u32 + 1, *status)).unwrap();
            }
            if fault {
                fold.abort("fault");
            }
            let execution = fold.finish(at(50), None);

            prop_assert!(execution.counts_consistent());
            prop_assert_eq!(recompute(&execution), execution.clone());
            prop_assert_eq!(execution.status, expected(&statuses, fault));
        }
    }
}
