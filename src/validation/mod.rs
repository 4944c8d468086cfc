//! # Test Case Validation & Assembly
//!
//! Turns a [`TestCaseCreate`] (hand-written or generated) into a persistable
//! [`TestCase`], or rejects it with every problem found. Nothing is ever
//! partially saved.
//!
//! ## Rules
//!
//! 1. **Name**: non-empty after trim, at most [`MAX_NAME_LEN`] chars
//! 2. **Body**: at least one step in `steps`
//! 3. **Step shape**: every step must fit its action (see `TestStep::action`)
//! 4. **Phase size**: at most `ExecutionLimits::max_steps_per_phase`
//!
//! ## Normalization
//!
//! Step numbers are per phase. Each phase is stably sorted by the submitted
//! `step_number` and renumbered `1..=n`, so client-side reordering never
//! leaves gaps. Tags are trimmed and deduplicated, first occurrence wins.
//!
//! ```ignore
//! match assemble(create, Utc::now()) {
//!     Ok(test_case) => store.insert(test_case),
//!     Err(errors) => errors.iter().for_each(|e| eprintln!("{}", e)),
//! }
//! ```

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ErrorCode;
use crate::limits::{validate_test_limits, ExecutionLimits, LimitKind};
use crate::protocol::step::StepShapeError;
use crate::protocol::test_case::PhasedSteps;
use crate::protocol::{ActionKind, Phase, TestCase, TestCaseCreate, TestCaseUpdate, TestStep};

/// Longest accepted test case name, in characters.
pub const MAX_NAME_LEN: usize = 200;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("test case name must not be empty")]
    EmptyName,

    #[error("test case name is {len} characters, maximum is {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("test case must have at least one body step")]
    EmptyBody,

    #[error("{phase} step {step_number}: action '{action}' requires '{field}'")]
    MissingField {
        phase: Phase,
        step_number: u32,
        action: ActionKind,
        field: &'static str,
    },

    #[error("{phase} step {step_number}: field '{field}' is invalid: {reason}")]
    InvalidField {
        phase: Phase,
        step_number: u32,
        field: &'static str,
        reason: String,
    },

    #[error("{phase} phase has {count} steps, maximum is {max}")]
    TooManySteps { phase: Phase, count: usize, max: usize },
}

impl ValidationError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptyName | Self::NameTooLong { .. } => ErrorCode::INVALID_NAME,
            Self::EmptyBody => ErrorCode::EMPTY_BODY,
            Self::MissingField { .. } => ErrorCode::MISSING_STEP_FIELD,
            Self::InvalidField { .. } => ErrorCode::INVALID_STEP_FIELD,
            Self::TooManySteps { .. } => ErrorCode::TOO_MANY_STEPS,
        }
    }

    /// Places a step shape error at its phase and step number.
    pub fn from_shape(phase: Phase, step_number: u32, err: StepShapeError) -> Self {
        match err {
            StepShapeError::MissingField { action, field } => Self::MissingField {
                phase,
                step_number,
                action,
                field,
            },
            StepShapeError::InvalidField { field, reason, .. } => Self::InvalidField {
                phase,
                step_number,
                field,
                reason,
            },
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Stable sort by submitted number, then renumber `1..=n`.
pub fn renumber(steps: &mut [TestStep]) {
    steps.sort_by_key(|s| s.step_number);
    for (i, step) in steps.iter_mut().enumerate() {
        step.step_number = i as u32 + 1;
    }
}

/// Trims tags, drops blanks and duplicates; first occurrence wins.
pub fn dedupe_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Normalized copy: trimmed name, renumbered phases, deduplicated tags.
pub fn normalize(mut create: TestCaseCreate) -> TestCaseCreate {
    create.name = create.name.trim().to_string();
    create.tags = dedupe_tags(create.tags);
    renumber(&mut create.setup_steps);
    renumber(&mut create.steps);
    renumber(&mut create.teardown_steps);
    create
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Collects every rule violation; `Ok(())` when none.
///
/// Step numbers in the reported errors are the ones the steps carry, so
/// callers should validate a normalized test case.
pub fn validate_test_case<T: PhasedSteps + ?Sized>(
    name: &str,
    test: &T,
    limits: &ExecutionLimits,
) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let name_len = name.trim().chars().count();
    if name_len == 0 {
        errors.push(ValidationError::EmptyName);
    } else if name_len > MAX_NAME_LEN {
        errors.push(ValidationError::NameTooLong {
            len: name_len,
            max: MAX_NAME_LEN,
        });
    }

    if test.phase_steps(Phase::Body).is_empty() {
        errors.push(ValidationError::EmptyBody);
    }

    for (phase, step) in test.steps_in_order() {
        if let Err(err) = step.action() {
            errors.push(ValidationError::from_shape(phase, step.step_number, err));
        }
    }

    for violation in validate_test_limits(test, limits).violations {
        if let LimitKind::StepsPerPhase { phase, count, max } = violation.kind {
            errors.push(ValidationError::TooManySteps { phase, count, max });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// ============================================================================
// ASSEMBLY
// ============================================================================

/// Validates and assembles with default limits.
pub fn assemble(create: TestCaseCreate, now: DateTime<Utc>) -> Result<TestCase, Vec<ValidationError>> {
    assemble_with_limits(create, now, &ExecutionLimits::default())
}

/// Normalizes, validates, then assigns `id` and equal audit timestamps.
pub fn assemble_with_limits(
    create: TestCaseCreate,
    now: DateTime<Utc>,
    limits: &ExecutionLimits,
) -> Result<TestCase, Vec<ValidationError>> {
    let create = normalize(create);
    validate_test_case(&create.name, &create, limits)?;

    Ok(TestCase {
        id: Uuid::new_v4().to_string(),
        name: create.name,
        description: create.description,
        tags: create.tags,
        steps: create.steps,
        setup_steps: create.setup_steps,
        teardown_steps: create.teardown_steps,
        created_at: now,
        updated_at: now,
        last_run_status: None,
        last_run_at: None,
    })
}

/// Applies a partial edit and re-validates the result.
///
/// Identity, `created_at` and last-run fields are kept. `updated_at` moves
/// forward to `now` but never before the previous value.
pub fn apply_update(
    current: &TestCase,
    update: TestCaseUpdate,
    now: DateTime<Utc>,
    limits: &ExecutionLimits,
) -> Result<TestCase, Vec<ValidationError>> {
    let mut draft = current.to_create();
    if let Some(name) = update.name {
        draft.name = name;
    }
    if let Some(description) = update.description {
        draft.description = description;
    }
    if let Some(tags) = update.tags {
        draft.tags = tags;
    }
    if let Some(steps) = update.steps {
        draft.steps = steps;
    }
    if let Some(setup) = update.setup_steps {
        draft.setup_steps = setup;
    }
    if let Some(teardown) = update.teardown_steps {
        draft.teardown_steps = teardown;
    }

    let draft = normalize(draft);
    validate_test_case(&draft.name, &draft, limits)?;

    Ok(TestCase {
        id: current.id.clone(),
        name: draft.name,
        description: draft.description,
        tags: draft.tags,
        steps: draft.steps,
        setup_steps: draft.setup_steps,
        teardown_steps: draft.teardown_steps,
        created_at: current.created_at,
        updated_at: now.max(current.updated_at),
        last_run_status: current.last_run_status,
        last_run_at: current.last_run_at,
    })
}
