use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::step::TestStep;
use super::{ExecutionStatus, Phase};

/// A test case without identity or audit fields, as produced by manual
/// authoring or by the generation service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestCaseCreate {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub steps: Vec<TestStep>,
    #[serde(default)]
    pub setup_steps: Vec<TestStep>,
    #[serde(default)]
    pub teardown_steps: Vec<TestStep>,
}

/// Partial edit of a persisted test case. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct TestCaseUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<TestStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setup_steps: Option<Vec<TestStep>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teardown_steps: Option<Vec<TestStep>>,
}

/// A persisted test case.
///
/// `id` is assigned once at creation and never changes.
/// `updated_at >= created_at` always holds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestCase {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub steps: Vec<TestStep>,
    pub setup_steps: Vec<TestStep>,
    pub teardown_steps: Vec<TestStep>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_status: Option<ExecutionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
}

/// Shared accessors over the three step sequences.
pub trait PhasedSteps {
    fn phase_steps(&self, phase: Phase) -> &[TestStep];

    /// All steps in execution order: setup, body, teardown.
    fn steps_in_order(&self) -> Box<dyn Iterator<Item = (Phase, &TestStep)> + '_> {
        Box::new(
            Phase::ORDER
                .into_iter()
                .flat_map(move |phase| self.phase_steps(phase).iter().map(move |s| (phase, s))),
        )
    }

    fn total_steps(&self) -> usize {
        Phase::ORDER
            .into_iter()
            .map(|phase| self.phase_steps(phase).len())
            .sum()
    }
}

impl PhasedSteps for TestCaseCreate {
    fn phase_steps(&self, phase: Phase) -> &[TestStep] {
        match phase {
            Phase::Setup => &self.setup_steps,
            Phase::Body => &self.steps,
            Phase::Teardown => &self.teardown_steps,
        }
    }
}

impl PhasedSteps for TestCase {
    fn phase_steps(&self, phase: Phase) -> &[TestStep] {
        match phase {
            Phase::Setup => &self.setup_steps,
            Phase::Body => &self.steps,
            Phase::Teardown => &self.teardown_steps,
        }
    }
}

impl TestCase {
    /// Strips identity and audit fields.
    pub fn to_create(&self) -> TestCaseCreate {
        TestCaseCreate {
            name: self.name.clone(),
            description: self.description.clone(),
            tags: self.tags.clone(),
            steps: self.steps.clone(),
            setup_steps: self.setup_steps.clone(),
            teardown_steps: self.teardown_steps.clone(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
