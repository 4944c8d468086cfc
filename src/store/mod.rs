//! # Store
//!
//! In-memory persistence for test cases and execution history.
//!
//! Both stores are cheap to clone and share one map behind a
//! `tokio::sync::RwLock`. Reads run concurrently; each write holds the lock
//! for the whole read-modify-write, so two updates of the same test case
//! never interleave.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::aggregate;
use crate::errors::ErrorCode;
use crate::limits::ExecutionLimits;
use crate::protocol::{TestCase, TestCaseCreate, TestCaseUpdate, TestExecution};
use crate::validation::{self, ValidationError};

/// Page size when the caller does not ask for one.
pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 100;
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Test case {0} not found")]
    TestNotFound(String),

    #[error("Execution {0} not found")]
    ExecutionNotFound(String),

    #[error("invalid test case: {}", join(.0))]
    Invalid(Vec<ValidationError>),

    #[error("limit must be between 1 and {max}, got {got}")]
    InvalidLimit { got: usize, max: usize },
}

fn join(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::TestNotFound(_) | Self::ExecutionNotFound(_) => ErrorCode::TEST_NOT_FOUND,
            Self::Invalid(errors) => errors
                .first()
                .map(ValidationError::code)
                .unwrap_or(ErrorCode::INVALID_TEST_FORMAT),
            Self::InvalidLimit { .. } => ErrorCode::INVALID_REQUEST,
        }
    }
}

impl From<Vec<ValidationError>> for StoreError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Invalid(errors)
    }
}

/// Listing filter for [`TestCaseStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub skip: usize,
    pub limit: usize,
    pub tag: Option<String>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_SIZE,
            tag: None,
        }
    }
}

// ============================================================================
// TEST CASES
// ============================================================================

#[derive(Clone, Default)]
pub struct TestCaseStore {
    limits: ExecutionLimits,
    tests: Arc<RwLock<HashMap<String, TestCase>>>,
}

impl TestCaseStore {
    pub fn new(limits: ExecutionLimits) -> Self {
        Self {
            limits,
            tests: Arc::default(),
        }
    }

    /// Validates, assigns an id and stores.
    pub async fn create(&self, create: TestCaseCreate) -> Result<TestCase, StoreError> {
        self.create_at(create, Utc::now()).await
    }

    pub async fn create_at(&self, create: TestCaseCreate, now: DateTime<Utc>) -> Result<TestCase, StoreError> {
        let test = validation::assemble_with_limits(create, now, &self.limits)?;
        self.tests.write().await.insert(test.id.clone(), test.clone());
        info!(test_id = %test.id, name = %test.name, "📝 Test case created");
        Ok(test)
    }

    pub async fn get(&self, id: &str) -> Result<TestCase, StoreError> {
        self.tests
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::TestNotFound(id.to_string()))
    }

    /// Most recently updated first, then paged. An exact tag match filters
    /// before paging.
    pub async fn list(&self, query: &ListQuery) -> Result<Vec<TestCase>, StoreError> {
        if query.limit == 0 || query.limit > MAX_PAGE_SIZE {
            return Err(StoreError::InvalidLimit {
                got: query.limit,
                max: MAX_PAGE_SIZE,
            });
        }

        let tests = self.tests.read().await;
        let mut matching: Vec<&TestCase> = tests
            .values()
            .filter(|t| query.tag.as_deref().map_or(true, |tag| t.has_tag(tag)))
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

        Ok(matching
            .into_iter()
            .skip(query.skip)
            .take(query.limit)
            .cloned()
            .collect())
    }

    pub async fn update(&self, id: &str, update: TestCaseUpdate) -> Result<TestCase, StoreError> {
        self.update_at(id, update, Utc::now()).await
    }

    pub async fn update_at(&self, id: &str, update: TestCaseUpdate, now: DateTime<Utc>) -> Result<TestCase, StoreError> {
        let mut tests = self.tests.write().await;
        let current = tests.get(id).ok_or_else(|| StoreError::TestNotFound(id.to_string()))?;
        let updated = validation::apply_update(current, update, now, &self.limits)?;
        tests.insert(id.to_string(), updated.clone());
        debug!(test_id = %id, "Test case updated");
        Ok(updated)
    }

    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        match self.tests.write().await.remove(id) {
            Some(_) => {
                info!(test_id = %id, "🗑️ Test case deleted");
                Ok(())
            }
            None => Err(StoreError::TestNotFound(id.to_string())),
        }
    }

    /// Copies a test case under a new id as "<name> (Copy)", without its
    /// last-run fields. Long names are shortened to keep the copy within
    /// `MAX_NAME_LEN`.
    pub async fn duplicate(&self, id: &str) -> Result<TestCase, StoreError> {
        self.duplicate_at(id, Utc::now()).await
    }

    pub async fn duplicate_at(&self, id: &str, now: DateTime<Utc>) -> Result<TestCase, StoreError> {
        let mut tests = self.tests.write().await;
        let original = tests.get(id).ok_or_else(|| StoreError::TestNotFound(id.to_string()))?;

        let copy = TestCase {
            id: Uuid::new_v4().to_string(),
            name: copy_name(&original.name),
            created_at: now,
            updated_at: now,
            last_run_status: None,
            last_run_at: None,
            ..original.clone()
        };
        tests.insert(copy.id.clone(), copy.clone());
        info!(source_id = %id, test_id = %copy.id, "Test case duplicated");
        Ok(copy)
    }

    /// Records a completed run on the test case. Returns whether the
    /// last-run fields changed; older runs never overwrite newer ones.
    pub async fn apply_execution(&self, id: &str, execution: &TestExecution) -> Result<bool, StoreError> {
        let mut tests = self.tests.write().await;
        let test = tests.get_mut(id).ok_or_else(|| StoreError::TestNotFound(id.to_string()))?;
        Ok(aggregate::apply_execution(test, execution))
    }

    pub async fn len(&self) -> usize {
        self.tests.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tests.read().await.is_empty()
    }
}

// ============================================================================
// EXECUTION HISTORY
// ============================================================================

#[derive(Clone, Default)]
pub struct ExecutionHistory {
    executions: Arc<RwLock<HashMap<String, TestExecution>>>,
}

impl ExecutionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an execution, replacing any earlier record with the same id.
    pub async fn insert(&self, execution: TestExecution) {
        debug!(execution_id = %execution.execution_id, status = %execution.status, "Execution recorded");
        self.executions
            .write()
            .await
            .insert(execution.execution_id.clone(), execution);
    }

    pub async fn get(&self, execution_id: &str) -> Result<TestExecution, StoreError> {
        self.executions
            .read()
            .await
            .get(execution_id)
            .cloned()
            .ok_or_else(|| StoreError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Most recently started first.
    pub async fn list(&self, limit: usize) -> Vec<TestExecution> {
        let executions = self.executions.read().await;
        let mut all: Vec<&TestExecution> = executions.values().collect();
        all.sort_by(|a, b| {
            b.started_at
                .cmp(&a.started_at)
                .then_with(|| a.execution_id.cmp(&b.execution_id))
        });
        all.into_iter().take(limit).cloned().collect()
    }
}

const COPY_SUFFIX: &str = " (Copy)";

fn copy_name(name: &str) -> String {
    let keep = validation::MAX_NAME_LEN - COPY_SUFFIX.chars().count();
    let base: String = name.chars().take(keep).collect();
    format!("{}{}", base.trim_end(), COPY_SUFFIX)
}
