use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::test_case::TestCaseCreate;

/// Free-text description to turn into a test case.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationRequest {
    pub description: String,
    /// Extra hints for the generator (base URL, credentials, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

impl GenerationRequest {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            context: None,
        }
    }
}

/// Outcome of a generation request. A failed generation never carries a
/// test case.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GenerationResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_case: Option<TestCaseCreate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub model_used: String,
    #[serde(default)]
    pub cached: bool,
}

impl GenerationResponse {
    pub fn generated(test_case: TestCaseCreate, tokens_used: u64, model_used: impl Into<String>) -> Self {
        Self {
            success: true,
            test_case: Some(test_case),
            error: None,
            tokens_used,
            model_used: model_used.into(),
            cached: false,
        }
    }

    pub fn failure(error: impl Into<String>, tokens_used: u64, model_used: impl Into<String>) -> Self {
        Self {
            success: false,
            test_case: None,
            error: Some(error.into()),
            tokens_used,
            model_used: model_used.into(),
            cached: false,
        }
    }
}
