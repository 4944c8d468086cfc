//! Test steps: the flat wire record and its typed, per-action view.
//!
//! `TestStep` is what gets persisted and exchanged. Consumers never branch on
//! its optional fields directly; they call [`TestStep::action`] and match the
//! resulting [`StepAction`], which carries exactly the fields each action
//! needs. A step whose shape does not fit its action is rejected there, once.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use super::locator::ElementLocator;

/// Default pause for a `wait` step with neither element nor duration.
pub const DEFAULT_WAIT_MS: u64 = 1000;

// ============================================================================
// ACTION KIND (closed set)
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Fill,
    Type,
    Select,
    Check,
    Uncheck,
    Hover,
    Wait,
    AssertText,
    AssertVisible,
    AssertHidden,
    AssertValue,
    PressKey,
    Screenshot,
}

/// How an action relates to the `element` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementUse {
    Required,
    Optional,
    Unused,
}

impl ActionKind {
    pub const ALL: [ActionKind; 15] = [
        Self::Navigate,
        Self::Click,
        Self::Fill,
        Self::Type,
        Self::Select,
        Self::Check,
        Self::Uncheck,
        Self::Hover,
        Self::Wait,
        Self::AssertText,
        Self::AssertVisible,
        Self::AssertHidden,
        Self::AssertValue,
        Self::PressKey,
        Self::Screenshot,
    ];

    pub fn element_use(self) -> ElementUse {
        match self {
            Self::Click
            | Self::Fill
            | Self::Type
            | Self::Select
            | Self::Check
            | Self::Uncheck
            | Self::Hover
            | Self::AssertVisible
            | Self::AssertHidden
            | Self::AssertValue => ElementUse::Required,
            Self::Wait | Self::AssertText | Self::PressKey => ElementUse::Optional,
            Self::Navigate | Self::Screenshot => ElementUse::Unused,
        }
    }

    pub fn is_assertion(self) -> bool {
        matches!(
            self,
            Self::AssertText | Self::AssertVisible | Self::AssertHidden | Self::AssertValue
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Navigate => "navigate",
            Self::Click => "click",
            Self::Fill => "fill",
            Self::Type => "type",
            Self::Select => "select",
            Self::Check => "check",
            Self::Uncheck => "uncheck",
            Self::Hover => "hover",
            Self::Wait => "wait",
            Self::AssertText => "assert_text",
            Self::AssertVisible => "assert_visible",
            Self::AssertHidden => "assert_hidden",
            Self::AssertValue => "assert_value",
            Self::PressKey => "press_key",
            Self::Screenshot => "screenshot",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// WIRE STEP
// ============================================================================

/// One action in a test, as persisted.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TestStep {
    /// 1-based position within its phase.
    pub step_number: u32,
    pub action: ActionKind,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element: Option<ElementLocator>,
    /// Text to type/select/assert, URL for navigate, key for press_key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Per-step timeout in milliseconds; overrides the execution default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// A step whose fields do not fit its action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StepShapeError {
    #[error("action '{action}' requires '{field}'")]
    MissingField {
        action: ActionKind,
        field: &'static str,
    },

    #[error("action '{action}': field '{field}' is invalid: {reason}")]
    InvalidField {
        action: ActionKind,
        field: &'static str,
        reason: String,
    },
}

impl StepShapeError {
    pub fn field(&self) -> &'static str {
        match self {
            Self::MissingField { field, .. } | Self::InvalidField { field, .. } => field,
        }
    }
}

impl TestStep {
    pub fn new(step_number: u32, action: ActionKind, description: impl Into<String>) -> Self {
        Self {
            step_number,
            action,
            description: description.into(),
            element: None,
            value: None,
            timeout: None,
            metadata: Map::new(),
        }
    }

    pub fn with_element(mut self, element: ElementLocator) -> Self {
        self.element = Some(element);
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn element_name(&self) -> Option<&str> {
        self.element.as_ref().map(|e| e.name.as_str())
    }

    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }

    fn metadata_bool(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Typed view of this step.
    pub fn action(&self) -> Result<StepAction<'_>, StepShapeError> {
        let kind = self.action;
        let value = self.value.as_deref();
        let element = self.element.as_ref();

        let target = || {
            element.ok_or(StepShapeError::MissingField {
                action: kind,
                field: "element",
            })
        };
        let required_value = || {
            value.ok_or(StepShapeError::MissingField {
                action: kind,
                field: "value",
            })
        };

        let action = match kind {
            ActionKind::Navigate => StepAction::Navigate {
                url: value.or_else(|| self.metadata_str("url")).ok_or(
                    StepShapeError::MissingField {
                        action: kind,
                        field: "value",
                    },
                )?,
            },
            ActionKind::Click => StepAction::Click { target: target()? },
            ActionKind::Fill => StepAction::Fill {
                target: target()?,
                text: value.unwrap_or(""),
            },
            ActionKind::Type => StepAction::Type {
                target: target()?,
                text: value.unwrap_or(""),
            },
            ActionKind::Select => StepAction::Select {
                target: target()?,
                option: required_value()?,
            },
            ActionKind::Check => StepAction::Check { target: target()? },
            ActionKind::Uncheck => StepAction::Uncheck { target: target()? },
            ActionKind::Hover => StepAction::Hover { target: target()? },
            ActionKind::Wait => match element {
                Some(locator) => StepAction::Wait(WaitFor::Element(locator)),
                None => StepAction::Wait(WaitFor::Duration(self.wait_duration_ms()?)),
            },
            ActionKind::AssertText => StepAction::AssertText {
                target: element,
                expected: required_value()?,
                exact: self.metadata_bool("exact"),
            },
            ActionKind::AssertVisible => StepAction::AssertVisible { target: target()? },
            ActionKind::AssertHidden => StepAction::AssertHidden { target: target()? },
            ActionKind::AssertValue => StepAction::AssertValue {
                target: target()?,
                expected: required_value()?,
            },
            ActionKind::PressKey => StepAction::PressKey {
                key: value.or_else(|| self.metadata_str("key")).ok_or(
                    StepShapeError::MissingField {
                        action: kind,
                        field: "value",
                    },
                )?,
                target: element,
            },
            ActionKind::Screenshot => StepAction::Screenshot {
                full_page: self.metadata_bool("full_page"),
                path: self.metadata_str("path"),
            },
        };

        Ok(action)
    }

    /// Pause length for an element-less wait: `value`, then
    /// `metadata.duration_ms`, then `timeout`, then [`DEFAULT_WAIT_MS`].
    fn wait_duration_ms(&self) -> Result<u64, StepShapeError> {
        if let Some(raw) = self.value.as_deref() {
            return raw
                .trim()
                .parse::<u64>()
                .map_err(|e| StepShapeError::InvalidField {
                    action: ActionKind::Wait,
                    field: "value",
                    reason: format!("expected milliseconds, got '{}' ({})", raw, e),
                });
        }
        Ok(self
            .metadata
            .get("duration_ms")
            .and_then(Value::as_u64)
            .or(self.timeout)
            .unwrap_or(DEFAULT_WAIT_MS))
    }
}

// ============================================================================
// TYPED ACTION VIEW
// ============================================================================

/// What an element-less or element-bound wait waits for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WaitFor<'a> {
    Element(&'a ElementLocator),
    Duration(u64),
}

/// A step's action with exactly the inputs that action needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAction<'a> {
    Navigate { url: &'a str },
    Click { target: &'a ElementLocator },
    Fill { target: &'a ElementLocator, text: &'a str },
    Type { target: &'a ElementLocator, text: &'a str },
    Select { target: &'a ElementLocator, option: &'a str },
    Check { target: &'a ElementLocator },
    Uncheck { target: &'a ElementLocator },
    Hover { target: &'a ElementLocator },
    Wait(WaitFor<'a>),
    AssertText {
        target: Option<&'a ElementLocator>,
        expected: &'a str,
        exact: bool,
    },
    AssertVisible { target: &'a ElementLocator },
    AssertHidden { target: &'a ElementLocator },
    AssertValue { target: &'a ElementLocator, expected: &'a str },
    PressKey {
        key: &'a str,
        target: Option<&'a ElementLocator>,
    },
    Screenshot { full_page: bool, path: Option<&'a str> },
}

impl<'a> StepAction<'a> {
    pub fn kind(&self) -> ActionKind {
        match self {
            Self::Navigate { .. } => ActionKind::Navigate,
            Self::Click { .. } => ActionKind::Click,
            Self::Fill { .. } => ActionKind::Fill,
            Self::Type { .. } => ActionKind::Type,
            Self::Select { .. } => ActionKind::Select,
            Self::Check { .. } => ActionKind::Check,
            Self::Uncheck { .. } => ActionKind::Uncheck,
            Self::Hover { .. } => ActionKind::Hover,
            Self::Wait(_) => ActionKind::Wait,
            Self::AssertText { .. } => ActionKind::AssertText,
            Self::AssertVisible { .. } => ActionKind::AssertVisible,
            Self::AssertHidden { .. } => ActionKind::AssertHidden,
            Self::AssertValue { .. } => ActionKind::AssertValue,
            Self::PressKey { .. } => ActionKind::PressKey,
            Self::Screenshot { .. } => ActionKind::Screenshot,
        }
    }

    /// Element this action operates on, if any.
    pub fn target(&self) -> Option<&'a ElementLocator> {
        match *self {
            Self::Click { target }
            | Self::Fill { target, .. }
            | Self::Type { target, .. }
            | Self::Select { target, .. }
            | Self::Check { target }
            | Self::Uncheck { target }
            | Self::Hover { target }
            | Self::AssertVisible { target }
            | Self::AssertHidden { target }
            | Self::AssertValue { target, .. }
            | Self::Wait(WaitFor::Element(target)) => Some(target),
            Self::AssertText { target, .. } | Self::PressKey { target, .. } => target,
            Self::Navigate { .. } | Self::Wait(WaitFor::Duration(_)) | Self::Screenshot { .. } => {
                None
            }
        }
    }
}
