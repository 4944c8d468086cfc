//! # Simulated Driver
//!
//! A [`BrowserDriver`] over a fixed set of [`PageSnapshot`]s keyed by URL.
//! Navigation swaps in a copy of the target snapshot; form actions mutate
//! that copy, so later assertions see earlier input. Clicking an element
//! with an `href` navigates, and `reveals` makes hidden elements visible.
//!
//! Used by the `run` command for offline dry runs and by the engine tests.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

use super::{ActionOutcome, BrowserDriver, DriverError};
use crate::locator::{ElementHandle, LocatorStrategy, PageElement, PageQuery, PageSnapshot, QueryError};
use crate::protocol::{ActionKind, ExecutionOptions, StepAction};

#[derive(Debug, Default)]
struct SimState {
    launched: bool,
    current: Option<PageSnapshot>,
    screenshots: u32,
    performed: u32,
}

pub struct SimulatedDriver {
    pages: HashMap<String, PageSnapshot>,
    state: Mutex<SimState>,
    /// Action kind that crashes the driver, for exercising harness faults.
    fault_on: Option<ActionKind>,
}

impl SimulatedDriver {
    pub fn new(pages: impl IntoIterator<Item = PageSnapshot>) -> Self {
        Self {
            pages: pages.into_iter().map(|p| (p.url.clone(), p)).collect(),
            state: Mutex::new(SimState::default()),
            fault_on: None,
        }
    }

    /// Crashes the first time an action of `kind` is performed.
    pub fn with_fault_on(mut self, kind: ActionKind) -> Self {
        self.fault_on = Some(kind);
        self
    }

    pub async fn screenshots_taken(&self) -> u32 {
        self.state.lock().await.screenshots
    }

    pub async fn actions_performed(&self) -> u32 {
        self.state.lock().await.performed
    }
}

fn element<'a>(
    page: &'a mut PageSnapshot,
    handle: Option<&ElementHandle>,
) -> Result<&'a mut PageElement, DriverError> {
    let handle = handle.ok_or_else(|| DriverError::Fault("action dispatched without a resolved element".into()))?;
    page.element_mut(handle)
        .ok_or_else(|| DriverError::action(format!("element '{}' is detached", handle)))
}

#[async_trait]
impl PageQuery for SimulatedDriver {
    async fn query(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, QueryError> {
        let state = self.state.lock().await;
        let Some(page) = state.current.as_ref() else {
            return Ok(Vec::new());
        };
        Ok(page
            .matching(strategy, selector)?
            .into_iter()
            .map(|e| ElementHandle(e.handle.clone()))
            .collect())
    }
}

#[async_trait]
impl BrowserDriver for SimulatedDriver {
    async fn launch(&self, options: &ExecutionOptions) -> Result<(), DriverError> {
        let mut state = self.state.lock().await;
        *state = SimState {
            launched: true,
            ..SimState::default()
        };
        debug!(browser = %options.browser, headless = options.headless, pages = self.pages.len(), "Simulated browser launched");
        Ok(())
    }

    async fn perform(
        &self,
        action: &StepAction<'_>,
        target: Option<&ElementHandle>,
    ) -> Result<ActionOutcome, DriverError> {
        let mut state = self.state.lock().await;
        if !state.launched {
            return Err(DriverError::Fault("browser is not running".into()));
        }
        if self.fault_on == Some(action.kind()) {
            state.launched = false;
            return Err(DriverError::Fault(format!("browser crashed during {}", action.kind())));
        }
        state.performed += 1;

        if let StepAction::Navigate { url } = action {
            let page = self
                .pages
                .get(*url)
                .ok_or_else(|| DriverError::navigation(format!("no page at {}", url)))?;
            state.current = Some(page.clone());
            return Ok(ActionOutcome::default());
        }

        if let StepAction::Screenshot { .. } = action {
            state.screenshots += 1;
            return Ok(ActionOutcome { has_screenshot: true });
        }

        let Some(page) = state.current.as_mut() else {
            return Err(DriverError::action("no page loaded"));
        };

        let mut navigate_to = None;
        match *action {
            StepAction::Click { .. } => {
                let el = element(page, target)?;
                navigate_to = el.href.clone();
                let reveals = el.reveals.clone();
                for other in page.elements.iter_mut().filter(|e| reveals.contains(&e.handle)) {
                    other.visible = true;
                }
            }
            StepAction::Fill { text, .. } => {
                element(page, target)?.value = Some(text.to_string());
            }
            StepAction::Type { text, .. } => {
                let el = element(page, target)?;
                el.value.get_or_insert_with(String::new).push_str(text);
            }
            StepAction::Select { option, .. } => {
                let el = element(page, target)?;
                if !el.options.iter().any(|o| o == option) {
                    return Err(DriverError::action(format!(
                        "option '{}' not available in '{}'",
                        option, el.handle
                    )));
                }
                el.value = Some(option.to_string());
            }
            StepAction::Check { .. } => element(page, target)?.checked = true,
            StepAction::Uncheck { .. } => element(page, target)?.checked = false,
            StepAction::Hover { .. }
            | StepAction::Wait(_)
            | StepAction::AssertVisible { .. }
            | StepAction::AssertHidden { .. } => {}
            StepAction::AssertText { target: None, expected, exact } => {
                let found = if exact {
                    page.title == expected
                        || page.elements.iter().any(|e| e.visible && e.text.as_deref() == Some(expected))
                } else {
                    page.contains_text(expected)
                };
                if !found {
                    return Err(DriverError::assertion(format!("text '{}' not found on page", expected)));
                }
            }
            StepAction::AssertText { target: Some(_), expected, exact } => {
                let el = element(page, target)?;
                let actual = el.text.as_deref().or(el.value.as_deref()).unwrap_or("");
                let holds = if exact { actual == expected } else { actual.contains(expected) };
                if !holds {
                    return Err(DriverError::assertion(format!(
                        "expected text '{}', found '{}'",
                        expected, actual
                    )));
                }
            }
            StepAction::AssertValue { expected, .. } => {
                let el = element(page, target)?;
                let actual = el.value.as_deref().unwrap_or("");
                if actual != expected {
                    return Err(DriverError::assertion(format!(
                        "expected value '{}', found '{}'",
                        expected, actual
                    )));
                }
            }
            StepAction::PressKey { key, target: focus } => {
                if key.trim().is_empty() {
                    return Err(DriverError::action("empty key"));
                }
                if focus.is_some() && key == "Enter" {
                    navigate_to = element(page, target)?.href.clone();
                }
            }
            StepAction::Navigate { .. } | StepAction::Screenshot { .. } => {}
        }

        if let Some(url) = navigate_to {
            let next = self
                .pages
                .get(&url)
                .ok_or_else(|| DriverError::navigation(format!("no page at {}", url)))?;
            state.current = Some(next.clone());
        }

        Ok(ActionOutcome::default())
    }

    async fn current_url(&self) -> Option<String> {
        self.state.lock().await.current.as_ref().map(|p| p.url.clone())
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.state.lock().await.launched = false;
        Ok(())
    }
}
