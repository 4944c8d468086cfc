//! Page snapshots: a serializable, flat view of the elements on one page.
//!
//! Snapshots stand in for a live DOM wherever one is not available: the
//! simulated driver, the `resolve` CLI command, and tests. Each element
//! lists the structural selectors (`css`, `xpath`) it is known to match,
//! so no selector engine is needed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ElementHandle, LocatorStrategy, PageQuery, QueryError};

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub elements: Vec<PageElement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize, Serialize)]
pub struct PageElement {
    pub handle: String,
    #[serde(default)]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub css: Vec<String>,
    #[serde(default)]
    pub xpath: Vec<String>,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Current value of a form control.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default)]
    pub checked: bool,
    /// Choices of a `select` element.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    /// Page this element leads to when clicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
    /// Handles of elements this one reveals when clicked.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reveals: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl PageElement {
    /// Accessible name: aria label, else visible text.
    pub fn accessible_name(&self) -> Option<&str> {
        self.aria_label.as_deref().or(self.text.as_deref())
    }

    fn matches(&self, strategy: LocatorStrategy, selector: &str) -> bool {
        let eq = |field: &Option<String>| field.as_deref().map(str::trim) == Some(selector);
        match strategy {
            LocatorStrategy::TestId => eq(&self.test_id),
            LocatorStrategy::AriaLabel => eq(&self.aria_label),
            LocatorStrategy::Role => match selector.split_once(':') {
                Some((role, name)) => {
                    self.role.as_deref() == Some(role.trim())
                        && self.accessible_name().map(str::trim) == Some(name.trim())
                }
                None => self.role.as_deref() == Some(selector),
            },
            LocatorStrategy::Id => eq(&self.id),
            LocatorStrategy::Css => self.css.iter().any(|s| s == selector),
            LocatorStrategy::Text => eq(&self.text),
            LocatorStrategy::Xpath => self.xpath.iter().any(|s| s == selector),
            LocatorStrategy::Placeholder => eq(&self.placeholder),
        }
    }
}

impl PageSnapshot {
    /// Visible, enabled elements matching one strategy.
    pub fn matching(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Vec<&PageElement>, QueryError> {
        check_syntax(strategy, selector)?;
        Ok(self
            .elements
            .iter()
            .filter(|e| e.visible && e.enabled && e.matches(strategy, selector))
            .collect())
    }

    pub fn element(&self, handle: &ElementHandle) -> Option<&PageElement> {
        self.elements.iter().find(|e| e.handle == handle.0)
    }

    pub fn element_mut(&mut self, handle: &ElementHandle) -> Option<&mut PageElement> {
        self.elements.iter_mut().find(|e| e.handle == handle.0)
    }

    /// Whether `needle` occurs in the title or any visible element text.
    pub fn contains_text(&self, needle: &str) -> bool {
        self.title.contains(needle)
            || self
                .elements
                .iter()
                .filter(|e| e.visible)
                .filter_map(|e| e.text.as_deref())
                .any(|t| t.contains(needle))
    }
}

/// Rejects structural selectors with unbalanced brackets.
fn check_syntax(strategy: LocatorStrategy, selector: &str) -> Result<(), QueryError> {
    if !matches!(strategy, LocatorStrategy::Css | LocatorStrategy::Xpath) {
        return Ok(());
    }
    let balanced = |open: char, close: char| {
        selector.matches(open).count() == selector.matches(close).count()
    };
    if balanced('[', ']') && balanced('(', ')') {
        Ok(())
    } else {
        Err(QueryError::InvalidSelector {
            strategy,
            selector: selector.to_string(),
            reason: "unbalanced brackets".to_string(),
        })
    }
}

/// A read-only page backed by one snapshot.
#[derive(Debug, Clone)]
pub struct StaticPage {
    snapshot: PageSnapshot,
}

impl StaticPage {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &PageSnapshot {
        &self.snapshot
    }
}

#[async_trait]
impl PageQuery for StaticPage {
    async fn query(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, QueryError> {
        Ok(self
            .snapshot
            .matching(strategy, selector)?
            .into_iter()
            .map(|e| ElementHandle(e.handle.clone()))
            .collect())
    }
}
