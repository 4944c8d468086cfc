//! # Locator Resolution
//!
//! Deterministic lookup of one page element from an [`ElementLocator`].
//!
//! Strategies are tried in a fixed precedence, most stable first:
//!
//! ```text
//! data_testid → aria_label → role → id → css → text → xpath → placeholder
//! ```
//!
//! The first strategy whose query yields exactly one live, visible and
//! interactable element wins. Zero or several matches are inconclusive and
//! resolution moves on. A selector the page engine cannot parse counts as
//! zero matches. Only an engine fault stops the walk; that is a harness
//! problem, not a locator problem.
//!
//! Resolution never mutates the page, so resolving the same locator twice
//! against an unchanged page yields the same answer.

pub mod page;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::ErrorCode;
use crate::protocol::ElementLocator;

pub use page::{PageElement, PageSnapshot, StaticPage};

// ============================================================================
// STRATEGIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    TestId,
    AriaLabel,
    Role,
    Id,
    Css,
    Text,
    Xpath,
    Placeholder,
}

impl LocatorStrategy {
    /// Resolution order.
    pub const PRECEDENCE: [LocatorStrategy; 8] = [
        Self::TestId,
        Self::AriaLabel,
        Self::Role,
        Self::Id,
        Self::Css,
        Self::Text,
        Self::Xpath,
        Self::Placeholder,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TestId => "test_id",
            Self::AriaLabel => "aria_label",
            Self::Role => "role",
            Self::Id => "id",
            Self::Css => "css",
            Self::Text => "text",
            Self::Xpath => "xpath",
            Self::Placeholder => "placeholder",
        }
    }

    /// The locator hint this strategy reads.
    pub fn hint(self, locator: &ElementLocator) -> Option<&str> {
        let value = match self {
            Self::TestId => &locator.data_testid,
            Self::AriaLabel => &locator.aria_label,
            Self::Role => &locator.role,
            Self::Id => &locator.id,
            Self::Css => &locator.css,
            Self::Text => &locator.text,
            Self::Xpath => &locator.xpath,
            Self::Placeholder => &locator.placeholder,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }
}

impl fmt::Display for LocatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One strategy/selector pair to try.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate<'a> {
    pub strategy: LocatorStrategy,
    pub selector: &'a str,
}

/// Candidates for a locator in precedence order; blank hints are skipped.
pub fn candidates(locator: &ElementLocator) -> Vec<Candidate<'_>> {
    LocatorStrategy::PRECEDENCE
        .into_iter()
        .filter_map(|strategy| {
            strategy
                .hint(locator)
                .map(|selector| Candidate { strategy, selector })
        })
        .collect()
}

// ============================================================================
// PAGE QUERY SEAM
// ============================================================================

/// Opaque reference to one element on the current page.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ElementHandle(pub String);

impl fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The engine could not parse the selector; treated as no match.
    #[error("invalid {strategy} selector '{selector}': {reason}")]
    InvalidSelector {
        strategy: LocatorStrategy,
        selector: String,
        reason: String,
    },

    /// The engine itself failed.
    #[error("page engine fault: {0}")]
    Engine(String),
}

/// Read-only element lookup against the current page.
///
/// Implementations return only live, visible, interactable elements and
/// must not change page state.
#[async_trait]
pub trait PageQuery: Send + Sync {
    async fn query(
        &self,
        strategy: LocatorStrategy,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, QueryError>;
}

// ============================================================================
// RESOLUTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StrategyAttempt {
    pub strategy: LocatorStrategy,
    pub selector: String,
    pub matches: usize,
}

/// No strategy produced a unique match.
#[derive(Debug, Clone, PartialEq, Eq, Error, Deserialize, Serialize)]
#[error("cannot locate element '{locator_name}': {}", describe_attempts(.attempts))]
pub struct LocatorResolutionError {
    pub locator_name: String,
    pub attempts: Vec<StrategyAttempt>,
}

fn describe_attempts(attempts: &[StrategyAttempt]) -> String {
    if attempts.is_empty() {
        return "no locator strategy available".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{}={} ({} matches)", a.strategy, a.selector, a.matches))
        .collect::<Vec<_>>()
        .join(", ")
}

impl LocatorResolutionError {
    pub fn code(&self) -> ErrorCode {
        if self.attempts.is_empty() {
            ErrorCode::NO_LOCATOR_STRATEGY
        } else {
            ErrorCode::ELEMENT_NOT_FOUND
        }
    }

    /// True when no strategy matched anything at all.
    pub fn nothing_matched(&self) -> bool {
        self.attempts.iter().all(|a| a.matches == 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    NotFound(#[from] LocatorResolutionError),

    #[error("{0}")]
    Engine(String),
}

/// Successful resolution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub handle: ElementHandle,
    pub strategy: LocatorStrategy,
    /// Every strategy tried, the winning one last.
    pub attempts: Vec<StrategyAttempt>,
    pub duration_ms: u64,
}

/// Walks the candidate strategies until one yields exactly one element.
pub async fn resolve<Q: PageQuery + ?Sized>(
    page: &Q,
    locator: &ElementLocator,
) -> Result<Resolution, ResolveError> {
    let start = Instant::now();
    let mut attempts = Vec::new();

    for candidate in candidates(locator) {
        let handles = match page.query(candidate.strategy, candidate.selector).await {
            Ok(handles) => handles,
            Err(QueryError::InvalidSelector { reason, .. }) => {
                debug!(
                    locator = %locator.name,
                    strategy = %candidate.strategy,
                    selector = candidate.selector,
                    reason = %reason,
                    "Selector rejected by page engine"
                );
                Vec::new()
            }
            Err(QueryError::Engine(message)) => return Err(ResolveError::Engine(message)),
        };

        attempts.push(StrategyAttempt {
            strategy: candidate.strategy,
            selector: candidate.selector.to_string(),
            matches: handles.len(),
        });

        if let [handle] = handles.as_slice() {
            let duration_ms = start.elapsed().as_millis() as u64;
            debug!(
                locator = %locator.name,
                strategy = %candidate.strategy,
                handle = %handle,
                duration_ms,
                "Element resolved"
            );
            return Ok(Resolution {
                handle: handle.clone(),
                strategy: candidate.strategy,
                attempts,
                duration_ms,
            });
        }
    }

    let err = LocatorResolutionError {
        locator_name: locator.name.clone(),
        attempts,
    };
    warn!(locator = %locator.name, fingerprint = %locator.fingerprint(), "{}", err);
    Err(err.into())
}
