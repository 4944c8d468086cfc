use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Named bundle of identification hints for one UI element.
///
/// Every hint is optional. A locator with no hint at all is still valid on
/// the wire, but resolution has no candidate strategy and fails.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct ElementLocator {
    /// Human-readable element name (e.g. `login_button`).
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Stable test identifier (`data-testid`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_testid: Option<String>,
    /// HTML `id` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aria_label: Option<String>,
    /// Semantic role, either `role` or `role:accessible name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xpath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

impl ElementLocator {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// True when at least one non-blank hint is present.
    pub fn has_hints(&self) -> bool {
        [
            &self.data_testid,
            &self.id,
            &self.aria_label,
            &self.role,
            &self.css,
            &self.text,
            &self.xpath,
            &self.placeholder,
        ]
        .into_iter()
        .any(|hint| hint.as_deref().is_some_and(|v| !v.trim().is_empty()))
    }

    /// Short stable hash of the locator, used to correlate resolution
    /// history across runs. 12 lowercase hex chars of SHA-256 over the
    /// canonical JSON encoding.
    pub fn fingerprint(&self) -> String {
        // Field order is fixed by the struct definition, so the encoding is canonical.
        let canonical = serde_json::to_vec(self).unwrap_or_default();
        let digest = Sha256::digest(&canonical);
        let hex = format!("{:x}", digest);
        hex[..12].to_string()
    }
}
