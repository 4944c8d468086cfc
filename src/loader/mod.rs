//! # Loader
//!
//! Reads JSON documents from disk: test case definitions, persisted
//! executions and page snapshots for the simulated driver.
//!
//! ```rust,ignore
//! let create = loader::load_test_case("./tests/login.json")?;
//! println!("Loaded: {}", create.name);
//! ```

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::locator::PageSnapshot;
use crate::protocol::{TestCaseCreate, TestExecution};

/// Reads and deserializes any JSON document.
///
/// Errors name the file: "Failed to read …" when it cannot be opened,
/// "Failed to parse …" when the JSON does not fit `T`.
pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T> {
    let path = path.as_ref();

    let content = fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;

    serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
}

pub fn load_test_case<P: AsRef<Path>>(path: P) -> Result<TestCaseCreate> {
    load_json(path)
}

pub fn load_execution<P: AsRef<Path>>(path: P) -> Result<TestExecution> {
    load_json(path)
}

/// Accepts either a single snapshot or an array of them.
pub fn load_pages<P: AsRef<Path>>(path: P) -> Result<Vec<PageSnapshot>> {
    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<PageSnapshot>),
        One(PageSnapshot),
    }

    Ok(match load_json::<OneOrMany, _>(path)? {
        OneOrMany::Many(pages) => pages,
        OneOrMany::One(page) => vec![page],
    })
}

/// Writes `value` as pretty JSON.
pub fn save_json<T: Serialize, P: AsRef<Path>>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(value).context("Failed to serialize report")?;
    fs::write(path, json).with_context(|| format!("Failed to write {:?}", path))
}
