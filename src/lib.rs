//! # ui-runner
//!
//! Contract core for UI test automation: element locators with a fixed
//! resolution precedence, test cases split into setup / body / teardown,
//! and the fold of per-step results into one execution status.
//!
//! ```text
//! ┌──────────┐   ┌────────────┐   ┌────────┐   ┌───────────┐
//! │ protocol │──>│ validation │──>│ engine │──>│ aggregate │
//! └──────────┘   └────────────┘   └────────┘   └───────────┘
//!                                     │
//!                      ┌──────────────┼──────────────┐
//!                      ▼              ▼              ▼
//!                  locator        executors      telemetry
//! ```

pub mod aggregate;
pub mod client;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executors;
pub mod generation;
pub mod limits;
pub mod loader;
pub mod locator;
pub mod protocol;
pub mod retry;
pub mod store;
pub mod telemetry;
pub mod validation;
