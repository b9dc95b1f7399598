//! Convergence engine for keel
//!
//! The engine runs in three steps:
//! 1. Planning - merge declarations, load live state, classify actions
//! 2. Diffing - render what would change
//! 3. Executing - apply the actionable part in manifest order

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ExecuteOptions, ExecuteSummary, execute};
pub use planner::{Plan, plan};
