//! Report renderers for analysis and fix results.
//!
//! - [`terminal`]: colored summary box and tables; respects `--verbose` / `--quiet`.
//! - [`json`]: one pretty-printed document for machine consumers.

pub mod json;
pub mod terminal;
