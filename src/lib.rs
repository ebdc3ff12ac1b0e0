//! `dep_doctor`: diagnose and repair dependency health in npm, yarn and pnpm projects.
//!
//! # Flow
//! 1. Snapshot the project into a [`scanner::ScanContext`] (manifest, lockfile,
//!    `node_modules` inventory, [`adapter::PackageManagerAdapter`]).
//! 2. Run the scanners concurrently through a [`scanner::ScannerRegistry`].
//! 3. Validate, deduplicate and score the findings ([`analyzer::DependencyAnalyzer`]).
//! 4. Turn findings into graded fixes and apply them with backup and
//!    rollback ([`fixer::AutoFixer`]).

pub mod adapter;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod fixer;
pub mod manifest;
pub mod models;
pub mod registry;
pub mod report;
pub mod scanner;
pub mod version;
