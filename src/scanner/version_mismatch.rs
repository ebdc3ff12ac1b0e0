use anyhow::Result;

use super::{ScanContext, ScannerKind};
use crate::models::{DependencyIssue, IssueKind, ScanResult, Severity};
use crate::version::{delta, parse_version, release_of, NpmRange, VersionDelta};

/// How an installed version fails its declared range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mismatch {
    Invalid,
    Exact,
    TooHigh(VersionDelta),
    TooLow,
    Prerelease,
    Range,
}

impl Mismatch {
    pub fn severity(self) -> Severity {
        match self {
            Mismatch::Invalid => Severity::Critical,
            Mismatch::Exact => Severity::High,
            Mismatch::TooHigh(VersionDelta::Major) => Severity::High,
            Mismatch::TooHigh(VersionDelta::Minor) => Severity::Medium,
            Mismatch::TooHigh(_) => Severity::Low,
            Mismatch::TooLow | Mismatch::Prerelease | Mismatch::Range => Severity::Medium,
        }
    }

    fn describe(self, name: &str, installed: &str, range: &str) -> String {
        match self {
            Mismatch::Invalid => format!("{} has an invalid installed version `{}`", name, installed),
            Mismatch::Exact => format!("{} is pinned to {} but {} is installed", name, range, installed),
            Mismatch::TooHigh(_) => {
                format!("{} {} is newer than the declared range {}", name, installed, range)
            }
            Mismatch::TooLow => {
                format!("{} {} is older than the declared range {}", name, installed, range)
            }
            Mismatch::Prerelease => format!(
                "{} {} is a prerelease but {} expects a stable release",
                name, installed, range
            ),
            Mismatch::Range => format!("{} {} does not satisfy {}", name, installed, range),
        }
    }
}

/// Reports installed packages whose version falls outside the declared range.
#[derive(Debug, Default)]
pub struct VersionMismatchScanner;

impl VersionMismatchScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        let mut issues = Vec::new();

        for declared in ctx.manifest.installable() {
            let Some(version) = ctx.installed_version(declared.name) else {
                continue;
            };
            // Tags, git URLs and local paths have no range to check against.
            let Some(range) = NpmRange::parse(declared.range) else {
                continue;
            };
            let Some(mismatch) = classify(version, &range) else {
                continue;
            };

            issues.push(
                DependencyIssue::new(
                    IssueKind::VersionMismatch,
                    declared.name,
                    mismatch.severity(),
                    mismatch.describe(declared.name, version, declared.range),
                )
                .current(version)
                .expected(declared.range),
            );
        }

        Ok(ScanResult {
            scanner: ScannerKind::VersionMismatch,
            issues,
            security_issues: Vec::new(),
        })
    }
}

/// `None` when `installed` satisfies `range`.
pub fn classify(installed: &str, range: &NpmRange) -> Option<Mismatch> {
    let Some(version) = parse_version(installed) else {
        return Some(Mismatch::Invalid);
    };
    if range.satisfies(&version) {
        return None;
    }
    if range.pinned().is_some() {
        return Some(Mismatch::Exact);
    }
    if !version.pre.is_empty()
        && !range.mentions_prerelease()
        && range.satisfies(&release_of(&version))
    {
        return Some(Mismatch::Prerelease);
    }

    match range.min_version() {
        Some(min) if version > min => Some(Mismatch::TooHigh(delta(&min, &version))),
        Some(min) if version < min => Some(Mismatch::TooLow),
        _ => Some(Mismatch::Range),
    }
}
