use std::collections::HashSet;

use anyhow::Result;

use super::{ScanContext, ScannerKind};
use crate::models::{DependencyIssue, DependencyRole, IssueKind, ScanResult, Severity};

/// Reports declared dependencies that are absent from the install directory.
#[derive(Debug, Default)]
pub struct MissingScanner;

impl MissingScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        let installed: HashSet<&str> = ctx.installed.iter().map(|p| p.name.as_str()).collect();
        let mut reported = HashSet::new();
        let mut issues = Vec::new();

        for declared in ctx.manifest.declared() {
            if installed.contains(declared.name) || !reported.insert(declared.name) {
                continue;
            }
            issues.push(
                DependencyIssue::new(
                    IssueKind::Missing,
                    declared.name,
                    severity_for(declared.role),
                    format!(
                        "{} is declared in {} but not installed",
                        declared.name, declared.role
                    ),
                )
                .expected(declared.range),
            );
        }

        Ok(ScanResult {
            scanner: ScannerKind::Missing,
            issues,
            security_issues: Vec::new(),
        })
    }
}

fn severity_for(role: DependencyRole) -> Severity {
    match role {
        DependencyRole::Regular => Severity::Critical,
        DependencyRole::Dev | DependencyRole::Peer => Severity::High,
        DependencyRole::Optional => Severity::Low,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testing::{context, installed, manifest};

    #[test]
    fn test_missing_regular_dependency_is_critical() {
        let ctx = context(manifest(&[("express", "^4.0.0")], &[]), vec![]);
        let result = MissingScanner::new().scan(&ctx).unwrap();
        assert_eq!(result.issues.len(), 1);
        let issue = &result.issues[0];
        assert_eq!(issue.kind, IssueKind::Missing);
        assert_eq!(issue.severity, Severity::Critical);
        assert_eq!(issue.expected_version.as_deref(), Some("^4.0.0"));
        assert!(issue.fixable);
    }

    #[test]
    fn test_missing_dev_dependency_is_high() {
        let ctx = context(manifest(&[], &[("jest", "^29.0.0")]), vec![]);
        let result = MissingScanner::new().scan(&ctx).unwrap();
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].severity, Severity::High);
    }

    #[test]
    fn test_peer_and_optional_severities() {
        let mut m = manifest(&[], &[]);
        m.peer_dependencies.insert("react".into(), "^18.0.0".into());
        m.optional_dependencies.insert("fsevents".into(), "^2.3.0".into());
        let result = MissingScanner::new().scan(&context(m, vec![])).unwrap();
        let severity = |name: &str| {
            result
                .issues
                .iter()
                .find(|i| i.package_name == name)
                .map(|i| i.severity)
        };
        assert_eq!(severity("react"), Some(Severity::High));
        assert_eq!(severity("fsevents"), Some(Severity::Low));
    }

    #[test]
    fn test_installed_and_duplicate_declarations() {
        let mut m = manifest(&[("lodash", "^4.17.0"), ("react", "^18.0.0")], &[]);
        m.peer_dependencies.insert("react".into(), "^18.0.0".into());
        let ctx = context(m, vec![installed("lodash", "4.17.21")]);
        let result = MissingScanner::new().scan(&ctx).unwrap();
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].package_name, "react");
        assert_eq!(result.issues[0].severity, Severity::Critical);
    }
}
