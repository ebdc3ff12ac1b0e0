//! Turning findings into graded fixes, and applying them.
//!
//! [`AutoFixer::generate_fixes`] is pure: it reads an [`AnalysisResult`] and
//! ranks remedies. [`AutoFixer::apply_fixes`] runs them one after another
//! through the [`PackageManagerAdapter`], after snapshotting the manifest.
//! A failing critical-risk fix restores the snapshot and stops the run; any
//! other failure is recorded and the run moves on.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::adapter::PackageManagerAdapter;
use crate::error::AdapterError;
use crate::manifest::MANIFEST_FILE;
use crate::models::{
    AnalysisResult, DependencyIssue, FixAction, FixActionKind, FixApplicationResult, FixKind,
    FixSuggestion, IssueKind, RiskLevel, SecurityIssue, SecuritySeverity, Severity,
};
use crate::version::{delta, parse_version, NpmRange, VersionDelta};

pub mod backup;

pub use backup::{ManifestBackup, RollbackGuard};

pub struct AutoFixer {
    adapter: Arc<dyn PackageManagerAdapter>,
    manifest_path: PathBuf,
    backup_dir: Option<PathBuf>,
}

impl AutoFixer {
    pub fn new(adapter: Arc<dyn PackageManagerAdapter>, project: &Path) -> Self {
        Self {
            adapter,
            manifest_path: project.join(MANIFEST_FILE),
            backup_dir: None,
        }
    }

    pub fn with_backup_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.backup_dir = dir;
        self
    }

    /// One suggestion per fixable finding, security first.
    ///
    /// A package with vulnerabilities gets a single security update and its
    /// other issues are not turned into suggestions. A lockfile regeneration
    /// closes the list whenever the analysis found broken installs or range
    /// violations.
    pub fn generate_fixes(&self, analysis: &AnalysisResult) -> Vec<FixSuggestion> {
        let mut suggestions = Vec::new();
        let mut handled: HashSet<&str> = HashSet::new();

        for (package, vulns) in group_by_package(&analysis.security_vulnerabilities) {
            if let Some(suggestion) = security_fix(package, &vulns) {
                suggestions.push(suggestion);
                handled.insert(package);
            } else {
                debug!("no patched release of {} to move to", package);
            }
        }

        for issue in &analysis.issues {
            if !issue.fixable || handled.contains(issue.package_name.as_str()) {
                continue;
            }
            if let Some(suggestion) = issue_fix(issue) {
                suggestions.push(suggestion);
                handled.insert(issue.package_name.as_str());
            }
        }

        let needs_relock = analysis
            .issues
            .iter()
            .any(|i| matches!(i.kind, IssueKind::Broken | IssueKind::VersionMismatch));
        if needs_relock {
            suggestions.push(FixSuggestion {
                kind: FixKind::RegenerateLockfile,
                description: "regenerate the lockfile from the manifest".to_string(),
                risk: RiskLevel::Medium,
                actions: vec![FixAction::regenerate_lockfile()],
                estimated_impact: "rewrites resolved versions for the whole tree".to_string(),
            });
        }

        suggestions
    }

    /// Apply `suggestions` in order.
    ///
    /// The manifest is backed up exactly once, before the first action. Adapter
    /// errors end up in [`FixApplicationResult::errors`]; nothing is returned
    /// as `Err`.
    pub fn apply_fixes(&self, suggestions: &[FixSuggestion]) -> FixApplicationResult {
        let mut result = FixApplicationResult {
            success: true,
            applied_fixes: Vec::new(),
            errors: Vec::new(),
            backup: None,
            rolled_back: false,
        };

        let backup = match ManifestBackup::create(&self.manifest_path, self.backup_dir.as_deref()) {
            Ok(backup) => backup,
            Err(e) => {
                result.success = false;
                result.errors.push(format!("{:#}", e));
                return result;
            }
        };
        result.backup = Some(backup.info().clone());

        for suggestion in suggestions {
            let guard = (suggestion.risk == RiskLevel::Critical).then(|| RollbackGuard::new(&backup));

            match self.apply_one(suggestion) {
                Ok(()) => {
                    info!("applied: {}", suggestion.description);
                    if let Some(guard) = guard {
                        guard.disarm();
                    }
                    result.applied_fixes.push(suggestion.clone());
                }
                Err(e) => {
                    warn!("fix failed: {}: {}", suggestion.description, e);
                    result.success = false;
                    result.errors.push(format!("{}: {}", suggestion.description, e));

                    if let Some(guard) = guard {
                        match guard.rollback() {
                            Ok(()) => result.rolled_back = true,
                            Err(e) => result.errors.push(format!("rollback failed: {:#}", e)),
                        }
                        break;
                    }
                }
            }
        }

        result
    }

    fn apply_one(&self, suggestion: &FixSuggestion) -> Result<(), AdapterError> {
        for action in &suggestion.actions {
            self.run_action(action)?;
        }
        Ok(())
    }

    fn run_action(&self, action: &FixAction) -> Result<(), AdapterError> {
        debug!("running {}", action);
        match (action.kind, action.package_name.as_deref(), action.version.as_deref()) {
            (FixActionKind::RegenerateLockfile, _, _) => self.adapter.regenerate_lockfile(),
            (FixActionKind::Install, Some(name), version) => self.adapter.install_package(name, version),
            (FixActionKind::Update, Some(name), Some(version)) => {
                self.adapter.update_package(name, version)
            }
            _ => Err(AdapterError::CommandFailed {
                command: action.to_string(),
                code: "-".to_string(),
                stderr: "action is missing a package name or version".to_string(),
            }),
        }
    }
}

/// Vulnerabilities grouped per package, in first-seen order.
fn group_by_package(vulns: &[SecurityIssue]) -> Vec<(&str, Vec<&SecurityIssue>)> {
    let mut groups: Vec<(&str, Vec<&SecurityIssue>)> = Vec::new();
    for vuln in vulns {
        match groups.iter_mut().find(|(name, _)| *name == vuln.package_name) {
            Some((_, group)) => group.push(vuln),
            None => groups.push((vuln.package_name.as_str(), vec![vuln])),
        }
    }
    groups
}

fn security_fix(package: &str, vulns: &[&SecurityIssue]) -> Option<FixSuggestion> {
    let installed = vulns.first().map(|v| v.version.as_str())?;
    let unpatched_critical = vulns
        .iter()
        .any(|v| !v.patch_available && v.severity == SecuritySeverity::Critical);
    let ids: Vec<&str> = vulns.iter().map(|v| v.vulnerability.id.as_str()).collect();

    match highest_fixed_version(vulns) {
        Some(target) => {
            let risk = if unpatched_critical {
                RiskLevel::Critical
            } else {
                update_risk(installed, &target)
            };
            let fixed = vulns.iter().filter(|v| v.patch_available).count();
            Some(FixSuggestion {
                kind: FixKind::UpdateOutdated,
                description: format!(
                    "update {} from {} to {} to fix {}",
                    package,
                    installed,
                    target,
                    ids.join(", ")
                ),
                risk,
                actions: vec![FixAction::update(package, &target)],
                estimated_impact: format!("resolves {} of {} known advisories", fixed, vulns.len()),
            })
        }
        None if unpatched_critical => Some(FixSuggestion {
            kind: FixKind::UpdateOutdated,
            description: format!(
                "update {} to the latest release; no patched version is known for {}",
                package,
                ids.join(", ")
            ),
            risk: RiskLevel::Critical,
            actions: vec![FixAction::update(package, "latest")],
            estimated_impact: "may not remove the vulnerability".to_string(),
        }),
        None => None,
    }
}

/// The greatest `fixed_in_version` across `vulns`, by semver when it parses.
fn highest_fixed_version(vulns: &[&SecurityIssue]) -> Option<String> {
    let fixed: Vec<&str> = vulns
        .iter()
        .filter_map(|v| v.fixed_in_version.as_deref())
        .collect();

    fixed
        .iter()
        .filter_map(|raw| parse_version(raw).map(|v| (v, *raw)))
        .max_by(|a, b| a.0.cmp(&b.0))
        .map(|(_, raw)| raw.to_string())
        .or_else(|| fixed.first().map(|raw| raw.to_string()))
}

fn update_risk(from: &str, to: &str) -> RiskLevel {
    match (parse_version(from), parse_version(to)) {
        (Some(from), Some(to)) => match delta(&from, &to) {
            VersionDelta::Major => RiskLevel::High,
            VersionDelta::Minor => RiskLevel::Medium,
            _ => RiskLevel::Low,
        },
        _ => RiskLevel::Medium,
    }
}

fn issue_fix(issue: &DependencyIssue) -> Option<FixSuggestion> {
    let name = issue.package_name.as_str();
    let current = issue.current_version.as_deref();

    match issue.kind {
        IssueKind::Missing => Some(FixSuggestion {
            kind: FixKind::InstallMissing,
            description: format!("install {}", with_version(name, issue.expected_version.as_deref())),
            risk: RiskLevel::Low,
            actions: vec![FixAction::install(name, issue.expected_version.as_deref())],
            estimated_impact: "adds a declared package to node_modules".to_string(),
        }),
        IssueKind::Outdated => {
            let latest = issue.latest_version.as_deref()?;
            Some(FixSuggestion {
                kind: FixKind::UpdateOutdated,
                description: format!("update {} from {} to {}", name, current.unwrap_or("?"), latest),
                risk: current.map_or(RiskLevel::Medium, |c| update_risk(c, latest)),
                actions: vec![FixAction::update(name, latest)],
                estimated_impact: "moves to the latest published release".to_string(),
            })
        }
        IssueKind::VersionMismatch => {
            let expected = issue.expected_version.as_deref()?;
            let crosses_major = current
                .and_then(parse_version)
                .zip(NpmRange::parse(expected).and_then(|r| r.min_version()))
                .map_or(false, |(c, min)| delta(&c, &min) == VersionDelta::Major);
            Some(FixSuggestion {
                kind: FixKind::UpdateOutdated,
                description: format!("bring {} back within {}", name, expected),
                risk: if crosses_major { RiskLevel::High } else { RiskLevel::Medium },
                actions: vec![FixAction::update(name, expected)],
                estimated_impact: "reinstalls a version the manifest allows".to_string(),
            })
        }
        IssueKind::Broken => {
            // Undeclared packages are left to lockfile regeneration.
            let declared = issue.expected_version.as_deref()?;
            Some(FixSuggestion {
                kind: FixKind::InstallMissing,
                description: format!("reinstall {}", with_version(name, Some(declared))),
                risk: RiskLevel::Low,
                actions: vec![FixAction::install(name, Some(declared))],
                estimated_impact: "replaces the damaged package directory".to_string(),
            })
        }
        IssueKind::PeerConflict => {
            let range = issue.expected_version.as_deref()?;
            Some(FixSuggestion {
                kind: FixKind::ResolveConflict,
                description: format!("install peer {}", with_version(name, Some(range))),
                risk: if issue.severity >= Severity::High {
                    RiskLevel::High
                } else {
                    RiskLevel::Medium
                },
                actions: vec![FixAction::install(name, Some(range))],
                estimated_impact: "satisfies the packages that require this peer".to_string(),
            })
        }
        IssueKind::Security => None,
    }
}

fn with_version(name: &str, version: Option<&str>) -> String {
    match version {
        Some(v) => format!("{}@{}", name, v),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::models::{PackageManagerType, ProjectInfo, Vulnerability};
    use crate::scanner::testing::FakeAdapter;

    fn analysis(issues: Vec<DependencyIssue>, vulns: Vec<SecurityIssue>) -> AnalysisResult {
        AnalysisResult {
            health_score: 50,
            issues,
            security_vulnerabilities: vulns,
            package_manager: PackageManagerType::Npm,
            project: ProjectInfo {
                name: "demo".to_string(),
                version: "1.0.0".to_string(),
                path: PathBuf::from("/nonexistent"),
                dependency_count: 0,
                dev_dependency_count: 0,
                installed_count: 0,
            },
        }
    }

    fn vuln(
        package: &str,
        version: &str,
        id: &str,
        severity: SecuritySeverity,
        fixed_in: Option<&str>,
    ) -> SecurityIssue {
        SecurityIssue {
            package_name: package.to_string(),
            version: version.to_string(),
            vulnerability: Vulnerability {
                id: id.to_string(),
                title: id.to_string(),
                description: String::new(),
                cvss_score: 9.8,
                cwe_list: vec![],
                references: vec![],
            },
            severity,
            fixed_in_version: fixed_in.map(str::to_string),
            patch_available: fixed_in.is_some(),
        }
    }

    fn suggestion(name: &str, risk: RiskLevel) -> FixSuggestion {
        FixSuggestion {
            kind: FixKind::UpdateOutdated,
            description: format!("update {}", name),
            risk,
            actions: vec![FixAction::update(name, "2.0.0")],
            estimated_impact: String::new(),
        }
    }

    fn project_with_manifest(content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("package.json"), content).unwrap();
        dir
    }

    fn fixer(adapter: FakeAdapter, project: &Path) -> (Arc<FakeAdapter>, AutoFixer) {
        let adapter = Arc::new(adapter);
        let fixer = AutoFixer::new(adapter.clone(), project);
        (adapter, fixer)
    }

    #[test]
    fn test_critical_lodash_vulnerability_updates_to_fixed_version() {
        let (_, fixer) = fixer(FakeAdapter::default(), Path::new("/nonexistent"));
        let result = analysis(
            vec![],
            vec![vuln("lodash", "1.0.0", "GHSA-1", SecuritySeverity::Critical, Some("1.1.0"))],
        );
        let fixes = fixer.generate_fixes(&result);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].kind, FixKind::UpdateOutdated);
        assert_eq!(fixes[0].actions, vec![FixAction::update("lodash", "1.1.0")]);
        assert_eq!(fixes[0].risk, RiskLevel::Medium);
    }

    #[test]
    fn test_security_fix_takes_highest_version_and_shadows_issues() {
        let (_, fixer) = fixer(FakeAdapter::default(), Path::new("/nonexistent"));
        let result = analysis(
            vec![
                DependencyIssue::new(IssueKind::Outdated, "lodash", Severity::High, "old")
                    .current("1.0.0")
                    .latest("4.17.21"),
                DependencyIssue::new(IssueKind::Missing, "chalk", Severity::Critical, "missing")
                    .expected("^5.0.0"),
            ],
            vec![
                vuln("lodash", "1.0.0", "A", SecuritySeverity::High, Some("1.0.5")),
                vuln("lodash", "1.0.0", "B", SecuritySeverity::Moderate, Some("2.1.0")),
            ],
        );
        let fixes = fixer.generate_fixes(&result);
        assert_eq!(fixes.len(), 2);
        assert_eq!(fixes[0].actions, vec![FixAction::update("lodash", "2.1.0")]);
        assert_eq!(fixes[0].risk, RiskLevel::High);
        assert_eq!(fixes[1].kind, FixKind::InstallMissing);
        assert_eq!(fixes[1].risk, RiskLevel::Low);
        assert_eq!(fixes[1].actions, vec![FixAction::install("chalk", Some("^5.0.0"))]);
    }

    #[test]
    fn test_unpatched_critical_is_critical_risk() {
        let (_, fixer) = fixer(FakeAdapter::default(), Path::new("/nonexistent"));
        let result = analysis(
            vec![],
            vec![
                vuln("ws", "7.0.0", "C", SecuritySeverity::Critical, None),
                vuln("minimist", "1.0.0", "D", SecuritySeverity::Moderate, None),
            ],
        );
        let fixes = fixer.generate_fixes(&result);
        assert_eq!(fixes.len(), 1);
        assert_eq!(fixes[0].risk, RiskLevel::Critical);
        assert_eq!(fixes[0].actions, vec![FixAction::update("ws", "latest")]);
    }

    #[test]
    fn test_issue_fixes_and_lockfile_regeneration() {
        let (_, fixer) = fixer(FakeAdapter::default(), Path::new("/nonexistent"));
        let result = analysis(
            vec![
                DependencyIssue::new(IssueKind::VersionMismatch, "express", Severity::High, "too new")
                    .current("5.0.0")
                    .expected("^4.0.0"),
                DependencyIssue::new(IssueKind::Outdated, "chalk", Severity::Low, "behind")
                    .current("5.0.0")
                    .latest("5.0.1"),
                DependencyIssue::new(IssueKind::PeerConflict, "react", Severity::High, "clash")
                    .expected("^16.0.0 && ^18.0.0")
                    .fixable(false),
                DependencyIssue::new(IssueKind::Broken, "left-pad", Severity::Low, "no docs")
                    .current("1.3.0")
                    .fixable(false),
            ],
            vec![],
        );
        let fixes = fixer.generate_fixes(&result);
        let kinds: Vec<FixKind> = fixes.iter().map(|f| f.kind).collect();
        assert_eq!(
            kinds,
            vec![
                FixKind::UpdateOutdated,
                FixKind::UpdateOutdated,
                FixKind::RegenerateLockfile
            ]
        );
        assert_eq!(fixes[0].risk, RiskLevel::High);
        assert_eq!(fixes[0].actions, vec![FixAction::update("express", "^4.0.0")]);
        assert_eq!(fixes[1].risk, RiskLevel::Low);
    }

    #[test]
    fn test_broken_packages_reinstall_only_when_declared() {
        let (_, fixer) = fixer(FakeAdapter::default(), Path::new("/nonexistent"));
        let result = analysis(
            vec![
                DependencyIssue::new(IssueKind::Broken, "express", Severity::High, "no package.json")
                    .current("4.18.2")
                    .expected("^4.0.0"),
                DependencyIssue::new(IssueKind::Broken, "debug", Severity::High, "no package.json")
                    .current("2.6.9"),
            ],
            vec![],
        );
        let fixes = fixer.generate_fixes(&result);
        let kinds: Vec<FixKind> = fixes.iter().map(|f| f.kind).collect();
        assert_eq!(kinds, vec![FixKind::InstallMissing, FixKind::RegenerateLockfile]);
        assert_eq!(fixes[0].actions, vec![FixAction::install("express", Some("^4.0.0"))]);
        assert!(fixes
            .iter()
            .all(|f| f.actions.iter().all(|a| a.package_name.as_deref() != Some("debug"))));
    }

    #[test]
    fn test_apply_backs_up_and_continues_past_ordinary_failures() {
        let original = r#"{ "name": "demo", "dependencies": { "a": "^1.0.0" } }"#;
        let project = project_with_manifest(original);
        let manifest = project.path().join("package.json");
        let hook_path = manifest.clone();
        let adapter = FakeAdapter {
            failing: vec!["b".to_string()],
            on_mutate: Some(Box::new(move || {
                fs::write(&hook_path, r#"{ "name": "demo", "rewritten": true }"#).unwrap();
            })),
            ..FakeAdapter::default()
        };
        let (adapter, fixer) = fixer(adapter, project.path());

        let result = fixer.apply_fixes(&[
            suggestion("a", RiskLevel::Low),
            suggestion("b", RiskLevel::High),
            suggestion("c", RiskLevel::Medium),
        ]);

        assert!(!result.success);
        assert!(!result.rolled_back);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].contains("update b"));
        let applied: Vec<&str> = result.applied_fixes.iter().map(|f| f.description.as_str()).collect();
        assert_eq!(applied, vec!["update a", "update c"]);
        assert_eq!(
            adapter.calls(),
            vec!["update a@2.0.0", "update b@2.0.0", "update c@2.0.0"]
        );

        let backup = result.backup.unwrap();
        assert_eq!(fs::read_to_string(&backup.backup_path).unwrap(), original);
        assert_ne!(fs::read_to_string(&manifest).unwrap(), original);
    }

    #[test]
    fn test_critical_failure_rolls_back_and_stops() {
        let original = r#"{ "name": "demo" }"#;
        let project = project_with_manifest(original);
        let manifest = project.path().join("package.json");
        let hook_path = manifest.clone();
        let adapter = FakeAdapter {
            failing: vec!["ws".to_string()],
            on_mutate: Some(Box::new(move || {
                fs::write(&hook_path, "{ \"mutated\": true }").unwrap();
            })),
            ..FakeAdapter::default()
        };
        let (adapter, fixer) = fixer(adapter, project.path());

        let result = fixer.apply_fixes(&[
            suggestion("a", RiskLevel::Low),
            suggestion("ws", RiskLevel::Critical),
            suggestion("c", RiskLevel::Low),
        ]);

        assert!(!result.success);
        assert!(result.rolled_back);
        assert_eq!(result.applied_fixes.len(), 1);
        assert_eq!(adapter.calls(), vec!["update a@2.0.0", "update ws@2.0.0"]);
        assert_eq!(fs::read_to_string(&manifest).unwrap(), original);
        assert!(result.backup.is_some());
    }

    #[test]
    fn test_backup_is_taken_even_with_nothing_to_do() {
        let project = project_with_manifest("{}");
        let (adapter, fixer) = fixer(FakeAdapter::default(), project.path());
        let result = fixer.apply_fixes(&[]);
        assert!(result.success);
        assert!(result.backup.unwrap().backup_path.exists());
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn test_missing_manifest_aborts_before_any_action() {
        let project = tempfile::tempdir().unwrap();
        let (adapter, fixer) = fixer(FakeAdapter::default(), project.path());
        let result = fixer.apply_fixes(&[suggestion("a", RiskLevel::Low)]);
        assert!(!result.success);
        assert!(result.backup.is_none());
        assert!(result.applied_fixes.is_empty());
        assert!(adapter.calls().is_empty());
    }

    #[test]
    fn test_backup_dir_override() {
        let project = project_with_manifest("{}");
        let target = project.path().join(".backups");
        let adapter = Arc::new(FakeAdapter::default());
        let fixer = AutoFixer::new(adapter, project.path()).with_backup_dir(Some(target.clone()));
        let result = fixer.apply_fixes(&[]);
        assert_eq!(result.backup.unwrap().backup_path.parent(), Some(target.as_path()));
    }
}
