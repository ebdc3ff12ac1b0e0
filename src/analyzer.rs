//! Runs the scanners and folds their output into one [`AnalysisResult`].

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use log::debug;

use crate::adapter::{self, PackageManagerAdapter};
use crate::config::{Config, ScoreWeights};
use crate::error::DoctorError;
use crate::models::{AnalysisResult, DependencyIssue, ProjectInfo, ScanResult, SecurityIssue};
use crate::registry::{self, NpmRegistry, OsvClient};
use crate::scanner::{
    BrokenScanner, MissingScanner, OutdatedScanner, PeerConflictScanner, ScanContext, Scanner,
    ScannerKind, ScannerRegistry, SecurityScanner, VersionMismatchScanner,
};

pub struct DependencyAnalyzer {
    registry: ScannerRegistry,
    weights: ScoreWeights,
    command_timeout: Duration,
}

impl DependencyAnalyzer {
    pub fn new(registry: ScannerRegistry, weights: ScoreWeights) -> Self {
        Self {
            registry,
            weights,
            command_timeout: crate::config::FixConfig::default().command_timeout(),
        }
    }

    /// Register the scanners enabled in `config`, wired to the configured
    /// npm registry and OSV endpoint.
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = registry::http_client(config.network.timeout())?;
        let batch = config.network.concurrency;

        let mut scanners = ScannerRegistry::new();
        for kind in &config.scanners.enabled {
            let scanner = match kind {
                ScannerKind::Missing => Scanner::Missing(MissingScanner::new()),
                ScannerKind::Broken => Scanner::Broken(BrokenScanner::new()),
                ScannerKind::VersionMismatch => Scanner::VersionMismatch(VersionMismatchScanner::new()),
                ScannerKind::PeerConflict => Scanner::PeerConflict(PeerConflictScanner::new()),
                ScannerKind::Outdated => Scanner::Outdated(
                    OutdatedScanner::new(Arc::new(NpmRegistry::new(
                        client.clone(),
                        config.network.registry_url.clone(),
                    )))
                    .with_batch_size(batch),
                ),
                ScannerKind::Security => Scanner::Security(
                    SecurityScanner::new(Arc::new(OsvClient::new(
                        client.clone(),
                        config.network.advisory_url.clone(),
                    )))
                    .with_batch_size(batch),
                ),
            };
            // Repeated entries in the config are harmless.
            if scanners.get(*kind).is_none() {
                scanners.register(scanner)?;
            }
        }

        Ok(Self {
            registry: scanners,
            weights: config.score.clone(),
            command_timeout: config.fix.command_timeout(),
        })
    }

    pub fn registry(&self) -> &ScannerRegistry {
        &self.registry
    }

    /// Analyse the project at `project` with every registered scanner.
    pub async fn analyze(&self, project: &Path) -> Result<AnalysisResult, DoctorError> {
        self.analyze_with(project, None).await
    }

    /// Analyse with an explicit scanner selection, or all when `kinds` is `None`.
    pub async fn analyze_with(
        &self,
        project: &Path,
        kinds: Option<&[ScannerKind]>,
    ) -> Result<AnalysisResult, DoctorError> {
        if !project.is_dir() {
            return Err(DoctorError::ProjectNotFound(project.to_path_buf()));
        }
        let adapter = adapter::detect(project, self.command_timeout);
        self.analyze_using(project, adapter, kinds).await
    }

    pub async fn analyze_using(
        &self,
        project: &Path,
        adapter: Arc<dyn PackageManagerAdapter>,
        kinds: Option<&[ScannerKind]>,
    ) -> Result<AnalysisResult, DoctorError> {
        let ctx = Arc::new(ScanContext::load(project, adapter)?);
        let results = match kinds {
            Some(kinds) => self.registry.run(kinds, Arc::clone(&ctx)).await?,
            None => self.registry.run_all(Arc::clone(&ctx)).await,
        };
        Ok(self.aggregate(&ctx, results))
    }

    /// Validate, deduplicate, sort and score the scanner output.
    pub fn aggregate(&self, ctx: &ScanContext, results: Vec<ScanResult>) -> AnalysisResult {
        let mut issues: Vec<DependencyIssue> = Vec::new();
        let mut vulnerabilities: Vec<SecurityIssue> = Vec::new();

        for result in results {
            let scanner = result.scanner;
            for issue in result.issues {
                if is_well_formed(scanner, &issue) {
                    issues.push(issue);
                } else {
                    debug!("dropping malformed {} issue: {:?}", scanner, issue);
                }
            }
            for vuln in result.security_issues {
                if is_well_formed_vulnerability(&vuln) {
                    vulnerabilities.push(vuln);
                } else {
                    debug!("dropping malformed advisory: {:?}", vuln);
                }
            }
        }

        let mut issues = dedup_issues(issues);
        // Stable, so scanner order is kept among equals.
        issues.sort_by(|a, b| b.severity.cmp(&a.severity));

        let mut seen = HashSet::new();
        vulnerabilities.retain(|v| seen.insert((v.package_name.clone(), v.vulnerability.id.clone())));
        vulnerabilities.sort_by(crate::scanner::security::compare_issues);

        let health_score = health_score(&self.weights, &issues, &vulnerabilities);

        AnalysisResult {
            health_score,
            issues,
            security_vulnerabilities: vulnerabilities,
            package_manager: ctx.adapter.kind(),
            project: project_info(ctx),
        }
    }
}

fn is_well_formed(scanner: ScannerKind, issue: &DependencyIssue) -> bool {
    !issue.package_name.trim().is_empty()
        && !issue.description.trim().is_empty()
        && issue.kind == scanner.issue_kind()
}

fn is_well_formed_vulnerability(vuln: &SecurityIssue) -> bool {
    let score = vuln.vulnerability.cvss_score;
    !vuln.package_name.trim().is_empty()
        && !vuln.version.trim().is_empty()
        && !vuln.vulnerability.id.trim().is_empty()
        && score.is_finite()
        && (0.0..=10.0).contains(&score)
}

/// Keep one issue per `(package_name, kind)`: the most severe, and on ties
/// the non-fixable one before the first seen. The kept issue is fixable only
/// if every issue folded into it was.
pub fn dedup_issues(issues: Vec<DependencyIssue>) -> Vec<DependencyIssue> {
    let mut kept: Vec<DependencyIssue> = Vec::with_capacity(issues.len());
    for issue in issues {
        match kept
            .iter_mut()
            .find(|k| k.package_name == issue.package_name && k.kind == issue.kind)
        {
            Some(existing) => {
                let fixable = existing.fixable && issue.fixable;
                let replaces = issue.severity > existing.severity
                    || (issue.severity == existing.severity && existing.fixable && !issue.fixable);
                if replaces {
                    *existing = issue;
                }
                existing.fixable = fixable;
            }
            None => kept.push(issue),
        }
    }
    kept
}

/// `100 - Σ penalties`, clamped to `0..=100` and rounded.
pub fn health_score(
    weights: &ScoreWeights,
    issues: &[DependencyIssue],
    vulnerabilities: &[SecurityIssue],
) -> u8 {
    let penalty: f64 = issues.iter().map(|i| weights.issue(i.severity)).sum::<f64>()
        + vulnerabilities
            .iter()
            .map(|v| weights.vulnerability(v.severity))
            .sum::<f64>();
    let score = (100.0 - penalty).clamp(0.0, 100.0);
    if score.is_nan() {
        return 0;
    }
    score.round() as u8
}

fn project_info(ctx: &ScanContext) -> ProjectInfo {
    ProjectInfo {
        name: ctx.manifest.name.clone().unwrap_or_else(|| "unnamed".to_string()),
        version: ctx.manifest.version.clone().unwrap_or_else(|| "0.0.0".to_string()),
        path: ctx.project_path.clone(),
        dependency_count: ctx.manifest.dependencies.len(),
        dev_dependency_count: ctx.manifest.dev_dependencies.len(),
        installed_count: ctx.installed.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IssueKind, SecuritySeverity, Severity, Vulnerability};
    use crate::fixer::AutoFixer;
    use crate::scanner::testing::{context, manifest};

    fn issue(kind: IssueKind, name: &str, severity: Severity) -> DependencyIssue {
        DependencyIssue::new(kind, name, severity, format!("{} problem", name))
    }

    fn vuln(name: &str, id: &str, severity: SecuritySeverity, cvss: f64) -> SecurityIssue {
        SecurityIssue {
            package_name: name.to_string(),
            version: "1.0.0".to_string(),
            vulnerability: Vulnerability {
                id: id.to_string(),
                title: id.to_string(),
                description: String::new(),
                cvss_score: cvss,
                cwe_list: vec![],
                references: vec![],
            },
            severity,
            fixed_in_version: None,
            patch_available: false,
        }
    }

    fn analyzer() -> DependencyAnalyzer {
        DependencyAnalyzer::new(ScannerRegistry::new(), ScoreWeights::default())
    }

    #[test]
    fn test_aggregate_dedups_sorts_and_scores() {
        let ctx = context(manifest(&[], &[]), vec![]);
        let results = vec![
            ScanResult {
                scanner: ScannerKind::Missing,
                issues: vec![
                    issue(IssueKind::Missing, "a", Severity::Low),
                    issue(IssueKind::Missing, "b", Severity::Critical),
                ],
                security_issues: vec![],
            },
            ScanResult {
                scanner: ScannerKind::PeerConflict,
                issues: vec![
                    issue(IssueKind::PeerConflict, "react", Severity::Medium),
                    issue(IssueKind::PeerConflict, "react", Severity::High),
                ],
                security_issues: vec![],
            },
        ];

        let result = analyzer().aggregate(&ctx, results);
        let summary: Vec<(&str, Severity)> = result
            .issues
            .iter()
            .map(|i| (i.package_name.as_str(), i.severity))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("b", Severity::Critical),
                ("react", Severity::High),
                ("a", Severity::Low)
            ]
        );
        // 100 - 20 - 10 - 2
        assert_eq!(result.health_score, 68);
        assert_eq!(result.project.name, "fixture");
    }

    #[test]
    fn test_malformed_entries_are_dropped() {
        let ctx = context(manifest(&[], &[]), vec![]);
        let results = vec![
            ScanResult {
                scanner: ScannerKind::Missing,
                issues: vec![
                    issue(IssueKind::Missing, "", Severity::High),
                    issue(IssueKind::Outdated, "wrong-kind", Severity::High),
                    DependencyIssue::new(IssueKind::Missing, "nodesc", Severity::High, "  "),
                    issue(IssueKind::Missing, "ok", Severity::High),
                ],
                security_issues: vec![],
            },
            ScanResult {
                scanner: ScannerKind::Security,
                issues: vec![],
                security_issues: vec![
                    vuln("lodash", "", SecuritySeverity::High, 7.0),
                    vuln("lodash", "GHSA-1", SecuritySeverity::High, 11.0),
                    vuln("lodash", "GHSA-2", SecuritySeverity::High, f64::NAN),
                    vuln("lodash", "GHSA-3", SecuritySeverity::High, 7.5),
                    vuln("lodash", "GHSA-3", SecuritySeverity::High, 7.5),
                ],
            },
        ];

        let result = analyzer().aggregate(&ctx, results);
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].package_name, "ok");
        assert_eq!(result.security_vulnerabilities.len(), 1);
        assert_eq!(result.security_vulnerabilities[0].vulnerability.id, "GHSA-3");
    }

    #[test]
    fn test_health_score_bounds() {
        let weights = ScoreWeights::default();
        assert_eq!(health_score(&weights, &[], &[]), 100);

        let many: Vec<_> = (0..20)
            .map(|i| issue(IssueKind::Missing, &format!("p{}", i), Severity::Critical))
            .collect();
        assert_eq!(health_score(&weights, &many, &[]), 0);

        let fractional = ScoreWeights {
            low: 2.6,
            ..ScoreWeights::default()
        };
        let low = vec![issue(IssueKind::Outdated, "x", Severity::Low)];
        assert_eq!(health_score(&fractional, &low, &[]), 97);

        let negative = ScoreWeights {
            low: -50.0,
            ..ScoreWeights::default()
        };
        assert_eq!(health_score(&negative, &low, &[]), 100);
    }

    #[test]
    fn test_no_duplicate_keys_after_dedup() {
        let issues = vec![
            issue(IssueKind::Broken, "x", Severity::Low),
            issue(IssueKind::Broken, "x", Severity::High),
            issue(IssueKind::Missing, "x", Severity::Medium),
            issue(IssueKind::Broken, "x", Severity::Medium),
        ];
        let kept = dedup_issues(issues);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].severity, Severity::High);
    }

    #[tokio::test]
    async fn test_analyze_end_to_end_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "demo", "version": "0.1.0",
                 "dependencies": { "express": "^4.0.0", "lodash": "^4.17.0" } }"#,
        )
        .unwrap();
        let express = dir.path().join("node_modules/express");
        std::fs::create_dir_all(&express).unwrap();
        std::fs::write(
            express.join("package.json"),
            r#"{ "name": "express", "version": "5.0.0" }"#,
        )
        .unwrap();

        let mut registry = ScannerRegistry::new();
        registry.register(Scanner::Missing(MissingScanner::new())).unwrap();
        registry
            .register(Scanner::VersionMismatch(VersionMismatchScanner::new()))
            .unwrap();
        let analyzer = DependencyAnalyzer::new(registry, ScoreWeights::default());

        let adapter = adapter::detect(dir.path(), Duration::from_secs(1));
        let result = analyzer.analyze_using(dir.path(), adapter, None).await.unwrap();

        assert_eq!(result.project.name, "demo");
        assert_eq!(result.project.installed_count, 1);
        assert_eq!(result.issues.len(), 2);
        assert_eq!(result.issues[0].kind, IssueKind::Missing);
        assert_eq!(result.issues[0].package_name, "lodash");
        assert_eq!(result.issues[1].kind, IssueKind::VersionMismatch);
        // 100 - 20 (critical missing) - 10 (major too-high mismatch)
        assert_eq!(result.health_score, 70);
    }

    #[test]
    fn test_dedup_keeps_unfixable_verdict() {
        let issues = vec![
            DependencyIssue::new(IssueKind::PeerConflict, "react", Severity::High, "react is not installed")
                .expected("^16.0.0"),
            DependencyIssue::new(IssueKind::PeerConflict, "react", Severity::High, "ranges cannot be met")
                .fixable(false),
            DependencyIssue::new(IssueKind::Outdated, "vue", Severity::Low, "vue is behind").fixable(false),
            DependencyIssue::new(IssueKind::Outdated, "vue", Severity::High, "vue is a major behind"),
        ];

        let kept = dedup_issues(issues);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].description, "ranges cannot be met");
        assert!(!kept[0].fixable);
        assert_eq!(kept[1].severity, Severity::High);
        assert!(!kept[1].fixable);
    }

    #[tokio::test]
    async fn test_unmet_incompatible_peer_is_not_fixable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("package.json"),
            r#"{ "name": "demo", "version": "0.1.0",
                 "dependencies": { "legacy-ui": "^1.0.0", "modern-ui": "^2.0.0" } }"#,
        )
        .unwrap();
        for (name, version, react) in [("legacy-ui", "1.0.0", "^16.0.0"), ("modern-ui", "2.0.0", "^18.0.0")] {
            let pkg = dir.path().join("node_modules").join(name);
            std::fs::create_dir_all(&pkg).unwrap();
            std::fs::write(
                pkg.join("package.json"),
                format!(
                    r#"{{ "name": "{}", "version": "{}", "peerDependencies": {{ "react": "{}" }} }}"#,
                    name, version, react
                ),
            )
            .unwrap();
        }

        let mut registry = ScannerRegistry::new();
        registry
            .register(Scanner::PeerConflict(PeerConflictScanner::new()))
            .unwrap();
        let analyzer = DependencyAnalyzer::new(registry, ScoreWeights::default());
        let adapter = adapter::detect(dir.path(), Duration::from_secs(1));
        let result = analyzer
            .analyze_using(dir.path(), adapter.clone(), None)
            .await
            .unwrap();

        let react: Vec<&DependencyIssue> = result
            .issues
            .iter()
            .filter(|i| i.package_name == "react")
            .collect();
        assert_eq!(react.len(), 1);
        assert_eq!(react[0].severity, Severity::High);
        assert!(!react[0].fixable);

        let fixes = AutoFixer::new(adapter, dir.path()).generate_fixes(&result);
        assert!(fixes
            .iter()
            .all(|f| f.actions.iter().all(|a| a.package_name.as_deref() != Some("react"))));
    }

    #[tokio::test]
    async fn test_analyze_errors() {
        let err = analyzer().analyze(Path::new("/no/such/project")).await.unwrap_err();
        assert!(matches!(err, DoctorError::ProjectNotFound(_)));

        let dir = tempfile::tempdir().unwrap();
        let err = analyzer().analyze(dir.path()).await.unwrap_err();
        assert!(matches!(err, DoctorError::ManifestMissing(_)));

        std::fs::write(dir.path().join("package.json"), "{}").unwrap();
        let err = analyzer()
            .analyze_with(dir.path(), Some(&[ScannerKind::Security]))
            .await
            .unwrap_err();
        assert!(matches!(err, DoctorError::UnknownScanner(ScannerKind::Security)));
    }
}
