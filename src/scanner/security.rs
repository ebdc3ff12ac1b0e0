use std::cmp::Ordering;
use std::sync::Arc;

use anyhow::Result;
use futures::future::join_all;
use log::debug;

use super::{ScanContext, ScannerKind};
use crate::models::{ScanResult, SecurityIssue, SecuritySeverity, Vulnerability};
use crate::registry::{Advisory, AdvisorySource};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Weakness classes (injection, deserialization and friends) that push an
/// advisory up one tier.
pub const HIGH_IMPACT_CWES: &[&str] = &[
    "CWE-77",   // command injection
    "CWE-78",   // OS command injection
    "CWE-79",   // cross-site scripting
    "CWE-89",   // SQL injection
    "CWE-94",   // code injection
    "CWE-95",   // eval injection
    "CWE-502",  // deserialization of untrusted data
    "CWE-611",  // XXE
    "CWE-918",  // SSRF
    "CWE-1321", // prototype pollution
];

/// Packages so widely depended on that any advisory against them is escalated.
pub const ECOSYSTEM_CRITICAL: &[&str] = &[
    "@babel/core",
    "axios",
    "body-parser",
    "express",
    "jsonwebtoken",
    "lodash",
    "minimist",
    "moment",
    "next",
    "node-fetch",
    "react",
    "react-dom",
    "request",
    "typescript",
    "webpack",
    "ws",
];

/// Looks up advisories for every installed declared package.
pub struct SecurityScanner {
    source: Arc<dyn AdvisorySource>,
    batch_size: usize,
}

impl SecurityScanner {
    pub fn new(source: Arc<dyn AdvisorySource>) -> Self {
        Self {
            source,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        let targets: Vec<(&str, &str)> = ctx
            .manifest
            .installable()
            .into_iter()
            .filter_map(|d| {
                ctx.installed_version(d.name)
                    .map(|version| (d.name, version))
            })
            .collect();

        let mut security_issues = Vec::new();
        for batch in targets.chunks(self.batch_size) {
            let lookups = batch
                .iter()
                .map(|(name, version)| self.source.advisories(name, version));
            let results = join_all(lookups).await;

            for ((name, version), result) in batch.iter().zip(results) {
                match result {
                    Ok(advisories) => security_issues.extend(
                        advisories
                            .into_iter()
                            .map(|advisory| to_issue(name, version, advisory)),
                    ),
                    Err(e) => debug!("advisory lookup for {}@{} failed: {:#}", name, version, e),
                }
            }
        }

        security_issues.sort_by(compare_issues);

        Ok(ScanResult {
            scanner: ScannerKind::Security,
            issues: Vec::new(),
            security_issues,
        })
    }
}

fn to_issue(name: &str, version: &str, advisory: Advisory) -> SecurityIssue {
    let cvss_score = if advisory.cvss_score.is_finite() {
        advisory.cvss_score.clamp(0.0, 10.0)
    } else {
        0.0
    };
    let patch_available = advisory.fixed_in.is_some();
    let vulnerability = Vulnerability {
        id: advisory.id,
        title: advisory.title,
        description: advisory.description,
        cvss_score,
        cwe_list: advisory.cwe_ids,
        references: advisory.references,
    };

    SecurityIssue {
        severity: grade(name, &vulnerability, patch_available),
        package_name: name.to_string(),
        version: version.to_string(),
        vulnerability,
        fixed_in_version: advisory.fixed_in,
        patch_available,
    }
}

/// CVSS tier, raised once if the flaw is unpatched and serious, belongs to a
/// high-impact weakness class, or sits in an ecosystem-critical package.
pub fn grade(package: &str, vulnerability: &Vulnerability, patch_available: bool) -> SecuritySeverity {
    let base = SecuritySeverity::from_cvss(vulnerability.cvss_score);

    let unpatched_serious = !patch_available && vulnerability.cvss_score >= 7.0;
    let high_impact = vulnerability
        .cwe_list
        .iter()
        .any(|cwe| HIGH_IMPACT_CWES.contains(&cwe.as_str()));
    let critical_package = ECOSYSTEM_CRITICAL.contains(&package);

    if unpatched_serious || high_impact || critical_package {
        base.escalate()
    } else {
        base
    }
}

/// Severity descending, then CVSS descending, then patched before unpatched.
pub fn compare_issues(a: &SecurityIssue, b: &SecurityIssue) -> Ordering {
    b.severity
        .cmp(&a.severity)
        .then_with(|| {
            b.vulnerability
                .cvss_score
                .partial_cmp(&a.vulnerability.cvss_score)
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.patch_available.cmp(&a.patch_available))
}
