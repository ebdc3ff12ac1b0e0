use std::collections::BTreeMap;

use anyhow::Result;
use log::debug;
use serde_json::Value;

use super::{ScanContext, ScannerKind};
use crate::models::{DependencyIssue, InstalledPackage, IssueKind, ScanResult, Severity};
use crate::version::{parse_version, ranges_compatible, NpmRange};

/// One installed package's requirement on a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRequirement {
    pub requirer: String,
    pub requirer_version: String,
    pub range: String,
    pub optional: bool,
}

/// Detects unmet, out-of-range and mutually incompatible peer dependencies.
#[derive(Debug, Default)]
pub struct PeerConflictScanner;

impl PeerConflictScanner {
    pub fn new() -> Self {
        Self
    }

    pub async fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        let peers = collect_requirements(&ctx.installed).await;
        let mut issues = Vec::new();

        for (peer, requirements) in &peers {
            match ctx.installed(peer).filter(|p| p.is_valid) {
                None => issues.extend(unmet_peer(peer, requirements)),
                Some(pkg) => issues.extend(out_of_range(peer, &pkg.version, requirements)),
            }
            issues.extend(incompatible_ranges(peer, requirements));
        }

        Ok(ScanResult {
            scanner: ScannerKind::PeerConflict,
            issues,
            security_issues: Vec::new(),
        })
    }
}

/// Read every installed package's own manifest and group its peer
/// requirements by peer name.
pub async fn collect_requirements(
    installed: &[InstalledPackage],
) -> BTreeMap<String, Vec<PeerRequirement>> {
    let mut peers: BTreeMap<String, Vec<PeerRequirement>> = BTreeMap::new();

    for pkg in installed.iter().filter(|p| p.is_valid) {
        let path = pkg.path.join("package.json");
        let manifest: Value = match tokio::fs::read_to_string(&path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(json) => json,
                Err(e) => {
                    debug!("skipping peers of {}: {}", pkg.name, e);
                    continue;
                }
            },
            Err(e) => {
                debug!("skipping peers of {}: {}", pkg.name, e);
                continue;
            }
        };

        let Some(declared) = manifest.get("peerDependencies").and_then(|v| v.as_object()) else {
            continue;
        };
        let meta = manifest
            .get("peerDependenciesMeta")
            .and_then(|v| v.as_object());

        for (peer, range) in declared {
            let Some(range) = range.as_str() else { continue };
            let optional = meta
                .and_then(|m| m.get(peer))
                .and_then(|m| m.get("optional"))
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            peers.entry(peer.clone()).or_default().push(PeerRequirement {
                requirer: pkg.name.clone(),
                requirer_version: pkg.version.clone(),
                range: range.to_string(),
                optional,
            });
        }
    }

    peers
}

fn requirers(requirements: &[&PeerRequirement]) -> String {
    requirements
        .iter()
        .map(|r| format!("{}@{} ({})", r.requirer, r.requirer_version, r.range))
        .collect::<Vec<_>>()
        .join(", ")
}

fn unmet_peer(peer: &str, requirements: &[PeerRequirement]) -> Option<DependencyIssue> {
    let required: Vec<&PeerRequirement> = requirements.iter().filter(|r| !r.optional).collect();
    if required.is_empty() {
        return None;
    }

    let mut distinct: Vec<&str> = required.iter().map(|r| r.requirer.as_str()).collect();
    distinct.sort_unstable();
    distinct.dedup();
    let severity = match distinct.len() {
        n if n >= 3 => Severity::Critical,
        2 => Severity::High,
        _ => Severity::Medium,
    };

    Some(
        DependencyIssue::new(
            IssueKind::PeerConflict,
            peer,
            severity,
            format!("peer dependency {} is not installed; required by {}", peer, requirers(&required)),
        )
        .expected(required[0].range.as_str()),
    )
}

fn out_of_range(peer: &str, installed: &str, requirements: &[PeerRequirement]) -> Option<DependencyIssue> {
    let version = parse_version(installed)?;
    let failing: Vec<&PeerRequirement> = requirements
        .iter()
        .filter(|r| NpmRange::parse(&r.range).is_some_and(|range| !range.satisfies(&version)))
        .collect();
    if failing.is_empty() {
        return None;
    }

    let severity = if requirements.iter().all(|r| r.optional) {
        Severity::Medium
    } else {
        Severity::High
    };

    Some(
        DependencyIssue::new(
            IssueKind::PeerConflict,
            peer,
            severity,
            format!(
                "installed {}@{} does not satisfy {}",
                peer,
                installed,
                requirers(&failing)
            ),
        )
        .current(installed)
        .expected(failing[0].range.as_str()),
    )
}

/// Compatibility is checked on a sample grid, see [`ranges_compatible`].
fn incompatible_ranges(peer: &str, requirements: &[PeerRequirement]) -> Option<DependencyIssue> {
    let mut distinct: Vec<&str> = requirements.iter().map(|r| r.range.as_str()).collect();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() < 2 {
        return None;
    }

    let parsed: Vec<NpmRange> = distinct.iter().filter_map(|r| NpmRange::parse(r)).collect();
    let refs: Vec<&NpmRange> = parsed.iter().collect();
    if refs.len() < 2 || ranges_compatible(&refs) {
        return None;
    }

    let all: Vec<&PeerRequirement> = requirements.iter().collect();
    Some(
        DependencyIssue::new(
            IssueKind::PeerConflict,
            peer,
            Severity::High,
            format!(
                "no single version of {} satisfies every requirer: {}",
                peer,
                requirers(&all)
            ),
        )
        .expected(distinct.join(" && "))
        .fixable(false),
    )
}
