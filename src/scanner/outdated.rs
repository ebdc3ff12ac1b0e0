use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use futures::future::join_all;
use log::debug;

use super::{ScanContext, ScannerKind};
use crate::models::{DependencyIssue, IssueKind, ScanResult, Severity};
use crate::registry::VersionSource;
use crate::version::{delta, parse_version, VersionDelta};

const DEFAULT_BATCH_SIZE: usize = 32;

/// Compares installed versions against the latest published ones.
///
/// Lookups are cached per package name for the lifetime of the scanner,
/// across scans, until [`OutdatedScanner::clear_cache`] is called. Failed
/// lookups are not cached.
pub struct OutdatedScanner {
    source: Arc<dyn VersionSource>,
    cache: DashMap<String, String>,
    batch_size: usize,
}

impl OutdatedScanner {
    pub fn new(source: Arc<dyn VersionSource>) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cached(&self, name: &str) -> Option<String> {
        self.cache.get(name).map(|v| v.value().clone())
    }

    async fn latest(&self, name: &str) -> Option<String> {
        if let Some(hit) = self.cached(name) {
            return Some(hit);
        }
        match self.source.latest_version(name).await {
            Ok(Some(version)) => {
                self.cache.insert(name.to_string(), version.clone());
                Some(version)
            }
            Ok(None) => {
                debug!("registry has no latest version for {}", name);
                None
            }
            Err(e) => {
                debug!("latest-version lookup for {} failed: {:#}", name, e);
                None
            }
        }
    }

    pub async fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        let targets: Vec<(&str, &str, &str)> = ctx
            .manifest
            .installable()
            .into_iter()
            .filter_map(|d| {
                ctx.installed_version(d.name)
                    .map(|version| (d.name, d.range, version))
            })
            .collect();

        let mut issues = Vec::new();
        for batch in targets.chunks(self.batch_size) {
            let lookups = batch.iter().map(|(name, _, _)| self.latest(name));
            let results = join_all(lookups).await;

            for ((name, range, current), latest) in batch.iter().zip(results) {
                let Some(latest) = latest else { continue };
                let Some(severity) = outdated_severity(current, &latest) else {
                    continue;
                };
                let ahead = is_ahead(current, &latest);
                let relation = if ahead { "ahead of" } else { "behind" };
                issues.push(
                    DependencyIssue::new(
                        IssueKind::Outdated,
                        *name,
                        severity,
                        format!("{} {} is {} the latest release {}", name, current, relation, latest),
                    )
                    .current(*current)
                    .expected(*range)
                    .latest(latest)
                    .fixable(!ahead),
                );
            }
        }

        Ok(ScanResult {
            scanner: ScannerKind::Outdated,
            issues,
            security_issues: Vec::new(),
        })
    }
}

/// `None` when `current` is the latest release. An install ahead of the
/// latest tag, a prerelease or a yanked release for instance, is `Low`.
fn outdated_severity(current: &str, latest: &str) -> Option<Severity> {
    match (parse_version(current), parse_version(latest)) {
        (Some(current), Some(latest)) if latest > current => Some(match delta(&current, &latest) {
            VersionDelta::Major => Severity::High,
            VersionDelta::Minor => Severity::Medium,
            _ => Severity::Low,
        }),
        (Some(current), Some(latest)) if latest < current => Some(Severity::Low),
        (Some(_), Some(_)) => None,
        _ if current != latest => Some(Severity::Low),
        _ => None,
    }
}

fn is_ahead(current: &str, latest: &str) -> bool {
    matches!(
        (parse_version(current), parse_version(latest)),
        (Some(current), Some(latest)) if current > latest
    )
}
