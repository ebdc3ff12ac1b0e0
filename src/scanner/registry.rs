use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, warn};

use super::{Scanner, ScannerKind, ScanContext};
use crate::error::DoctorError;
use crate::models::ScanResult;

/// Holds at most one scanner per kind and runs them concurrently.
#[derive(Default)]
pub struct ScannerRegistry {
    scanners: BTreeMap<ScannerKind, Arc<Scanner>>,
}

impl ScannerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, scanner: Scanner) -> Result<(), DoctorError> {
        let kind = scanner.kind();
        if self.scanners.contains_key(&kind) {
            return Err(DoctorError::DuplicateScanner(kind));
        }
        self.scanners.insert(kind, Arc::new(scanner));
        Ok(())
    }

    pub fn kinds(&self) -> Vec<ScannerKind> {
        self.scanners.keys().copied().collect()
    }

    pub fn get(&self, kind: ScannerKind) -> Option<&Scanner> {
        self.scanners.get(&kind).map(Arc::as_ref)
    }

    /// Run every registered scanner.
    pub async fn run_all(&self, ctx: Arc<ScanContext>) -> Vec<ScanResult> {
        let selected: Vec<Arc<Scanner>> = self.scanners.values().cloned().collect();
        run_isolated(selected, ctx).await
    }

    /// Run the requested scanners. Asking for an unregistered kind is an error.
    pub async fn run(
        &self,
        kinds: &[ScannerKind],
        ctx: Arc<ScanContext>,
    ) -> Result<Vec<ScanResult>, DoctorError> {
        let mut selected = Vec::new();
        for kind in kinds {
            let scanner = self
                .scanners
                .get(kind)
                .ok_or(DoctorError::UnknownScanner(*kind))?;
            if !selected.iter().any(|s: &Arc<Scanner>| s.kind() == *kind) {
                selected.push(Arc::clone(scanner));
            }
        }
        Ok(run_isolated(selected, ctx).await)
    }
}

/// Spawn each scanner as its own task. A scanner that errors or panics is
/// logged and contributes nothing; its siblings are unaffected. Empty results
/// are dropped.
async fn run_isolated(scanners: Vec<Arc<Scanner>>, ctx: Arc<ScanContext>) -> Vec<ScanResult> {
    let handles: Vec<_> = scanners
        .into_iter()
        .map(|scanner| {
            let ctx = Arc::clone(&ctx);
            let kind = scanner.kind();
            let handle = tokio::spawn(async move { scanner.scan(&ctx).await });
            (kind, handle)
        })
        .collect();

    let (kinds, tasks): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
    let outcomes = join_all(tasks).await;

    kinds
        .into_iter()
        .zip(outcomes)
        .map(|(kind, outcome)| match outcome {
            Ok(Ok(result)) => {
                debug!(
                    "{} scanner: {} issues, {} vulnerabilities",
                    kind,
                    result.issues.len(),
                    result.security_issues.len()
                );
                result
            }
            Ok(Err(e)) => {
                warn!("{} scanner failed: {:#}", kind, e);
                ScanResult::empty(kind)
            }
            Err(e) => {
                warn!("{} scanner aborted: {}", kind, e);
                ScanResult::empty(kind)
            }
        })
        .filter(|result| !result.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::testing::{context, installed, manifest};
    use crate::scanner::{MissingScanner, VersionMismatchScanner};

    fn sample_context() -> Arc<ScanContext> {
        Arc::new(context(
            manifest(&[("express", "^4.0.0"), ("lodash", "^4.17.0")], &[]),
            vec![installed("express", "5.0.0")],
        ))
    }

    #[test]
    fn test_duplicate_registration_is_rejected() {
        let mut registry = ScannerRegistry::new();
        registry.register(Scanner::Missing(MissingScanner::new())).unwrap();
        let err = registry
            .register(Scanner::Missing(MissingScanner::new()))
            .unwrap_err();
        assert!(matches!(err, DoctorError::DuplicateScanner(ScannerKind::Missing)));
        assert_eq!(registry.kinds(), vec![ScannerKind::Missing]);
    }

    #[tokio::test]
    async fn test_run_all_collects_every_scanner() {
        let mut registry = ScannerRegistry::new();
        registry.register(Scanner::Missing(MissingScanner::new())).unwrap();
        registry
            .register(Scanner::VersionMismatch(VersionMismatchScanner::new()))
            .unwrap();

        let results = registry.run_all(sample_context()).await;
        let kinds: Vec<_> = results.iter().map(|r| r.scanner).collect();
        assert_eq!(kinds, vec![ScannerKind::Missing, ScannerKind::VersionMismatch]);
    }

    #[tokio::test]
    async fn test_failing_scanner_is_isolated() {
        for panic in [false, true] {
            let mut registry = ScannerRegistry::new();
            registry.register(Scanner::Missing(MissingScanner::new())).unwrap();
            registry
                .register(Scanner::VersionMismatch(VersionMismatchScanner::new()))
                .unwrap();
            registry
                .register(Scanner::Faulty {
                    kind: ScannerKind::Security,
                    panic,
                })
                .unwrap();

            let results = registry.run_all(sample_context()).await;
            assert_eq!(results.len(), 2);
            let missing = results
                .iter()
                .find(|r| r.scanner == ScannerKind::Missing)
                .unwrap();
            assert_eq!(missing.issues[0].package_name, "lodash");
            assert!(results.iter().all(|r| r.scanner != ScannerKind::Security));
        }
    }

    #[tokio::test]
    async fn test_run_subset_and_unknown_kind() {
        let mut registry = ScannerRegistry::new();
        registry.register(Scanner::Missing(MissingScanner::new())).unwrap();
        registry
            .register(Scanner::VersionMismatch(VersionMismatchScanner::new()))
            .unwrap();

        let results = registry
            .run(&[ScannerKind::VersionMismatch], sample_context())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].scanner, ScannerKind::VersionMismatch);

        let err = registry
            .run(&[ScannerKind::Outdated], sample_context())
            .await
            .unwrap_err();
        assert!(matches!(err, DoctorError::UnknownScanner(ScannerKind::Outdated)));
    }

    #[tokio::test]
    async fn test_empty_results_are_elided() {
        let mut registry = ScannerRegistry::new();
        registry.register(Scanner::Missing(MissingScanner::new())).unwrap();
        let ctx = Arc::new(context(manifest(&[], &[]), vec![]));
        assert!(registry.run_all(ctx).await.is_empty());
    }
}
