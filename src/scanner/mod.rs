//! Dependency scanners.
//!
//! Every scanner consumes the same read-only [`ScanContext`] and produces one
//! [`ScanResult`]. The set of scanners is closed: [`Scanner`] is an enum with
//! one variant per [`ScannerKind`], and the [`ScannerRegistry`] keys them by kind.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use log::warn;
use serde::{Deserialize, Serialize};

use crate::adapter::PackageManagerAdapter;
use crate::error::DoctorError;
use crate::manifest::Manifest;
use crate::models::{InstalledPackage, IssueKind, Lockfile, ScanResult};

pub mod broken;
pub mod missing;
pub mod outdated;
pub mod peer_conflict;
pub mod registry;
pub mod security;
pub mod version_mismatch;

pub use broken::BrokenScanner;
pub use missing::MissingScanner;
pub use outdated::OutdatedScanner;
pub use peer_conflict::PeerConflictScanner;
pub use registry::ScannerRegistry;
pub use security::SecurityScanner;
pub use version_mismatch::VersionMismatchScanner;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ScannerKind {
    Missing,
    Broken,
    VersionMismatch,
    PeerConflict,
    Outdated,
    Security,
}

impl ScannerKind {
    pub const ALL: [ScannerKind; 6] = [
        ScannerKind::Missing,
        ScannerKind::Broken,
        ScannerKind::VersionMismatch,
        ScannerKind::PeerConflict,
        ScannerKind::Outdated,
        ScannerKind::Security,
    ];

    /// The issue kind this scanner produces.
    pub fn issue_kind(self) -> IssueKind {
        match self {
            ScannerKind::Missing => IssueKind::Missing,
            ScannerKind::Broken => IssueKind::Broken,
            ScannerKind::VersionMismatch => IssueKind::VersionMismatch,
            ScannerKind::PeerConflict => IssueKind::PeerConflict,
            ScannerKind::Outdated => IssueKind::Outdated,
            ScannerKind::Security => IssueKind::Security,
        }
    }

    /// Scanners that reach out to the network.
    pub fn is_online(self) -> bool {
        matches!(self, ScannerKind::Outdated | ScannerKind::Security)
    }
}

impl std::fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScannerKind::Missing => write!(f, "missing"),
            ScannerKind::Broken => write!(f, "broken"),
            ScannerKind::VersionMismatch => write!(f, "version-mismatch"),
            ScannerKind::PeerConflict => write!(f, "peer-conflict"),
            ScannerKind::Outdated => write!(f, "outdated"),
            ScannerKind::Security => write!(f, "security"),
        }
    }
}

impl std::str::FromStr for ScannerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ScannerKind::ALL
            .into_iter()
            .find(|kind| kind.to_string() == s)
            .ok_or_else(|| format!("unknown scanner `{}`", s))
    }
}

/// Immutable snapshot of one project, built once per run and shared by all scanners.
pub struct ScanContext {
    pub project_path: PathBuf,
    pub manifest: Manifest,
    pub lockfile: Option<Lockfile>,
    pub installed: Vec<InstalledPackage>,
    pub adapter: Arc<dyn PackageManagerAdapter>,
}

impl ScanContext {
    /// Snapshot `project`. Fails only if the project or its manifest is unusable;
    /// an absent or broken lockfile is logged and left out.
    pub fn load(project: &Path, adapter: Arc<dyn PackageManagerAdapter>) -> Result<Self, DoctorError> {
        if !project.is_dir() {
            return Err(DoctorError::ProjectNotFound(project.to_path_buf()));
        }
        let manifest = Manifest::load(project)?;

        let lockfile = match adapter.read_lockfile(project) {
            Ok(lockfile) => Some(lockfile),
            Err(e) => {
                warn!("{}", e);
                None
            }
        };
        let installed = adapter.installed_packages(project).unwrap_or_else(|e| {
            warn!("could not list installed packages: {}", e);
            Vec::new()
        });

        Ok(Self {
            project_path: project.to_path_buf(),
            manifest,
            lockfile,
            installed,
            adapter,
        })
    }

    pub fn installed(&self, name: &str) -> Option<&InstalledPackage> {
        self.installed.iter().find(|p| p.name == name)
    }

    /// Version of a valid installed package, taken from its own manifest or,
    /// when that has none, from the lockfile.
    pub fn installed_version(&self, name: &str) -> Option<&str> {
        let pkg = self.installed(name).filter(|p| p.is_valid)?;
        if !pkg.version.is_empty() {
            return Some(pkg.version.as_str());
        }
        self.lockfile.as_ref()?.packages.get(name).map(String::as_str)
    }
}

/// The closed set of scanners.
pub enum Scanner {
    Outdated(OutdatedScanner),
    Missing(MissingScanner),
    VersionMismatch(VersionMismatchScanner),
    Broken(BrokenScanner),
    PeerConflict(PeerConflictScanner),
    Security(SecurityScanner),
    /// Fails on purpose, for exercising the registry's fault isolation.
    #[cfg(test)]
    Faulty { kind: ScannerKind, panic: bool },
}

impl Scanner {
    pub fn kind(&self) -> ScannerKind {
        match self {
            Scanner::Outdated(_) => ScannerKind::Outdated,
            Scanner::Missing(_) => ScannerKind::Missing,
            Scanner::VersionMismatch(_) => ScannerKind::VersionMismatch,
            Scanner::Broken(_) => ScannerKind::Broken,
            Scanner::PeerConflict(_) => ScannerKind::PeerConflict,
            Scanner::Security(_) => ScannerKind::Security,
            #[cfg(test)]
            Scanner::Faulty { kind, .. } => *kind,
        }
    }

    pub async fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        match self {
            Scanner::Outdated(s) => s.scan(ctx).await,
            Scanner::Missing(s) => s.scan(ctx),
            Scanner::VersionMismatch(s) => s.scan(ctx),
            Scanner::Broken(s) => s.scan(ctx).await,
            Scanner::PeerConflict(s) => s.scan(ctx).await,
            Scanner::Security(s) => s.scan(ctx).await,
            #[cfg(test)]
            Scanner::Faulty { kind, panic } => {
                if *panic {
                    panic!("{} scanner blew up", kind);
                }
                anyhow::bail!("{} scanner failed", kind)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in ScannerKind::ALL {
            assert_eq!(kind.to_string().parse::<ScannerKind>(), Ok(kind));
        }
        assert!("nope".parse::<ScannerKind>().is_err());
    }

    #[test]
    fn test_load_rejects_missing_project() {
        let adapter = Arc::new(testing::FakeAdapter::default());
        let err = ScanContext::load(Path::new("/definitely/not/here"), adapter).err().unwrap();
        assert!(matches!(err, DoctorError::ProjectNotFound(_)));
    }

    #[test]
    fn test_load_tolerates_missing_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("package.json"), r#"{ "name": "x", "version": "1.0.0" }"#)
            .unwrap();
        let adapter = Arc::new(testing::FakeAdapter::default());
        let ctx = ScanContext::load(dir.path(), adapter).unwrap();
        assert!(ctx.lockfile.is_none());
        assert!(ctx.installed.is_empty());
        assert_eq!(ctx.manifest.name.as_deref(), Some("x"));
    }
}
