use std::path::PathBuf;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One dependency-health finding produced by a scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependencyIssue {
    pub kind: IssueKind,
    pub package_name: String,
    pub current_version: Option<String>,
    pub expected_version: Option<String>,
    pub latest_version: Option<String>,
    pub severity: Severity,
    pub description: String,
    pub fixable: bool,
}

impl DependencyIssue {
    pub fn new(
        kind: IssueKind,
        package_name: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            package_name: package_name.into(),
            current_version: None,
            expected_version: None,
            latest_version: None,
            severity,
            description: description.into(),
            fixable: true,
        }
    }

    pub fn current(mut self, version: impl Into<String>) -> Self {
        self.current_version = Some(version.into());
        self
    }

    pub fn expected(mut self, version: impl Into<String>) -> Self {
        self.expected_version = Some(version.into());
        self
    }

    pub fn latest(mut self, version: impl Into<String>) -> Self {
        self.latest_version = Some(version.into());
        self
    }

    pub fn fixable(mut self, fixable: bool) -> Self {
        self.fixable = fixable;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum IssueKind {
    Outdated,
    Missing,
    Broken,
    PeerConflict,
    VersionMismatch,
    Security,
}

impl std::fmt::Display for IssueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IssueKind::Outdated => write!(f, "outdated"),
            IssueKind::Missing => write!(f, "missing"),
            IssueKind::Broken => write!(f, "broken"),
            IssueKind::PeerConflict => write!(f, "peer-conflict"),
            IssueKind::VersionMismatch => write!(f, "version-mismatch"),
            IssueKind::Security => write!(f, "security"),
        }
    }
}

/// Severity of a [`DependencyIssue`]. Ordered so that `Critical` is the greatest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Severity scale used by advisories. Note `Moderate` rather than `Medium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SecuritySeverity {
    Low,
    Moderate,
    High,
    Critical,
}

impl SecuritySeverity {
    /// Map a CVSS base score onto a severity tier.
    pub fn from_cvss(score: f64) -> Self {
        if score >= 9.0 {
            SecuritySeverity::Critical
        } else if score >= 7.0 {
            SecuritySeverity::High
        } else if score >= 4.0 {
            SecuritySeverity::Moderate
        } else {
            SecuritySeverity::Low
        }
    }

    /// One tier up, saturating at `Critical`.
    pub fn escalate(self) -> Self {
        match self {
            SecuritySeverity::Low => SecuritySeverity::Moderate,
            SecuritySeverity::Moderate => SecuritySeverity::High,
            SecuritySeverity::High | SecuritySeverity::Critical => SecuritySeverity::Critical,
        }
    }
}

impl std::fmt::Display for SecuritySeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecuritySeverity::Low => write!(f, "low"),
            SecuritySeverity::Moderate => write!(f, "moderate"),
            SecuritySeverity::High => write!(f, "high"),
            SecuritySeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vulnerability {
    pub id: String,
    pub title: String,
    pub description: String,
    /// CVSS base score in `0.0..=10.0`.
    pub cvss_score: f64,
    pub cwe_list: Vec<String>,
    pub references: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityIssue {
    pub package_name: String,
    pub version: String,
    pub vulnerability: Vulnerability,
    pub severity: SecuritySeverity,
    pub fixed_in_version: Option<String>,
    pub patch_available: bool,
}

/// Output of one scanner invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub scanner: crate::scanner::ScannerKind,
    pub issues: Vec<DependencyIssue>,
    pub security_issues: Vec<SecurityIssue>,
}

impl ScanResult {
    pub fn empty(scanner: crate::scanner::ScannerKind) -> Self {
        Self {
            scanner,
            issues: Vec::new(),
            security_issues: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.security_issues.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PackageManagerType {
    Npm,
    Yarn,
    Pnpm,
}

impl std::fmt::Display for PackageManagerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PackageManagerType::Npm => write!(f, "npm"),
            PackageManagerType::Yarn => write!(f, "yarn"),
            PackageManagerType::Pnpm => write!(f, "pnpm"),
        }
    }
}

/// Summary of the analysed project, taken from its manifest and inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    pub dependency_count: usize,
    pub dev_dependency_count: usize,
    pub installed_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Always within `0..=100`.
    pub health_score: u8,
    pub issues: Vec<DependencyIssue>,
    pub security_vulnerabilities: Vec<SecurityIssue>,
    pub package_manager: PackageManagerType,
    pub project: ProjectInfo,
}

impl AnalysisResult {
    pub fn has_critical(&self) -> bool {
        self.issues.iter().any(|i| i.severity == Severity::Critical)
            || self
                .security_vulnerabilities
                .iter()
                .any(|v| v.severity == SecuritySeverity::Critical)
    }
}

/// The role a dependency plays in the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyRole {
    Regular,
    Dev,
    Peer,
    Optional,
}

impl std::fmt::Display for DependencyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyRole::Regular => write!(f, "dependencies"),
            DependencyRole::Dev => write!(f, "devDependencies"),
            DependencyRole::Peer => write!(f, "peerDependencies"),
            DependencyRole::Optional => write!(f, "optionalDependencies"),
        }
    }
}

/// A package found on disk in the install directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub path: PathBuf,
    /// `false` when the package directory has no readable manifest of its own.
    /// `version` is empty when that manifest has no `version` field.
    pub is_valid: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lockfile {
    pub kind: PackageManagerType,
    pub content: String,
    pub path: PathBuf,
    /// Resolved `name -> version` pairs pulled out of `content`.
    pub packages: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixKind {
    InstallMissing,
    UpdateOutdated,
    RegenerateLockfile,
    ResolveConflict,
}

impl std::fmt::Display for FixKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixKind::InstallMissing => write!(f, "install"),
            FixKind::UpdateOutdated => write!(f, "update"),
            FixKind::RegenerateLockfile => write!(f, "regenerate-lockfile"),
            FixKind::ResolveConflict => write!(f, "resolve-conflict"),
        }
    }
}

/// Risk grade attached to a fix. Governs confirmation and rollback.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixActionKind {
    Install,
    Update,
    RegenerateLockfile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAction {
    pub kind: FixActionKind,
    pub package_name: Option<String>,
    pub version: Option<String>,
}

impl FixAction {
    pub fn install(name: &str, version: Option<&str>) -> Self {
        Self {
            kind: FixActionKind::Install,
            package_name: Some(name.to_string()),
            version: version.map(str::to_string),
        }
    }

    pub fn update(name: &str, version: &str) -> Self {
        Self {
            kind: FixActionKind::Update,
            package_name: Some(name.to_string()),
            version: Some(version.to_string()),
        }
    }

    pub fn regenerate_lockfile() -> Self {
        Self {
            kind: FixActionKind::RegenerateLockfile,
            package_name: None,
            version: None,
        }
    }
}

impl std::fmt::Display for FixAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.kind, &self.package_name, &self.version) {
            (FixActionKind::RegenerateLockfile, _, _) => write!(f, "regenerate lockfile"),
            (FixActionKind::Install, Some(name), Some(v)) => write!(f, "install {}@{}", name, v),
            (FixActionKind::Install, Some(name), None) => write!(f, "install {}", name),
            (FixActionKind::Update, Some(name), Some(v)) => write!(f, "update {}@{}", name, v),
            (kind, name, _) => write!(f, "{:?} {}", kind, name.as_deref().unwrap_or("?")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSuggestion {
    pub kind: FixKind,
    pub description: String,
    pub risk: RiskLevel,
    pub actions: Vec<FixAction>,
    pub estimated_impact: String,
}

/// The manifest snapshot taken before any mutating action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub timestamp: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixApplicationResult {
    pub success: bool,
    pub applied_fixes: Vec<FixSuggestion>,
    pub errors: Vec<String>,
    pub backup: Option<BackupInfo>,
    /// Set when a critical failure restored the manifest from `backup`.
    pub rolled_back: bool,
}
