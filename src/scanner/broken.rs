use std::io::ErrorKind;
use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use super::{ScanContext, ScannerKind};
use crate::models::{DependencyIssue, InstalledPackage, IssueKind, ScanResult, Severity};

/// Structural problem found in one installed package. The first one found
/// stops further checks on that package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    MissingDirectory,
    MissingManifest,
    UnparsableManifest(String),
    IncompleteManifest(&'static str),
    NameMismatch(String),
    MissingEntryPoint(String),
    UnreadableNestedModules,
    PermissionDenied(String),
}

impl Defect {
    fn describe(&self, name: &str) -> String {
        match self {
            Defect::MissingDirectory => format!("{} is listed as installed but its directory is gone", name),
            Defect::MissingManifest => format!("{} has no package.json", name),
            Defect::UnparsableManifest(e) => format!("{} has an unparsable package.json: {}", name, e),
            Defect::IncompleteManifest(field) => {
                format!("{} package.json is missing the `{}` field", name, field)
            }
            Defect::NameMismatch(actual) => {
                format!("{} directory contains package `{}`", name, actual)
            }
            Defect::MissingEntryPoint(main) => {
                format!("{} main entry point `{}` does not exist", name, main)
            }
            Defect::UnreadableNestedModules => {
                format!("{} has an unreadable nested node_modules directory", name)
            }
            Defect::PermissionDenied(what) => format!("{} cannot be read: permission denied on {}", name, what),
        }
    }
}

/// Verifies the on-disk integrity of each installed package.
#[derive(Debug, Default)]
pub struct BrokenScanner;

impl BrokenScanner {
    pub fn new() -> Self {
        Self
    }

    pub async fn scan(&self, ctx: &ScanContext) -> Result<ScanResult> {
        let mut issues = Vec::new();

        for pkg in &ctx.installed {
            match inspect(pkg).await {
                Err(defect) => {
                    let mut issue = DependencyIssue::new(
                        IssueKind::Broken,
                        pkg.name.as_str(),
                        Severity::High,
                        defect.describe(&pkg.name),
                    )
                    .current(pkg.version.as_str());
                    // Only declared packages can be reinstalled by name.
                    if let Some(range) = ctx.manifest.range_for(&pkg.name) {
                        issue = issue.expected(range);
                    }
                    issues.push(issue);
                }
                Ok(missing_docs) if !missing_docs.is_empty() => issues.push(
                    DependencyIssue::new(
                        IssueKind::Broken,
                        pkg.name.as_str(),
                        Severity::Low,
                        format!("{} ships without {}", pkg.name, missing_docs.join(" or ")),
                    )
                    .current(pkg.version.as_str())
                    .fixable(false),
                ),
                Ok(_) => {}
            }
        }

        Ok(ScanResult {
            scanner: ScannerKind::Broken,
            issues,
            security_issues: Vec::new(),
        })
    }
}

/// Run the structural checks in order. On success, returns the names of
/// missing documentation files.
pub async fn inspect(pkg: &InstalledPackage) -> Result<Vec<&'static str>, Defect> {
    let dir = &pkg.path;
    match tokio::fs::metadata(dir).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => return Err(Defect::MissingDirectory),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Defect::PermissionDenied(dir.display().to_string()))
        }
        Err(_) => return Err(Defect::MissingDirectory),
    }

    let manifest_path = dir.join("package.json");
    let content = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(Defect::MissingManifest),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            return Err(Defect::PermissionDenied(manifest_path.display().to_string()))
        }
        Err(e) => return Err(Defect::UnparsableManifest(e.to_string())),
    };
    let manifest: Value =
        serde_json::from_str(&content).map_err(|e| Defect::UnparsableManifest(e.to_string()))?;

    let name = manifest
        .get("name")
        .and_then(|v| v.as_str())
        .ok_or(Defect::IncompleteManifest("name"))?;
    if manifest.get("version").and_then(|v| v.as_str()).is_none() {
        return Err(Defect::IncompleteManifest("version"));
    }
    if name != pkg.name {
        return Err(Defect::NameMismatch(name.to_string()));
    }

    if let Some(main) = manifest.get("main").and_then(|v| v.as_str()) {
        if !entry_point_exists(dir, main).await {
            return Err(Defect::MissingEntryPoint(main.to_string()));
        }
    }

    let nested = dir.join("node_modules");
    if tokio::fs::metadata(&nested).await.is_ok() && tokio::fs::read_dir(&nested).await.is_err() {
        return Err(Defect::UnreadableNestedModules);
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Err(Defect::PermissionDenied(dir.display().to_string())),
    };
    let mut has_readme = false;
    let mut has_license = false;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let file = entry.file_name().to_string_lossy().to_ascii_lowercase();
        has_readme |= file.starts_with("readme");
        has_license |= file.starts_with("license") || file.starts_with("licence");
    }

    let mut missing = Vec::new();
    if !has_readme {
        missing.push("README");
    }
    if !has_license {
        missing.push("LICENSE");
    }
    Ok(missing)
}

/// Node resolves `main` as a file, then with `.js`, then as a directory index.
async fn entry_point_exists(dir: &Path, main: &str) -> bool {
    let base = dir.join(main);
    let candidates = [
        base.clone(),
        base.with_extension("js"),
        base.join("index.js"),
    ];
    for candidate in candidates {
        if let Ok(meta) = tokio::fs::metadata(&candidate).await {
            if meta.is_file() {
                return true;
            }
        }
    }
    false
}
