use std::path::Path;

use serde_json::Value;

use crate::error::AdapterError;
use crate::models::InstalledPackage;

pub const INSTALL_DIR: &str = "node_modules";

/// List the top-level packages under `<project>/node_modules`, including
/// scoped `@scope/name` directories.
pub fn list_installed(project: &Path) -> Result<Vec<InstalledPackage>, AdapterError> {
    let root = project.join(INSTALL_DIR);
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut packages = Vec::new();
    for entry in std::fs::read_dir(&root)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !entry.path().is_dir() {
            continue;
        }

        if name.starts_with('@') {
            let Ok(scoped) = std::fs::read_dir(entry.path()) else {
                continue;
            };
            for inner in scoped.flatten() {
                if inner.path().is_dir() {
                    let inner_name = inner.file_name().to_string_lossy().into_owned();
                    packages.push(describe(&format!("{}/{}", name, inner_name), &inner.path()));
                }
            }
        } else {
            packages.push(describe(&name, &entry.path()));
        }
    }

    packages.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(packages)
}

/// A package is valid when its `package.json` reads and parses. A valid
/// manifest without a `version` yields an empty version.
fn describe(name: &str, dir: &Path) -> InstalledPackage {
    let manifest = read_manifest(&dir.join("package.json"));
    let version = manifest
        .as_ref()
        .and_then(|json| json.get("version"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    InstalledPackage {
        name: name.to_string(),
        is_valid: manifest.is_some(),
        version,
        path: dir.to_path_buf(),
    }
}

fn read_manifest(path: &Path) -> Option<Value> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}
