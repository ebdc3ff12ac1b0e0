use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;
use serde_json::Value;
use serde_yaml::Value as YamlValue;

use crate::error::AdapterError;
use crate::models::{Lockfile, PackageManagerType};

pub const NPM_LOCK: &str = "package-lock.json";
pub const YARN_LOCK: &str = "yarn.lock";
pub const PNPM_LOCK: &str = "pnpm-lock.yaml";

pub fn lockfile_name(kind: PackageManagerType) -> &'static str {
    match kind {
        PackageManagerType::Npm => NPM_LOCK,
        PackageManagerType::Yarn => YARN_LOCK,
        PackageManagerType::Pnpm => PNPM_LOCK,
    }
}

/// Read and validate the lockfile for `kind` in `project`.
pub fn read(kind: PackageManagerType, project: &Path) -> Result<Lockfile, AdapterError> {
    let path = project.join(lockfile_name(kind));
    if !path.is_file() {
        return Err(AdapterError::LockfileMissing(path));
    }
    let content = std::fs::read_to_string(&path)?;

    let packages = match kind {
        PackageManagerType::Npm => parse_package_lock(&content),
        PackageManagerType::Yarn => parse_yarn_lock(&content),
        PackageManagerType::Pnpm => parse_pnpm_lock(&content),
    }
    .map_err(|reason| AdapterError::LockfileParse {
        path: path.clone(),
        reason,
    })?;

    Ok(Lockfile {
        kind,
        content,
        path,
        packages,
    })
}

/// Parse `package-lock.json` v1 (`dependencies`) or v2/v3 (`packages`).
fn parse_package_lock(content: &str) -> Result<BTreeMap<String, String>, String> {
    let json: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
    if json.get("lockfileVersion").is_none() {
        return Err("missing required field `lockfileVersion`".to_string());
    }

    let mut packages = BTreeMap::new();

    if let Some(entries) = json.get("packages").and_then(|v| v.as_object()) {
        for (pkg_path, info) in entries {
            // Skip the root entry and nested installs
            if pkg_path.is_empty() || pkg_path.matches("node_modules/").count() != 1 {
                continue;
            }
            let name = pkg_path.trim_start_matches("node_modules/");
            if let Some(version) = info.get("version").and_then(|v| v.as_str()) {
                packages.insert(name.to_string(), version.to_string());
            }
        }
    } else if let Some(entries) = json.get("dependencies").and_then(|v| v.as_object()) {
        for (name, info) in entries {
            if let Some(version) = info.get("version").and_then(|v| v.as_str()) {
                packages.insert(name.clone(), version.to_string());
            }
        }
    }

    Ok(packages)
}

/// Parse `yarn.lock`. Classic (v1) files use a YAML-like format of their
/// own; berry files are plain YAML with a `__metadata` entry.
fn parse_yarn_lock(content: &str) -> Result<BTreeMap<String, String>, String> {
    if content.contains("__metadata:") {
        parse_yarn_berry_lock(content)
    } else {
        parse_yarn_classic_lock(content)
    }
}

/// Classic headers are `"name@range", "name@range2":` followed by an
/// indented `version "x.y.z"` line.
fn parse_yarn_classic_lock(content: &str) -> Result<BTreeMap<String, String>, String> {
    let header_re = Regex::new(r#"^"?(@?[^@"\s]+)@[^"]*"?(,.*)?:$"#).map_err(|e| e.to_string())?;
    let version_re = Regex::new(r#"^\s+version\s+"?([^"\s]+)"?"#).map_err(|e| e.to_string())?;

    let mut packages = BTreeMap::new();
    let mut current: Option<String> = None;
    let mut saw_header = content.contains("# yarn lockfile");

    for line in content.lines() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if !line.starts_with(' ') && !line.starts_with('\t') {
            current = header_re.captures(line).map(|caps| caps[1].to_string());
            continue;
        }
        if let (Some(name), Some(caps)) = (&current, version_re.captures(line)) {
            packages.insert(name.clone(), caps[1].to_string());
            saw_header = true;
            current = None;
        }
    }

    if !saw_header {
        return Err("no yarn lockfile header or package entries".to_string());
    }
    Ok(packages)
}

/// Berry keys are comma-separated descriptors such as
/// `"@babel/core@npm:^7.0.0, @babel/core@npm:^7.12.3"`.
fn parse_yarn_berry_lock(content: &str) -> Result<BTreeMap<String, String>, String> {
    let doc: YamlValue = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let entries = doc
        .as_mapping()
        .ok_or_else(|| "yarn.lock is not a mapping".to_string())?;

    let mut packages = BTreeMap::new();
    for (key, entry) in entries {
        let Some(key) = key.as_str() else { continue };
        if key == "__metadata" {
            continue;
        }
        let descriptor = key.split(", ").next().unwrap_or(key).trim_matches('"');
        if descriptor.contains("@workspace:") {
            continue;
        }
        let (Some(name), Some(version)) = (
            split_at_version(descriptor).map(|(name, _)| name),
            entry.get("version").and_then(YamlValue::as_str),
        ) else {
            continue;
        };
        packages.insert(name.to_string(), version.to_string());
    }
    Ok(packages)
}

/// Parse the `packages` keys of `pnpm-lock.yaml`. Key shapes depend on the
/// lockfile version:
///
/// - v5: `/react-dom/17.0.2_react@17.0.2`
/// - v6: `/react-dom@17.0.2(react@17.0.2)`
/// - v9: `react-dom@17.0.2`
fn parse_pnpm_lock(content: &str) -> Result<BTreeMap<String, String>, String> {
    let doc: YamlValue = serde_yaml::from_str(content).map_err(|e| e.to_string())?;
    let major = doc
        .get("lockfileVersion")
        .and_then(|v| match v {
            YamlValue::Number(n) => n.as_f64(),
            YamlValue::String(s) => s.parse::<f64>().ok(),
            _ => None,
        })
        .ok_or_else(|| "missing required field `lockfileVersion`".to_string())?
        .trunc() as u64;

    let mut packages = BTreeMap::new();
    let Some(entries) = doc.get("packages").and_then(YamlValue::as_mapping) else {
        return Ok(packages);
    };

    for key in entries.keys().filter_map(YamlValue::as_str) {
        let parsed = if major < 6 {
            pnpm_v5_key(key)
        } else {
            pnpm_key(key)
        };
        if let Some((name, version)) = parsed {
            if version.starts_with(|c: char| c.is_ascii_digit()) {
                packages.insert(name.to_string(), version.to_string());
            }
        }
    }
    Ok(packages)
}

fn pnpm_v5_key(key: &str) -> Option<(&str, &str)> {
    let key = key.strip_prefix('/').unwrap_or(key);
    let name_end = if key.starts_with('@') {
        let scope_end = key.find('/')?;
        scope_end + 1 + key[scope_end + 1..].find('/')?
    } else {
        key.find('/')?
    };
    let (name, rest) = key.split_at(name_end);
    let version = rest.strip_prefix('/')?;
    let version = version.split('_').next().unwrap_or(version);
    Some((name, version))
}

fn pnpm_key(key: &str) -> Option<(&str, &str)> {
    let key = key.strip_prefix('/').unwrap_or(key);
    let key = key.split('(').next().unwrap_or(key);
    split_at_version(key)
}

/// Split `name@rest` at the `@` that ends the name, skipping a leading
/// scope `@`.
fn split_at_version(descriptor: &str) -> Option<(&str, &str)> {
    let at = descriptor.get(1..)?.find('@')? + 1;
    Some((&descriptor[..at], &descriptor[at + 1..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_lock_v3() {
        let json = r#"{
  "name": "my-app",
  "lockfileVersion": 3,
  "packages": {
    "": { "name": "my-app", "version": "1.0.0" },
    "node_modules/express": { "version": "4.18.2" },
    "node_modules/@types/node": { "version": "20.1.0" },
    "node_modules/express/node_modules/debug": { "version": "2.6.9" }
  }
}"#;
        let packages = parse_package_lock(json).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages["express"], "4.18.2");
        assert_eq!(packages["@types/node"], "20.1.0");
    }

    #[test]
    fn test_package_lock_requires_version_field() {
        let err = parse_package_lock(r#"{ "name": "x" }"#).unwrap_err();
        assert!(err.contains("lockfileVersion"));
    }

    #[test]
    fn test_parse_yarn_lock_classic() {
        let lock = r#"# THIS IS AN AUTOGENERATED FILE. DO NOT EDIT THIS FILE DIRECTLY.
# yarn lockfile v1


"@babel/code-frame@^7.0.0", "@babel/code-frame@^7.10.4":
  version "7.12.13"
  resolved "https://registry.yarnpkg.com/@babel/code-frame/-/code-frame-7.12.13.tgz"

lodash@^4.17.21:
  version "4.17.21"
"#;
        let packages = parse_yarn_lock(lock).unwrap();
        assert_eq!(packages["@babel/code-frame"], "7.12.13");
        assert_eq!(packages["lodash"], "4.17.21");
    }

    #[test]
    fn test_parse_yarn_lock_garbage() {
        assert!(parse_yarn_lock("hello world").is_err());
    }

    #[test]
    fn test_parse_yarn_berry_lock() {
        let lock = r#"# This file is generated by running "yarn install" inside your project.

__metadata:
  version: 6
  cacheKey: 8

"@babel/code-frame@npm:^7.0.0, @babel/code-frame@npm:^7.10.4":
  version: 7.12.13
  resolution: "@babel/code-frame@npm:7.12.13"
  dependencies:
    "@babel/highlight": ^7.12.13
  checksum: 471532bb7c
  languageName: node
  linkType: hard

"lodash@npm:^4.17.21":
  version: 4.17.21
  resolution: "lodash@npm:4.17.21"
  languageName: node
  linkType: hard

"my-app@workspace:.":
  version: 0.0.0-use.local
  resolution: "my-app@workspace:."
  languageName: unknown
  linkType: soft
"#;
        let packages = parse_yarn_lock(lock).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages["@babel/code-frame"], "7.12.13");
        assert_eq!(packages["lodash"], "4.17.21");
    }

    #[test]
    fn test_parse_yarn_berry_lock_invalid_yaml() {
        assert!(parse_yarn_lock("__metadata:\n  version: [6\n").is_err());
    }

    #[test]
    fn test_parse_pnpm_lock() {
        let lock = "lockfileVersion: '6.0'\n\ndependencies:\n  lodash:\n    specifier: ^4.17.21\n    version: 4.17.21\n\npackages:\n\n  /lodash@4.17.21:\n    resolution: {integrity: sha512-x}\n    dev: false\n\n  /@types/node@20.1.0:\n    dev: true\n";
        let packages = parse_pnpm_lock(lock).unwrap();
        assert_eq!(packages["lodash"], "4.17.21");
        assert_eq!(packages["@types/node"], "20.1.0");
    }

    #[test]
    fn test_parse_pnpm_lock_peer_suffixes() {
        let v5 = r#"lockfileVersion: 5.4

packages:

  /react-dom/17.0.2_react@17.0.2:
    resolution: {integrity: sha512-a}
    peerDependencies:
      react: 17.0.2

  /@testing-library/react/12.1.5_sfoxds7t5ydpegc3knd667wn6m:
    resolution: {integrity: sha512-b}

  /react/17.0.2:
    resolution: {integrity: sha512-c}
"#;
        let packages = parse_pnpm_lock(v5).unwrap();
        assert_eq!(packages.len(), 3);
        assert_eq!(packages["react-dom"], "17.0.2");
        assert_eq!(packages["@testing-library/react"], "12.1.5");
        assert_eq!(packages["react"], "17.0.2");

        let v6 = r#"lockfileVersion: '6.0'

packages:

  /react-dom@17.0.2(react@17.0.2):
    resolution: {integrity: sha512-a}

  /@testing-library/react@12.1.5(react-dom@17.0.2)(react@17.0.2):
    resolution: {integrity: sha512-b}
"#;
        let packages = parse_pnpm_lock(v6).unwrap();
        assert_eq!(packages["react-dom"], "17.0.2");
        assert_eq!(packages["@testing-library/react"], "12.1.5");

        let v9 = r#"lockfileVersion: '9.0'

packages:

  react-dom@17.0.2:
    resolution: {integrity: sha512-a}
    peerDependencies:
      react: 17.0.2

  '@types/node@20.1.0':
    resolution: {integrity: sha512-d}

snapshots:

  react-dom@17.0.2(react@17.0.2):
    dependencies:
      react: 17.0.2
"#;
        let packages = parse_pnpm_lock(v9).unwrap();
        assert_eq!(packages.len(), 2);
        assert_eq!(packages["react-dom"], "17.0.2");
        assert_eq!(packages["@types/node"], "20.1.0");
    }

    #[test]
    fn test_pnpm_lock_requires_version_field() {
        let err = parse_pnpm_lock("packages:\n  /lodash@4.17.21:\n    dev: false\n").unwrap_err();
        assert!(err.contains("lockfileVersion"));
    }

    #[test]
    fn test_read_missing_lockfile() {
        let dir = tempfile::tempdir().unwrap();
        let err = read(PackageManagerType::Npm, dir.path()).unwrap_err();
        assert!(matches!(err, AdapterError::LockfileMissing(_)));
    }
}
