use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::DoctorError;
use crate::models::DependencyRole;

pub const MANIFEST_FILE: &str = "package.json";

/// The subset of `package.json` the doctor cares about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub dev_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub peer_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    pub optional_dependencies: BTreeMap<String, String>,
}

/// A declared dependency together with the section it was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Declared<'a> {
    pub name: &'a str,
    pub range: &'a str,
    pub role: DependencyRole,
}

impl Manifest {
    pub fn path(project: &Path) -> PathBuf {
        project.join(MANIFEST_FILE)
    }

    /// Read `<project>/package.json`.
    pub fn load(project: &Path) -> Result<Self, DoctorError> {
        let path = Self::path(project);
        if !path.is_file() {
            return Err(DoctorError::ManifestMissing(path));
        }
        let content = std::fs::read_to_string(&path)?;
        Self::parse(&content).map_err(|e| DoctorError::ManifestParse {
            path,
            reason: e.to_string(),
        })
    }

    pub fn parse(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    pub fn section(&self, role: DependencyRole) -> &BTreeMap<String, String> {
        match role {
            DependencyRole::Regular => &self.dependencies,
            DependencyRole::Dev => &self.dev_dependencies,
            DependencyRole::Peer => &self.peer_dependencies,
            DependencyRole::Optional => &self.optional_dependencies,
        }
    }

    /// All declared dependencies in section order: regular, dev, peer, optional.
    /// A name declared in several sections appears once per section.
    pub fn declared(&self) -> impl Iterator<Item = Declared<'_>> {
        [
            DependencyRole::Regular,
            DependencyRole::Dev,
            DependencyRole::Peer,
            DependencyRole::Optional,
        ]
        .into_iter()
        .flat_map(move |role| {
            self.section(role).iter().map(move |(name, range)| Declared {
                name,
                range,
                role,
            })
        })
    }

    /// Declared dependencies the project installs itself (peer sections excluded),
    /// first declaration wins.
    pub fn installable(&self) -> Vec<Declared<'_>> {
        let mut seen = std::collections::HashSet::new();
        self.declared()
            .filter(|d| d.role != DependencyRole::Peer)
            .filter(|d| seen.insert(d.name))
            .collect()
    }

    /// Range declared for `name`, searching sections in order.
    pub fn range_for(&self, name: &str) -> Option<&str> {
        self.declared().find(|d| d.name == name).map(|d| d.range)
    }
}
