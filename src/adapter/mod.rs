//! Package-manager adapters.
//!
//! Scanners and the fixer only see the [`PackageManagerAdapter`] capability
//! set. [`CommandAdapter`] implements it for npm, yarn and pnpm by reading
//! their files directly and shelling out for mutations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::AdapterError;
use crate::models::{InstalledPackage, Lockfile, PackageManagerType};

pub mod command;
pub mod inventory;
pub mod lockfile;

pub use command::CommandAdapter;

pub trait PackageManagerAdapter: Send + Sync {
    fn kind(&self) -> PackageManagerType;

    /// Fails when the lockfile is absent, unparsable, or lacks required fields.
    fn read_lockfile(&self, project: &Path) -> Result<Lockfile, AdapterError>;

    /// Empty when there is no install directory. Entries without their own
    /// manifest come back with `is_valid = false`.
    fn installed_packages(&self, project: &Path) -> Result<Vec<InstalledPackage>, AdapterError>;

    fn install_package(&self, name: &str, version: Option<&str>) -> Result<(), AdapterError>;

    fn update_package(&self, name: &str, version: &str) -> Result<(), AdapterError>;

    fn regenerate_lockfile(&self) -> Result<(), AdapterError>;
}

/// Pick the package manager from the lockfile present in `project`.
pub fn detect_package_manager(project: &Path) -> PackageManagerType {
    if project.join(lockfile::PNPM_LOCK).exists() {
        PackageManagerType::Pnpm
    } else if project.join(lockfile::YARN_LOCK).exists() {
        PackageManagerType::Yarn
    } else {
        PackageManagerType::Npm
    }
}

/// Build the adapter matching the project on disk.
pub fn detect(project: &Path, command_timeout: Duration) -> Arc<dyn PackageManagerAdapter> {
    let kind = detect_package_manager(project);
    Arc::new(CommandAdapter::new(kind, project, command_timeout))
}
