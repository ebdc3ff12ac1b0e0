use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};

use crate::models::BackupInfo;

/// A timestamped copy of the manifest, taken before anything is mutated.
/// The copy is kept after the run whatever the outcome.
#[derive(Debug)]
pub struct ManifestBackup {
    info: BackupInfo,
}

impl ManifestBackup {
    /// Copy `manifest` to `<name>.<timestamp>.bak`, in `backup_dir` if given
    /// and next to the manifest otherwise.
    pub fn create(manifest: &Path, backup_dir: Option<&Path>) -> Result<Self> {
        let timestamp = Local::now();
        let dir = match backup_dir {
            Some(dir) => {
                fs::create_dir_all(dir)
                    .with_context(|| format!("creating backup directory {}", dir.display()))?;
                dir.to_path_buf()
            }
            None => manifest
                .parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        };
        let file_name = manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "package.json".to_string());
        let stamp = timestamp.format("%Y%m%d-%H%M%S%.3f").to_string();

        let mut backup_path = dir.join(format!("{}.{}.bak", file_name, stamp));
        let mut n = 1;
        while backup_path.exists() {
            backup_path = dir.join(format!("{}.{}-{}.bak", file_name, stamp, n));
            n += 1;
        }

        fs::copy(manifest, &backup_path)
            .with_context(|| format!("backing up {}", manifest.display()))?;
        info!("backed up {} to {}", manifest.display(), backup_path.display());

        Ok(Self {
            info: BackupInfo {
                original_path: manifest.to_path_buf(),
                backup_path,
                timestamp,
            },
        })
    }

    pub fn info(&self) -> &BackupInfo {
        &self.info
    }

    /// Copy the backup back over the manifest.
    pub fn restore(&self) -> Result<()> {
        fs::copy(&self.info.backup_path, &self.info.original_path).with_context(|| {
            format!(
                "restoring {} from {}",
                self.info.original_path.display(),
                self.info.backup_path.display()
            )
        })?;
        info!("restored {}", self.info.original_path.display());
        Ok(())
    }
}

/// Restores the manifest when dropped, unless [`disarm`](Self::disarm)ed.
///
/// Held across a critical-risk fix so that every way out of it, a panic
/// included, either commits or rolls back.
pub struct RollbackGuard<'a> {
    backup: &'a ManifestBackup,
    armed: bool,
}

impl<'a> RollbackGuard<'a> {
    pub fn new(backup: &'a ManifestBackup) -> Self {
        Self {
            backup,
            armed: true,
        }
    }

    /// Keep the changes.
    pub fn disarm(mut self) {
        self.armed = false;
    }

    /// Restore now and report how it went.
    pub fn rollback(mut self) -> Result<()> {
        self.armed = false;
        self.backup.restore()
    }
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = self.backup.restore() {
                warn!("rollback failed: {:#}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_restore() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, r#"{"name":"a"}"#).unwrap();

        let backup = ManifestBackup::create(&manifest, None).unwrap();
        let info = backup.info();
        assert_eq!(info.original_path, manifest);
        assert_eq!(info.backup_path.parent(), Some(dir.path()));
        assert!(info
            .backup_path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("package.json."));

        fs::write(&manifest, r#"{"name":"b"}"#).unwrap();
        backup.restore().unwrap();
        assert_eq!(fs::read_to_string(&manifest).unwrap(), r#"{"name":"a"}"#);
    }

    #[test]
    fn test_backups_never_overwrite_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, "{}").unwrap();
        let first = ManifestBackup::create(&manifest, None).unwrap();
        let second = ManifestBackup::create(&manifest, None).unwrap();
        assert_ne!(first.info().backup_path, second.info().backup_path);
    }

    #[test]
    fn test_backup_dir_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, "{}").unwrap();
        let target = dir.path().join("backups/nested");
        let backup = ManifestBackup::create(&manifest, Some(&target)).unwrap();
        assert_eq!(backup.info().backup_path.parent(), Some(target.as_path()));
    }

    #[test]
    fn test_missing_manifest_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ManifestBackup::create(&dir.path().join("package.json"), None).is_err());
    }

    #[test]
    fn test_guard_restores_unless_disarmed() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = dir.path().join("package.json");
        fs::write(&manifest, "original").unwrap();
        let backup = ManifestBackup::create(&manifest, None).unwrap();

        {
            let _guard = RollbackGuard::new(&backup);
            fs::write(&manifest, "mutated").unwrap();
        }
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "original");

        let guard = RollbackGuard::new(&backup);
        fs::write(&manifest, "kept").unwrap();
        guard.disarm();
        assert_eq!(fs::read_to_string(&manifest).unwrap(), "kept");
    }
}
