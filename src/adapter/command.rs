use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use log::{debug, info};

use super::{inventory, lockfile, PackageManagerAdapter};
use crate::error::AdapterError;
use crate::models::{InstalledPackage, Lockfile, PackageManagerType};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Adapter that drives the `npm`, `yarn` or `pnpm` binary found on `PATH`.
pub struct CommandAdapter {
    kind: PackageManagerType,
    project: PathBuf,
    timeout: Duration,
}

impl CommandAdapter {
    pub fn new(kind: PackageManagerType, project: &Path, timeout: Duration) -> Self {
        Self {
            kind,
            project: project.to_path_buf(),
            timeout,
        }
    }

    fn program(&self) -> &'static str {
        match self.kind {
            PackageManagerType::Npm => "npm",
            PackageManagerType::Yarn => "yarn",
            PackageManagerType::Pnpm => "pnpm",
        }
    }

    fn add_args(&self, target: String) -> Vec<String> {
        match self.kind {
            PackageManagerType::Npm => vec!["install".into(), target],
            PackageManagerType::Yarn | PackageManagerType::Pnpm => vec!["add".into(), target],
        }
    }

    fn regenerate_args(&self) -> Vec<String> {
        match self.kind {
            PackageManagerType::Npm => vec!["install".into(), "--package-lock-only".into()],
            PackageManagerType::Yarn => vec!["install".into()],
            PackageManagerType::Pnpm => vec!["install".into(), "--lockfile-only".into()],
        }
    }

    /// Run the package manager, killing it once the timeout elapses.
    fn run(&self, args: &[String]) -> Result<(), AdapterError> {
        let command = format!("{} {}", self.program(), args.join(" "));
        info!("running `{}` in {}", command, self.project.display());

        let mut child = Command::new(self.program())
            .args(args)
            .current_dir(&self.project)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| AdapterError::Spawn {
                command: command.clone(),
                source,
            })?;

        // Drain stderr on a separate thread so a chatty child cannot block on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut buf = String::new();
                let _ = pipe.read_to_string(&mut buf);
                buf
            })
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                // Best effort; the process may have exited in between.
                let _ = child.kill();
                let _ = child.wait();
                return Err(AdapterError::CommandTimeout {
                    command,
                    secs: self.timeout.as_secs(),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if status.success() {
            debug!("`{}` finished", command);
            return Ok(());
        }

        let stderr = stderr_reader
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        Err(AdapterError::CommandFailed {
            command,
            code: status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string()),
            stderr: stderr.trim().to_string(),
        })
    }
}

impl PackageManagerAdapter for CommandAdapter {
    fn kind(&self) -> PackageManagerType {
        self.kind
    }

    fn read_lockfile(&self, project: &Path) -> Result<Lockfile, AdapterError> {
        lockfile::read(self.kind, project)
    }

    fn installed_packages(&self, project: &Path) -> Result<Vec<InstalledPackage>, AdapterError> {
        inventory::list_installed(project)
    }

    fn install_package(&self, name: &str, version: Option<&str>) -> Result<(), AdapterError> {
        let target = match version {
            Some(v) => format!("{}@{}", name, v),
            None => name.to_string(),
        };
        self.run(&self.add_args(target))
    }

    fn update_package(&self, name: &str, version: &str) -> Result<(), AdapterError> {
        self.run(&self.add_args(format!("{}@{}", name, version)))
    }

    fn regenerate_lockfile(&self) -> Result<(), AdapterError> {
        self.run(&self.regenerate_args())
    }
}
