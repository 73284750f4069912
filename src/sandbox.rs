//! Per-instance sandbox directories.
//!
//! Each worker instance gets its own uniquely named temporary directory
//! holding the bridge store, the terminal config artifact and the captured
//! worker log. Sandbox lifetime tracks process lifetime: provisioned on
//! start, removed on stop and on application shutdown.

use rand::Rng;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FleetError, Result};

const PROVISION_ATTEMPTS: u32 = 8;

/// One instance's private working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sandbox {
    path: PathBuf,
}

impl Sandbox {
    /// Create a fresh, collision-free sandbox directory for a login
    pub fn provision(login: i64) -> Result<Self> {
        let base = std::env::temp_dir();
        let mut rng = rand::thread_rng();

        for _ in 0..PROVISION_ATTEMPTS {
            let suffix: u32 = rng.gen();
            let path = base.join(format!("termfleet-{login}-{suffix:08x}"));
            match fs::create_dir(&path) {
                Ok(()) => {
                    debug!("Provisioned sandbox {}", path.display());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(FleetError::Sandbox(format!(
                        "cannot create {}: {e}",
                        path.display()
                    )))
                }
            }
        }

        Err(FleetError::Sandbox(format!(
            "exhausted sandbox name attempts for login {login}"
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Captured stdout/stderr of the worker process
    pub fn log_path(&self) -> PathBuf {
        self.path.join("worker.log")
    }

    /// Remove the sandbox and everything in it.
    ///
    /// Removing an already-removed sandbox is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => {
                debug!("Removed sandbox {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => {
                warn!("Failed to remove sandbox {}: {e}", self.path.display());
                Err(FleetError::Sandbox(format!(
                    "cannot remove {}: {e}",
                    self.path.display()
                )))
            }
        }
    }
}
