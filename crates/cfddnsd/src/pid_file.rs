//! Single-instance lock using a PID file
//!
//! Only the process holding the lock writes the preferences file. A PID
//! file left behind by a dead process is replaced; one naming a live
//! process makes the second instance fail fast.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

#[cfg(unix)]
use std::os::unix::fs::DirBuilderExt;

/// PID lock held for the lifetime of the daemon
#[derive(Debug)]
pub struct PidLock {
    path: PathBuf,
}

impl PidLock {
    /// Create the PID file at `path`
    ///
    /// Returns an error if another live process holds it.
    pub fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        create_parent(&path)?;

        // Second pass only after removing a stale file
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let pid = std::process::id();
                    writeln!(file, "{}", pid)
                        .with_context(|| format!("Failed to write PID file {}", path.display()))?;
                    tracing::debug!(pid, path = %path.display(), "PID lock acquired");
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    let holder = fs::read_to_string(&path)
                        .ok()
                        .and_then(|content| content.trim().parse::<u32>().ok());

                    if let Some(pid) = holder
                        && is_process_running(pid)
                    {
                        bail!(
                            "Another instance is already running (PID {}, lock {})",
                            pid,
                            path.display()
                        );
                    }

                    tracing::warn!(path = %path.display(), "Removing stale PID file");
                    fs::remove_file(&path).with_context(|| {
                        format!("Failed to remove stale PID file {}", path.display())
                    })?;
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to create PID file {}", path.display()));
                }
            }
        }

        bail!("PID file {} keeps reappearing", path.display())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            tracing::warn!(error = %e, path = %self.path.display(), "Failed to remove PID file");
        }
    }
}

fn create_parent(path: &Path) -> Result<()> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
        .create(parent)
        .with_context(|| format!("Failed to create PID directory {}", parent.display()))
}

#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    if pid <= 0 {
        return false;
    }

    // SAFETY: signal 0 performs the existence and permission checks only.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return true;
    }
    // EPERM: the process exists but belongs to someone else
    std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
fn is_process_running(_pid: u32) -> bool {
    false
}
