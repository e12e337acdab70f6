use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Pid-file guarded single-instance lifecycle.
///
/// Mirrors the original Unix daemon contract without double-forking: a
/// live process already holding the pid file refuses a second `start`; a
/// pid file whose process is gone is treated as stale and replaced.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_pid(&self) -> Result<Option<i32>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.trim().parse::<i32>().ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("reading pid file {}", self.path.display())),
        }
    }

    fn is_alive(pid: i32) -> bool {
        // signal 0 performs no-op permission/existence checks only.
        unsafe { libc::kill(pid, 0) == 0 }
    }

    /// `None` means no daemon is running (pid file absent or stale).
    pub fn status(&self) -> Result<Option<i32>> {
        match self.read_pid()? {
            Some(pid) if Self::is_alive(pid) => Ok(Some(pid)),
            _ => Ok(None),
        }
    }

    /// Claims the pid file for `pid`, replacing a stale file. Errors if a
    /// live process already owns it.
    pub fn claim(&self, pid: i32) -> Result<()> {
        if let Some(existing) = self.status()? {
            anyhow::bail!("daemon already running with pid {existing}");
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&self.path, format!("{pid}\n"))
            .with_context(|| format!("writing pid file {}", self.path.display()))
    }

    pub fn release(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing pid file {}", self.path.display())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_status_reports_self() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("daemon.pid"));
        let pid = std::process::id() as i32;
        pidfile.claim(pid).unwrap();
        assert_eq!(pidfile.status().unwrap(), Some(pid));
    }

    #[test]
    fn stale_pid_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daemon.pid");
        fs::write(&path, "999999\n").unwrap();
        let pidfile = PidFile::new(&path);
        assert_eq!(pidfile.status().unwrap(), None);
        pidfile.claim(std::process::id() as i32).unwrap();
    }

    #[test]
    fn release_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = PidFile::new(dir.path().join("daemon.pid"));
        pidfile.release().unwrap();
        pidfile.claim(std::process::id() as i32).unwrap();
        pidfile.release().unwrap();
        pidfile.release().unwrap();
        assert!(pidfile.status().unwrap().is_none());
    }
}
