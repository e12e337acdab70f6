use std::path::{Path, PathBuf};

/// Resolves the on-disk layout rooted at a configured home directory.
///
/// ```text
/// <home>/db.parquet
/// <home>/payloads/<uid>.json
/// <home>/daemon.log
/// <home>/daemon.pid
/// ```
#[derive(Debug, Clone)]
pub struct Home {
    root: PathBuf,
}

impl Home {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn db_path(&self) -> PathBuf {
        self.root.join("db.parquet")
    }

    pub fn payloads_dir(&self) -> PathBuf {
        self.root.join("payloads")
    }

    pub fn payload_path(&self, uid: &str) -> PathBuf {
        self.payloads_dir().join(format!("{uid}.json"))
    }

    pub fn daemon_log_path(&self) -> PathBuf {
        self.root.join("daemon.log")
    }

    pub fn daemon_pid_path(&self) -> PathBuf {
        self.root.join("daemon.pid")
    }
}
