use std::path::PathBuf;

/// Semantic error kinds raised by the core (queue store, queue item, admin
/// surface). See each call site's doc comment for when a kind applies.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// `update()`/`submit()`/`cancel()`/`complete()` called while the item was
    /// in a status the operation does not permit.
    #[error("illegal transition: {0}")]
    IllegalTransition(String),

    /// `update()` called with every field left unset.
    #[error("update() requires at least one field")]
    EmptyUpdate,

    /// The payload blob was gone for an item whose status still expects it.
    #[error("payload missing for uid {uid} at {path}")]
    PayloadMissing { uid: String, path: PathBuf },

    /// Any filesystem trouble reading or writing the store, a payload blob,
    /// the pid file, or the log file.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The on-disk table could not be decoded as the expected columnar shape.
    #[error("corrupt queue table at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    /// Raised by the remote adapter, passed through unchanged.
    #[error(transparent)]
    Remote(#[from] tq_remote::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
