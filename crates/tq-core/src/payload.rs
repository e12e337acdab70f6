use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Error;
use crate::home::Home;

/// Content-addressed on-disk blob store for opaque job descriptions.
///
/// One file per UID under `<home>/payloads/`. Contents are never
/// interpreted here; callers own the JSON shape.
pub struct PayloadStore {
    home: Home,
}

impl PayloadStore {
    pub fn new(home: Home) -> Self {
        Self { home }
    }

    /// Write `bytes` for `uid`, creating parent directories as needed, and
    /// return the path it was written to. Uses write-temp-then-rename so a
    /// reader never observes a partially-written file.
    pub fn put(&self, uid: &str, bytes: &[u8]) -> Result<PathBuf, Error> {
        let dir = self.home.payloads_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;

        let dest = self.home.payload_path(uid);
        let tmp = dest.with_extension("json.tmp");
        fs::write(&tmp, bytes).map_err(|e| Error::io(&tmp, e))?;
        fs::rename(&tmp, &dest).map_err(|e| Error::io(&dest, e))?;
        Ok(dest)
    }

    /// Read the blob at `path`. Returns `Ok(None)` if it does not exist.
    pub fn get(&self, path: &Path) -> Result<Option<Vec<u8>>, Error> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Remove the blob at `path`. Idempotent: a missing file is not an error.
    pub fn erase(&self, path: &Path) -> Result<(), Error> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, PayloadStore) {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(dir.path());
        (dir, PayloadStore::new(home))
    }

    #[test]
    fn put_then_get_roundtrips() {
        let (_dir, store) = store();
        let path = store.put("abc123", b"{\"x\":1}").unwrap();
        assert_eq!(store.get(&path).unwrap().unwrap(), b"{\"x\":1}");
    }

    #[test]
    fn get_missing_returns_none() {
        let (dir, store) = store();
        let missing = dir.path().join("payloads").join("nope.json");
        assert!(store.get(&missing).unwrap().is_none());
    }

    #[test]
    fn erase_is_idempotent() {
        let (_dir, store) = store();
        let path = store.put("abc123", b"{}").unwrap();
        store.erase(&path).unwrap();
        store.erase(&path).unwrap();
        assert!(store.get(&path).unwrap().is_none());
    }

    #[test]
    fn put_overwrites_atomically() {
        let (_dir, store) = store();
        let path = store.put("abc123", b"one").unwrap();
        let path2 = store.put("abc123", b"two").unwrap();
        assert_eq!(path, path2);
        assert_eq!(store.get(&path).unwrap().unwrap(), b"two");
    }
}
