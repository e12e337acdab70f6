use tq_remote::RemoteAdapter;

use crate::error::Error;
use crate::home::Home;
use crate::item::{QueueItem, ReportType};
use crate::payload::PayloadStore;
use crate::store::{Filter, QueueMetrics, QueueStore};

/// Programmatic operations used by the CLI: add, list, update, purge.
///
/// Each call constructs its own short-lived [`QueueStore`] rather than
/// relying on a process-wide singleton — the daemon is the only long-lived
/// owner of a store.
pub struct Admin {
    home: Home,
    payloads: PayloadStore,
}

impl Admin {
    pub fn new(home: Home) -> Self {
        let payloads = PayloadStore::new(home.clone());
        Self { home, payloads }
    }

    fn store(&self) -> Result<QueueStore, Error> {
        let mut store = QueueStore::new(self.home.clone());
        store.load()?;
        Ok(store)
    }

    /// Builds an item and writes it through the store.
    pub fn add(
        &self,
        name: impl Into<String>,
        payload: &[u8],
        report_type: ReportType,
        priority: i64,
    ) -> Result<QueueItem, Error> {
        let item = QueueItem::new(name, payload, report_type, priority, &self.payloads)?;
        let mut store = self.store()?;
        store.insert(item.clone());
        store.flush()?;
        Ok(item)
    }

    pub fn list(&self, filter: &Filter) -> Result<Vec<QueueItem>, Error> {
        Ok(self.store()?.filter(filter))
    }

    pub fn list_next(&self, n: usize) -> Result<Vec<QueueItem>, Error> {
        Ok(self.store()?.next(n))
    }

    /// Loads the item, applies `update`, flushes.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &self,
        uid: &str,
        name: Option<String>,
        priority: Option<i64>,
        cancel: Option<bool>,
        payload: Option<&[u8]>,
    ) -> Result<QueueItem, Error> {
        let mut store = self.store()?;
        let mut item = store
            .get(uid)
            .cloned()
            .ok_or_else(|| Error::IllegalTransition(format!("no such item {uid}")))?;
        item.update(name, priority, cancel, payload, &self.payloads)?;
        store.upsert(vec![item.clone()], true)?;
        Ok(item)
    }

    pub fn describe(&self) -> Result<QueueMetrics, Error> {
        Ok(self.store()?.describe())
    }

    /// Empties the store and deletes all auxiliary files: the database, the
    /// daemon log, and the payload directory.
    pub fn purge(&self) -> Result<(), Error> {
        let mut store = self.store()?;
        store.purge(true)?;
        let log_path = self.home.daemon_log_path();
        if log_path.exists() {
            std::fs::remove_file(&log_path).map_err(|e| Error::io(&log_path, e))?;
        }
        Ok(())
    }

    /// Administrative passthrough to the remote adapter's `cancel`, for
    /// operator cleanup of a job already accepted by the remote.
    pub fn cancel_remote(
        &self,
        adapter: &dyn RemoteAdapter,
        remote_job_id: i64,
    ) -> Result<(), Error> {
        adapter.cancel(remote_job_id).map_err(Error::from)
    }

    /// Administrative passthrough to the remote adapter's `delete`.
    pub fn delete_remote(
        &self,
        adapter: &dyn RemoteAdapter,
        remote_job_id: i64,
    ) -> Result<(), Error> {
        adapter.delete(remote_job_id).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin() -> (tempfile::TempDir, Admin) {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(dir.path());
        (dir, Admin::new(home))
    }

    #[test]
    fn add_then_list_next_returns_it() {
        let (_dir, admin) = admin();
        let item = admin
            .add("job", b"{}", ReportType::RouteAnalysis, 5)
            .unwrap();
        let next = admin.list_next(1).unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].uid, item.uid);
    }

    #[test]
    fn add_is_idempotent_for_identical_payload() {
        let (_dir, admin) = admin();
        admin.add("job", b"{}", ReportType::RouteAnalysis, 5).unwrap();
        admin.add("job", b"{}", ReportType::RouteAnalysis, 5).unwrap();
        let all = admin.list(&Filter::default()).unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn update_cancel_then_restore() {
        let (_dir, admin) = admin();
        let item = admin
            .add("job", b"{}", ReportType::RouteAnalysis, 5)
            .unwrap();
        let cancelled = admin
            .update(&item.uid, None, None, Some(true), None)
            .unwrap();
        assert!(cancelled.cancelled_ts.is_some());
        assert!(admin.list_next(5).unwrap().is_empty());

        admin
            .update(&item.uid, None, None, Some(false), None)
            .unwrap();
        assert_eq!(admin.list_next(5).unwrap().len(), 1);
    }

    #[test]
    fn purge_empties_everything() {
        let (_dir, admin) = admin();
        admin.add("job", b"{}", ReportType::RouteAnalysis, 5).unwrap();
        admin.purge().unwrap();
        assert!(admin.list(&Filter::default()).unwrap().is_empty());
    }
}
