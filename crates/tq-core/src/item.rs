use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tq_remote::{RemoteAdapter, RemoteState};

use crate::error::Error;
use crate::payload::PayloadStore;

/// Which remote endpoint a queue item's payload is submitted to.
///
/// Replaces the source's runtime-class-name dispatch with a tagged variant:
/// the adapter exposes one entry point per tag and never introspects the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportType {
    RouteAnalysis,
    AreaAnalysis,
    TrafficDensity,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReportType::RouteAnalysis => "ROUTE_ANALYSIS",
            ReportType::AreaAnalysis => "AREA_ANALYSIS",
            ReportType::TrafficDensity => "TRAFFIC_DENSITY",
        };
        f.write_str(s)
    }
}

impl FromStr for ReportType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROUTE_ANALYSIS" => Ok(ReportType::RouteAnalysis),
            "AREA_ANALYSIS" => Ok(ReportType::AreaAnalysis),
            "TRAFFIC_DENSITY" => Ok(ReportType::TrafficDensity),
            other => Err(format!("unknown report type {other:?}")),
        }
    }
}

/// Status is never stored; it is always derived from which timestamps are set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    IsWaiting,
    Submitted,
    Completed,
    Canceled,
    HasError,
}

/// One user request for a remote job.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub uid: String,
    pub name: String,
    pub report_type: ReportType,
    pub payload_ref: PathBuf,
    pub priority: i64,
    pub created_ts: DateTime<Utc>,
    pub updated_ts: Option<DateTime<Utc>>,
    pub submitted_ts: Option<DateTime<Utc>>,
    pub completed_ts: Option<DateTime<Utc>>,
    pub cancelled_ts: Option<DateTime<Utc>>,
    pub error_ts: Option<DateTime<Utc>>,
    pub remote_job_id: Option<i64>,
    /// Last error message observed, kept in memory only for logging; not a
    /// store column.
    pub last_error: Option<String>,
}

/// Digest `(payload, name)` into a stable 128-bit hex UID.
fn compute_uid(payload: &[u8], name: &str) -> String {
    let mut buf = Vec::with_capacity(payload.len() + name.len());
    buf.extend_from_slice(payload);
    buf.extend_from_slice(name.as_bytes());
    format!("{:x}", md5::compute(buf))
}

impl QueueItem {
    /// Builds a new item from a `(name, payload, priority)` triple and writes
    /// the payload through the payload store.
    pub fn new(
        name: impl Into<String>,
        payload: &[u8],
        report_type: ReportType,
        priority: i64,
        payload_store: &PayloadStore,
    ) -> Result<Self, Error> {
        let name = name.into();
        let uid = compute_uid(payload, &name);
        let payload_ref = payload_store.put(&uid, payload)?;
        Ok(Self {
            uid,
            name,
            report_type,
            payload_ref,
            priority,
            created_ts: Utc::now(),
            updated_ts: None,
            submitted_ts: None,
            completed_ts: None,
            cancelled_ts: None,
            error_ts: None,
            remote_job_id: None,
            last_error: None,
        })
    }

    /// Status derived from which timestamps are set; see precedence in the
    /// type's module doc.
    pub fn status(&self) -> Status {
        if self.error_ts.is_some() {
            Status::HasError
        } else if self.completed_ts.is_some() {
            Status::Completed
        } else if self.submitted_ts.is_some() {
            Status::Submitted
        } else if self.cancelled_ts.is_some() {
            Status::Canceled
        } else {
            Status::IsWaiting
        }
    }

    /// Permitted only from `IsWaiting` or `Canceled`. Requires at least one
    /// field to be supplied.
    #[allow(clippy::too_many_arguments)]
    pub fn update(
        &mut self,
        name: Option<String>,
        priority: Option<i64>,
        cancel: Option<bool>,
        payload: Option<&[u8]>,
        payload_store: &PayloadStore,
    ) -> Result<(), Error> {
        if !matches!(self.status(), Status::IsWaiting | Status::Canceled) {
            return Err(Error::IllegalTransition(format!(
                "update() not permitted in status {:?}",
                self.status()
            )));
        }
        if name.is_none() && priority.is_none() && cancel.is_none() && payload.is_none() {
            return Err(Error::EmptyUpdate);
        }

        if let Some(name) = name {
            self.name = name;
        }
        if let Some(priority) = priority {
            self.priority = priority;
        }
        if let Some(cancel) = cancel {
            self.cancelled_ts = if cancel { Some(Utc::now()) } else { None };
        }
        if let Some(payload) = payload {
            self.payload_ref = payload_store.put(&self.uid, payload)?;
        }
        self.updated_ts = Some(Utc::now());
        Ok(())
    }

    /// Requires status `IsWaiting`. Sets `submitted_ts` before calling the
    /// adapter so a crash right after the call cannot lose the intent to
    /// submit. A network error propagates to the caller unconverted; the
    /// daemon is responsible for turning it into `error()`.
    pub fn submit(
        &mut self,
        adapter: &dyn RemoteAdapter,
        payload_store: &PayloadStore,
    ) -> Result<(), Error> {
        if self.status() != Status::IsWaiting {
            return Err(Error::IllegalTransition(format!(
                "submit() not permitted in status {:?}",
                self.status()
            )));
        }

        let bytes = payload_store.get(&self.payload_ref)?.ok_or_else(|| {
            Error::PayloadMissing {
                uid: self.uid.clone(),
                path: self.payload_ref.clone(),
            }
        })?;
        let job: serde_json::Value = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Corrupt {
                path: self.payload_ref.clone(),
                source: e.into(),
            })?;

        self.submitted_ts = Some(Utc::now());

        let resp = match self.report_type {
            ReportType::RouteAnalysis => adapter.submit_route(&job),
            ReportType::AreaAnalysis => adapter.submit_area(&job),
            ReportType::TrafficDensity => adapter.submit_density(&job),
        }?;

        if resp.is_error() {
            self.error(Some(resp.messages.join("; ")));
        } else {
            self.remote_job_id = resp.job_id;
        }
        Ok(())
    }

    /// Requires status `IsWaiting`.
    pub fn cancel(&mut self) -> Result<(), Error> {
        if self.status() != Status::IsWaiting {
            return Err(Error::IllegalTransition(format!(
                "cancel() not permitted in status {:?}",
                self.status()
            )));
        }
        self.cancelled_ts = Some(Utc::now());
        Ok(())
    }

    /// Requires status `Submitted`. Queries the remote for final state; a
    /// non-`DONE` state is also recorded as an error. Erases the payload
    /// blob last, once it is no longer needed.
    pub fn complete(
        &mut self,
        adapter: &dyn RemoteAdapter,
        payload_store: &PayloadStore,
    ) -> Result<(), Error> {
        if self.status() != Status::Submitted {
            return Err(Error::IllegalTransition(format!(
                "complete() not permitted in status {:?}",
                self.status()
            )));
        }
        let remote_job_id = self.remote_job_id.ok_or_else(|| {
            Error::IllegalTransition("submitted item has no remote_job_id".to_string())
        })?;

        self.completed_ts = Some(Utc::now());

        let status = adapter.status(remote_job_id)?;
        if status.job_state != RemoteState::Done {
            self.error(Some(format!(
                "remote job {remote_job_id} ended in state {:?}",
                status.job_state
            )));
        }

        payload_store.erase(&self.payload_ref)?;
        Ok(())
    }

    /// Terminal. Sets `error_ts`; idempotent if already set.
    pub fn error(&mut self, msg: Option<String>) {
        self.error_ts = Some(Utc::now());
        if msg.is_some() {
            self.last_error = msg;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tq_remote::DummyRemoteAdapter;

    fn store() -> (tempfile::TempDir, PayloadStore) {
        let dir = tempfile::tempdir().unwrap();
        let home = crate::home::Home::new(dir.path());
        (dir, PayloadStore::new(home))
    }

    #[test]
    fn uid_is_deterministic_in_content() {
        let a = compute_uid(b"{\"x\":1}", "job");
        let b = compute_uid(b"{\"x\":1}", "job");
        let c = compute_uid(b"{\"x\":2}", "job");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn new_item_is_waiting() {
        let (_dir, store) = store();
        let item = QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 5, &store).unwrap();
        assert_eq!(item.status(), Status::IsWaiting);
        assert!(item.updated_ts.is_none());
    }

    #[test]
    fn full_lifecycle_happy_path() {
        let (_dir, store) = store();
        let adapter = DummyRemoteAdapter::new();
        let mut item =
            QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 5, &store).unwrap();

        item.submit(&adapter, &store).unwrap();
        assert_eq!(item.status(), Status::Submitted);
        let remote_job_id = item.remote_job_id.unwrap();

        adapter.set_state(remote_job_id, RemoteState::Done);
        item.complete(&adapter, &store).unwrap();
        assert_eq!(item.status(), Status::Completed);
        assert!(store.get(&item.payload_ref).unwrap().is_none());
    }

    #[test]
    fn cancel_then_restore() {
        let (_dir, store) = store();
        let mut item =
            QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 5, &store).unwrap();
        item.cancel().unwrap();
        assert_eq!(item.status(), Status::Canceled);

        item.update(None, None, Some(false), None, &store).unwrap();
        assert_eq!(item.status(), Status::IsWaiting);
    }

    #[test]
    fn submit_after_submit_is_illegal() {
        let (_dir, store) = store();
        let adapter = DummyRemoteAdapter::new();
        let mut item =
            QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 5, &store).unwrap();
        item.submit(&adapter, &store).unwrap();
        let err = item.submit(&adapter, &store).unwrap_err();
        assert!(matches!(err, Error::IllegalTransition(_)));
    }

    #[test]
    fn update_with_no_fields_is_empty_update() {
        let (_dir, store) = store();
        let mut item =
            QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 5, &store).unwrap();
        let err = item.update(None, None, None, None, &store).unwrap_err();
        assert!(matches!(err, Error::EmptyUpdate));
    }

    #[test]
    fn complete_non_done_state_also_errors() {
        let (_dir, store) = store();
        let adapter = DummyRemoteAdapter::new();
        let mut item =
            QueueItem::new("job", b"{}", ReportType::RouteAnalysis, 5, &store).unwrap();
        item.submit(&adapter, &store).unwrap();
        let remote_job_id = item.remote_job_id.unwrap();
        adapter.set_state(remote_job_id, RemoteState::Error);

        item.complete(&adapter, &store).unwrap();
        assert_eq!(item.status(), Status::HasError);
    }
}
