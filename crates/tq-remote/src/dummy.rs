use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

use serde_json::Value;

use crate::adapter::RemoteAdapter;
use crate::error::Error;
use crate::types::{JobInfo, Pageable, RemoteState, SearchFilter, SearchResponse, Sort, StatusResponse, SubmitResponse};

/// In-memory stand-in for [`crate::adapter::HttpRemoteAdapter`], used by tests
/// and anywhere a network call would be unwelcome.
///
/// Every submission is accepted and immediately parked in [`RemoteState::New`];
/// callers drive state transitions with [`DummyRemoteAdapter::set_state`].
pub struct DummyRemoteAdapter {
    next_id: AtomicI64,
    jobs: Mutex<Vec<JobInfo>>,
}

impl Default for DummyRemoteAdapter {
    fn default() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            jobs: Mutex::new(Vec::new()),
        }
    }
}

impl DummyRemoteAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn submit(&self, job: &Value, job_type: &str) -> Result<SubmitResponse, Error> {
        let job_id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let name = job
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();
        self.jobs.lock().unwrap().push(JobInfo {
            name,
            created_at: chrono::Utc::now(),
            state: RemoteState::New,
            job_id,
            job_type: job_type.to_string(),
            completed_at: None,
        });
        Ok(SubmitResponse {
            response_status: "success".to_string(),
            messages: Vec::new(),
            job_id: Some(job_id),
        })
    }

    /// Force a job into a given state, as if the remote side had progressed it.
    pub fn set_state(&self, remote_job_id: i64, state: RemoteState) {
        let mut jobs = self.jobs.lock().unwrap();
        if let Some(job) = jobs.iter_mut().find(|j| j.job_id == remote_job_id) {
            job.state = state;
            if matches!(state, RemoteState::Done | RemoteState::Error) {
                job.completed_at = Some(chrono::Utc::now());
            }
        }
    }
}

impl RemoteAdapter for DummyRemoteAdapter {
    fn submit_route(&self, job: &Value) -> Result<SubmitResponse, Error> {
        self.submit(job, "ROUTE_ANALYSIS")
    }

    fn submit_area(&self, job: &Value) -> Result<SubmitResponse, Error> {
        self.submit(job, "AREA_ANALYSIS")
    }

    fn submit_density(&self, job: &Value) -> Result<SubmitResponse, Error> {
        self.submit(job, "TRAFFIC_DENSITY")
    }

    fn status(&self, remote_job_id: i64) -> Result<StatusResponse, Error> {
        let jobs = self.jobs.lock().unwrap();
        let job = jobs
            .iter()
            .find(|j| j.job_id == remote_job_id)
            .ok_or_else(|| Error::RemoteError {
                status: 404,
                body: format!("unknown job {remote_job_id}"),
            })?;
        Ok(StatusResponse {
            job_id: job.job_id,
            job_state: job.state,
            response_status: "success".to_string(),
            urls: if job.state == RemoteState::Done {
                Some(vec![format!("https://dummy.invalid/reports/{remote_job_id}")])
            } else {
                None
            },
        })
    }

    fn search(&self, filter: &SearchFilter) -> Result<SearchResponse, Error> {
        let jobs = self.jobs.lock().unwrap();
        let content: Vec<JobInfo> = jobs
            .iter()
            .filter(|j| filter.states.is_empty() || filter.states.contains(&j.state))
            .filter(|j| filter.job_id.is_none_or(|id| id == j.job_id))
            .filter(|j| filter.name.as_deref().is_none_or(|n| n == j.name))
            .cloned()
            .collect();
        let total_elements = content.len() as u64;
        Ok(SearchResponse {
            content,
            pageable: Pageable {
                sort: Sort {
                    is_sorted: false,
                    is_unsorted: true,
                    is_empty: true,
                },
                page_size: filter.per_page.unwrap_or(20),
                page_number: filter.page_index.unwrap_or(0),
                offset: 0,
                paged: false,
                unpaged: true,
            },
            total_elements,
        })
    }

    fn cancel(&self, remote_job_id: i64) -> Result<(), Error> {
        self.set_state(remote_job_id, RemoteState::Canceled);
        Ok(())
    }

    fn delete(&self, remote_job_id: i64) -> Result<(), Error> {
        self.jobs.lock().unwrap().retain(|j| j.job_id != remote_job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submit_then_status_roundtrips() {
        let adapter = DummyRemoteAdapter::new();
        let resp = adapter.submit_route(&json!({"name": "job-a"})).unwrap();
        let id = resp.job_id.unwrap();

        let status = adapter.status(id).unwrap();
        assert_eq!(status.job_state, RemoteState::New);

        adapter.set_state(id, RemoteState::Done);
        let status = adapter.status(id).unwrap();
        assert_eq!(status.job_state, RemoteState::Done);
        assert!(status.urls.is_some());
    }

    #[test]
    fn search_filters_by_state() {
        let adapter = DummyRemoteAdapter::new();
        let a = adapter.submit_route(&json!({"name": "a"})).unwrap().job_id.unwrap();
        let _b = adapter.submit_route(&json!({"name": "b"})).unwrap().job_id.unwrap();
        adapter.set_state(a, RemoteState::Done);

        let found = adapter.search(&SearchFilter::active()).unwrap();
        assert_eq!(found.total_elements, 1);
    }

    #[test]
    fn cancel_moves_job_to_canceled() {
        let adapter = DummyRemoteAdapter::new();
        let id = adapter.submit_route(&json!({"name": "a"})).unwrap().job_id.unwrap();
        adapter.cancel(id).unwrap();
        assert_eq!(adapter.status(id).unwrap().job_state, RemoteState::Canceled);
    }
}
