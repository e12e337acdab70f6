use serde::{Deserialize, Serialize};

/// The state set the remote service reports for a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteState {
    New,
    Scheduled,
    Mapmatching,
    Mapmatched,
    ReadingGeobase,
    Calculations,
    NeedConfirmation,
    Done,
    Error,
    Rejected,
    Canceled,
    Expired,
}

impl RemoteState {
    /// The subset counted against the remote concurrency cap.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RemoteState::New
                | RemoteState::Scheduled
                | RemoteState::Mapmatching
                | RemoteState::Mapmatched
                | RemoteState::ReadingGeobase
                | RemoteState::Calculations
        )
    }
}

/// Response to a submission request (`submit_route`/`submit_area`/`submit_density`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    #[serde(rename = "responseStatus")]
    pub response_status: String,
    pub messages: Vec<String>,
    #[serde(rename = "jobId")]
    pub job_id: Option<i64>,
}

impl SubmitResponse {
    /// The core never treats a 2xx with `response_status == "error"` as success.
    pub fn is_error(&self) -> bool {
        self.response_status.eq_ignore_ascii_case("error")
    }
}

/// The structured error form returned for some HTTP 400s.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponseMessage {
    pub error: String,
    pub field: String,
    #[serde(rename = "rejectedValue")]
    pub rejected_value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "responseStatus")]
    pub response_status: String,
    pub messages: Vec<ErrorResponseMessage>,
}

/// Response to `status(remote_job_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    #[serde(rename = "jobId")]
    pub job_id: i64,
    #[serde(rename = "jobState")]
    pub job_state: RemoteState,
    #[serde(rename = "responseStatus")]
    pub response_status: String,
    pub urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sort {
    #[serde(rename = "sorted")]
    pub is_sorted: bool,
    #[serde(rename = "unsorted")]
    pub is_unsorted: bool,
    #[serde(rename = "empty")]
    pub is_empty: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pageable {
    pub sort: Sort,
    pub page_size: u32,
    pub page_number: u32,
    pub offset: u32,
    pub paged: bool,
    pub unpaged: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobInfo {
    pub name: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub state: RemoteState,
    #[serde(rename = "id")]
    pub job_id: i64,
    #[serde(rename = "type")]
    pub job_type: String,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Paged envelope returned by `search(filters)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub content: Vec<JobInfo>,
    pub pageable: Pageable,
    #[serde(rename = "totalElements")]
    pub total_elements: u64,
}

/// Filters accepted by `search`. All fields are optional; an absent field is
/// not sent as a query parameter.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub page_index: Option<u32>,
    pub per_page: Option<u32>,
    pub states: Vec<RemoteState>,
    pub name: Option<String>,
    pub job_id: Option<i64>,
}

impl SearchFilter {
    pub fn active() -> Self {
        Self {
            states: vec![
                RemoteState::New,
                RemoteState::Scheduled,
                RemoteState::Mapmatching,
                RemoteState::Mapmatched,
                RemoteState::ReadingGeobase,
                RemoteState::Calculations,
            ],
            ..Self::default()
        }
    }
}
