//! HTTP client for the remote traffic-stats analysis service.
//!
//! This crate knows nothing about queues or persistence; it only knows how to
//! submit jobs, poll their state, search, cancel, and delete them.

mod adapter;
mod dummy;
mod error;
mod types;

pub use adapter::{AdapterConfig, HttpRemoteAdapter, ProxyConfig, RemoteAdapter};
pub use dummy::DummyRemoteAdapter;
pub use error::Error;
pub use types::{
    ErrorResponse, ErrorResponseMessage, JobInfo, Pageable, RemoteState, SearchFilter,
    SearchResponse, Sort, StatusResponse, SubmitResponse,
};
