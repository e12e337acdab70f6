/// Error kinds raised by the remote adapter.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The adapter was constructed without a base URL, version, or key, or
    /// with a partially-supplied proxy configuration.
    #[error("remote adapter misconfigured: {0}")]
    Misconfigured(String),

    /// HTTP 403 — the caller's API key was rejected.
    #[error("forbidden: the configured API key was rejected")]
    Forbidden,

    /// Any other non-2xx response, or a response body that could not be
    /// parsed as the expected shape.
    #[error("remote error ({status}): {body}")]
    RemoteError { status: u16, body: String },

    /// Transport-level failure (DNS, connect, timeout, TLS, ...).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response body could not be decoded as JSON in the expected shape.
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}
