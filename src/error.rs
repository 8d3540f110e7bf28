use reqwest::StatusCode;
use thiserror::Error;

/// Failure of a single read against the camera service.
///
/// Every variant is recoverable: callers map it to a message and either wait
/// for a user retry or for the next poll.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request never produced a response (unreachable host, timeout, abort).
    #[error("could not reach {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The service answered with a non-success status.
    #[error("{url} responded with HTTP {status}")]
    Server { url: String, status: StatusCode },

    /// The service answered 2xx but the body was not the expected JSON.
    #[error("unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}
