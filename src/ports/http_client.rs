use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body as AxumBody;
use hyper::{Request, Response};
use thiserror::Error;

/// Custom error type for HTTP client operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum HttpClientError {
    /// Error when connection to the upstream fails (refused, DNS, reset)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Error when the upstream did not answer in time
    #[error("Timeout error after {}", humantime::format_duration(*.0))]
    Timeout(Duration),

    /// Error when request is invalid
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpClientError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, HttpClientError::Timeout(_))
    }
}

/// Result type alias for HTTP client operations
pub type HttpClientResult<T> = Result<T, HttpClientError>;

/// HttpClient defines the port (interface) for making HTTP requests to the upstream
#[async_trait]
pub trait HttpClient: Send + Sync + 'static {
    /// Send an HTTP request to the upstream server
    ///
    /// # Arguments
    /// * `req` - The fully rewritten HTTP request
    ///
    /// # Returns
    /// A future that resolves to the upstream's response (body still streaming) or an error
    async fn send_request(&self, req: Request<AxumBody>) -> HttpClientResult<Response<AxumBody>>;
}
