//! Helper Router (C4, §4.4): bridges the event loop to an out-of-process
//! HTTP helper that performs the post-build cache-population fetch.
//!
//! The router itself neither matches requests to replies nor fans results
//! out — it forwards a request by id and publishes the matching
//! `HelperResult`; each Worker Session filters by `pending_helper_id`
//! (§4.7.5).

use async_trait::async_trait;
use distbuild_core::HelperRequestId;
use thiserror::Error;

/// `http-request{id, url, method=GET, body=null, headers=null}` (§6). Only
/// GET is ever issued by this core (§4.7.4), so `method` is not modeled as a
/// field — callers of [`HelperTransport::fetch`] always mean GET.
#[derive(Debug, Clone, PartialEq)]
pub struct HelperRequest {
    pub id: HelperRequestId,
    pub url: String,
}

/// `http-response{id, status, body}` (§6).
#[derive(Debug, Clone, PartialEq)]
pub struct HelperResponse {
    pub id: HelperRequestId,
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum HelperTransportError {
    #[error("helper request failed: {0}")]
    Request(String),
}

/// Abstraction over the out-of-process helper. Production code talks real
/// HTTP; tests use a fake that returns a canned status without a network.
#[async_trait]
pub trait HelperTransport: Send + Sync + 'static {
    async fn fetch(&self, request: HelperRequest) -> Result<HelperResponse, HelperTransportError>;
}

/// Real transport: a GET against the writeable cache server, via `reqwest`.
pub struct HttpHelperTransport {
    client: reqwest::Client,
}

impl HttpHelperTransport {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for HttpHelperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HelperTransport for HttpHelperTransport {
    async fn fetch(&self, request: HelperRequest) -> Result<HelperResponse, HelperTransportError> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|err| HelperTransportError::Request(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| HelperTransportError::Request(err.to_string()))?;
        Ok(HelperResponse { id: request.id, status, body })
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeHelperTransport;

#[path = "helper_tests.rs"]
#[cfg(test)]
mod tests;
