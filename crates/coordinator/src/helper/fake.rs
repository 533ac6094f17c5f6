//! Fake [`HelperTransport`] for tests — returns canned responses without a
//! network, the way the teacher's `FakeAgentAdapter` stands in for a real
//! adapter.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::helper::{HelperRequest, HelperResponse, HelperTransport, HelperTransportError};

/// Records every request it receives and replies from a pre-seeded queue of
/// `(status, body)` pairs, FIFO. Returns an `Err` if asked to serve more
/// requests than were seeded — a test bug, not a runtime condition.
#[derive(Default)]
pub struct FakeHelperTransport {
    responses: Mutex<VecDeque<(u16, String)>>,
    requests: Mutex<Vec<HelperRequest>>,
}

impl FakeHelperTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next response this transport will return, in call order.
    #[allow(clippy::unwrap_used)]
    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        self.responses.lock().unwrap().push_back((status, body.into()));
    }

    #[allow(clippy::unwrap_used)]
    pub fn requests(&self) -> Vec<HelperRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HelperTransport for FakeHelperTransport {
    #[allow(clippy::unwrap_used)]
    async fn fetch(&self, request: HelperRequest) -> Result<HelperResponse, HelperTransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let (status, body) = self.responses.lock().unwrap().pop_front().ok_or_else(|| {
            HelperTransportError::Request(format!(
                "FakeHelperTransport received request {:?} with no response queued",
                request.id
            ))
        })?;
        Ok(HelperResponse { id: request.id, status, body })
    }
}
