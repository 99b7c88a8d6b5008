//! Mock transport for testing adapters without network access.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::mailer::{HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Records every request and replies with queued outcomes.
///
/// When the queue of outcomes is empty the fallback response is returned.
pub struct MockTransport {
    fallback: Result<HttpResponse, TransportError>,
    outcomes: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Always answer with `response`.
    pub fn new(response: HttpResponse) -> Self {
        Self {
            fallback: Ok(response),
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always fail with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self {
            fallback: Err(error),
            outcomes: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a one-off outcome ahead of the fallback.
    pub fn push(&self, outcome: Result<HttpResponse, TransportError>) {
        if let Ok(mut outcomes) = self.outcomes.lock() {
            outcomes.push_back(outcome);
        }
    }

    /// Every request executed so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let queued = self.outcomes.lock().ok().and_then(|mut o| o.pop_front());
        queued.unwrap_or_else(|| self.fallback.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_queued_outcomes_come_first() {
        let mock = MockTransport::new(HttpResponse::new(200, "ok"));
        mock.push(Err(TransportError::Timeout("slow".into())));

        let first = mock.execute(HttpRequest::post("https://a.test")).await;
        let second = mock.execute(HttpRequest::post("https://b.test")).await;

        assert!(matches!(first, Err(TransportError::Timeout(_))));
        assert_eq!(second.unwrap().status, 200);
        assert_eq!(mock.request_count(), 2);
        assert_eq!(mock.last_request().unwrap().url, "https://b.test");
    }
}
