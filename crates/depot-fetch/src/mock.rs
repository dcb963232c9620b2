//! In-process doubles for [`HttpClient`] and [`Sleeper`].
//!
//! Enabled for this crate's tests and, through the `mock` feature, for
//! downstream test suites.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use futures_util::{StreamExt, stream};
use url::Url;

use crate::effects::{BoxStream, HttpClient, HttpResponse, Sleeper};

const CHUNK_SIZE: usize = 256;

#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct MockError(String);

/// Canned answer for one request.
#[derive(Clone, Debug)]
pub struct MockResponse {
    status: u16,
    body: Bytes,
    content_length: Option<u64>,
    truncate_at: Option<usize>,
    stall_at: Option<usize>,
    refuse: bool,
}

impl MockResponse {
    /// `200 OK` with a matching `Content-Length`.
    pub fn ok(body: impl Into<Bytes>) -> Self {
        let body = body.into();
        Self {
            status: 200,
            content_length: Some(body.len() as u64),
            body,
            truncate_at: None,
            stall_at: None,
            refuse: false,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            ..Self::ok(Bytes::new())
        }
    }

    /// Transport failure before any response.
    pub fn refused() -> Self {
        Self {
            refuse: true,
            ..Self::ok(Bytes::new())
        }
    }

    /// Override the declared length.
    pub fn content_length(mut self, content_length: Option<u64>) -> Self {
        self.content_length = content_length;
        self
    }

    /// Deliver `n` bytes, then fail the body stream like a dropped
    /// connection.
    pub fn truncated_after(mut self, n: usize) -> Self {
        self.truncate_at = Some(n);
        self
    }

    /// Deliver `n` bytes, then never make progress again.
    pub fn stall_after(mut self, n: usize) -> Self {
        self.stall_at = Some(n);
        self
    }

    fn into_response(self) -> HttpResponse<MockError> {
        let limit = self
            .truncate_at
            .or(self.stall_at)
            .unwrap_or(self.body.len())
            .min(self.body.len());
        let chunks: Vec<Result<Bytes, MockError>> = self
            .body
            .slice(..limit)
            .chunks(CHUNK_SIZE)
            .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
            .collect();
        let head = stream::iter(chunks);

        let body: BoxStream<'static, Result<Bytes, MockError>> = if self.truncate_at.is_some() {
            Box::pin(head.chain(stream::once(async {
                Err(MockError("connection reset by peer".to_string()))
            })))
        } else if self.stall_at.is_some() {
            Box::pin(head.chain(stream::pending()))
        } else {
            Box::pin(head)
        };

        HttpResponse {
            status: self.status,
            content_length: self.content_length,
            body,
        }
    }
}

#[derive(Default)]
struct Inner {
    routes: Mutex<HashMap<String, VecDeque<MockResponse>>>,
    requests: Mutex<Vec<String>>,
}

/// Routes exact URLs to queued responses.
///
/// Each request to a URL takes the next queued response; the last one keeps
/// answering. Requests to unknown URLs fail like a refused connection.
/// Clones share routes and the request log.
#[derive(Clone, Default)]
pub struct MockClient {
    inner: Arc<Inner>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: &str, response: MockResponse) -> Self {
        self.inner
            .routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Every requested URL, in order.
    pub fn requests(&self) -> Vec<String> {
        self.inner.requests.lock().unwrap().clone()
    }
}

impl HttpClient for MockClient {
    type Error = MockError;

    async fn get(&self, url: &Url) -> Result<HttpResponse<Self::Error>, Self::Error> {
        self.inner.requests.lock().unwrap().push(url.to_string());

        let response = {
            let mut routes = self.inner.routes.lock().unwrap();
            match routes.get_mut(url.as_str()) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match response {
            Some(response) if !response.refuse => Ok(response.into_response()),
            _ => Err(MockError(format!("connection refused: {url}"))),
        }
    }
}

/// Records requested delays and returns immediately.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingSleeper {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.delays.lock().unwrap().push(duration);
    }
}
