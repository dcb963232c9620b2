use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;
use url::Url;

/// A boxed stream type for HTTP response bodies.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// Response head plus a streaming body.
pub struct HttpResponse<E> {
    pub status: u16,
    /// Declared `Content-Length`, `None` when absent (e.g. chunked encoding).
    pub content_length: Option<u64>,
    pub body: BoxStream<'static, Result<Bytes, E>>,
}

impl<E> std::fmt::Debug for HttpResponse<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP client abstraction.
///
/// This trait provides the minimal interface a fetch attempt needs: one GET
/// whose body is consumed as a stream. Implementations own their redirect
/// and timeout configuration.
///
/// # Implementations
///
/// - [`ReqwestClient`]: Production implementation using `reqwest`
/// - `mock::MockClient` for tests (feature `mock`)
pub trait HttpClient: Send + Sync {
    /// Error type for transport failures.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Issue a GET request for `url`.
    ///
    /// # Errors
    ///
    /// Transport-level failures only (DNS, refused connection, timeout).
    /// Non-2xx statuses are returned as a normal response.
    fn get(
        &self,
        url: &Url,
    ) -> impl Future<Output = Result<HttpResponse<Self::Error>, Self::Error>> + Send;
}

#[cfg(feature = "reqwest")]
mod reqwest_impl {
    use std::time::Duration;

    use futures_util::StreamExt;

    use super::*;

    /// Timeouts and identification for [`ReqwestClient`].
    #[derive(Clone, Debug)]
    pub struct ClientOptions {
        pub connect_timeout: Duration,
        /// Bound on a whole request, body included, so a hung mirror cannot
        /// stall an attempt forever.
        pub timeout: Duration,
        pub user_agent: String,
    }

    impl Default for ClientOptions {
        fn default() -> Self {
            Self {
                connect_timeout: Duration::from_secs(10),
                timeout: Duration::from_secs(300),
                user_agent: concat!("depot/", env!("CARGO_PKG_VERSION")).to_string(),
            }
        }
    }

    /// Production HTTP client implementation using reqwest.
    #[derive(Clone, Debug)]
    pub struct ReqwestClient {
        client: reqwest::Client,
    }

    impl ReqwestClient {
        /// Create a new ReqwestClient with default configuration.
        pub fn new() -> Result<Self, reqwest::Error> {
            Self::with_options(&ClientOptions::default())
        }

        pub fn with_options(options: &ClientOptions) -> Result<Self, reqwest::Error> {
            let client = reqwest::Client::builder()
                .connect_timeout(options.connect_timeout)
                .timeout(options.timeout)
                .user_agent(options.user_agent.as_str())
                .build()?;
            Ok(Self { client })
        }
    }

    impl HttpClient for ReqwestClient {
        type Error = reqwest::Error;

        async fn get(&self, url: &Url) -> Result<HttpResponse<Self::Error>, Self::Error> {
            let response = self.client.get(url.clone()).send().await?;

            let content_length = response
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());

            Ok(HttpResponse {
                status: response.status().as_u16(),
                content_length,
                body: Box::pin(response.bytes_stream().map(|chunk| chunk.map(Bytes::from))),
            })
        }
    }
}

#[cfg(feature = "reqwest")]
pub use reqwest_impl::{ClientOptions, ReqwestClient};
