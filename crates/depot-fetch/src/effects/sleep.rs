use std::future::Future;
use std::time::Duration;

/// Source of backoff delays.
///
/// Production code sleeps on the tokio timer; tests substitute an
/// implementation that records the requested delay and returns at once.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
