//! Pure policy for fetch attempts.

mod backoff;

pub use backoff::Backoff;
