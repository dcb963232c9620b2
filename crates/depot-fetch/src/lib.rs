//! One fetch attempt against a rotating set of mirrors.
//!
//! # Architecture
//!
//! This crate follows the three-layer pattern:
//! - [`data`] - Plain result types
//! - [`core`] - Pure policy (backoff delays)
//! - [`effects`] - Network and filesystem I/O behind the [`HttpClient`] and
//!   [`Sleeper`] seams
//!
//! An attempt sleeps for its backoff, picks `mirrors[attempt % len]`, streams
//! the body, checks it against `Content-Length` and only then commits. The
//! retry loop across attempts belongs to the caller.

pub mod core;
pub mod data;
pub mod effects;
mod error;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use self::core::Backoff;
pub use data::FetchReport;
pub use effects::{
    BoxStream, Fetcher, HttpClient, HttpResponse, SetPermissions, Sleeper, TokioSleeper,
};
pub use error::{BoxError, FetchError, Result};

#[cfg(feature = "reqwest")]
pub use effects::{ClientOptions, ReqwestClient};
