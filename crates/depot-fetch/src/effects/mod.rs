//! I/O edge of the crate: HTTP, sleeping and the attempt itself.

mod fetcher;
mod http;
mod sleep;

pub use fetcher::{Fetcher, SetPermissions};
pub use http::{BoxStream, HttpClient, HttpResponse};
pub use sleep::{Sleeper, TokioSleeper};

#[cfg(feature = "reqwest")]
pub use http::{ClientOptions, ReqwestClient};
