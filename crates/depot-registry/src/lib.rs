//! The resource registry: what to fetch, how often to try, what got installed.
//!
//! [`ResourceRegistry`] is the only caller of [`depot_fetch::Fetcher`] and the
//! only owner of the retry loop. Each failed attempt is logged and retried
//! with the next attempt index, which rotates the mirror and lengthens the
//! backoff, until the [`RetryPolicy`] budget runs out.

mod error;
mod index;
mod policy;
mod registry;
mod settings;
mod store;

pub use error::{RegistryError, Result};
pub use index::ResourceIndex;
pub use policy::RetryPolicy;
pub use registry::{RegistryBuilder, ResourceRegistry};
pub use settings::{HttpSettings, Settings, load_config};
pub use store::{InstalledRecord, JsonFileStore, MemoryStore, StoreError, VersionStore};
