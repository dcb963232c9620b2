//! Value types describing what depot fetches and where it lands.
//!
//! Everything in this crate is pure: resolving a [`ResourceVersion`] to its
//! mirror-relative path or its on-disk location, and joining a mirror base
//! URL with that path, never touches the filesystem or the network.

mod config;
mod error;
mod mirror;
mod version;

pub use config::{RegistryConfig, StorageLayout};
pub use error::{ResourceError, Result};
pub use mirror::{MirrorList, join_url, join_url_str};
pub use version::{ResourceVersion, unpack_versioned_path, versioned_path};
