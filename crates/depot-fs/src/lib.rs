//! Crash-safe file placement.
//!
//! A destination path written through [`AtomicFile`] is at every instant
//! either absent, its previous content, or the complete new content. The
//! bytes are staged in a uniquely named file inside a scratch directory and
//! swapped into place with the platform's atomic rename.

mod atomic_file;
mod dir;
mod error;
mod permissions;
mod replace;

pub use atomic_file::AtomicFile;
pub use dir::{ensure_dir, purge_dir};
pub use error::{Error, Result};
pub use permissions::{EXECUTABLE_MODE, set_executable};
pub use replace::{ReplaceOptions, replace_file};
