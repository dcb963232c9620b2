use std::path::Path;

use crate::{Error, Result};

/// Tuning for [`replace_file`].
///
/// Only Windows retries: virus scanners and indexers briefly hold freshly
/// written files open, which makes `MoveFileExW` fail with a sharing
/// violation. The delay doubles after every failed try.
#[derive(Clone, Copy, Debug)]
pub struct ReplaceOptions {
    retry_count: u32,
    retry_delay_ms: u64,
}

impl Default for ReplaceOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplaceOptions {
    pub fn new() -> Self {
        Self {
            retry_count: 16,
            retry_delay_ms: 8,
        }
    }

    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count.max(1);
        self
    }

    pub fn retry_delay_ms(mut self, retry_delay_ms: u64) -> Self {
        self.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn get_retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn get_retry_delay_ms(&self) -> u64 {
        self.retry_delay_ms
    }
}

/// Atomically move `src` over `dst`, replacing any existing file.
///
/// Both paths must be on the same filesystem; a cross-device move fails
/// rather than degrading into a non-atomic copy.
#[cfg(unix)]
pub fn replace_file(src: impl AsRef<Path>, dst: impl AsRef<Path>, _options: ReplaceOptions) -> Result<()> {
    let dst = dst.as_ref();

    std::fs::rename(src.as_ref(), dst).map_err(|source| Error::Commit {
        destination: dst.to_path_buf(),
        source,
    })?;

    // Persist the new directory entry; the rename itself already happened.
    if let Some(parent) = dst.parent()
        && let Ok(dir) = std::fs::File::open(parent)
        && let Err(e) = dir.sync_all()
    {
        tracing::debug!(dir = %parent.display(), error = %e, "directory sync failed");
    }

    Ok(())
}

#[cfg(windows)]
pub fn replace_file(src: impl AsRef<Path>, dst: impl AsRef<Path>, options: ReplaceOptions) -> Result<()> {
    use std::os::windows::prelude::OsStrExt;
    use std::thread;
    use std::time::Duration;
    use windows::Win32::Storage::FileSystem::{
        MOVEFILE_REPLACE_EXISTING, MOVEFILE_WRITE_THROUGH, MoveFileExW,
    };
    use windows::core::PCWSTR;

    let dst = dst.as_ref();
    let src_wide: Vec<u16> = src
        .as_ref()
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let dst_wide: Vec<u16> = dst
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();

    let mut delay = options.get_retry_delay_ms();
    let mut attempt = 0;

    loop {
        let result = unsafe {
            MoveFileExW(
                PCWSTR::from_raw(src_wide.as_ptr()),
                PCWSTR::from_raw(dst_wide.as_ptr()),
                MOVEFILE_REPLACE_EXISTING | MOVEFILE_WRITE_THROUGH,
            )
        };

        match result {
            Ok(()) => return Ok(()),
            Err(e) if attempt + 1 < options.get_retry_count() => {
                tracing::debug!(attempt, error = %e, "replace failed, retrying");
                thread::sleep(Duration::from_millis(delay));
                delay = delay.saturating_mul(2);
                attempt += 1;
            }
            Err(e) => {
                return Err(Error::Commit {
                    destination: dst.to_path_buf(),
                    source: std::io::Error::from_raw_os_error(e.code().0 & 0xFFFF),
                });
            }
        }
    }
}
