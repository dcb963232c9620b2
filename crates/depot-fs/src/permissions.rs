use std::path::Path;

#[cfg(unix)]
use crate::Error;
use crate::Result;

/// `rwxr-xr-x`
pub const EXECUTABLE_MODE: u32 = 0o755;

/// Mark a committed file executable.
///
/// Windows has no executable bit; the call is a no-op there and no ACLs are
/// touched.
#[cfg(unix)]
pub fn set_executable(path: impl AsRef<Path>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let path = path.as_ref();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(EXECUTABLE_MODE)).map_err(
        |source| Error::Permissions {
            path: path.to_path_buf(),
            source,
        },
    )
}

#[cfg(not(unix))]
pub fn set_executable(_path: impl AsRef<Path>) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[cfg(unix)]
    #[test]
    fn test_set_executable() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("tool");
        std::fs::write(&path, "#!/bin/sh\n").unwrap();

        set_executable(&path)?;

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, EXECUTABLE_MODE);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_set_executable_missing_file() {
        let dir = tempdir().unwrap();
        let err = set_executable(dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, Error::Permissions { .. }));
    }
}
