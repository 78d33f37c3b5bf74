//! Atomic file replacement.
//!
//! Flow: write `<path>.userredis.tmp` → `prepare(tmp)` (ownership) → `chmod` →
//! `rename`. The temp file sits next to the target so the rename never crosses
//! filesystems. On any failure the temp file is removed and the target is left
//! untouched.
//!
//! The temp file is always created fresh (`O_EXCL`): instance directories are
//! owned by their user, who must not be able to plant a symlink there.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{io_err, CoreError};

pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    PathBuf::from(format!("{}.userredis.tmp", path.display()))
}

pub(crate) fn atomic_write<F>(
    path: &Path,
    content: &str,
    mode: u32,
    prepare: F,
) -> Result<(), CoreError>
where
    F: FnOnce(&Path) -> Result<(), CoreError>,
{
    let tmp = tmp_path(path);
    let result = write_then_rename(path, &tmp, content, mode, prepare);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_then_rename<F>(
    path: &Path,
    tmp: &Path,
    content: &str,
    mode: u32,
    prepare: F,
) -> Result<(), CoreError>
where
    F: FnOnce(&Path) -> Result<(), CoreError>,
{
    match std::fs::remove_file(tmp) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(io_err(tmp, e)),
    }
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)
        .map_err(|e| io_err(tmp, e))?;
    file.write_all(content.as_bytes())
        .map_err(|e| io_err(tmp, e))?;
    drop(file);
    prepare(tmp)?;
    set_mode(tmp, mode)?;
    std::fs::rename(tmp, path).map_err(|e| io_err(path, e))
}

#[cfg(unix)]
pub(crate) fn set_mode(path: &Path, mode: u32) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
pub(crate) fn set_mode(_path: &Path, _mode: u32) -> Result<(), CoreError> {
    Ok(())
}
