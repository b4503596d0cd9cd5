//! Free space and file counts for a local root.

use std::path::Path;

use walkdir::WalkDir;

/// Bytes available to unprivileged users on the filesystem holding `path`.
///
/// Returns 0 when the figure cannot be obtained, so callers never see an
/// overestimate.
#[cfg(unix)]
pub fn free_bytes(path: &Path) -> u64 {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return 0;
    };
    let mut stats = std::mem::MaybeUninit::<libc::statvfs>::uninit();
    // SAFETY: c_path is NUL-terminated and stats is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), stats.as_mut_ptr()) };
    if rc != 0 {
        tracing::warn!(path = %path.display(), error = %std::io::Error::last_os_error(), "statvfs failed");
        return 0;
    }
    // SAFETY: statvfs returned 0, so the struct is initialized.
    let stats = unsafe { stats.assume_init() };
    (stats.f_bavail as u64).saturating_mul(stats.f_frsize as u64)
}

#[cfg(not(unix))]
pub fn free_bytes(_path: &Path) -> u64 {
    0
}

/// Number of regular files below `path`, not following symlinks.
pub fn count_files(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count() as u64
}
