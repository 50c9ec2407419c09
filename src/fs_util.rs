use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;
use zip::result::ZipError;

use crate::error::RetrieveError;

fn fs_err(err: impl ToString) -> RetrieveError {
    RetrieveError::Filesystem(err.to_string())
}

/// Returns `target` as a relative path when it stays inside the directory it
/// is joined to.
pub fn enclosed_path(target: &str) -> Option<PathBuf> {
    let path = Path::new(target);
    let enclosed = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    (enclosed && path.components().next().is_some()).then(|| path.to_path_buf())
}

/// Extracts one member of a zip archive to `destination`. Returns `Ok(false)`
/// when the archive has no such member.
pub fn extract_zip_member(
    zip_path: &Path,
    member: &str,
    destination: &Path,
) -> Result<bool, RetrieveError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| fs_err(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive = ZipArchive::new(file).map_err(|err| RetrieveError::Archive(err.to_string()))?;
    let name = member.trim_start_matches("./");
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(false),
        Err(err) => return Err(RetrieveError::Archive(err.to_string())),
    };
    if entry.is_dir() {
        return Ok(false);
    }

    ensure_parent(destination)?;
    let mut outfile = fs::File::create(destination).map_err(fs_err)?;
    io::copy(&mut entry, &mut outfile).map_err(fs_err)?;
    Ok(true)
}

pub fn ensure_parent(path: &Path) -> Result<(), RetrieveError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(fs_err)?;
    }
    Ok(())
}

/// Moves `from` over `to`, replacing a file or symlink already at `to`.
pub fn replace_file(from: &Path, to: &Path) -> Result<(), RetrieveError> {
    ensure_parent(to)?;
    if let Ok(meta) = fs::symlink_metadata(to) {
        if meta.is_dir() {
            return Err(fs_err(format!("{} is a directory", to.display())));
        }
        fs::remove_file(to).map_err(fs_err)?;
    }
    fs::rename(from, to).map_err(fs_err)
}

pub fn symlink_file(original: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(original, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(original, link)
    }
}

pub fn write_bytes_atomic(path: &Path, content: &[u8]) -> Result<(), RetrieveError> {
    ensure_parent(path)?;
    let parent = path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let temp = tempfile::Builder::new()
        .prefix(".nwp-retrieve")
        .tempfile_in(parent)
        .map_err(fs_err)?;
    fs::write(temp.path(), content).map_err(fs_err)?;
    temp.persist(path).map_err(fs_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enclosed_paths() {
        assert_eq!(enclosed_path("mem001/a.nc"), Some(PathBuf::from("mem001/a.nc")));
        assert_eq!(enclosed_path("../escape"), None);
        assert_eq!(enclosed_path("/abs/path"), None);
        assert_eq!(enclosed_path(""), None);
    }
}
