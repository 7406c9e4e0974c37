//! Materializing archive entries on disk.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use crate::entry::{FileRecord, FileType};
use crate::error::{ArchiveError, Result};

/// Write one entry beneath `root`.
///
/// Directories are created with the process default permissions. Regular
/// files get their content and mode bits. Device nodes are skipped.
pub(crate) fn extract_entry(root: &Path, name: &str, record: &FileRecord) -> Result<()> {
    let rel = relative_path(name)?;
    if rel.as_os_str().is_empty() {
        return Ok(());
    }
    check_no_symlink_ancestors(root, &rel, name)?;
    let target = root.join(&rel);
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    match record.file_type() {
        FileType::Directory => {
            fs::create_dir_all(&target)?;
        }
        FileType::RegularFile | FileType::Reserved => {
            remove_existing(&target)?;
            fs::write(&target, record.data())?;
            set_mode(&target, record.mode())?;
        }
        FileType::SymbolicLink => {
            let link_target = String::from_utf8_lossy(record.data()).to_string();
            remove_existing(&target)?;
            symlink(&link_target, &target)?;
        }
        FileType::HardLink => {
            let link_name = String::from_utf8_lossy(record.data()).to_string();
            let rel_link = relative_path(&link_name)?;
            check_no_symlink_ancestors(root, &rel_link, name)?;
            let original = root.join(&rel_link);
            // a symlink source may point outside the root
            if fs::symlink_metadata(&original)?.file_type().is_symlink() {
                return Err(ArchiveError::PathEscapesRoot(name.to_string()));
            }
            remove_existing(&target)?;
            fs::hard_link(&original, &target)?;
        }
        FileType::Fifo => {
            remove_existing(&target)?;
            make_fifo(&target, record.mode())?;
        }
        FileType::CharacterDevice | FileType::BlockDevice => {
            warn!("skipping device node {:?}", name);
            return Ok(());
        }
    }
    debug!("extracted {}", target.display());
    Ok(())
}

/// Turn an archive name into a path that stays under the extraction root.
/// A leading `/` is dropped, as tar does; `..` is refused.
fn relative_path(name: &str) -> Result<PathBuf> {
    let mut rel = PathBuf::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => rel.push(part),
            Component::CurDir | Component::RootDir => {}
            Component::ParentDir | Component::Prefix(_) => {
                return Err(ArchiveError::PathEscapesRoot(name.to_string()));
            }
        }
    }
    Ok(rel)
}

/// An earlier entry may have planted a symlink where a directory is
/// expected; writing through it would land outside the root.
fn check_no_symlink_ancestors(root: &Path, rel: &Path, name: &str) -> Result<()> {
    let mut current = root.to_path_buf();
    let mut components = rel.components().peekable();
    while let Some(component) = components.next() {
        if components.peek().is_none() {
            break;
        }
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ArchiveError::PathEscapesRoot(name.to_string()));
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Clear the way for a new file, without following symlinks
fn remove_existing(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} is a directory", path.display()),
        )),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn symlink(link_target: &str, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link_target, path)
}

#[cfg(not(unix))]
fn symlink(_link_target: &str, path: &Path) -> io::Result<()> {
    warn!("symbolic links are not supported here, skipping {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn make_fifo(path: &Path, mode: u32) -> io::Result<()> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    // SAFETY: c_path is a valid NUL-terminated string that outlives the call
    let ret = unsafe { libc::mkfifo(c_path.as_ptr(), (mode & 0o7777) as libc::mode_t) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn make_fifo(path: &Path, _mode: u32) -> io::Result<()> {
    warn!("FIFOs are not supported here, skipping {}", path.display());
    Ok(())
}
