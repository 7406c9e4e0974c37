//! Archiving a directory tree through a [`TarWriter`].

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::entry::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};
use crate::error::{ArchiveError, Result};
use crate::writer::TarWriter;

/// Append everything under `base_path` to `writer`.
///
/// The walk is depth-first and sorted by file name, so the same tree always
/// produces the same entry order. Symbolic links are stored as links and
/// never followed. Sockets and device nodes are skipped.
///
/// With `strip_prefix` entry names are relative to `base_path` and the root
/// itself is not stored; otherwise every name starts with `base_path` as
/// given, and the root directory is stored too.
pub fn recursively_archive<W: Write>(
    base_path: impl AsRef<Path>,
    writer: &mut TarWriter<W>,
    strip_prefix: bool,
) -> Result<()> {
    let base_path = base_path.as_ref();
    let walker = WalkDir::new(base_path)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry?;
        let rel = entry.path().strip_prefix(base_path).map_err(|_| {
            ArchiveError::InvalidPath(entry.path().to_path_buf())
        })?;
        let name = if strip_prefix {
            if rel.as_os_str().is_empty() {
                continue;
            }
            archive_name(rel)?
        } else {
            archive_name(entry.path())?
        };

        let file_type = entry.file_type();
        if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            let target = target
                .to_str()
                .ok_or_else(|| ArchiveError::InvalidPath(target.clone()))?;
            writer.append_sym_link(&name, target)?;
        } else if file_type.is_dir() {
            let mode = mode_of(&entry.metadata()?, DEFAULT_DIR_MODE);
            writer.append_directory_with_mode(&name, mode)?;
        } else if file_type.is_file() {
            let mode = mode_of(&entry.metadata()?, DEFAULT_FILE_MODE);
            let data = fs::read(entry.path())?;
            writer.append_file_with_mode(&name, &data, mode)?;
        } else {
            warn!("skipping unsupported file type: {}", entry.path().display());
            continue;
        }
        debug!("archived {}", entry.path().display());
    }
    Ok(())
}

/// Archive names always use `/`, whatever the host separator
fn archive_name(path: &Path) -> Result<String> {
    let parts: Option<Vec<&str>> = path
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect();
    let parts = parts.ok_or_else(|| ArchiveError::InvalidPath(path.to_path_buf()))?;
    let joined = parts.join("/");
    // a leading root component renders as "/" itself
    Ok(if joined.starts_with("//") {
        joined[1..].to_string()
    } else {
        joined
    })
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata, _default: u32) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(_meta: &fs::Metadata, default: u32) -> u32 {
    default
}
