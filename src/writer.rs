//! Sequential tar stream builder
//!
//! ```rust
//! use slate_archive::TarWriter;
//!
//! let mut buf = Vec::new();
//! {
//!     let mut writer = TarWriter::new(&mut buf);
//!     writer.append_directory("conf").unwrap();
//!     writer.append_file("conf/app.yaml", b"replicas: 3\n").unwrap();
//!     writer.append_sym_link("current", "conf").unwrap();
//!     // the footer is written when `writer` goes out of scope
//! }
//! assert_eq!(buf.len() % 512, 0);
//! ```

use std::io::Write;

use tracing::{debug, warn};

use crate::entry::{DEFAULT_DIR_MODE, DEFAULT_FILE_MODE, FileRecord, FileType, SYMLINK_MODE};
use crate::error::{ArchiveError, Result};
use crate::tar::{BLOCK_SIZE, TarHeader, padding_for};

/// Writes entries to a tar stream.
///
/// The two zero blocks that end the archive are written exactly once: by
/// [`TarWriter::end_stream`], or when the writer is dropped if that was
/// never called.
pub struct TarWriter<W: Write> {
    sink: W,
    ended: bool,
    mtime: u64,
}

impl<W: Write> TarWriter<W> {
    /// New writer; headers are stamped with the current time
    pub fn new(sink: W) -> Self {
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        Self {
            sink,
            ended: false,
            mtime: now,
        }
    }

    /// Stamp every following header with `mtime` (seconds since the epoch)
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Append a regular file with the default mode (0644)
    pub fn append_file(&mut self, filepath: &str, data: &[u8]) -> Result<()> {
        self.append_file_with_mode(filepath, data, DEFAULT_FILE_MODE)
    }

    pub fn append_file_with_mode(&mut self, filepath: &str, data: &[u8], mode: u32) -> Result<()> {
        let header = TarHeader::for_path(filepath, mode, data.len() as u64)?;
        self.write_entry(&header, data)
    }

    /// Append a directory (mode 0755). A trailing `/` is added to the name
    /// when missing.
    pub fn append_directory(&mut self, path: &str) -> Result<()> {
        self.append_directory_with_mode(path, DEFAULT_DIR_MODE)
    }

    pub fn append_directory_with_mode(&mut self, path: &str, mode: u32) -> Result<()> {
        let name = directory_name(path);
        let mut header = TarHeader::for_path(&name, mode, 0)?;
        header.typeflag = FileType::Directory.typeflag();
        self.write_entry(&header, &[])
    }

    /// Append a symbolic link; the target goes in the header's link field
    pub fn append_sym_link(&mut self, filepath: &str, link_target: &str) -> Result<()> {
        let record = FileRecord::with_data(
            FileType::SymbolicLink,
            link_target.as_bytes().to_vec(),
            SYMLINK_MODE,
        );
        self.append_record(filepath, &record)
    }

    /// Append any kind of record.
    ///
    /// Hard and symbolic links carry their `data` as the link target.
    /// Directories, devices and FIFOs are written without data.
    pub fn append_record(&mut self, path: &str, record: &FileRecord) -> Result<()> {
        let file_type = record.file_type();
        if file_type == FileType::Directory {
            return self.append_directory_with_mode(path, record.mode());
        }

        let size = if file_type.has_content() { record.file_size() } else { 0 };
        let mut header = TarHeader::for_path(path, record.mode(), size)?;
        header.typeflag = file_type.typeflag();
        if file_type.is_link() {
            header.linkname = String::from_utf8(record.data().to_vec())
                .map_err(|_| ArchiveError::NotText(path.to_string()))?;
        }
        let data: &[u8] = if file_type.has_content() { record.data() } else { &[] };
        self.write_entry(&header, data)
    }

    /// Write the end-of-archive footer. Calls after the first are no-ops.
    pub fn end_stream(&mut self) -> Result<()> {
        if self.ended {
            return Ok(());
        }
        self.ended = true;
        // Add two 512-byte zero blocks at the end
        self.sink.write_all(&[0u8; BLOCK_SIZE * 2])?;
        self.sink.flush()?;
        debug!("tar stream ended");
        Ok(())
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn write_entry(&mut self, header: &TarHeader, data: &[u8]) -> Result<()> {
        if self.ended {
            return Err(ArchiveError::StreamEnded);
        }
        let mut header = header.clone();
        header.mtime = self.mtime;
        let header_bytes = header.to_bytes()?;
        self.sink.write_all(&header_bytes)?;
        // Write data and padding to 512-byte boundary
        self.sink.write_all(data)?;
        let padding = padding_for(data.len() as u64);
        self.sink.write_all(&[0u8; BLOCK_SIZE][..padding])?;
        debug!(name = %header.path(), size = data.len(), "appended tar entry");
        Ok(())
    }
}

impl<W: Write> Drop for TarWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.end_stream() {
            warn!("failed to write tar footer: {}", e);
        }
    }
}

fn directory_name(path: &str) -> String {
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{}/", path)
    }
}
