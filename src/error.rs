//! Error type shared by the tar, gzip and base64 codecs.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors reported by every fallible operation in this crate
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The requested entry was never found before the end of the archive,
    /// or it was found earlier and has since been dropped from the reader.
    #[error("file not found in archive: {0}")]
    MissingFile(String),

    /// A header failed its checksum, a numeric field was not valid octal,
    /// or the stream ended in the middle of an entry.
    #[error("corrupt tar archive: {0}")]
    CorruptArchive(String),

    /// The archive uses an extension this codec does not understand
    /// (GNU long names, sparse files, ...).
    #[error("unsupported tar entry {name:?} (typeflag {typeflag:?})")]
    UnsupportedEntry { name: String, typeflag: char },

    /// A path or link target does not fit the ustar name fields.
    #[error("name too long for a ustar header: {0}")]
    NameTooLong(String),

    /// A numeric value (size, mtime, ids) exceeds its ustar octal field,
    /// e.g. a file of 8 GiB or more.
    #[error("{field} value {value} does not fit a ustar header field")]
    FieldTooLarge { field: &'static str, value: u64 },

    /// The writer already emitted its end-of-archive footer.
    #[error("tar stream has already been ended")]
    StreamEnded,

    #[error("corrupt gzip data: {0}")]
    CorruptCompressedData(String),

    #[error("invalid base64 input: {0}")]
    InvalidEncoding(String),

    /// Entry content was requested as text but is not UTF-8.
    #[error("contents of {0} are not valid UTF-8")]
    NotText(String),

    /// Extraction would write outside the target directory.
    #[error("refusing to extract {0}: path escapes the target directory")]
    PathEscapesRoot(String),

    #[error("path is not valid UTF-8: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error(transparent)]
    Walk(#[from] walkdir::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
