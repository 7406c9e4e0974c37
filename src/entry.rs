//! In-memory representation of one archived item.

use std::io::{self, Read};

/// Default permission bits for regular files
pub const DEFAULT_FILE_MODE: u32 = 0o644;
/// Default permission bits for directories
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Permission bits written for symbolic links
pub const SYMLINK_MODE: u32 = 0o777;

/// Kind of an archived item, numbered after the ustar typeflag digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    RegularFile = 0,
    HardLink = 1,
    SymbolicLink = 2,
    CharacterDevice = 3,
    BlockDevice = 4,
    Directory = 5,
    Fifo = 6,
    /// Contiguous file; readers treat it like a regular file
    Reserved = 7,
}

impl FileType {
    /// Map a header typeflag byte to a file type.
    /// The old-style NUL typeflag means a regular file.
    pub fn from_typeflag(flag: u8) -> Option<Self> {
        match flag {
            b'0' | 0 => Some(Self::RegularFile),
            b'1' => Some(Self::HardLink),
            b'2' => Some(Self::SymbolicLink),
            b'3' => Some(Self::CharacterDevice),
            b'4' => Some(Self::BlockDevice),
            b'5' => Some(Self::Directory),
            b'6' => Some(Self::Fifo),
            b'7' => Some(Self::Reserved),
            _ => None,
        }
    }

    /// The typeflag byte written into a header
    pub fn typeflag(self) -> u8 {
        b'0' + self as u8
    }

    /// Whether the record's data is carried in the header's link field
    /// rather than in data blocks
    pub fn is_link(self) -> bool {
        matches!(self, Self::HardLink | Self::SymbolicLink)
    }

    /// Whether the record's data is carried in data blocks after the header
    pub fn has_content(self) -> bool {
        matches!(self, Self::RegularFile | Self::Reserved)
    }
}

/// One archived item: its type, its content (or link target), and its mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    file_type: FileType,
    data: Vec<u8>,
    mode: u32,
}

impl FileRecord {
    /// A record with no data and the default file mode
    pub fn new(file_type: FileType) -> Self {
        Self::with_data(file_type, Vec::new(), DEFAULT_FILE_MODE)
    }

    pub fn with_data(file_type: FileType, data: Vec<u8>, mode: u32) -> Self {
        Self {
            file_type,
            data,
            mode,
        }
    }

    /// Read exactly `size` bytes of content from `src`.
    ///
    /// Fails with `UnexpectedEof` if the source runs dry first. The buffer
    /// grows with the data actually read, not with the claimed size.
    pub fn from_reader<R: Read>(
        file_type: FileType,
        size: u64,
        src: &mut R,
        mode: u32,
    ) -> io::Result<Self> {
        let mut data = Vec::with_capacity(size.min(64 * 1024) as usize);
        let read = src.take(size).read_to_end(&mut data)?;
        if (read as u64) < size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("expected {} bytes of entry data, got {}", size, read),
            ));
        }
        Ok(Self::with_data(file_type, data, mode))
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// File content, or the link target for hard and symbolic links
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }
}
