//! ustar header block codec
//!
//! Every entry in a tar stream starts with one 512-byte header block. The
//! numeric fields are ASCII octal, the string fields are NUL-padded, and the
//! checksum covers the whole block with the checksum field itself counted as
//! spaces.
//!
//! ```rust
//! use slate_archive::tar::TarHeader;
//!
//! let header = TarHeader::new("config/app.yaml".to_string(), 0o644, 12);
//! let bytes = header.to_bytes().unwrap();
//! let parsed = TarHeader::from_bytes(&bytes).unwrap();
//! assert_eq!(parsed.path(), "config/app.yaml");
//! assert_eq!(parsed.size, 12);
//! ```

use std::ops::Range;

use crate::error::{ArchiveError, Result};

/// Size of a header block and the unit data is padded to
pub const BLOCK_SIZE: usize = 512;

const NAME: Range<usize> = 0..100;
const MODE: Range<usize> = 100..108;
const UID: Range<usize> = 108..116;
const GID: Range<usize> = 116..124;
const SIZE: Range<usize> = 124..136;
const MTIME: Range<usize> = 136..148;
const CHKSUM: Range<usize> = 148..156;
const TYPEFLAG: usize = 156;
const LINKNAME: Range<usize> = 157..257;
const MAGIC: Range<usize> = 257..263;
const VERSION: Range<usize> = 263..265;
const UNAME: Range<usize> = 265..297;
const GNAME: Range<usize> = 297..329;
const DEVMAJOR: Range<usize> = 329..337;
const DEVMINOR: Range<usize> = 337..345;
const PREFIX: Range<usize> = 345..500;

const USTAR_MAGIC: &[u8; 6] = b"ustar\0";
const USTAR_VERSION: &[u8; 2] = b"00";

/// Tar header struct
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    pub name: String,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub mtime: u64,
    pub typeflag: u8,
    pub linkname: String,
    pub uname: String,
    pub gname: String,
    pub devmajor: u32,
    pub devminor: u32,
    pub prefix: String,
}

impl TarHeader {
    /// Create a regular-file header with minimal required fields.
    /// Other fields are filled with default values.
    pub fn new(name: String, mode: u32, size: u64) -> Self {
        Self {
            name,
            mode,
            size,
            uid: 0,
            gid: 0,
            mtime: 0,
            typeflag: b'0',
            linkname: String::new(),
            uname: String::new(),
            gname: String::new(),
            devmajor: 0,
            devminor: 0,
            prefix: String::new(),
        }
    }

    /// Header for `path`, splitting it across the ustar `prefix` and `name`
    /// fields when it is longer than 100 bytes
    pub fn for_path(path: &str, mode: u32, size: u64) -> Result<Self> {
        let (prefix, name) = split_ustar_path(path)?;
        let mut header = Self::new(name.to_string(), mode, size);
        header.prefix = prefix.to_string();
        Ok(header)
    }

    /// Full entry path, with the ustar prefix joined back on
    pub fn path(&self) -> String {
        if self.prefix.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", self.prefix, self.name)
        }
    }

    /// Parse and validate a 512-byte header block.
    ///
    /// The checksum is verified before any field is trusted.
    pub fn from_bytes(data: &[u8; BLOCK_SIZE]) -> Result<Self> {
        let name = read_tar_str(data, NAME);
        let stored = read_tar_octal(data, CHKSUM, "checksum", &name)?;
        let (unsigned, signed) = calc_checksum(data);
        if stored != unsigned as u64 && stored as i64 != signed {
            return Err(ArchiveError::CorruptArchive(format!(
                "header checksum mismatch for {:?}: stored {:o}, computed {:o}",
                name, stored, unsigned
            )));
        }

        // Only POSIX ustar headers carry a prefix; GNU headers reuse the
        // same bytes for other fields.
        let prefix = if &data[MAGIC] == USTAR_MAGIC {
            read_tar_str(data, PREFIX)
        } else {
            String::new()
        };

        Ok(Self {
            mode: read_tar_octal(data, MODE, "mode", &name)? as u32,
            uid: read_tar_octal(data, UID, "uid", &name)? as u32,
            gid: read_tar_octal(data, GID, "gid", &name)? as u32,
            size: read_tar_octal(data, SIZE, "size", &name)?,
            mtime: read_tar_octal(data, MTIME, "mtime", &name)?,
            typeflag: data[TYPEFLAG],
            linkname: read_tar_str(data, LINKNAME),
            uname: read_tar_str(data, UNAME),
            gname: read_tar_str(data, GNAME),
            devmajor: read_tar_octal(data, DEVMAJOR, "devmajor", &name)? as u32,
            devminor: read_tar_octal(data, DEVMINOR, "devminor", &name)? as u32,
            prefix,
            name,
        })
    }

    /// Serialize to a 512-byte block with a valid checksum.
    ///
    /// Fails instead of truncating when a string does not fit its field or
    /// a number does not fit its octal digits.
    pub fn to_bytes(&self) -> Result<[u8; BLOCK_SIZE]> {
        let mut data = [0u8; BLOCK_SIZE];
        write_tar_str(&mut data, NAME, &self.name)?;
        write_tar_octal(&mut data, MODE, "mode", self.mode as u64)?;
        write_tar_octal(&mut data, UID, "uid", self.uid as u64)?;
        write_tar_octal(&mut data, GID, "gid", self.gid as u64)?;
        write_tar_octal(&mut data, SIZE, "size", self.size)?;
        write_tar_octal(&mut data, MTIME, "mtime", self.mtime)?;

        // Set typeflag
        data[TYPEFLAG] = self.typeflag;

        // Set linkname
        write_tar_str(&mut data, LINKNAME, &self.linkname)?;

        // Set magic and version
        data[MAGIC].copy_from_slice(USTAR_MAGIC);
        data[VERSION].copy_from_slice(USTAR_VERSION);

        write_tar_str(&mut data, UNAME, &self.uname)?;
        write_tar_str(&mut data, GNAME, &self.gname)?;
        write_tar_octal(&mut data, DEVMAJOR, "devmajor", self.devmajor as u64)?;
        write_tar_octal(&mut data, DEVMINOR, "devminor", self.devminor as u64)?;
        write_tar_str(&mut data, PREFIX, &self.prefix)?;

        // calc checksum
        let (checksum, _) = calc_checksum(&data);
        let checksum_str = format!("{:06o}\0 ", checksum);
        data[CHKSUM].copy_from_slice(checksum_str.as_bytes());
        Ok(data)
    }
}

/// Split a path into ustar `(prefix, name)`.
///
/// Paths up to 100 bytes go entirely into `name`. Longer ones are split at
/// the first `/` that leaves at most 155 bytes of prefix and a non-empty
/// name of at most 100 bytes.
pub fn split_ustar_path(path: &str) -> Result<(&str, &str)> {
    let bytes = path.as_bytes();
    if bytes.len() <= NAME.len() {
        return Ok(("", path));
    }
    for (i, _) in bytes.iter().enumerate().filter(|&(_, &b)| b == b'/') {
        if i > PREFIX.len() {
            break;
        }
        let name_len = bytes.len() - i - 1;
        if i > 0 && name_len > 0 && name_len <= NAME.len() {
            // Keep trailing slashes of directory names on the name side
            if bytes[i + 1..].iter().all(|&b| b == b'/') {
                continue;
            }
            return Ok((&path[..i], &path[i + 1..]));
        }
    }
    Err(ArchiveError::NameTooLong(path.to_string()))
}

/// Check if a block is empty (all zeros)
pub fn is_empty_block(data: &[u8]) -> bool {
    data.iter().all(|&b| b == 0)
}

/// Number of zero bytes needed after `size` bytes of data to reach the next
/// block boundary
pub fn padding_for(size: u64) -> usize {
    let rem = (size % BLOCK_SIZE as u64) as usize;
    if rem == 0 { 0 } else { BLOCK_SIZE - rem }
}

/// Calc checksum of the header bytes, as (unsigned, signed) sums.
///
/// The checksum field is counted as eight spaces. Some historic writers
/// summed signed bytes, so readers accept either.
pub fn calc_checksum(data: &[u8; BLOCK_SIZE]) -> (u32, i64) {
    let mut unsigned: u32 = 0;
    let mut signed: i64 = 0;
    for (i, &b) in data.iter().enumerate() {
        let b = if CHKSUM.contains(&i) { b' ' } else { b };
        unsigned += b as u32;
        signed += b as i8 as i64;
    }
    (unsigned, signed)
}

fn read_tar_str(data: &[u8], range: Range<usize>) -> String {
    let field = &data[range];
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).to_string()
}

fn read_tar_octal(data: &[u8], range: Range<usize>, field: &str, name: &str) -> Result<u64> {
    // e.g. "0000644\0" or "000644\0 " (leading spaces are also seen)
    let raw = &data[range];
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    let s = String::from_utf8_lossy(&raw[..end]);
    let s = s.trim_matches(' ');
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 8).map_err(|_| {
        ArchiveError::CorruptArchive(format!("invalid octal {} field {:?} for {:?}", field, s, name))
    })
}

fn write_tar_str(data: &mut [u8], range: Range<usize>, value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > range.len() {
        return Err(ArchiveError::NameTooLong(value.to_string()));
    }
    data[range.start..range.start + bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn write_tar_octal(
    data: &mut [u8],
    range: Range<usize>,
    field: &'static str,
    value: u64,
) -> Result<()> {
    // digits plus a terminating NUL
    let width = range.len() - 1;
    let s = format!("{:0width$o}", value, width = width);
    if s.len() > width {
        return Err(ArchiveError::FieldTooLarge { field, value });
    }
    data[range.start..range.start + width].copy_from_slice(s.as_bytes());
    Ok(())
}
