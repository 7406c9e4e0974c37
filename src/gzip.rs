//! Streaming gzip compression through flate2.
//!
//! Both directions move data in fixed-size chunks, so arbitrarily large
//! sources never need to be held in memory.

use std::io::{self, BufRead, BufReader, Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::debug;

use crate::error::{ArchiveError, Result};

const CHUNK_SIZE: usize = 64 * 1024;

/// Compress `src` into `dest` at the default level.
/// Returns the number of uncompressed bytes consumed.
pub fn gzip_compress<R: Read, W: Write>(src: &mut R, dest: &mut W) -> Result<u64> {
    gzip_compress_with(src, dest, Compression::default())
}

/// Compress `src` into `dest` at the given level
pub fn gzip_compress_with<R: Read, W: Write>(
    src: &mut R,
    dest: &mut W,
    level: Compression,
) -> Result<u64> {
    let mut encoder = GzEncoder::new(dest, level);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        encoder.write_all(&buf[..n])?;
        total += n as u64;
    }
    encoder.finish()?.flush()?;
    debug!(bytes = total, "gzip compressed stream");
    Ok(total)
}

/// Decompress gzip data from `src` into `dest`.
/// Returns the number of decompressed bytes written.
///
/// Bad framing, corrupt deflate data, a trailer CRC or length mismatch, or
/// an empty source are all reported as `CorruptCompressedData`.
pub fn gzip_decompress<R: Read, W: Write>(src: &mut R, dest: &mut W) -> Result<u64> {
    let mut src = BufReader::with_capacity(CHUNK_SIZE, src);
    if src.fill_buf()?.is_empty() {
        return Err(ArchiveError::CorruptCompressedData(
            "empty input, no gzip header".to_string(),
        ));
    }

    let mut decoder = GzDecoder::new(src);
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        let n = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(decode_error(e)),
        };
        dest.write_all(&buf[..n])?;
        total += n as u64;
    }
    dest.flush()?;
    debug!(bytes = total, "gzip decompressed stream");
    Ok(total)
}

fn decode_error(e: io::Error) -> ArchiveError {
    match e.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::UnexpectedEof => {
            ArchiveError::CorruptCompressedData(e.to_string())
        }
        _ => ArchiveError::Io(e),
    }
}
