//! Streaming tar reader and writer, with gzip and base64 transcoders for
//! packaging configuration bundles
//!
//! # Usage
//!
//! ## Packing files into a TAR archive
//!
//! ```rust,no_run
//! use slate_archive::pack;
//!
//! pack("bundle.tar", &["conf", "README.md"]).unwrap();
//! // Creates bundle.tar containing conf/ (recursively) and README.md
//! pack("bundle.tar.gz", &["conf"]).unwrap();
//! // Creates bundle.tar.gz that is gzip-compressed
//! ```
//!
//! ## Unpacking files from a TAR archive
//!
//! ```rust,no_run
//! use slate_archive::unpack;
//!
//! unpack("bundle.tar.gz", "output_directory").unwrap();
//! ```
//!
//! ## Listing files in a TAR archive
//!
//! ```rust,no_run
//! use slate_archive::list;
//!
//! match list("bundle.tar") {
//!     Ok(entries) => {
//!         for entry in entries {
//!             println!("  {} ({} bytes)", entry.name, entry.size);
//!         }
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```
//!
//! ## Streaming API
//!
//! The codecs are independent; compose them as needed.
//!
//! ```rust
//! use slate_archive::{encode_base64, decode_base64, gzip_compress, gzip_decompress};
//! use slate_archive::{TarReader, TarWriter};
//!
//! // build a bundle
//! let mut tar = Vec::new();
//! {
//!     let mut writer = TarWriter::new(&mut tar);
//!     writer.append_file("token", b"s3cr3t").unwrap();
//! }
//!
//! // compress and encode it for a JSON payload
//! let mut gz = Vec::new();
//! gzip_compress(&mut &tar[..], &mut gz).unwrap();
//! let text = encode_base64(&gz);
//!
//! // and back again
//! let gz = decode_base64(&text).unwrap();
//! let mut tar = Vec::new();
//! gzip_decompress(&mut &gz[..], &mut tar).unwrap();
//! let mut reader = TarReader::new(&tar[..]);
//! assert_eq!(reader.string_for_file("token").unwrap(), "s3cr3t");
//! ```

pub mod archiver;
pub mod encoding;
pub mod entry;
pub mod error;
mod extract;
pub mod gzip;
pub mod id;
pub mod reader;
pub mod tar;
pub mod writer;

use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use tracing::info;

pub use archiver::recursively_archive;
pub use encoding::{
    decode_base64, decode_base64_checked, encode_base64, encode_base64_url, sanity_check_base64,
};
pub use entry::{FileRecord, FileType};
pub use error::{ArchiveError, Result};
pub use gzip::{gzip_compress, gzip_compress_with, gzip_decompress};
pub use id::IdGenerator;
pub use reader::TarReader;
pub use writer::TarWriter;

/// One line of an archive listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub name: String,
    pub file_type: FileType,
    pub mode: u32,
    pub size: u64,
}

// ----------------------------------------------------------------
// simple methods for reading and writing tar archives
// ----------------------------------------------------------------

/// Whether a file name asks for gzip compression
pub fn is_gzip_name(tarfile: &str) -> bool {
    tarfile.ends_with(".tar.gz") || tarfile.ends_with(".tgz")
}

/// Packs files and directory trees into a tar archive (.tar or .tar.gz).
///
/// Each path is stored under the name it was given; directories are added
/// recursively.
pub fn pack<P: AsRef<Path>>(tarfile: &str, paths: &[P]) -> Result<()> {
    let mut tar_data = Vec::new();
    {
        let mut writer = TarWriter::new(&mut tar_data);
        for path in paths {
            recursively_archive(path, &mut writer, false)?;
        }
        writer.end_stream()?;
    }

    let mut file = fs::File::create(tarfile)?;
    if is_gzip_name(tarfile) {
        gzip_compress(&mut &tar_data[..], &mut file)?;
    } else {
        file.write_all(&tar_data)?;
    }
    info!("created tar archive: {}", tarfile);
    Ok(())
}

/// Unpacks a tar archive (.tar or .tar.gz) into `output_dir`
pub fn unpack(tarfile: &str, output_dir: impl AsRef<Path>) -> Result<()> {
    let tar_data = read_archive(tarfile)?;
    let mut reader = TarReader::new(&tar_data[..]);
    reader.extract_to_file_system(&output_dir, true)?;
    info!("extraction complete to: {}", output_dir.as_ref().display());
    Ok(())
}

/// Lists the entries of a tar archive (.tar or .tar.gz)
pub fn list(tarfile: &str) -> Result<Vec<ListEntry>> {
    let tar_data = read_archive(tarfile)?;
    let mut reader = TarReader::new(&tar_data[..]);
    let mut entries = Vec::new();
    while let Some(name) = reader.next_file()? {
        let record = reader.take_file(&name)?;
        entries.push(ListEntry {
            file_type: record.file_type(),
            mode: record.mode(),
            size: record.file_size(),
            name,
        });
    }
    Ok(entries)
}

fn read_archive(tarfile: &str) -> Result<Vec<u8>> {
    let mut file = fs::File::open(tarfile)?;
    let mut tar_data = Vec::new();
    if is_gzip_name(tarfile) {
        gzip_decompress(&mut file, &mut tar_data)?;
    } else {
        file.read_to_end(&mut tar_data)?;
    }
    Ok(tar_data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn write(&self, name: &str, content: &str) -> PathBuf {
            let path = self.path(name);
            fs::write(&path, content).unwrap();
            path
        }
    }

    fn s(path: &Path) -> String {
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn test_pack() {
        let fx = Fixture::new();
        let file1 = fx.write("test_file1.txt", "Hello, World!");
        let file2 = fx.write("test_file2.txt", "Test content 2");
        let test_tar = s(&fx.path("test_pack.tar"));

        pack(&test_tar, &[&file1, &file2]).unwrap();
        assert!(Path::new(&test_tar).exists());

        let tar_data = fs::read(&test_tar).unwrap();
        let mut reader = TarReader::new(&tar_data[..]);
        assert_eq!(reader.next_file().unwrap(), Some(s(&file1)));
        assert_eq!(reader.next_file().unwrap(), Some(s(&file2)));
        assert_eq!(reader.next_file().unwrap(), None);
    }

    #[test]
    fn test_unpack() {
        let fx = Fixture::new();
        fs::create_dir(fx.path("conf")).unwrap();
        fx.write("conf/test_unpack_file.txt", "Unpack test content");
        let test_tar = s(&fx.path("test_unpack.tar"));
        let output_dir = fx.path("test_unpack_output");

        pack(&test_tar, &[fx.path("conf")]).unwrap();
        unpack(&test_tar, &output_dir).unwrap();

        // absolute names are stored; extraction re-roots them
        let stored = fx.path("conf/test_unpack_file.txt");
        let rel = stored.strip_prefix("/").unwrap();
        let content = fs::read_to_string(output_dir.join(rel)).unwrap();
        assert_eq!(content, "Unpack test content");
    }

    #[test]
    fn test_list() {
        let fx = Fixture::new();
        let file1 = fx.write("test_list_file1.txt", "Content 1");
        let file2 = fx.write("test_list_file2.txt", "Content 2 longer");
        let test_tar = s(&fx.path("test_list.tar"));

        pack(&test_tar, &[&file1, &file2]).unwrap();
        let entries = list(&test_tar).unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, s(&file1));
        assert_eq!(entries[0].size, 9);
        assert_eq!(entries[0].file_type, FileType::RegularFile);
        assert_eq!(entries[1].name, s(&file2));
        assert_eq!(entries[1].size, 16);
    }

    #[test]
    fn test_tar_gz() {
        let fx = Fixture::new();
        let file1 = fx.write("test_gz_file1.txt", "GZ test content 1");
        let file2 = fx.write("test_gz_file2.txt", "GZ test content 2 longer");
        let test_tar_gz = s(&fx.path("test_pack.tar.gz"));
        let output_dir = fx.path("test_gz_output");

        pack(&test_tar_gz, &[&file1, &file2]).unwrap();
        let raw = fs::read(&test_tar_gz).unwrap();
        assert_eq!(&raw[..2], &[0x1f, 0x8b]);

        let entries = list(&test_tar_gz).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].size, 17);
        assert_eq!(entries[1].size, 24);

        unpack(&test_tar_gz, &output_dir).unwrap();
        let extracted = output_dir.join(file2.strip_prefix("/").unwrap());
        assert_eq!(fs::read_to_string(extracted).unwrap(), "GZ test content 2 longer");
    }

    #[test]
    fn test_missing_input_is_an_error() {
        let fx = Fixture::new();
        let test_tar = s(&fx.path("never.tar"));
        let missing = fx.path("does_not_exist.txt");
        assert!(matches!(pack(&test_tar, &[missing]), Err(ArchiveError::Walk(_))));
        assert!(matches!(list(&s(&fx.path("nope.tar"))), Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_gzip_name() {
        assert!(is_gzip_name("a.tar.gz"));
        assert!(is_gzip_name("a.tgz"));
        assert!(!is_gzip_name("a.tar"));
    }
}
