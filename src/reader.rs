//! On-demand tar stream reader
//!
//! The source stream is read strictly forward. Looking up a name that has
//! not been seen yet reads (and caches) every entry up to it, because once
//! the stream has moved past an entry it cannot be read again. Cached
//! entries can be dropped to bound memory; a dropped entry is gone for good.
//!
//! ```rust
//! use slate_archive::{TarReader, TarWriter};
//!
//! let mut buf = Vec::new();
//! {
//!     let mut writer = TarWriter::new(&mut buf);
//!     writer.append_file("a.txt", b"first").unwrap();
//!     writer.append_file("b.txt", b"second").unwrap();
//! }
//!
//! let mut reader = TarReader::new(&buf[..]);
//! // reads a.txt off the stream on the way to b.txt
//! assert_eq!(reader.string_for_file("b.txt").unwrap(), "second");
//! assert_eq!(reader.string_for_file("a.txt").unwrap(), "first");
//!
//! reader.drop_file("a.txt");
//! assert!(reader.string_for_file("a.txt").is_err());
//! ```

use std::collections::HashSet;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::Path;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::entry::{FileRecord, FileType};
use crate::error::{ArchiveError, Result};
use crate::extract::extract_entry;
use crate::tar::{BLOCK_SIZE, TarHeader, is_empty_block, padding_for};

/// Permission bits kept from a header's mode field
const MODE_MASK: u32 = 0o7777;

/// Reads a tar stream entry by entry, caching what it has read
pub struct TarReader<R: Read> {
    src: R,
    // insertion order is stream order
    files: IndexMap<String, FileRecord>,
    dropped: HashSet<String>,
    file_ended: bool,
}

impl<R: Read> TarReader<R> {
    /// Bind a reader to a stream. Pass `&mut stream` to keep ownership of
    /// the stream with the caller.
    pub fn new(src: R) -> Self {
        Self {
            src,
            files: IndexMap::new(),
            dropped: HashSet::new(),
            file_ended: false,
        }
    }

    /// An independent, owned stream over the file's contents
    pub fn stream_for_file(&mut self, name: &str) -> Result<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.find(name)?.data().to_vec()))
    }

    /// The file's contents as an owned string
    pub fn string_for_file(&mut self, name: &str) -> Result<String> {
        let data = self.find(name)?.data().to_vec();
        String::from_utf8(data).map_err(|_| ArchiveError::NotText(name.to_string()))
    }

    /// Borrow the cached contents without copying
    pub fn data_for_file(&mut self, name: &str) -> Result<&[u8]> {
        Ok(self.find(name)?.data())
    }

    pub fn record_for_file(&mut self, name: &str) -> Result<&FileRecord> {
        self.find(name)
    }

    pub fn type_for_file(&mut self, name: &str) -> Result<FileType> {
        Ok(self.find(name)?.file_type())
    }

    pub fn mode_for_file(&mut self, name: &str) -> Result<u32> {
        Ok(self.find(name)?.mode())
    }

    /// Read exactly one more entry off the stream and return its name,
    /// or `None` once the end of the archive is reached
    pub fn next_file(&mut self) -> Result<Option<String>> {
        self.read_next()
    }

    /// Read forward until an entry of `file_type` is found. Everything
    /// passed over on the way stays cached.
    pub fn next_file_of_type(&mut self, file_type: FileType) -> Result<Option<String>> {
        while let Some(name) = self.read_next()? {
            if self.files.get(&name).map(FileRecord::file_type) == Some(file_type) {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    /// Forget a cached entry. Later lookups of the name fail even though the
    /// entry was in the archive. Returns whether anything was dropped.
    pub fn drop_file(&mut self, name: &str) -> bool {
        if self.files.shift_remove(name).is_some() {
            self.dropped.insert(name.to_string());
            true
        } else {
            false
        }
    }

    /// Find an entry and hand ownership of it to the caller.
    /// Afterwards the name counts as dropped.
    pub fn take_file(&mut self, name: &str) -> Result<FileRecord> {
        self.find(name)?;
        let record = self
            .files
            .shift_remove(name)
            .ok_or_else(|| ArchiveError::MissingFile(name.to_string()))?;
        self.dropped.insert(name.to_string());
        Ok(record)
    }

    /// Entries currently cached, in archive order
    pub fn cached_files(&self) -> impl Iterator<Item = (&str, &FileRecord)> {
        self.files.iter().map(|(name, record)| (name.as_str(), record))
    }

    /// True once the end-of-archive marker has been consumed
    pub fn eof(&self) -> bool {
        self.file_ended
    }

    /// Write every cached entry, then every entry still on the stream,
    /// beneath `prefix`.
    ///
    /// With `drop_after_extracting` each entry leaves the cache as soon as
    /// it is on disk, so entries that were not cached before hold at most
    /// one entry in memory at a time. A name that appears again later in the
    /// stream is extracted again, so the last copy wins on disk. Extraction
    /// stops at the first failure and does not undo what was already written.
    pub fn extract_to_file_system(
        &mut self,
        prefix: impl AsRef<Path>,
        drop_after_extracting: bool,
    ) -> Result<()> {
        let root = prefix.as_ref();
        fs::create_dir_all(root)?;

        let mut extracted = Vec::new();
        let result = self.extract_all(root, drop_after_extracting, &mut extracted);
        // names released during extraction count as dropped from here on
        self.dropped.extend(extracted);
        result
    }

    fn extract_all(
        &mut self,
        root: &Path,
        drop_after: bool,
        extracted: &mut Vec<String>,
    ) -> Result<()> {
        let cached: Vec<String> = self.files.keys().cloned().collect();
        for name in cached {
            self.extract_one(root, name, drop_after, extracted)?;
        }
        while let Some(name) = self.read_next()? {
            self.extract_one(root, name, drop_after, extracted)?;
        }
        Ok(())
    }

    fn extract_one(
        &mut self,
        root: &Path,
        name: String,
        drop_after: bool,
        extracted: &mut Vec<String>,
    ) -> Result<()> {
        if let Some(record) = self.files.get(&name) {
            extract_entry(root, &name, record)?;
        }
        if drop_after && self.files.shift_remove(&name).is_some() {
            extracted.push(name);
        }
        Ok(())
    }

    fn find(&mut self, name: &str) -> Result<&FileRecord> {
        if self.dropped.contains(name) {
            return Err(ArchiveError::MissingFile(name.to_string()));
        }
        if !self.files.contains_key(name) {
            self.read_files(name)?;
        }
        self.files
            .get(name)
            .ok_or_else(|| ArchiveError::MissingFile(name.to_string()))
    }

    /// Read entries until `target` has been cached
    fn read_files(&mut self, target: &str) -> Result<()> {
        while let Some(name) = self.read_next()? {
            if name == target {
                return Ok(());
            }
        }
        Err(ArchiveError::MissingFile(target.to_string()))
    }

    fn read_next(&mut self) -> Result<Option<String>> {
        loop {
            if self.file_ended {
                return Ok(None);
            }
            let block = match self.read_block()? {
                Some(block) => block,
                None => {
                    // input ended on a block boundary without a footer
                    self.file_ended = true;
                    return Ok(None);
                }
            };
            if is_empty_block(&block) {
                // consume the second footer block, if present
                self.read_block()?;
                self.file_ended = true;
                debug!("reached end of tar stream");
                return Ok(None);
            }

            let header = TarHeader::from_bytes(&block)?;
            let name = header.path();
            let file_type = match FileType::from_typeflag(header.typeflag) {
                Some(file_type) => file_type,
                None if matches!(header.typeflag, b'x' | b'g') => {
                    warn!("skipping pax extended header {:?}", name);
                    self.skip_data(&name, header.size)?;
                    continue;
                }
                None => {
                    return Err(ArchiveError::UnsupportedEntry {
                        name,
                        typeflag: header.typeflag as char,
                    });
                }
            };

            let mode = header.mode & MODE_MASK;
            let record = if file_type.has_content() {
                let record = FileRecord::from_reader(file_type, header.size, &mut self.src, mode)
                    .map_err(|e| truncated(&name, e))?;
                self.skip_data(&name, padding_for(header.size) as u64)?;
                record
            } else {
                // links and special files carry no data blocks
                self.skip_data(&name, header.size + padding_for(header.size) as u64)?;
                let data = if file_type.is_link() {
                    header.linkname.into_bytes()
                } else {
                    Vec::new()
                };
                FileRecord::with_data(file_type, data, mode)
            };

            if self.dropped.contains(&name) {
                warn!("ignoring later copy of dropped entry {:?}", name);
                continue;
            }
            debug!(name = %name, ?file_type, size = record.file_size(), "read tar entry");
            self.files.insert(name.clone(), record);
            return Ok(Some(name));
        }
    }

    /// Read one block; `None` on a clean end of input
    fn read_block(&mut self) -> Result<Option<[u8; BLOCK_SIZE]>> {
        let mut block = [0u8; BLOCK_SIZE];
        let mut filled = 0;
        while filled < BLOCK_SIZE {
            match self.src.read(&mut block[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            BLOCK_SIZE => Ok(Some(block)),
            n => Err(ArchiveError::CorruptArchive(format!(
                "truncated header block ({} of {} bytes)",
                n, BLOCK_SIZE
            ))),
        }
    }

    fn skip_data(&mut self, name: &str, len: u64) -> Result<()> {
        let skipped = io::copy(&mut (&mut self.src).take(len), &mut io::sink())?;
        if skipped < len {
            return Err(ArchiveError::CorruptArchive(format!(
                "stream ended inside entry {:?}",
                name
            )));
        }
        Ok(())
    }
}

fn truncated(name: &str, e: io::Error) -> ArchiveError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ArchiveError::CorruptArchive(format!("{:?}: {}", name, e))
    } else {
        ArchiveError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::TarWriter;

    fn sample_archive() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut writer = TarWriter::new(&mut buf);
            writer.append_directory("conf").unwrap();
            writer.append_file_with_mode("conf/app.yaml", b"replicas: 3\n", 0o600).unwrap();
            writer.append_sym_link("current", "conf").unwrap();
            writer.append_file("notes.txt", b"0123456789ABCDEF__This is a pen.\n").unwrap();
        }
        buf
    }

    #[test]
    fn sequential_read() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        let mut names = Vec::new();
        while let Some(name) = reader.next_file().unwrap() {
            names.push(name);
        }
        assert_eq!(names, ["conf/", "conf/app.yaml", "current", "notes.txt"]);
        assert!(reader.eof());
        assert_eq!(reader.next_file().unwrap(), None);

        assert_eq!(reader.type_for_file("conf/").unwrap(), FileType::Directory);
        assert_eq!(reader.mode_for_file("conf/").unwrap(), 0o755);
        assert_eq!(reader.mode_for_file("conf/app.yaml").unwrap(), 0o600);
        assert_eq!(reader.type_for_file("current").unwrap(), FileType::SymbolicLink);
        assert_eq!(reader.data_for_file("current").unwrap(), b"conf");
        assert_eq!(
            reader.string_for_file("notes.txt").unwrap(),
            "0123456789ABCDEF__This is a pen.\n"
        );
    }

    #[test]
    fn lookup_caches_entries_passed_over() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        assert_eq!(reader.type_for_file("current").unwrap(), FileType::SymbolicLink);
        assert!(!reader.eof());
        let cached: Vec<&str> = reader.cached_files().map(|(name, _)| name).collect();
        assert_eq!(cached, ["conf/", "conf/app.yaml", "current"]);
        assert_eq!(reader.string_for_file("conf/app.yaml").unwrap(), "replicas: 3\n");
    }

    #[test]
    fn entries_stay_available_after_next_file() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        for _ in 0..3 {
            reader.next_file().unwrap();
        }
        let mut content = String::new();
        reader
            .stream_for_file("conf/app.yaml")
            .unwrap()
            .read_to_string(&mut content)
            .unwrap();
        assert_eq!(content, "replicas: 3\n");
        assert!(!reader.eof());
    }

    #[test]
    fn dropped_entries_are_gone() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        assert!(reader.string_for_file("conf/app.yaml").is_ok());
        assert!(reader.drop_file("conf/app.yaml"));
        assert!(!reader.drop_file("conf/app.yaml"));
        let err = reader.string_for_file("conf/app.yaml").unwrap_err();
        assert!(matches!(err, ArchiveError::MissingFile(ref n) if n == "conf/app.yaml"));
        // the lookup did not scan to the end looking for it
        assert!(!reader.eof());
        assert!(reader.string_for_file("notes.txt").is_ok());
    }

    #[test]
    fn take_file_hands_over_ownership() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        let record = reader.take_file("notes.txt").unwrap();
        assert_eq!(record.file_type(), FileType::RegularFile);
        assert!(record.into_data().starts_with(b"0123"));
        assert!(matches!(reader.take_file("notes.txt"), Err(ArchiveError::MissingFile(_))));
    }

    #[test]
    fn missing_file_scans_to_end() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        let err = reader.stream_for_file("nope.txt").unwrap_err();
        assert!(err.to_string().contains("nope.txt"));
        assert!(reader.eof());
        assert_eq!(reader.cached_files().count(), 4);
    }

    #[test]
    fn next_file_of_type() {
        let data = sample_archive();
        let mut reader = TarReader::new(&data[..]);
        assert_eq!(
            reader.next_file_of_type(FileType::SymbolicLink).unwrap().as_deref(),
            Some("current")
        );
        assert_eq!(reader.next_file_of_type(FileType::Directory).unwrap(), None);
        assert!(reader.eof());
        // passed-over entries were cached
        assert!(reader.data_for_file("conf/app.yaml").is_ok());
    }

    #[test]
    fn borrowed_stream_is_left_after_footer() {
        let mut data = sample_archive();
        data.extend_from_slice(b"trailing");
        let mut src = &data[..];
        {
            let mut reader = TarReader::new(&mut src);
            while reader.next_file().unwrap().is_some() {}
        }
        assert_eq!(src, b"trailing");
    }

    #[test]
    fn missing_footer_is_tolerated() {
        let data = sample_archive();
        let cut = &data[..data.len() - 2 * BLOCK_SIZE];
        let mut reader = TarReader::new(cut);
        let mut count = 0;
        while reader.next_file().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 4);
        assert!(reader.eof());
    }

    #[test]
    fn bad_checksum_is_corrupt() {
        let mut data = sample_archive();
        data[0] = b'C';
        let mut reader = TarReader::new(&data[..]);
        assert!(matches!(reader.next_file(), Err(ArchiveError::CorruptArchive(_))));
    }

    #[test]
    fn truncated_data_is_corrupt() {
        let mut buf = Vec::new();
        {
            let mut writer = TarWriter::new(&mut buf);
            writer.append_file("big.bin", &[7u8; 1000]).unwrap();
        }
        let cut = &buf[..BLOCK_SIZE + 600];
        let mut reader = TarReader::new(cut);
        let err = reader.next_file().unwrap_err();
        assert!(matches!(err, ArchiveError::CorruptArchive(_)), "{err}");

        let half_header = &buf[..100];
        let mut reader = TarReader::new(half_header);
        assert!(matches!(reader.next_file(), Err(ArchiveError::CorruptArchive(_))));
    }

    #[test]
    fn gnu_long_name_is_unsupported() {
        let mut header = TarHeader::new("././@LongLink".to_string(), 0o644, 5);
        header.typeflag = b'L';
        let mut data = header.to_bytes().unwrap().to_vec();
        data.extend_from_slice(&[b'x'; BLOCK_SIZE]);
        data.extend_from_slice(&[0u8; 2 * BLOCK_SIZE]);
        let mut reader = TarReader::new(&data[..]);
        let err = reader.next_file().unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedEntry { typeflag: 'L', .. }), "{err}");
    }

    #[test]
    fn pax_headers_are_skipped() {
        let mut pax = TarHeader::new("PaxHeaders/a.txt".to_string(), 0o644, 20);
        pax.typeflag = b'x';
        let mut data = pax.to_bytes().unwrap().to_vec();
        let mut record = b"20 path=longer.txt\n".to_vec();
        record.resize(BLOCK_SIZE, 0);
        data.extend_from_slice(&record);
        {
            let mut writer = TarWriter::new(&mut data);
            writer.append_file("a.txt", b"after pax").unwrap();
        }
        let mut reader = TarReader::new(&data[..]);
        assert_eq!(reader.next_file().unwrap().as_deref(), Some("a.txt"));
        assert_eq!(reader.string_for_file("a.txt").unwrap(), "after pax");
    }

    #[test]
    fn binary_content_is_not_text() {
        let mut buf = Vec::new();
        {
            let mut writer = TarWriter::new(&mut buf);
            writer.append_file("key.der", &[0x30, 0x82, 0xff, 0xfe]).unwrap();
        }
        let mut reader = TarReader::new(&buf[..]);
        assert!(matches!(reader.string_for_file("key.der"), Err(ArchiveError::NotText(_))));
        assert_eq!(reader.data_for_file("key.der").unwrap(), &[0x30, 0x82, 0xff, 0xfe]);
    }

    #[test]
    fn legacy_typeflag_and_type_bits_in_mode() {
        let mut header = TarHeader::new("old.txt".to_string(), 0o100644, 3);
        header.typeflag = 0;
        let mut data = header.to_bytes().unwrap().to_vec();
        let mut content = b"old".to_vec();
        content.resize(BLOCK_SIZE, 0);
        data.extend_from_slice(&content);
        let mut reader = TarReader::new(&data[..]);
        assert_eq!(reader.type_for_file("old.txt").unwrap(), FileType::RegularFile);
        assert_eq!(reader.mode_for_file("old.txt").unwrap(), 0o644);
    }
}
