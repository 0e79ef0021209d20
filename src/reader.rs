//! Archive reader used to consume the emitted layout.
//!
//! Locates the end records through the fixed-size EOCD comment, follows
//! the ZIP64 locator and parses the central directory up front; entry
//! data is then read on demand. Skippable padding and start-of-part
//! frames inside an entry's compressed span are skipped natively by the
//! zstd decoder.

use crate::error::{BurstError, Result};
use crate::record::{self, TailLocator};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// Entry in the archive's central directory.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub name: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub compression_method: u16,
    pub crc32: u32,
    /// Unix mode, including file type bits.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub dos_time: u16,
    pub dos_date: u16,
    /// Offset of the entry's local file header.
    pub header_offset: u64,
}

/// Random-access archive reader.
pub struct ArchiveReader<R: Read + Seek> {
    input: R,
    entries: Vec<ArchiveEntry>,
    tail_locator: TailLocator,
}

impl ArchiveReader<BufReader<File>> {
    /// Open an archive and read its central directory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ArchiveReader<R> {
    /// Read the central directory from any seekable source.
    pub fn from_reader(mut input: R) -> Result<Self> {
        let len = input.seek(SeekFrom::End(0))?;
        let trailer_len = record::END_OF_CENTRAL_DIRECTORY_LEN + record::TAIL_COMMENT_LEN;
        if len < trailer_len {
            return Err(BurstError::InvalidFormat(
                "archive too small for an end record".to_string(),
            ));
        }

        // The comment has a fixed length, so the EOCD sits at a fixed
        // distance from the end.
        let mut eocd_buf = vec![0u8; trailer_len as usize];
        input.seek(SeekFrom::Start(len - trailer_len))?;
        input.read_exact(&mut eocd_buf)?;
        let eocd = record::parse_end_of_central_directory(&eocd_buf)?;
        let tail_locator = record::parse_tail_comment(&eocd.comment)?;

        let (entry_count, cd_offset, cd_size) =
            match Self::read_zip64_end(&mut input, len, trailer_len)? {
                Some(zip64) => (zip64.entry_count, zip64.cd_offset, zip64.cd_size),
                None => (eocd.entry_count, eocd.cd_offset, eocd.cd_size),
            };

        input.seek(SeekFrom::Start(cd_offset))?;
        let mut cd = vec![0u8; cd_size as usize];
        input.read_exact(&mut cd)?;

        let mut entries = Vec::with_capacity(entry_count as usize);
        let mut cursor = 0usize;
        for _ in 0..entry_count {
            let parsed = record::parse_central_file_header(&cd[cursor..])?;
            cursor += parsed.header_len as usize;
            // The writer never lists padding headers; skip the sentinel
            // defensively anyway.
            if parsed.name == record::PADDING_ENTRY_NAME {
                continue;
            }
            entries.push(ArchiveEntry {
                name: parsed.name,
                compressed_size: parsed.compressed_size,
                uncompressed_size: parsed.uncompressed_size,
                compression_method: parsed.method,
                crc32: parsed.crc32,
                mode: parsed.mode,
                uid: parsed.uid,
                gid: parsed.gid,
                dos_time: parsed.dos_time,
                dos_date: parsed.dos_date,
                header_offset: parsed.local_header_offset,
            });
        }

        Ok(Self {
            input,
            entries,
            tail_locator,
        })
    }

    /// Follow the ZIP64 EOCD locator if one precedes the EOCD.
    fn read_zip64_end(
        input: &mut R,
        len: u64,
        trailer_len: u64,
    ) -> Result<Option<record::ParsedZip64Eocd>> {
        if len < trailer_len + record::ZIP64_EOCD_LOCATOR_LEN {
            return Ok(None);
        }
        let mut locator_buf = [0u8; record::ZIP64_EOCD_LOCATOR_LEN as usize];
        input.seek(SeekFrom::Start(
            len - trailer_len - record::ZIP64_EOCD_LOCATOR_LEN,
        ))?;
        input.read_exact(&mut locator_buf)?;
        if locator_buf[..4] != record::ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes() {
            return Ok(None);
        }
        let zip64_offset = record::parse_zip64_eocd_locator(&locator_buf)?;

        let mut zip64_buf = [0u8; record::ZIP64_EOCD_LEN as usize];
        input.seek(SeekFrom::Start(zip64_offset))?;
        input.read_exact(&mut zip64_buf)?;
        Ok(Some(record::parse_zip64_eocd(&zip64_buf)?))
    }

    /// All central directory entries, in archive order.
    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    /// Find an entry by name.
    pub fn find_entry(&self, name: &str) -> Option<&ArchiveEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// The tail hint parsed from the EOCD comment.
    pub fn tail_locator(&self) -> TailLocator {
        self.tail_locator
    }

    /// Read an entry's decompressed content.
    pub fn read_entry(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>> {
        self.input.seek(SeekFrom::Start(entry.header_offset))?;

        let signature = self.read_u32()?;
        if signature != record::LOCAL_FILE_HEADER_SIGNATURE {
            return Err(BurstError::InvalidFormat(
                "invalid local file header signature".to_string(),
            ));
        }
        // Skip to the name and extra lengths, then past both fields.
        self.input.seek(SeekFrom::Current(22))?;
        let name_len = self.read_u16()? as i64;
        let extra_len = self.read_u16()? as i64;
        self.input.seek(SeekFrom::Current(name_len + extra_len))?;

        let mut compressed = vec![0u8; entry.compressed_size as usize];
        self.input.read_exact(&mut compressed)?;

        match entry.compression_method {
            record::COMPRESSION_STORE => Ok(compressed),
            record::COMPRESSION_ZSTD => zstd::stream::decode_all(&compressed[..])
                .map_err(|e| BurstError::Codec(e.to_string())),
            other => Err(BurstError::InvalidFormat(format!(
                "unsupported compression method {}",
                other
            ))),
        }
    }

    /// Read an entry by name.
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| BurstError::InvalidArgument(format!("no entry named {:?}", name)))?
            .clone();
        self.read_entry(&entry)
    }

    fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.input.read_exact(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.input.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }
}
