//! Wire layout of every record the writer emits: ZIP local/central/end
//! records, data descriptors, and the skippable frames that carry padding
//! and part-start metadata.
//!
//! Everything is little-endian and encoded/decoded through explicit
//! routines; no struct is ever cast onto raw bytes.

use crate::error::{BurstError, Result};

/// ZIP local file header signature
pub const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP data descriptor signature
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// ZIP central directory file header signature
pub const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x06064b50;

/// ZIP64 end of central directory locator signature
pub const ZIP64_EOCD_LOCATOR_SIGNATURE: u32 = 0x07064b50;

/// Zstandard skippable-frame magic. Padding and start-of-part frames use
/// it so that any zstd frame decoder (including the kernel ingest path)
/// skips them without special casing.
pub const SKIPPABLE_FRAME_MAGIC: u32 = 0x184D2A50;

/// Magic of a regular Zstandard compressed frame.
pub const ZSTD_FRAME_MAGIC: u32 = 0xFD2FB528;

/// Skippable payload type tag: zero-filled padding.
pub const SKIPPABLE_TAG_PADDING: u8 = 0;

/// Skippable payload type tag: start-of-part marker.
pub const SKIPPABLE_TAG_PART_START: u8 = 1;

/// Smallest legal skippable frame: magic + payload length, empty payload.
pub const MIN_SKIPPABLE_FRAME: u64 = 8;

/// Total size of a start-of-part frame: 8-byte header + 16-byte payload.
pub const PART_START_FRAME_LEN: u64 = 24;

/// Sentinel filename identifying padding local headers. Padding entries
/// never appear in the central directory; readers that walk local headers
/// skip this name.
pub const PADDING_ENTRY_NAME: &str = ".burst-padding";

/// Fixed LFH prefix length.
pub const LOCAL_FILE_HEADER_LEN: u64 = 30;

/// The smallest padding LFH: fixed prefix plus the sentinel name.
pub const PADDING_LFH_MIN: u64 = LOCAL_FILE_HEADER_LEN + PADDING_ENTRY_NAME.len() as u64;

/// Fixed CDFH prefix length.
pub const CENTRAL_FILE_HEADER_LEN: u64 = 46;

/// Data descriptor with 32-bit sizes.
pub const DATA_DESCRIPTOR_LEN: u64 = 16;

/// Data descriptor with ZIP64 64-bit sizes.
pub const DATA_DESCRIPTOR_ZIP64_LEN: u64 = 24;

/// End of central directory record, sans comment.
pub const END_OF_CENTRAL_DIRECTORY_LEN: u64 = 22;

/// ZIP64 end of central directory record as this writer emits it.
pub const ZIP64_EOCD_LEN: u64 = 56;

/// ZIP64 end of central directory locator.
pub const ZIP64_EOCD_LOCATOR_LEN: u64 = 20;

/// 32-bit field value meaning "look in the ZIP64 extra field".
pub const ZIP64_SENTINEL: u32 = u32::MAX;

/// ZIP64 extended information extra field id.
pub const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Info-ZIP Unix uid/gid extra field id.
pub const UNIX_EXTRA_ID: u16 = 0x7875;

/// Compression method: stored.
pub const COMPRESSION_STORE: u16 = 0;

/// Compression method: Zstandard.
pub const COMPRESSION_ZSTD: u16 = 93;

/// General purpose flag bit 3: sizes and CRC live in a trailing data
/// descriptor.
pub const FLAG_DATA_DESCRIPTOR: u16 = 1 << 3;

/// Version needed to extract entries relying on ZIP64 structures only.
pub const VERSION_NEEDED_ZIP64: u16 = 45;

/// Version needed to extract Zstandard-compressed entries.
pub const VERSION_NEEDED_ZSTD: u16 = 63;

/// Version made by: upper byte 3 (Unix), lower byte the supported
/// specification version.
pub const VERSION_MADE_BY: u16 = (3 << 8) | 63;

/// DOS directory attribute bit, set in external attributes for
/// directories alongside the Unix mode.
pub const DOS_DIRECTORY_ATTRIBUTE: u32 = 0x10;

/// Fixed length of the end-of-central-directory comment.
pub const TAIL_COMMENT_LEN: u64 = 8;

/// Magic leading the 8-byte EOCD comment.
pub const TAIL_COMMENT_MAGIC: [u8; 4] = *b"BRST";

/// 24-bit sentinel: no complete CDFH begins within the tail part.
const TAIL_NO_HEADER: u32 = 0xFF_FFFF;

/// Where a tail-only reader finds the first parseable central directory
/// record, as encoded in the EOCD comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailLocator {
    /// Offset from the tail start of the first complete CDFH. Zero also
    /// covers the case where the whole central directory lies within the
    /// tail part; the reader disambiguates against the ZIP64 record.
    Offset(u32),
    /// The central directory extends past the tail but no complete CDFH
    /// begins inside it. Unreachable with bounded per-entry headers, but
    /// readers must handle it.
    NoHeaderInTail,
}

/// Fields of a local file header, borrowed from the entry being written.
/// `encode` emits the fixed prefix and the name; any extra-field bytes
/// (only padding headers carry them) are streamed by the caller.
pub struct LocalFileHeader<'a> {
    pub name: &'a str,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub extra_len: u16,
}

impl LocalFileHeader<'_> {
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(LOCAL_FILE_HEADER_LEN as usize + self.name.len());
        buf.extend_from_slice(&LOCAL_FILE_HEADER_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.dos_time.to_le_bytes());
        buf.extend_from_slice(&self.dos_date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&self.compressed_size.to_le_bytes());
        buf.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&self.extra_len.to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf
    }
}

/// Fields of a central directory file header.
pub struct CentralFileHeader<'a> {
    pub name: &'a str,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
}

impl CentralFileHeader<'_> {
    pub fn encode(&self) -> Vec<u8> {
        // ZIP64 extra carries only the overflowed fields, in this order.
        let mut zip64: Vec<u8> = Vec::new();
        if self.uncompressed_size > u32::MAX as u64 {
            zip64.extend_from_slice(&self.uncompressed_size.to_le_bytes());
        }
        if self.compressed_size > u32::MAX as u64 {
            zip64.extend_from_slice(&self.compressed_size.to_le_bytes());
        }
        if self.local_header_offset > u32::MAX as u64 {
            zip64.extend_from_slice(&self.local_header_offset.to_le_bytes());
        }

        let mut extra: Vec<u8> = Vec::new();
        // Info-ZIP Unix extra: version 1, 4-byte uid and gid.
        extra.extend_from_slice(&UNIX_EXTRA_ID.to_le_bytes());
        extra.extend_from_slice(&11u16.to_le_bytes());
        extra.push(1);
        extra.push(4);
        extra.extend_from_slice(&self.uid.to_le_bytes());
        extra.push(4);
        extra.extend_from_slice(&self.gid.to_le_bytes());
        if !zip64.is_empty() {
            extra.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
            extra.extend_from_slice(&(zip64.len() as u16).to_le_bytes());
            extra.extend_from_slice(&zip64);
        }

        let mut external = (self.mode & 0xFFFF) << 16;
        if self.name.ends_with('/') {
            external |= DOS_DIRECTORY_ATTRIBUTE;
        }

        let mut buf =
            Vec::with_capacity(CENTRAL_FILE_HEADER_LEN as usize + self.name.len() + extra.len());
        buf.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
        buf.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
        buf.extend_from_slice(&self.version_needed.to_le_bytes());
        buf.extend_from_slice(&self.flags.to_le_bytes());
        buf.extend_from_slice(&self.method.to_le_bytes());
        buf.extend_from_slice(&self.dos_time.to_le_bytes());
        buf.extend_from_slice(&self.dos_date.to_le_bytes());
        buf.extend_from_slice(&self.crc32.to_le_bytes());
        buf.extend_from_slice(&cap_u32(self.compressed_size).to_le_bytes());
        buf.extend_from_slice(&cap_u32(self.uncompressed_size).to_le_bytes());
        buf.extend_from_slice(&(self.name.len() as u16).to_le_bytes());
        buf.extend_from_slice(&(extra.len() as u16).to_le_bytes());
        buf.extend_from_slice(&0u16.to_le_bytes()); // comment len
        buf.extend_from_slice(&0u16.to_le_bytes()); // disk number start
        buf.extend_from_slice(&0u16.to_le_bytes()); // internal attributes
        buf.extend_from_slice(&external.to_le_bytes());
        buf.extend_from_slice(&cap_u32(self.local_header_offset).to_le_bytes());
        buf.extend_from_slice(self.name.as_bytes());
        buf.extend_from_slice(&extra);
        buf
    }
}

fn cap_u32(v: u64) -> u32 {
    if v > u32::MAX as u64 {
        ZIP64_SENTINEL
    } else {
        v as u32
    }
}

/// Encode a data descriptor, with 64-bit sizes when `zip64` is set.
pub fn encode_data_descriptor(
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    zip64: bool,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(DATA_DESCRIPTOR_ZIP64_LEN as usize);
    buf.extend_from_slice(&DATA_DESCRIPTOR_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&crc32.to_le_bytes());
    if zip64 {
        buf.extend_from_slice(&compressed_size.to_le_bytes());
        buf.extend_from_slice(&uncompressed_size.to_le_bytes());
    } else {
        buf.extend_from_slice(&(compressed_size as u32).to_le_bytes());
        buf.extend_from_slice(&(uncompressed_size as u32).to_le_bytes());
    }
    buf
}

/// Header of a skippable frame with the given payload length.
pub fn encode_skippable_header(payload_len: u32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf[..4].copy_from_slice(&SKIPPABLE_FRAME_MAGIC.to_le_bytes());
    buf[4..].copy_from_slice(&payload_len.to_le_bytes());
    buf
}

/// A complete start-of-part frame. The 16-byte payload is the type tag,
/// the uncompressed byte offset within the current entry at which the
/// part boundary falls, and reserved zeros.
pub fn encode_part_start_frame(uncompressed_offset: u64) -> [u8; PART_START_FRAME_LEN as usize] {
    let mut buf = [0u8; PART_START_FRAME_LEN as usize];
    buf[..8].copy_from_slice(&encode_skippable_header(16));
    buf[8] = SKIPPABLE_TAG_PART_START;
    buf[9..17].copy_from_slice(&uncompressed_offset.to_le_bytes());
    buf
}

/// Encode the ZIP64 end of central directory record.
pub fn encode_zip64_eocd(entry_count: u64, cd_size: u64, cd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ZIP64_EOCD_LEN as usize);
    buf.extend_from_slice(&ZIP64_EOCD_SIGNATURE.to_le_bytes());
    // Size of the record below this field.
    buf.extend_from_slice(&44u64.to_le_bytes());
    buf.extend_from_slice(&VERSION_MADE_BY.to_le_bytes());
    buf.extend_from_slice(&VERSION_NEEDED_ZIP64.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // this disk
    buf.extend_from_slice(&0u32.to_le_bytes()); // disk with the CD
    buf.extend_from_slice(&entry_count.to_le_bytes());
    buf.extend_from_slice(&entry_count.to_le_bytes());
    buf.extend_from_slice(&cd_size.to_le_bytes());
    buf.extend_from_slice(&cd_offset.to_le_bytes());
    buf
}

/// Encode the ZIP64 end of central directory locator.
pub fn encode_zip64_eocd_locator(zip64_eocd_offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(ZIP64_EOCD_LOCATOR_LEN as usize);
    buf.extend_from_slice(&ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes()); // disk with the ZIP64 EOCD
    buf.extend_from_slice(&zip64_eocd_offset.to_le_bytes());
    buf.extend_from_slice(&1u32.to_le_bytes()); // total disks
    buf
}

/// Encode the standard end of central directory record with its comment.
pub fn encode_end_of_central_directory(
    entry_count: u64,
    cd_size: u64,
    cd_offset: u64,
    comment: &[u8],
) -> Vec<u8> {
    let count16 = if entry_count > u16::MAX as u64 {
        u16::MAX
    } else {
        entry_count as u16
    };
    let mut buf = Vec::with_capacity(END_OF_CENTRAL_DIRECTORY_LEN as usize + comment.len());
    buf.extend_from_slice(&END_OF_CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes()); // this disk
    buf.extend_from_slice(&0u16.to_le_bytes()); // disk with the CD
    buf.extend_from_slice(&count16.to_le_bytes());
    buf.extend_from_slice(&count16.to_le_bytes());
    buf.extend_from_slice(&cap_u32(cd_size).to_le_bytes());
    buf.extend_from_slice(&cap_u32(cd_offset).to_le_bytes());
    buf.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    buf.extend_from_slice(comment);
    buf
}

/// Encode the fixed 8-byte EOCD comment.
pub fn encode_tail_comment(locator: TailLocator) -> [u8; TAIL_COMMENT_LEN as usize] {
    let value = match locator {
        TailLocator::Offset(v) => {
            debug_assert!(v < TAIL_NO_HEADER);
            v
        }
        TailLocator::NoHeaderInTail => TAIL_NO_HEADER,
    };
    let mut buf = [0u8; TAIL_COMMENT_LEN as usize];
    buf[..4].copy_from_slice(&TAIL_COMMENT_MAGIC);
    buf[4..7].copy_from_slice(&value.to_le_bytes()[..3]);
    buf
}

/// Parse the fixed 8-byte EOCD comment.
pub fn parse_tail_comment(comment: &[u8]) -> Result<TailLocator> {
    if comment.len() != TAIL_COMMENT_LEN as usize {
        return Err(BurstError::InvalidFormat(format!(
            "tail comment is {} bytes, expected {}",
            comment.len(),
            TAIL_COMMENT_LEN
        )));
    }
    if comment[..4] != TAIL_COMMENT_MAGIC {
        return Err(BurstError::InvalidFormat(
            "tail comment magic mismatch".to_string(),
        ));
    }
    let value = u32::from_le_bytes([comment[4], comment[5], comment[6], 0]);
    if value == TAIL_NO_HEADER {
        Ok(TailLocator::NoHeaderInTail)
    } else {
        Ok(TailLocator::Offset(value))
    }
}

/// A parsed local file header.
#[derive(Debug, Clone)]
pub struct ParsedLocalHeader {
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: String,
    pub extra_len: u16,
    /// Fixed prefix + name + extra field.
    pub header_len: u64,
}

pub fn parse_local_file_header(buf: &[u8]) -> Result<ParsedLocalHeader> {
    need(buf, LOCAL_FILE_HEADER_LEN as usize, "local file header")?;
    if u32_at(buf, 0) != LOCAL_FILE_HEADER_SIGNATURE {
        return Err(BurstError::InvalidFormat(
            "invalid local file header signature".to_string(),
        ));
    }
    let name_len = u16_at(buf, 26) as usize;
    let extra_len = u16_at(buf, 28);
    need(
        buf,
        LOCAL_FILE_HEADER_LEN as usize + name_len,
        "local file header name",
    )?;
    let name = parse_name(&buf[30..30 + name_len])?;
    Ok(ParsedLocalHeader {
        version_needed: u16_at(buf, 4),
        flags: u16_at(buf, 6),
        method: u16_at(buf, 8),
        dos_time: u16_at(buf, 10),
        dos_date: u16_at(buf, 12),
        crc32: u32_at(buf, 14),
        compressed_size: u32_at(buf, 18),
        uncompressed_size: u32_at(buf, 22),
        name,
        extra_len,
        header_len: LOCAL_FILE_HEADER_LEN + name_len as u64 + extra_len as u64,
    })
}

/// A parsed central directory file header with the Unix and ZIP64 extra
/// fields already applied.
#[derive(Debug, Clone)]
pub struct ParsedCentralHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub local_header_offset: u64,
    pub external_attributes: u32,
    /// Unix mode, from the upper 16 bits of the external attributes.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub name: String,
    /// Fixed prefix + name + extra + comment.
    pub header_len: u64,
}

pub fn parse_central_file_header(buf: &[u8]) -> Result<ParsedCentralHeader> {
    need(buf, CENTRAL_FILE_HEADER_LEN as usize, "central file header")?;
    if u32_at(buf, 0) != CENTRAL_DIRECTORY_SIGNATURE {
        return Err(BurstError::InvalidFormat(
            "invalid central directory signature".to_string(),
        ));
    }
    let name_len = u16_at(buf, 28) as usize;
    let extra_len = u16_at(buf, 30) as usize;
    let comment_len = u16_at(buf, 32) as usize;
    let total = CENTRAL_FILE_HEADER_LEN as usize + name_len + extra_len + comment_len;
    need(buf, total, "central file header fields")?;

    let external_attributes = u32_at(buf, 38);
    let mut header = ParsedCentralHeader {
        version_made_by: u16_at(buf, 4),
        version_needed: u16_at(buf, 6),
        flags: u16_at(buf, 8),
        method: u16_at(buf, 10),
        dos_time: u16_at(buf, 12),
        dos_date: u16_at(buf, 14),
        crc32: u32_at(buf, 16),
        compressed_size: u32_at(buf, 20) as u64,
        uncompressed_size: u32_at(buf, 24) as u64,
        local_header_offset: u32_at(buf, 42) as u64,
        external_attributes,
        mode: external_attributes >> 16,
        uid: 0,
        gid: 0,
        name: parse_name(&buf[46..46 + name_len])?,
        header_len: total as u64,
    };

    let extra = &buf[46 + name_len..46 + name_len + extra_len];
    apply_extra_fields(&mut header, extra)?;
    Ok(header)
}

fn apply_extra_fields(header: &mut ParsedCentralHeader, mut extra: &[u8]) -> Result<()> {
    while extra.len() >= 4 {
        let id = u16_at(extra, 0);
        let size = u16_at(extra, 2) as usize;
        if extra.len() < 4 + size {
            return Err(BurstError::InvalidFormat(
                "truncated extra field block".to_string(),
            ));
        }
        let data = &extra[4..4 + size];
        match id {
            ZIP64_EXTRA_ID => {
                // Only the sentinel-valued fields are present, in the
                // order usize, csize, local header offset.
                let mut data = data;
                if header.uncompressed_size == ZIP64_SENTINEL as u64 {
                    header.uncompressed_size = take_u64(&mut data, "ZIP64 uncompressed size")?;
                }
                if header.compressed_size == ZIP64_SENTINEL as u64 {
                    header.compressed_size = take_u64(&mut data, "ZIP64 compressed size")?;
                }
                if header.local_header_offset == ZIP64_SENTINEL as u64 {
                    header.local_header_offset = take_u64(&mut data, "ZIP64 header offset")?;
                }
            }
            UNIX_EXTRA_ID => {
                // version | uid size | uid | gid size | gid
                let mut data = data;
                let _version = take_u8(&mut data, "unix extra version")?;
                header.uid = take_sized_id(&mut data, "uid")?;
                header.gid = take_sized_id(&mut data, "gid")?;
            }
            _ => {}
        }
        extra = &extra[4 + size..];
    }
    Ok(())
}

/// Parsed end of central directory record.
#[derive(Debug, Clone)]
pub struct ParsedEndOfCentralDirectory {
    pub entry_count: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub comment: Vec<u8>,
}

pub fn parse_end_of_central_directory(buf: &[u8]) -> Result<ParsedEndOfCentralDirectory> {
    need(
        buf,
        END_OF_CENTRAL_DIRECTORY_LEN as usize,
        "end of central directory",
    )?;
    if u32_at(buf, 0) != END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(BurstError::InvalidFormat(
            "invalid end of central directory signature".to_string(),
        ));
    }
    let comment_len = u16_at(buf, 20) as usize;
    need(
        buf,
        END_OF_CENTRAL_DIRECTORY_LEN as usize + comment_len,
        "end of central directory comment",
    )?;
    Ok(ParsedEndOfCentralDirectory {
        entry_count: u16_at(buf, 10) as u64,
        cd_size: u32_at(buf, 12) as u64,
        cd_offset: u32_at(buf, 16) as u64,
        comment: buf[22..22 + comment_len].to_vec(),
    })
}

/// Parsed ZIP64 end of central directory record.
#[derive(Debug, Clone, Copy)]
pub struct ParsedZip64Eocd {
    pub entry_count: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

pub fn parse_zip64_eocd(buf: &[u8]) -> Result<ParsedZip64Eocd> {
    need(buf, ZIP64_EOCD_LEN as usize, "ZIP64 end of central directory")?;
    if u32_at(buf, 0) != ZIP64_EOCD_SIGNATURE {
        return Err(BurstError::InvalidFormat(
            "invalid ZIP64 end of central directory signature".to_string(),
        ));
    }
    Ok(ParsedZip64Eocd {
        entry_count: u64_at(buf, 32),
        cd_size: u64_at(buf, 40),
        cd_offset: u64_at(buf, 48),
    })
}

/// Parse the ZIP64 EOCD locator; returns the ZIP64 EOCD offset.
pub fn parse_zip64_eocd_locator(buf: &[u8]) -> Result<u64> {
    need(buf, ZIP64_EOCD_LOCATOR_LEN as usize, "ZIP64 EOCD locator")?;
    if u32_at(buf, 0) != ZIP64_EOCD_LOCATOR_SIGNATURE {
        return Err(BurstError::InvalidFormat(
            "invalid ZIP64 EOCD locator signature".to_string(),
        ));
    }
    Ok(u64_at(buf, 8))
}

fn need(buf: &[u8], len: usize, what: &str) -> Result<()> {
    if buf.len() < len {
        Err(BurstError::InvalidFormat(format!("truncated {}", what)))
    } else {
        Ok(())
    }
}

fn parse_name(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| BurstError::InvalidFormat("entry name is not UTF-8".to_string()))
}

fn u16_at(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(b)
}

fn u64_at(buf: &[u8], offset: usize) -> u64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&buf[offset..offset + 8]);
    u64::from_le_bytes(b)
}

fn take_u8(data: &mut &[u8], what: &str) -> Result<u8> {
    if data.is_empty() {
        return Err(BurstError::InvalidFormat(format!("truncated {}", what)));
    }
    let v = data[0];
    *data = &data[1..];
    Ok(v)
}

fn take_u64(data: &mut &[u8], what: &str) -> Result<u64> {
    if data.len() < 8 {
        return Err(BurstError::InvalidFormat(format!("truncated {}", what)));
    }
    let v = u64_at(data, 0);
    *data = &data[8..];
    Ok(v)
}

/// Read a size-prefixed uid/gid from the Unix extra field. The writer
/// always emits 4-byte ids but 1, 2 and 8 are legal on the wire.
fn take_sized_id(data: &mut &[u8], what: &str) -> Result<u32> {
    let size = take_u8(data, what)? as usize;
    if data.len() < size {
        return Err(BurstError::InvalidFormat(format!("truncated {}", what)));
    }
    let mut bytes = [0u8; 8];
    match size {
        1 | 2 | 4 | 8 => bytes[..size].copy_from_slice(&data[..size]),
        _ => {
            return Err(BurstError::InvalidFormat(format!(
                "unsupported {} size {}",
                what, size
            )))
        }
    }
    *data = &data[size..];
    Ok(u64::from_le_bytes(bytes) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_header_roundtrip() {
        let header = LocalFileHeader {
            name: "dir/file.txt",
            version_needed: VERSION_NEEDED_ZSTD,
            flags: FLAG_DATA_DESCRIPTOR,
            method: COMPRESSION_ZSTD,
            dos_time: 0x6a33,
            dos_date: 0x5a21,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            extra_len: 0,
        };
        let bytes = header.encode();
        assert_eq!(bytes.len(), 30 + "dir/file.txt".len());

        let parsed = parse_local_file_header(&bytes).unwrap();
        assert_eq!(parsed.name, "dir/file.txt");
        assert_eq!(parsed.method, COMPRESSION_ZSTD);
        assert_eq!(parsed.flags, FLAG_DATA_DESCRIPTOR);
        assert_eq!(parsed.dos_time, 0x6a33);
        assert_eq!(parsed.dos_date, 0x5a21);
        assert_eq!(parsed.header_len, bytes.len() as u64);
    }

    #[test]
    fn central_header_roundtrip_with_unix_ids() {
        let header = CentralFileHeader {
            name: "a.bin",
            version_needed: VERSION_NEEDED_ZSTD,
            flags: FLAG_DATA_DESCRIPTOR,
            method: COMPRESSION_ZSTD,
            dos_time: 1,
            dos_date: 2,
            crc32: 0xdeadbeef,
            compressed_size: 100,
            uncompressed_size: 200,
            local_header_offset: 300,
            mode: 0o100644,
            uid: 1000,
            gid: 1001,
        };
        let bytes = header.encode();
        let parsed = parse_central_file_header(&bytes).unwrap();
        assert_eq!(parsed.name, "a.bin");
        assert_eq!(parsed.crc32, 0xdeadbeef);
        assert_eq!(parsed.compressed_size, 100);
        assert_eq!(parsed.uncompressed_size, 200);
        assert_eq!(parsed.local_header_offset, 300);
        assert_eq!(parsed.mode, 0o100644);
        assert_eq!(parsed.uid, 1000);
        assert_eq!(parsed.gid, 1001);
        assert_eq!(parsed.version_made_by >> 8, 3);
    }

    #[test]
    fn central_header_promotes_overflowed_fields() {
        let big = u32::MAX as u64 + 17;
        let header = CentralFileHeader {
            name: "big",
            version_needed: VERSION_NEEDED_ZSTD,
            flags: FLAG_DATA_DESCRIPTOR,
            method: COMPRESSION_ZSTD,
            dos_time: 0,
            dos_date: 0,
            crc32: 1,
            compressed_size: 77,
            uncompressed_size: big,
            local_header_offset: big + 5,
            mode: 0o100600,
            uid: 0,
            gid: 0,
        };
        let bytes = header.encode();
        // The 32-bit fields hold the sentinel...
        assert_eq!(u32_at(&bytes, 24), ZIP64_SENTINEL);
        assert_eq!(u32_at(&bytes, 42), ZIP64_SENTINEL);
        // ...but the compressed size stays inline.
        assert_eq!(u32_at(&bytes, 20), 77);

        let parsed = parse_central_file_header(&bytes).unwrap();
        assert_eq!(parsed.uncompressed_size, big);
        assert_eq!(parsed.compressed_size, 77);
        assert_eq!(parsed.local_header_offset, big + 5);
    }

    #[test]
    fn directory_gets_dos_attribute() {
        let header = CentralFileHeader {
            name: "d/",
            version_needed: VERSION_NEEDED_ZIP64,
            flags: 0,
            method: COMPRESSION_STORE,
            dos_time: 0,
            dos_date: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            local_header_offset: 0,
            mode: 0o040755,
            uid: 0,
            gid: 0,
        };
        let parsed = parse_central_file_header(&header.encode()).unwrap();
        assert_eq!(parsed.mode, 0o040755);
        assert_eq!(
            parsed.external_attributes & DOS_DIRECTORY_ATTRIBUTE,
            DOS_DIRECTORY_ATTRIBUTE
        );
    }

    #[test]
    fn part_start_frame_layout() {
        let frame = encode_part_start_frame(0x0102030405060708);
        assert_eq!(frame.len(), PART_START_FRAME_LEN as usize);
        assert_eq!(u32_at(&frame, 0), SKIPPABLE_FRAME_MAGIC);
        assert_eq!(u32_at(&frame, 4), 16);
        assert_eq!(frame[8], SKIPPABLE_TAG_PART_START);
        assert_eq!(u64_at(&frame, 9), 0x0102030405060708);
        assert!(frame[17..].iter().all(|&b| b == 0));
    }

    #[test]
    fn tail_comment_roundtrip() {
        for locator in [
            TailLocator::Offset(0),
            TailLocator::Offset(0x001234),
            TailLocator::NoHeaderInTail,
        ] {
            let comment = encode_tail_comment(locator);
            assert_eq!(comment.len(), 8);
            assert_eq!(&comment[..4], b"BRST");
            assert_eq!(parse_tail_comment(&comment).unwrap(), locator);
        }
    }

    #[test]
    fn data_descriptor_sizes() {
        assert_eq!(
            encode_data_descriptor(1, 2, 3, false).len() as u64,
            DATA_DESCRIPTOR_LEN
        );
        assert_eq!(
            encode_data_descriptor(1, 2, 3, true).len() as u64,
            DATA_DESCRIPTOR_ZIP64_LEN
        );
    }

    #[test]
    fn padding_header_minimum_is_fixed() {
        assert_eq!(PADDING_LFH_MIN, 44);
        assert!(!PADDING_ENTRY_NAME.ends_with('/'));
    }

    #[test]
    fn trailer_records_parse() {
        let eocd = encode_end_of_central_directory(3, 150, 9000, &encode_tail_comment(TailLocator::Offset(0)));
        let parsed = parse_end_of_central_directory(&eocd).unwrap();
        assert_eq!(parsed.entry_count, 3);
        assert_eq!(parsed.cd_size, 150);
        assert_eq!(parsed.cd_offset, 9000);
        assert_eq!(parsed.comment.len(), 8);

        let zip64 = encode_zip64_eocd(3, 150, 9000);
        assert_eq!(zip64.len() as u64, ZIP64_EOCD_LEN);
        let parsed = parse_zip64_eocd(&zip64).unwrap();
        assert_eq!(parsed.entry_count, 3);
        assert_eq!(parsed.cd_size, 150);
        assert_eq!(parsed.cd_offset, 9000);

        let locator = encode_zip64_eocd_locator(9150);
        assert_eq!(locator.len() as u64, ZIP64_EOCD_LOCATOR_LEN);
        assert_eq!(parse_zip64_eocd_locator(&locator).unwrap(), 9150);
    }
}
