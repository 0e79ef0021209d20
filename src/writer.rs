//! Part-aligned streaming archive writer.
//!
//! Entries are appended one at a time and compressed on the fly; the
//! writer interleaves padding and start-of-part frames so that every part
//! boundary in the archive body begins a local file header or a
//! start-of-part marker, and range-fetching readers can hand each part's
//! frames straight to the kernel.

use crate::align::{plan, Plan};
use crate::central;
use crate::compress::{ChunkCompressor, MAX_EXTENT};
use crate::error::{BurstError, Result};
use crate::record::{self, LocalFileHeader};
use crc32fast::Hasher as Crc32;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

/// Default part size: 8 MiB.
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Smallest accepted part size. A part must comfortably hold a worst-case
/// compressed frame plus its framing and descriptor reserve.
pub const MIN_PART_SIZE: u64 = 256 * 1024;

const OUTPUT_BUFFER_SIZE: usize = 64 * 1024;

// Unix file type bits, as stored in the upper half of the external
// attributes.
const S_IFMT: u32 = 0o170000;
const S_IFREG: u32 = 0o100000;
const S_IFDIR: u32 = 0o040000;
const S_IFLNK: u32 = 0o120000;

/// Archive-wide options, frozen when the writer is created.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    /// Part size in bytes. Every part boundary is a multiple of this.
    pub part_size: u64,
    /// Zstandard compression level.
    pub level: i32,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            part_size: DEFAULT_PART_SIZE,
            level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl WriterOptions {
    /// Set the part size.
    pub fn with_part_size(mut self, part_size: u64) -> Self {
        self.part_size = part_size;
        self
    }

    /// Set the compression level.
    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.part_size < MIN_PART_SIZE {
            return Err(BurstError::InvalidArgument(format!(
                "part size {} below the {} byte minimum",
                self.part_size, MIN_PART_SIZE
            )));
        }
        if self.part_size % 4096 != 0 {
            return Err(BurstError::InvalidArgument(
                "part size must be a multiple of 4096".to_string(),
            ));
        }
        if self.part_size >= 1 << 24 {
            // The EOCD comment locates the first tail CDFH with a 24-bit
            // offset strictly below the part size.
            return Err(BurstError::InvalidArgument(
                "part size must stay below the 24-bit tail offset limit".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-entry Unix metadata.
#[derive(Debug, Clone, Copy)]
pub struct EntryMeta {
    /// Unix mode. File type bits are filled in from the append operation
    /// when absent.
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Modification time in DOS format.
    pub dos_time: u16,
    /// Modification date in DOS format.
    pub dos_date: u16,
}

impl EntryMeta {
    pub fn new(mode: u32, uid: u32, gid: u32) -> Self {
        Self {
            mode,
            uid,
            gid,
            dos_time: 0,
            dos_date: 0,
        }
    }

    /// Set the DOS modification time and date.
    pub fn with_dos_datetime(mut self, dos_time: u16, dos_date: u16) -> Self {
        self.dos_time = dos_time;
        self.dos_date = dos_date;
        self
    }
}

/// Frame and padding counters, queryable while writing.
#[derive(Debug, Default, Clone, Copy)]
pub struct WriteStats {
    /// Compressed data frames written.
    pub data_frames: u64,
    /// Skippable padding frames written.
    pub padding_frames: u64,
    /// Start-of-part frames written.
    pub part_start_frames: u64,
    /// Padding local headers written.
    pub padding_headers: u64,
    /// Total bytes spent on padding of either kind.
    pub padding_bytes: u64,
    /// Entries whose data descriptor used ZIP64 sizes.
    pub zip64_descriptors: u64,
}

/// Entry bookkeeping for the central directory.
pub(crate) struct EntryRecord {
    pub(crate) name: String,
    pub(crate) mode: u32,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) dos_time: u16,
    pub(crate) dos_date: u16,
    pub(crate) method: u16,
    pub(crate) flags: u16,
    pub(crate) version_needed: u16,
    pub(crate) crc32: u32,
    pub(crate) compressed_size: u64,
    pub(crate) uncompressed_size: u64,
    pub(crate) lfh_offset: u64,
    pub(crate) data_start: u64,
    pub(crate) zip64_descriptor: bool,
}

/// Counting sink over the buffered output.
///
/// The planner works against the logical position (bytes flushed plus
/// bytes pending in the buffer); the sink is append-only and never
/// seeked.
pub(crate) struct Output<W: Write> {
    sink: BufWriter<W>,
    position: u64,
    part_size: u64,
    stats: WriteStats,
}

impl<W: Write> Output<W> {
    fn new(sink: W, part_size: u64) -> Self {
        Self {
            sink: BufWriter::with_capacity(OUTPUT_BUFFER_SIZE, sink),
            position: 0,
            part_size,
            stats: WriteStats::default(),
        }
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    pub(crate) fn part_size(&self) -> u64 {
        self.part_size
    }

    pub(crate) fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.sink.write_all(buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    fn write_zeros(&mut self, mut n: u64) -> Result<()> {
        const ZEROS: [u8; 4096] = [0u8; 4096];
        while n > 0 {
            let take = n.min(ZEROS.len() as u64) as usize;
            self.sink.write_all(&ZEROS[..take])?;
            self.position += take as u64;
            n -= take as u64;
        }
        Ok(())
    }

    /// A skippable padding frame consuming exactly `total_len` bytes.
    /// The zero-filled payload carries the padding type tag.
    fn write_padding_frame(&mut self, total_len: u64) -> Result<()> {
        self.check_alignment(
            total_len >= record::MIN_SKIPPABLE_FRAME,
            "padding frame below the 8 byte minimum",
        )?;
        let payload = total_len - record::MIN_SKIPPABLE_FRAME;
        self.write_all(&record::encode_skippable_header(payload as u32))?;
        self.write_zeros(payload)?;
        self.stats.padding_frames += 1;
        self.stats.padding_bytes += total_len;
        Ok(())
    }

    /// A start-of-part frame; only ever legal exactly on a boundary.
    fn write_part_start(&mut self, uncompressed_offset: u64) -> Result<()> {
        self.check_alignment(
            self.position % self.part_size == 0,
            "start-of-part frame off the boundary",
        )?;
        self.write_all(&record::encode_part_start_frame(uncompressed_offset))?;
        self.stats.part_start_frames += 1;
        Ok(())
    }

    /// One padding local header consuming exactly `total_len` bytes; the
    /// slack beyond the sentinel name goes into a zero-filled extra field.
    fn write_padding_header(&mut self, total_len: u64) -> Result<()> {
        let extra_len = total_len - record::PADDING_LFH_MIN;
        let header = LocalFileHeader {
            name: record::PADDING_ENTRY_NAME,
            version_needed: record::VERSION_NEEDED_ZIP64,
            flags: 0,
            method: record::COMPRESSION_STORE,
            dos_time: 0,
            dos_date: 0,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            extra_len: extra_len as u16,
        };
        self.write_all(&header.encode())?;
        self.write_zeros(extra_len)?;
        self.stats.padding_headers += 1;
        self.stats.padding_bytes += total_len;
        Ok(())
    }

    /// Fill the rest of the current part with padding local headers so
    /// the next entry begins exactly on the boundary.
    fn fill_to_boundary(&mut self) -> Result<()> {
        const MAX_SINGLE: u64 = record::PADDING_LFH_MIN + u16::MAX as u64;
        let mut gap = self.part_size - self.position % self.part_size;
        while gap > 0 {
            let mut take = gap.min(MAX_SINGLE);
            if gap - take > 0 && gap - take < record::PADDING_LFH_MIN {
                take = gap - record::PADDING_LFH_MIN;
            }
            self.check_alignment(
                take >= record::PADDING_LFH_MIN,
                "padding header gap below the minimum",
            )?;
            self.write_padding_header(take)?;
            gap -= take;
        }
        self.check_alignment(
            self.position % self.part_size == 0,
            "padding headers did not reach the boundary",
        )
    }

    fn check_alignment(&self, ok: bool, msg: &str) -> Result<()> {
        if ok {
            Ok(())
        } else {
            debug_assert!(false, "{}", msg);
            Err(BurstError::AlignmentViolation(msg.to_string()))
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.sink.flush()?;
        Ok(())
    }
}

/// Streaming writer producing a part-aligned archive.
pub struct BurstWriter<W: Write> {
    out: Output<W>,
    compressor: ChunkCompressor,
    input_buf: Vec<u8>,
    entries: Vec<EntryRecord>,
    finished: bool,
    poisoned: bool,
}

impl BurstWriter<File> {
    /// Create an archive at `path` with default options.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with_options(path, WriterOptions::default())
    }

    /// Create an archive at `path`.
    pub fn create_with_options<P: AsRef<Path>>(path: P, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let file = File::create(path)?;
        Self::from_writer_with_options(file, options)
    }
}

impl<W: Write> BurstWriter<W> {
    /// Write an archive into any byte sink with default options.
    pub fn from_writer(sink: W) -> Result<Self> {
        Self::from_writer_with_options(sink, WriterOptions::default())
    }

    /// Write an archive into any byte sink.
    pub fn from_writer_with_options(sink: W, options: WriterOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            out: Output::new(sink, options.part_size),
            compressor: ChunkCompressor::new(options.level)?,
            input_buf: vec![0u8; MAX_EXTENT],
            entries: Vec::new(),
            finished: false,
            poisoned: false,
        })
    }

    /// Logical bytes written so far, including bytes still buffered.
    pub fn position(&self) -> u64 {
        self.out.position()
    }

    /// Frame and padding counters.
    pub fn stats(&self) -> WriteStats {
        self.out.stats
    }

    /// Entries appended so far (padding headers are not entries).
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Append a regular file, reading its content from `reader` until
    /// EOF. Content is compressed in extent-sized chunks; sizes and CRC
    /// go into a trailing data descriptor. An empty file degrades to a
    /// header-only stored entry.
    pub fn append_file<R: Read>(&mut self, name: &str, reader: &mut R, meta: &EntryMeta) -> Result<()> {
        self.check_open()?;
        validate_name(name, false)?;
        let result = self.append_file_inner(name, reader, meta);
        self.poison_on_failure(result)
    }

    /// Append a symlink whose content is the target path. Stored
    /// uncompressed with sizes and CRC in the local header.
    pub fn append_symlink(&mut self, name: &str, target: &[u8], meta: &EntryMeta) -> Result<()> {
        self.check_open()?;
        validate_name(name, false)?;
        if target.is_empty() {
            return Err(BurstError::InvalidArgument(
                "empty symlink target".to_string(),
            ));
        }
        let mode = file_type_mode(meta.mode, S_IFLNK);
        let result = self.append_header_only(name, mode, meta, target);
        self.poison_on_failure(result)
    }

    /// Append a directory. The name must end in `/`.
    pub fn append_directory(&mut self, name: &str, meta: &EntryMeta) -> Result<()> {
        self.check_open()?;
        validate_name(name, true)?;
        let mode = file_type_mode(meta.mode, S_IFDIR);
        let result = self.append_header_only(name, mode, meta, &[]);
        self.poison_on_failure(result)
    }

    /// Write the central directory and trailers, flush the sink, and
    /// return the final archive size. The writer accepts no further
    /// appends; calling `finish` again fails without writing a byte.
    pub fn finish(&mut self) -> Result<u64> {
        self.check_open()?;
        let result = self.finish_inner();
        match &result {
            Ok(_) => self.finished = true,
            Err(_) => self.poisoned = true,
        }
        result
    }

    /// Consume the writer and hand back the sink.
    pub fn into_inner(self) -> Result<W> {
        self.out
            .sink
            .into_inner()
            .map_err(|e| BurstError::Io(e.into_error()))
    }

    fn finish_inner(&mut self) -> Result<u64> {
        debug_assert!(self
            .entries
            .windows(2)
            .all(|pair| pair[0].lfh_offset < pair[1].lfh_offset));
        let final_size = central::write_central_directory(&mut self.out, &self.entries)?;
        self.out.flush()?;
        Ok(final_size)
    }

    fn append_file_inner<R: Read>(
        &mut self,
        name: &str,
        reader: &mut R,
        meta: &EntryMeta,
    ) -> Result<()> {
        let mode = file_type_mode(meta.mode, S_IFREG);
        let mut n = read_full(reader, &mut self.input_buf)?;
        if n == 0 {
            // Empty regular files never reach the planner.
            return self.append_header_only(name, mode, meta, &[]);
        }

        let lfh_len = record::LOCAL_FILE_HEADER_LEN + name.len() as u64;
        self.prealign(lfh_len + record::DATA_DESCRIPTOR_ZIP64_LEN + record::PADDING_LFH_MIN)?;

        let lfh_offset = self.out.position();
        let header = LocalFileHeader {
            name,
            version_needed: record::VERSION_NEEDED_ZSTD,
            flags: record::FLAG_DATA_DESCRIPTOR,
            method: record::COMPRESSION_ZSTD,
            dos_time: meta.dos_time,
            dos_date: meta.dos_date,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            extra_len: 0,
        };
        self.out.write_all(&header.encode())?;
        let data_start = self.out.position();

        let mut crc = Crc32::new();
        let mut uncompressed_size: u64 = 0;
        loop {
            // A short read marks the last chunk. A file sized to an exact
            // multiple of the chunk length ends with a full read instead;
            // the descriptor check below covers that case.
            let at_eof = n < MAX_EXTENT;
            crc.update(&self.input_buf[..n]);
            let frame = self.compressor.compress(&self.input_buf[..n])?;
            match plan(
                self.out.position(),
                frame.len() as u64,
                at_eof,
                self.out.part_size,
            ) {
                Plan::WriteFrame => self.out.write_all(frame)?,
                Plan::WriteFrameThenMetadata => {
                    self.out.write_all(frame)?;
                    self.out.write_part_start(uncompressed_size + n as u64)?;
                }
                Plan::PadThenMetadata { pad } => {
                    self.out.write_padding_frame(pad)?;
                    self.out.write_part_start(uncompressed_size)?;
                    self.out.write_all(frame)?;
                }
            }
            self.out.stats.data_frames += 1;
            uncompressed_size += n as u64;
            if at_eof {
                break;
            }
            n = read_full(reader, &mut self.input_buf)?;
            if n == 0 {
                break;
            }
        }

        // The descriptor and the next entry's header must both clear the
        // boundary; realign inside the entry's compressed area if not.
        let space = self.out.part_size - self.out.position() % self.out.part_size;
        if space < record::DATA_DESCRIPTOR_ZIP64_LEN + record::PADDING_LFH_MIN {
            self.out.write_padding_frame(space)?;
            self.out.write_part_start(uncompressed_size)?;
        }

        let compressed_size = self.out.position() - data_start;
        let crc32 = crc.finalize();
        let zip64_descriptor =
            compressed_size > u32::MAX as u64 || uncompressed_size > u32::MAX as u64;
        self.out.write_all(&record::encode_data_descriptor(
            crc32,
            compressed_size,
            uncompressed_size,
            zip64_descriptor,
        ))?;
        if zip64_descriptor {
            self.out.stats.zip64_descriptors += 1;
        }

        if compressed_size > uncompressed_size {
            tracing::warn!(
                entry = name,
                compressed_size,
                uncompressed_size,
                "compressed data larger than input; frames stay Zstandard"
            );
        }

        self.entries.push(EntryRecord {
            name: name.to_string(),
            mode,
            uid: meta.uid,
            gid: meta.gid,
            dos_time: meta.dos_time,
            dos_date: meta.dos_date,
            method: record::COMPRESSION_ZSTD,
            flags: record::FLAG_DATA_DESCRIPTOR,
            version_needed: record::VERSION_NEEDED_ZSTD,
            crc32,
            compressed_size,
            uncompressed_size,
            lfh_offset,
            data_start,
            zip64_descriptor,
        });
        Ok(())
    }

    /// Shared path for directories, symlinks and empty files: sizes are
    /// known up front, content is stored, and there is no descriptor.
    fn append_header_only(
        &mut self,
        name: &str,
        mode: u32,
        meta: &EntryMeta,
        content: &[u8],
    ) -> Result<()> {
        let lfh_len = record::LOCAL_FILE_HEADER_LEN + name.len() as u64;
        self.prealign(lfh_len + content.len() as u64 + record::PADDING_LFH_MIN)?;

        let lfh_offset = self.out.position();
        let crc32 = crc32fast::hash(content);
        let header = LocalFileHeader {
            name,
            version_needed: record::VERSION_NEEDED_ZIP64,
            flags: 0,
            method: record::COMPRESSION_STORE,
            dos_time: meta.dos_time,
            dos_date: meta.dos_date,
            crc32,
            compressed_size: content.len() as u32,
            uncompressed_size: content.len() as u32,
            extra_len: 0,
        };
        self.out.write_all(&header.encode())?;
        if !content.is_empty() {
            self.out.write_all(content)?;
        }

        self.entries.push(EntryRecord {
            name: name.to_string(),
            mode,
            uid: meta.uid,
            gid: meta.gid,
            dos_time: meta.dos_time,
            dos_date: meta.dos_date,
            method: record::COMPRESSION_STORE,
            flags: 0,
            version_needed: record::VERSION_NEEDED_ZIP64,
            crc32,
            compressed_size: content.len() as u64,
            uncompressed_size: content.len() as u64,
            lfh_offset,
            data_start: lfh_offset + lfh_len,
            zip64_descriptor: false,
        });
        Ok(())
    }

    /// Make sure `required` bytes fit between the cursor and the next
    /// boundary; otherwise fill the rest of this part with padding
    /// headers so the entry starts exactly on the boundary.
    fn prealign(&mut self, required: u64) -> Result<()> {
        if required > self.out.part_size {
            return Err(BurstError::InvalidArgument(
                "entry header cannot fit within one part".to_string(),
            ));
        }
        let gap = self.out.part_size - self.out.position % self.out.part_size;
        if required > gap {
            self.out.fill_to_boundary()?;
        }
        Ok(())
    }

    fn check_open(&self) -> Result<()> {
        if self.poisoned {
            return Err(BurstError::InvalidArgument(
                "writer poisoned by an earlier error".to_string(),
            ));
        }
        if self.finished {
            return Err(BurstError::InvalidArgument(
                "archive already finalized".to_string(),
            ));
        }
        Ok(())
    }

    /// IO and codec failures leave already-written bytes on the wire, so
    /// the archive is unsalvageable; argument errors are detected before
    /// any byte is written and keep the writer usable.
    fn poison_on_failure<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if !matches!(err, BurstError::InvalidArgument(_)) {
                self.poisoned = true;
            }
        }
        result
    }
}

fn validate_name(name: &str, is_dir: bool) -> Result<()> {
    if name.is_empty() {
        return Err(BurstError::InvalidArgument("empty entry name".to_string()));
    }
    if name.len() > u16::MAX as usize {
        return Err(BurstError::InvalidArgument(format!(
            "entry name of {} bytes exceeds the ZIP limit",
            name.len()
        )));
    }
    if name == record::PADDING_ENTRY_NAME {
        return Err(BurstError::InvalidArgument(format!(
            "entry name {:?} is reserved for padding headers",
            name
        )));
    }
    if is_dir && !name.ends_with('/') {
        return Err(BurstError::InvalidArgument(format!(
            "directory name {:?} must end in '/'",
            name
        )));
    }
    if !is_dir && name.ends_with('/') {
        return Err(BurstError::InvalidArgument(format!(
            "entry name {:?} must not end in '/'",
            name
        )));
    }
    Ok(())
}

fn file_type_mode(mode: u32, default_type: u32) -> u32 {
    if mode & S_IFMT == 0 {
        mode | default_type
    } else {
        mode
    }
}

fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(BurstError::Io(e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_file_uses_a_32_bit_descriptor() {
        let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
        let meta = EntryMeta::new(0o644, 1000, 1000);
        writer
            .append_file("a.txt", &mut &b"HelloWorld"[..], &meta)
            .unwrap();
        assert_eq!(writer.entries.len(), 1);
        let entry = &writer.entries[0];
        assert!(!entry.zip64_descriptor);
        assert_eq!(entry.uncompressed_size, 10);
        assert_eq!(entry.mode, 0o100644);
        assert_eq!(entry.lfh_offset, 0);
        assert_eq!(entry.data_start, 30 + 5);
    }

    #[test]
    fn empty_file_is_header_only() {
        let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
        let meta = EntryMeta::new(0o644, 0, 0);
        writer
            .append_file("empty", &mut std::io::empty(), &meta)
            .unwrap();
        let entry = &writer.entries[0];
        assert_eq!(entry.method, record::COMPRESSION_STORE);
        assert_eq!(entry.flags, 0);
        assert_eq!(entry.compressed_size, 0);
        assert_eq!(entry.crc32, 0);
        assert_eq!(writer.stats().data_frames, 0);
    }

    #[test]
    fn rejected_arguments_leave_the_writer_usable() {
        let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
        let meta = EntryMeta::new(0o755, 0, 0);
        assert!(writer.append_directory("not-a-dir", &meta).is_err());
        assert!(writer.append_file("trailing/", &mut std::io::empty(), &meta).is_err());
        assert!(writer.append_symlink("s", b"", &meta).is_err());
        assert!(writer
            .append_file(record::PADDING_ENTRY_NAME, &mut std::io::empty(), &meta)
            .is_err());
        // Still usable afterwards.
        writer.append_directory("d/", &meta).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn options_are_validated() {
        assert!(BurstWriter::from_writer_with_options(
            Vec::new(),
            WriterOptions::default().with_part_size(4096)
        )
        .is_err());
        assert!(BurstWriter::from_writer_with_options(
            Vec::new(),
            WriterOptions::default().with_part_size(MIN_PART_SIZE + 1)
        )
        .is_err());
        assert!(BurstWriter::from_writer_with_options(
            Vec::new(),
            WriterOptions::default().with_part_size(MIN_PART_SIZE)
        )
        .is_ok());
    }
}
