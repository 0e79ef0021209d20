//! Write-then-read round trips over the emitted layout.

use burst_zip::{
    compress, record, ArchiveReader, BurstWriter, EntryMeta, TailLocator, MAX_EXTENT,
};
use std::io::Cursor;

fn u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_le_bytes(b)
}

fn write_to_vec(build: impl FnOnce(&mut BurstWriter<Vec<u8>>)) -> Vec<u8> {
    let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
    build(&mut writer);
    writer.finish().unwrap();
    writer.into_inner().unwrap()
}

#[test]
fn single_small_file() {
    let meta = EntryMeta::new(0o100644, 1000, 1000).with_dos_datetime(0x7C21, 0x58E3);
    let bytes = write_to_vec(|writer| {
        writer
            .append_file("hello.txt", &mut &b"HelloWorld"[..], &meta)
            .unwrap();
    });

    // The local header sits at offset zero with deferred sizes.
    let lfh = record::parse_local_file_header(&bytes).unwrap();
    assert_eq!(lfh.name, "hello.txt");
    assert_eq!(lfh.method, record::COMPRESSION_ZSTD);
    assert_ne!(lfh.flags & record::FLAG_DATA_DESCRIPTOR, 0);
    assert_eq!(lfh.compressed_size, 0);
    assert_eq!(lfh.uncompressed_size, 0);
    assert_eq!(lfh.crc32, 0);

    let mut reader = ArchiveReader::from_reader(Cursor::new(bytes.clone())).unwrap();
    assert_eq!(reader.entries().len(), 1);
    let entry = reader.entries()[0].clone();
    assert_eq!(entry.name, "hello.txt");
    assert_eq!(entry.uncompressed_size, 10);
    assert_eq!(entry.mode, 0o100644);
    assert_eq!(entry.uid, 1000);
    assert_eq!(entry.gid, 1000);
    assert_eq!(entry.dos_time, 0x7C21);
    assert_eq!(entry.dos_date, 0x58E3);
    assert_eq!(entry.crc32, crc32fast::hash(b"HelloWorld"));
    assert_eq!(reader.read_entry(&entry).unwrap(), b"HelloWorld");

    // One compressed frame, then a 32-bit data descriptor.
    let data_start = lfh.header_len as usize;
    assert_eq!(u32_at(&bytes, data_start), record::ZSTD_FRAME_MAGIC);
    let descriptor = data_start + entry.compressed_size as usize;
    assert_eq!(u32_at(&bytes, descriptor), record::DATA_DESCRIPTOR_SIGNATURE);
    assert_eq!(u32_at(&bytes, descriptor + 4), entry.crc32);
    assert_eq!(u32_at(&bytes, descriptor + 8), entry.compressed_size as u32);
    assert_eq!(u32_at(&bytes, descriptor + 12), 10);

    // The whole archive fits in the tail part.
    assert_eq!(reader.tail_locator(), TailLocator::Offset(0));
}

#[test]
fn full_extent_file_is_one_frame() {
    let data = vec![b'A'; MAX_EXTENT];
    let meta = EntryMeta::new(0o644, 0, 0);

    let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
    writer.append_file("a.bin", &mut &data[..], &meta).unwrap();
    assert_eq!(writer.stats().data_frames, 1);
    writer.finish().unwrap();
    let bytes = writer.into_inner().unwrap();

    let lfh = record::parse_local_file_header(&bytes).unwrap();
    let frame = &bytes[lfh.header_len as usize..];
    assert_eq!(compress::frame_content_size(frame).unwrap(), MAX_EXTENT as u64);

    let mut reader = ArchiveReader::from_reader(Cursor::new(bytes)).unwrap();
    let entry = reader.entries()[0].clone();
    assert_eq!(entry.uncompressed_size, MAX_EXTENT as u64);
    assert_eq!(reader.read_entry(&entry).unwrap(), data);
}

#[test]
fn extent_plus_one_splits_into_two_frames() {
    let data = vec![b'A'; MAX_EXTENT + 1];
    let meta = EntryMeta::new(0o644, 0, 0);

    let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
    writer.append_file("a.bin", &mut &data[..], &meta).unwrap();
    assert_eq!(writer.stats().data_frames, 2);
    writer.finish().unwrap();
    let bytes = writer.into_inner().unwrap();

    // The first frame covers exactly one extent; the remainder decodes
    // to the single trailing byte.
    let lfh = record::parse_local_file_header(&bytes).unwrap();
    let frame = &bytes[lfh.header_len as usize..];
    assert_eq!(compress::frame_content_size(frame).unwrap(), MAX_EXTENT as u64);

    let mut reader = ArchiveReader::from_reader(Cursor::new(bytes)).unwrap();
    let entry = reader.entries()[0].clone();
    assert_eq!(entry.uncompressed_size, MAX_EXTENT as u64 + 1);
    assert_eq!(reader.read_entry(&entry).unwrap(), data);
}

#[test]
fn directory_and_symlink_are_header_only() {
    let bytes = write_to_vec(|writer| {
        writer
            .append_directory("d/", &EntryMeta::new(0o040755, 0, 0))
            .unwrap();
        writer
            .append_symlink("s", b"d/x", &EntryMeta::new(0o777, 0, 0))
            .unwrap();
    });

    let mut reader = ArchiveReader::from_reader(Cursor::new(bytes.clone())).unwrap();
    assert_eq!(reader.entries().len(), 2);

    let dir = reader.entries()[0].clone();
    assert_eq!(dir.name, "d/");
    assert_eq!(dir.mode, 0o040755);
    assert_eq!(dir.compression_method, record::COMPRESSION_STORE);
    assert_eq!(dir.uncompressed_size, 0);

    let link = reader.entries()[1].clone();
    assert_eq!(link.name, "s");
    assert_eq!(link.mode, 0o120777);
    assert_eq!(link.compression_method, record::COMPRESSION_STORE);
    assert_eq!(reader.read_entry(&link).unwrap(), b"d/x");

    // Header-only entries carry sizes and CRC in the local header and no
    // data descriptor flag.
    let dir_lfh = record::parse_local_file_header(&bytes).unwrap();
    assert_eq!(dir_lfh.flags, 0);
    assert_eq!(dir_lfh.compressed_size, 0);
    let link_lfh =
        record::parse_local_file_header(&bytes[link.header_offset as usize..]).unwrap();
    assert_eq!(link_lfh.flags, 0);
    assert_eq!(link_lfh.compressed_size, 3);
    assert_eq!(link_lfh.crc32, crc32fast::hash(b"d/x"));
}

#[test]
fn empty_file_roundtrip() {
    let bytes = write_to_vec(|writer| {
        writer
            .append_file("empty", &mut std::io::empty(), &EntryMeta::new(0o644, 5, 6))
            .unwrap();
    });

    let mut reader = ArchiveReader::from_reader(Cursor::new(bytes)).unwrap();
    let entry = reader.entries()[0].clone();
    assert_eq!(entry.compression_method, record::COMPRESSION_STORE);
    assert_eq!(entry.uncompressed_size, 0);
    assert_eq!(entry.crc32, 0);
    assert_eq!(entry.uid, 5);
    assert_eq!(entry.gid, 6);
    assert!(reader.read_entry(&entry).unwrap().is_empty());
}

#[test]
fn multi_entry_roundtrip_through_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burst.zip");

    let contents: Vec<Vec<u8>> = (0..20)
        .map(|i| {
            let size = 10_000 + i as usize * 997;
            let mut state = 0x12345678u32.wrapping_add(i);
            let mut data = Vec::with_capacity(size);
            for _ in 0..size {
                state = state.wrapping_mul(1103515245).wrapping_add(12345);
                data.push((state >> 16) as u8);
            }
            data
        })
        .collect();

    {
        let mut writer = BurstWriter::create(&path).unwrap();
        for (i, content) in contents.iter().enumerate() {
            let meta = EntryMeta::new(0o640, 1000 + i as u32, 100);
            writer
                .append_file(&format!("data/{i:02}.bin"), &mut &content[..], &meta)
                .unwrap();
        }
        writer.finish().unwrap();
    }

    let mut reader = ArchiveReader::open(&path).unwrap();
    assert_eq!(reader.entries().len(), contents.len());
    for (i, content) in contents.iter().enumerate() {
        let entry = reader.entries()[i].clone();
        assert_eq!(entry.name, format!("data/{i:02}.bin"));
        assert_eq!(entry.uid, 1000 + i as u32);
        assert_eq!(entry.crc32, crc32fast::hash(content));
        assert_eq!(&reader.read_entry(&entry).unwrap(), content);
    }
}

#[test]
fn incompressible_data_expands_but_stays_zstd() {
    // Already-compressed bytes: run a pseudo-random buffer through zstd
    // once and store the output itself. Re-compressing it can only grow,
    // which is the case the format keeps as Zstandard frames anyway (no
    // STORE fallback; readers treat every data frame as compressed).
    let mut state = 0xC0FFEEu32;
    let raw: Vec<u8> = (0..MAX_EXTENT + 64 * 1024)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect();
    let mut payload = zstd::stream::encode_all(&raw[..], 3).unwrap();
    payload.truncate(MAX_EXTENT + 4096); // two chunks, one of them full

    let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
    writer
        .append_file(
            "blob.zst",
            &mut &payload[..],
            &EntryMeta::new(0o644, 1000, 1000),
        )
        .unwrap();
    assert_eq!(writer.stats().data_frames, 2);
    writer.finish().unwrap();
    let bytes = writer.into_inner().unwrap();

    let mut reader = ArchiveReader::from_reader(Cursor::new(bytes)).unwrap();
    let entry = reader.entries()[0].clone();
    // The entry expanded, yet the method, sizes and CRC all hold up.
    assert!(entry.compressed_size > entry.uncompressed_size);
    assert_eq!(entry.compression_method, record::COMPRESSION_ZSTD);
    assert_eq!(entry.uncompressed_size, payload.len() as u64);
    assert_eq!(entry.crc32, crc32fast::hash(&payload));
    assert_eq!(reader.read_entry(&entry).unwrap(), payload);
}

#[test]
fn finish_is_not_repeatable() {
    let mut writer = BurstWriter::from_writer(Vec::new()).unwrap();
    writer
        .append_file("a", &mut &b"data"[..], &EntryMeta::new(0o644, 0, 0))
        .unwrap();
    let size = writer.finish().unwrap();
    assert_eq!(size, writer.position());

    // Finalizing twice fails without writing more bytes.
    assert!(writer.finish().is_err());
    assert_eq!(size, writer.position());

    // And no further appends are accepted.
    assert!(writer
        .append_file("b", &mut &b"x"[..], &EntryMeta::new(0o644, 0, 0))
        .is_err());

    let bytes = writer.into_inner().unwrap();
    assert_eq!(bytes.len() as u64, size);
}

/// A sink that fails after a fixed number of bytes.
struct FailingSink {
    accepted: usize,
}

impl std::io::Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.accepted < buf.len() {
            return Err(std::io::Error::other("sink full"));
        }
        self.accepted -= buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn io_failure_poisons_the_writer() {
    let mut writer = BurstWriter::from_writer(FailingSink { accepted: 64 }).unwrap();
    // Incompressible data, so the frames overflow the write buffer and
    // reach the failing sink inside the append.
    let mut state = 0x9E3779B9u32;
    let data: Vec<u8> = (0..512 * 1024)
        .map(|_| {
            state = state.wrapping_mul(1103515245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect();
    let meta = EntryMeta::new(0o644, 0, 0);

    assert!(writer.append_file("a.bin", &mut &data[..], &meta).is_err());
    assert!(writer.append_file("b.bin", &mut &data[..1], &meta).is_err());
    assert!(writer.finish().is_err());
}
