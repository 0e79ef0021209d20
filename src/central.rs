//! Central directory and trailer emission.
//!
//! Runs once, at finalize: a CDFH per entry in append order, the ZIP64
//! end-of-central-directory record and locator (always, so the trailer
//! has a fixed size), and the standard EOCD whose fixed 8-byte comment
//! tells a tail-only reader where the first complete CDFH begins.

use crate::error::Result;
use crate::record::{
    self, CentralFileHeader, TailLocator, END_OF_CENTRAL_DIRECTORY_LEN, TAIL_COMMENT_LEN,
    ZIP64_EOCD_LEN, ZIP64_EOCD_LOCATOR_LEN,
};
use crate::writer::{EntryRecord, Output};
use std::io::Write;

/// Emit the central directory and all trailers; returns the final
/// archive size.
pub(crate) fn write_central_directory<W: Write>(
    out: &mut Output<W>,
    entries: &[EntryRecord],
) -> Result<u64> {
    let cd_start = out.position();
    let mut cdfh_offsets = Vec::with_capacity(entries.len());
    for entry in entries {
        cdfh_offsets.push(out.position());
        let header = CentralFileHeader {
            name: &entry.name,
            version_needed: entry.version_needed,
            flags: entry.flags,
            method: entry.method,
            dos_time: entry.dos_time,
            dos_date: entry.dos_date,
            crc32: entry.crc32,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
            local_header_offset: entry.lfh_offset,
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
        };
        out.write_all(&header.encode())?;
    }
    let cd_end = out.position();
    let cd_size = cd_end - cd_start;

    // Everything past the CDFHs has a known size, so the final archive
    // size -- and with it the tail start -- is fixed before a single
    // trailer byte goes out.
    let final_size =
        cd_end + ZIP64_EOCD_LEN + ZIP64_EOCD_LOCATOR_LEN + END_OF_CENTRAL_DIRECTORY_LEN
            + TAIL_COMMENT_LEN;
    let tail_start = final_size.saturating_sub(out.part_size());
    let locator = if cd_start >= tail_start {
        // The whole central directory is inside the tail part.
        TailLocator::Offset(0)
    } else {
        match cdfh_offsets.iter().find(|&&offset| offset >= tail_start) {
            Some(&offset) => TailLocator::Offset((offset - tail_start) as u32),
            None => TailLocator::NoHeaderInTail,
        }
    };

    let entry_count = entries.len() as u64;
    out.write_all(&record::encode_zip64_eocd(entry_count, cd_size, cd_start))?;
    out.write_all(&record::encode_zip64_eocd_locator(cd_end))?;
    out.write_all(&record::encode_end_of_central_directory(
        entry_count,
        cd_size,
        cd_start,
        &record::encode_tail_comment(locator),
    ))?;
    debug_assert_eq!(out.position(), final_size);
    Ok(final_size)
}
