//! # burst-zip: Part-Aligned ZIP Archives with Zstandard Framing
//!
//! `burst-zip` writes ZIP-compatible archives laid out as a sequence of
//! fixed-size parts (8 MiB by default). Every part boundary begins a
//! local file header or a start-of-part marker, each compressed frame
//! decompresses to at most 128 KiB and records that size in its header,
//! and the trailer pins down where a tail-only reader finds the first
//! central directory record. A downloader can therefore fetch parts in
//! parallel by byte range and hand the opaque frames of each part to a
//! copy-on-write filesystem's encoded-write interface without
//! decompressing anything in the host process.
//!
//! ## Quick Start
//!
//! ### Writing an archive
//!
//! ```no_run
//! use burst_zip::{BurstWriter, EntryMeta};
//!
//! let mut writer = BurstWriter::create("output.zip")?;
//!
//! let meta = EntryMeta::new(0o644, 1000, 1000);
//! writer.append_file("hello.txt", &mut &b"Hello, World!"[..], &meta)?;
//!
//! writer.append_directory("docs/", &EntryMeta::new(0o755, 0, 0))?;
//! writer.append_symlink("latest", b"docs", &EntryMeta::new(0o777, 0, 0))?;
//!
//! writer.finish()?;
//! # Ok::<(), burst_zip::BurstError>(())
//! ```
//!
//! ### Reading it back
//!
//! ```no_run
//! use burst_zip::ArchiveReader;
//!
//! let mut reader = ArchiveReader::open("output.zip")?;
//!
//! for entry in reader.entries() {
//!     println!("{}: {} bytes", entry.name, entry.uncompressed_size);
//! }
//!
//! let data = reader.read_entry_by_name("hello.txt")?;
//! # Ok::<(), burst_zip::BurstError>(())
//! ```

pub mod align;
mod central;
pub mod compress;
pub mod error;
pub mod reader;
pub mod record;
pub mod writer;

pub use compress::MAX_EXTENT;
pub use error::{BurstError, Result};
pub use reader::{ArchiveEntry, ArchiveReader};
pub use record::TailLocator;
pub use writer::{BurstWriter, EntryMeta, WriteStats, WriterOptions, DEFAULT_PART_SIZE, MIN_PART_SIZE};
