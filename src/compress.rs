//! Bounded-chunk Zstandard compression.
//!
//! Every data frame in an archive decompresses to at most [`MAX_EXTENT`]
//! bytes and records that exact size in its frame header; the extraction
//! side hands whole frames to the kernel's encoded-write interface, which
//! accepts a single extent of at most this size.

use crate::error::{BurstError, Result};

/// Upper bound on the uncompressed content of a single data frame.
pub const MAX_EXTENT: usize = 128 * 1024;

/// Chunk compressor with a reusable context and destination buffer.
///
/// The destination buffer is sized to the codec's worst-case bound for
/// [`MAX_EXTENT`] once and reused for every chunk of every entry.
pub struct ChunkCompressor {
    ctx: zstd::bulk::Compressor<'static>,
    buf: Vec<u8>,
}

impl ChunkCompressor {
    /// Create a compressor for the given zstd level.
    pub fn new(level: i32) -> Result<Self> {
        let mut ctx = zstd::bulk::Compressor::new(level).map_err(codec_err)?;
        // The reader and the kernel ingest path both rely on the
        // frame-content-size field being present.
        ctx.include_contentsize(true).map_err(codec_err)?;
        Ok(Self {
            ctx,
            buf: Vec::with_capacity(zstd::zstd_safe::compress_bound(MAX_EXTENT)),
        })
    }

    /// Compress one chunk of `1..=MAX_EXTENT` bytes into a single frame,
    /// returning the frame bytes. The returned slice is valid until the
    /// next call.
    pub fn compress(&mut self, src: &[u8]) -> Result<&[u8]> {
        if src.is_empty() {
            return Err(BurstError::InvalidArgument("empty chunk".to_string()));
        }
        if src.len() > MAX_EXTENT {
            return Err(BurstError::InvalidArgument(format!(
                "chunk of {} bytes exceeds the {} byte extent limit",
                src.len(),
                MAX_EXTENT
            )));
        }
        self.buf.clear();
        self.ctx
            .compress_to_buffer(src, &mut self.buf)
            .map_err(codec_err)?;
        #[cfg(debug_assertions)]
        verify_frame(&self.buf, src.len() as u64)?;
        Ok(&self.buf)
    }
}

/// Read the content size a frame header declares.
pub fn frame_content_size(frame: &[u8]) -> Result<u64> {
    match zstd::zstd_safe::get_frame_content_size(frame) {
        Ok(Some(size)) => Ok(size),
        Ok(None) => Err(BurstError::Codec(
            "frame does not record its content size".to_string(),
        )),
        Err(_) => Err(BurstError::Codec("unreadable frame header".to_string())),
    }
}

/// Check that a frame's embedded content size equals `expected`.
pub fn verify_frame(frame: &[u8], expected: u64) -> Result<()> {
    let embedded = frame_content_size(frame)?;
    if embedded != expected {
        return Err(BurstError::Codec(format!(
            "frame header records {} bytes, compressed from {}",
            embedded, expected
        )));
    }
    Ok(())
}

fn codec_err(err: std::io::Error) -> BurstError {
    BurstError::Codec(err.to_string())
}
