//! Part-boundary planning.
//!
//! An archive is a sequence of fixed-size parts, and the byte at every
//! part boundary inside the body must begin either a local file header or
//! a start-of-part frame. Compressed data frames therefore never touch a
//! boundary: before each frame is written, the planner decides whether it
//! can go down as-is or whether the stream must first be padded to the
//! boundary and re-marked.
//!
//! The planner is pure; all writing happens in the entry appender.

use crate::record::{DATA_DESCRIPTOR_ZIP64_LEN, MIN_SKIPPABLE_FRAME, PADDING_LFH_MIN};

/// What to emit for the next compressed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Write the frame as-is; nothing else.
    WriteFrame,
    /// Write a padding frame of exactly `pad` bytes (which reaches the
    /// boundary), a start-of-part frame, then the frame.
    PadThenMetadata { pad: u64 },
    /// The frame exactly consumes the space to the boundary: write it,
    /// then a start-of-part frame at the boundary.
    WriteFrameThenMetadata,
}

/// Decide how the next compressed frame of `frame_len` bytes reaches the
/// output, given the current logical write `position`.
///
/// `at_eof` marks the entry's last chunk; the decision then reserves room
/// before the boundary for the largest data descriptor plus a minimum
/// padding header, so the descriptor and the next entry's header never
/// straddle the boundary.
///
/// `position` is never on a boundary here: the appender aligns the local
/// header away from boundaries before the first chunk, and every decision
/// below leaves the cursor clear of the next one.
pub fn plan(position: u64, frame_len: u64, at_eof: bool, part_size: u64) -> Plan {
    debug_assert!(frame_len > 0);
    debug_assert!(
        position % part_size != 0,
        "frame planned at a part boundary"
    );
    let space = part_size - position % part_size;

    if frame_len == space {
        return Plan::WriteFrameThenMetadata;
    }

    let reserve = if at_eof {
        DATA_DESCRIPTOR_ZIP64_LEN + PADDING_LFH_MIN
    } else {
        0
    };
    if frame_len + reserve <= space && space - frame_len >= MIN_SKIPPABLE_FRAME {
        return Plan::WriteFrame;
    }

    // The frame does not fit before the boundary (or would leave a sliver
    // too small for a skippable frame): pad the rest of this part and
    // restart on the far side of the boundary.
    Plan::PadThenMetadata { pad: space }
}
