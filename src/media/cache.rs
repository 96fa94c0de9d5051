//! SPS/PPS cache
//!
//! There is no out-of-band path for codec configuration, so parameter sets
//! are held back and sent inline in front of the next IDR slice. Every
//! receiver that starts decoding at a key-frame then has what it needs.

use bytes::{BufMut, Bytes, BytesMut};

use super::h264::{NalUnit, START_CODE};

/// A start-code-prefixed NAL unit ready to be written as one sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedNal {
    pub data: Bytes,
    pub is_keyframe: bool,
    /// Bytes of cached parameter sets merged in front of the slice
    pub merged_parameter_bytes: usize,
}

/// Per-session parameter-set buffer
///
/// Non-empty only between a parameter-set NAL and the next IDR slice.
#[derive(Debug, Default)]
pub struct ParameterSetCache {
    buf: BytesMut,
}

impl ParameterSetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Append raw bytes to the cache
    pub fn push(&mut self, annexb: &[u8]) {
        self.buf.extend_from_slice(annexb);
    }

    /// Frame a NAL unit for emission
    ///
    /// Parameter sets are cached and yield nothing. An IDR slice is returned
    /// with the cached parameter sets in front of it and the cache is emptied.
    /// Everything else is returned with just its start code.
    pub fn frame(&mut self, nal: &NalUnit) -> Option<FramedNal> {
        if nal.unit_type.is_parameter_set() {
            self.buf.reserve(START_CODE.len() + nal.len());
            self.push(&START_CODE);
            self.push(&nal.data);
            return None;
        }

        let is_keyframe = nal.unit_type.is_keyframe();
        let merged = if is_keyframe { self.buf.len() } else { 0 };

        let mut out = BytesMut::with_capacity(merged + START_CODE.len() + nal.len());
        if is_keyframe {
            out.put_slice(&self.buf);
            self.buf.clear();
        }
        out.put_slice(&START_CODE);
        out.put_slice(&nal.data);

        Some(FramedNal {
            data: out.freeze(),
            is_keyframe,
            merged_parameter_bytes: merged,
        })
    }
}
