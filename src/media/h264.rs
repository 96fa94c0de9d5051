//! H.264 NAL unit types

use bytes::Bytes;

/// Four-byte Annex-B start code prepended to every emitted NAL unit
pub const START_CODE: [u8; 4] = [0x00, 0x00, 0x00, 0x01];

/// H.264 NAL unit type (ITU-T H.264 Table 7-1), reduced to what the pipeline inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NalUnitType {
    /// Coded slice of a non-IDR picture (1)
    CodedSliceNonIdr,
    /// Coded slice of an IDR picture (5)
    CodedSliceIdr,
    /// Supplemental enhancement information (6)
    Sei,
    /// Sequence parameter set (7)
    Sps,
    /// Picture parameter set (8)
    Pps,
    /// Access unit delimiter (9)
    Aud,
    /// Anything else, carrying the raw 5-bit type
    Other(u8),
}

impl NalUnitType {
    /// Decode the type from the first NAL header byte
    pub fn from_header(header: u8) -> Self {
        match header & 0x1F {
            1 => NalUnitType::CodedSliceNonIdr,
            5 => NalUnitType::CodedSliceIdr,
            6 => NalUnitType::Sei,
            7 => NalUnitType::Sps,
            8 => NalUnitType::Pps,
            9 => NalUnitType::Aud,
            other => NalUnitType::Other(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            NalUnitType::CodedSliceNonIdr => 1,
            NalUnitType::CodedSliceIdr => 5,
            NalUnitType::Sei => 6,
            NalUnitType::Sps => 7,
            NalUnitType::Pps => 8,
            NalUnitType::Aud => 9,
            NalUnitType::Other(t) => *t,
        }
    }

    pub fn is_parameter_set(&self) -> bool {
        matches!(self, NalUnitType::Sps | NalUnitType::Pps)
    }

    pub fn is_keyframe(&self) -> bool {
        *self == NalUnitType::CodedSliceIdr
    }
}

impl std::fmt::Display for NalUnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NalUnitType::CodedSliceNonIdr => write!(f, "non-IDR slice"),
            NalUnitType::CodedSliceIdr => write!(f, "IDR slice"),
            NalUnitType::Sei => write!(f, "SEI"),
            NalUnitType::Sps => write!(f, "SPS"),
            NalUnitType::Pps => write!(f, "PPS"),
            NalUnitType::Aud => write!(f, "AUD"),
            NalUnitType::Other(t) => write!(f, "type {}", t),
        }
    }
}

/// A single NAL unit without its start code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NalUnit {
    pub unit_type: NalUnitType,
    /// nal_ref_idc (2 bits)
    pub ref_idc: u8,
    /// Header byte followed by the payload
    pub data: Bytes,
}

impl NalUnit {
    /// Build a NAL unit from non-empty data starting at the header byte
    pub fn new(data: Bytes) -> Option<Self> {
        let header = *data.first()?;
        Some(Self {
            unit_type: NalUnitType::from_header(header),
            ref_idc: (header >> 5) & 0x03,
            data,
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
