//! Media source pipeline
//!
//! ```text
//! Encoder process (stdout, Annex-B)
//!        |
//!        v
//! ElementaryStreamReader (NAL units)
//!        |
//!        v
//! ParameterSetCache (SPS/PPS merged into the next IDR)
//!        |
//!        v
//! MediaPipeline (one sample per tick, gated on ICE connected)
//!        |
//!        v
//! MediaSink (outbound H.264 track)
//! ```

pub mod cache;
pub mod encoder;
pub mod h264;
pub mod pipeline;
pub mod reader;

pub use cache::{FramedNal, ParameterSetCache};
pub use encoder::{EncoderProcess, StreamSource};
pub use h264::{NalUnit, NalUnitType, START_CODE};
pub use pipeline::{MediaPipeline, MediaSink, PipelineConfig, PipelineExit, PipelineStats};
pub use reader::{ElementaryStreamReader, StreamError};
