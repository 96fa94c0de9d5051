//! h264-rtc-streamer - push a live H.264 stream to a WebRTC peer
//!
//! A remote peer POSTs a single SDP offer. The server answers it, spawns an
//! external encoder, parses its Annex-B output and paces the resulting NAL
//! units onto an outbound H.264 track once ICE reports connected.

pub mod config;
pub mod error;
pub mod media;
pub mod state;
pub mod web;
pub mod webrtc;

pub use error::{AppError, Result};
