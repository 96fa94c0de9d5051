use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP server settings
    pub web: WebConfig,
    /// Peer connection settings
    pub webrtc: WebRtcConfig,
    /// Pacing and parsing settings
    pub media: MediaConfig,
    /// External encoder process
    pub encoder: EncoderConfig,
}

impl AppConfig {
    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.webrtc.stun_server.trim().is_empty() {
            return Err(AppError::Config("webrtc.stun_server must not be empty".into()));
        }
        if self.media.frame_interval_ms == 0 {
            return Err(AppError::Config("media.frame_interval_ms must be > 0".into()));
        }
        if self.media.max_nal_size == 0 {
            return Err(AppError::Config("media.max_nal_size must be > 0".into()));
        }
        if self.media.read_chunk_size == 0 {
            return Err(AppError::Config("media.read_chunk_size must be > 0".into()));
        }
        if self.encoder.program.trim().is_empty() {
            return Err(AppError::Config("encoder.program must not be empty".into()));
        }
        Ok(())
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub bind_address: String,
    /// HTTP port
    pub http_port: u16,
    /// Return raw error text to clients (otherwise only an error category)
    pub expose_error_details: bool,
    /// Maximum accepted offer size
    pub max_body_bytes: usize,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "::".to_string(),
            http_port: 5050,
            expose_error_details: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// WebRTC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebRtcConfig {
    /// The single STUN server used for connectivity establishment
    pub stun_server: String,
    /// Deadline for ICE candidate gathering; `None` waits indefinitely
    pub gathering_timeout_ms: Option<u64>,
    /// Deadline for the first ICE connected transition; `None` waits indefinitely
    pub connect_timeout_ms: Option<u64>,
    /// Outbound video track ID
    pub track_id: String,
    /// Outbound media stream ID
    pub stream_id: String,
}

impl Default for WebRtcConfig {
    fn default() -> Self {
        Self {
            stun_server: "stun:stun.l.google.com:19302".to_string(),
            gathering_timeout_ms: None,
            connect_timeout_ms: None,
            track_id: "video".to_string(),
            stream_id: "h264-rtc-streamer".to_string(),
        }
    }
}

impl WebRtcConfig {
    pub fn gathering_timeout(&self) -> Option<Duration> {
        self.gathering_timeout_ms.map(Duration::from_millis)
    }

    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_ms.map(Duration::from_millis)
    }
}

/// Media pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    /// Interval between pulled NAL units (~30 fps)
    pub frame_interval_ms: u64,
    /// Duration stamped on each sample; defaults to the frame interval
    pub sample_duration_ms: Option<u64>,
    /// Largest NAL unit accepted from the encoder
    pub max_nal_size: usize,
    /// Bytes requested per read from the encoder pipe
    pub read_chunk_size: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: 33,
            sample_duration_ms: None,
            max_nal_size: 4 * 1024 * 1024,
            read_chunk_size: 64 * 1024,
        }
    }
}

impl MediaConfig {
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }

    pub fn sample_duration(&self) -> Duration {
        Duration::from_millis(self.sample_duration_ms.unwrap_or(self.frame_interval_ms))
    }
}

/// External encoder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Program to execute
    pub program: String,
    /// Arguments passed verbatim
    pub args: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".to_string(),
            args: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.web.http_port, 5050);
        assert_eq!(config.webrtc.stun_server, "stun:stun.l.google.com:19302");
        assert!(config.webrtc.gathering_timeout().is_none());
        assert_eq!(config.media.frame_interval(), Duration::from_millis(33));
        assert_eq!(config.media.sample_duration(), Duration::from_millis(33));
        assert_eq!(config.encoder.program, "ffmpeg");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AppConfig::default();
        config.media.frame_interval_ms = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_empty_program() {
        let mut config = AppConfig::default();
        config.encoder.program = "  ".to_string();
        assert!(config.validate().is_err());
    }
}
