//! Paced sample emission
//!
//! Pushing the whole stream at once causes heavy packet loss, so one NAL unit
//! is pulled per tick. The ticker is anchored to the clock rather than built
//! from repeated sleeps, so parse time does not accumulate as skew.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::media::Sample;

use super::cache::ParameterSetCache;
use super::encoder::StreamSource;
use super::reader::{ElementaryStreamReader, DEFAULT_MAX_NAL_SIZE, DEFAULT_READ_CHUNK_SIZE};
use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::webrtc::gate::ReadinessGate;

/// Destination for paced samples
#[async_trait]
pub trait MediaSink: Send + Sync {
    async fn write_sample(&self, sample: Sample) -> Result<()>;

    /// Tear the sink down; must tolerate repeated calls
    async fn close(&self);
}

/// Pipeline timing and parsing parameters
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub frame_interval: Duration,
    pub sample_duration: Duration,
    /// Bound on the wait for the readiness gate
    pub connect_timeout: Option<Duration>,
    pub max_nal_size: usize,
    pub read_chunk_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_interval: Duration::from_millis(33),
            sample_duration: Duration::from_millis(33),
            connect_timeout: None,
            max_nal_size: DEFAULT_MAX_NAL_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}

impl PipelineConfig {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            frame_interval: config.media.frame_interval(),
            sample_duration: config.media.sample_duration(),
            connect_timeout: config.webrtc.connect_timeout(),
            max_nal_size: config.media.max_nal_size,
            read_chunk_size: config.media.read_chunk_size,
        }
    }
}

/// Pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub samples_sent: u64,
    pub keyframes_sent: u64,
    pub parameter_sets_cached: u64,
    pub bytes_sent: u64,
}

/// Why the pipeline stopped
#[derive(Debug)]
pub enum PipelineExit {
    /// Encoder output ended
    EndOfStream,
    /// The session was torn down elsewhere
    Cancelled,
    Failed(AppError),
}

/// Turns an encoder byte stream into paced samples on a sink
pub struct MediaPipeline<S: MediaSink + ?Sized> {
    session_id: u64,
    sink: Arc<S>,
    gate: ReadinessGate,
    cancel: CancellationToken,
    config: PipelineConfig,
}

impl<S: MediaSink + ?Sized> MediaPipeline<S> {
    pub fn new(
        session_id: u64,
        sink: Arc<S>,
        gate: ReadinessGate,
        cancel: CancellationToken,
        config: PipelineConfig,
    ) -> Self {
        Self {
            session_id,
            sink,
            gate,
            cancel,
            config,
        }
    }

    /// Stream `source` to the sink, then close both
    ///
    /// Sink and source are each closed exactly once, whatever the exit reason.
    pub async fn run<R: StreamSource>(self, source: R) -> (PipelineExit, PipelineStats) {
        let mut reader = ElementaryStreamReader::with_limits(
            source,
            self.config.max_nal_size,
            self.config.read_chunk_size,
        );
        let mut stats = PipelineStats::default();

        let exit = self.stream(&mut reader, &mut stats).await;

        match &exit {
            PipelineExit::EndOfStream => {
                info!("[session {}] All video frames parsed and sent", self.session_id)
            }
            PipelineExit::Cancelled => {
                debug!("[session {}] Pipeline cancelled", self.session_id)
            }
            PipelineExit::Failed(e) => {
                warn!("[session {}] Pipeline failed: {}", self.session_id, e)
            }
        }
        info!(
            "[session {}] Pipeline stopped: {} samples ({} keyframes, {} bytes), {} parameter sets cached",
            self.session_id,
            stats.samples_sent,
            stats.keyframes_sent,
            stats.bytes_sent,
            stats.parameter_sets_cached
        );

        self.sink.close().await;
        if let Err(e) = reader.get_mut().close().await {
            warn!("[session {}] Cannot close encoder: {}", self.session_id, e);
        }

        (exit, stats)
    }

    async fn stream<R: StreamSource>(
        &self,
        reader: &mut ElementaryStreamReader<R>,
        stats: &mut PipelineStats,
    ) -> PipelineExit {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return PipelineExit::Cancelled,
            ready = self.wait_ready() => {
                if let Err(e) = ready {
                    return PipelineExit::Failed(e);
                }
            }
        }
        debug!("[session {}] Transport ready, sending samples", self.session_id);

        let mut cache = ParameterSetCache::new();
        // Created after the gate so no ticks accumulate while waiting
        let mut ticker = interval(self.config.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PipelineExit::Cancelled,
                _ = ticker.tick() => {}
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return PipelineExit::Cancelled,
                next = reader.next_nal() => next,
            };
            let nal = match next {
                Ok(Some(nal)) => nal,
                Ok(None) => return PipelineExit::EndOfStream,
                Err(e) => return PipelineExit::Failed(e.into()),
            };

            let Some(framed) = cache.frame(&nal) else {
                stats.parameter_sets_cached += 1;
                continue;
            };

            let len = framed.data.len() as u64;
            let sample = Sample {
                data: framed.data,
                duration: self.config.sample_duration,
                ..Default::default()
            };
            if let Err(e) = self.sink.write_sample(sample).await {
                return PipelineExit::Failed(e);
            }

            stats.samples_sent += 1;
            stats.bytes_sent += len;
            if framed.is_keyframe {
                stats.keyframes_sent += 1;
            }
        }
    }

    async fn wait_ready(&self) -> Result<()> {
        match self.config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.gate.wait())
                .await
                .map_err(|_| AppError::Timeout("ICE connection".to_string())),
            None => {
                self.gate.wait().await;
                Ok(())
            }
        }
    }
}
