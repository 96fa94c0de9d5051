//! RTCP feedback drain
//!
//! Interceptors (NACK, reports) only run while inbound RTCP is being read,
//! so each session keeps a task pulling from its RTP sender.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;

use crate::error::{AppError, Result};

/// Read buffer size, one MTU
pub const RTCP_BUFFER_SIZE: usize = 1500;

/// Source of inbound control packets
#[async_trait]
pub trait FeedbackReader: Send + Sync {
    /// Read one batch, returning the number of packets in it
    async fn read_feedback(&self, buf: &mut [u8]) -> Result<usize>;
}

#[async_trait]
impl FeedbackReader for RTCRtpSender {
    async fn read_feedback(&self, buf: &mut [u8]) -> Result<usize> {
        let (packets, _) = self
            .read(buf)
            .await
            .map_err(|e| AppError::WebRtcError(format!("RTCP read failed: {}", e)))?;
        Ok(packets.len())
    }
}

/// Read and discard feedback until the reader fails or the session ends
///
/// Returns the number of packets drained.
pub async fn drain_feedback<F>(reader: Arc<F>, cancel: CancellationToken, session_id: u64) -> u64
where
    F: FeedbackReader + ?Sized,
{
    let mut buf = vec![0u8; RTCP_BUFFER_SIZE];
    let mut packets = 0u64;

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            read = reader.read_feedback(&mut buf) => read,
        };
        match read {
            Ok(n) => {
                packets += n as u64;
                trace!("[session {}] {} RTCP packets", session_id, n);
            }
            Err(e) => {
                debug!("[session {}] Feedback drain stopped: {}", session_id, e);
                break;
            }
        }
    }

    debug!("[session {}] Drained {} RTCP packets", session_id, packets);
    packets
}

pub fn spawn_feedback_drain<F>(
    reader: Arc<F>,
    cancel: CancellationToken,
    session_id: u64,
) -> JoinHandle<u64>
where
    F: FeedbackReader + ?Sized + 'static,
{
    tokio::spawn(drain_feedback(reader, cancel, session_id))
}
