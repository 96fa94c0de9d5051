//! Per-session WebRTC transport
//!
//! Owns the peer connection, the H.264 sample track and the RTP sender that
//! carries it. Closing is idempotent and also cancels the session token, so
//! every task bound to the session stops with it.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_H264};
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::config::WebRtcConfig;
use crate::error::{AppError, Result};
use crate::media::MediaSink;

/// Peer connection with a single outgoing H.264 track
pub struct Transport {
    session_id: u64,
    pc: Arc<RTCPeerConnection>,
    track: Arc<TrackLocalStaticSample>,
    sender: Arc<RTCRtpSender>,
    closed: AtomicBool,
    cancel: CancellationToken,
}

impl Transport {
    /// Build the peer connection and attach the video track
    pub async fn new(config: &WebRtcConfig, session_id: u64) -> Result<Arc<Self>> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| AppError::WebRtcError(format!("Failed to register codecs: {}", e)))?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| AppError::WebRtcError(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        // Without a STUN server only host candidates are gathered
        let mut ice_servers = vec![];
        if !config.stun_server.trim().is_empty() {
            ice_servers.push(RTCIceServer {
                urls: vec![config.stun_server.clone()],
                ..Default::default()
            });
        }

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = api
            .new_peer_connection(rtc_config)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create peer connection: {}", e)))?;
        let pc = Arc::new(pc);

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_H264.to_owned(),
                ..Default::default()
            },
            config.track_id.clone(),
            config.stream_id.clone(),
        ));

        let sender = match pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
        {
            Ok(sender) => sender,
            Err(e) => {
                if let Err(close_err) = pc.close().await {
                    warn!(
                        "[session {}] Cannot close peer connection: {}",
                        session_id, close_err
                    );
                }
                return Err(AppError::WebRtcError(format!(
                    "Failed to add video track: {}",
                    e
                )));
            }
        };

        info!("[session {}] H.264 track added to peer connection", session_id);

        Ok(Arc::new(Self {
            session_id,
            pc,
            track,
            sender,
            closed: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }))
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn peer_connection(&self) -> &Arc<RTCPeerConnection> {
        &self.pc
    }

    pub fn sender(&self) -> Arc<RTCRtpSender> {
        Arc::clone(&self.sender)
    }

    /// Token cancelled when the transport closes
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Apply the remote offer and produce a fully gathered answer
    ///
    /// Candidate gathering is awaited so the answer can be returned in a
    /// single response with no trickle ICE.
    pub async fn negotiate(&self, offer_sdp: String, gathering_timeout: Option<Duration>) -> Result<String> {
        debug!("[session {}] Remote offer:\n{}", self.session_id, offer_sdp);

        let offer = RTCSessionDescription::offer(offer_sdp)
            .map_err(|e| AppError::InvalidOffer(e.to_string()))?;

        self.pc
            .set_remote_description(offer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set remote description: {}", e)))?;

        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to create answer: {}", e)))?;

        // Subscribe before setting the local description so completion cannot be missed
        let mut gather_complete = self.pc.gathering_complete_promise().await;

        self.pc
            .set_local_description(answer)
            .await
            .map_err(|e| AppError::WebRtcError(format!("Failed to set local description: {}", e)))?;

        match gathering_timeout {
            Some(limit) => {
                tokio::time::timeout(limit, gather_complete.recv())
                    .await
                    .map_err(|_| AppError::Timeout("ICE candidate gathering".to_string()))?;
            }
            None => {
                let _ = gather_complete.recv().await;
            }
        }

        let local = self
            .pc
            .local_description()
            .await
            .ok_or_else(|| AppError::WebRtcError("No local description after gathering".to_string()))?;

        debug!("[session {}] Local answer:\n{}", self.session_id, local.sdp);
        Ok(local.sdp)
    }

    /// Close the peer connection; later calls do nothing
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();

        if let Err(e) = self.pc.close().await {
            warn!(
                "[session {}] Failed to close peer connection: {}",
                self.session_id, e
            );
        }
        info!("[session {}] Transport closed", self.session_id);
    }
}

#[async_trait]
impl MediaSink for Transport {
    async fn write_sample(&self, sample: Sample) -> Result<()> {
        if self.is_closed() {
            return Err(AppError::Delivery("transport closed".to_string()));
        }
        self.track
            .write_sample(&sample)
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))
    }

    async fn close(&self) {
        Transport::close(self).await
    }
}
