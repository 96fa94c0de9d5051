//! WebRTC session management

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::feedback::spawn_feedback_drain;
use super::gate::ReadinessGate;
use super::signaling::{ConnectionState, SdpAnswer, SdpOffer};
use super::state::ConnectionStateMachine;
use super::transport::Transport;
use crate::config::AppConfig;
use crate::error::Result;
use crate::media::{EncoderProcess, MediaPipeline, PipelineConfig};

/// Process-wide session id source
///
/// Ids start at 1 and are unique and strictly increasing in allocation
/// order, whatever the number of concurrent callers.
#[derive(Debug, Default)]
pub struct SessionIdAllocator {
    last: AtomicU64,
}

impl SessionIdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&self) -> u64 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// WebRTC session info
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub session_id: u64,
    pub created_at: Instant,
    pub ice_state: ConnectionState,
    pub peer_state: ConnectionState,
}

struct SessionEntry {
    created_at: Instant,
    transport: Arc<Transport>,
    machine: Arc<ConnectionStateMachine>,
}

/// WebRTC session manager
pub struct SessionManager {
    config: Arc<AppConfig>,
    ids: SessionIdAllocator,
    sessions: Arc<RwLock<HashMap<u64, SessionEntry>>>,
}

impl SessionManager {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            ids: SessionIdAllocator::new(),
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Answer an offer and start streaming to the new peer
    ///
    /// Returns once the answer is final. The encoder is started right away in
    /// the background; its samples are held back until ICE reports connected.
    /// Dropping the returned future before it completes tears the session down.
    pub async fn create_session(&self, offer: SdpOffer) -> Result<SdpAnswer> {
        let session_id = self.ids.allocate();
        let created_at = Instant::now();
        info!("[session {}] New offer ({} bytes)", session_id, offer.sdp.len());

        let transport = Transport::new(&self.config.webrtc, session_id).await?;
        self.establish(transport, created_at, offer).await
    }

    async fn establish(
        &self,
        transport: Arc<Transport>,
        created_at: Instant,
        offer: SdpOffer,
    ) -> Result<SdpAnswer> {
        let session_id = transport.session_id();
        let guard = SetupGuard::new(&transport);
        let gate = ReadinessGate::new();

        // Both tasks are bound to the transport token and stop if setup fails below
        spawn_feedback_drain(transport.sender(), transport.cancel_token(), session_id);
        self.spawn_pipeline(Arc::clone(&transport), gate.clone());

        let machine = Arc::new(ConnectionStateMachine::new(session_id, gate));
        machine.attach(&transport);

        let sdp = match transport
            .negotiate(offer.sdp, self.config.webrtc.gathering_timeout())
            .await
        {
            Ok(sdp) => sdp,
            Err(e) => {
                transport.close().await;
                return Err(e);
            }
        };

        self.sessions.write().await.insert(
            session_id,
            SessionEntry {
                created_at,
                transport: Arc::clone(&transport),
                machine,
            },
        );
        self.spawn_reaper(&transport);
        guard.disarm();

        let answer = SdpAnswer { session_id, sdp };
        info!(
            "[session {}] Answer ready with {} candidates",
            session_id,
            answer.candidate_count()
        );
        Ok(answer)
    }

    fn spawn_pipeline(&self, transport: Arc<Transport>, gate: ReadinessGate) {
        let config = Arc::clone(&self.config);
        tokio::spawn(async move {
            let session_id = transport.session_id();
            if transport.is_closed() {
                return;
            }
            let encoder = match EncoderProcess::spawn(&config.encoder, session_id) {
                Ok(encoder) => encoder,
                Err(e) => {
                    error!("[session {}] {}", session_id, e);
                    transport.close().await;
                    return;
                }
            };

            let pipeline = MediaPipeline::new(
                session_id,
                Arc::clone(&transport),
                gate,
                transport.cancel_token(),
                PipelineConfig::from_config(&config),
            );
            let (exit, stats) = pipeline.run(encoder).await;
            debug!("[session {}] Pipeline exit {:?}, {:?}", session_id, exit, stats);
        });
    }

    /// Drop the registry entry once the transport is torn down
    fn spawn_reaper(&self, transport: &Arc<Transport>) {
        let sessions = Arc::clone(&self.sessions);
        let session_id = transport.session_id();
        let cancel = transport.cancel_token();
        tokio::spawn(async move {
            cancel.cancelled().await;
            if sessions.write().await.remove(&session_id).is_some() {
                info!("[session {}] Session removed", session_id);
            }
        });
    }

    /// Sessions whose transport is still open
    pub async fn active_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut list: Vec<_> = sessions
            .iter()
            .filter(|(_, entry)| !entry.transport.is_closed())
            .map(|(id, entry)| entry.info(*id))
            .collect();
        list.sort_by_key(|info| info.session_id);
        list
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Close every session, used on shutdown
    pub async fn close_all(&self) -> usize {
        let entries: Vec<_> = self.sessions.write().await.drain().collect();
        let count = entries.len();
        for (_, entry) in entries {
            entry.transport.close().await;
        }
        if count > 0 {
            info!("Closed {} WebRTC sessions", count);
        }
        count
    }
}

impl SessionEntry {
    fn info(&self, session_id: u64) -> SessionInfo {
        SessionInfo {
            session_id,
            created_at: self.created_at,
            ice_state: self.machine.ice_state(),
            peer_state: self.machine.peer_state(),
        }
    }
}

/// Closes the transport of a session whose setup did not finish
///
/// Covers both error returns and the setup future being dropped, e.g. when
/// the HTTP client goes away during candidate gathering.
struct SetupGuard {
    transport: Option<Arc<Transport>>,
}

impl SetupGuard {
    fn new(transport: &Arc<Transport>) -> Self {
        Self {
            transport: Some(Arc::clone(transport)),
        }
    }

    fn disarm(mut self) {
        self.transport = None;
    }
}

impl Drop for SetupGuard {
    fn drop(&mut self) {
        let Some(transport) = self.transport.take() else {
            return;
        };
        // Stops the feedback drain and pipeline right away
        transport.cancel_token().cancel();
        if transport.is_closed() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(
                    "[session {}] Setup abandoned, closing transport",
                    transport.session_id()
                );
                handle.spawn(async move { transport.close().await });
            }
            Err(_) => warn!(
                "[session {}] No runtime to close abandoned transport",
                transport.session_id()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncoderConfig;
    use crate::error::AppError;
    use std::collections::HashSet;
    use std::time::Duration;
    use webrtc::api::media_engine::MediaEngine;
    use webrtc::api::APIBuilder;
    use webrtc::peer_connection::configuration::RTCConfiguration;
    use webrtc::peer_connection::RTCPeerConnection;
    use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
    use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
    use webrtc::rtp_transceiver::RTCRtpTransceiverInit;

    #[test]
    fn test_ids_start_at_one_and_increase() {
        let ids = SessionIdAllocator::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 3);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(SessionIdAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || {
                    let mut mine = Vec::with_capacity(1000);
                    for _ in 0..1000 {
                        mine.push(ids.allocate());
                    }
                    mine
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let mine = handle.join().unwrap();
            // Each caller observes its own ids in increasing order
            assert!(mine.windows(2).all(|w| w[0] < w[1]));
            for id in mine {
                assert!(seen.insert(id), "duplicate id {}", id);
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(seen.iter().max(), Some(&8000));
    }

    async fn remote_offer() -> (RTCPeerConnection, String) {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().unwrap();
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        let pc = api
            .new_peer_connection(RTCConfiguration::default())
            .await
            .unwrap();
        pc.add_transceiver_from_kind(
            RTPCodecType::Video,
            Some(RTCRtpTransceiverInit {
                direction: RTCRtpTransceiverDirection::Recvonly,
                send_encodings: vec![],
            }),
        )
        .await
        .unwrap();
        let offer = pc.create_offer(None).await.unwrap();
        (pc, offer.sdp)
    }

    #[tokio::test]
    async fn test_malformed_offer_leaves_no_session() {
        let manager = SessionManager::new(AppConfig::default());
        let result = manager.create_session(SdpOffer::new("garbage")).await;
        assert!(matches!(result, Err(AppError::InvalidOffer(_))));
        assert_eq!(manager.session_count().await, 0);
        assert!(manager.active_sessions().await.is_empty());

        // The failed attempt still consumed an id
        assert_eq!(manager.ids.allocate(), 2);
    }

    #[tokio::test]
    async fn test_malformed_offer_closes_transport() {
        let manager = SessionManager::new(AppConfig::default());
        let transport = Transport::new(&manager.config.webrtc, 1).await.unwrap();
        let token = transport.cancel_token();

        let result = manager
            .establish(Arc::clone(&transport), Instant::now(), SdpOffer::new("garbage"))
            .await;

        assert!(matches!(result, Err(AppError::InvalidOffer(_))));
        assert!(transport.is_closed());
        assert!(token.is_cancelled());
        assert_eq!(manager.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_dropped_setup_closes_transport() {
        let manager = SessionManager::new(AppConfig::default());
        let (remote, offer) = remote_offer().await;
        let transport = Transport::new(&manager.config.webrtc, 2).await.unwrap();
        let token = transport.cancel_token();

        let mut setup = tokio_test::task::spawn(manager.establish(
            Arc::clone(&transport),
            Instant::now(),
            SdpOffer::new(offer),
        ));
        // Gathering runs on other tasks, so one poll cannot finish the exchange
        assert!(setup.poll().is_pending());
        drop(setup);

        assert!(token.is_cancelled());
        tokio::time::timeout(Duration::from_secs(5), async {
            while !transport.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("abandoned transport should be closed");
        assert_eq!(manager.session_count().await, 0);

        remote.close().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_session_registered_with_arrival_time() {
        let mut config = AppConfig::default();
        // Host candidates only, so gathering finishes without network access
        config.webrtc.stun_server = String::new();
        config.webrtc.gathering_timeout_ms = Some(10_000);
        config.encoder = EncoderConfig {
            program: "sleep".to_string(),
            args: vec!["30".to_string()],
        };
        let manager = SessionManager::new(config);
        let (remote, offer) = remote_offer().await;
        let transport = Transport::new(&manager.config.webrtc, 3).await.unwrap();

        let arrived = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let answer = manager
            .establish(Arc::clone(&transport), arrived, SdpOffer::new(offer))
            .await
            .unwrap();

        assert_eq!(answer.session_id, 3);
        assert!(answer.sdp.starts_with("v=0"));
        assert!(!transport.is_closed());

        let sessions = manager.active_sessions().await;
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].session_id, 3);
        assert_eq!(sessions[0].created_at, arrived);

        assert_eq!(manager.close_all().await, 1);
        assert!(transport.is_closed());
        assert_eq!(manager.session_count().await, 0);

        remote.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_close_all_without_sessions() {
        let manager = SessionManager::new(AppConfig::default());
        assert_eq!(manager.close_all().await, 0);
    }
}
