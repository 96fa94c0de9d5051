//! Offer/answer text and connection state tags

use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

/// SDP offer from the remote peer
#[derive(Debug, Clone)]
pub struct SdpOffer {
    pub sdp: String,
}

impl SdpOffer {
    pub fn new(sdp: impl Into<String>) -> Self {
        Self { sdp: sdp.into() }
    }
}

/// Finalized SDP answer, candidates included
#[derive(Debug, Clone)]
pub struct SdpAnswer {
    pub session_id: u64,
    pub sdp: String,
}

impl SdpAnswer {
    /// Number of `a=candidate` lines in the answer
    pub fn candidate_count(&self) -> usize {
        self.sdp.matches("a=candidate:").count()
    }
}

/// State of either the ICE axis or the peer-connection axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Checking,
    Connecting,
    Connected,
    Completed,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// Map an ICE connection state; `Unspecified` has no counterpart
    pub fn from_ice(state: RTCIceConnectionState) -> Option<Self> {
        match state {
            RTCIceConnectionState::New => Some(ConnectionState::New),
            RTCIceConnectionState::Checking => Some(ConnectionState::Checking),
            RTCIceConnectionState::Connected => Some(ConnectionState::Connected),
            RTCIceConnectionState::Completed => Some(ConnectionState::Completed),
            RTCIceConnectionState::Disconnected => Some(ConnectionState::Disconnected),
            RTCIceConnectionState::Failed => Some(ConnectionState::Failed),
            RTCIceConnectionState::Closed => Some(ConnectionState::Closed),
            _ => None,
        }
    }

    /// Map a peer connection state; `Unspecified` has no counterpart
    pub fn from_peer(state: RTCPeerConnectionState) -> Option<Self> {
        match state {
            RTCPeerConnectionState::New => Some(ConnectionState::New),
            RTCPeerConnectionState::Connecting => Some(ConnectionState::Connecting),
            RTCPeerConnectionState::Connected => Some(ConnectionState::Connected),
            RTCPeerConnectionState::Disconnected => Some(ConnectionState::Disconnected),
            RTCPeerConnectionState::Failed => Some(ConnectionState::Failed),
            RTCPeerConnectionState::Closed => Some(ConnectionState::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::New => write!(f, "new"),
            ConnectionState::Checking => write!(f, "checking"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Completed => write!(f, "completed"),
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Failed => write!(f, "failed"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ice_state_mapping() {
        assert_eq!(
            ConnectionState::from_ice(RTCIceConnectionState::Connected),
            Some(ConnectionState::Connected)
        );
        assert_eq!(
            ConnectionState::from_ice(RTCIceConnectionState::Checking),
            Some(ConnectionState::Checking)
        );
        assert_eq!(
            ConnectionState::from_ice(RTCIceConnectionState::Unspecified),
            None
        );
    }

    #[test]
    fn test_peer_state_mapping() {
        assert_eq!(
            ConnectionState::from_peer(RTCPeerConnectionState::Failed),
            Some(ConnectionState::Failed)
        );
        assert_eq!(
            ConnectionState::from_peer(RTCPeerConnectionState::Connecting),
            Some(ConnectionState::Connecting)
        );
        assert_eq!(
            ConnectionState::from_peer(RTCPeerConnectionState::Unspecified),
            None
        );
    }

    #[test]
    fn test_candidate_count() {
        let answer = SdpAnswer {
            session_id: 1,
            sdp: "v=0\r\na=candidate:1 1 udp 1 10.0.0.1 5000 typ host\r\na=candidate:2 1 udp 1 1.2.3.4 5000 typ srflx\r\n"
                .to_string(),
        };
        assert_eq!(answer.candidate_count(), 2);
        assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    }
}
