//! WebRTC session plumbing
//!
//! Architecture:
//! ```text
//! HTTP POST (SDP offer)
//!        |
//!        v
//! SessionManager ---- creates ----> Transport (peer connection, H.264 track, RTP sender)
//!        |                              |            |
//!        |                              |            +--> feedback drain (RTCP)
//!        |                              v
//!        |               ConnectionStateMachine (ICE connected -> ReadinessGate,
//!        |                                       peer failed   -> close)
//!        v
//! MediaPipeline (waits on ReadinessGate, then paces samples onto the track)
//! ```

pub mod feedback;
pub mod gate;
pub mod session;
pub mod signaling;
pub mod state;
pub mod transport;

pub use gate::ReadinessGate;
pub use session::{SessionIdAllocator, SessionInfo, SessionManager};
pub use signaling::{ConnectionState, SdpAnswer, SdpOffer};
pub use state::{ConnectionStateMachine, StateAction};
pub use transport::Transport;
