//! Connection state handling
//!
//! Two independent axes are tracked. ICE `connected` opens the readiness
//! gate the first time it is seen. Peer-connection `failed` tears the
//! transport down. `disconnected` is only logged since ICE may recover.

use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{info, warn};

use super::gate::ReadinessGate;
use super::signaling::ConnectionState;
use super::transport::Transport;

/// What a state change requires from the owner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateAction {
    None,
    /// The readiness gate was opened by this change
    GateOpened,
    /// The transport must be closed
    Teardown,
}

/// Reacts to ICE and peer-connection state changes for one session
pub struct ConnectionStateMachine {
    session_id: u64,
    gate: ReadinessGate,
    ice_tx: watch::Sender<ConnectionState>,
    peer_tx: watch::Sender<ConnectionState>,
}

impl ConnectionStateMachine {
    pub fn new(session_id: u64, gate: ReadinessGate) -> Self {
        let (ice_tx, _) = watch::channel(ConnectionState::New);
        let (peer_tx, _) = watch::channel(ConnectionState::New);
        Self {
            session_id,
            gate,
            ice_tx,
            peer_tx,
        }
    }

    pub fn on_ice_state(&self, state: ConnectionState) -> StateAction {
        info!("[session {}] ICE connection state: {}", self.session_id, state);
        self.ice_tx.send_replace(state);

        if state == ConnectionState::Connected && self.gate.fire() {
            info!("[session {}] Transport ready", self.session_id);
            return StateAction::GateOpened;
        }
        StateAction::None
    }

    pub fn on_peer_state(&self, state: ConnectionState) -> StateAction {
        info!("[session {}] Peer connection state: {}", self.session_id, state);
        self.peer_tx.send_replace(state);

        match state {
            ConnectionState::Failed => StateAction::Teardown,
            ConnectionState::Disconnected => {
                warn!("[session {}] Peer disconnected, waiting for recovery", self.session_id);
                StateAction::None
            }
            _ => StateAction::None,
        }
    }

    pub fn ice_state(&self) -> ConnectionState {
        *self.ice_tx.borrow()
    }

    pub fn peer_state(&self) -> ConnectionState {
        *self.peer_tx.borrow()
    }

    pub fn subscribe_ice(&self) -> watch::Receiver<ConnectionState> {
        self.ice_tx.subscribe()
    }

    pub fn subscribe_peer(&self) -> watch::Receiver<ConnectionState> {
        self.peer_tx.subscribe()
    }

    /// Register state callbacks on the transport's peer connection
    ///
    /// The peer callback holds the transport weakly; the peer connection
    /// owns its callbacks, so a strong reference would keep it alive forever.
    pub fn attach(self: &Arc<Self>, transport: &Arc<Transport>) {
        let machine = Arc::clone(self);
        transport
            .peer_connection()
            .on_ice_connection_state_change(Box::new(move |s| {
                let machine = Arc::clone(&machine);
                Box::pin(async move {
                    if let Some(state) = ConnectionState::from_ice(s) {
                        machine.on_ice_state(state);
                    }
                })
            }));

        let machine = Arc::clone(self);
        let weak: Weak<Transport> = Arc::downgrade(transport);
        transport
            .peer_connection()
            .on_peer_connection_state_change(Box::new(move |s| {
                let machine = Arc::clone(&machine);
                let weak = weak.clone();
                Box::pin(async move {
                    let Some(state) = ConnectionState::from_peer(s) else {
                        return;
                    };
                    if machine.on_peer_state(state) == StateAction::Teardown {
                        if let Some(transport) = weak.upgrade() {
                            // Closing inside the callback would wait on the callback itself
                            tokio::spawn(async move { transport.close().await });
                        }
                    }
                })
            }));
    }
}
