use std::sync::Arc;

use crate::config::AppConfig;
use crate::webrtc::SessionManager;

/// Application-wide state shared across handlers
pub struct AppState {
    /// Loaded configuration
    pub config: AppConfig,
    /// Live WebRTC sessions
    pub sessions: SessionManager,
}

impl AppState {
    pub fn new(config: AppConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: SessionManager::new(config.clone()),
            config,
        })
    }

    /// Tear down all sessions
    pub async fn shutdown(&self) {
        let closed = self.sessions.close_all().await;
        tracing::info!("Shutdown complete, {} sessions closed", closed);
    }
}
