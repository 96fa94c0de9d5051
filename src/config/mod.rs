//! Configuration schema and loading

mod schema;
mod store;

pub use schema::{AppConfig, EncoderConfig, MediaConfig, WebConfig, WebRtcConfig};
pub use store::load_config;
