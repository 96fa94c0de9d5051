use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::debug;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::webrtc::SdpOffer;

const SDP_MIME: &str = "application/sdp";

/// Whether the request declares an SDP body
///
/// Only the media type is compared, case-insensitively; parameters such as
/// `charset` are ignored.
pub fn is_sdp_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case(SDP_MIME))
        .unwrap_or(false)
}

/// Answer an SDP offer
///
/// The body is the raw offer; the response body is the raw answer.
pub async fn offer_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    match handle_offer(&state, &headers, body).await {
        Ok(sdp) => (StatusCode::OK, [(header::CONTENT_TYPE, SDP_MIME)], sdp).into_response(),
        Err(e) => e.to_response(state.config.web.expose_error_details),
    }
}

async fn handle_offer(state: &AppState, headers: &HeaderMap, body: Body) -> Result<String> {
    if !is_sdp_content_type(headers) {
        return Err(AppError::UnsupportedMediaType);
    }

    let bytes = axum::body::to_bytes(body, state.config.web.max_body_bytes)
        .await
        .map_err(|e| AppError::BodyRead(e.to_string()))?;
    let sdp = String::from_utf8(bytes.to_vec())
        .map_err(|e| AppError::BodyRead(format!("offer is not valid UTF-8: {}", e)))?;
    debug!("Received offer ({} bytes)", sdp.len());

    let answer = state.sessions.create_session(SdpOffer::new(sdp)).await?;
    Ok(answer.sdp)
}
