mod handlers;
mod routes;

pub use handlers::{is_sdp_content_type, offer_handler};
pub use routes::create_router;
