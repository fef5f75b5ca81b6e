//! HTTP boundary: JSON in, typed requests out, results polled.

pub mod handlers;
pub mod routes;

pub use handlers::{ServerState, SharedState};
pub use routes::create_router;
