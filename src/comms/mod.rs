pub mod api;
pub mod request_log;
pub mod submission;

pub use api::{create_router, serve, AppState, Authenticated, SharedState};
