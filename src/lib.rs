pub mod comms;
pub mod config;
pub mod plants;
pub mod security;
pub mod storage;
pub mod utils;

// Crate version exposed for runtime queries
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
