pub mod audit_log;
pub mod auth;

pub use audit_log::AuditLogger;
pub use auth::{issue_token, AuthFailure, TokenValidator, ValidatedClaims};
