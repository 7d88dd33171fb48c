use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AuditLogger;

impl AuditLogger {
    pub fn new() -> Self {
        Self
    }

    pub fn auth_success(&self, subject: &str, path: &str) {
        info!(target: "audit", event = "auth_success", subject, path);
    }

    pub fn auth_failure(&self, path: &str, reason: &str) {
        warn!(target: "audit", event = "auth_failure", path, reason);
    }

    pub fn plant_created(&self, subject: &str, uuid: &Uuid, with_image: bool) {
        info!(target: "audit", event = "plant_created", subject, uuid = %uuid, with_image);
    }

    pub fn plant_updated(&self, subject: &str, uuid: &Uuid, with_image: bool) {
        info!(target: "audit", event = "plant_updated", subject, uuid = %uuid, with_image);
    }

    pub fn plant_deleted(&self, subject: &str, uuid: &Uuid) {
        info!(target: "audit", event = "plant_deleted", subject, uuid = %uuid);
    }

    pub fn asset_stored(&self, subject: &str, key: &str, size: usize) {
        info!(target: "audit", event = "asset_stored", subject, key, size);
    }

    pub fn internal_error(&self, subject: Option<&str>, operation: &str, error_msg: &str) {
        error!(target: "audit", event = "internal_error", subject = subject.unwrap_or(""), operation, error = error_msg);
    }

    pub fn upload_failed(&self, subject: &str, file_name: &str, error_msg: &str) {
        error!(target: "audit", event = "upload_failed", subject, file_name, error = error_msg);
    }
}
