//! Orchestration of the plant operations.
//!
//! Every mutating path runs in the same order: validate input, persist the
//! uploaded image (if any), write the record, then re-read it so the response
//! is exactly what the store holds. Nothing here retries; the first failing
//! step ends the request.

use anyhow::{anyhow, Context};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::plants::{ApiError, IdGenerator, NewPlant, Plant, PlantChanges, RESERVED_FIELDS};
use crate::security::{AuditLogger, ValidatedClaims};
use crate::storage::{AssetStore, ImageUpload, PlantStore};

/// Field set and optional image as received from a client.
#[derive(Debug, Clone, Default)]
pub struct PlantSubmission {
    pub fields: Map<String, Value>,
    pub image: Option<ImageUpload>,
}

impl PlantSubmission {
    pub fn new(fields: Map<String, Value>, image: Option<ImageUpload>) -> Self {
        Self { fields, image }
    }
}

#[derive(Clone)]
pub struct PlantService {
    store: Arc<dyn PlantStore>,
    assets: Arc<dyn AssetStore>,
    ids: Arc<dyn IdGenerator>,
    audit: AuditLogger,
}

impl std::fmt::Debug for PlantService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlantService").finish_non_exhaustive()
    }
}

impl PlantService {
    pub fn new(
        store: Arc<dyn PlantStore>,
        assets: Arc<dyn AssetStore>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            assets,
            ids,
            audit: AuditLogger::new(),
        }
    }

    pub async fn create(
        &self,
        actor: &ValidatedClaims,
        submission: PlantSubmission,
    ) -> Result<Plant, ApiError> {
        let result = self.try_create(actor, submission).await;
        self.audit_internal(Some(actor.subject()), "create", result)
    }

    pub async fn list(&self) -> Result<Vec<Plant>, ApiError> {
        let result = self.try_list().await;
        self.audit_internal(None, "list", result)
    }

    pub async fn get(&self, external_id: &str) -> Result<Plant, ApiError> {
        let result = self.try_get(external_id).await;
        self.audit_internal(None, "get", result)
    }

    pub async fn update(
        &self,
        actor: &ValidatedClaims,
        external_id: &str,
        submission: PlantSubmission,
    ) -> Result<Plant, ApiError> {
        let result = self.try_update(actor, external_id, submission).await;
        self.audit_internal(Some(actor.subject()), "update", result)
    }

    pub async fn delete(&self, actor: &ValidatedClaims, external_id: &str) -> Result<(), ApiError> {
        let result = self.try_delete(actor, external_id).await;
        self.audit_internal(Some(actor.subject()), "delete", result)
    }

    /// Unexpected collaborator failures also go to the audit trail.
    fn audit_internal<T>(
        &self,
        subject: Option<&str>,
        operation: &str,
        result: Result<T, ApiError>,
    ) -> Result<T, ApiError> {
        if let Err(ApiError::Internal(e)) = &result {
            self.audit.internal_error(subject, operation, &format!("{e:#}"));
        }
        result
    }

    async fn try_create(
        &self,
        actor: &ValidatedClaims,
        submission: PlantSubmission,
    ) -> Result<Plant, ApiError> {
        let PlantSubmission { mut fields, image } = submission;
        let name = take_required(&mut fields, "name")?;
        let description = take_required(&mut fields, "description")?;
        let season = take_required(&mut fields, "season")?;
        let extra = free_form(fields);

        let image_url = match &image {
            Some(upload) => Some(self.upload(actor, upload).await?),
            None => None,
        };

        let uuid = self.ids.generate();
        self.store
            .insert(NewPlant {
                uuid,
                name,
                description,
                season,
                image: image_url,
                extra,
            })
            .await
            .context("inserting plant")?;

        let stored = self
            .store
            .find_by_uuid(uuid)
            .await
            .context("reading back created plant")?
            .ok_or_else(|| anyhow!("plant {uuid} missing right after insert"))?;

        self.audit.plant_created(actor.subject(), &uuid, image.is_some());
        Ok(stored.into())
    }

    async fn try_list(&self) -> Result<Vec<Plant>, ApiError> {
        let plants = self.store.list().await.context("listing plants")?;
        Ok(plants.into_iter().map(Plant::from).collect())
    }

    async fn try_get(&self, external_id: &str) -> Result<Plant, ApiError> {
        let uuid = parse_external_id(external_id)?;
        self.store
            .find_by_uuid(uuid)
            .await
            .context("fetching plant")?
            .map(Plant::from)
            .ok_or(ApiError::NotFound)
    }

    async fn try_update(
        &self,
        actor: &ValidatedClaims,
        external_id: &str,
        submission: PlantSubmission,
    ) -> Result<Plant, ApiError> {
        let uuid = parse_external_id(external_id)?;
        let PlantSubmission { fields, image } = submission;
        let mut changes = changes_from(fields)?;

        // no upload for a record that is not there
        if self
            .store
            .find_by_uuid(uuid)
            .await
            .context("fetching plant before update")?
            .is_none()
        {
            return Err(ApiError::NotFound);
        }

        if let Some(upload) = &image {
            changes.image = Some(self.upload(actor, upload).await?);
        }

        if !changes.is_empty() {
            let updated = self
                .store
                .update_by_uuid(uuid, changes)
                .await
                .context("updating plant")?;
            if updated == 0 {
                return Err(ApiError::NotFound);
            }
        }

        let stored = self
            .store
            .find_by_uuid(uuid)
            .await
            .context("reading back updated plant")?
            .ok_or(ApiError::NotFound)?;

        self.audit.plant_updated(actor.subject(), &uuid, image.is_some());
        Ok(stored.into())
    }

    async fn try_delete(&self, actor: &ValidatedClaims, external_id: &str) -> Result<(), ApiError> {
        let uuid = parse_external_id(external_id)?;
        let deleted = self
            .store
            .delete_by_uuid(uuid)
            .await
            .context("deleting plant")?;
        if deleted == 0 {
            return Err(ApiError::NotFound);
        }

        self.audit.plant_deleted(actor.subject(), &uuid);
        Ok(())
    }

    async fn upload(&self, actor: &ValidatedClaims, upload: &ImageUpload) -> Result<String, ApiError> {
        match self.assets.store(upload).await {
            Ok(asset) => {
                self.audit
                    .asset_stored(actor.subject(), &asset.key, upload.bytes.len());
                Ok(asset.url)
            }
            Err(e) => {
                self.audit
                    .upload_failed(actor.subject(), &upload.file_name, &e.to_string());
                Err(ApiError::UploadFailed(e))
            }
        }
    }
}

/// A malformed id cannot name any record.
fn parse_external_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound)
}

fn string_field(field: &str, value: Value) -> Result<Option<String>, ApiError> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => Ok(Some(s)),
        _ => Err(ApiError::InvalidField {
            field: field.to_string(),
        }),
    }
}

fn take_required(fields: &mut Map<String, Value>, field: &str) -> Result<String, ApiError> {
    let value = fields.remove(field).unwrap_or(Value::Null);
    string_field(field, value)?.ok_or_else(|| ApiError::missing_field(field))
}

/// Like `take_required`, but absence is fine; only a blank value is refused.
fn take_optional(fields: &mut Map<String, Value>, field: &str) -> Result<Option<String>, ApiError> {
    match fields.remove(field) {
        None => Ok(None),
        Some(value) => string_field(field, value)?
            .map(Some)
            .ok_or_else(|| ApiError::missing_field(field)),
    }
}

fn free_form(mut fields: Map<String, Value>) -> Map<String, Value> {
    fields.retain(|key, _| !RESERVED_FIELDS.contains(&key.as_str()));
    fields
}

fn changes_from(mut fields: Map<String, Value>) -> Result<PlantChanges, ApiError> {
    let name = take_optional(&mut fields, "name")?;
    let description = take_optional(&mut fields, "description")?;
    let season = take_optional(&mut fields, "season")?;
    Ok(PlantChanges {
        name,
        description,
        season,
        // images only arrive as uploads
        image: None,
        extra: free_form(fields),
    })
}
