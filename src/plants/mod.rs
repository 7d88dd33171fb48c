pub mod error;
pub mod id;
pub mod service;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub use error::ApiError;
pub use id::{IdGenerator, RandomIdGenerator};
pub use service::{PlantService, PlantSubmission};

/// Keys a caller can never set through the free-form part of a submission.
pub const RESERVED_FIELDS: &[&str] = &[
    "id",
    "uuid",
    "name",
    "description",
    "season",
    "image",
    "created_at",
    "updated_at",
];

/// Plant record as held by a [`crate::storage::PlantStore`].
///
/// `id` is assigned by the store and must never leave the process; convert to
/// [`Plant`] before serializing a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPlant {
    pub id: u64,
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub season: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Client-facing shape of a plant. Has no internal identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plant {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub season: String,
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<StoredPlant> for Plant {
    fn from(stored: StoredPlant) -> Self {
        Self {
            uuid: stored.uuid,
            name: stored.name,
            description: stored.description,
            season: stored.season,
            image: stored.image,
            extra: stored.extra,
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        }
    }
}

/// Validated input for a store insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPlant {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub season: String,
    pub image: Option<String>,
    pub extra: Map<String, Value>,
}

/// Partial update. `None` leaves the stored value as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlantChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub season: Option<String>,
    pub image: Option<String>,
    pub extra: Map<String, Value>,
}

impl PlantChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.season.is_none()
            && self.image.is_none()
            && self.extra.is_empty()
    }

    /// Apply onto a stored record. Does not touch `id`, `uuid` or timestamps.
    pub fn apply_to(self, plant: &mut StoredPlant) {
        if let Some(name) = self.name {
            plant.name = name;
        }
        if let Some(description) = self.description {
            plant.description = description;
        }
        if let Some(season) = self.season {
            plant.season = season;
        }
        if let Some(image) = self.image {
            plant.image = Some(image);
        }
        plant.extra.extend(self.extra);
    }
}
