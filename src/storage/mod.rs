pub mod asset_store;
pub mod plant_store;
pub mod s3;
pub mod sigv4;

pub use asset_store::{storage_key, AssetStore, ImageUpload, LocalAssetStore, StoredAsset, UploadError};
pub use plant_store::{FilePlantStore, MemoryPlantStore, PlantStore};
pub use s3::{S3AssetStore, S3Settings};
