use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::plants::{NewPlant, PlantChanges, StoredPlant};

/// Durable home of plant records.
///
/// Counts returned by `update_by_uuid` / `delete_by_uuid` are the number of
/// records affected; zero means no record carried that external id.
#[async_trait]
pub trait PlantStore: Send + Sync {
    /// Returns the internal id assigned to the new record.
    async fn insert(&self, plant: NewPlant) -> Result<u64>;
    async fn list(&self) -> Result<Vec<StoredPlant>>;
    /// Lookup by the internal id `insert` returned. Request handling addresses
    /// records by uuid only; this is for in-process callers holding that id.
    async fn find_by_id(&self, id: u64) -> Result<Option<StoredPlant>>;
    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<StoredPlant>>;
    async fn update_by_uuid(&self, uuid: Uuid, changes: PlantChanges) -> Result<u64>;
    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<u64>;
}

/// Rows keyed by internal id, so iteration follows insertion order.
#[derive(Debug, Clone, Default)]
struct Table {
    next_id: u64,
    rows: BTreeMap<u64, StoredPlant>,
    by_uuid: HashMap<Uuid, u64>,
}

impl Table {
    fn from_rows(rows: Vec<StoredPlant>, next_id: u64) -> Self {
        let by_uuid = rows.iter().map(|p| (p.uuid, p.id)).collect();
        let max_id = rows.iter().map(|p| p.id).max().unwrap_or(0);
        Self {
            next_id: next_id.max(max_id),
            rows: rows.into_iter().map(|p| (p.id, p)).collect(),
            by_uuid,
        }
    }

    fn insert(&mut self, plant: NewPlant) -> Result<u64> {
        if self.by_uuid.contains_key(&plant.uuid) {
            bail!("duplicate external id {}", plant.uuid);
        }
        self.next_id += 1;
        let id = self.next_id;
        let now = Utc::now();
        self.rows.insert(
            id,
            StoredPlant {
                id,
                uuid: plant.uuid,
                name: plant.name,
                description: plant.description,
                season: plant.season,
                image: plant.image,
                extra: plant.extra,
                created_at: now,
                updated_at: now,
            },
        );
        self.by_uuid.insert(plant.uuid, id);
        Ok(id)
    }

    fn get_by_uuid(&self, uuid: &Uuid) -> Option<&StoredPlant> {
        self.by_uuid.get(uuid).and_then(|id| self.rows.get(id))
    }

    fn update(&mut self, uuid: &Uuid, changes: PlantChanges) -> u64 {
        let Some(plant) = self.by_uuid.get(uuid).and_then(|id| self.rows.get_mut(id)) else {
            return 0;
        };
        changes.apply_to(plant);
        plant.updated_at = Utc::now();
        1
    }

    fn delete(&mut self, uuid: &Uuid) -> u64 {
        match self.by_uuid.remove(uuid) {
            Some(id) => self.rows.remove(&id).map_or(0, |_| 1),
            None => 0,
        }
    }
}

/// Process-local store. Contents are lost on restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryPlantStore {
    table: Arc<RwLock<Table>>,
}

impl MemoryPlantStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlantStore for MemoryPlantStore {
    async fn insert(&self, plant: NewPlant) -> Result<u64> {
        self.table.write().await.insert(plant)
    }

    async fn list(&self) -> Result<Vec<StoredPlant>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<StoredPlant>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<StoredPlant>> {
        Ok(self.table.read().await.get_by_uuid(&uuid).cloned())
    }

    async fn update_by_uuid(&self, uuid: Uuid, changes: PlantChanges) -> Result<u64> {
        Ok(self.table.write().await.update(&uuid, changes))
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<u64> {
        Ok(self.table.write().await.delete(&uuid))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    next_id: u64,
    plants: Vec<StoredPlant>,
}

/// Keeps the table in memory and rewrites a JSON snapshot after every
/// mutation. A mutation only becomes visible once its snapshot is on disk.
#[derive(Debug, Clone)]
pub struct FilePlantStore {
    path: PathBuf,
    table: Arc<RwLock<Table>>,
}

impl FilePlantStore {
    /// Load `path` if it exists, otherwise start empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let table = match tokio::fs::read(&path).await {
            Ok(raw) => {
                let snapshot: Snapshot = serde_json::from_slice(&raw)
                    .with_context(|| format!("parsing plant snapshot {}", path.display()))?;
                info!(path = %path.display(), plants = snapshot.plants.len(), "loaded plant snapshot");
                Table::from_rows(snapshot.plants, snapshot.next_id)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no plant snapshot yet, starting empty");
                Table::default()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("reading plant snapshot {}", path.display()))
            }
        };

        Ok(Self {
            path,
            table: Arc::new(RwLock::new(table)),
        })
    }

    async fn persist(&self, table: &Table) -> Result<()> {
        let snapshot = Snapshot {
            next_id: table.next_id,
            plants: table.rows.values().cloned().collect(),
        };
        let raw = serde_json::to_vec_pretty(&snapshot).context("serializing plant snapshot")?;
        write_atomically(&self.path, &raw).await
    }

    /// Apply `mutate` to a copy of the table, persist it, then publish it.
    async fn mutate<T>(&self, mutate: impl FnOnce(&mut Table) -> Result<T> + Send) -> Result<T> {
        let mut guard = self.table.write().await;
        let mut next = guard.clone();
        let out = mutate(&mut next)?;
        self.persist(&next).await?;
        *guard = next;
        Ok(out)
    }
}

async fn write_atomically(path: &Path, raw: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, raw)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl PlantStore for FilePlantStore {
    async fn insert(&self, plant: NewPlant) -> Result<u64> {
        self.mutate(|table| table.insert(plant)).await
    }

    async fn list(&self) -> Result<Vec<StoredPlant>> {
        Ok(self.table.read().await.rows.values().cloned().collect())
    }

    async fn find_by_id(&self, id: u64) -> Result<Option<StoredPlant>> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<StoredPlant>> {
        Ok(self.table.read().await.get_by_uuid(&uuid).cloned())
    }

    async fn update_by_uuid(&self, uuid: Uuid, changes: PlantChanges) -> Result<u64> {
        if self.table.read().await.get_by_uuid(&uuid).is_none() {
            return Ok(0);
        }
        self.mutate(|table| Ok(table.update(&uuid, changes))).await
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<u64> {
        if self.table.read().await.get_by_uuid(&uuid).is_none() {
            return Ok(0);
        }
        self.mutate(|table| Ok(table.delete(&uuid))).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn new_plant(name: &str) -> NewPlant {
        let mut extra = Map::new();
        extra.insert("colour".to_string(), json!("green"));
        NewPlant {
            uuid: Uuid::new_v4(),
            name: name.to_string(),
            description: "A plant".to_string(),
            season: "Summer".to_string(),
            image: None,
            extra,
        }
    }

    #[tokio::test]
    async fn test_memory_store_crud() {
        let store = MemoryPlantStore::new();
        let plant = new_plant("Fern");
        let uuid = plant.uuid;

        let id = store.insert(plant).await.unwrap();
        let found = store.find_by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.name, "Fern");
        assert_eq!(store.find_by_id(id).await.unwrap().unwrap().uuid, uuid);

        let changes = PlantChanges {
            season: Some("Autumn".to_string()),
            ..Default::default()
        };
        assert_eq!(store.update_by_uuid(uuid, changes).await.unwrap(), 1);
        let updated = store.find_by_uuid(uuid).await.unwrap().unwrap();
        assert_eq!(updated.season, "Autumn");
        assert_eq!(updated.name, "Fern");
        assert!(updated.updated_at >= updated.created_at);

        assert_eq!(store.delete_by_uuid(uuid).await.unwrap(), 1);
        assert_eq!(store.delete_by_uuid(uuid).await.unwrap(), 0);
        assert!(store.find_by_uuid(uuid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_uuid() {
        let store = MemoryPlantStore::new();
        let plant = new_plant("Fern");
        store.insert(plant.clone()).await.unwrap();
        assert!(store.insert(plant).await.is_err());
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_does_not_create() {
        let store = MemoryPlantStore::new();
        let changes = PlantChanges {
            name: Some("Ghost".to_string()),
            ..Default::default()
        };
        assert_eq!(store.update_by_uuid(Uuid::new_v4(), changes).await.unwrap(), 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_keeps_insertion_order() {
        let store = MemoryPlantStore::new();
        for name in ["Aloe", "Basil", "Cactus"] {
            store.insert(new_plant(name)).await.unwrap();
        }
        let names: Vec<String> = store.list().await.unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Aloe", "Basil", "Cactus"]);
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("plants.json");

        let store = FilePlantStore::open(&path).await.unwrap();
        let keep = new_plant("Ivy");
        let gone = new_plant("Moss");
        let (keep_uuid, gone_uuid) = (keep.uuid, gone.uuid);
        store.insert(keep).await.unwrap();
        store.insert(gone).await.unwrap();
        store.delete_by_uuid(gone_uuid).await.unwrap();

        let reopened = FilePlantStore::open(&path).await.unwrap();
        let plants = reopened.list().await.unwrap();
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].uuid, keep_uuid);
        assert_eq!(plants[0].extra["colour"], "green");

        // ids keep counting after a reload
        let id = reopened.insert(new_plant("Sage")).await.unwrap();
        assert_eq!(id, 3);
    }

    #[tokio::test]
    async fn test_file_store_rejects_corrupt_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plants.json");
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(FilePlantStore::open(&path).await.is_err());
    }
}
