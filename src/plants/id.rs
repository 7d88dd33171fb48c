use uuid::Uuid;

/// Source of external identifiers for new plants.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Uuid;
}

/// Random v4 UUIDs; collisions are negligible over the lifetime of a store.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}
