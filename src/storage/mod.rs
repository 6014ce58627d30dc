//! Entity store for professors, rooms, classes and allocations
//!
//! Business logic talks to the [`ScheduleStore`] trait only, so the backend
//! can be swapped without touching the allocation core.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │          Allocation Engine / HTTP handlers                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ScheduleStore trait                      │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │     SQLite      │ │   PostgreSQL    │ │    In-memory    │
//! │  Implementation │ │ Implementation  │ │ Implementation  │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//! ```
//!
//! # Room conflicts
//!
//! [`ScheduleStore::insert_allocation`] and [`ScheduleStore::update_allocation`]
//! check the room non-overlap rule and write in one atomic step, so two
//! concurrent writers cannot both book the same room.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod sqlite;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::models::{
    Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, ResourceKind,
    Room, TimeWindow,
};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryScheduleStore;
pub use postgres::PostgresScheduleStore;
pub use sqlite::SqliteScheduleStore;

/// Persistence contract for the timetable entities
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    // ---- professors ----

    async fn list_professors(&self) -> StoreResult<Vec<Professor>>;
    async fn get_professor(&self, id: i64) -> StoreResult<Professor>;
    async fn create_professor(&self, new: &NewProfessor) -> StoreResult<Professor>;
    async fn update_professor(&self, id: i64, new: &NewProfessor) -> StoreResult<Professor>;
    async fn delete_professor(&self, id: i64) -> StoreResult<bool>;

    // ---- rooms ----

    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;
    async fn get_room(&self, id: i64) -> StoreResult<Room>;
    async fn create_room(&self, new: &NewRoom) -> StoreResult<Room>;
    async fn update_room(&self, id: i64, new: &NewRoom) -> StoreResult<Room>;
    async fn delete_room(&self, id: i64) -> StoreResult<bool>;

    // ---- classes ----

    async fn list_classes(&self) -> StoreResult<Vec<Class>>;
    async fn get_class(&self, id: i64) -> StoreResult<Class>;
    async fn create_class(&self, new: &NewClass) -> StoreResult<Class>;
    async fn update_class(&self, id: i64, new: &NewClass) -> StoreResult<Class>;
    async fn delete_class(&self, id: i64) -> StoreResult<bool>;

    // ---- allocations ----

    /// All allocations with their resources embedded
    async fn list_allocations(&self) -> StoreResult<Vec<Allocation>>;

    /// One hydrated allocation
    async fn get_allocation(&self, id: i64) -> StoreResult<Allocation>;

    /// Hydrated allocations that reference the given resource
    async fn allocations_for(&self, kind: ResourceKind, id: i64) -> StoreResult<Vec<Allocation>>;

    /// Insert after checking that the room is free on that day and window
    ///
    /// Fails with [`StoreError::RoomConflict`] when another allocation of the
    /// same room overlaps. Check and insert are atomic.
    async fn insert_allocation(&self, new: &NewAllocation) -> StoreResult<Allocation>;

    /// Replace an allocation, checking the room against every other allocation
    async fn update_allocation(&self, id: i64, new: &NewAllocation) -> StoreResult<Allocation>;

    async fn delete_allocation(&self, id: i64) -> StoreResult<bool>;

    /// Distinct ids of `kind` already booked on `day` overlapping `window`
    async fn allocated_ids(
        &self,
        kind: ResourceKind,
        day: &str,
        window: &TimeWindow,
    ) -> StoreResult<BTreeSet<i64>>;

    async fn allocations_by_room(&self, room_id: i64) -> StoreResult<Vec<Allocation>> {
        self.allocations_for(ResourceKind::Room, room_id).await
    }

    async fn allocations_by_professor(&self, professor_id: i64) -> StoreResult<Vec<Allocation>> {
        self.allocations_for(ResourceKind::Professor, professor_id)
            .await
    }

    async fn allocations_by_class(&self, class_id: i64) -> StoreResult<Vec<Allocation>> {
        self.allocations_for(ResourceKind::Class, class_id).await
    }
}

/// Thread-safe shared store
pub type SharedScheduleStore = Arc<dyn ScheduleStore>;

/// Open the backend selected in the configuration, creating the schema if absent
pub async fn open_store(config: &DatabaseConfig) -> StoreResult<SharedScheduleStore> {
    let store: SharedScheduleStore = match config.backend {
        StoreBackend::Memory => Arc::new(MemoryScheduleStore::new()),
        StoreBackend::Sqlite => Arc::new(SqliteScheduleStore::new(&config.sqlite_path)?),
        StoreBackend::Postgres => {
            let url = config.postgres_url.as_deref().ok_or_else(|| {
                StoreError::Backend("postgres backend selected without a database URL".to_string())
            })?;
            let store = PostgresScheduleStore::connect(url, config.pool_size)?;
            store.create_schema().await?;
            Arc::new(store)
        }
    };

    tracing::info!(backend = store.backend_name(), "Schedule store ready");
    Ok(store)
}

/// Create a shared in-memory store
pub fn create_memory_store() -> SharedScheduleStore {
    Arc::new(MemoryScheduleStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = DatabaseConfig {
            backend: StoreBackend::Memory,
            ..Default::default()
        };
        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "memory");
        assert!(store.list_professors().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_sqlite_store_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("timetable.db");
        let config = DatabaseConfig {
            backend: StoreBackend::Sqlite,
            sqlite_path: path.clone(),
            ..Default::default()
        };

        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend_name(), "sqlite");
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_open_postgres_without_url_fails() {
        let config = DatabaseConfig {
            backend: StoreBackend::Postgres,
            postgres_url: None,
            ..Default::default()
        };
        assert!(matches!(
            open_store(&config).await,
            Err(StoreError::Backend(_))
        ));
    }
}
