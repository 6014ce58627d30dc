//! Error types for the entity store

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures reported by [`ScheduleStore`](super::ScheduleStore) backends
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record with this identity
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Room already booked for an overlapping window on that day
    #[error("Room {room_id} is already booked on {day} overlapping {start}-{end}")]
    RoomConflict {
        room_id: i64,
        day: String,
        start: String,
        end: String,
    },

    /// Unique constraint violated (professor e-mail)
    #[error("Duplicate {field}: {value}")]
    Duplicate { field: &'static str, value: String },

    /// Missing referenced record, or record still referenced
    #[error("Foreign key violation: {0}")]
    ForeignKey(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// PostgreSQL error
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    /// Connection pool error
    #[error("Connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// Anything else the backend could not do
    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Create a not-found error
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Whether the failure is transient
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::RoomConflict { .. })
    }

    /// Whether the failure stems from the caller's data rather than the backend
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::RoomConflict { .. }
                | Self::Duplicate { .. }
                | Self::ForeignKey(_)
        )
    }
}
