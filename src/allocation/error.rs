//! Error types for the allocation core

use thiserror::Error;

use crate::storage::StoreError;

/// Result type for allocation operations
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Failures surfaced by the availability resolver and allocation engine
#[derive(Error, Debug)]
pub enum AllocationError {
    /// Missing or malformed input; storage was not touched
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Referenced record does not exist
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// Room already booked for an overlapping window on that day
    #[error("Room {room_id} is already booked on {day} overlapping {start}-{end}")]
    Conflict {
        room_id: i64,
        day: String,
        start: String,
        end: String,
    },

    /// At least one availability set was empty
    #[error(
        "Not enough free resources to allocate (professors: {professors}, rooms: {rooms}, classes: {classes})"
    )]
    InsufficientResources {
        professors: usize,
        rooms: usize,
        classes: usize,
    },

    /// Every candidate pairing of a batch failed
    #[error("Unable to create any allocation ({attempted} candidate pairings failed)")]
    NoAllocationCreated { attempted: usize },

    /// Any other data-access failure
    #[error("Storage error: {0}")]
    Storage(#[source] StoreError),
}

impl AllocationError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether retrying the same request later may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Conflict { .. } | Self::InsufficientResources { .. } | Self::NoAllocationCreated { .. } => true,
            Self::Storage(e) => e.is_recoverable(),
            Self::Validation(_) | Self::NotFound { .. } => false,
        }
    }
}

impl From<StoreError> for AllocationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound { entity, id },
            StoreError::RoomConflict {
                room_id,
                day,
                start,
                end,
            } => Self::Conflict {
                room_id,
                day,
                start,
                end,
            },
            other => Self::Storage(other),
        }
    }
}
