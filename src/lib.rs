//! class-organize - academic timetable allocation service
//!
//! Assigns professors, rooms and classes to weekday time windows without
//! double-booking a room.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`] - Professors, rooms, classes, allocations and time windows
//! - [`allocation`] - Availability resolution and the allocation engine
//! - [`storage`] - Entity store (SQLite, PostgreSQL, in-memory)
//! - [`notifications`] - Allocation notices by webhook and e-mail
//! - [`server`] - REST API
//! - [`config`] - Configuration management and settings
//! - [`metrics`] - Prometheus metrics
//!
//! # Example
//!
//! ```no_run
//! use class_organize::allocation::AllocationEngine;
//! use class_organize::models::SlotRequest;
//! use class_organize::storage::create_memory_store;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = AllocationEngine::new(create_memory_store());
//!     let slot = SlotRequest::new("Monday", "08:00", "09:40");
//!     let free = engine.availability(&slot).await?;
//!     println!("{} rooms free", free.rooms.len());
//!     Ok(())
//! }
//! ```

pub mod allocation;
pub mod config;
pub mod error;
pub mod metrics;
pub mod models;
pub mod notifications;
pub mod server;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::allocation::{AllocationEngine, AllocationError, Availability, BatchOutcome};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::models::{
        Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, Room,
        SlotRequest, TimeWindow,
    };
    pub use crate::notifications::Notifier;
    pub use crate::storage::{ScheduleStore, SharedScheduleStore, StoreError};
}

pub use models::{Allocation, Class, Professor, Room, SlotRequest};
