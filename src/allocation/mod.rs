//! Allocation core
//!
//! ```text
//! (day, start, end)
//!        │
//!        ▼
//! ┌──────────────────────┐    professors / rooms / classes
//! │ Availability resolver│ ─────────────────────────────────┐
//! └──────────────────────┘                                  ▼
//!                                              ┌────────────────────────┐
//!                                              │ shuffle + positional   │
//!                                              │ zip (pairing)          │
//!                                              └────────────────────────┘
//!                                                           │ candidates
//!                                                           ▼
//!                                              ┌────────────────────────┐
//!                                              │ conflict-checked write │
//!                                              │ (skip on failure)      │
//!                                              └────────────────────────┘
//! ```

pub mod availability;
pub mod engine;
pub mod error;
pub mod overlap;
pub mod pairing;

pub use availability::Availability;
pub use engine::{AllocationEngine, BatchOutcome};
pub use error::{AllocationError, AllocationResult};
pub use overlap::intervals_overlap;
pub use pairing::{pair_candidates, Candidate};
