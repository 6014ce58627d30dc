//! HTTP surface of the timetable service
//!
//! CRUD for professors, rooms, classes and allocations, plus availability
//! queries and batch auto-allocation.

pub mod api;
pub mod app;
pub mod error;

pub use api::{create_router, ApiResponse, HealthResponse};
pub use app::{AppServer, AppState, ServerError, ServerInfo};
pub use error::{ApiError, ApiResult, ErrorResponse};
