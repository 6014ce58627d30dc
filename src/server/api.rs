//! REST API handlers
//!
//! Entities are returned as bare JSON; failures use [`ErrorResponse`].
//!
//! [`ErrorResponse`]: super::error::ErrorResponse

use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        MatchedPath, Path, Query, Request, State,
    },
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::allocation::Availability;
use crate::metrics;
use crate::models::{
    Allocation, Class, NewAllocation, NewClass, NewProfessor, NewRoom, Professor, Room,
    SlotRequest,
};

use super::app::AppState;
use super::error::{parse_id, ApiError, ApiResult};

// ============================================================================
// API Response Types
// ============================================================================

/// Generic API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub backend: String,
}

type JsonBody<T> = Result<Json<T>, JsonRejection>;

// ============================================================================
// API Routes
// ============================================================================

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/metrics", get(prometheus_metrics))
        // Professors
        .route("/api/professors", get(list_professors).post(create_professor))
        .route(
            "/api/professors/{id}",
            get(get_professor).put(update_professor).delete(delete_professor),
        )
        // Rooms
        .route("/api/rooms", get(list_rooms).post(create_room))
        .route(
            "/api/rooms/{id}",
            get(get_room).put(update_room).delete(delete_room),
        )
        // Classes
        .route("/api/classes", get(list_classes).post(create_class))
        .route(
            "/api/classes/{id}",
            get(get_class).put(update_class).delete(delete_class),
        )
        // Allocations
        .route("/api/allocations", get(list_allocations).post(create_allocation))
        .route("/api/allocations/auto", post(auto_allocate))
        .route("/api/allocations/room/{id}", get(allocations_by_room))
        .route("/api/allocations/professor/{id}", get(allocations_by_professor))
        .route("/api/allocations/class/{id}", get(allocations_by_class))
        .route(
            "/api/allocations/{id}",
            get(get_allocation)
                .put(update_allocation)
                .delete(delete_allocation),
        )
        // Availability
        .route("/api/availability", get(availability))
        .route_layer(middleware::from_fn(track_requests))
        .with_state(state)
}

/// Count and time every routed request by its route template
async fn track_requests(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| format!("{} {}", request.method(), p.as_str()))
        .unwrap_or_else(|| request.method().to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    metrics::record_api_request(
        &endpoint,
        response.status().as_u16(),
        started.elapsed().as_secs_f64(),
    );
    response
}

/// Deletes are idempotent: a missing row still answers 204
fn no_content(deleted: bool, entity: &'static str, id: i64) -> StatusCode {
    if !deleted {
        tracing::debug!(entity, id, "Delete matched no row");
    }
    StatusCode::NO_CONTENT
}

// ============================================================================
// Health Handlers
// ============================================================================

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        backend: state.store.backend_name().to_string(),
    }))
}

async fn prometheus_metrics() -> Response {
    match metrics::encode_metrics() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

// ============================================================================
// Professor Handlers
// ============================================================================

async fn list_professors(State(state): State<AppState>) -> ApiResult<Json<Vec<Professor>>> {
    Ok(Json(state.store.list_professors().await?))
}

async fn get_professor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Professor>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get_professor(id).await?))
}

async fn create_professor(
    State(state): State<AppState>,
    body: JsonBody<NewProfessor>,
) -> ApiResult<(StatusCode, Json<Professor>)> {
    let Json(new) = body?;
    new.validate().map_err(ApiError::Validation)?;

    let professor = state.store.create_professor(&new).await?;
    tracing::info!(professor_id = professor.id, "Professor created");
    Ok((StatusCode::CREATED, Json(professor)))
}

async fn update_professor(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: JsonBody<NewProfessor>,
) -> ApiResult<Json<Professor>> {
    let id = parse_id(&id)?;
    let Json(new) = body?;
    new.validate().map_err(ApiError::Validation)?;

    Ok(Json(state.store.update_professor(id, &new).await?))
}

async fn delete_professor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let deleted = state.store.delete_professor(id).await?;
    Ok(no_content(deleted, "professor", id))
}

// ============================================================================
// Room Handlers
// ============================================================================

async fn list_rooms(State(state): State<AppState>) -> ApiResult<Json<Vec<Room>>> {
    Ok(Json(state.store.list_rooms().await?))
}

async fn get_room(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Room>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get_room(id).await?))
}

async fn create_room(
    State(state): State<AppState>,
    body: JsonBody<NewRoom>,
) -> ApiResult<(StatusCode, Json<Room>)> {
    let Json(new) = body?;
    new.validate().map_err(ApiError::Validation)?;

    let room = state.store.create_room(&new).await?;
    tracing::info!(room_id = room.id, number = %room.number, "Room created");
    Ok((StatusCode::CREATED, Json(room)))
}

async fn update_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: JsonBody<NewRoom>,
) -> ApiResult<Json<Room>> {
    let id = parse_id(&id)?;
    let Json(new) = body?;
    new.validate().map_err(ApiError::Validation)?;

    Ok(Json(state.store.update_room(id, &new).await?))
}

async fn delete_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let deleted = state.store.delete_room(id).await?;
    Ok(no_content(deleted, "room", id))
}

// ============================================================================
// Class Handlers
// ============================================================================

async fn list_classes(State(state): State<AppState>) -> ApiResult<Json<Vec<Class>>> {
    Ok(Json(state.store.list_classes().await?))
}

async fn get_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Class>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get_class(id).await?))
}

async fn create_class(
    State(state): State<AppState>,
    body: JsonBody<NewClass>,
) -> ApiResult<(StatusCode, Json<Class>)> {
    let Json(new) = body?;
    new.validate().map_err(ApiError::Validation)?;

    let class = state.store.create_class(&new).await?;
    tracing::info!(class_id = class.id, "Class created");
    Ok((StatusCode::CREATED, Json(class)))
}

async fn update_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: JsonBody<NewClass>,
) -> ApiResult<Json<Class>> {
    let id = parse_id(&id)?;
    let Json(new) = body?;
    new.validate().map_err(ApiError::Validation)?;

    Ok(Json(state.store.update_class(id, &new).await?))
}

async fn delete_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let deleted = state.store.delete_class(id).await?;
    Ok(no_content(deleted, "class", id))
}

// ============================================================================
// Allocation Handlers
// ============================================================================

async fn list_allocations(State(state): State<AppState>) -> ApiResult<Json<Vec<Allocation>>> {
    Ok(Json(state.store.list_allocations().await?))
}

async fn get_allocation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Allocation>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.get_allocation(id).await?))
}

/// Create one allocation and announce it
///
/// The notice is sent in the background; the response does not wait for it.
async fn create_allocation(
    State(state): State<AppState>,
    body: JsonBody<NewAllocation>,
) -> ApiResult<(StatusCode, Json<Allocation>)> {
    let Json(new) = body?;
    let allocation = state.engine.create_allocation(new).await?;

    state.notifier.dispatch(&allocation);
    Ok((StatusCode::CREATED, Json(allocation)))
}

async fn update_allocation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: JsonBody<NewAllocation>,
) -> ApiResult<Json<Allocation>> {
    let id = parse_id(&id)?;
    let Json(new) = body?;
    Ok(Json(state.engine.update_allocation(id, new).await?))
}

async fn delete_allocation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id)?;
    let deleted = state.store.delete_allocation(id).await?;
    Ok(no_content(deleted, "allocation", id))
}

/// Fill a slot with as many free (professor, room, class) triples as possible
async fn auto_allocate(
    State(state): State<AppState>,
    body: JsonBody<SlotRequest>,
) -> ApiResult<(StatusCode, Json<Vec<Allocation>>)> {
    let Json(slot) = body?;
    let outcome = state.engine.auto_allocate_fresh(&slot).await?;
    Ok((StatusCode::CREATED, Json(outcome.created)))
}

async fn allocations_by_room(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Allocation>>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.allocations_by_room(id).await?))
}

async fn allocations_by_professor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Allocation>>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.allocations_by_professor(id).await?))
}

async fn allocations_by_class(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Allocation>>> {
    let id = parse_id(&id)?;
    Ok(Json(state.store.allocations_by_class(id).await?))
}

// ============================================================================
// Availability Handlers
// ============================================================================

/// `GET /api/availability?day_of_week=..&start_time=..&end_time=..`
async fn availability(
    State(state): State<AppState>,
    query: Result<Query<SlotRequest>, QueryRejection>,
) -> ApiResult<Json<Availability>> {
    let Query(slot) = query?;
    Ok(Json(state.engine.availability(&slot).await?))
}

// ============================================================================
// Tests
// ============================================================================
