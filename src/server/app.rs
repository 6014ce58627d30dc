//! HTTP server bootstrap
//!
//! Owns the shared state and wires the router, CORS and request tracing.

use std::net::SocketAddr;
use std::time::Instant;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::allocation::AllocationEngine;
use crate::config::ServerConfig;
use crate::notifications::Notifier;
use crate::storage::SharedScheduleStore;

use super::api::create_router;

// ============================================================================
// App State
// ============================================================================

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Entity store
    pub store: SharedScheduleStore,

    /// Allocation core on top of `store`
    pub engine: AllocationEngine,

    /// Allocation notices
    pub notifier: Notifier,

    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: SharedScheduleStore, notifier: Notifier) -> Self {
        Self {
            engine: AllocationEngine::new(store.clone()),
            store,
            notifier,
            start_time: Instant::now(),
        }
    }
}

// ============================================================================
// App Server
// ============================================================================

/// Timetable HTTP server
pub struct AppServer {
    bind_address: SocketAddr,
    config: ServerConfig,
    state: AppState,
}

impl AppServer {
    pub fn new(config: ServerConfig, state: AppState) -> Result<Self, ServerError> {
        let bind_address = config
            .bind_address
            .parse::<SocketAddr>()
            .map_err(|e| ServerError::ConfigError(format!("{}: {e}", config.bind_address)))?;

        Ok(Self {
            bind_address,
            config,
            state,
        })
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let mut router = create_router(self.state.clone());

        if self.config.enable_cors {
            router = router.layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            );
        }

        if self.config.enable_request_logging {
            router = router.layer(TraceLayer::new_for_http());
        }

        router
    }

    /// Serve until `shutdown_signal` resolves, then drain in-flight requests
    pub async fn start_with_shutdown(
        &self,
        shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let router = self.build_router();

        let listener = tokio::net::TcpListener::bind(self.bind_address)
            .await
            .map_err(|e| ServerError::BindError(e.to_string()))?;

        tracing::info!(
            address = %self.bind_address,
            backend = self.state.store.backend_name(),
            notifier_channels = ?self.state.notifier.channel_names(),
            "Timetable server listening"
        );

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| ServerError::ServeError(e.to_string()))?;

        tracing::info!("Timetable server shutdown complete");
        Ok(())
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            bind_address: self.bind_address,
            backend: self.state.store.backend_name(),
            notification_channels: self.state.notifier.channel_names(),
            cors_enabled: self.config.enable_cors,
            request_logging_enabled: self.config.enable_request_logging,
        }
    }
}

/// Server information
#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub bind_address: SocketAddr,
    pub backend: &'static str,
    pub notification_channels: Vec<String>,
    pub cors_enabled: bool,
    pub request_logging_enabled: bool,
}

impl ServerInfo {
    /// Format as display string
    pub fn display(&self) -> String {
        let channels = if self.notification_channels.is_empty() {
            "none".to_string()
        } else {
            self.notification_channels.join(", ")
        };

        format!(
            "Class Organize Server\n\
             {:-<40}\n\
             Bind Address: {}\n\
             Store Backend: {}\n\
             Notifications: {}\n\
             CORS: {}\n\
             Request Logging: {}",
            "",
            self.bind_address,
            self.backend,
            channels,
            if self.cors_enabled { "enabled" } else { "disabled" },
            if self.request_logging_enabled { "enabled" } else { "disabled" }
        )
    }
}

// ============================================================================
// Server Errors
// ============================================================================

/// Server errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Failed to bind to address
    #[error("Bind error: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    ServeError(String),
}
