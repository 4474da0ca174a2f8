//! Web layer module
//!
//! Thin handlers over the service layer:
//! - **Handlers**: upload, convert, download, formats, health
//! - **Responses**: the standard error body and status mapping
//! - **Middleware**: request logging and security headers

use anyhow::Result;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use staging_file_manager::{CleanupScheduler, StagingArea};

use crate::config::Config;
use crate::conversion::{
    ConversionBackend, ConversionRegistry, ConversionService, SCRATCH_PREFIXES, ToolBackend,
};
use crate::errors::{AppError, AppResult};
use crate::services::{TokenCodec, UploadService};

pub mod handlers;
pub mod middleware;
pub mod responses;

pub use responses::{ApiResponse, handle_error};

/// Shared, immutable application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ConversionRegistry>,
    pub codec: TokenCodec,
    pub uploads: UploadService,
    pub conversion: ConversionService,
    pub upload_area: StagingArea,
    pub output_area: StagingArea,
    pub cleanup: CleanupScheduler,
    pub cleanup_delay: Duration,
    pub max_request_size: usize,
}

impl AppState {
    /// Wire up the production backend.
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let backend = Arc::new(ToolBackend::new(
            config.tools.clone(),
            config.storage.converted_path.clone(),
        ));
        Self::with_backend(config, backend).await
    }

    /// Wire up services around an arbitrary conversion backend.
    ///
    /// Must be called inside a tokio runtime; this starts the cleanup runner.
    pub async fn with_backend(
        config: &Config,
        backend: Arc<dyn ConversionBackend>,
    ) -> AppResult<Self> {
        let upload_area = StagingArea::builder()
            .base_directory(&config.storage.upload_path)
            .build()
            .await?;
        let output_area = StagingArea::builder()
            .base_directory(&config.storage.converted_path)
            .build()
            .await?;

        let registry = Arc::new(ConversionRegistry::builtin());
        let codec = TokenCodec::from_config(&config.security)?;
        let cleanup = CleanupScheduler::start();
        let cleanup_delay = config.storage.cleanup_delay;
        let token_ttl = config.security.token_ttl;

        let uploads = UploadService::new(
            registry.clone(),
            codec.clone(),
            upload_area.clone(),
            cleanup.clone(),
            config.limits.clone(),
            cleanup_delay,
            token_ttl,
        );
        let conversion = ConversionService::new(
            registry.clone(),
            backend,
            codec.clone(),
            output_area.clone(),
            cleanup.clone(),
            cleanup_delay,
            token_ttl,
        );

        let max_request_size = usize::try_from(config.web.max_request_size).map_err(|_| {
            AppError::configuration("web.max_request_size does not fit this platform")
        })?;

        Ok(Self {
            registry,
            codec,
            uploads,
            conversion,
            upload_area,
            output_area,
            cleanup,
            cleanup_delay,
            max_request_size,
        })
    }

    /// Hand files and scratch directories left over from a previous run to
    /// the cleanup scheduler.
    pub async fn sweep_leftovers(&self) -> usize {
        let mut swept = 0;
        let areas: [(&StagingArea, &[&str]); 2] = [
            (&self.upload_area, &[]),
            (&self.output_area, &SCRATCH_PREFIXES),
        ];
        for (area, scratch_prefixes) in areas {
            match area.leftovers(scratch_prefixes).await {
                Ok(files) => {
                    swept += files.len();
                    self.cleanup.schedule(files, self.cleanup_delay);
                }
                Err(e) => warn!(
                    "Could not list leftovers in {}: {}",
                    area.base_dir().display(),
                    e
                ),
            }
        }
        swept
    }
}

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.max_request_size;

    Router::new()
        .route("/api/upload", post(handlers::upload))
        .route("/api/convert", post(handlers::convert))
        .route("/api/download/{token}", get(handlers::download))
        .route("/api/formats", get(handlers::formats))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum_middleware::from_fn(
            middleware::request_logging_middleware,
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Web server configuration and setup
pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(config: &Config, state: AppState) -> Result<Self> {
        let addr: SocketAddr = format!("{}:{}", config.web.host, config.web.port).parse()?;
        Ok(Self {
            app: create_router(state),
            addr,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on http://{}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT (Ctrl+C), shutting down gracefully"),
        () = terminate => info!("Received SIGTERM, shutting down gracefully"),
    }
}
