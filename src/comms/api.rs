use anyhow::{Context, Result};
use axum::extract::{DefaultBodyLimit, FromRequestParts, Path, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Json, Router};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tracing::info;

use crate::comms::request_log;
use crate::config::{AssetBackend, Config};
use crate::plants::{ApiError, Plant, PlantService, PlantSubmission, RandomIdGenerator};
use crate::security::{AuditLogger, AuthFailure, TokenValidator, ValidatedClaims};
use crate::storage::{
    AssetStore, FilePlantStore, LocalAssetStore, MemoryPlantStore, PlantStore, S3AssetStore,
};

pub type SharedState = Arc<AppState>;

#[derive(Debug, Clone)]
pub struct AppState {
    pub plants: PlantService,
    pub validator: TokenValidator,
    pub audit: AuditLogger,
    pub max_upload_bytes: usize,
    /// Served at `/uploads` when images are kept on local disk.
    pub uploads_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(validator: TokenValidator, plants: PlantService) -> Self {
        Self {
            plants,
            validator,
            audit: AuditLogger::new(),
            max_upload_bytes: crate::config::DEFAULT_MAX_UPLOAD_BYTES,
            uploads_dir: None,
        }
    }

    pub fn with_uploads_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.uploads_dir = Some(dir.into());
        self
    }

    pub fn with_max_upload_bytes(mut self, limit: usize) -> Self {
        self.max_upload_bytes = limit;
        self
    }

    /// Wire stores and validator from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn PlantStore> = match &config.data_file {
            Some(path) => Arc::new(FilePlantStore::open(path).await?),
            None => Arc::new(MemoryPlantStore::new()),
        };

        let (assets, uploads_dir): (Arc<dyn AssetStore>, Option<PathBuf>) = match &config.assets {
            AssetBackend::S3(settings) => (Arc::new(S3AssetStore::new(settings.clone())?), None),
            AssetBackend::Local {
                dir,
                public_base_url,
            } => {
                tokio::fs::create_dir_all(dir)
                    .await
                    .with_context(|| format!("creating upload dir {}", dir.display()))?;
                (
                    Arc::new(LocalAssetStore::new(dir.clone(), public_base_url.clone())),
                    Some(dir.clone()),
                )
            }
        };

        let plants = PlantService::new(store, assets, Arc::new(RandomIdGenerator));
        let mut state = Self::new(TokenValidator::new(config.jwt_secret.as_bytes()), plants)
            .with_max_upload_bytes(config.max_upload_bytes);
        state.uploads_dir = uploads_dir;
        Ok(state)
    }
}

/// Claims of a caller that presented a valid token. Rejects with 401/403
/// before any body is read.
#[derive(Debug, Clone)]
pub struct Authenticated(pub ValidatedClaims);

impl FromRequestParts<SharedState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &SharedState) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path();
        let result = match parts.headers.get(AUTHORIZATION).map(|v| v.to_str()) {
            None => state.validator.validate(None),
            Some(Ok(raw)) => state.validator.validate(Some(raw)),
            Some(Err(_)) => Err(AuthFailure::InvalidToken),
        };

        match result {
            Ok(claims) => {
                state.audit.auth_success(claims.subject(), path);
                Ok(Authenticated(claims))
            }
            Err(failure) => {
                state.audit.auth_failure(path, &failure.to_string());
                Err(failure.into())
            }
        }
    }
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    fn new(message: &str) -> Json<Self> {
        Json(Self {
            message: message.to_string(),
        })
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn verify(_auth: Authenticated) -> Json<MessageResponse> {
    MessageResponse::new("Token verified")
}

async fn create_plant(
    State(state): State<SharedState>,
    Authenticated(claims): Authenticated,
    submission: PlantSubmission,
) -> Result<Json<Plant>, ApiError> {
    state.plants.create(&claims, submission).await.map(Json)
}

async fn list_plants(State(state): State<SharedState>) -> Result<Json<Vec<Plant>>, ApiError> {
    state.plants.list().await.map(Json)
}

async fn get_plant(
    State(state): State<SharedState>,
    _auth: Authenticated,
    Path(id): Path<String>,
) -> Result<Json<Plant>, ApiError> {
    state.plants.get(&id).await.map(Json)
}

async fn update_plant(
    State(state): State<SharedState>,
    Authenticated(claims): Authenticated,
    Path(id): Path<String>,
    submission: PlantSubmission,
) -> Result<Json<Plant>, ApiError> {
    state.plants.update(&claims, &id, submission).await.map(Json)
}

async fn delete_plant(
    State(state): State<SharedState>,
    Authenticated(claims): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.plants.delete(&claims, &id).await?;
    Ok(MessageResponse::new("Plant deleted successfully"))
}

pub fn create_router(state: SharedState) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/verify", get(verify))
        .route("/plants", get(list_plants).post(create_plant))
        .route(
            "/plants/{id}",
            get(get_plant).put(update_plant).delete(delete_plant),
        )
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    if let Some(dir) = &state.uploads_dir {
        router = router.nest_service("/uploads", ServeDir::new(dir));
    }

    router
        .layer(middleware::from_fn(request_log::log_exchange))
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<()> {
    let state = Arc::new(AppState::from_config(&config).await?);
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!("Plants service listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;
    info!("Plants service stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
