//! Handlers HTTP de la galerie
//!
//! Routes (relatives à `/api/gallery`) :
//!
//! - `GET /` et `GET /content/` : listing de la racine
//! - `GET /content/{*path}` : listing, fichier original ou dérivé
//! - `GET /stats` : statistiques du pipeline

use crate::error::ContentError;
use crate::library::{DirectoryListing, Gallery, content_type_for};
use crate::request::GalleryRequest;
use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use pixthumbs::{DerivativeEntry, PipelineError, Thumbnails};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};
use utoipa::ToSchema;

/// En-tête portant le jeton de version d'un listing
pub const VERSION_HEADER: &str = "x-gallery-version";

/// Les dérivés sont adressés par empreinte : leur contenu ne change jamais
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Délai conseillé (secondes) quand le pool est saturé
pub const RETRY_AFTER_SECS: &str = "2";

/// État partagé des handlers
#[derive(Clone)]
pub struct GalleryState {
    pub gallery: Arc<Gallery>,
    pub thumbnails: Thumbnails,
}

/// Réponse d'erreur générique
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Code d'erreur
    #[schema(example = "NOT_FOUND")]
    pub error: String,
    /// Message descriptif
    #[schema(example = "Media not found")]
    pub message: String,
}

/// Statistiques du pipeline exposées par `/api/gallery/stats`
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GalleryStats {
    pub workers: usize,
    pub queue_capacity: usize,
    pub queued: usize,
    pub running: usize,
    pub submitted: u64,
    pub rejected: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    /// Jobs de génération en cours (une entrée par empreinte)
    pub active_jobs: usize,
    pub cached_entries: u64,
    pub cached_bytes: u64,
    /// Tailles de miniatures autorisées, la première par défaut
    pub thumbnail_sizes: Vec<u32>,
}

/// Erreur d'un handler, traduite en statut HTTP
///
/// Le corps reste générique : les chemins et causes détaillées ne partent
/// que dans les logs.
#[derive(Debug)]
pub enum ApiError {
    Content(ContentError),
    Pipeline(PipelineError),
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        Self::Content(err)
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self::Pipeline(err)
    }
}

fn error_body(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
        .into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Content(ContentError::Traversal) => {
                error_body(StatusCode::FORBIDDEN, "FORBIDDEN", "Path outside the gallery")
            }
            ApiError::Content(ContentError::NotFound(_) | ContentError::Unsupported(_)) => {
                error_body(StatusCode::NOT_FOUND, "NOT_FOUND", "Media not found")
            }
            ApiError::Content(e) => {
                warn!("Gallery error: {}", e);
                error_body(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Cannot read the gallery",
                )
            }
            ApiError::Pipeline(e) => {
                let (status, code, message) = match &e {
                    PipelineError::PoolSaturated => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "POOL_SATURATED",
                        "Conversion queue is full, retry later",
                    ),
                    PipelineError::Timeout => (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "TIMEOUT",
                        "Conversion took too long, retry later",
                    ),
                    PipelineError::SourceUnavailable { .. } => {
                        (StatusCode::NOT_FOUND, "NOT_FOUND", "Media not found")
                    }
                    PipelineError::ConversionFailed { .. } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CONVERSION_FAILED",
                        "Cannot generate derivative",
                    ),
                    PipelineError::CacheWriteFailed { .. } => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "CACHE_WRITE_FAILED",
                        "Cannot store derivative",
                    ),
                };

                let mut response = error_body(status, code, message);
                if e.is_retryable() {
                    response.headers_mut().insert(
                        header::RETRY_AFTER,
                        header::HeaderValue::from_static(RETRY_AFTER_SECS),
                    );
                }
                response
            }
        }
    }
}

/// Stream un fichier avec son type MIME
async fn serve_file(
    path: &std::path::Path,
    content_type: &'static str,
    cache_control: Option<&'static str>,
) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(path)
        .await
        .map_err(|e| ContentError::from_io(e, "file"))?;
    let len = file.metadata().await.map_err(ContentError::Io)?.len();

    let mut response = (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response();

    if let Some(value) = cache_control {
        response.headers_mut().insert(
            header::CACHE_CONTROL,
            header::HeaderValue::from_static(value),
        );
    }
    Ok(response)
}

async fn serve_derivative(entry: DerivativeEntry) -> Result<Response, ApiError> {
    serve_file(&entry.path, entry.content_type, Some(IMMUTABLE_CACHE_CONTROL)).await
}

fn listing_response(listing: DirectoryListing) -> Response {
    let version = listing.version.clone();
    ([(VERSION_HEADER, version)], Json(listing)).into_response()
}

async fn list_directory(state: &GalleryState, path: &str) -> Result<Response, ApiError> {
    let listing = state.gallery.list(path).await?;
    debug!(path = %listing.path, version = %listing.version, "Directory listed");
    Ok(listing_response(listing))
}

/// GET /api/gallery/ - listing de la racine
#[utoipa::path(
    get,
    path = "/",
    responses(
        (status = 200, description = "Contenu de la racine", body = DirectoryListing,
            headers(("x-gallery-version" = String, description = "Jeton de version du répertoire"))),
        (status = 500, description = "Galerie illisible", body = ErrorResponse)
    ),
    tag = "gallery"
)]
pub async fn list_root(State(state): State<GalleryState>) -> Result<Response, ApiError> {
    list_directory(&state, "").await
}

/// GET /api/gallery/content/{path} - répertoire, original ou dérivé
#[utoipa::path(
    get,
    path = "/content/{path}",
    params(
        ("path" = String, Path, description = "Chemin relatif, éventuellement suivi de /thumbnail[/size], /icon ou /bestFit")
    ),
    responses(
        (status = 200, description = "Listing JSON d'un répertoire, ou contenu binaire du média ou du dérivé", body = DirectoryListing),
        (status = 403, description = "Chemin hors de la galerie", body = ErrorResponse),
        (status = 404, description = "Média introuvable", body = ErrorResponse),
        (status = 500, description = "Conversion impossible", body = ErrorResponse),
        (status = 503, description = "Pool de conversion saturé ou délai dépassé", body = ErrorResponse)
    ),
    tag = "gallery"
)]
pub async fn get_content(
    State(state): State<GalleryState>,
    Path(path): Path<String>,
) -> Result<Response, ApiError> {
    let request = GalleryRequest::parse(&path)?;

    match request {
        GalleryRequest::Content(path) => {
            let resolved = state.gallery.resolve(&path).await?;
            let meta = tokio::fs::metadata(&resolved)
                .await
                .map_err(|e| ContentError::from_io(e, &path))?;
            if meta.is_dir() {
                return list_directory(&state, &path).await;
            }
            // Seuls les médias reconnus sont servis
            let media = state.gallery.media(&path).await?;
            serve_file(&media.path, content_type_for(&media.path), None).await
        }
        GalleryRequest::Thumbnail { path, size } => {
            let media = state.gallery.media(&path).await?;
            serve_derivative(state.thumbnails.thumbnail(&media, size).await?).await
        }
        GalleryRequest::Icon(path) => {
            let media = state.gallery.media(&path).await?;
            serve_derivative(state.thumbnails.icon(&media).await?).await
        }
        GalleryRequest::BestFit(path) => {
            let media = state.gallery.media(&path).await?;
            serve_derivative(state.thumbnails.best_fit(&media).await?).await
        }
    }
}

/// GET /api/gallery/stats - statistiques du pipeline
#[utoipa::path(
    get,
    path = "/stats",
    responses(
        (status = 200, description = "Statistiques du pool, des jobs et du cache", body = GalleryStats),
        (status = 500, description = "Cache illisible", body = ErrorResponse)
    ),
    tag = "gallery"
)]
pub async fn get_stats(State(state): State<GalleryState>) -> Response {
    match state.thumbnails.stats().await {
        Ok(stats) => Json(GalleryStats {
            workers: stats.pool.workers,
            queue_capacity: stats.pool.queue_capacity,
            queued: stats.pool.queued,
            running: stats.pool.running,
            submitted: stats.pool.submitted,
            rejected: stats.pool.rejected,
            completed: stats.pool.completed,
            failed: stats.pool.failed,
            timed_out: stats.pool.timed_out,
            active_jobs: stats.active_jobs,
            cached_entries: stats.cache.entries,
            cached_bytes: stats.cache.bytes,
            thumbnail_sizes: stats.sizes,
        })
        .into_response(),
        Err(e) => {
            warn!("Cannot compute gallery stats: {}", e);
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Cannot retrieve stats",
            )
        }
    }
}

/// Crée le router de la galerie, à monter sous `/api/gallery`
pub fn create_gallery_router(state: GalleryState) -> Router {
    Router::new()
        .route("/", get(list_root))
        .route("/content", get(list_root))
        .route("/content/", get(list_root))
        .route("/content/{*path}", get(get_content))
        .route("/stats", get(get_stats))
        .with_state(state)
}
