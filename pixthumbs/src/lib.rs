//! # pixthumbs - Pipeline de génération des miniatures et icônes de PixGallery
//!
//! Cette crate transforme une demande de dérivé (miniature, icône, version
//! convertie) d'une photo ou d'une vidéo en un fichier mis en cache,
//! correctement invalidé, sans bloquer le service des requêtes.
//!
//! ## Architecture
//!
//! - [`fingerprint`] : clé de cache déterministe (chemin, date, dérivé demandé)
//! - [`store`] : cache disque, écriture atomique par `rename`
//! - [`pool`] : pool borné de workers, refus immédiat quand la file est pleine
//! - [`coordinator`] : au plus un job par empreinte, résultat partagé par tous
//! - [`convert`] : décodage photo (`image`), extraction de frame et
//!   transcodage vidéo (`ffmpeg`), redimensionnement et encodage WebP/JPEG
//! - [`version`] : jeton de version d'un répertoire pour les listings
//!
//! Les dépendances sont injectées : le coordinateur reçoit son cache et son
//! pool à la construction, ce qui permet de le tester avec de faux
//! convertisseurs.
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use pixthumbs::{MediaRef, Thumbnails, RenderPolicy, PoolOptions, ConverterOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let thumbnails = Thumbnails::with_media_converter(
//!         "./cache_thumbnails",
//!         ConverterOptions::default(),
//!         PoolOptions::default(),
//!         RenderPolicy::default(),
//!     )?;
//!
//!     let media = MediaRef::snapshot("./images/photo.jpg").await?;
//!     let entry = thumbnails.thumbnail(&media, Some(480)).await?;
//!     println!("{} ({})", entry.path.display(), entry.content_type);
//!     Ok(())
//! }
//! ```

pub mod convert;
pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod media;
pub mod pool;
pub mod render;
pub mod store;
pub mod version;

#[cfg(feature = "pixconfig")]
pub mod config_ext;

pub use convert::{Converter, ConverterOptions, FrameSource, MediaConverter};
pub use coordinator::{GenerationCoordinator, JobState};
pub use error::{ConversionError, PipelineError};
pub use fingerprint::{Fingerprint, fingerprint};
pub use media::{MediaKind, MediaRef};
pub use pool::{ConversionPool, PoolOptions, PoolStats};
pub use render::{DerivativeKind, OutputFormat, RenderPolicy, RenderSpec};
pub use store::{CacheStats, DerivativeCache, DerivativeEntry};
pub use version::VersionToken;

/// Jeton d'annulation transmis à [`Converter::convert`]
pub use tokio_util::sync::CancellationToken;

#[cfg(feature = "pixconfig")]
pub use config_ext::ThumbnailConfigExt;

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// Statistiques globales du pipeline
#[derive(Debug, Clone, Serialize)]
pub struct ThumbnailStats {
    pub pool: PoolStats,
    pub active_jobs: usize,
    pub cache: CacheStats,
    pub sizes: Vec<u32>,
}

/// Façade du pipeline : applique la politique de tailles puis délègue au
/// coordinateur
#[derive(Clone)]
pub struct Thumbnails {
    coordinator: GenerationCoordinator,
    policy: Arc<RenderPolicy>,
}

impl Thumbnails {
    pub fn new(coordinator: GenerationCoordinator, policy: RenderPolicy) -> Self {
        Self {
            coordinator,
            policy: Arc::new(policy),
        }
    }

    /// Assemble cache, pool et convertisseur. Doit être appelé dans un runtime tokio.
    pub fn with_converter(
        cache_dir: impl Into<PathBuf>,
        converter: Arc<dyn Converter>,
        pool_options: PoolOptions,
        policy: RenderPolicy,
    ) -> Result<Self> {
        let cache = Arc::new(DerivativeCache::new(cache_dir)?);
        let pool = Arc::new(ConversionPool::new(converter, pool_options));
        Ok(Self::new(GenerationCoordinator::new(cache, pool), policy))
    }

    /// Comme [`Thumbnails::with_converter`] avec le convertisseur de production
    pub fn with_media_converter(
        cache_dir: impl Into<PathBuf>,
        converter_options: ConverterOptions,
        pool_options: PoolOptions,
        policy: RenderPolicy,
    ) -> Result<Self> {
        Self::with_converter(
            cache_dir,
            Arc::new(MediaConverter::new(converter_options)),
            pool_options,
            policy,
        )
    }

    pub fn policy(&self) -> &RenderPolicy {
        &self.policy
    }

    pub fn coordinator(&self) -> &GenerationCoordinator {
        &self.coordinator
    }

    /// Miniature ; une taille hors liste blanche est ramenée à la taille par défaut
    pub async fn thumbnail(
        &self,
        media: &MediaRef,
        requested_size: Option<u32>,
    ) -> Result<DerivativeEntry, PipelineError> {
        let spec = self.policy.thumbnail(media.kind, requested_size);
        self.coordinator.get_or_create(media, &spec).await
    }

    pub async fn icon(&self, media: &MediaRef) -> Result<DerivativeEntry, PipelineError> {
        let spec = self.policy.icon(media.kind);
        self.coordinator.get_or_create(media, &spec).await
    }

    /// Version convertie : photo ré-encodée, vidéo transcodée en MP4
    pub async fn best_fit(&self, media: &MediaRef) -> Result<DerivativeEntry, PipelineError> {
        let spec = self.policy.best_fit(media.kind);
        self.coordinator.get_or_create(media, &spec).await
    }

    /// Nettoie les fichiers temporaires orphelins du cache
    pub async fn consolidate(&self) -> Result<usize> {
        self.coordinator.cache().consolidate().await
    }

    pub async fn stats(&self) -> Result<ThumbnailStats> {
        Ok(ThumbnailStats {
            pool: self.coordinator.pool().stats(),
            active_jobs: self.coordinator.active_jobs(),
            cache: self.coordinator.cache().stats().await?,
            sizes: self.policy.sizes().to_vec(),
        })
    }
}
