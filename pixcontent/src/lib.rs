//! # pixcontent - Contenu de la galerie PixGallery
//!
//! Cette crate expose le contenu d'un répertoire de photos et de vidéos :
//! listings versionnés, fichiers originaux et dérivés produits par
//! `pixthumbs` (miniatures, icônes, versions converties).
//!
//! ## Architecture
//!
//! - [`library`] : résolution sûre des chemins, listings triés
//! - [`request`] : décodage des suffixes `/thumbnail[/size]`, `/icon`, `/bestFit`
//! - `routes` : handlers axum et traduction des erreurs en statuts HTTP
//! - `openapi` : documentation utoipa servie par Swagger UI
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use pixcontent::GalleryExt;
//! use pixserver::ServerBuilder;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new_configured().build();
//!     server.init_gallery_configured().await?;
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod library;
pub mod request;

#[cfg(feature = "pixserver")]
pub mod openapi;
#[cfg(feature = "pixserver")]
pub mod routes;
#[cfg(feature = "pixserver")]
mod pixserver_impl;

#[cfg(feature = "pixconfig")]
pub mod config_ext;

pub use error::ContentError;
pub use library::{DirectoryEntry, DirectoryListing, Gallery, MediaEntry, normalize_path};
pub use request::GalleryRequest;

#[cfg(feature = "pixserver")]
pub use openapi::GalleryApiDoc;
#[cfg(feature = "pixserver")]
pub use routes::{GalleryState, create_gallery_router};

#[cfg(feature = "pixconfig")]
pub use config_ext::GalleryConfigExt;

/// Trait d'extension pour ajouter la galerie à pixserver
#[cfg(feature = "pixserver")]
#[async_trait::async_trait]
pub trait GalleryExt {
    /// Enregistre les routes de la galerie
    ///
    /// # Routes enregistrées
    ///
    /// - `GET /api/gallery/` - Listing de la racine
    /// - `GET /api/gallery/content/{*path}` - Listing, original ou dérivé
    /// - `GET /api/gallery/stats` - Statistiques du pipeline
    /// - `GET /swagger-ui/gallery` - Documentation interactive
    async fn init_gallery(
        &mut self,
        gallery: Gallery,
        thumbnails: pixthumbs::Thumbnails,
    ) -> anyhow::Result<GalleryState>;

    /// Comme [`GalleryExt::init_gallery`] avec les réglages de `pixconfig`
    ///
    /// Nettoie aussi les fichiers temporaires laissés dans le cache des dérivés.
    async fn init_gallery_configured(&mut self) -> anyhow::Result<GalleryState>;
}
