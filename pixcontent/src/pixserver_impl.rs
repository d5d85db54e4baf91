//! Implémentation du trait GalleryExt pour le serveur pixserver
//!
//! `pixcontent` étend `pixserver::Server` sans que `pixserver` connaisse
//! `pixcontent` : le trait [`GalleryExt`](crate::GalleryExt) ajoute
//! l'enregistrement des routes de la galerie à un type externe.
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use pixcontent::GalleryExt;
//! use pixserver::ServerBuilder;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let mut server = ServerBuilder::new_configured().build();
//! server.init_gallery_configured().await?;
//! server.start().await?;
//! server.wait().await;
//! # Ok(())
//! # }
//! ```

use crate::routes::{GalleryState, create_gallery_router};
use crate::{Gallery, GalleryApiDoc, GalleryConfigExt, GalleryExt};
use pixserver::Server;
use pixthumbs::{ThumbnailConfigExt, Thumbnails};
use std::sync::Arc;
use tracing::{info, warn};
use utoipa::OpenApi;

#[async_trait::async_trait]
impl GalleryExt for Server {
    async fn init_gallery(
        &mut self,
        gallery: Gallery,
        thumbnails: Thumbnails,
    ) -> anyhow::Result<GalleryState> {
        let state = GalleryState {
            gallery: Arc::new(gallery),
            thumbnails,
        };

        // Routes finales : /api/gallery/, /api/gallery/content/{*path}, /api/gallery/stats
        // Swagger UI disponible à /swagger-ui/gallery
        self.add_openapi(
            create_gallery_router(state.clone()),
            GalleryApiDoc::openapi(),
            "gallery",
        )
        .await;

        Ok(state)
    }

    async fn init_gallery_configured(&mut self) -> anyhow::Result<GalleryState> {
        let config = pixconfig::get_config();

        let gallery = config.create_gallery()?;
        let thumbnails = config.create_thumbnails()?;
        info!(
            "gallery directory {}, thumbnail sizes {:?}",
            gallery.root().display(),
            thumbnails.policy().sizes()
        );

        match thumbnails.consolidate().await {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} leftover temporary derivatives", removed),
            Err(e) => warn!("Cannot consolidate derivative cache: {}", e),
        }

        self.init_gallery(gallery, thumbnails).await
    }
}
