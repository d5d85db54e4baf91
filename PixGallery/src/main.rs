use pixcontent::GalleryExt;
use pixserver::{LoggingOptions, ServerBuilder};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Infrastructure ==========

    let mut server = ServerBuilder::new_configured().build();
    server.init_logging(LoggingOptions::from_config()).await;

    server
        .add_route("/info", || async {
            serde_json::json!({
                "name": "PixGallery",
                "version": env!("CARGO_PKG_VERSION"),
            })
        })
        .await;

    // ========== PHASE 2 : Galerie et miniatures ==========

    info!("🖼️ Initializing gallery and thumbnail pipeline...");
    let state = server.init_gallery_configured().await?;
    info!(
        "✅ Gallery ready at {} ({} conversion workers)",
        state.gallery.root().display(),
        state.thumbnails.coordinator().pool().stats().workers
    );

    // ========== PHASE 3 : Démarrage du serveur ==========

    info!("🌐 Starting HTTP server...");
    server.start().await?;

    info!("✅ PixGallery is ready!");
    info!("Press Ctrl+C to stop...");
    server.wait().await;

    Ok(())
}
