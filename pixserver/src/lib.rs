//! # pixserver - Serveur web haut niveau basé sur Axum
//!
//! Cette crate fournit une abstraction simple pour créer le serveur HTTP de
//! PixGallery avec Axum. Les autres crates s'y greffent au moyen de traits
//! d'extension (voir `pixcontent::GalleryExt`).
//!
//! ## Fonctionnalités
//!
//! - **API de haut niveau** : routes JSON, handlers Axum, sous-routers
//! - **Server-Sent Events (SSE)** : logs en temps réel via `/log-sse`
//! - **Documentation OpenAPI** : Swagger UI par API enregistrée
//! - **Arrêt gracieux** : gestion propre de Ctrl+C
//!
//! ## Architecture
//!
//! - [`server`] : le serveur et son builder
//! - [`logs`] : tampon circulaire de logs, couche `tracing` et handlers HTTP
//!
//! ## Exemple d'utilisation
//!
//! ```rust,no_run
//! use pixserver::{ServerBuilder, logs::LoggingOptions};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut server = ServerBuilder::new("MyServer", "127.0.0.1", 8080).build();
//!     server.init_logging(LoggingOptions::default()).await;
//!
//!     server.add_route("/api/status", || async {
//!         serde_json::json!({"status": "ok"})
//!     }).await;
//!
//!     server.start().await?;
//!     server.wait().await;
//!     Ok(())
//! }
//! ```

pub mod logs;
pub mod server;

pub use logs::{LogState, LoggingOptions, SseLayer, log_dump, log_sse};
pub use server::{Server, ServerBuilder, ServerInfo};
