//! Documentation OpenAPI de l'API de la galerie

use utoipa::OpenApi;

/// Documentation OpenAPI pour l'API PixGallery
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_root,
        crate::routes::get_content,
        crate::routes::get_stats,
    ),
    components(
        schemas(
            crate::library::DirectoryListing,
            crate::library::DirectoryEntry,
            crate::library::MediaEntry,
            crate::routes::GalleryStats,
            crate::routes::ErrorResponse,
        )
    ),
    tags(
        (name = "gallery", description = "Parcours de la galerie et génération des miniatures")
    ),
    info(
        title = "PixGallery API",
        version = "0.1.0",
        description = r#"
# API de la galerie de photos et vidéos

## Endpoints

### GET /api/gallery/
Listing de la racine. Le jeton de version du répertoire est renvoyé dans le
corps et dans l'en-tête `X-Gallery-Version`.

### GET /api/gallery/content/{path}
- répertoire : listing JSON
- photo ou vidéo : fichier original
- `{media}/thumbnail` ou `{media}/thumbnail/{size}` : miniature (une taille
  non autorisée donne la taille par défaut)
- `{media}/icon` : icône
- `{media}/bestFit` : photo réduite ou vidéo transcodée en MP4

Les dérivés sont servis avec `Cache-Control: public, max-age=31536000, immutable` :
leur URL de cache change dès que la source est modifiée.

### GET /api/gallery/stats
Statistiques du pool de conversion, des jobs en cours et du cache.

## Erreurs

- `403` : chemin hors de la galerie
- `404` : média introuvable ou disparu
- `503` + `Retry-After` : file de conversion pleine ou délai dépassé
- `500` : média corrompu ou écriture du cache impossible
        "#,
        license(
            name = "MIT",
        ),
    )
)]
pub struct GalleryApiDoc;
