//! Décodage des chemins `content/{*path}`
//!
//! Les derniers segments décident de la ressource demandée :
//!
//! - `<media>/thumbnail` ou `<media>/thumbnail/<size>` : miniature
//! - `<media>/icon` : icône
//! - `<media>/bestFit` : version convertie
//! - tout le reste : répertoire ou fichier original, tranché à la résolution

use crate::error::ContentError;
use crate::library::normalize_path;
use pixthumbs::MediaKind;
use std::path::Path;

/// Ressource visée par une requête de contenu
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GalleryRequest {
    /// Répertoire (listing) ou fichier original
    Content(String),
    /// Miniature ; une taille absente ou illisible prend la taille par défaut
    Thumbnail { path: String, size: Option<u32> },
    Icon(String),
    BestFit(String),
}

fn is_media(segment: &str) -> bool {
    MediaKind::from_path(Path::new(segment)).is_some()
}

impl GalleryRequest {
    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        let normalized = normalize_path(raw)?;
        let segments: Vec<&str> = normalized.split('/').collect();
        let n = segments.len();
        let media_path = |len: usize| segments[..len].join("/");

        if n >= 2 && is_media(segments[n - 2]) {
            match segments[n - 1] {
                "thumbnail" => {
                    return Ok(Self::Thumbnail {
                        path: media_path(n - 1),
                        size: None,
                    });
                }
                "icon" => return Ok(Self::Icon(media_path(n - 1))),
                "bestFit" => return Ok(Self::BestFit(media_path(n - 1))),
                _ => {}
            }
        }

        if n >= 3 && segments[n - 2] == "thumbnail" && is_media(segments[n - 3]) {
            return Ok(Self::Thumbnail {
                path: media_path(n - 2),
                size: segments[n - 1].parse().ok(),
            });
        }

        Ok(Self::Content(normalized))
    }

    /// Chemin du répertoire ou du média visé
    pub fn path(&self) -> &str {
        match self {
            Self::Content(path) | Self::Icon(path) | Self::BestFit(path) => path,
            Self::Thumbnail { path, .. } => path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_derivatives() {
        assert_eq!(
            GalleryRequest::parse("album/a.jpg/thumbnail/480").unwrap(),
            GalleryRequest::Thumbnail {
                path: "album/a.jpg".into(),
                size: Some(480)
            }
        );
        assert_eq!(
            GalleryRequest::parse("/a.JPG/thumbnail").unwrap(),
            GalleryRequest::Thumbnail {
                path: "a.JPG".into(),
                size: None
            }
        );
        assert_eq!(
            GalleryRequest::parse("a.jpg/thumbnail/big").unwrap(),
            GalleryRequest::Thumbnail {
                path: "a.jpg".into(),
                size: None
            }
        );
        assert_eq!(
            GalleryRequest::parse("clips/b.mp4/icon").unwrap(),
            GalleryRequest::Icon("clips/b.mp4".into())
        );
        assert_eq!(
            GalleryRequest::parse("clips/b.mp4/bestFit/").unwrap(),
            GalleryRequest::BestFit("clips/b.mp4".into())
        );
    }

    #[test]
    fn test_parse_plain_content() {
        assert_eq!(
            GalleryRequest::parse("").unwrap(),
            GalleryRequest::Content(String::new())
        );
        assert_eq!(
            GalleryRequest::parse("album/icon").unwrap(),
            GalleryRequest::Content("album/icon".into())
        );
        assert_eq!(
            GalleryRequest::parse("album/thumbnail/240").unwrap(),
            GalleryRequest::Content("album/thumbnail/240".into())
        );
        assert_eq!(
            GalleryRequest::parse("album/a.jpg").unwrap().path(),
            "album/a.jpg"
        );
    }

    #[test]
    fn test_parse_rejects_traversal() {
        assert!(matches!(
            GalleryRequest::parse("album/../../etc/a.jpg/icon"),
            Err(ContentError::Traversal)
        ));
    }
}
