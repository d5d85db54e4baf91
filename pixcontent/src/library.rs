//! Résolution des chemins et listing des répertoires de la galerie
//!
//! Tous les chemins reçus des clients sont relatifs à la racine de la
//! galerie. Ils sont normalisés (`.` et séparateurs redondants retirés) et
//! tout segment `..` est refusé. Après résolution des liens symboliques, le
//! chemin doit toujours être sous la racine.

use crate::error::ContentError;
use chrono::{DateTime, Utc};
use pixthumbs::{MediaKind, MediaRef, VersionToken};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

#[cfg(feature = "pixserver")]
use utoipa::ToSchema;

/// Sous-répertoire d'un listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "pixserver", derive(ToSchema))]
pub struct DirectoryEntry {
    #[cfg_attr(feature = "pixserver", schema(example = "2024-vacances"))]
    pub name: String,
    pub modified: Option<DateTime<Utc>>,
}

/// Photo ou vidéo d'un listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "pixserver", derive(ToSchema))]
pub struct MediaEntry {
    #[cfg_attr(feature = "pixserver", schema(example = "IMG_0042.jpg"))]
    pub name: String,
    /// `photo` ou `video`
    #[cfg_attr(feature = "pixserver", schema(example = "photo"))]
    pub kind: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// Contenu d'un répertoire de la galerie
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "pixserver", derive(ToSchema))]
pub struct DirectoryListing {
    /// Chemin normalisé, relatif à la racine ("" pour la racine)
    pub path: String,
    /// Jeton de version, repris dans l'en-tête `X-Gallery-Version`
    #[cfg_attr(feature = "pixserver", schema(example = "3f9a0c1d2b4e5f60"))]
    pub version: String,
    pub directories: Vec<DirectoryEntry>,
    pub media: Vec<MediaEntry>,
}

/// Normalise un chemin relatif de la galerie
///
/// Retire les séparateurs en tête, en fin et redondants ainsi que les
/// segments `.`. Un segment `..` est refusé.
pub fn normalize_path(raw: &str) -> Result<String, ContentError> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(ContentError::Traversal),
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Type MIME d'un fichier original, d'après son extension
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "ogv" | "ogg" => "video/ogg",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

fn to_datetime(time: std::io::Result<SystemTime>) -> Option<DateTime<Utc>> {
    time.ok().map(DateTime::<Utc>::from)
}

/// Galerie enracinée dans un répertoire
#[derive(Debug, Clone)]
pub struct Gallery {
    root: PathBuf,
}

impl Gallery {
    /// Ouvre la galerie ; la racine doit exister et être un répertoire
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ContentError> {
        let root = root.as_ref();
        let root = std::fs::canonicalize(root)
            .map_err(|e| ContentError::from_io(e, &root.display().to_string()))?;
        if !root.is_dir() {
            return Err(ContentError::InvalidRoot(root.display().to_string()));
        }
        Ok(Self { root })
    }

    /// Racine canonique de la galerie
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chemin absolu et canonique d'une entrée de la galerie
    pub async fn resolve(&self, raw: &str) -> Result<PathBuf, ContentError> {
        let relative = normalize_path(raw)?;
        let joined = self.root.join(&relative);
        let resolved = tokio::fs::canonicalize(&joined)
            .await
            .map_err(|e| ContentError::from_io(e, &relative))?;

        if !resolved.starts_with(&self.root) {
            debug!(path = %relative, "Symlink escapes the gallery root");
            return Err(ContentError::Traversal);
        }
        Ok(resolved)
    }

    /// Instantané d'une photo ou d'une vidéo de la galerie
    pub async fn media(&self, raw: &str) -> Result<MediaRef, ContentError> {
        let path = self.resolve(raw).await?;
        if MediaKind::from_path(&path).is_none() {
            return Err(ContentError::Unsupported(normalize_path(raw)?));
        }
        MediaRef::snapshot(&path)
            .await
            .map_err(|_| ContentError::NotFound(normalize_path(raw).unwrap_or_default()))
    }

    /// Liste un répertoire : sous-répertoires et médias reconnus, triés par nom
    ///
    /// Les entrées cachées et les fichiers non reconnus sont ignorés.
    pub async fn list(&self, raw: &str) -> Result<DirectoryListing, ContentError> {
        let relative = normalize_path(raw)?;
        let dir = self.resolve(&relative).await?;
        if !tokio::fs::metadata(&dir).await?.is_dir() {
            return Err(ContentError::NotFound(relative));
        }

        let mut directories = Vec::new();
        let mut media = Vec::new();

        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let Ok(name) = entry.file_name().into_string() else {
                debug!(path = %entry.path().display(), "Skipping non UTF-8 name");
                continue;
            };
            if name.starts_with('.') {
                continue;
            }

            // Suit les liens symboliques, comme le service des fichiers
            let meta = match tokio::fs::metadata(entry.path()).await {
                Ok(meta) => meta,
                Err(e) => {
                    debug!(path = %entry.path().display(), "Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if meta.is_dir() {
                directories.push(DirectoryEntry {
                    name,
                    modified: to_datetime(meta.modified()),
                });
            } else if let Some(kind) = MediaKind::from_path(Path::new(&name)) {
                media.push(MediaEntry {
                    kind: kind.as_str().to_string(),
                    size: meta.len(),
                    modified: to_datetime(meta.modified()),
                    name,
                });
            }
        }

        directories.sort_by(|a, b| a.name.cmp(&b.name));
        media.sort_by(|a, b| a.name.cmp(&b.name));

        let version = VersionToken::for_directory(&dir).await?;

        Ok(DirectoryListing {
            path: relative,
            version: version.to_string(),
            directories,
            media,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("").unwrap(), "");
        assert_eq!(normalize_path("/").unwrap(), "");
        assert_eq!(normalize_path("/a//b/./c.jpg/").unwrap(), "a/b/c.jpg");
        assert!(matches!(normalize_path("a/../b"), Err(ContentError::Traversal)));
        assert!(matches!(normalize_path("..\\etc"), Err(ContentError::Traversal)));
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for(Path::new("a/IMG.JPG")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("clip.mov")), "video/quicktime");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_list_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::create_dir(dir.path().join("alpha")).unwrap();
        std::fs::create_dir(dir.path().join(".thumbs")).unwrap();
        std::fs::write(dir.path().join("b.mp4"), b"v").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"p").unwrap();
        std::fs::write(dir.path().join(".hidden.jpg"), b"h").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"t").unwrap();

        let gallery = Gallery::new(dir.path()).unwrap();
        let listing = gallery.list("/").await.unwrap();

        assert_eq!(listing.path, "");
        let dirs: Vec<_> = listing.directories.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(dirs, ["alpha", "zeta"]);
        let media: Vec<_> = listing
            .media
            .iter()
            .map(|m| (m.name.as_str(), m.kind.as_str()))
            .collect();
        assert_eq!(media, [("a.jpg", "photo"), ("b.mp4", "video")]);
        assert_eq!(listing.media[0].size, 1);
        assert_eq!(listing.version.len(), 16);
    }

    #[tokio::test]
    async fn test_resolve_errors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"t").unwrap();
        let gallery = Gallery::new(dir.path()).unwrap();

        assert!(matches!(
            gallery.resolve("missing/a.jpg").await,
            Err(ContentError::NotFound(_))
        ));
        assert!(matches!(
            gallery.resolve("../outside").await,
            Err(ContentError::Traversal)
        ));
        assert!(matches!(
            gallery.media("notes.txt").await,
            Err(ContentError::Unsupported(_))
        ));
        assert!(matches!(
            gallery.list("notes.txt").await,
            Err(ContentError::NotFound(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_outside_root_is_rejected() {
        let outside = tempfile::tempdir().unwrap();
        std::fs::write(outside.path().join("secret.jpg"), b"s").unwrap();

        let dir = tempfile::tempdir().unwrap();
        std::os::unix::fs::symlink(outside.path(), dir.path().join("link")).unwrap();
        let gallery = Gallery::new(dir.path()).unwrap();

        assert!(matches!(
            gallery.resolve("link/secret.jpg").await,
            Err(ContentError::Traversal)
        ));
    }

    #[test]
    fn test_root_must_be_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"p").unwrap();
        assert!(matches!(Gallery::new(&file), Err(ContentError::InvalidRoot(_))));
        assert!(matches!(
            Gallery::new(dir.path().join("missing")),
            Err(ContentError::NotFound(_))
        ));
    }
}
