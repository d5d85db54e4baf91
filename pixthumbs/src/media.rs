//! Référence figée vers un fichier source (photo ou vidéo)

use crate::error::PipelineError;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const PHOTO_EXTENSIONS: &[&str] = &["jpg", "jpeg", "jpe", "png", "webp", "gif", "bmp", "tif", "tiff"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogv", "ogg", "mov", "mkv", "m4v"];

/// Nature du média source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    /// Déduit le type de média de l'extension (insensible à la casse)
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if PHOTO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Photo)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Instantané d'un fichier source pris au moment de la requête
///
/// Le chemin est absolu et ses liens symboliques sont résolus : deux chemins
/// menant au même fichier physique partagent donc les mêmes dérivés.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    pub path: PathBuf,
    pub kind: MediaKind,
    pub mtime: SystemTime,
    pub size: u64,
}

impl MediaRef {
    /// Construit une référence à partir d'informations déjà connues
    /// (fournies par un index par exemple). Le chemin doit être canonique.
    pub fn new(path: impl Into<PathBuf>, kind: MediaKind, mtime: SystemTime, size: u64) -> Self {
        Self {
            path: path.into(),
            kind,
            mtime,
            size,
        }
    }

    /// Canonicalise le chemin et relève date de modification et taille
    pub async fn snapshot(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let kind = MediaKind::from_path(path).ok_or_else(|| {
            PipelineError::source_unavailable(format!(
                "unsupported media type: {}",
                path.display()
            ))
        })?;

        let canonical = tokio::fs::canonicalize(path)
            .await
            .map_err(PipelineError::source_unavailable)?;
        let metadata = tokio::fs::metadata(&canonical)
            .await
            .map_err(PipelineError::source_unavailable)?;

        if !metadata.is_file() {
            return Err(PipelineError::source_unavailable("not a regular file"));
        }

        let mtime = metadata
            .modified()
            .map_err(PipelineError::source_unavailable)?;

        Ok(Self::new(canonical, kind, mtime, metadata.len()))
    }

    /// Date de modification en nanosecondes depuis l'epoch (négative avant 1970)
    pub fn mtime_nanos(&self) -> i128 {
        match self.mtime.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_nanos() as i128,
            Err(e) => -(e.duration().as_nanos() as i128),
        }
    }
}
