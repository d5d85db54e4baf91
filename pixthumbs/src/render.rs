//! Description des dérivés demandés et politique de tailles

use crate::media::MediaKind;
use anyhow::{Result, anyhow};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_THUMBNAIL_SIZES: &[u32] = &[240, 480];
pub const DEFAULT_ICON_SIZE: u32 = 45;
pub const DEFAULT_BESTFIT_PHOTO_SIZE: u32 = 1080;
pub const DEFAULT_BESTFIT_VIDEO_HEIGHT: u32 = 720;

/// Type de dérivé
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivativeKind {
    Thumbnail,
    Icon,
    /// Version convertie : photo ré-encodée, vidéo transcodée en MP4
    BestFit,
}

impl DerivativeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DerivativeKind::Thumbnail => "thumbnail",
            DerivativeKind::Icon => "icon",
            DerivativeKind::BestFit => "bestfit",
        }
    }
}

impl fmt::Display for DerivativeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Format de sortie des dérivés images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Webp,
    Jpeg,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "webp",
            OutputFormat::Jpeg => "jpg",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Webp => "image/webp",
            OutputFormat::Jpeg => "image/jpeg",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "webp" => Ok(OutputFormat::Webp),
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            other => Err(anyhow!("Unknown output format: {}", other)),
        }
    }
}

/// Dérivé demandé
///
/// `target_size` est la plus grande dimension autorisée (boîte carrée) pour
/// les images, et la hauteur maximale pour une vidéo transcodée.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct RenderSpec {
    pub kind: DerivativeKind,
    pub target_size: u32,
    pub source_kind: MediaKind,
    pub format: OutputFormat,
}

impl RenderSpec {
    /// Vrai pour un transcodage vidéo complet plutôt qu'une image fixe
    pub fn is_transcode(&self) -> bool {
        self.kind == DerivativeKind::BestFit && self.source_kind == MediaKind::Video
    }

    pub fn extension(&self) -> &'static str {
        if self.is_transcode() {
            "mp4"
        } else {
            self.format.extension()
        }
    }

    pub fn content_type(&self) -> &'static str {
        if self.is_transcode() {
            "video/mp4"
        } else {
            self.format.content_type()
        }
    }
}

/// Politique de tailles : liste blanche des miniatures, icône et best-fit
///
/// La liste blanche borne la cardinalité du cache : une taille demandée
/// hors liste est ramenée à la taille par défaut (la première configurée).
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPolicy {
    sizes: Vec<u32>,
    pub icon_size: u32,
    pub bestfit_photo_size: u32,
    pub bestfit_video_height: u32,
    pub format: OutputFormat,
}

impl Default for RenderPolicy {
    fn default() -> Self {
        Self {
            sizes: DEFAULT_THUMBNAIL_SIZES.to_vec(),
            icon_size: DEFAULT_ICON_SIZE,
            bestfit_photo_size: DEFAULT_BESTFIT_PHOTO_SIZE,
            bestfit_video_height: DEFAULT_BESTFIT_VIDEO_HEIGHT,
            format: OutputFormat::default(),
        }
    }
}

impl RenderPolicy {
    /// Crée une politique à partir de la liste blanche des tailles
    ///
    /// Les doublons et les zéros sont ignorés, l'ordre est conservé.
    /// Une liste vide est refusée.
    pub fn new(sizes: impl IntoIterator<Item = u32>) -> Result<Self> {
        let mut allowed = Vec::new();
        for size in sizes {
            if size > 0 && !allowed.contains(&size) {
                allowed.push(size);
            }
        }
        if allowed.is_empty() {
            return Err(anyhow!("Thumbnail size allow-list must not be empty"));
        }
        Ok(Self {
            sizes: allowed,
            ..Self::default()
        })
    }

    pub fn with_icon_size(mut self, size: u32) -> Self {
        if size > 0 {
            self.icon_size = size;
        }
        self
    }

    pub fn with_bestfit_sizes(mut self, photo: u32, video_height: u32) -> Self {
        if photo > 0 {
            self.bestfit_photo_size = photo;
        }
        if video_height > 0 {
            self.bestfit_video_height = video_height;
        }
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn sizes(&self) -> &[u32] {
        &self.sizes
    }

    pub fn default_size(&self) -> u32 {
        self.sizes[0]
    }

    /// Ramène une taille demandée dans la liste blanche
    pub fn clamp_thumbnail_size(&self, requested: Option<u32>) -> u32 {
        match requested {
            Some(size) if self.sizes.contains(&size) => size,
            _ => self.default_size(),
        }
    }

    pub fn thumbnail(&self, source_kind: MediaKind, requested: Option<u32>) -> RenderSpec {
        RenderSpec {
            kind: DerivativeKind::Thumbnail,
            target_size: self.clamp_thumbnail_size(requested),
            source_kind,
            format: self.format,
        }
    }

    pub fn icon(&self, source_kind: MediaKind) -> RenderSpec {
        RenderSpec {
            kind: DerivativeKind::Icon,
            target_size: self.icon_size,
            source_kind,
            format: self.format,
        }
    }

    pub fn best_fit(&self, source_kind: MediaKind) -> RenderSpec {
        let target_size = match source_kind {
            MediaKind::Photo => self.bestfit_photo_size,
            MediaKind::Video => self.bestfit_video_height,
        };
        RenderSpec {
            kind: DerivativeKind::BestFit,
            target_size,
            source_kind,
            format: self.format,
        }
    }
}
