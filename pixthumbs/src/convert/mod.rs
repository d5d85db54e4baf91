//! Conversion d'un média source en dérivé
//!
//! Photos et vidéos sont deux implémentations de [`FrameSource`] : chacune
//! produit une image matricielle, ensuite redimensionnée et encodée par le
//! même code. Seul le best-fit vidéo sort de ce chemin (transcodage complet).

mod photo;
mod video;

pub use photo::PhotoFrames;
pub use video::VideoFrames;

use crate::error::ConversionError;
use crate::media::{MediaKind, MediaRef};
use crate::render::{OutputFormat, RenderSpec};
use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, imageops::FilterType};
use std::path::Path;
use tokio_util::sync::CancellationToken;
use webp::{Encoder, WebPMemory};

pub const DEFAULT_QUALITY: f32 = 80.0;

/// Produit le fichier dérivé `output` à partir de `media`
///
/// `cancel` est déclenché quand le job dépasse son délai. Le pool attend
/// malgré tout la fin de `convert` avant de confier un autre job au worker :
/// une implémentation doit donc s'arrêter au plus vite une fois annulée, et
/// ne plus écrire dans `output`.
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(
        &self,
        media: &MediaRef,
        spec: &RenderSpec,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError>;
}

/// Produit une image décodable à partir d'un média
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn frame(
        &self,
        media: &MediaRef,
        cancel: &CancellationToken,
    ) -> Result<DynamicImage, ConversionError>;
}

/// Options d'encodage et outils externes
#[derive(Debug, Clone)]
pub struct ConverterOptions {
    /// Qualité d'encodage (0-100)
    pub quality: f32,
    /// Position relative de la frame extraite d'une vidéo (0.0-1.0)
    pub video_frame_offset: f64,
    pub ffmpeg: String,
    pub ffprobe: String,
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            video_frame_offset: video::DEFAULT_FRAME_OFFSET,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
        }
    }
}

/// Convertisseur de production : `image` pour les photos, `ffmpeg` pour les vidéos
pub struct MediaConverter {
    photos: PhotoFrames,
    videos: VideoFrames,
    quality: f32,
}

impl MediaConverter {
    pub fn new(options: ConverterOptions) -> Self {
        Self {
            photos: PhotoFrames,
            videos: VideoFrames::new(
                options.ffmpeg.clone(),
                options.ffprobe.clone(),
                options.video_frame_offset,
            ),
            quality: options.quality.clamp(0.0, 100.0),
        }
    }

    fn frames_for(&self, kind: MediaKind) -> &dyn FrameSource {
        match kind {
            MediaKind::Photo => &self.photos,
            MediaKind::Video => &self.videos,
        }
    }
}

impl Default for MediaConverter {
    fn default() -> Self {
        Self::new(ConverterOptions::default())
    }
}

#[async_trait]
impl Converter for MediaConverter {
    async fn convert(
        &self,
        media: &MediaRef,
        spec: &RenderSpec,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError> {
        if spec.is_transcode() {
            return self
                .videos
                .transcode(media, spec.target_size, output, cancel)
                .await;
        }

        let frame = self.frames_for(media.kind).frame(media, cancel).await?;
        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        let size = spec.target_size;
        let format = spec.format;
        let quality = self.quality;
        let output = output.to_path_buf();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            let resized = fit_within(&frame, size);
            let data = encode(&resized, format, quality)?;
            // Job abandonné par le pool : le fichier temporaire n'est plus attendu
            if cancel.is_cancelled() {
                return Err(ConversionError::Cancelled);
            }
            std::fs::write(&output, data).map_err(ConversionError::Write)
        })
        .await
        .map_err(|e| ConversionError::Encode(format!("encoder task failed: {}", e)))?
    }
}

/// Redimensionne en conservant les proportions pour tenir dans `size`×`size`
pub fn fit_within(img: &DynamicImage, size: u32) -> DynamicImage {
    img.resize(size, size, FilterType::Lanczos3)
}

/// Encode une image dans le format de sortie demandé
pub fn encode(
    img: &DynamicImage,
    format: OutputFormat,
    quality: f32,
) -> Result<Vec<u8>, ConversionError> {
    match format {
        OutputFormat::Webp => {
            let rgba = img.to_rgba8();
            let encoder = Encoder::from_rgba(&rgba, rgba.width(), rgba.height());
            let webp_data: WebPMemory = encoder.encode(quality);
            Ok(webp_data.to_vec())
        }
        OutputFormat::Jpeg => {
            let mut buf = Vec::new();
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality as u8))?;
            Ok(buf)
        }
    }
}
