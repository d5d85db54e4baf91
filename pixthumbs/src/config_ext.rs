//! Extension pour intégrer le pipeline de miniatures dans pixconfig
//!
//! Ce module fournit le trait `ThumbnailConfigExt` qui ajoute à
//! `pixconfig::Config` la lecture des réglages du pipeline et une fabrique
//! [`ThumbnailConfigExt::create_thumbnails`].

use crate::convert::ConverterOptions;
use crate::pool::PoolOptions;
use crate::render::{
    DEFAULT_BESTFIT_PHOTO_SIZE, DEFAULT_BESTFIT_VIDEO_HEIGHT, DEFAULT_ICON_SIZE,
    DEFAULT_THUMBNAIL_SIZES, OutputFormat, RenderPolicy,
};
use crate::{Thumbnails, convert, pool};
use anyhow::Result;
use pixconfig::Config;
use serde_yaml::Value;
use std::time::Duration;
use tracing::warn;

const DEFAULT_THUMBNAIL_CACHE_DIR: &str = "cache_thumbnails";

fn u32_or(config: &Config, path: &[&str], default: u32) -> u32 {
    u32::try_from(config.get_usize_or(path, default as usize)).unwrap_or(default)
}

/// Trait d'extension pour gérer le pipeline de miniatures dans pixconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pixconfig::get_config;
/// use pixthumbs::ThumbnailConfigExt;
///
/// let thumbnails = get_config().create_thumbnails()?;
/// ```
pub trait ThumbnailConfigExt {
    /// Répertoire du cache des dérivés (default: "cache_thumbnails")
    fn get_thumbnail_cache_dir(&self) -> Result<String>;

    fn set_thumbnail_cache_dir(&self, directory: String) -> Result<()>;

    /// Liste blanche des tailles de miniatures, la première est la taille par défaut
    fn get_thumbnail_sizes(&self) -> Vec<u32>;

    fn set_thumbnail_sizes(&self, sizes: &[u32]) -> Result<()>;

    /// Politique de tailles complète (miniatures, icône, best-fit, format)
    fn get_render_policy(&self) -> Result<RenderPolicy>;

    /// Dimensionnement du pool (0 worker = nombre de cœurs)
    fn get_pool_options(&self) -> PoolOptions;

    /// Qualité d'encodage, position de la frame vidéo, outils externes
    fn get_converter_options(&self) -> ConverterOptions;

    /// Crée le pipeline complet. Doit être appelé dans un runtime tokio.
    fn create_thumbnails(&self) -> Result<Thumbnails>;
}

impl ThumbnailConfigExt for Config {
    fn get_thumbnail_cache_dir(&self) -> Result<String> {
        self.get_managed_dir(
            &["host", "thumbnail_cache", "directory"],
            DEFAULT_THUMBNAIL_CACHE_DIR,
        )
    }

    fn set_thumbnail_cache_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["host", "thumbnail_cache", "directory"], directory)
    }

    fn get_thumbnail_sizes(&self) -> Vec<u32> {
        self.get_u32_list_or(&["thumbnails", "sizes"], DEFAULT_THUMBNAIL_SIZES)
    }

    fn set_thumbnail_sizes(&self, sizes: &[u32]) -> Result<()> {
        let seq = sizes.iter().map(|s| Value::Number((*s).into())).collect();
        self.set_value(&["thumbnails", "sizes"], Value::Sequence(seq))
    }

    fn get_render_policy(&self) -> Result<RenderPolicy> {
        let format_name = self.get_string_or(&["thumbnails", "format"], "webp");
        let format = format_name.parse::<OutputFormat>().unwrap_or_else(|e| {
            warn!("{}, using webp", e);
            OutputFormat::Webp
        });

        Ok(RenderPolicy::new(self.get_thumbnail_sizes())?
            .with_icon_size(u32_or(self, &["thumbnails", "icon_size"], DEFAULT_ICON_SIZE))
            .with_bestfit_sizes(
                u32_or(self, &["thumbnails", "bestfit_photo_size"], DEFAULT_BESTFIT_PHOTO_SIZE),
                u32_or(self, &["thumbnails", "bestfit_video_height"], DEFAULT_BESTFIT_VIDEO_HEIGHT),
            )
            .with_format(format))
    }

    fn get_pool_options(&self) -> PoolOptions {
        let timeout = self.get_usize_or(
            &["thumbnails", "timeout_secs"],
            pool::DEFAULT_JOB_TIMEOUT.as_secs() as usize,
        );
        let transcode_timeout = self.get_usize_or(
            &["thumbnails", "transcode_timeout_secs"],
            pool::DEFAULT_TRANSCODE_TIMEOUT.as_secs() as usize,
        );

        PoolOptions {
            workers: self.get_usize_or(&["thumbnails", "workers"], 0),
            queue_capacity: self
                .get_usize_or(&["thumbnails", "queue_capacity"], pool::DEFAULT_QUEUE_CAPACITY),
            job_timeout: Duration::from_secs(timeout.max(1) as u64),
            transcode_timeout: Duration::from_secs(transcode_timeout.max(1) as u64),
        }
    }

    fn get_converter_options(&self) -> ConverterOptions {
        let defaults = ConverterOptions::default();
        ConverterOptions {
            quality: self.get_f64_or(&["thumbnails", "quality"], convert::DEFAULT_QUALITY as f64)
                as f32,
            video_frame_offset: self
                .get_f64_or(&["thumbnails", "video_frame_offset"], defaults.video_frame_offset),
            ffmpeg: self.get_string_or(&["thumbnails", "ffmpeg"], &defaults.ffmpeg),
            ffprobe: self.get_string_or(&["thumbnails", "ffprobe"], &defaults.ffprobe),
        }
    }

    fn create_thumbnails(&self) -> Result<Thumbnails> {
        Thumbnails::with_media_converter(
            self.get_thumbnail_cache_dir()?,
            self.get_converter_options(),
            self.get_pool_options(),
            self.get_render_policy()?,
        )
    }
}
