use super::FrameSource;
use crate::error::ConversionError;
use crate::media::MediaRef;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use std::ffi::OsStr;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub(crate) const DEFAULT_FRAME_OFFSET: f64 = 0.1;

/// Extraction de frames et transcodage via `ffprobe` / `ffmpeg`
///
/// La frame représentative est prise à `offset × durée` ; si la durée est
/// inconnue ou que l'extraction ne donne rien, la première frame est utilisée.
#[derive(Debug, Clone)]
pub struct VideoFrames {
    ffmpeg: String,
    ffprobe: String,
    offset: f64,
}

impl VideoFrames {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, offset: f64) -> Self {
        let offset = if offset.is_finite() {
            offset.clamp(0.0, 1.0)
        } else {
            DEFAULT_FRAME_OFFSET
        };
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            offset,
        }
    }

    /// Lance un outil externe, tué dès que `cancel` est déclenché
    async fn run<I, S>(
        &self,
        program: &str,
        args: I,
        cancel: &CancellationToken,
    ) -> Result<Output, ConversionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        tokio::select! {
            result = output => result
                .map_err(|e| ConversionError::Tool(format!("cannot run {}: {}", program, e))),
            _ = cancel.cancelled() => {
                debug!(program, "External tool killed after cancellation");
                Err(ConversionError::Cancelled)
            }
        }
    }

    /// Durée en secondes, `None` si `ffprobe` ne sait pas la donner
    async fn duration(&self, path: &Path, cancel: &CancellationToken) -> Option<f64> {
        let output = self
            .run(
                &self.ffprobe,
                [
                    OsStr::new("-v"),
                    OsStr::new("error"),
                    OsStr::new("-show_entries"),
                    OsStr::new("format=duration"),
                    OsStr::new("-of"),
                    OsStr::new("default=noprint_wrappers=1:nokey=1"),
                    path.as_os_str(),
                ],
                cancel,
            )
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|d| d.is_finite() && *d > 0.0)
    }

    /// Extrait une frame PNG à `at` secondes, `None` si rien n'a été produit
    async fn grab(
        &self,
        path: &Path,
        at: f64,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, ConversionError> {
        let at = format!("{:.3}", at);
        let output = self
            .run(
                &self.ffmpeg,
                [
                    OsStr::new("-nostdin"),
                    OsStr::new("-loglevel"),
                    OsStr::new("error"),
                    OsStr::new("-ss"),
                    OsStr::new(&at),
                    OsStr::new("-i"),
                    path.as_os_str(),
                    OsStr::new("-frames:v"),
                    OsStr::new("1"),
                    OsStr::new("-f"),
                    OsStr::new("image2pipe"),
                    OsStr::new("-vcodec"),
                    OsStr::new("png"),
                    OsStr::new("-"),
                ],
                cancel,
            )
            .await?;

        if !output.status.success() {
            return Err(ConversionError::Tool(format!(
                "ffmpeg frame extraction failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(Some(output.stdout).filter(|bytes| !bytes.is_empty()))
    }

    /// Transcode en MP4 H.264/AAC d'une hauteur maximale `max_height`
    pub async fn transcode(
        &self,
        media: &MediaRef,
        max_height: u32,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), ConversionError> {
        // Largeur paire imposée par libx264, jamais d'agrandissement
        let scale = format!("scale=-2:'min({},ih)'", max_height);
        let result = self
            .run(
                &self.ffmpeg,
                [
                    OsStr::new("-nostdin"),
                    OsStr::new("-loglevel"),
                    OsStr::new("error"),
                    OsStr::new("-y"),
                    OsStr::new("-i"),
                    media.path.as_os_str(),
                    OsStr::new("-vf"),
                    OsStr::new(&scale),
                    OsStr::new("-c:v"),
                    OsStr::new("libx264"),
                    OsStr::new("-preset"),
                    OsStr::new("veryfast"),
                    OsStr::new("-crf"),
                    OsStr::new("23"),
                    OsStr::new("-pix_fmt"),
                    OsStr::new("yuv420p"),
                    OsStr::new("-c:a"),
                    OsStr::new("aac"),
                    OsStr::new("-movflags"),
                    OsStr::new("+faststart"),
                    OsStr::new("-f"),
                    OsStr::new("mp4"),
                    output.as_os_str(),
                ],
                cancel,
            )
            .await?;

        if !result.status.success() {
            return Err(ConversionError::Tool(format!(
                "ffmpeg transcode failed: {}",
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl FrameSource for VideoFrames {
    async fn frame(
        &self,
        media: &MediaRef,
        cancel: &CancellationToken,
    ) -> Result<DynamicImage, ConversionError> {
        let at = match self.duration(&media.path, cancel).await {
            Some(duration) => duration * self.offset,
            None => 0.0,
        };
        debug!(path = %media.path.display(), at, "Extracting video frame");

        let mut png = self.grab(&media.path, at, cancel).await?;
        if png.is_none() && at > 0.0 {
            png = self.grab(&media.path, 0.0, cancel).await?;
        }
        let png = png.ok_or_else(|| ConversionError::Decode("video has no decodable frame".into()))?;

        tokio::task::spawn_blocking(move || {
            image::load_from_memory_with_format(&png, ImageFormat::Png).map_err(ConversionError::from)
        })
        .await
        .map_err(|e| ConversionError::Decode(format!("decoder task failed: {}", e)))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use std::time::SystemTime;

    #[test]
    fn test_offset_is_clamped() {
        assert_eq!(VideoFrames::new("ffmpeg", "ffprobe", 3.0).offset, 1.0);
        assert_eq!(VideoFrames::new("ffmpeg", "ffprobe", -1.0).offset, 0.0);
        assert_eq!(
            VideoFrames::new("ffmpeg", "ffprobe", f64::NAN).offset,
            DEFAULT_FRAME_OFFSET
        );
    }

    #[tokio::test]
    async fn test_missing_tool_is_a_conversion_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("clip.mp4");
        std::fs::write(&source, b"").unwrap();

        let frames = VideoFrames::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe", 0.1);
        let media = MediaRef::new(&source, MediaKind::Video, SystemTime::now(), 0);

        let err = frames
            .frame(&media, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Tool(_)));
    }

    #[tokio::test]
    async fn test_cancelled_tool_run_stops() {
        let frames = VideoFrames::new("sleep", "sleep", 0.1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let err = frames.run("sleep", ["5"], &cancel).await.unwrap_err();
        assert!(matches!(err, ConversionError::Cancelled));
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }
}
