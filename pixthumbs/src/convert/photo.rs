use super::FrameSource;
use crate::error::ConversionError;
use crate::media::MediaRef;
use async_trait::async_trait;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use tokio_util::sync::CancellationToken;

/// Décodage des photos avec le crate `image`, orientation EXIF appliquée
#[derive(Debug, Clone, Copy, Default)]
pub struct PhotoFrames;

#[async_trait]
impl FrameSource for PhotoFrames {
    async fn frame(
        &self,
        media: &MediaRef,
        cancel: &CancellationToken,
    ) -> Result<DynamicImage, ConversionError> {
        let bytes = tokio::fs::read(&media.path)
            .await
            .map_err(ConversionError::Source)?;
        let hint = ImageFormat::from_path(&media.path).ok();
        if cancel.is_cancelled() {
            return Err(ConversionError::Cancelled);
        }

        tokio::task::spawn_blocking(move || decode_oriented(bytes, hint))
            .await
            .map_err(|e| ConversionError::Decode(format!("decoder task failed: {}", e)))?
    }
}

fn decode_oriented(
    bytes: Vec<u8>,
    hint: Option<ImageFormat>,
) -> Result<DynamicImage, ConversionError> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    if let Some(format) = hint {
        reader.set_format(format);
    }
    // Le contenu prime sur l'extension
    let reader = reader
        .with_guessed_format()
        .map_err(|e| ConversionError::Decode(e.to_string()))?;

    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut img = DynamicImage::from_decoder(decoder)?;
    img.apply_orientation(orientation);
    Ok(img)
}
