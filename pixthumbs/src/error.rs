//! Taxonomie des erreurs du pipeline de génération
//!
//! Les raisons sont portées sous forme de `String` pour que [`PipelineError`]
//! soit `Clone` : un même résultat est diffusé à tous les demandeurs d'un job.

use thiserror::Error;

/// Erreur renvoyée par [`crate::GenerationCoordinator::get_or_create`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    /// Fichier source disparu ou illisible avant le début de la conversion
    #[error("source unavailable: {reason}")]
    SourceUnavailable { reason: String },

    /// Erreur de décodage ou d'encodage, média corrompu
    #[error("conversion failed: {reason}")]
    ConversionFailed { reason: String },

    /// Erreur d'entrée/sortie lors de la persistance du dérivé
    #[error("cache write failed: {reason}")]
    CacheWriteFailed { reason: String },

    /// File d'attente pleine, réessayer plus tard
    #[error("conversion pool saturated")]
    PoolSaturated,

    /// Le job a dépassé son délai
    #[error("conversion timed out")]
    Timeout,
}

impl PipelineError {
    pub fn source_unavailable(reason: impl ToString) -> Self {
        Self::SourceUnavailable {
            reason: reason.to_string(),
        }
    }

    pub fn conversion_failed(reason: impl ToString) -> Self {
        Self::ConversionFailed {
            reason: reason.to_string(),
        }
    }

    pub fn cache_write_failed(reason: impl ToString) -> Self {
        Self::CacheWriteFailed {
            reason: reason.to_string(),
        }
    }

    /// Vrai si l'appelant peut raisonnablement réessayer bientôt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolSaturated | Self::Timeout)
    }
}

/// Erreur d'un convertisseur, avant traduction en [`PipelineError`]
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("cannot read source: {0}")]
    Source(#[source] std::io::Error),

    #[error("cannot decode media: {0}")]
    Decode(String),

    #[error("cannot encode derivative: {0}")]
    Encode(String),

    #[error("external tool failed: {0}")]
    Tool(String),

    #[error("cannot write derivative: {0}")]
    Write(#[source] std::io::Error),

    /// Conversion interrompue après dépassement du délai
    #[error("conversion cancelled")]
    Cancelled,
}

impl From<ConversionError> for PipelineError {
    fn from(err: ConversionError) -> Self {
        match err {
            ConversionError::Source(e) => PipelineError::source_unavailable(e),
            ConversionError::Write(e) => PipelineError::cache_write_failed(e),
            ConversionError::Cancelled => PipelineError::Timeout,
            other => PipelineError::conversion_failed(other),
        }
    }
}

impl From<image::ImageError> for ConversionError {
    fn from(err: image::ImageError) -> Self {
        // Les octets sont déjà en mémoire : une erreur d'E/S ici vient d'un flux tronqué
        match err {
            image::ImageError::Encoding(e) => ConversionError::Encode(e.to_string()),
            other => ConversionError::Decode(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(PipelineError::PoolSaturated.is_retryable());
        assert!(PipelineError::Timeout.is_retryable());
        assert!(!PipelineError::conversion_failed("bad").is_retryable());
    }

    #[test]
    fn test_conversion_error_mapping() {
        let err: PipelineError = ConversionError::Decode("truncated".into()).into();
        assert!(matches!(err, PipelineError::ConversionFailed { .. }));

        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = ConversionError::Source(io).into();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));

        let err: PipelineError = ConversionError::Cancelled.into();
        assert_eq!(err, PipelineError::Timeout);
    }
}
