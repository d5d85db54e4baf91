//! Erreurs de résolution du contenu de la galerie

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContentError {
    /// Chemin sortant de la racine de la galerie (`..`, lien symbolique)
    #[error("path escapes the gallery root")]
    Traversal,

    #[error("no such entry: {0}")]
    NotFound(String),

    /// Fichier présent mais ni photo ni vidéo reconnue
    #[error("unsupported media: {0}")]
    Unsupported(String),

    #[error("gallery root is not a directory: {0}")]
    InvalidRoot(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ContentError {
    pub(crate) fn from_io(err: std::io::Error, what: &str) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound | ErrorKind::NotADirectory => Self::NotFound(what.to_string()),
            _ => Self::Io(err),
        }
    }
}
