//! Extension pour intégrer la galerie dans pixconfig
//!
//! Ce module fournit le trait `GalleryConfigExt` qui ajoute à
//! `pixconfig::Config` le répertoire racine de la galerie.

use crate::library::Gallery;
use anyhow::Result;
use pixconfig::Config;

const DEFAULT_GALLERY_DIR: &str = "images";

/// Trait d'extension pour gérer la galerie dans pixconfig
///
/// # Exemple
///
/// ```rust,ignore
/// use pixconfig::get_config;
/// use pixcontent::GalleryConfigExt;
///
/// let gallery = get_config().create_gallery()?;
/// println!("{}", gallery.root().display());
/// ```
pub trait GalleryConfigExt {
    /// Répertoire racine des photos et vidéos (default: "images")
    ///
    /// Un chemin relatif est résolu par rapport au répertoire de configuration.
    fn get_gallery_dir(&self) -> Result<String>;

    fn set_gallery_dir(&self, directory: String) -> Result<()>;

    fn create_gallery(&self) -> Result<Gallery>;
}

impl GalleryConfigExt for Config {
    fn get_gallery_dir(&self) -> Result<String> {
        self.get_managed_dir(&["gallery", "directory"], DEFAULT_GALLERY_DIR)
    }

    fn set_gallery_dir(&self, directory: String) -> Result<()> {
        self.set_managed_dir(&["gallery", "directory"], directory)
    }

    fn create_gallery(&self) -> Result<Gallery> {
        Ok(Gallery::new(self.get_gallery_dir()?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gallery_dir_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        config.set_gallery_dir("photos".to_string()).unwrap();
        let gallery_dir = config.get_gallery_dir().unwrap();
        assert!(std::path::Path::new(&gallery_dir).ends_with("photos"));

        let gallery = config.create_gallery().unwrap();
        assert!(gallery.root().is_dir());
    }
}
