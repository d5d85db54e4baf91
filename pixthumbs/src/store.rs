//! Cache disque des dérivés
//!
//! Chaque dérivé est rangé sous `<racine>/<3 premiers hex>/<empreinte>.<ext>`.
//! L'écriture passe par un fichier temporaire caché du même répertoire, publié
//! par un `rename` : un lecteur ne voit jamais un fichier partiel sous le
//! chemin final.

use crate::error::PipelineError;
use crate::fingerprint::Fingerprint;
use anyhow::Result;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TEMP_SUFFIX: &str = ".tmp";

/// Dérivé publié dans le cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeEntry {
    pub path: PathBuf,
    pub content_type: &'static str,
    pub size: u64,
}

/// Statistiques d'occupation du cache
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: u64,
    pub bytes: u64,
}

/// Écriture en cours d'un dérivé
///
/// Le fichier temporaire est supprimé si le handle est abandonné sans
/// `commit` ni `abort`.
#[derive(Debug)]
pub struct WriteHandle {
    fingerprint: Fingerprint,
    temp_path: PathBuf,
    final_path: PathBuf,
    armed: bool,
}

impl WriteHandle {
    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Chemin où le convertisseur doit écrire
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }
}

impl Drop for WriteHandle {
    fn drop(&mut self) {
        if self.armed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
    }
}

fn content_type_for(extension: &str) -> &'static str {
    match extension {
        "webp" => "image/webp",
        "jpg" | "jpeg" => "image/jpeg",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

fn is_temp_name(name: &str) -> bool {
    name.starts_with('.') && name.ends_with(TEMP_SUFFIX)
}

/// Cache des dérivés adossé à un répertoire
#[derive(Debug, Clone)]
pub struct DerivativeCache {
    root: PathBuf,
}

impl DerivativeCache {
    /// Ouvre (et crée au besoin) le cache sous `root`
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Chemin final d'un dérivé, qu'il existe ou non
    pub fn path_for(&self, fp: &Fingerprint) -> PathBuf {
        self.root
            .join(fp.shard())
            .join(format!("{}.{}", fp.digest(), fp.extension()))
    }

    /// Cherche un dérivé publié. Ne bloque jamais sur une génération.
    pub async fn lookup(&self, fp: &Fingerprint) -> Option<DerivativeEntry> {
        let path = self.path_for(fp);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Some(DerivativeEntry {
                path,
                content_type: content_type_for(fp.extension()),
                size: meta.len(),
            }),
            _ => None,
        }
    }

    /// Réserve un chemin temporaire, distinct du chemin final
    pub async fn begin_write(&self, fp: &Fingerprint) -> Result<WriteHandle, PipelineError> {
        let shard_dir = self.root.join(fp.shard());
        tokio::fs::create_dir_all(&shard_dir)
            .await
            .map_err(PipelineError::cache_write_failed)?;

        let temp_name = format!(".{}.{}{}", fp.digest(), uuid::Uuid::new_v4(), TEMP_SUFFIX);
        Ok(WriteHandle {
            fingerprint: fp.clone(),
            temp_path: shard_dir.join(temp_name),
            final_path: self.path_for(fp),
            armed: true,
        })
    }

    /// Publie le fichier temporaire sous le chemin final par `rename`
    ///
    /// Un second commit pour la même empreinte remplace simplement le fichier.
    pub async fn commit(&self, mut handle: WriteHandle) -> Result<DerivativeEntry, PipelineError> {
        let meta = match tokio::fs::metadata(&handle.temp_path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(PipelineError::conversion_failed("converter produced no output"));
            }
            Err(e) => return Err(PipelineError::cache_write_failed(e)),
        };

        if meta.len() == 0 {
            return Err(PipelineError::conversion_failed("converter produced an empty file"));
        }

        tokio::fs::rename(&handle.temp_path, &handle.final_path)
            .await
            .map_err(PipelineError::cache_write_failed)?;
        handle.armed = false;

        debug!(fingerprint = %handle.fingerprint, path = %handle.final_path.display(), "Derivative published");

        Ok(DerivativeEntry {
            path: handle.final_path.clone(),
            content_type: content_type_for(handle.fingerprint.extension()),
            size: meta.len(),
        })
    }

    /// Supprime le fichier temporaire après un échec
    pub async fn abort(&self, mut handle: WriteHandle) {
        handle.armed = false;
        match tokio::fs::remove_file(&handle.temp_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %handle.temp_path.display(),
                "Cannot remove temporary derivative: {}", e
            ),
        }
    }

    /// Supprime les fichiers temporaires laissés par un arrêt brutal
    ///
    /// Retourne le nombre de fichiers supprimés. À appeler au démarrage, avant
    /// que des générations ne soient lancées.
    pub async fn consolidate(&self) -> Result<usize> {
        let mut removed = 0;
        let mut shards = tokio::fs::read_dir(&self.root).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                let name = file.file_name();
                if is_temp_name(&name.to_string_lossy()) {
                    tokio::fs::remove_file(file.path()).await?;
                    removed += 1;
                }
            }
        }

        if removed > 0 {
            info!(removed, root = %self.root.display(), "Removed leftover temporary derivatives");
        }
        Ok(removed)
    }

    /// Nombre de dérivés publiés et octets occupés
    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        let mut shards = tokio::fs::read_dir(&self.root).await?;
        while let Some(shard) = shards.next_entry().await? {
            if !shard.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(shard.path()).await?;
            while let Some(file) = files.next_entry().await? {
                if is_temp_name(&file.file_name().to_string_lossy()) {
                    continue;
                }
                let meta = file.metadata().await?;
                if meta.is_file() {
                    stats.entries += 1;
                    stats.bytes += meta.len();
                }
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaKind, MediaRef};
    use crate::render::RenderPolicy;
    use std::time::UNIX_EPOCH;

    fn sample_fp() -> Fingerprint {
        let media = MediaRef::new("/gallery/a.jpg", MediaKind::Photo, UNIX_EPOCH, 1);
        Fingerprint::compute(&media, &RenderPolicy::default().icon(MediaKind::Photo))
    }

    #[tokio::test]
    async fn test_commit_publishes_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DerivativeCache::new(dir.path()).unwrap();
        let fp = sample_fp();

        assert!(cache.lookup(&fp).await.is_none());

        let handle = cache.begin_write(&fp).await.unwrap();
        assert_ne!(handle.temp_path(), handle.final_path());
        assert_eq!(handle.temp_path().parent(), handle.final_path().parent());

        tokio::fs::write(handle.temp_path(), b"RIFFdata").await.unwrap();
        assert!(cache.lookup(&fp).await.is_none());

        let entry = cache.commit(handle).await.unwrap();
        assert_eq!(entry.size, 8);
        assert_eq!(entry.content_type, "image/webp");
        assert_eq!(cache.lookup(&fp).await, Some(entry.clone()));
        assert!(entry.path.starts_with(dir.path().join(fp.shard())));
    }

    #[tokio::test]
    async fn test_abort_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DerivativeCache::new(dir.path()).unwrap();
        let fp = sample_fp();

        let handle = cache.begin_write(&fp).await.unwrap();
        let temp = handle.temp_path().to_path_buf();
        tokio::fs::write(&temp, b"partial").await.unwrap();

        cache.abort(handle).await;
        assert!(!temp.exists());
        assert!(cache.lookup(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_commit_without_output_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DerivativeCache::new(dir.path()).unwrap();
        let fp = sample_fp();

        let handle = cache.begin_write(&fp).await.unwrap();
        let err = cache.commit(handle).await.unwrap_err();
        assert!(matches!(err, PipelineError::ConversionFailed { .. }));

        let handle = cache.begin_write(&fp).await.unwrap();
        let temp = handle.temp_path().to_path_buf();
        tokio::fs::write(&temp, b"").await.unwrap();
        assert!(cache.commit(handle).await.is_err());
        assert!(!temp.exists());
        assert!(cache.lookup(&fp).await.is_none());
    }

    #[tokio::test]
    async fn test_dropped_handle_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DerivativeCache::new(dir.path()).unwrap();

        let handle = cache.begin_write(&sample_fp()).await.unwrap();
        let temp = handle.temp_path().to_path_buf();
        std::fs::write(&temp, b"x").unwrap();
        drop(handle);
        assert!(!temp.exists());
    }

    #[tokio::test]
    async fn test_consolidate_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DerivativeCache::new(dir.path()).unwrap();
        let fp = sample_fp();

        let handle = cache.begin_write(&fp).await.unwrap();
        tokio::fs::write(handle.temp_path(), b"12345").await.unwrap();
        cache.commit(handle).await.unwrap();

        // Débris d'un arrêt brutal
        let shard = dir.path().join(fp.shard());
        std::fs::write(shard.join(".deadbeef.1234.tmp"), b"junk").unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats, CacheStats { entries: 1, bytes: 5 });

        assert_eq!(cache.consolidate().await.unwrap(), 1);
        assert_eq!(cache.consolidate().await.unwrap(), 0);
        assert!(cache.lookup(&fp).await.is_some());
    }
}
