//! Jeton de version d'un répertoire
//!
//! Sert à invalider côté client le listing d'un répertoire. Il ne dépend que
//! du nombre d'entrées, de la plus récente date de modification et de la date
//! du répertoire lui-même. Il est indépendant des empreintes des dérivés :
//! modifier une photo ne change que l'empreinte de cette photo.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VersionToken(String);

fn nanos(t: SystemTime) -> i128 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i128,
        Err(e) => -(e.duration().as_nanos() as i128),
    }
}

impl VersionToken {
    /// Calcule le jeton à partir des dates du listing
    pub fn compute<I>(dir_mtime: Option<SystemTime>, entry_mtimes: I) -> Self
    where
        I: IntoIterator<Item = SystemTime>,
    {
        let mut count: u64 = 0;
        let mut newest: Option<SystemTime> = None;
        for mtime in entry_mtimes {
            count += 1;
            newest = Some(newest.map_or(mtime, |n| n.max(mtime)));
        }

        let mut hasher = Sha256::new();
        hasher.update(count.to_be_bytes());
        hasher.update(newest.map(nanos).unwrap_or_default().to_be_bytes());
        hasher.update(dir_mtime.map(nanos).unwrap_or_default().to_be_bytes());
        let result = hasher.finalize();
        Self(hex::encode(&result[..8]))
    }

    /// Lit le répertoire et calcule son jeton (entrées cachées ignorées)
    pub async fn for_directory(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let dir_mtime = tokio::fs::metadata(path).await?.modified().ok();

        let mut mtimes = Vec::new();
        let mut entries = tokio::fs::read_dir(path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            if let Ok(mtime) = entry.metadata().await.and_then(|m| m.modified()) {
                mtimes.push(mtime);
            }
        }

        Ok(Self::compute(dir_mtime, mtimes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
