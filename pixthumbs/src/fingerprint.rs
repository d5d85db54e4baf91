//! Clé de cache déterministe d'un dérivé
//!
//! L'empreinte est un SHA-256 tronqué à 16 octets (32 caractères hex) d'un
//! enregistrement délimité par longueurs : deux entrées distinctes ne peuvent
//! pas produire le même flux d'octets par simple concaténation.

use crate::media::MediaRef;
use crate::render::RenderSpec;
use sha2::{Digest, Sha256};
use std::fmt;

/// Révision des algorithmes de rendu (choix de la frame vidéo, filtre de
/// redimensionnement, paramètres d'encodage). À incrémenter à chaque
/// changement pour que les anciens dérivés ne soient plus servis.
pub const RENDER_REVISION: u32 = 1;

/// Empreinte d'un couple (source, dérivé)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    digest: String,
    extension: &'static str,
}

impl Fingerprint {
    /// Calcule l'empreinte. Fonction pure : aucune E/S, aucun état global.
    ///
    /// `spec.target_size` doit déjà avoir été ramenée dans la liste blanche.
    pub fn compute(media: &MediaRef, spec: &RenderSpec) -> Self {
        let mut hasher = Sha256::new();

        let mut field = |bytes: &[u8]| {
            hasher.update((bytes.len() as u64).to_be_bytes());
            hasher.update(bytes);
        };

        field(&RENDER_REVISION.to_be_bytes());
        field(media.path.as_os_str().as_encoded_bytes());
        field(&media.mtime_nanos().to_be_bytes());
        field(spec.kind.as_str().as_bytes());
        field(&spec.target_size.to_be_bytes());
        field(spec.source_kind.as_str().as_bytes());
        field(spec.format.as_str().as_bytes());

        let result = hasher.finalize();
        Self {
            digest: hex::encode(&result[..16]),
            extension: spec.extension(),
        }
    }

    /// Les 32 caractères hexadécimaux
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Extension du fichier dérivé (`webp`, `jpg`, `mp4`)
    pub fn extension(&self) -> &'static str {
        self.extension
    }

    /// Préfixe de répartition en sous-répertoires
    pub fn shard(&self) -> &str {
        &self.digest[..3]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digest)
    }
}

/// Raccourci pour [`Fingerprint::compute`]
pub fn fingerprint(media: &MediaRef, spec: &RenderSpec) -> Fingerprint {
    Fingerprint::compute(media, spec)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaKind;
    use crate::render::{DerivativeKind, OutputFormat, RenderPolicy};
    use std::collections::HashSet;
    use std::time::{Duration, UNIX_EPOCH};

    fn photo(path: &str, secs: u64) -> MediaRef {
        MediaRef::new(path, MediaKind::Photo, UNIX_EPOCH + Duration::from_secs(secs), 10)
    }

    #[test]
    fn test_deterministic() {
        let policy = RenderPolicy::default();
        let media = photo("/gallery/photo.jpg", 1000);
        let spec = policy.thumbnail(MediaKind::Photo, Some(240));

        let a = fingerprint(&media, &spec);
        let b = fingerprint(&media.clone(), &spec);
        assert_eq!(a, b);
        assert_eq!(a.digest().len(), 32);
        assert_eq!(a.extension(), "webp");
        assert_eq!(a.shard(), &a.digest()[..3]);
    }

    #[test]
    fn test_size_is_not_an_input() {
        let policy = RenderPolicy::default();
        let spec = policy.icon(MediaKind::Photo);
        let mut media = photo("/gallery/photo.jpg", 1000);
        let before = fingerprint(&media, &spec);
        media.size = 99_999;
        assert_eq!(before, fingerprint(&media, &spec));
    }

    #[test]
    fn test_every_field_changes_the_digest() {
        let base_media = photo("/gallery/photo.jpg", 1000);
        let base_spec = RenderSpec {
            kind: DerivativeKind::Thumbnail,
            target_size: 240,
            source_kind: MediaKind::Photo,
            format: OutputFormat::Webp,
        };

        let variants = vec![
            (base_media.clone(), base_spec),
            (photo("/gallery/other.jpg", 1000), base_spec),
            (
                MediaRef {
                    mtime: base_media.mtime + Duration::from_nanos(1),
                    ..base_media.clone()
                },
                base_spec,
            ),
            (base_media.clone(), RenderSpec { kind: DerivativeKind::Icon, ..base_spec }),
            (base_media.clone(), RenderSpec { kind: DerivativeKind::BestFit, ..base_spec }),
            (base_media.clone(), RenderSpec { target_size: 480, ..base_spec }),
            (base_media.clone(), RenderSpec { source_kind: MediaKind::Video, ..base_spec }),
            (base_media.clone(), RenderSpec { format: OutputFormat::Jpeg, ..base_spec }),
        ];

        let digests: HashSet<String> = variants
            .iter()
            .map(|(m, s)| fingerprint(m, s).digest().to_string())
            .collect();
        assert_eq!(digests.len(), variants.len());
    }
}
