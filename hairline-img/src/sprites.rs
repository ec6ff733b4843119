use crate::catalog::{Catalog, HairstyleId};
use anyhow::{Context, Error, Result};
use futures::future::join_all;
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

pub trait SpriteLoader {
    fn load(&self, sprite: &str) -> impl Future<Output = Result<RgbaImage>>;
}

/// Reads sprites from disk, relative to `root`.
pub struct FsSpriteLoader {
    root: PathBuf,
}

impl FsSpriteLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SpriteLoader for FsSpriteLoader {
    async fn load(&self, sprite: &str) -> Result<RgbaImage> {
        let path = self.root.join(sprite);
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let img = image::load_from_memory(&bytes)
            .with_context(|| format!("decoding {}", path.display()))?;
        Ok(img.into_rgba8())
    }
}

/// Decoded hair sprites keyed by hairstyle. Filled once before tracking
/// starts, then shared read-only.
#[derive(Debug, Default)]
pub struct SpriteCache {
    sprites: HashMap<HairstyleId, Arc<RgbaImage>>,
    failed: HashSet<HairstyleId>,
}

impl SpriteCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every sprite in `catalog` that is not cached yet. All loads run
    /// concurrently; a failed one is logged and left out, the rest still land.
    pub async fn load<L: SpriteLoader>(&mut self, catalog: &Catalog, loader: &L) {
        let pending = catalog
            .iter()
            .filter(|style| !self.sprites.contains_key(&style.id))
            .map(|style| async move {
                let outcome = loader.load(&style.sprite).await.and_then(|img| {
                    if img.width() == 0 || img.height() == 0 {
                        Err(Error::msg("sprite has no pixels"))
                    } else {
                        Ok(img)
                    }
                });
                (style, outcome)
            });

        for (style, outcome) in join_all(pending).await {
            match outcome {
                Ok(img) => {
                    debug!("Loaded sprite {} ({}x{})", style.name, img.width(), img.height());
                    self.insert(style.id, img);
                }
                Err(e) => {
                    warn!("Failed to load sprite for {} ({}): {e:?}", style.name, style.id);
                    self.failed.insert(style.id);
                }
            }
        }
    }

    /// Caches an already decoded sprite, replacing any earlier one.
    pub fn insert(&mut self, id: HairstyleId, sprite: RgbaImage) {
        self.failed.remove(&id);
        self.sprites.insert(id, Arc::new(sprite));
    }

    pub fn get(&self, id: HairstyleId) -> Option<Arc<RgbaImage>> {
        self.sprites.get(&id).cloned()
    }

    pub fn failed(&self, id: HairstyleId) -> bool {
        self.failed.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.sprites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sprites.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Mutex;

    /// Serves a 4x6 sprite for everything except `missing`.
    struct StubLoader {
        missing: &'static str,
        calls: Mutex<Vec<String>>,
    }

    impl StubLoader {
        fn new(missing: &'static str) -> Self {
            Self {
                missing,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl SpriteLoader for StubLoader {
        async fn load(&self, sprite: &str) -> Result<RgbaImage> {
            self.calls.lock().unwrap().push(sprite.to_string());
            tokio::task::yield_now().await;
            if sprite == self.missing {
                anyhow::bail!("404 {sprite}");
            }
            Ok(RgbaImage::from_pixel(4, 6, Rgba([1, 2, 3, 255])))
        }
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let catalog = Catalog::builtin().unwrap();
        let loader = StubLoader::new("hair2d/classic-cut.png");
        let mut cache = SpriteCache::new();
        cache.load(&catalog, &loader).await;

        assert_eq!(cache.len(), 3);
        assert!(cache.get(3).is_none());
        assert!(cache.failed(3));
        for id in [1, 2, 4] {
            assert_eq!(cache.get(id).unwrap().dimensions(), (4, 6));
            assert!(!cache.failed(id));
        }
    }

    #[tokio::test]
    async fn test_cached_sprites_not_reloaded() {
        let catalog = Catalog::builtin().unwrap();
        let loader = StubLoader::new("hair2d/classic-cut.png");
        let mut cache = SpriteCache::new();
        cache.load(&catalog, &loader).await;
        cache.load(&catalog, &loader).await;

        let calls = loader.calls.lock().unwrap();
        assert_eq!(calls.len(), 5);
        assert_eq!(
            calls.iter().filter(|c| *c == "hair2d/classic-cut.png").count(),
            2
        );
    }

    #[tokio::test]
    async fn test_fs_loader_reports_missing_file() {
        let loader = FsSpriteLoader::new("/nonexistent/sprites");
        let err = loader.load("nope.png").await.unwrap_err();
        assert!(format!("{err:#}").contains("nope.png"));
    }
}
