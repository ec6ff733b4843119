use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

const BUILTIN_CATALOG: &str = include_str!("../assets/catalog.toml");

pub type HairstyleId = u32;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid catalog: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("hairstyle id {0} appears more than once")]
    DuplicateId(HairstyleId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Short,
    Medium,
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Female,
    Male,
    Unisex,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HairstyleOption {
    pub id: HairstyleId,
    pub name: String,
    pub category: Category,
    pub hair_type: String,
    pub gender: Gender,
    /// Sprite image, relative to the sprite root.
    pub sprite: String,
    /// Mirror the sprite left to right before placing it.
    #[serde(default)]
    pub flip_horizontal: bool,
    /// Mirror the sprite top to bottom before placing it.
    #[serde(default)]
    pub flip_vertical: bool,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(rename = "style", default)]
    styles: Vec<HairstyleOption>,
}

/// The hairstyles offered by the kiosk, in display order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    styles: Vec<HairstyleOption>,
}

impl Catalog {
    pub fn new(styles: Vec<HairstyleOption>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::new();
        for style in &styles {
            if !seen.insert(style.id) {
                return Err(CatalogError::DuplicateId(style.id));
            }
        }
        Ok(Self { styles })
    }

    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let src = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&src)
    }

    pub fn from_toml(src: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(src)?;
        Self::new(file.styles)
    }

    pub fn get(&self, id: HairstyleId) -> Option<&HairstyleOption> {
        self.styles.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HairstyleOption> {
        self.styles.iter()
    }

    pub fn len(&self) -> usize {
        self.styles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty()
    }
}
