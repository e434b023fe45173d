//! Menu Catalog
//!
//! The fixed, ordered list of lunch items a session can pick from.
//! Loaded once at startup and never mutated afterwards.

use std::collections::HashSet;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Image proxy used for stable, resized thumbnails
const IMAGE_PROXY: &str = "https://wsrv.nl/";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("catalog must contain at least one menu item")]
    Empty,
    #[error("duplicate menu id '{0}'")]
    DuplicateId(String),
    #[error("duplicate menu name '{0}'")]
    DuplicateName(String),
}

/// A single selectable lunch item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Stable identifier, used as the ledger key
    pub id: String,
    /// Display name, also the key recommendations are matched against
    pub name: String,
    /// Image reference
    pub image: String,
    /// Color tag for presentation
    pub color: String,
    pub tags: Vec<String>,
}

impl MenuItem {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        image: impl Into<String>,
        color: impl Into<String>,
        tags: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            image: image.into(),
            color: color.into(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// Wraps a source image URL with the proxy's resize/format parameters.
pub fn proxy_image_url(url: &str) -> String {
    format!(
        "{}?url={}&w=600&h=600&fit=cover&output=webp&q=80",
        IMAGE_PROXY,
        urlencoding::encode(url)
    )
}

/// Immutable, ordered menu catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Catalog {
    items: Vec<MenuItem>,
}

impl Catalog {
    pub fn new(items: Vec<MenuItem>) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Empty);
        }

        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for item in &items {
            if !ids.insert(item.id.as_str()) {
                return Err(CatalogError::DuplicateId(item.id.clone()));
            }
            if !names.insert(item.name.as_str()) {
                return Err(CatalogError::DuplicateName(item.name.clone()));
            }
        }

        Ok(Self { items })
    }

    /// The Green FC stew lineup
    pub fn green_fc() -> Self {
        Self {
            items: vec![
                MenuItem::new(
                    "sundubu",
                    "순두부찌개",
                    proxy_image_url("https://images.unsplash.com/photo-1583000292276-646ca0572b93?auto=format&fit=crop&q=80&w=600"),
                    "bg-red-500",
                    &["매콤", "부드러움", "단백질"],
                ),
                MenuItem::new(
                    "kimchi",
                    "김치찌개",
                    proxy_image_url("https://images.unsplash.com/photo-1541696432-82c6da8ce7bf?auto=format&fit=crop&q=80&w=600"),
                    "bg-orange-500",
                    &["얼큰", "한국인의맛", "든든"],
                ),
                MenuItem::new(
                    "dongtae",
                    "동태탕",
                    proxy_image_url("https://images.unsplash.com/photo-1559737558-2f5a35f4523b?auto=format&fit=crop&q=80&w=600"),
                    "bg-blue-500",
                    &["시원", "해산물", "피로회복"],
                ),
                MenuItem::new(
                    "seonji",
                    "선지해장국",
                    proxy_image_url("https://images.unsplash.com/photo-1547592166-23ac45744acd?auto=format&fit=crop&q=80&w=600"),
                    "bg-red-900",
                    &["철분왕", "에너지", "전통의맛"],
                ),
            ],
        }
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Exact, case-sensitive lookup by display name
    pub fn find_by_name(&self, name: &str) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.name == name)
    }

    pub fn contains_id(&self, id: &str) -> bool {
        self.find_by_id(id).is_some()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name.as_str()).collect()
    }

    /// Uniformly samples one item.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> &MenuItem {
        &self.items[rng.gen_range(0..self.items.len())]
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::green_fc()
    }
}
