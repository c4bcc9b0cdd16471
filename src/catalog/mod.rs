//! Content catalog
//!
//! Provides:
//! - The `Item` model shared by every pillar
//! - The `ContentCatalog` trait the engine schedules against
//! - `MemoryCatalog`, an insertion-ordered in-memory implementation with a
//!   JSON loader for the CLI

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{Difficulty, Pillar};

/// Pillar-specific item payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ItemContent {
    /// Vocabulary word with its definition
    Word { text: String, definition: String },
    /// Grammar rule with a short summary
    Rule { name: String, summary: String },
    /// Phoneme with an example word containing it
    Phoneme { symbol: String, example: String },
}

/// One practicable unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub pillar: Pillar,
    pub difficulty: Difficulty,
    pub content: ItemContent,
}

impl Item {
    /// The text detected errors are matched against: the word itself, the
    /// rule name, or the phoneme symbol.
    pub fn surface_form(&self) -> &str {
        match &self.content {
            ItemContent::Word { text, .. } => text,
            ItemContent::Rule { name, .. } => name,
            ItemContent::Phoneme { symbol, .. } => symbol,
        }
    }
}

/// Read access to the content catalog.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait ContentCatalog: Send + Sync {
    /// Fetch a single item. `NotFound` when the id is unknown.
    async fn get_item(&self, item_id: &str) -> Result<Item>;

    /// Items of one pillar in stable catalog order, optionally filtered by
    /// difficulty.
    async fn list_items(&self, pillar: Pillar, difficulty: Option<Difficulty>)
        -> Result<Vec<Item>>;

    /// Case-insensitive surface form lookup within one pillar.
    async fn find_by_surface_form(&self, pillar: Pillar, form: &str) -> Result<Option<Item>>;
}

/// In-memory catalog preserving authoring order.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    items: Vec<Item>,
    index: HashMap<String, usize>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_items(items: Vec<Item>) -> Self {
        let mut catalog = Self::new();
        for item in items {
            catalog.insert(item);
        }
        catalog
    }

    /// Parse a catalog from its JSON form, a flat array of items.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let items: Vec<Item> = serde_json::from_str(json)?;
        Ok(Self::from_items(items))
    }

    /// Add or replace an item. Replacing keeps the original catalog position.
    pub fn insert(&mut self, item: Item) {
        match self.index.get(&item.id) {
            Some(&pos) => self.items[pos] = item,
            None => {
                self.index.insert(item.id.clone(), self.items.len());
                self.items.push(item);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait::async_trait]
impl ContentCatalog for MemoryCatalog {
    async fn get_item(&self, item_id: &str) -> Result<Item> {
        self.index
            .get(item_id)
            .map(|&pos| self.items[pos].clone())
            .ok_or_else(|| Error::not_found(format!("item {}", item_id)))
    }

    async fn list_items(
        &self,
        pillar: Pillar,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Item>> {
        Ok(self
            .items
            .iter()
            .filter(|item| item.pillar == pillar)
            .filter(|item| difficulty.map_or(true, |d| item.difficulty == d))
            .cloned()
            .collect())
    }

    async fn find_by_surface_form(&self, pillar: Pillar, form: &str) -> Result<Option<Item>> {
        let needle = form.trim().to_lowercase();
        Ok(self
            .items
            .iter()
            .find(|item| item.pillar == pillar && item.surface_form().to_lowercase() == needle)
            .cloned())
    }
}
