//! Checklist item catalog — external input, read-only.
//!
//! The catalog is a static enumerable list of assessment checklist items
//! supplied as a JSON file at startup. This subsystem never creates, edits,
//! or deletes items; it only fans generation out over them.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One assessment checklist item. Unique by `item_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistItem {
    pub item_id: String,
    pub category: String,
    pub title: String,
}

/// The full checklist catalog, held in memory for the process lifetime.
/// Items are kept sorted by (category, item_id) so every generation run
/// walks them in the same order.
#[derive(Debug, Clone)]
pub struct ChecklistCatalog {
    items: Vec<ChecklistItem>,
}

impl ChecklistCatalog {
    pub fn new(mut items: Vec<ChecklistItem>) -> Self {
        items.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.item_id.cmp(&b.item_id))
        });
        items.dedup_by(|a, b| a.item_id == b.item_id);
        Self { items }
    }

    pub fn load(path: &str) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read checklist catalog at '{path}'"))?;
        let items: Vec<ChecklistItem> = serde_json::from_str(&raw)
            .with_context(|| format!("Checklist catalog at '{path}' is not a valid JSON array"))?;
        if items.is_empty() {
            anyhow::bail!("Checklist catalog at '{path}' is empty");
        }
        let catalog = Self::new(items);
        info!("Loaded {} checklist items from {path}", catalog.len());
        Ok(catalog)
    }

    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}
