//! Prompt assembly.
//!
//! Prompt wording is opaque to this subsystem: the caller supplies a system
//! prompt and a per-item template, and the orchestrator only interpolates
//! item metadata into the template. `{sourceBody}` carries the source
//! artifact text for summary runs and renders empty otherwise.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptSpec {
    pub system: String,
    pub template: String,
}

/// One unit of generation work: an item (and, for summary runs, the source
/// artifact body to summarize).
#[derive(Debug, Clone)]
pub struct TaskItem {
    pub item_id: String,
    pub category: String,
    pub title: String,
    pub source_body: Option<String>,
}

pub fn render_prompt(template: &str, item: &TaskItem) -> String {
    template
        .replace("{itemId}", &item.item_id)
        .replace("{category}", &item.category)
        .replace("{title}", &item.title)
        .replace("{sourceBody}", item.source_body.as_deref().unwrap_or(""))
}
