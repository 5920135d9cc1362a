//! Loading work items from a JSON file.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::state_machine::WorkItem;

/// On-disk shape of an item. Items without an id get a generated one.
#[derive(Debug, Deserialize)]
struct InputItem {
    #[serde(default)]
    id: Option<IdValue>,
    payload: Value,
}

/// Ids may be written as strings or numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum IdValue {
    Text(String),
    Number(serde_json::Number),
}

impl From<InputItem> for WorkItem {
    fn from(raw: InputItem) -> Self {
        match raw.id {
            Some(IdValue::Text(id)) => WorkItem::new(id, raw.payload),
            Some(IdValue::Number(n)) => WorkItem::new(n.to_string(), raw.payload),
            None => WorkItem::anonymous(raw.payload),
        }
    }
}

pub fn parse_items(json: &str) -> Result<Vec<WorkItem>> {
    let raw: Vec<InputItem> =
        serde_json::from_str(json).context("input must be a JSON array of {\"id\", \"payload\"} objects")?;
    Ok(raw.into_iter().map(WorkItem::from).collect())
}

pub fn load_items(path: &Path) -> Result<Vec<WorkItem>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read input {}", path.display()))?;
    parse_items(&contents).with_context(|| format!("invalid input {}", path.display()))
}
