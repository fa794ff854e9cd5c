//! JSON name index for client-side autocomplete.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;

use crate::db;

#[derive(Serialize)]
struct IndexEntry {
    name: String,
    vivc_id: String,
}

/// Write the grape name index (`[{name, vivc_id}]`, name order) to `path`.
/// Returns the number of entries written.
pub fn write_name_index(conn: &Connection, path: &Path) -> Result<usize> {
    let entries: Vec<IndexEntry> = db::name_index(conn)?
        .into_iter()
        .map(|(name, vivc_id)| IndexEntry { name, vivc_id })
        .collect();

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(&entries)?;
    std::fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(entries.len())
}

// ── Tests ──
