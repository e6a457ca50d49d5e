use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::sync::{FieldValue, SyncStatus};

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

pub fn status_cell(status: SyncStatus) -> Cell {
    let cell = Cell::new(status.to_string());
    match status {
        SyncStatus::Success => cell.fg(TableColor::Green),
        SyncStatus::Partial => cell.fg(TableColor::Yellow),
        SyncStatus::Skipped => cell.fg(TableColor::DarkGrey),
        SyncStatus::Failed => cell.fg(TableColor::Red),
    }
}

pub fn value_cell(value: &FieldValue) -> Cell {
    let cell = Cell::new(value.describe());
    match value {
        FieldValue::Set { .. } => cell.fg(TableColor::Green),
        FieldValue::Unset | FieldValue::NotPresent => cell.fg(TableColor::DarkGrey),
        FieldValue::Invalid { .. } => cell.fg(TableColor::Red),
    }
}
