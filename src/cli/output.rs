//! CLI output: error mapping and presentation of command results.

use crate::error::StackError;
use crate::store::ObjectRecord;
use comfy_table::Table;
use serde::Serialize;

/// Map stack errors to a string for CLI output.
pub fn map_error(e: &StackError) -> String {
    e.to_string()
}

/// What a demo run did.
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub entity: String,
    pub workers: usize,
    pub committed: usize,
    pub merged_into_primary: usize,
    pub primary_objects: usize,
    pub stored_objects: usize,
    pub threads_still_registered: usize,
}

pub fn format_demo_report(report: &DemoReport) -> String {
    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Workers".to_string(), report.workers.to_string()]);
    table.add_row(vec![
        format!("{} records committed", report.entity),
        report.committed.to_string(),
    ]);
    table.add_row(vec![
        "Merges run on primary".to_string(),
        report.merged_into_primary.to_string(),
    ]);
    table.add_row(vec![
        "Objects in primary context".to_string(),
        report.primary_objects.to_string(),
    ]);
    table.add_row(vec![
        "Objects in store".to_string(),
        report.stored_objects.to_string(),
    ]);
    table.add_row(vec![
        "Threads still registered".to_string(),
        report.threads_still_registered.to_string(),
    ]);
    table.to_string()
}

pub fn format_records_table(entity: &str, records: &[ObjectRecord]) -> String {
    if records.is_empty() {
        return format!("No {} objects stored.", entity);
    }
    let mut columns: Vec<&str> = records
        .iter()
        .flat_map(|record| record.properties.keys().map(String::as_str))
        .collect();
    columns.sort_unstable();
    columns.dedup();

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_FULL);
    let mut header = vec!["Id".to_string()];
    header.extend(columns.iter().map(|c| c.to_string()));
    table.set_header(header);
    for record in records {
        let mut row = vec![record.id.to_string()];
        row.extend(columns.iter().map(|column| match record.get(column) {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Null) | None => "-".to_string(),
            Some(other) => other.to_string(),
        }));
        table.add_row(row);
    }
    format!("{}\n{} {} objects", table, records.len(), entity)
}

pub fn format_records_json(records: &[ObjectRecord]) -> Result<String, StackError> {
    serde_json::to_string_pretty(records)
        .map_err(|e| StackError::Configuration(format!("Failed to render JSON: {}", e)))
}
