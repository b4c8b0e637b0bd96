//! Export of scored tables and summaries.
//!
//! Supports CSV for the long-format per-key table and JSON for summaries.

use anyhow::Result;
use csv::WriterBuilder;
use std::io::Write;
use tracing::debug;

use crate::scoring::{ScoreTable, StratifiedEvaluation, Summary};

/// Writes the per-key scores as CSV: the time column, the extra
/// independent columns, then every numeric column of the table.
pub fn write_scores_csv<W: Write>(table: &ScoreTable, writer: W) -> Result<()> {
    let names = table.column_names();
    let columns: Vec<Vec<f64>> = names
        .iter()
        .map(|n| table.column(n).unwrap_or_default())
        .collect();

    let mut writer = WriterBuilder::new().from_writer(writer);

    let mut header = vec![table.t_col.clone()];
    header.extend(table.other_ind_cols.iter().cloned());
    header.extend(names.iter().cloned());
    writer.write_record(&header)?;

    for (i, row) in table.rows.iter().enumerate() {
        let mut record = vec![row.key.t.format("%Y-%m-%d").to_string()];
        record.extend(row.key.others.iter().cloned());
        record.extend(columns.iter().map(|c| c[i].to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;

    debug!(rows = table.len(), columns = header.len(), "Scores written as CSV");
    Ok(())
}

/// Renders a summary as pretty-printed JSON using its flat field names.
pub fn summary_json(summary: &Summary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&summary.to_flat_map())
}

/// Renders one JSON object per stratum: its tags followed by its flat
/// summary fields.
pub fn stratified_summary_json(result: &StratifiedEvaluation) -> serde_json::Result<String> {
    let records: Vec<serde_json::Value> = result
        .tagged_rows()
        .map(|(tags, eval)| {
            let mut obj = serde_json::Map::new();
            for (col, value) in tags {
                obj.insert(col.to_string(), serde_json::Value::from(value));
            }
            for (name, value) in eval.summary.to_flat_map() {
                // NaN has no JSON form and is written as null
                obj.insert(name, serde_json::Value::from(value));
            }
            serde_json::Value::Object(obj)
        })
        .collect();
    serde_json::to_string_pretty(&records)
}
