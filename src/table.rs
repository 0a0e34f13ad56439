//! Tabular results
//!
//! Query results travel through the pipeline as polars `DataFrame`s. This module
//! builds them from warehouse row sets and turns them back into JSON and markdown
//! for the page and for the chart-code service.

use crate::error::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

/// Rows shown in the table panel
pub const PREVIEW_ROWS: usize = 100;

/// Rows sent to the chart-code service as context
pub const MARKDOWN_ROWS: usize = 5;

/// Column type as reported by the warehouse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    Number,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
}

/// Build a DataFrame from a row-major set of optional text cells
pub fn frame_from_rowset(columns: &[ColumnSpec], rows: &[Vec<Option<String>>]) -> Result<DataFrame> {
    let mut series = Vec::with_capacity(columns.len());

    for (idx, column) in columns.iter().enumerate() {
        let cells: Vec<Option<String>> = rows
            .iter()
            .map(|row| row.get(idx).cloned().flatten())
            .collect();
        let text = Series::new(column.name.as_str(), cells);
        let typed = match column.kind {
            ColumnKind::Number => text.cast(&DataType::Float64)?,
            ColumnKind::Text => text,
        };
        series.push(typed);
    }

    Ok(DataFrame::new(series)?)
}

/// First `PREVIEW_ROWS` rows of a result
pub fn preview(df: &DataFrame) -> DataFrame {
    df.head(Some(PREVIEW_ROWS))
}

/// Column names and row-major JSON cells for the first `limit` rows
pub fn frame_to_json(df: &DataFrame, limit: usize) -> Result<serde_json::Value> {
    let sample = df.head(Some(limit));
    let columns: Vec<String> = sample.get_column_names().iter().map(|s| s.to_string()).collect();

    let mut rows = Vec::with_capacity(sample.height());
    for row_idx in 0..sample.height() {
        let mut row = Vec::with_capacity(columns.len());
        for series in sample.get_columns() {
            row.push(cell_json(&series.get(row_idx)?));
        }
        rows.push(serde_json::Value::Array(row));
    }

    Ok(serde_json::json!({
        "columns": columns,
        "rows": rows,
        "row_count": df.height(),
    }))
}

/// Markdown table of the first `limit` rows
pub fn frame_to_markdown(df: &DataFrame, limit: usize) -> Result<String> {
    let sample = df.head(Some(limit));
    let columns: Vec<&str> = sample.get_column_names();

    let mut out = String::new();
    out.push_str(&format!("| {} |\n", columns.join(" | ")));
    out.push_str(&format!("|{}\n", "---|".repeat(columns.len())));

    for row_idx in 0..sample.height() {
        let mut cells = Vec::with_capacity(columns.len());
        for series in sample.get_columns() {
            cells.push(cell_text(&series.get(row_idx)?));
        }
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }

    Ok(out)
}

/// Plain text rendering of a single cell
pub fn cell_text(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Float32(v) => v.to_string(),
        AnyValue::Float64(v) => v.to_string(),
        AnyValue::Int64(v) => v.to_string(),
        AnyValue::Int32(v) => v.to_string(),
        other => format!("{}", other),
    }
}

/// Numeric view of a cell, used when plotting
pub fn cell_number(value: &AnyValue) -> Option<f64> {
    match value {
        AnyValue::Int8(v) => Some(*v as f64),
        AnyValue::Int16(v) => Some(*v as f64),
        AnyValue::Int32(v) => Some(*v as f64),
        AnyValue::Int64(v) => Some(*v as f64),
        AnyValue::UInt8(v) => Some(*v as f64),
        AnyValue::UInt16(v) => Some(*v as f64),
        AnyValue::UInt32(v) => Some(*v as f64),
        AnyValue::UInt64(v) => Some(*v as f64),
        AnyValue::Float32(v) => Some(*v as f64),
        AnyValue::Float64(v) => Some(*v),
        _ => None,
    }
}

/// JSON view of a single cell
pub fn cell_json(value: &AnyValue) -> serde_json::Value {
    match value {
        AnyValue::Null => serde_json::Value::Null,
        AnyValue::Boolean(b) => serde_json::Value::Bool(*b),
        AnyValue::Int8(i) => serde_json::Value::Number((*i).into()),
        AnyValue::Int16(i) => serde_json::Value::Number((*i).into()),
        AnyValue::Int32(i) => serde_json::Value::Number((*i).into()),
        AnyValue::Int64(i) => serde_json::Value::Number((*i).into()),
        AnyValue::UInt8(u) => serde_json::Value::Number((*u).into()),
        AnyValue::UInt16(u) => serde_json::Value::Number((*u).into()),
        AnyValue::UInt32(u) => serde_json::Value::Number((*u).into()),
        AnyValue::UInt64(u) => serde_json::Value::Number((*u).into()),
        other => match cell_number(other) {
            Some(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            None => serde_json::Value::String(cell_text(other)),
        },
    }
}
