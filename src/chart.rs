//! Chart rendering
//!
//! The chart-code service answers with Plotly Express source. Instead of running
//! that source, the renderer reads the chart call and its column arguments and
//! builds an equivalent Plotly JSON figure, which the page draws with plotly.js.

use crate::pipeline::ChartRenderer;
use crate::table::{cell_json, cell_number};
use lazy_static::lazy_static;
use polars::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

lazy_static! {
    static ref CHART_CALL: Regex =
        Regex::new(r"\b(?:px|plotly\.express)\.(bar|line|scatter|pie|area|histogram)\s*\(")
            .unwrap();
    static ref KEYWORD_ARG: Regex =
        Regex::new(r#"\b(x|y|names|values|title)\s*=\s*(?:'([^']*)'|"([^"]*)")"#).unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Scatter,
    Pie,
    Area,
    Histogram,
}

impl ChartKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "bar" => Some(ChartKind::Bar),
            "line" => Some(ChartKind::Line),
            "scatter" => Some(ChartKind::Scatter),
            "pie" => Some(ChartKind::Pie),
            "area" => Some(ChartKind::Area),
            "histogram" => Some(ChartKind::Histogram),
            _ => None,
        }
    }
}

/// A renderable Plotly figure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub kind: ChartKind,
    pub data: Vec<serde_json::Value>,
    pub layout: serde_json::Value,
}

impl Figure {
    /// `{data, layout}` object accepted by `Plotly.newPlot`
    pub fn to_plotly_json(&self) -> serde_json::Value {
        serde_json::json!({
            "data": self.data,
            "layout": self.layout,
        })
    }
}

/// The parts of a Plotly Express call the renderer understands
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub kind: ChartKind,
    pub args: HashMap<String, String>,
}

/// Find the first recognised Plotly Express call in `code`
pub fn parse_chart_code(code: &str) -> Option<ChartSpec> {
    let call = CHART_CALL.captures(code)?;
    let kind = ChartKind::parse(call.get(1)?.as_str())?;

    let rest = &code[call.get(0)?.end()..];
    let mut args = HashMap::new();
    for cap in KEYWORD_ARG.captures_iter(rest) {
        let value = cap.get(2).or_else(|| cap.get(3)).map(|m| m.as_str().to_string());
        if let Some(value) = value {
            args.entry(cap[1].to_string()).or_insert(value);
        }
    }

    Some(ChartSpec { kind, args })
}

#[derive(Debug, Default, Clone)]
pub struct PlotlyRenderer;

impl PlotlyRenderer {
    pub fn new() -> Self {
        Self
    }

    fn build(&self, spec: &ChartSpec, df: &DataFrame) -> Option<Figure> {
        if df.height() == 0 || df.width() == 0 {
            return None;
        }

        let (x_key, y_key) = match spec.kind {
            ChartKind::Pie => ("names", "values"),
            _ => ("x", "y"),
        };

        let x = requested_column(df, spec.args.get(x_key), |_| true)
            .or_else(|| first_column(df, |s| !s.dtype().is_numeric()))
            .or_else(|| df.get_column_names().first().map(|s| s.to_string()))?;
        // A text column asked for as the value axis would plot as all nulls
        let y = requested_column(df, spec.args.get(y_key), |s| s.dtype().is_numeric())
            .or_else(|| first_column(df, |s| s.dtype().is_numeric() && s.name() != x.as_str()));

        let xs = column_values(df, &x)?;
        let trace = match (spec.kind, y.as_deref()) {
            (ChartKind::Histogram, _) => serde_json::json!({"type": "histogram", "x": xs}),
            (ChartKind::Pie, Some(y)) => {
                serde_json::json!({"type": "pie", "labels": xs, "values": numeric_values(df, y)?})
            }
            (ChartKind::Bar, Some(y)) => {
                serde_json::json!({"type": "bar", "x": xs, "y": numeric_values(df, y)?})
            }
            (ChartKind::Line, Some(y)) => serde_json::json!({
                "type": "scatter", "mode": "lines", "x": xs, "y": numeric_values(df, y)?
            }),
            (ChartKind::Scatter, Some(y)) => serde_json::json!({
                "type": "scatter", "mode": "markers", "x": xs, "y": numeric_values(df, y)?
            }),
            (ChartKind::Area, Some(y)) => serde_json::json!({
                "type": "scatter", "mode": "lines", "fill": "tozeroy", "x": xs, "y": numeric_values(df, y)?
            }),
            (_, None) => {
                debug!("No numeric column to plot against '{}'", x);
                return None;
            }
        };

        let mut layout = serde_json::json!({
            "xaxis": {"title": {"text": x}},
        });
        if let Some(y) = &y {
            layout["yaxis"] = serde_json::json!({"title": {"text": y}});
        }
        if let Some(title) = spec.args.get("title") {
            layout["title"] = serde_json::json!({"text": title});
        }

        Some(Figure {
            kind: spec.kind,
            data: vec![trace],
            layout,
        })
    }
}

impl ChartRenderer for PlotlyRenderer {
    fn render_chart(&self, code: &str, df: &DataFrame) -> Option<Figure> {
        let spec = match parse_chart_code(code) {
            Some(spec) => spec,
            None => {
                debug!("No Plotly Express call found in chart code");
                return None;
            }
        };
        self.build(&spec, df)
    }
}

/// The requested column, if the result has it and it passes `usable`
fn requested_column<F>(df: &DataFrame, requested: Option<&String>, usable: F) -> Option<String>
where
    F: Fn(&Series) -> bool,
{
    let name = requested?;
    df.column(name)
        .ok()
        .filter(|s| usable(s))
        .map(|_| name.clone())
}

fn first_column<F>(df: &DataFrame, matches: F) -> Option<String>
where
    F: Fn(&Series) -> bool,
{
    df.get_columns()
        .iter()
        .find(|s| matches(s))
        .map(|s| s.name().to_string())
}

fn column_values(df: &DataFrame, name: &str) -> Option<Vec<serde_json::Value>> {
    let series = df.column(name).ok()?;
    (0..series.len())
        .map(|i| series.get(i).ok().map(|v| cell_json(&v)))
        .collect()
}

fn numeric_values(df: &DataFrame, name: &str) -> Option<Vec<serde_json::Value>> {
    let series = df.column(name).ok()?;
    (0..series.len())
        .map(|i| {
            series.get(i).ok().map(|v| {
                cell_number(&v)
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .unwrap_or(serde_json::Value::Null)
            })
        })
        .collect()
}
