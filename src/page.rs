//! Presentation
//!
//! Renders a submission as the demo HTML page, or as JSON for the API route.

use crate::gate::Decision;
use crate::pipeline::{PipelineError, PipelineReport};
use crate::session::Submission;
use crate::table::{frame_to_json, preview, PREVIEW_ROWS};
use tracing::warn;

/// Shortcut questions offered while the input is empty
pub const EXAMPLE_QUESTIONS: [&str; 5] = [
    "Which five countries had the highest life expectancy in 2020?",
    "What is the cumulative rainfall in each country in 2023?",
    "What is the unemployment rate for New York City and New York State in 2015?",
    "Which states in the United States have the highest median age in 2017? Show the top 15",
    "Which states in the United States had the highest population growth from 2010 to 2020? Show only the top 10",
];

const STYLE: &str = r#"
body { font-family: sans-serif; margin: 2rem auto; max-width: 1100px; color: #262730; }
.info { background: #e8f0fe; padding: .75rem; border-radius: 4px; }
.warning { background: #fffae6; padding: .75rem; border-radius: 4px; }
.error { background: #fdecea; padding: .75rem; border-radius: 4px; }
.examples button { display: block; margin: .4rem 0; }
.tabs input[type=radio] { display: none; }
.tabs label { display: inline-block; padding: .5rem 1rem; cursor: pointer; border-bottom: 2px solid transparent; }
.tabs input:checked + label { border-bottom-color: #ff4b4b; }
.tabs .panel { display: none; padding: 1rem 0; }
#tab-sql:checked ~ #panel-sql, #tab-table:checked ~ #panel-table,
#tab-code:checked ~ #panel-code, #tab-walk:checked ~ #panel-walk { display: block; }
pre { background: #f0f2f6; padding: .75rem; overflow-x: auto; }
table { border-collapse: collapse; font-size: .9rem; }
td, th { border: 1px solid #ddd; padding: .25rem .5rem; }
"#;

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn alert(class: &str, message: &str) -> String {
    format!(r#"<div class="{}">{}</div>"#, class, escape_html(message))
}

fn code_block(code: &str) -> String {
    format!("<pre><code>{}</code></pre>", escape_html(code))
}

fn example_buttons() -> String {
    let mut html = String::from(r#"<form method="get" action="/" class="examples">"#);
    for question in EXAMPLE_QUESTIONS {
        html.push_str(&format!(
            r#"<button type="submit" name="question" value="{0}">{0}</button>"#,
            escape_html(question)
        ));
    }
    html.push_str("</form>");
    html
}

/// The four API calls, narrated with the current question
pub fn walkthrough(question: &str) -> String {
    let steps = [
        ("Generate SQL", format!("sql = generate_sql_from_question(question=\"{}\")", question)),
        ("Run SQL", "df = execute(connection, database, sql)".to_string()),
        (
            "Generate Plotly Code",
            "plotly_code = generate_plotly_code(question, sql, df)".to_string(),
        ),
        ("Run Chart", "fig = render_chart(plotly_code, df)".to_string()),
    ];

    steps
        .iter()
        .map(|(title, code)| format!("<p>{}</p>{}", title, code_block(code)))
        .collect()
}

fn table_html(report: &PipelineReport) -> String {
    let df = match &report.table {
        Some(df) => df,
        None => return String::new(),
    };

    let json = match frame_to_json(&preview(df), PREVIEW_ROWS) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to render table: {}", e);
            return alert("error", "Table error");
        }
    };

    let mut html = String::from("<p>First 100 rows of data</p><table><thead><tr>");
    if let Some(columns) = json["columns"].as_array() {
        for column in columns {
            html.push_str(&format!("<th>{}</th>", escape_html(column.as_str().unwrap_or_default())));
        }
    }
    html.push_str("</tr></thead><tbody>");
    if let Some(rows) = json["rows"].as_array() {
        for row in rows {
            html.push_str("<tr>");
            for cell in row.as_array().into_iter().flatten() {
                let text = match cell {
                    serde_json::Value::Null => String::new(),
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                html.push_str(&format!("<td>{}</td>", escape_html(&text)));
            }
            html.push_str("</tr>");
        }
    }
    html.push_str("</tbody></table>");
    html
}

fn chart_html(report: &PipelineReport) -> String {
    if report.chart_code.is_none() {
        return String::new();
    }

    let mut html = String::from("<h2>Chart</h2>");
    match (&report.figure, &report.failure) {
        (Some(figure), _) => {
            // Keep "</script>" out of the inline JSON
            let json = figure.to_plotly_json().to_string().replace("</", "<\\/");
            html.push_str(r#"<div id="chart"></div>"#);
            html.push_str(&format!(
                "<script>const fig = {}; Plotly.newPlot('chart', fig.data, fig.layout);</script>",
                json
            ));
        }
        (None, Some(PipelineError::ChartRender)) => html.push_str(&alert("error", "Chart error")),
        (None, _) => {}
    }
    html
}

/// Render the whole page for a submission
pub fn render_page(submission: &Submission) -> String {
    let question = submission.question.as_deref().unwrap_or_default();
    let empty = PipelineReport::default();
    let report = submission.report.as_ref().unwrap_or(&empty);

    let mut sql_panel = String::new();
    let mut table_panel = String::new();
    let mut code_panel = String::new();
    let mut notices = String::new();

    match submission.decision {
        Decision::Idle => {
            notices.push_str(&alert("info", Decision::Idle.message().unwrap_or_default()));
            notices.push_str(&example_buttons());
        }
        Decision::DuplicateRejected => {
            notices.push_str(&alert("warning", Decision::DuplicateRejected.message().unwrap_or_default()))
        }
        Decision::ThrottledRejected => {
            notices.push_str(&alert("error", Decision::ThrottledRejected.message().unwrap_or_default()))
        }
        Decision::Accepted => {}
    }

    if let Some(sql) = &report.sql {
        sql_panel.push_str(&code_block(sql));
    }
    table_panel.push_str(&table_html(report));
    if let Some(code) = &report.chart_code {
        code_panel.push_str(&code_block(code));
    }

    match &report.failure {
        Some(f @ PipelineError::SqlGeneration) => sql_panel.push_str(&alert("error", &f.to_string())),
        Some(f @ PipelineError::QueryExecution(_)) => notices.push_str(&alert("error", &f.to_string())),
        Some(f @ PipelineError::ChartCode) => code_panel.push_str(&alert("error", &f.to_string())),
        Some(PipelineError::ChartRender) | None => {}
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Data Provider Example</title>
<script src="https://cdn.plot.ly/plotly-2.27.0.min.js"></script>
<style>{style}</style>
</head>
<body>
<img src="https://ask.vanna.ai/static/img/vanna_with_text_transparent.png" width="300" alt="Vanna.AI">
<p><a href="https://vanna.ai">Vanna.AI</a> allows you to ask questions directly to your database or data warehouse without writing SQL. It answers your question with a graph, a table and the SQL query needed.</p>
<p>In this demo app, we are using a database from <a href="https://www.cybersyn.com/">Cybersyn</a>. They aggregate data from government data sources on demographic, economic, and environmental topics at national, state, county, and municipal level.</p>
<form method="get" action="/">
<label for="question">Question</label><br>
<input id="question" name="question" size="100" title="Type in a question" value="{question}">
</form>
{notices}
<div class="tabs">
<input type="radio" name="tab" id="tab-sql" checked><label for="tab-sql">SQL</label>
<input type="radio" name="tab" id="tab-table"><label for="tab-table">Table</label>
<input type="radio" name="tab" id="tab-code"><label for="tab-code">Plotly Code</label>
<input type="radio" name="tab" id="tab-walk"><label for="tab-walk">Vanna Code</label>
<div class="panel" id="panel-sql">{sql}</div>
<div class="panel" id="panel-table">{table}</div>
<div class="panel" id="panel-code">{code}</div>
<div class="panel" id="panel-walk">{walk}</div>
</div>
{chart}
</body>
</html>
"#,
        style = STYLE,
        question = escape_html(question),
        notices = notices,
        sql = sql_panel,
        table = table_panel,
        code = code_panel,
        walk = walkthrough(question),
        chart = chart_html(report),
    )
}

/// JSON view of a submission for the API route
pub fn render_json(submission: &Submission) -> serde_json::Value {
    let mut body = serde_json::json!({
        "question": submission.question,
        "decision": submission.decision,
        "message": submission.decision.message(),
    });

    if let Some(report) = &submission.report {
        body["sql"] = serde_json::json!(report.sql);
        body["table"] = match report.table.as_ref().map(|df| frame_to_json(df, PREVIEW_ROWS)) {
            Some(Ok(json)) => json,
            Some(Err(e)) => {
                warn!("Failed to serialize table: {}", e);
                serde_json::Value::Null
            }
            None => serde_json::Value::Null,
        };
        body["chart_code"] = serde_json::json!(report.chart_code);
        body["figure"] = report
            .figure
            .as_ref()
            .map(|f| f.to_plotly_json())
            .unwrap_or(serde_json::Value::Null);
        body["error"] = match &report.failure {
            Some(failure) => serde_json::json!({
                "stage": failure,
                "message": failure.to_string(),
            }),
            None => serde_json::Value::Null,
        };
    }

    body
}
