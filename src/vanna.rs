//! Vanna client
//!
//! Text-to-SQL and chart-code generation through the hosted Vanna JSON-RPC API.

use crate::config::VannaConfig;
use crate::error::{AskError, Result};
use crate::pipeline::{ChartCodeGenerator, SqlGenerator};
use crate::table::{frame_to_markdown, MARKDOWN_ROWS};
use async_trait::async_trait;
use lazy_static::lazy_static;
use polars::prelude::DataFrame;
use regex::Regex;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

lazy_static! {
    static ref CODE_FENCE: Regex = Regex::new(r"(?s)```[a-zA-Z]*\s*\n(.*?)```").unwrap();
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a, P: Serialize> {
    method: &'a str,
    params: Vec<P>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    message: String,
}

#[derive(Debug, Serialize)]
struct Question<'a> {
    question: &'a str,
}

#[derive(Debug, Deserialize)]
struct SqlAnswer {
    sql: Option<String>,
}

#[derive(Debug, Serialize)]
struct DataResult<'a> {
    question: &'a str,
    sql: &'a str,
    table_markdown: String,
    error: Option<String>,
    correction_attempts: u32,
}

#[derive(Debug, Deserialize)]
struct PlotlyResult {
    plotly_code: Option<String>,
}

pub struct VannaClient {
    api_key: String,
    org: String,
    endpoint: String,
    client: Client,
}

impl VannaClient {
    pub fn new(config: &VannaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AskError::Http(format!("Failed to create HTTP client for Vanna: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            org: config.org.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn call_rpc<P, R>(&self, method: &str, params: P) -> Result<Option<R>>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        let body = RpcRequest {
            method,
            params: vec![params],
        };

        debug!("Vanna RPC call: {}", method);
        let response = self
            .client
            .post(format!("{}/rpc", self.endpoint))
            .header("Content-Type", "application/json")
            .header("Vanna-Key", &self.api_key)
            .header("Vanna-Org", &self.org)
            .json(&body)
            .send()
            .await
            .map_err(|e| AskError::Vanna(format!("{} call failed: {}", method, e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AskError::Vanna(format!("Failed to read {} response: {}", method, e)))?;

        if !status.is_success() {
            return Err(AskError::Vanna(format!(
                "{} failed with status {}: {}",
                method, status, text
            )));
        }

        parse_rpc_response(method, &text)
    }
}

fn parse_rpc_response<R>(method: &str, text: &str) -> Result<Option<R>>
where
    R: DeserializeOwned,
{
    let response: RpcResponse<R> = serde_json::from_str(text)
        .map_err(|e| AskError::Vanna(format!("Failed to parse {} response: {}", method, e)))?;

    if let Some(error) = response.error {
        return Err(AskError::Vanna(format!("{}: {}", method, error.message)));
    }

    Ok(response.result)
}

/// Strip a surrounding markdown code fence, if any
pub fn extract_code(response: &str) -> String {
    match CODE_FENCE.captures(response) {
        Some(cap) => cap[1].trim().to_string(),
        None => response.trim().to_string(),
    }
}

#[async_trait]
impl SqlGenerator for VannaClient {
    async fn generate_sql(&self, question: &str) -> Result<Option<String>> {
        let answer: Option<SqlAnswer> = self
            .call_rpc("generate_sql_from_question", Question { question })
            .await?;

        Ok(answer
            .and_then(|a| a.sql)
            .map(|sql| sql.trim().to_string())
            .filter(|sql| !sql.is_empty()))
    }
}

#[async_trait]
impl ChartCodeGenerator for VannaClient {
    async fn generate_chart_code(
        &self,
        question: &str,
        sql: &str,
        df: &DataFrame,
    ) -> Result<Option<String>> {
        let params = DataResult {
            question,
            sql,
            table_markdown: frame_to_markdown(df, MARKDOWN_ROWS)?,
            error: None,
            correction_attempts: 0,
        };

        let result: Option<PlotlyResult> = self.call_rpc("generate_plotly_code", params).await?;

        Ok(result
            .and_then(|r| r.plotly_code)
            .map(|code| extract_code(&code))
            .filter(|code| !code.is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sql_answer() {
        let text = r#"{"result": {"raw_answer": "...", "prefix": "", "postfix": "", "sql": "SELECT 1"}}"#;
        let answer: Option<SqlAnswer> = parse_rpc_response("generate_sql_from_question", text).unwrap();
        assert_eq!(answer.unwrap().sql.as_deref(), Some("SELECT 1"));
    }

    #[test]
    fn test_missing_result_is_none() {
        let answer: Option<SqlAnswer> = parse_rpc_response("generate_sql_from_question", "{}").unwrap();
        assert!(answer.is_none());
    }

    #[test]
    fn test_rpc_error_surfaces() {
        let text = r#"{"error": {"message": "invalid api key"}}"#;
        let err = parse_rpc_response::<SqlAnswer>("generate_sql_from_question", text).unwrap_err();
        assert!(err.to_string().contains("invalid api key"));
    }

    #[test]
    fn test_invalid_json_is_error() {
        assert!(parse_rpc_response::<PlotlyResult>("generate_plotly_code", "<html>").is_err());
    }

    #[test]
    fn test_extract_code_from_fence() {
        let response = "Here you go:\n```python\nimport plotly.express as px\nfig = px.bar(df)\n```\n";
        assert_eq!(extract_code(response), "import plotly.express as px\nfig = px.bar(df)");
    }

    #[test]
    fn test_extract_code_without_fence() {
        assert_eq!(extract_code("  fig = px.line(df)\n"), "fig = px.line(df)");
    }

    #[test]
    fn test_request_shape() {
        let body = RpcRequest {
            method: "generate_sql_from_question",
            params: vec![Question { question: "How many states?" }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["method"], "generate_sql_from_question");
        assert_eq!(json["params"][0]["question"], "How many states?");
    }
}
