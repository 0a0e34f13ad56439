//! Question pipeline
//!
//! Runs the four external stages for an accepted question: SQL generation,
//! warehouse execution, chart-code generation and chart rendering. Each stage
//! consumes the previous stage's output and the first failure ends the run.

use crate::chart::Figure;
use crate::error::{AskError, Result};
use async_trait::async_trait;
use polars::prelude::DataFrame;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Natural-language to SQL translation
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    /// Returns `None` when the service produced no SQL
    async fn generate_sql(&self, question: &str) -> Result<Option<String>>;
}

/// SQL execution against the warehouse
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// `Ok(None)` means the warehouse returned no result set.
    /// `Err` carries the warehouse's error text.
    async fn execute(&self, database: &str, sql: &str) -> Result<Option<DataFrame>>;
}

/// Chart source code generation
#[async_trait]
pub trait ChartCodeGenerator: Send + Sync {
    async fn generate_chart_code(
        &self,
        question: &str,
        sql: &str,
        df: &DataFrame,
    ) -> Result<Option<String>>;
}

/// Turns chart code and a result into a figure
pub trait ChartRenderer: Send + Sync {
    fn render_chart(&self, code: &str, df: &DataFrame) -> Option<Figure>;
}

/// Why a pipeline run stopped early
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum PipelineError {
    #[error("SQL error")]
    SqlGeneration,

    #[error("{}", query_failure_text(.0))]
    QueryExecution(Option<String>),

    #[error("Plotly Code error")]
    ChartCode,

    #[error("Chart error")]
    ChartRender,
}

fn query_failure_text(detail: &Option<String>) -> &str {
    detail.as_deref().unwrap_or("Table error")
}

/// Everything the pipeline produced, up to the first failure
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub sql: Option<String>,
    pub table: Option<DataFrame>,
    pub chart_code: Option<String>,
    pub figure: Option<Figure>,
    pub failure: Option<PipelineError>,
}

impl PipelineReport {
    pub fn is_complete(&self) -> bool {
        self.failure.is_none() && self.figure.is_some()
    }
}

/// The external collaborators wired together
#[derive(Clone)]
pub struct Pipeline {
    sql_generator: Arc<dyn SqlGenerator>,
    warehouse: Arc<dyn Warehouse>,
    chart_code: Arc<dyn ChartCodeGenerator>,
    renderer: Arc<dyn ChartRenderer>,
    database: String,
}

impl Pipeline {
    pub fn new(
        sql_generator: Arc<dyn SqlGenerator>,
        warehouse: Arc<dyn Warehouse>,
        chart_code: Arc<dyn ChartCodeGenerator>,
        renderer: Arc<dyn ChartRenderer>,
        database: String,
    ) -> Self {
        Self {
            sql_generator,
            warehouse,
            chart_code,
            renderer,
            database,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Run every stage for `question`, keeping the outputs of completed stages
    pub async fn run(&self, question: &str) -> PipelineReport {
        let mut report = PipelineReport::default();
        if let Err(failure) = self.run_stages(question, &mut report).await {
            warn!("Pipeline stopped for '{}': {}", question, failure);
            report.failure = Some(failure);
        }
        report
    }

    async fn run_stages(
        &self,
        question: &str,
        report: &mut PipelineReport,
    ) -> std::result::Result<(), PipelineError> {
        info!("Generating SQL...");
        let sql = self.generate_sql(question).await?;
        report.sql = Some(sql.clone());

        info!("Running SQL...");
        let df = self.execute(&sql).await?;
        report.table = Some(df.clone());

        info!("Generating Plotly Code...");
        let code = self.generate_chart_code(question, &sql, &df).await?;
        report.chart_code = Some(code.clone());

        info!("Running Chart...");
        let figure = self
            .renderer
            .render_chart(&code, &df)
            .ok_or(PipelineError::ChartRender)?;
        report.figure = Some(figure);

        Ok(())
    }

    async fn generate_sql(&self, question: &str) -> std::result::Result<String, PipelineError> {
        match self.sql_generator.generate_sql(question).await {
            Ok(Some(sql)) if !sql.trim().is_empty() => Ok(sql),
            Ok(_) => Err(PipelineError::SqlGeneration),
            Err(e) => {
                warn!("SQL generation call failed: {}", e);
                Err(PipelineError::SqlGeneration)
            }
        }
    }

    async fn execute(&self, sql: &str) -> std::result::Result<DataFrame, PipelineError> {
        match self.warehouse.execute(&self.database, sql).await {
            Ok(Some(df)) => Ok(df),
            Ok(None) => Err(PipelineError::QueryExecution(None)),
            Err(AskError::Warehouse(message)) => Err(PipelineError::QueryExecution(Some(message))),
            Err(e) => {
                warn!("Warehouse call failed: {}", e);
                Err(PipelineError::QueryExecution(Some(e.to_string())))
            }
        }
    }

    async fn generate_chart_code(
        &self,
        question: &str,
        sql: &str,
        df: &DataFrame,
    ) -> std::result::Result<String, PipelineError> {
        match self.chart_code.generate_chart_code(question, sql, df).await {
            Ok(Some(code)) if !code.trim().is_empty() => Ok(code),
            Ok(_) => Err(PipelineError::ChartCode),
            Err(e) => {
                warn!("Chart code call failed: {}", e);
                Err(PipelineError::ChartCode)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use polars::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub struct FixedSql(pub Option<&'static str>);

    #[async_trait]
    impl SqlGenerator for FixedSql {
        async fn generate_sql(&self, _question: &str) -> Result<Option<String>> {
            Ok(self.0.map(|s| s.to_string()))
        }
    }

    pub enum WarehouseReply {
        Rows,
        Nothing,
        Fails(&'static str),
    }

    pub struct FakeWarehouse {
        pub reply: WarehouseReply,
        pub calls: AtomicUsize,
    }

    impl FakeWarehouse {
        pub fn new(reply: WarehouseReply) -> Self {
            Self { reply, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Warehouse for FakeWarehouse {
        async fn execute(&self, _database: &str, _sql: &str) -> Result<Option<DataFrame>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                WarehouseReply::Rows => Ok(Some(df![
                    "COUNTRY" => ["Japan", "Switzerland"],
                    "LIFE_EXPECTANCY" => [84.6, 83.9]
                ]?)),
                WarehouseReply::Nothing => Ok(None),
                WarehouseReply::Fails(msg) => Err(AskError::Warehouse(msg.to_string())),
            }
        }
    }

    pub struct CountingChartCode {
        pub code: Option<&'static str>,
        pub calls: AtomicUsize,
    }

    impl CountingChartCode {
        pub fn new(code: Option<&'static str>) -> Self {
            Self { code, calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ChartCodeGenerator for CountingChartCode {
        async fn generate_chart_code(
            &self,
            _question: &str,
            _sql: &str,
            _df: &DataFrame,
        ) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.code.map(|s| s.to_string()))
        }
    }

    fn pipeline(
        sql: Option<&'static str>,
        warehouse: Arc<FakeWarehouse>,
        chart: Arc<CountingChartCode>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(FixedSql(sql)),
            warehouse,
            chart,
            Arc::new(crate::chart::PlotlyRenderer::new()),
            "CYBERSYN".to_string(),
        )
    }

    const BAR_CODE: &str = "fig = px.bar(df, x='COUNTRY', y='LIFE_EXPECTANCY')";

    #[tokio::test]
    async fn test_full_run() {
        let warehouse = Arc::new(FakeWarehouse::new(WarehouseReply::Rows));
        let chart = Arc::new(CountingChartCode::new(Some(BAR_CODE)));
        let report = pipeline(Some("SELECT 1"), warehouse, chart).run("q").await;

        assert!(report.is_complete());
        assert_eq!(report.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(report.table.as_ref().unwrap().height(), 2);
        assert_eq!(report.chart_code.as_deref(), Some(BAR_CODE));
    }

    #[tokio::test]
    async fn test_empty_sql_halts() {
        let warehouse = Arc::new(FakeWarehouse::new(WarehouseReply::Rows));
        let chart = Arc::new(CountingChartCode::new(Some(BAR_CODE)));
        let report = pipeline(Some("  "), warehouse.clone(), chart).run("q").await;

        assert_eq!(report.failure, Some(PipelineError::SqlGeneration));
        assert!(report.sql.is_none());
        assert!(report.table.is_none());
        assert!(report.figure.is_none());
        assert_eq!(warehouse.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_warehouse_error_text_halts() {
        let warehouse = Arc::new(FakeWarehouse::new(WarehouseReply::Fails("SQL compilation error")));
        let chart = Arc::new(CountingChartCode::new(Some(BAR_CODE)));
        let report = pipeline(Some("SELECT 1"), warehouse, chart.clone()).run("q").await;

        match &report.failure {
            Some(PipelineError::QueryExecution(Some(msg))) => {
                assert!(msg.contains("SQL compilation error"))
            }
            other => panic!("unexpected failure: {:?}", other),
        }
        assert_eq!(report.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(chart.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_absent_result_is_table_error() {
        let warehouse = Arc::new(FakeWarehouse::new(WarehouseReply::Nothing));
        let chart = Arc::new(CountingChartCode::new(Some(BAR_CODE)));
        let report = pipeline(Some("SELECT 1"), warehouse, chart).run("q").await;

        let failure = report.failure.unwrap();
        assert_eq!(failure, PipelineError::QueryExecution(None));
        assert_eq!(failure.to_string(), "Table error");
    }

    #[tokio::test]
    async fn test_empty_chart_code_halts() {
        let warehouse = Arc::new(FakeWarehouse::new(WarehouseReply::Rows));
        let chart = Arc::new(CountingChartCode::new(None));
        let report = pipeline(Some("SELECT 1"), warehouse, chart).run("q").await;

        assert_eq!(report.failure, Some(PipelineError::ChartCode));
        assert!(report.table.is_some());
        assert!(report.chart_code.is_none());
    }

    #[tokio::test]
    async fn test_unrenderable_chart_halts() {
        let warehouse = Arc::new(FakeWarehouse::new(WarehouseReply::Rows));
        let chart = Arc::new(CountingChartCode::new(Some("print('no chart here')")));
        let report = pipeline(Some("SELECT 1"), warehouse, chart).run("q").await;

        assert_eq!(report.failure, Some(PipelineError::ChartRender));
        assert!(report.chart_code.is_some());
        assert!(report.figure.is_none());
    }
}
