//! Snowflake warehouse connector
//!
//! Opens a password-authenticated session per query, the way the demo page
//! connects on every run, and converts the returned rows into a DataFrame.

use crate::config::SnowflakeConfig;
use crate::error::{AskError, Result};
use crate::pipeline::Warehouse;
use crate::table::{frame_from_rowset, ColumnKind, ColumnSpec};
use async_trait::async_trait;
use polars::prelude::DataFrame;
use snowflake_connector_rs::{SnowflakeAuthMethod, SnowflakeClient, SnowflakeClientConfig};
use std::time::Duration;
use tracing::{debug, info};

pub struct SnowflakeWarehouse {
    config: SnowflakeConfig,
    timeout: Duration,
}

impl SnowflakeWarehouse {
    pub fn new(config: SnowflakeConfig) -> Self {
        Self {
            config,
            timeout: Duration::from_secs(300),
        }
    }

    fn client(&self, database: &str) -> Result<SnowflakeClient> {
        SnowflakeClient::new(
            &self.config.user,
            SnowflakeAuthMethod::Password(self.config.password.clone()),
            SnowflakeClientConfig {
                account: self.config.account.clone(),
                role: self.config.role.clone(),
                warehouse: self.config.warehouse.clone(),
                database: Some(database.to_string()),
                schema: None,
                timeout: Some(self.timeout),
            },
        )
        .map_err(|e| AskError::Warehouse(e.to_string()))
    }
}

/// Map a Snowflake logical type onto the column kinds the table module builds
pub fn column_kind(snowflake_type: &str) -> ColumnKind {
    match snowflake_type.to_ascii_lowercase().as_str() {
        "fixed" | "real" => ColumnKind::Number,
        _ => ColumnKind::Text,
    }
}

/// Trailing semicolons are rejected by the query endpoint
pub fn clean_statement(sql: &str) -> &str {
    sql.trim().trim_end_matches(';').trim_end()
}

#[async_trait]
impl Warehouse for SnowflakeWarehouse {
    async fn execute(&self, database: &str, sql: &str) -> Result<Option<DataFrame>> {
        let session = self
            .client(database)?
            .create_session()
            .await
            .map_err(|e| AskError::Warehouse(e.to_string()))?;

        let statement = clean_statement(sql);
        debug!("Executing on {}: {}", database, statement);
        let rows = session
            .query(statement)
            .await
            .map_err(|e| AskError::Warehouse(e.to_string()))?;

        // SnowflakeRow is the only carrier of column metadata, so an empty result
        // has no schema to build a frame from and is reported as absent
        let first = match rows.first() {
            Some(first) => first,
            None => {
                info!("Query returned no rows");
                return Ok(None);
            }
        };

        let columns: Vec<ColumnSpec> = first
            .column_types()
            .into_iter()
            .map(|col| ColumnSpec {
                name: col.name().to_string(),
                kind: column_kind(col.column_type().snowflake_type()),
            })
            .collect();

        let cells: Vec<Vec<Option<String>>> = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|col| row.get::<Option<String>>(&col.name).ok().flatten())
                    .collect()
            })
            .collect();

        info!("Query returned {} rows", cells.len());
        frame_from_rowset(&columns, &cells).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_kind() {
        assert_eq!(column_kind("fixed"), ColumnKind::Number);
        assert_eq!(column_kind("REAL"), ColumnKind::Number);
        assert_eq!(column_kind("text"), ColumnKind::Text);
        assert_eq!(column_kind("date"), ColumnKind::Text);
    }

    #[test]
    fn test_clean_statement() {
        assert_eq!(clean_statement("SELECT 1;"), "SELECT 1");
        assert_eq!(clean_statement("  SELECT 1 ;\n"), "SELECT 1");
        assert_eq!(clean_statement("SELECT ';'"), "SELECT ';'");
    }
}
