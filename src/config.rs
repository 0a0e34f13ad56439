//! Application configuration
//!
//! Secrets and connection parameters come from the process environment,
//! optionally seeded from a `.env` file by the binary.

use crate::error::{AskError, Result};

pub const DEFAULT_VANNA_ENDPOINT: &str = "https://ask.vanna.ai";
pub const DEFAULT_VANNA_ORG: &str = "cybersyn-us-global-public";
pub const DEFAULT_BIND: &str = "0.0.0.0:8080";

/// Credentials for the text-to-SQL / chart-code service
#[derive(Debug, Clone)]
pub struct VannaConfig {
    pub api_key: String,
    pub org: String,
    pub endpoint: String,
}

/// Snowflake connection parameters
#[derive(Debug, Clone)]
pub struct SnowflakeConfig {
    pub user: String,
    pub password: String,
    pub account: String,
    pub database: String,
    pub warehouse: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub vanna: VannaConfig,
    pub snowflake: SnowflakeConfig,
    pub bind: String,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| AskError::Config(format!("{} is not set", key)))
        };
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let vanna = VannaConfig {
            api_key: required("VANNA_API_KEY")?,
            org: optional("VANNA_ORG").unwrap_or_else(|| DEFAULT_VANNA_ORG.to_string()),
            endpoint: optional("VANNA_ENDPOINT")
                .unwrap_or_else(|| DEFAULT_VANNA_ENDPOINT.to_string())
                .trim_end_matches('/')
                .to_string(),
        };

        let snowflake = SnowflakeConfig {
            user: required("SNOWFLAKE_USER")?,
            password: required("SNOWFLAKE_PASSWORD")?,
            account: required("SNOWFLAKE_ACCOUNT")?,
            database: required("SNOWFLAKE_DEFAULT_DATABASE")?,
            warehouse: optional("SNOWFLAKE_WAREHOUSE"),
            role: optional("SNOWFLAKE_ROLE"),
        };

        Ok(Self {
            vanna,
            snowflake,
            bind: optional("ASKDATA_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
        })
    }
}
