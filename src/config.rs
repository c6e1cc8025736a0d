/// Service configuration, loaded from YAML.
///
/// Every key is optional. An empty `database_url` falls back to the
/// `DATABASE_URL` environment variable.
use crate::error::Error;

use std::{fs, path::Path, time::Duration};

use serde::Deserialize;

use sqlx::postgres::{PgPool, PgPoolOptions};

/// How tables without an ownership column are served.
#[derive(Clone, Copy, Deserialize, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnscopedTables {
    /// Served unfiltered to every authenticated user.
    #[default]
    Shared,
    /// Refused unless listed in `public_tables`.
    Deny,
}

#[derive(Clone, Deserialize, Debug)]
#[serde(default)]
pub struct ServiceConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub acquire_timeout_ms: u64,
    /// Reserved column holding the owning user's id.
    pub scoping_column: String,
    pub expected_srid: i32,
    pub extent: u32,
    #[serde(rename = "feature-buffer", alias = "feature_buffer")]
    pub feature_buffer: i32,
    #[serde(rename = "label-buffer", alias = "label_buffer")]
    pub label_buffer: i32,
    /// Candidate feature id columns, in order of preference.
    pub id_columns: Vec<String>,
    pub system_schemas: Vec<String>,
    pub unscoped_tables: UnscopedTables,
    /// `schema.table` names served to everyone under `unscoped_tables: deny`.
    pub public_tables: Vec<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            database_url: String::new(),
            max_connections: 10,
            acquire_timeout_ms: 3000,
            scoping_column: String::from("user_id"),
            expected_srid: 4326,
            extent: 4096,
            feature_buffer: 256,
            label_buffer: 0,
            id_columns: vec![String::from("id"), String::from("gid")],
            system_schemas: vec![
                String::from("information_schema"),
                String::from("pg_catalog"),
                String::from("pg_toast"),
            ],
            unscoped_tables: UnscopedTables::Shared,
            public_tables: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Constructs a new ServiceConfig from a YAML string
    pub fn from_yaml(data: &str) -> Result<ServiceConfig, Error> {
        let mut result: ServiceConfig = serde_yaml::from_str(data)?;

        if result.database_url.trim().is_empty() {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                result.database_url = url;
            }
        }

        result.validate()?;
        Ok(result)
    }

    /// Rejects values PostGIS would refuse or silently misread.
    pub fn validate(&self) -> Result<(), Error> {
        if self.extent == 0 || i32::try_from(self.extent).is_err() {
            return Err(Error::InvalidConfig(format!(
                "extent must be between 1 and {}, got {}",
                i32::MAX,
                self.extent
            )));
        }
        if self.feature_buffer < 0 || self.label_buffer < 0 {
            return Err(Error::InvalidConfig(String::from(
                "tile buffers must not be negative",
            )));
        }
        if self.max_connections == 0 {
            return Err(Error::InvalidConfig(String::from(
                "max_connections must be at least 1",
            )));
        }

        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, Error> {
        let data = fs::read_to_string(path)?;
        ServiceConfig::from_yaml(&data)
    }

    /// Whether `schema.table` is explicitly marked as shared with everyone.
    pub fn is_public(&self, schema: &str, table: &str) -> bool {
        self.public_tables.iter().any(|name| {
            name.split_once('.')
                .map_or(false, |(s, t)| s == schema && t == table)
        })
    }

    /// Opens a connection pool sized by this configuration.
    pub async fn connect(&self) -> Result<PgPool, Error> {
        // Avoid logging the url; it may carry credentials.
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_millis(self.acquire_timeout_ms))
            .connect(&self.database_url)
            .await?;

        Ok(pool)
    }
}
