//! Per-row ownership filtering.
//!
//! Every user-facing query aliases its table as `t`; the filter rendered here
//! relies on that.

use crate::catalog::{self, quote_ident, SpatialTable};
use crate::config::{ServiceConfig, UnscopedTables};
use crate::error::Error;

use sqlx::PgConnection;

/// Whether rows must be filtered to the requesting user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TenantScope {
    /// Ownership column, when the table has one.
    pub column: Option<String>,
    pub user_id: i64,
}

impl TenantScope {
    pub fn scoped(column: &str, user_id: i64) -> TenantScope {
        TenantScope {
            column: Some(column.to_string()),
            user_id,
        }
    }

    pub fn shared(user_id: i64) -> TenantScope {
        TenantScope {
            column: None,
            user_id,
        }
    }

    pub fn is_scoped(&self) -> bool {
        self.column.is_some()
    }

    /// The ownership predicate, comparing against bind parameter `$param`.
    pub fn condition(&self, param: usize) -> Option<String> {
        self.column
            .as_ref()
            .map(|column| format!("t.{} = ${}", quote_ident(column), param))
    }

    /// `WHERE` clause selecting the user's non-null geometries.
    pub fn where_clause(&self, table: &SpatialTable, param: usize) -> String {
        let mut clause = format!("WHERE t.{} IS NOT NULL", table.quoted_geometry_column());
        if let Some(condition) = self.condition(param) {
            clause.push_str(" AND ");
            clause.push_str(&condition);
        }

        clause
    }
}

/// Applies the unscoped-table policy once the catalog has answered.
pub fn decide(
    config: &ServiceConfig,
    table: &SpatialTable,
    has_scoping_column: bool,
    user_id: i64,
) -> Result<TenantScope, Error> {
    if has_scoping_column {
        return Ok(TenantScope::scoped(&config.scoping_column, user_id));
    }

    match config.unscoped_tables {
        UnscopedTables::Shared => Ok(TenantScope::shared(user_id)),
        UnscopedTables::Deny if config.is_public(&table.schema, &table.table) => {
            Ok(TenantScope::shared(user_id))
        }
        UnscopedTables::Deny => {
            tracing::warn!(
                schema = %table.schema,
                table = %table.table,
                user_id,
                "refusing table without ownership column"
            );
            Err(Error::UnscopedTable {
                schema: table.schema.clone(),
                table: table.table.clone(),
            })
        }
    }
}

/// Inspects the table and decides how its rows are scoped for `user_id`.
pub async fn resolve(
    conn: &mut PgConnection,
    config: &ServiceConfig,
    table: &SpatialTable,
    user_id: i64,
) -> Result<TenantScope, Error> {
    let has_column = catalog::has_scoping_column(conn, table, &config.scoping_column).await?;
    decide(config, table, has_column, user_id)
}
