//! Checks that decide whether a table can be served as a map layer.

use crate::catalog::{self, SpatialTable};
use crate::config::ServiceConfig;
use crate::error::Error;
use crate::scope::{self, TenantScope};

use serde::Serialize;

use sqlx::{query_scalar, Decode, PgConnection, Postgres, Type};

/// Outcome of an SRID check. Bad data is reported here, never raised.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidityResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub srid: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ValidityResult {
    fn valid(srid: i32) -> ValidityResult {
        ValidityResult {
            valid: true,
            srid: Some(srid),
            error: None,
        }
    }

    fn invalid(error: String) -> ValidityResult {
        ValidityResult {
            valid: false,
            srid: None,
            error: Some(error),
        }
    }
}

/// The SRID decision ladder. Each rung assumes the ones above it passed.
pub fn judge_srid(
    has_geometry_column: bool,
    stored_srid: Option<i32>,
    expected_srid: i32,
) -> ValidityResult {
    if !has_geometry_column {
        return ValidityResult::invalid(String::from("No geometry column found."));
    }

    match stored_srid {
        None => ValidityResult::invalid(String::from(
            "SRID not found or no geometries for this user.",
        )),
        Some(0) => ValidityResult::invalid(String::from(
            "Invalid SRID (0). Please set a valid SRID.",
        )),
        Some(srid) if srid != expected_srid => ValidityResult::invalid(format!(
            "Table must use SRID {}. Found: {}",
            expected_srid, srid
        )),
        Some(srid) => ValidityResult::valid(srid),
    }
}

// First value of `expression` over the user's non-null geometries.
async fn first_value<T>(
    conn: &mut PgConnection,
    table: &SpatialTable,
    scope: &TenantScope,
    expression: &str,
) -> Result<Option<T>, Error>
where
    T: for<'r> Decode<'r, Postgres> + Type<Postgres> + Send + Unpin,
{
    let sql = format!(
        "SELECT {} FROM {} AS t {} LIMIT 1",
        expression,
        table.qualified_name(),
        scope.where_clause(table, 1)
    );

    let mut statement = query_scalar::<Postgres, Option<T>>(&sql);
    if scope.is_scoped() {
        statement = statement.bind(scope.user_id);
    }

    Ok(statement.fetch_optional(&mut *conn).await?.flatten())
}

/// Checks the SRID of one of the user's stored geometries.
pub async fn check_srid(
    conn: &mut PgConnection,
    config: &ServiceConfig,
    schema: &str,
    table: &str,
    user_id: i64,
) -> Result<ValidityResult, Error> {
    let table = match catalog::geometry_column(conn, schema, table).await? {
        Some(table) => table,
        None => return Ok(judge_srid(false, None, config.expected_srid)),
    };
    let scope = scope::resolve(conn, config, &table, user_id).await?;

    let expression = format!("ST_SRID(t.{})", table.quoted_geometry_column());
    let srid = first_value::<i32>(conn, &table, &scope, &expression).await?;

    Ok(judge_srid(true, srid, config.expected_srid))
}

/// The geometry type tag (e.g. `ST_MultiPolygon`) of one of the user's rows.
pub async fn geometry_type(
    conn: &mut PgConnection,
    config: &ServiceConfig,
    schema: &str,
    table: &str,
    user_id: i64,
) -> Result<Option<String>, Error> {
    let table = match catalog::geometry_column(conn, schema, table).await? {
        Some(table) => table,
        None => return Ok(None),
    };
    let scope = scope::resolve(conn, config, &table, user_id).await?;

    let expression = format!("ST_GeometryType(t.{})", table.quoted_geometry_column());
    first_value::<String>(conn, &table, &scope, &expression).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srid_ladder() {
        assert_eq!(
            Some(String::from("No geometry column found.")),
            judge_srid(false, None, 4326).error
        );
        assert_eq!(
            Some(String::from("SRID not found or no geometries for this user.")),
            judge_srid(true, None, 4326).error
        );
        assert_eq!(
            Some(String::from("Invalid SRID (0). Please set a valid SRID.")),
            judge_srid(true, Some(0), 4326).error
        );
        assert_eq!(
            Some(String::from("Table must use SRID 4326. Found: 3857")),
            judge_srid(true, Some(3857), 4326).error
        );

        let ok = judge_srid(true, Some(4326), 4326);
        assert_eq!(true, ok.valid);
        assert_eq!(Some(4326), ok.srid);
        assert_eq!(None, ok.error);
    }

    #[test]
    fn test_srid_ladder_order() {
        // A missing column outranks any SRID a lookup could have found
        let result = judge_srid(false, Some(0), 4326);
        assert_eq!(Some(String::from("No geometry column found.")), result.error);

        // No rows for the user is reported as such, never as a bad SRID
        let result = judge_srid(true, None, 4326);
        assert_eq!(false, result.valid);
        assert!(result.error.unwrap().starts_with("SRID not found"));
    }

    #[test]
    fn test_srid_judgement_is_stable() {
        assert_eq!(judge_srid(true, Some(3857), 4326), judge_srid(true, Some(3857), 4326));
    }

    #[test]
    fn test_validity_result_json() {
        let valid = serde_json::to_value(judge_srid(true, Some(4326), 4326)).unwrap();
        assert_eq!(serde_json::json!({"valid": true, "srid": 4326}), valid);

        let invalid = serde_json::to_value(judge_srid(true, Some(3857), 4326)).unwrap();
        assert_eq!(
            serde_json::json!({"valid": false, "error": "Table must use SRID 4326. Found: 3857"}),
            invalid
        );
    }
}
