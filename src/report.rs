//! Read-only reports over a user's slice of a table.

use crate::catalog::{self, quote_ident, Column, SpatialTable};
use crate::config::ServiceConfig;
use crate::error::Error;
use crate::scope::{self, TenantScope};
use crate::tile::Extent;

use serde::Serialize;

use sqlx::{query, query_scalar, PgConnection, Postgres, Row};

const WGS84: i32 = 4326;

/// A non-geometry column, as offered for labelling.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

fn extent_sql(table: &SpatialTable, scope: &TenantScope) -> String {
    let geom = format!("t.{}", table.quoted_geometry_column());
    // Extents are reported in degrees
    let geom = if table.srid > 0 && table.srid != WGS84 {
        format!("ST_Transform({}, {})", geom, WGS84)
    } else {
        geom
    };

    format!(
        "SELECT ST_XMin(e) AS west, ST_YMin(e) AS south, ST_XMax(e) AS east, ST_YMax(e) AS north
         FROM (SELECT ST_Extent({}) AS e FROM {} AS t {}) AS extent",
        geom,
        table.qualified_name(),
        scope.where_clause(table, 1)
    )
}

fn field_descriptors(table: &SpatialTable, columns: &[Column]) -> Vec<FieldDescriptor> {
    let mut fields: Vec<FieldDescriptor> = columns
        .iter()
        .filter(|column| column.name != table.geometry_column && !column.is_spatial())
        .map(|column| FieldDescriptor {
            name: column.name.clone(),
            data_type: column.data_type.clone(),
        })
        .collect();
    fields.sort_by(|a, b| a.name.cmp(&b.name));

    fields
}

/// Bounding box of the user's non-null geometries, if there are any.
pub async fn extent(
    conn: &mut PgConnection,
    config: &ServiceConfig,
    schema: &str,
    table: &str,
    user_id: i64,
) -> Result<Option<Extent>, Error> {
    let table = match catalog::geometry_column(conn, schema, table).await? {
        Some(table) => table,
        None => return Ok(None),
    };
    let scope = scope::resolve(conn, config, &table, user_id).await?;

    let sql = extent_sql(&table, &scope);
    let mut statement = query::<Postgres>(&sql);
    if scope.is_scoped() {
        statement = statement.bind(scope.user_id);
    }
    let row = statement.fetch_one(&mut *conn).await?;

    let edges = (
        row.try_get::<Option<f64>, _>("west")?,
        row.try_get::<Option<f64>, _>("south")?,
        row.try_get::<Option<f64>, _>("east")?,
        row.try_get::<Option<f64>, _>("north")?,
    );

    Ok(match edges {
        (Some(west), Some(south), Some(east), Some(north)) => Some(Extent {
            west,
            south,
            east,
            north,
        }),
        _ => None,
    })
}

/// The table's non-geometry columns, sorted by name.
///
/// On a scoped table a user who owns no rows gets nothing back, so column
/// structure does not leak to non-owners.
pub async fn fields(
    conn: &mut PgConnection,
    config: &ServiceConfig,
    schema: &str,
    table: &str,
    user_id: i64,
) -> Result<Vec<FieldDescriptor>, Error> {
    let table = match catalog::geometry_column(conn, schema, table).await? {
        Some(table) => table,
        None => return Ok(Vec::new()),
    };
    let scope = scope::resolve(conn, config, &table, user_id).await?;

    if let Some(column) = &scope.column {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} AS t WHERE t.{} = $1)",
            table.qualified_name(),
            quote_ident(column)
        );
        let owns_rows: bool = query_scalar::<Postgres, bool>(&sql)
            .bind(scope.user_id)
            .fetch_one(&mut *conn)
            .await?;

        if !owns_rows {
            return Ok(Vec::new());
        }
    }

    let columns = catalog::table_columns(conn, &table).await?;
    Ok(field_descriptors(&table, &columns))
}
