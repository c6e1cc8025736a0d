//! Live introspection of the PostGIS catalog.
//!
//! Identifiers that end up in compiled SQL are taken from the rows returned
//! here, never from the strings a caller passed in.

use crate::error::Error;

use std::collections::BTreeMap;

use sqlx::{query, query_scalar, PgConnection, Postgres, Row};

/// A table registered in `geometry_columns`, as the catalog spells it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpatialTable {
    pub schema: String,
    pub table: String,
    pub geometry_column: String,
    /// Declared SRID; 0 when the column is unconstrained.
    pub srid: i32,
    /// Declared type, e.g. `MULTIPOLYGON` or `GEOMETRY`.
    pub geometry_type: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub udt_name: String,
}

impl SpatialTable {
    /// `"schema"."table"`, ready for a FROM clause.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.table))
    }

    pub fn quoted_geometry_column(&self) -> String {
        quote_ident(&self.geometry_column)
    }
}

impl Column {
    pub fn is_integer(&self) -> bool {
        matches!(self.data_type.as_str(), "smallint" | "integer" | "bigint")
    }

    pub fn is_spatial(&self) -> bool {
        matches!(
            self.udt_name.as_str(),
            "geometry" | "geography" | "box2d" | "box3d" | "raster"
        )
    }
}

/// Quotes an identifier for interpolation into SQL text.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal for interpolation into SQL text.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Every non-system schema with at least one geometry column, mapped to its
/// spatial tables. Not scoped to any user.
pub async fn list_spatial_tables(
    conn: &mut PgConnection,
    system_schemas: &[String],
) -> Result<BTreeMap<String, Vec<String>>, Error> {
    let rows = query(
        "SELECT DISTINCT f_table_schema::text AS schema_name, f_table_name::text AS table_name
         FROM geometry_columns
         WHERE NOT (f_table_schema::text = ANY($1))
         ORDER BY schema_name, table_name",
    )
    .bind(system_schemas)
    .fetch_all(&mut *conn)
    .await
    .map_err(Error::Introspection)?;

    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for row in rows {
        let schema: String = row.try_get("schema_name").map_err(Error::Introspection)?;
        let table: String = row.try_get("table_name").map_err(Error::Introspection)?;
        result.entry(schema).or_default().push(table);
    }

    Ok(result)
}

/// Looks up the geometry column of `schema.table`.
///
/// When a table registers several geometry columns the first one by name wins.
pub async fn geometry_column(
    conn: &mut PgConnection,
    schema: &str,
    table: &str,
) -> Result<Option<SpatialTable>, Error> {
    let row = query(
        "SELECT f_table_schema::text AS schema_name,
                f_table_name::text AS table_name,
                f_geometry_column::text AS column_name,
                srid,
                type::text AS geometry_type
         FROM geometry_columns
         WHERE f_table_schema::text = $1 AND f_table_name::text = $2
         ORDER BY f_geometry_column
         LIMIT 1",
    )
    .bind(schema)
    .bind(table)
    .fetch_optional(&mut *conn)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    Ok(Some(SpatialTable {
        schema: row.try_get("schema_name")?,
        table: row.try_get("table_name")?,
        geometry_column: row.try_get("column_name")?,
        srid: row.try_get::<Option<i32>, _>("srid")?.unwrap_or(0),
        geometry_type: row
            .try_get::<Option<String>, _>("geometry_type")?
            .unwrap_or_else(|| String::from("GEOMETRY")),
    }))
}

/// Whether the table carries the reserved ownership column.
pub async fn has_scoping_column(
    conn: &mut PgConnection,
    table: &SpatialTable,
    column: &str,
) -> Result<bool, Error> {
    let exists: bool = query_scalar::<Postgres, bool>(
        "SELECT EXISTS (
             SELECT 1 FROM information_schema.columns
             WHERE table_schema::text = $1 AND table_name::text = $2 AND column_name::text = $3
         )",
    )
    .bind(&table.schema)
    .bind(&table.table)
    .bind(column)
    .fetch_one(&mut *conn)
    .await?;

    Ok(exists)
}

/// All columns of the table in declaration order.
pub async fn table_columns(
    conn: &mut PgConnection,
    table: &SpatialTable,
) -> Result<Vec<Column>, Error> {
    let rows = query(
        "SELECT column_name::text AS column_name,
                data_type::text AS data_type,
                udt_name::text AS udt_name
         FROM information_schema.columns
         WHERE table_schema::text = $1 AND table_name::text = $2
         ORDER BY ordinal_position",
    )
    .bind(&table.schema)
    .bind(&table.table)
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<Column, Error> {
            Ok(Column {
                name: row.try_get("column_name")?,
                data_type: row.try_get("data_type")?,
                udt_name: row.try_get("udt_name")?,
            })
        })
        .collect()
}
