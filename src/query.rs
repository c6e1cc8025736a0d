/// Per-request tile query compilation for arbitrary user tables.
///
/// A `TableLayer` is resolved from the live catalog for every request and
/// compiles to a single statement returning the rows of both tile layers.
use crate::catalog::{self, quote_ident, quote_literal, Column, SpatialTable};
use crate::config::ServiceConfig;
use crate::encode::{encode_tile, TileFeature, LABELS_LAYER};
use crate::error::Error;
use crate::scope::{self, TenantScope};
use crate::tile::TileCoord;
use crate::TileSource;

// TODO: remove once async fn in traits become stable
use async_trait::async_trait;

use futures::TryStreamExt;
use geozero::{wkb::Wkb, ToGeo};
use serde_json::{Map, Value};

use sqlx::{postgres::PgRow, query, PgConnection, Postgres, Row};

// jsonb_build_object takes at most 100 arguments
const PROPERTIES_PER_OBJECT: usize = 50;

/// Bind parameters that every compiled tile statement starts with:
/// four envelope edges, the extent and the two buffers.
const FIXED_PARAMS: usize = 7;

/// A spatial table resolved for one user's tile request.
#[derive(Clone, Debug)]
pub struct TableLayer {
    pub table: SpatialTable,
    /// Integer column used as the MVT feature id.
    pub id_column: Option<String>,
    /// Attribute columns carried into both layers.
    pub attributes: Vec<String>,
    pub scope: TenantScope,
    pub extent: u32,
    pub feature_buffer: i32,
    pub label_buffer: i32,
}

impl TableLayer {
    /// Builds the descriptor from catalog answers.
    pub fn new(
        table: SpatialTable,
        columns: &[Column],
        scope: TenantScope,
        config: &ServiceConfig,
    ) -> TableLayer {
        let candidates: Vec<&Column> = columns
            .iter()
            .filter(|column| column.name != table.geometry_column && !column.is_spatial())
            .collect();

        let id_column = config.id_columns.iter().find_map(|name| {
            candidates
                .iter()
                .find(|column| &column.name == name && column.is_integer())
                .map(|column| column.name.clone())
        });

        let attributes = candidates
            .iter()
            .filter(|column| Some(&column.name) != id_column.as_ref())
            .map(|column| column.name.clone())
            .collect();

        TableLayer {
            table,
            id_column,
            attributes,
            scope,
            extent: config.extent,
            feature_buffer: config.feature_buffer,
            label_buffer: config.label_buffer,
        }
    }

    /// Resolves `schema.table` against the catalog for `user_id`.
    ///
    /// Fails with `Error::NotSpatial` before any tile query runs when the
    /// table has no geometry column.
    pub async fn resolve(
        conn: &mut PgConnection,
        config: &ServiceConfig,
        schema: &str,
        table: &str,
        user_id: i64,
    ) -> Result<TableLayer, Error> {
        let spatial = catalog::geometry_column(conn, schema, table)
            .await?
            .ok_or_else(|| Error::NotSpatial {
                schema: schema.to_string(),
                table: table.to_string(),
            })?;
        let scope = scope::resolve(conn, config, &spatial, user_id).await?;
        let columns = catalog::table_columns(conn, &spatial).await?;

        Ok(TableLayer::new(spatial, &columns, scope, config))
    }

    fn id_sql(&self) -> String {
        match &self.id_column {
            Some(column) => format!("t.{}::bigint", quote_ident(column)),
            None => String::from("NULL::bigint"),
        }
    }

    // Point tables are their own labels
    fn label_sql(&self) -> &'static str {
        if self.table.geometry_type == "POINT" {
            "source.geom"
        } else {
            "ST_PointOnSurface(source.geom)"
        }
    }

    fn properties_sql(&self) -> String {
        if self.attributes.is_empty() {
            return String::from("'{}'::jsonb");
        }

        let objects: Vec<String> = self
            .attributes
            .chunks(PROPERTIES_PER_OBJECT)
            .map(|chunk| {
                let pairs: Vec<String> = chunk
                    .iter()
                    .map(|name| format!("{}, t.{}", quote_literal(name), quote_ident(name)))
                    .collect();
                format!("jsonb_build_object({})", pairs.join(", "))
            })
            .collect();

        objects.join(" || ")
    }

    /// The single statement producing the rows of both layers.
    ///
    /// Parameters: `$1`-`$4` envelope, `$5` extent, `$6` feature buffer,
    /// `$7` label buffer, then the table SRID when declared, then the user id
    /// when the table is scoped.
    pub fn prepared_statement_sql(&self) -> String {
        let geom = self.table.quoted_geometry_column();
        let mut next_param = FIXED_PARAMS + 1;

        // Intersect in the table's own SRID so its spatial index applies
        let intersects = if self.table.srid > 0 {
            let clause = format!(
                "ST_Intersects(t.{}, ST_Transform(bounds.geom, ${}))",
                geom, next_param
            );
            next_param += 1;
            clause
        } else {
            // Rows without an SRID cannot be projected and are left out.
            // CASE fixes the evaluation order; AND does not.
            format!(
                "ST_Intersects(ST_Transform(CASE WHEN ST_SRID(t.{geom}) <> 0 THEN t.{geom} END, 3857), bounds.geom)",
                geom = geom
            )
        };

        format!(
            "WITH bounds AS (
    SELECT ST_MakeEnvelope($1, $2, $3, $4, 3857) AS geom
),
source AS (
    SELECT {id} AS feature_id, {properties} AS properties, ST_Transform(t.{geom}, 3857) AS geom
    FROM {table} AS t, bounds
    {filter} AND {intersects}
),
layers AS (
    SELECT 'features'::text AS layer, feature_id, properties,
           ST_AsMVTGeom(source.geom, bounds.geom::box2d, $5, $6, true) AS mvtgeom
    FROM source, bounds
    UNION ALL
    SELECT 'labels'::text AS layer, feature_id, properties,
           ST_AsMVTGeom({label}, bounds.geom::box2d, $5, $7, true) AS mvtgeom
    FROM source, bounds
)
SELECT layer, feature_id, properties, ST_AsBinary(mvtgeom) AS wkb
FROM layers
WHERE mvtgeom IS NOT NULL",
            id = self.id_sql(),
            properties = self.properties_sql(),
            geom = geom,
            table = self.table.qualified_name(),
            filter = self.scope.where_clause(&self.table, next_param),
            intersects = intersects,
            label = self.label_sql(),
        )
    }
}

fn decode_row(row: &PgRow) -> Result<TileFeature, Error> {
    let id: Option<i64> = row.try_get("feature_id")?;
    let properties: Option<Value> = row.try_get("properties")?;
    let wkb: Vec<u8> = row.try_get("wkb")?;

    Ok(TileFeature {
        id: id.and_then(|id| u64::try_from(id).ok()),
        geometry: Wkb(wkb).to_geo()?,
        properties: match properties {
            Some(Value::Object(map)) => map,
            _ => Map::new(),
        },
    })
}

#[async_trait]
impl TileSource for TableLayer {
    async fn render_mvt(&self, conn: &mut PgConnection, tile: TileCoord) -> Result<Vec<u8>, Error> {
        let bounds = tile.bounds();
        let extent = i32::try_from(self.extent)
            .map_err(|_| Error::InvalidConfig(format!("extent {} is out of range", self.extent)))?;
        let sql = self.prepared_statement_sql();
        tracing::debug!(%sql, "compiled tile query");

        let mut statement = query::<Postgres>(&sql)
            .bind(bounds.west)
            .bind(bounds.south)
            .bind(bounds.east)
            .bind(bounds.north)
            .bind(extent)
            .bind(self.feature_buffer)
            .bind(self.label_buffer);
        if self.table.srid > 0 {
            statement = statement.bind(self.table.srid);
        }
        if self.scope.is_scoped() {
            statement = statement.bind(self.scope.user_id);
        }

        let mut features = Vec::new();
        let mut labels = Vec::new();

        let mut rows = statement.fetch(&mut *conn);
        while let Some(row) = rows.try_next().await? {
            let layer: String = row.try_get("layer")?;
            let feature = decode_row(&row)?;
            if layer == LABELS_LAYER {
                labels.push(feature);
            } else {
                features.push(feature);
            }
        }

        tracing::debug!(
            features = features.len(),
            labels = labels.len(),
            "decoded tile rows"
        );

        encode_tile(&features, &labels, self.extent)
    }
}
