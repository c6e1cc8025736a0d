//! The operations a map client calls, each on its own pooled connection.

use crate::catalog;
use crate::config::ServiceConfig;
use crate::error::Error;
use crate::query::TableLayer;
use crate::report::{self, FieldDescriptor};
use crate::tile::{Extent, TileCoord, TileRange};
use crate::validate::{self, ValidityResult};
use crate::TileSource;

use std::collections::BTreeMap;

use sqlx::PgPool;

/// Entry point for serving user layers.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Clone, Debug)]
pub struct LayerService {
    pool: PgPool,
    config: ServiceConfig,
}

impl LayerService {
    pub fn new(pool: PgPool, config: ServiceConfig) -> LayerService {
        LayerService { pool, config }
    }

    /// Opens the pool described by `config`.
    pub async fn connect(config: ServiceConfig) -> Result<LayerService, Error> {
        let pool = config.connect().await?;
        Ok(LayerService::new(pool, config))
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Spatial tables of every non-system schema. Not scoped to any user.
    #[tracing::instrument(skip(self))]
    pub async fn available_layers(&self) -> Result<BTreeMap<String, Vec<String>>, Error> {
        let mut conn = self.pool.acquire().await.map_err(Error::Introspection)?;
        catalog::list_spatial_tables(&mut *conn, &self.config.system_schemas).await
    }

    /// Renders tile `z/x/y` of `schema.table` as `user_id` sees it.
    #[tracing::instrument(skip(self))]
    pub async fn tile(
        &self,
        schema: &str,
        table: &str,
        z: u8,
        x: u32,
        y: u32,
        user_id: i64,
    ) -> Result<Vec<u8>, Error> {
        let tile = TileCoord::new(z, x, y)?;

        let mut conn = self.pool.acquire().await?;
        let layer = TableLayer::resolve(&mut *conn, &self.config, schema, table, user_id).await?;
        let data = layer.render_mvt(&mut *conn, tile).await?;

        tracing::debug!(bytes = data.len(), "rendered tile");
        Ok(data)
    }

    /// Bounding box of the user's geometries, in WGS84 degrees.
    #[tracing::instrument(skip(self))]
    pub async fn extent(
        &self,
        schema: &str,
        table: &str,
        user_id: i64,
    ) -> Result<Option<Extent>, Error> {
        let mut conn = self.pool.acquire().await?;
        report::extent(&mut *conn, &self.config, schema, table, user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn fields(
        &self,
        schema: &str,
        table: &str,
        user_id: i64,
    ) -> Result<Vec<FieldDescriptor>, Error> {
        let mut conn = self.pool.acquire().await?;
        report::fields(&mut *conn, &self.config, schema, table, user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn geometry_type(
        &self,
        schema: &str,
        table: &str,
        user_id: i64,
    ) -> Result<Option<String>, Error> {
        let mut conn = self.pool.acquire().await?;
        validate::geometry_type(&mut *conn, &self.config, schema, table, user_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn srid_check(
        &self,
        schema: &str,
        table: &str,
        user_id: i64,
    ) -> Result<ValidityResult, Error> {
        let mut conn = self.pool.acquire().await?;
        let result = validate::check_srid(&mut *conn, &self.config, schema, table, user_id).await?;

        if !result.valid {
            tracing::debug!(error = ?result.error, "srid check failed");
        }
        Ok(result)
    }

    /// The tiles at `zoom` covering the user's extent, if they have any rows.
    #[tracing::instrument(skip(self))]
    pub async fn tile_range(
        &self,
        schema: &str,
        table: &str,
        zoom: u8,
        user_id: i64,
    ) -> Result<Option<TileRange>, Error> {
        let extent = self.extent(schema, table, user_id).await?;
        Ok(extent.map(|extent| TileRange::covering(&extent, zoom)))
    }
}
