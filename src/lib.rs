//! # Tile Warden
//!
//! Tenant-scoped Mapbox Vector Tiles from arbitrary PostGIS tables.
//!
//! ## Current status
//!
//! Early. The operations below are complete and covered by tests against a
//! live PostGIS, but names and signatures may still move before 1.0. In
//! particular the `TileSource` trait may grow a user parameter once more than
//! one source type exists.
//!
//! ## Current features
//!
//! Given a PostGIS database holding user-uploaded tables, this crate will
//!
//! * discover spatial tables and their geometry columns from the live catalog,
//! * validate the SRID and geometry type of a user's rows,
//! * compile and run a single tile query per request, restricted to the rows
//!   the requesting user owns, and encode the result as a two-layer MVT
//!   (`features` and `labels`),
//! * report the extent and attribute fields of a user's slice of a table,
//! * read encoded tiles back for inspection (`decode`).
//!
//! ## Known Limitations
//!
//! Authentication is left to the calling application, which passes an already
//! resolved user id into every operation. Tables are introspected on every
//! request, so schema changes are picked up immediately at the cost of a few
//! catalog queries per tile. Compression of the encoded tiles is left to the
//! transport.

// TODO: remove once async fn in traits become stable
use async_trait::async_trait;

use sqlx::PgConnection;

pub mod catalog;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
pub mod query;
pub mod report;
pub mod scope;
pub mod service;
pub mod tile;
pub mod validate;

pub use config::{ServiceConfig, UnscopedTables};
pub use error::Error;
pub use query::TableLayer;
pub use report::FieldDescriptor;
pub use service::LayerService;
pub use tile::{Extent, TileCoord, TileRange};
pub use validate::ValidityResult;

/// This is the main trait exported by this crate. Anything that can render a
/// slippy map tile from a PostGIS connection implements it.
#[async_trait]
pub trait TileSource: Sized {
    /// Renders the Mapbox vector tile for a slippy map tile in XYZ format.
    ///
    /// A tile without any features renders as zero bytes.
    async fn render_mvt(&self, conn: &mut PgConnection, tile: TileCoord) -> Result<Vec<u8>, Error>;
}
