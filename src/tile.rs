//! Slippy map tile coordinates and their envelopes.

use crate::error::Error;

use serde::Serialize;

/// Half the width of the EPSG:3857 square, in meters.
pub const EPSG_3857_ORIGIN: f64 = 20037508.342789244;

/// Deepest zoom level accepted from callers.
pub const MAX_ZOOM: u8 = 30;

/// Latitude limit of the Web Mercator square.
const MAX_LATITUDE: f64 = 85.0511287798066;

/// A validated XYZ tile address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

/// A rectangle in EPSG:3857 meters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TileBounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// A rectangle in WGS84 degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Extent {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

/// An inclusive block of tiles at a single zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileCoord {
    /// Validates that (x, y) lies inside the 2^z by 2^z grid.
    pub fn new(z: u8, x: u32, y: u32) -> Result<TileCoord, Error> {
        if z > MAX_ZOOM || u64::from(x) >= tiles_at(z) || u64::from(y) >= tiles_at(z) {
            return Err(Error::InvalidTile { z, x, y });
        }

        Ok(TileCoord { z, x, y })
    }

    /// The projected envelope of this tile.
    pub fn bounds(&self) -> TileBounds {
        get_epsg_3857_tile_bounds(self.z, self.x, self.y)
    }

    /// The geographic envelope of this tile.
    pub fn lon_lat_bounds(&self) -> Extent {
        let (west, north) = slippy_map_tilenames::tile2lonlat(self.x, self.y, self.z);
        let (east, south) = slippy_map_tilenames::tile2lonlat(self.x + 1, self.y + 1, self.z);

        Extent {
            west,
            south,
            east,
            north,
        }
    }
}

fn tiles_at(zoom: u8) -> u64 {
    1u64 << zoom
}

// Shared edges of neighbouring tiles go through the same expression, so they
// come out bit-identical.
fn grid_edge(index: u32, zoom: u8) -> f64 {
    let fraction = f64::from(index) / tiles_at(zoom) as f64;
    fraction * (2.0 * EPSG_3857_ORIGIN) - EPSG_3857_ORIGIN
}

/// Computes the EPSG:3857 envelope of a tile. Tile rows count down from the north.
pub fn get_epsg_3857_tile_bounds(zoom: u8, x: u32, y: u32) -> TileBounds {
    TileBounds {
        west: grid_edge(x, zoom),
        south: -grid_edge(y + 1, zoom),
        east: grid_edge(x + 1, zoom),
        north: -grid_edge(y, zoom),
    }
}

impl TileRange {
    /// The tiles at `zoom` touched by a geographic extent.
    pub fn covering(extent: &Extent, zoom: u8) -> TileRange {
        let zoom = zoom.min(MAX_ZOOM);
        let last = (tiles_at(zoom) - 1) as u32;
        let west = extent.west.clamp(-180.0, 180.0);
        let east = extent.east.clamp(-180.0, 180.0);
        let south = extent.south.clamp(-MAX_LATITUDE, MAX_LATITUDE);
        let north = extent.north.clamp(-MAX_LATITUDE, MAX_LATITUDE);

        let (x1, y1) = slippy_map_tilenames::lonlat2tile(west, north, zoom);
        let (x2, y2) = slippy_map_tilenames::lonlat2tile(east, south, zoom);

        TileRange {
            zoom,
            min_x: x1.min(x2).min(last),
            min_y: y1.min(y2).min(last),
            max_x: x1.max(x2).min(last),
            max_y: y1.max(y2).min(last),
        }
    }

    pub fn len(&self) -> u64 {
        u64::from(self.max_x - self.min_x + 1) * u64::from(self.max_y - self.min_y + 1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, tile: &TileCoord) -> bool {
        tile.z == self.zoom
            && (self.min_x..=self.max_x).contains(&tile.x)
            && (self.min_y..=self.max_y).contains(&tile.y)
    }

    /// Row-major iteration over every tile in the range.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> {
        let range = *self;
        (range.min_y..=range.max_y).flat_map(move |y| {
            (range.min_x..=range.max_x).map(move |x| TileCoord {
                z: range.zoom,
                x,
                y,
            })
        })
    }
}
