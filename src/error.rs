#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid YAML in service configuration.")]
    Config(#[from] serde_yaml::Error),
    #[error("Unable to read service configuration: {0}")]
    ConfigIo(#[from] std::io::Error),
    #[error("Invalid service configuration: {0}")]
    InvalidConfig(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Failed to retrieve schemas and tables: {0}")]
    Introspection(#[source] sqlx::Error),
    #[error("{schema}.{table} is not a spatial table")]
    NotSpatial { schema: String, table: String },
    #[error("Tile {z}/{x}/{y} is outside the valid range")]
    InvalidTile { z: u8, x: u32, y: u32 },
    #[error("{schema}.{table} has no ownership column and is not public")]
    UnscopedTable { schema: String, table: String },
    #[error("Failed to encode tile: {0}")]
    Encode(#[from] mvt::Error),
    #[error("Malformed tile geometry: {0}")]
    Geometry(#[from] geozero::error::GeozeroError),
    #[error("Malformed vector tile: {0}")]
    Decode(#[from] prost::DecodeError),
}

impl Error {
    /// The HTTP status an outer transport should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidTile { .. } => 400,
            Error::UnscopedTable { .. } => 403,
            Error::NotSpatial { .. } => 404,
            Error::Database(sqlx::Error::PoolTimedOut)
            | Error::Database(sqlx::Error::PoolClosed)
            | Error::Database(sqlx::Error::Io(_)) => 503,
            _ => 500,
        }
    }

    /// Whether the failure was caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let invalid = Error::InvalidTile { z: 1, x: 2, y: 0 };
        assert_eq!(400, invalid.status_code());
        assert!(invalid.is_client_error());

        let missing = Error::NotSpatial {
            schema: String::from("public"),
            table: String::from("parcels"),
        };
        assert_eq!(404, missing.status_code());
        assert_eq!("public.parcels is not a spatial table", missing.to_string());

        assert_eq!(503, Error::Database(sqlx::Error::PoolTimedOut).status_code());
        assert_eq!(500, Error::Introspection(sqlx::Error::RowNotFound).status_code());
        assert!(!Error::Database(sqlx::Error::RowNotFound).is_client_error());
    }
}
