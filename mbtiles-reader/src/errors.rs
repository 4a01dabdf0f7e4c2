use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum MbtError {
    #[error("MBTiles not yet loaded")]
    NotLoaded,

    #[error("Tile does not exist")]
    TileNotFound,

    /// A row exists, but its `tile_data` is NULL, empty, or not a BLOB
    #[error("Tile is invalid")]
    InvalidTile,

    /// The storage engine reported an error. The message is the engine's own diagnostic.
    #[error("{message}")]
    StorageError {
        message: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Unable to parse json metadata value in {0}: {1}")]
    MetadataCorrupt(String, #[source] serde_json::Error),

    #[error("IO error {path}: {0}", path = .1.display())]
    IoError(#[source] std::io::Error, PathBuf),

    #[error("MBTile filepath contains unsupported characters: {}", .0.display())]
    UnsupportedCharsInFilepath(PathBuf),

    #[error("Invalid URI {0}")]
    InvalidUri(String),

    #[error(transparent)]
    TimeFormat(#[from] time::error::Format),
}

impl From<sqlx::Error> for MbtError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::PoolClosed) {
            return Self::NotLoaded;
        }
        let message = err
            .as_database_error()
            .map_or_else(|| err.to_string(), |e| e.message().to_string());
        Self::StorageError {
            message,
            source: err,
        }
    }
}

pub type MbtResult<T> = Result<T, MbtError>;

/// SQLite primary result code `SQLITE_ERROR` (1), e.g. "no such table".
/// Such errors mean the expected table is missing rather than the file being damaged.
pub(crate) fn is_missing_table_error(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(sqlx::error::DatabaseError::code)
        .is_some_and(|code| code == "1")
}
