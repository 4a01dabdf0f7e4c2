use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row as _, SqliteExecutor, TypeInfo as _, ValueRef as _, query};
use tracing::{debug, trace};
use url::Url;

use crate::errors::{MbtError, MbtResult, is_missing_table_error};
use crate::invert_y_value;

const GET_TILE_SQL: &str =
    "SELECT tile_data FROM tiles WHERE zoom_level = ? AND tile_column = ? AND tile_row = ?";

/// Raw tile bytes as stored in the `tiles` table
pub type TileData = Vec<u8>;

/// Location and naming of an `MBTiles` file.
#[derive(Clone, Debug)]
pub struct Mbtiles {
    filepath: String,
    filename: String,
    basename: String,
}

impl Display for Mbtiles {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.filepath)
    }
}

impl Mbtiles {
    pub fn new<P: AsRef<Path>>(filepath: P) -> MbtResult<Self> {
        let path = filepath.as_ref();
        Ok(Self {
            filepath: path
                .to_str()
                .ok_or_else(|| MbtError::UnsupportedCharsInFilepath(path.to_path_buf()))?
                .to_string(),
            filename: path
                .file_stem()
                .unwrap_or_else(|| OsStr::new("unknown"))
                .to_string_lossy()
                .to_string(),
            basename: path
                .file_name()
                .unwrap_or_else(|| OsStr::new("unknown"))
                .to_string_lossy()
                .to_string(),
        })
    }

    /// Parse an `mbtiles://` URI such as `mbtiles:///data/world%20map.mbtiles`.
    ///
    /// The path is percent-decoded. Query and fragment are dropped, and so is the host,
    /// except for `mbtiles://./file.mbtiles` and `mbtiles://../file.mbtiles`, which stay relative.
    /// Strings without the `mbtiles://` prefix are treated as plain paths.
    pub fn from_uri(uri: &str) -> MbtResult<Self> {
        if !uri.starts_with("mbtiles://") {
            return Self::new(uri);
        }
        let invalid = || MbtError::InvalidUri(uri.to_string());
        let url = Url::parse(uri).map_err(|_| invalid())?;
        if url.path().is_empty() {
            return Err(invalid());
        }
        let path = urlencoding::decode(url.path()).map_err(|_| invalid())?;
        let path = match url.host_str() {
            Some(host @ ("." | "..")) => format!("{host}{path}"),
            _ => path.into_owned(),
        };
        Self::new(PathBuf::from(path))
    }

    #[must_use]
    pub fn filepath(&self) -> &str {
        &self.filepath
    }

    /// File name without the extension, used as the dataset id
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// File name including the extension
    #[must_use]
    pub fn basename(&self) -> &str {
        &self.basename
    }

    #[must_use]
    pub fn readonly_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(self.filepath())
            .read_only(true)
    }

    /// Read a single tile using XYZ coordinates.
    ///
    /// The query is a persistent statement, so each connection prepares it once
    /// and reuses it for all later lookups.
    pub async fn get_tile<T>(&self, conn: &mut T, z: i32, x: i64, y: i64) -> MbtResult<TileData>
    where
        for<'e> &'e mut T: SqliteExecutor<'e>,
    {
        let tms_y = invert_y_value(z, y);
        let row = match query(GET_TILE_SQL)
            .bind(z)
            .bind(x)
            .bind(tms_y)
            .fetch_optional(&mut *conn)
            .await
        {
            Ok(row) => row,
            Err(err) if is_missing_table_error(&err) => {
                debug!("Unable to query tiles in {self}: {err}");
                return Err(MbtError::TileNotFound);
            }
            Err(err) => return Err(err.into()),
        };

        let Some(row) = row else {
            trace!("Couldn't find tile {z}/{x}/{y} (TMS row {tms_y}) in {self}");
            return Err(MbtError::TileNotFound);
        };

        let raw = row.try_get_raw(0)?;
        if raw.is_null() || raw.type_info().name() != "BLOB" {
            return Err(MbtError::InvalidTile);
        }
        let data: TileData = row.try_get(0)?;
        if data.is_empty() {
            return Err(MbtError::InvalidTile);
        }
        Ok(data)
    }
}
