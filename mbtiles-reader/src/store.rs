use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::Arc;

use sqlx::{SqlitePool, query};
use tokio::sync::{OnceCell, RwLock};
use tracing::{debug, warn};

use crate::errors::{MbtError, MbtResult};
use crate::headers::{HeaderMode, TileHeaders, http_date};
use crate::inference::{ensure_bounds, ensure_center, ensure_zooms};
use crate::mbtiles::TileData;
use crate::{Info, Mbtiles};

/// A tile and the HTTP headers it should be served with
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tile {
    pub data: TileData,
    pub headers: TileHeaders,
}

/// Read-only handle to an open `MBTiles` dataset.
///
/// Wraps a pool of read-only `SQLite` connections, so tiles can be requested
/// concurrently. Clones are cheap and share the pool, the cached [`Info`]
/// record, and the header derivation state.
///
/// ```no_run
/// use mbtiles_reader::TileStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = TileStore::open("world.mbtiles").await?;
/// let info = store.get_info().await?;
/// println!("Zoom levels: {:?}-{:?}", info.minzoom, info.maxzoom);
///
/// let tile = store.get_tile(4, 5, 6).await?;
/// println!("{} bytes, {:?}", tile.data.len(), tile.headers.content_type);
/// store.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TileStore {
    mbtiles: Mbtiles,
    pool: SqlitePool,
    filesize: u64,
    last_modified: Arc<str>,
    info: Arc<OnceCell<Info>>,
    header_mode: Arc<RwLock<HeaderMode>>,
}

impl Debug for TileStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileStore")
            .field("path", &self.mbtiles.filepath())
            .field("filesize", &self.filesize)
            .field("last_modified", &self.last_modified)
            .field("closed", &self.pool.is_closed())
            .finish_non_exhaustive()
    }
}

impl TileStore {
    /// Opens an `MBTiles` file in read-only mode.
    ///
    /// The file size and modification time are captured once here.
    /// Fails if the file does not exist or is not an `SQLite` database.
    pub async fn open<P: AsRef<Path>>(filepath: P) -> MbtResult<Self> {
        Self::open_mbtiles(Mbtiles::new(filepath)?).await
    }

    /// Same as [`TileStore::open`], but accepts `mbtiles://` URIs, see [`Mbtiles::from_uri`]
    pub async fn open_uri(uri: &str) -> MbtResult<Self> {
        Self::open_mbtiles(Mbtiles::from_uri(uri)?).await
    }

    async fn open_mbtiles(mbtiles: Mbtiles) -> MbtResult<Self> {
        debug!("Opening as readonly {mbtiles}");
        let path = Path::new(mbtiles.filepath());
        let stat = tokio::fs::metadata(path)
            .await
            .map_err(|e| MbtError::IoError(e, path.to_path_buf()))?;
        let modified = stat
            .modified()
            .map_err(|e| MbtError::IoError(e, path.to_path_buf()))?;
        let last_modified = http_date(modified)?;

        let pool = SqlitePool::connect_with(mbtiles.readonly_options()).await?;
        // Reading the schema fails right away if this is not a database file
        if let Err(err) = query("SELECT count(*) FROM sqlite_master")
            .fetch_one(&pool)
            .await
        {
            pool.close().await;
            return Err(err.into());
        }

        Ok(Self {
            mbtiles,
            pool,
            filesize: stat.len(),
            last_modified: last_modified.into(),
            info: Arc::default(),
            header_mode: Arc::default(),
        })
    }

    #[must_use]
    pub fn mbtiles(&self) -> &Mbtiles {
        &self.mbtiles
    }

    /// Modification time of the file when it was opened, as an HTTP date
    #[must_use]
    pub fn last_modified(&self) -> &str {
        &self.last_modified
    }

    fn ensure_open(&self) -> MbtResult<()> {
        if self.pool.is_closed() {
            Err(MbtError::NotLoaded)
        } else {
            Ok(())
        }
    }

    /// Get a tile by its XYZ coordinates.
    ///
    /// Coordinates are not validated: anything that is not stored, including
    /// negative values, results in [`MbtError::TileNotFound`].
    pub async fn get_tile(&self, z: i32, x: i64, y: i64) -> MbtResult<Tile> {
        self.ensure_open()?;
        let mut conn = self.pool.acquire().await?;
        let data = self.mbtiles.get_tile(&mut *conn, z, x, y).await?;
        drop(conn);

        let headers = self
            .header_mode()
            .await?
            .headers(&data)
            .with_last_modified(&self.last_modified);
        Ok(Tile { data, headers })
    }

    /// Current header derivation state, resolving it on first use
    pub async fn header_mode(&self) -> MbtResult<HeaderMode> {
        self.ensure_open()?;
        {
            let mode = self.header_mode.read().await;
            if mode.is_resolved() {
                return Ok(mode.clone());
            }
        }

        let mut mode = self.header_mode.write().await;
        if !mode.is_resolved() {
            *mode = match self.get_info().await {
                Ok(info) => HeaderMode::resolve(info),
                Err(MbtError::NotLoaded) => return Err(MbtError::NotLoaded),
                Err(err) => {
                    warn!(
                        "Unable to read metadata of {}, detecting tile types per tile: {err}",
                        self.mbtiles
                    );
                    HeaderMode::PerTile
                }
            };
        }
        Ok(mode.clone())
    }

    /// Get the metadata record, inferring missing zoom levels, bounds and center
    /// from the stored tiles. Computed once, later calls return the cached record.
    /// A failed computation is not cached.
    pub async fn get_info(&self) -> MbtResult<&Info> {
        self.ensure_open()?;
        self.info.get_or_try_init(|| self.compute_info()).await
    }

    async fn compute_info(&self) -> MbtResult<Info> {
        let mut conn = self.pool.acquire().await?;
        let mut info = self.mbtiles.load_metadata(&mut *conn, self.filesize).await?;
        ensure_zooms(&mut *conn, &mut info).await?;
        ensure_bounds(&mut *conn, &mut info).await?;
        ensure_center(&mut info);
        Ok(info)
    }

    /// Close all connections. Any later call fails with [`MbtError::NotLoaded`].
    pub async fn close(&self) {
        debug!("Closing {}", self.mbtiles);
        self.pool.close().await;
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }
}
