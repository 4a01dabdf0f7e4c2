//! Fallback inference for metadata values the `metadata` table does not provide.
//!
//! The passes run in order (zooms, bounds, center) because each one needs the
//! output of the previous one. A value that is already set is never replaced.

use mbt_tile_utils::{MAX_ZOOM, tile_bbox};
use sqlx::{Row as _, SqliteExecutor, query};
use tilejson::{Bounds, Center};
use tracing::debug;

use crate::Info;
use crate::errors::{MbtResult, is_missing_table_error};

/// Number of zoom levels probed by [`ensure_zooms`], starting at zero.
///
/// Tiles at zoom 30 and above are never discovered. This bound keeps the probe
/// to a fixed number of indexed point queries instead of a full table scan.
pub const ZOOM_PROBE_LIMIT: u8 = 30;

/// Set `minzoom` and `maxzoom` from the zoom levels present in the `tiles` table,
/// unless both are already set. Only levels below [`ZOOM_PROBE_LIMIT`] are checked.
/// If no level has tiles, both values are left untouched.
pub async fn ensure_zooms<T>(conn: &mut T, info: &mut Info) -> MbtResult<()>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    if info.minzoom.is_some() && info.maxzoom.is_some() {
        return Ok(());
    }

    let mut range: Option<(u8, u8)> = None;
    for zoom in 0..ZOOM_PROBE_LIMIT {
        let row = match query("SELECT zoom_level FROM tiles WHERE zoom_level = ? LIMIT 1")
            .bind(zoom)
            .fetch_optional(&mut *conn)
            .await
        {
            Ok(row) => row,
            Err(err) if is_missing_table_error(&err) => {
                debug!("Unable to detect zoom levels of {}: {err}", info.id);
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };
        if row.is_some() {
            range = Some(range.map_or((zoom, zoom), |(min, max)| (min.min(zoom), max.max(zoom))));
        }
    }

    if let Some((min, max)) = range {
        info.minzoom = Some(min);
        info.maxzoom = Some(max);
    }
    Ok(())
}

/// Set `bounds` from the extent of the tiles at `minzoom`, unless already set.
/// A `minzoom` above [`MAX_ZOOM`] cannot be projected and leaves `bounds` unset.
///
/// The result is clamped to `[-180, -90, 180, 90]`. It is only approximate at
/// zoom 0, and for tilesets that store tiles outside the valid index range.
pub async fn ensure_bounds<T>(conn: &mut T, info: &mut Info) -> MbtResult<()>
where
    for<'e> &'e mut T: SqliteExecutor<'e>,
{
    if info.bounds.is_some() {
        return Ok(());
    }
    let Some(zoom) = info.minzoom else {
        return Ok(());
    };
    if zoom > MAX_ZOOM {
        debug!("Not detecting bounds of {} at zoom {zoom}, above {MAX_ZOOM}", info.id);
        return Ok(());
    }

    let row = match query(
        "SELECT MIN(tile_column), MIN(tile_row), MAX(tile_column), MAX(tile_row)
         FROM tiles
         WHERE zoom_level = ?",
    )
    .bind(zoom)
    .fetch_one(&mut *conn)
    .await
    {
        Ok(row) => row,
        Err(err) if is_missing_table_error(&err) => {
            debug!("Unable to detect bounds of {}: {err}", info.id);
            return Ok(());
        }
        Err(err) => return Err(err.into()),
    };

    let min_x: Option<i64> = row.try_get(0)?;
    let min_y: Option<i64> = row.try_get(1)?;
    let max_x: Option<i64> = row.try_get(2)?;
    let max_y: Option<i64> = row.try_get(3)?;
    let (Some(min_x), Some(min_y), Some(max_x), Some(max_y)) = (min_x, min_y, max_x, max_y) else {
        return Ok(());
    };

    let upper_right = tile_bbox(max_x, max_y, zoom, true);
    let lower_left = tile_bbox(min_x, min_y, zoom, true);
    info.bounds = Some(Bounds::new(
        lower_left.left.max(-180.0),
        lower_left.bottom.max(-90.0),
        upper_right.right.min(180.0),
        upper_right.top.min(90.0),
    ));
    Ok(())
}

/// Set `center` to the middle of `bounds`, unless already set.
/// Requires `bounds`, `minzoom` and `maxzoom`.
pub fn ensure_center(info: &mut Info) {
    if info.center.is_some() {
        return;
    }
    let (Some(bounds), Some(minzoom), Some(maxzoom)) = (info.bounds, info.minzoom, info.maxzoom)
    else {
        return;
    };

    let range = i16::from(maxzoom) - i16::from(minzoom);
    let zoom = if range <= 1 {
        maxzoom
    } else {
        minzoom.saturating_add(u8::try_from(range / 2).unwrap_or(u8::MAX))
    };
    info.center = Some(Center {
        longitude: (bounds.right - bounds.left) / 2.0 + bounds.left,
        latitude: (bounds.top - bounds.bottom) / 2.0 + bounds.bottom,
        zoom,
    });
}
