use tilejson::Bounds;

pub const EARTH_CIRCUMFERENCE: f64 = 40_075_016.685_578_5;
pub const EARTH_RADIUS: f64 = EARTH_CIRCUMFERENCE / 2.0 / std::f64::consts::PI;

/// Maximum zoom level a tile index can address with 32-bit columns and rows.
pub const MAX_ZOOM: u8 = 30;

/// Convert a Web Mercator coordinate (meters) to longitude/latitude (degrees)
#[must_use]
pub fn webmercator_to_wgs84(x: f64, y: f64) -> (f64, f64) {
    let lng = (x / EARTH_RADIUS).to_degrees();
    let lat = f64::atan(f64::sinh(y / EARTH_RADIUS)).to_degrees();
    (lng, lat)
}

/// Geographic bounding box `[min_lng, min_lat, max_lng, max_lat]` of a single tile.
///
/// With `tms = true` the row is counted from the bottom (south) of the map,
/// otherwise from the top as in XYZ. Indexes outside of `0..2^zoom` are not
/// rejected: they are projected past the edge of the world, and callers clamp
/// the result if they need to.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub fn tile_bbox(x: i64, y: i64, zoom: u8, tms: bool) -> Bounds {
    let tiles = f64::from(1_u32 << zoom.min(MAX_ZOOM));
    let tile_size = EARTH_CIRCUMFERENCE / tiles;
    let y = if tms { y as f64 } else { tiles - 1.0 - y as f64 };
    let (min_lng, min_lat) = webmercator_to_wgs84(
        -0.5 * EARTH_CIRCUMFERENCE + x as f64 * tile_size,
        -0.5 * EARTH_CIRCUMFERENCE + y * tile_size,
    );
    let (max_lng, max_lat) = webmercator_to_wgs84(
        -0.5 * EARTH_CIRCUMFERENCE + (x as f64 + 1.0) * tile_size,
        -0.5 * EARTH_CIRCUMFERENCE + (y + 1.0) * tile_size,
    );
    Bounds::new(min_lng, min_lat, max_lng, max_lat)
}
