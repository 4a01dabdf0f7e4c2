use std::time::SystemTime;

use mbt_tile_utils::{Encoding, Format, TileInfo};
use serde::Serialize;
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;

use crate::{Info, MbtResult};

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
const HTTP_DATE: &[BorrowedFormatItem<'static>] = format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Format a timestamp as an HTTP date, as used by the `Last-Modified` header
pub fn http_date(time: SystemTime) -> MbtResult<String> {
    Ok(OffsetDateTime::from(time).format(HTTP_DATE)?)
}

/// HTTP response headers of a tile
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TileHeaders {
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
    pub last_modified: Option<String>,
}

impl TileHeaders {
    /// Headers of a tile whose type is detected from its own bytes
    #[must_use]
    pub fn detect(data: &[u8]) -> Self {
        TileInfo::detect(data).map(Self::from).unwrap_or_default()
    }

    /// Headers shared by all tiles of a dataset, derived from its `format` and `compression`
    /// metadata values. Returns `None` if the format is not declared.
    #[must_use]
    pub fn from_metadata(info: &Info) -> Option<Self> {
        let format = info.format.as_deref().filter(|v| !v.is_empty())?;
        let Some(fmt) = Format::parse(format) else {
            return Some(Self {
                content_type: Some(format.to_string()),
                ..Default::default()
            });
        };
        let content_encoding = if fmt == Format::Mvt {
            match info.compression.as_deref() {
                None => Some("gzip".to_string()),
                Some(v) => Encoding::parse(v).map_or_else(
                    || Some(v.to_string()),
                    |enc| enc.content_encoding().map(str::to_string),
                ),
            }
        } else {
            None
        };
        Some(Self {
            content_type: Some(fmt.content_type().to_string()),
            content_encoding,
            last_modified: None,
        })
    }

    #[must_use]
    pub fn with_last_modified(mut self, last_modified: &str) -> Self {
        self.last_modified = Some(last_modified.to_string());
        self
    }

    /// Header name/value pairs that are set
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("Content-Type", &self.content_type),
            ("Content-Encoding", &self.content_encoding),
            ("Last-Modified", &self.last_modified),
        ]
        .into_iter()
        .filter_map(|(name, value)| value.as_deref().map(|v| (name, v)))
    }

    /// Case-insensitive header lookup
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }
}

impl From<TileInfo> for TileHeaders {
    fn from(ti: TileInfo) -> Self {
        Self {
            content_type: Some(ti.format.content_type().to_string()),
            content_encoding: ti.encoding.content_encoding().map(str::to_string),
            last_modified: None,
        }
    }
}

/// How a dataset handle derives the content headers of its tiles.
///
/// Starts as `Unresolved`, and moves exactly once to either `FromMetadata` or `PerTile`
/// on the first tile request. It never goes back.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum HeaderMode {
    #[default]
    Unresolved,
    /// All tiles share the headers declared by the metadata `format`
    FromMetadata(TileHeaders),
    /// No usable `format`: detect the type of each tile from its bytes
    PerTile,
}

impl HeaderMode {
    #[must_use]
    pub fn resolve(info: &Info) -> Self {
        TileHeaders::from_metadata(info).map_or(Self::PerTile, Self::FromMetadata)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Unresolved)
    }

    /// Content headers for the given tile. An unresolved mode behaves like `PerTile`.
    #[must_use]
    pub fn headers(&self, data: &[u8]) -> TileHeaders {
        match self {
            Self::FromMetadata(headers) => headers.clone(),
            Self::Unresolved | Self::PerTile => TileHeaders::detect(data),
        }
    }
}
