#![doc = include_str!("../README.md")]

// This code was partially adapted from https://github.com/maplibre/mbtileserver-rs
// project originally written by Kaveh Karimi and licensed under MIT/Apache-2.0

use std::fmt::{Display, Formatter};

use serde::Serialize;

mod projection;
pub use projection::*;

/// Tile payload format, detected from the leading bytes or declared in metadata.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    Gif,
    Jpeg,
    Json,
    Mvt,
    Png,
    Webp,
}

impl Format {
    /// Parse a metadata `format` value. Only the names used by the `MBTiles` spec are recognized.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value {
            "pbf" => Self::Mvt,
            "jpg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::Webp,
            _ => None?,
        })
    }

    #[must_use]
    pub fn content_type(&self) -> &'static str {
        match *self {
            Self::Gif => "image/gif",
            Self::Jpeg => "image/jpeg",
            Self::Json => "application/json",
            Self::Mvt => "application/x-protobuf",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    #[must_use]
    pub fn metadata_format_value(&self) -> &'static str {
        match *self {
            Self::Gif => "gif",
            Self::Jpeg => "jpg",
            Self::Json => "json",
            Self::Mvt => "pbf",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl Display for Format {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.metadata_format_value())
    }
}

/// Transfer encoding of a tile payload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    /// Data is not compressed, but it can be
    #[default]
    Uncompressed,
    /// Some formats like JPEG and PNG are already compressed
    Internal,
    Gzip,
    Zlib,
    Brotli,
    Zstd,
}

impl Encoding {
    /// Parse a metadata `compression` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Some(match value.to_ascii_lowercase().as_str() {
            "none" | "identity" | "uncompressed" => Self::Uncompressed,
            "gzip" => Self::Gzip,
            "zlib" | "deflate" => Self::Zlib,
            "br" | "brotli" => Self::Brotli,
            "zstd" => Self::Zstd,
            _ => None?,
        })
    }

    /// Value of the `Content-Encoding` header, if any
    #[must_use]
    pub fn content_encoding(&self) -> Option<&'static str> {
        match *self {
            Self::Uncompressed | Self::Internal => None,
            Self::Gzip => Some("gzip"),
            Self::Zlib => Some("deflate"),
            Self::Brotli => Some("br"),
            Self::Zstd => Some("zstd"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct TileInfo {
    pub format: Format,
    pub encoding: Encoding,
}

impl TileInfo {
    #[must_use]
    pub fn new(format: Format, encoding: Encoding) -> Self {
        Self { format, encoding }
    }

    /// Try to figure out the format and encoding of the raw tile data.
    /// Returns `None` if the signature is not recognized.
    #[must_use]
    pub fn detect(value: &[u8]) -> Option<Self> {
        Some(match value {
            // Compressed prefixes assume MVT content
            v if v.starts_with(b"\x1f\x8b") => Self::new(Format::Mvt, Encoding::Gzip),
            v if v.starts_with(b"\x78\x9c") => Self::new(Format::Mvt, Encoding::Zlib),
            v if v.starts_with(b"\x89\x50\x4E\x47\x0D\x0A\x1A\x0A") => {
                Self::new(Format::Png, Encoding::Internal)
            }
            v if v.starts_with(b"GIF87a") || v.starts_with(b"GIF89a") => {
                Self::new(Format::Gif, Encoding::Internal)
            }
            v if v.starts_with(b"\xFF\xD8\xFF") => Self::new(Format::Jpeg, Encoding::Internal),
            v if v.len() >= 12 && v.starts_with(b"RIFF") && &v[8..12] == b"WEBP" => {
                Self::new(Format::Webp, Encoding::Internal)
            }
            v if v.starts_with(b"{") => Self::new(Format::Json, Encoding::Uncompressed),
            _ => None?,
        })
    }
}

impl From<Format> for TileInfo {
    fn from(format: Format) -> Self {
        Self::new(
            format,
            match format {
                Format::Png | Format::Jpeg | Format::Webp | Format::Gif => Encoding::Internal,
                Format::Mvt | Format::Json => Encoding::Uncompressed,
            },
        )
    }
}

impl Display for TileInfo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.format.content_type())?;
        if let Some(encoding) = self.encoding.content_encoding() {
            write!(f, "; encoding={encoding}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::png(b"\x89\x50\x4E\x47\x0D\x0A\x1A\x0A\x00\x00\x00\x0DIHDR", Format::Png, Encoding::Internal)]
    #[case::jpeg(b"\xFF\xD8\xFF\xE0\x00\x10JFIF", Format::Jpeg, Encoding::Internal)]
    #[case::gif87(b"GIF87a\x01\x00", Format::Gif, Encoding::Internal)]
    #[case::gif89(b"GIF89a\x01\x00", Format::Gif, Encoding::Internal)]
    #[case::webp(b"RIFF\x24\x00\x00\x00WEBPVP8 ", Format::Webp, Encoding::Internal)]
    #[case::gzip(b"\x1f\x8b\x08\x00\x00\x00", Format::Mvt, Encoding::Gzip)]
    #[case::zlib(b"\x78\x9c\x01\x02", Format::Mvt, Encoding::Zlib)]
    #[case::json(b"{\"type\":\"Feature\"}", Format::Json, Encoding::Uncompressed)]
    fn detect_known(#[case] data: &[u8], #[case] format: Format, #[case] encoding: Encoding) {
        assert_eq!(TileInfo::detect(data), Some(TileInfo::new(format, encoding)));
    }

    #[rstest]
    #[case::empty(b"")]
    #[case::one_byte(b"\x1f")]
    #[case::short_riff(b"RIFF\x00\x00")]
    #[case::riff_not_webp(b"RIFF\x24\x00\x00\x00WAVEfmt ")]
    #[case::plain_text(b"hello world")]
    fn detect_unknown(#[case] data: &[u8]) {
        assert_eq!(TileInfo::detect(data), None);
    }

    #[test]
    fn content_headers() {
        let ti = TileInfo::new(Format::Mvt, Encoding::Gzip);
        assert_eq!(ti.format.content_type(), "application/x-protobuf");
        assert_eq!(ti.encoding.content_encoding(), Some("gzip"));
        assert_eq!(ti.to_string(), "application/x-protobuf; encoding=gzip");

        let ti = TileInfo::from(Format::Png);
        assert_eq!(ti.encoding.content_encoding(), None);
        assert_eq!(ti.to_string(), "image/png");
    }

    #[test]
    fn parse_metadata_values() {
        assert_eq!(Format::parse("pbf"), Some(Format::Mvt));
        assert_eq!(Format::parse("jpg"), Some(Format::Jpeg));
        assert_eq!(Format::parse("png"), Some(Format::Png));
        assert_eq!(Format::parse("webp"), Some(Format::Webp));
        assert_eq!(Format::parse("jpeg"), None);
        assert_eq!(Format::parse("image/avif"), None);

        assert_eq!(Encoding::parse("GZIP"), Some(Encoding::Gzip));
        assert_eq!(Encoding::parse("deflate"), Some(Encoding::Zlib));
        assert_eq!(Encoding::parse("none"), Some(Encoding::Uncompressed));
        assert_eq!(Encoding::parse("lz4"), None);
    }
}
