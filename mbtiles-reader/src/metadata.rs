use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;
use serde_json::{Map, Value as JSONValue};
use sqlx::{Row as _, SqliteExecutor, query};
use tilejson::{Bounds, Center};
use tracing::{debug, info, warn};

use crate::Mbtiles;
use crate::errors::{MbtError, MbtResult, is_missing_table_error};

/// Metadata description of an `MBTiles` dataset.
///
/// Recognized keys are typed fields. Everything else, including unrecognized
/// metadata rows and keys merged from the `json` row, is kept in `other`.
/// Serializes as a single flat object.
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Info {
    pub id: String,
    pub basename: String,
    pub filesize: u64,
    /// Always `xyz`: tiles are addressed with XYZ rows regardless of the storage scheme
    pub scheme: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "type")]
    pub layer_type: Option<String>,
    pub format: Option<String>,
    pub compression: Option<String>,
    pub minzoom: Option<u8>,
    pub maxzoom: Option<u8>,
    pub bounds: Option<Bounds>,
    pub center: Option<Center>,
    #[serde(flatten)]
    pub other: BTreeMap<String, JSONValue>,
}

impl Info {
    #[must_use]
    pub fn new(mbt: &Mbtiles, filesize: u64) -> Self {
        Self {
            id: mbt.filename().to_string(),
            basename: mbt.basename().to_string(),
            filesize,
            scheme: "xyz".to_string(),
            ..Default::default()
        }
    }

    /// True if the record has a value for the given key
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        match key {
            "id" | "basename" | "filesize" | "scheme" => true,
            "name" => self.name.is_some(),
            "description" => self.description.is_some(),
            "version" => self.version.is_some(),
            "type" => self.layer_type.is_some(),
            "format" => self.format.is_some(),
            "compression" => self.compression.is_some(),
            "minzoom" => self.minzoom.is_some(),
            "maxzoom" => self.maxzoom.is_some(),
            "bounds" => self.bounds.is_some(),
            "center" => self.center.is_some(),
            _ => self.other.contains_key(key),
        }
    }

    /// Store one metadata table row, converting values of the known numeric keys.
    /// Values that cannot be converted are logged and left unset.
    fn insert_row(&mut self, file: &str, name: String, value: String) {
        match name.as_str() {
            "id" => self.id = value,
            "basename" => self.basename = value,
            "filesize" => {
                if let Some(v) = to_val(value.trim().parse(), file, &name) {
                    self.filesize = v;
                }
            }
            "scheme" => {
                if value != "tms" {
                    info!("File {file} has metadata value {name}='{value}', but tiles are always read as 'tms'");
                }
            }
            "name" => self.name = Some(value),
            "description" => self.description = Some(value),
            "version" => self.version = Some(value),
            "type" => self.layer_type = Some(value),
            "format" => self.format = Some(value),
            "compression" => self.compression = Some(value),
            "minzoom" => self.minzoom = text_zoom(&value, file, &name),
            "maxzoom" => self.maxzoom = text_zoom(&value, file, &name),
            "bounds" => self.bounds = text_floats(&value, file, &name).and_then(to_bounds),
            "center" => self.center = text_floats(&value, file, &name).and_then(to_center),
            _ => {
                debug!("{file} has an unrecognized metadata value {name}={value}");
                self.other.insert(name, JSONValue::String(value));
            }
        }
    }

    /// Merge the top level keys of the `json` metadata document.
    /// Keys that already have a value are never overwritten.
    #[expect(clippy::cast_possible_truncation)]
    fn merge_json(&mut self, file: &str, json: Map<String, JSONValue>) {
        for (key, value) in json {
            if self.contains_key(&key) {
                continue;
            }
            match key.as_str() {
                "name" | "description" | "version" | "type" | "format" | "compression" => {
                    let Some(text) = value.as_str().map(ToString::to_string) else {
                        warn!("Ignoring non-string json metadata value {key} in {file}");
                        continue;
                    };
                    match key.as_str() {
                        "name" => self.name = Some(text),
                        "description" => self.description = Some(text),
                        "version" => self.version = Some(text),
                        "type" => self.layer_type = Some(text),
                        "format" => self.format = Some(text),
                        _ => self.compression = Some(text),
                    }
                }
                "minzoom" | "maxzoom" => {
                    let zoom = match &value {
                        JSONValue::String(s) => leading_int(s),
                        v => v.as_f64().map(|v| v.floor() as i64),
                    }
                    .and_then(|v| u8::try_from(v).ok());
                    if zoom.is_none() {
                        warn!("Unable to parse json metadata {key} value in {file}: {value}");
                    }
                    if key == "minzoom" {
                        self.minzoom = zoom;
                    } else {
                        self.maxzoom = zoom;
                    }
                }
                "bounds" => self.bounds = json_floats(&value, file, &key).and_then(to_bounds),
                "center" => self.center = json_floats(&value, file, &key).and_then(to_center),
                _ => {
                    self.other.insert(key, value);
                }
            }
        }
    }
}

fn to_val<V, E: Display>(val: Result<V, E>, file: &str, title: &str) -> Option<V> {
    match val {
        Ok(v) => Some(v),
        Err(err) => {
            warn!("Unable to parse metadata {title} value in {file}: {err}");
            None
        }
    }
}

/// Integer at the start of a text value, ignoring whatever follows it: `5.0` and `5 tiles` are both `5`
fn leading_int(value: &str) -> Option<i64> {
    let value = value.trim_start();
    let sign = usize::from(value.starts_with(['-', '+']));
    let end = value[sign..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(value.len(), |i| i + sign);
    value[..end].parse().ok()
}

fn text_zoom(value: &str, file: &str, title: &str) -> Option<u8> {
    let zoom = leading_int(value).and_then(|v| u8::try_from(v).ok());
    if zoom.is_none() {
        warn!("Unable to parse metadata {title} value in {file}: {value}");
    }
    zoom
}

fn split_floats(value: &str) -> Option<Vec<f64>> {
    value.split(',').map(|v| v.trim().parse().ok()).collect()
}

fn text_floats(value: &str, file: &str, title: &str) -> Option<Vec<f64>> {
    let values = split_floats(value);
    if values.is_none() {
        warn!("Unable to parse metadata {title} value in {file}: {value}");
    }
    values
}

/// Accepts either a JSON array of numbers or a comma-separated string
fn json_floats(value: &JSONValue, file: &str, title: &str) -> Option<Vec<f64>> {
    let values: Option<Vec<f64>> = match value {
        JSONValue::Array(items) => items.iter().map(JSONValue::as_f64).collect(),
        JSONValue::String(s) => split_floats(s),
        _ => None,
    };
    if values.is_none() {
        warn!("Unable to parse json metadata {title} value in {file}: {value}");
    }
    values
}

fn to_bounds(v: Vec<f64>) -> Option<Bounds> {
    match v.as_slice() {
        [left, bottom, right, top] => Some(Bounds::new(*left, *bottom, *right, *top)),
        _ => None,
    }
}

#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_center(v: Vec<f64>) -> Option<Center> {
    match v.as_slice() {
        [longitude, latitude, zoom] if (0.0..=f64::from(u8::MAX)).contains(zoom) => {
            Some(Center {
                longitude: *longitude,
                latitude: *latitude,
                zoom: zoom.floor() as u8,
            })
        }
        _ => None,
    }
}

impl Mbtiles {
    /// Build the base record from the metadata table: file naming, every metadata row,
    /// the merged `json` document, and the forced `xyz` scheme.
    /// No inference is done here, see [`crate::ensure_zooms`] and friends.
    pub async fn load_metadata<T>(&self, conn: &mut T, filesize: u64) -> MbtResult<Info>
    where
        for<'e> &'e mut T: SqliteExecutor<'e>,
    {
        let mut info = Info::new(self, filesize);
        let file = self.filename();

        let rows = match query("SELECT CAST(name AS TEXT), CAST(value AS TEXT) FROM metadata")
            .fetch_all(&mut *conn)
            .await
        {
            Ok(rows) => rows,
            Err(err) if is_missing_table_error(&err) => {
                debug!("No metadata table in {self}: {err}");
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };

        let mut json_docs = Vec::new();
        for row in rows {
            let name: Option<String> = row.try_get(0)?;
            let value: Option<String> = row.try_get(1)?;
            let (Some(name), Some(value)) = (name, value) else {
                continue;
            };
            if name == "json" {
                // The "json" row may carry nested and non-string values the flat table cannot
                let json: JSONValue = serde_json::from_str(&value)
                    .map_err(|e| MbtError::MetadataCorrupt(file.to_string(), e))?;
                json_docs.push(json);
            } else {
                info.insert_row(file, name, value);
            }
        }

        for json in json_docs {
            if let JSONValue::Object(obj) = json {
                info.merge_json(file, obj);
            } else {
                warn!("Metadata json value in {file} is not an object, ignoring it");
            }
        }

        info.scheme = "xyz".to_string();
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::mbtiles::tests::open_memory;

    const SCHEMA: &str = "CREATE TABLE metadata (name TEXT, value TEXT);";

    async fn load(sql: &str) -> MbtResult<Info> {
        let mut conn = open_memory(&format!("{SCHEMA} {sql}")).await;
        let mbt = Mbtiles::new("/data/plain_1.mbtiles")?;
        mbt.load_metadata(&mut conn, 42).await
    }

    #[actix_rt::test]
    async fn base_fields_only() -> MbtResult<()> {
        let info = load("").await?;
        assert_eq!(info.id, "plain_1");
        assert_eq!(info.basename, "plain_1.mbtiles");
        assert_eq!(info.filesize, 42);
        assert_eq!(info.scheme, "xyz");
        assert_eq!(
            serde_json::to_value(&info).unwrap(),
            json!({"id": "plain_1", "basename": "plain_1.mbtiles", "filesize": 42, "scheme": "xyz"})
        );
        Ok(())
    }

    #[actix_rt::test]
    async fn missing_metadata_table() -> MbtResult<()> {
        let mut conn = open_memory("CREATE TABLE other (a);").await;
        let mbt = Mbtiles::new("empty.mbtiles")?;
        let info = mbt.load_metadata(&mut conn, 0).await?;
        assert_eq!(info, Info::new(&mbt, 0));
        Ok(())
    }

    #[actix_rt::test]
    async fn coerced_values() -> MbtResult<()> {
        let info = load(
            "INSERT INTO metadata VALUES
                ('name', 'plain_1'),
                ('description', 'demo description'),
                ('version', '1.0.3'),
                ('type', 'baselayer'),
                ('format', 'png'),
                ('scheme', 'tms'),
                ('minzoom', '0'),
                ('maxzoom', 4),
                ('bounds', '-180,-85.05,180,85.05'),
                ('center', '0,7.5,2'),
                ('attribution', 'OSM'),
                ('nullvalue', NULL);",
        )
        .await?;

        assert_eq!(info.name.as_deref(), Some("plain_1"));
        assert_eq!(info.description.as_deref(), Some("demo description"));
        assert_eq!(info.version.as_deref(), Some("1.0.3"));
        assert_eq!(info.layer_type.as_deref(), Some("baselayer"));
        assert_eq!(info.format.as_deref(), Some("png"));
        assert_eq!(info.scheme, "xyz");
        assert_eq!(info.minzoom, Some(0));
        assert_eq!(info.maxzoom, Some(4));
        assert_eq!(info.bounds, Some(Bounds::new(-180.0, -85.05, 180.0, 85.05)));
        let center = info.center.unwrap();
        assert_relative_eq!(center.longitude, 0.0);
        assert_relative_eq!(center.latitude, 7.5);
        assert_eq!(center.zoom, 2);
        assert_eq!(info.other.get("attribution"), Some(&json!("OSM")));
        assert!(!info.other.contains_key("nullvalue"));
        Ok(())
    }

    #[actix_rt::test]
    async fn unparsable_values_are_left_unset() -> MbtResult<()> {
        let info = load(
            "INSERT INTO metadata VALUES
                ('minzoom', 'low'),
                ('maxzoom', '300'),
                ('bounds', '1,2,3'),
                ('center', 'a,b,c');",
        )
        .await?;
        assert_eq!(info.minzoom, None);
        assert_eq!(info.maxzoom, None);
        assert_eq!(info.bounds, None);
        assert_eq!(info.center, None);
        Ok(())
    }

    #[actix_rt::test]
    async fn loosely_formatted_values() -> MbtResult<()> {
        let info = load(
            "INSERT INTO metadata VALUES
                ('minzoom', '5.0'),
                ('maxzoom', ' 12 (street level)'),
                ('bounds', '-122.5, 37.7, -122.3, 37.9'),
                ('center', '-122.4,37.8,10.5');",
        )
        .await?;
        assert_eq!(info.minzoom, Some(5));
        assert_eq!(info.maxzoom, Some(12));
        assert_eq!(info.bounds, Some(Bounds::new(-122.5, 37.7, -122.3, 37.9)));
        let center = info.center.unwrap();
        assert_relative_eq!(center.longitude, -122.4);
        assert_relative_eq!(center.latitude, 37.8);
        assert_eq!(center.zoom, 10);
        Ok(())
    }

    #[test]
    fn leading_integers() {
        assert_eq!(leading_int("5.0"), Some(5));
        assert_eq!(leading_int("  7z"), Some(7));
        assert_eq!(leading_int("+3"), Some(3));
        assert_eq!(leading_int("-1"), Some(-1));
        assert_eq!(leading_int("z7"), None);
        assert_eq!(leading_int("-"), None);
        assert_eq!(leading_int(""), None);
    }

    #[actix_rt::test]
    async fn json_is_merged_only_if_absent() -> MbtResult<()> {
        let info = load(
            r#"INSERT INTO metadata VALUES
                ('json', '{"level1":{"level2":"property"},"custom":["custom list"],"name":"from json","minzoom":3,"maxzoom":5,"bounds":[1,2,3,4],"formatter":null}'),
                ('name', 'plain_1'),
                ('maxzoom', '4');"#,
        )
        .await?;

        assert_eq!(info.name.as_deref(), Some("plain_1"));
        assert_eq!(info.minzoom, Some(3));
        assert_eq!(info.maxzoom, Some(4));
        assert_eq!(info.bounds, Some(Bounds::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(info.other.get("level1"), Some(&json!({"level2": "property"})));
        assert_eq!(info.other.get("custom"), Some(&json!(["custom list"])));
        assert_eq!(info.other.get("formatter"), Some(&JSONValue::Null));
        assert!(!info.other.contains_key("json"));
        Ok(())
    }

    #[actix_rt::test]
    async fn json_cannot_override_scheme_or_file_fields() -> MbtResult<()> {
        let info = load(r#"INSERT INTO metadata VALUES ('json', '{"scheme":"tms","id":"other","filesize":1}');"#)
            .await?;
        assert_eq!(info.scheme, "xyz");
        assert_eq!(info.id, "plain_1");
        assert_eq!(info.filesize, 42);
        Ok(())
    }

    #[actix_rt::test]
    async fn json_not_an_object() -> MbtResult<()> {
        let info = load("INSERT INTO metadata VALUES ('json', '[1, 2, 3]');").await?;
        assert!(info.other.is_empty());
        Ok(())
    }

    #[actix_rt::test]
    async fn corrupt_json() {
        let err = load("INSERT INTO metadata VALUES ('json', '{\"level1\":');")
            .await
            .unwrap_err();
        assert!(matches!(err, MbtError::MetadataCorrupt(ref file, _) if file == "plain_1"));
    }
}
