use crate::crs::Crs;
use crate::error::{GisError, Result};
use crate::types::{AttributeValue, Dataset, Field, FieldKind, Record, Schema};
use geo::{Geometry, GeometryCollection};
use geojson::GeoJson;
use shapefile::dbase::FieldValue;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Load a vector dataset, dispatching on the file extension.
///
/// Shapefiles read their CRS from the sibling `.prj`; GeoJSON is WGS84
/// unless a legacy `crs` member names another system.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(GisError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .ok_or_else(|| GisError::parse(path, "file has no extension"))?;

    let dataset = match extension.as_str() {
        "shp" => load_shapefile(path)?,
        "json" | "geojson" => load_geojson(path)?,
        other => return Err(GisError::parse(path, format!("unsupported format '{other}'"))),
    };

    info!(
        "Loaded {} records from {} ({})",
        dataset.len(),
        path.display(),
        dataset.crs().map_or_else(|| "no CRS".to_string(), Crs::identifier)
    );
    Ok(dataset)
}

fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("dataset")
        .to_string()
}

/// Column kinds come from the first non-null value; all-null columns are text.
fn infer_schema(names: Vec<String>, rows: &[Vec<AttributeValue>]) -> Schema {
    let fields = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let kind = rows
                .iter()
                .find_map(|row| row.get(i).and_then(AttributeValue::kind))
                .unwrap_or(FieldKind::Text);
            Field::new(name, kind)
        })
        .collect();
    Schema::new(fields)
}

fn empty_geometry() -> Geometry<f64> {
    Geometry::GeometryCollection(GeometryCollection(Vec::new()))
}

fn read_prj(path: &Path) -> Option<Crs> {
    let prj = path.with_extension("prj");
    let text = match fs::read_to_string(&prj) {
        Ok(text) => text,
        Err(_) => {
            warn!("No readable {}, CRS left undefined", prj.display());
            return None;
        }
    };
    match Crs::from_wkt(&text) {
        Ok(crs) => Some(crs),
        Err(e) => {
            warn!("Could not interpret {}: {e}", prj.display());
            None
        }
    }
}

fn dbase_value(value: &FieldValue) -> AttributeValue {
    match value {
        FieldValue::Character(Some(s)) => AttributeValue::Text(s.trim_end().to_string()),
        FieldValue::Memo(s) => AttributeValue::Text(s.clone()),
        FieldValue::Numeric(Some(n)) => AttributeValue::Float(*n),
        FieldValue::Float(Some(f)) => AttributeValue::Float(f64::from(*f)),
        FieldValue::Integer(i) => AttributeValue::Integer(i64::from(*i)),
        FieldValue::Double(d) => AttributeValue::Float(*d),
        FieldValue::Currency(c) => AttributeValue::Float(*c),
        FieldValue::Logical(Some(b)) => AttributeValue::Bool(*b),
        _ => AttributeValue::Null,
    }
}

fn load_shapefile(path: &Path) -> Result<Dataset> {
    let names: Vec<String> = shapefile::dbase::Reader::from_path(path.with_extension("dbf"))
        .map_err(|e| GisError::parse(path.with_extension("dbf"), e))?
        .fields()
        .iter()
        .map(|f| f.name().to_string())
        .filter(|name| name != "DeletionFlag")
        .collect();

    let mut reader = shapefile::Reader::from_path(path).map_err(|e| GisError::parse(path, e))?;

    let mut geometries = Vec::new();
    let mut rows = Vec::new();
    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let (shape, record) = result.map_err(|e| GisError::parse(path, e))?;

        let geometry = match shape {
            shapefile::Shape::NullShape => empty_geometry(),
            shape => Geometry::<f64>::try_from(shape)
                .map_err(|e| GisError::parse(path, format!("record {index}: {e:?}")))?,
        };

        let row = names
            .iter()
            .map(|name| record.get(name).map_or(AttributeValue::Null, dbase_value))
            .collect();

        geometries.push(geometry);
        rows.push(row);
    }
    debug!("Read {} shapes with {} attribute columns", geometries.len(), names.len());

    let schema = infer_schema(names, &rows);
    let records = geometries
        .into_iter()
        .zip(rows)
        .map(|(geometry, values)| Record::new(geometry, values))
        .collect();

    Ok(Dataset::new(dataset_name(path), schema, records, read_prj(path)))
}

fn json_value(value: &serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Null,
        serde_json::Value::Bool(b) => AttributeValue::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Integer(i),
            None => n.as_f64().map_or(AttributeValue::Null, AttributeValue::Float),
        },
        serde_json::Value::String(s) => AttributeValue::Text(s.clone()),
        other => AttributeValue::Text(other.to_string()),
    }
}

/// CRS named by the pre-RFC 7946 `crs` member, if any.
fn legacy_crs(path: &Path, members: Option<&geojson::JsonObject>) -> Result<Crs> {
    let name = members
        .and_then(|m| m.get("crs"))
        .and_then(|crs| crs.get("properties"))
        .and_then(|props| props.get("name"))
        .and_then(|name| name.as_str());

    match name {
        Some(name) => Crs::from_user_input(name).map_err(|e| GisError::parse(path, e)),
        None => Ok(Crs::wgs84()),
    }
}

fn load_geojson(path: &Path) -> Result<Dataset> {
    let text = String::from_utf8(fs::read(path)?).map_err(|e| GisError::parse(path, e))?;
    let geojson: GeoJson = text.parse().map_err(|e| GisError::parse(path, e))?;

    let (features, crs) = match geojson {
        GeoJson::FeatureCollection(fc) => {
            let crs = legacy_crs(path, fc.foreign_members.as_ref())?;
            (fc.features, crs)
        }
        GeoJson::Feature(feature) => {
            let crs = legacy_crs(path, feature.foreign_members.as_ref())?;
            (vec![feature], crs)
        }
        GeoJson::Geometry(geometry) => (
            vec![geojson::Feature::from(geometry)],
            Crs::wgs84(),
        ),
    };

    // Columns in first-seen order across all features
    let mut names: Vec<String> = Vec::new();
    for props in features.iter().filter_map(|f| f.properties.as_ref()) {
        for key in props.keys() {
            if !names.contains(key) {
                names.push(key.clone());
            }
        }
    }

    let mut geometries = Vec::with_capacity(features.len());
    let mut rows = Vec::with_capacity(features.len());
    for (index, feature) in features.into_iter().enumerate() {
        let geometry = match feature.geometry {
            Some(geometry) => Geometry::<f64>::try_from(geometry.value)
                .map_err(|e| GisError::parse(path, format!("feature {index}: {e}")))?,
            None => empty_geometry(),
        };
        let row = names
            .iter()
            .map(|name| {
                feature
                    .properties
                    .as_ref()
                    .and_then(|props| props.get(name))
                    .map_or(AttributeValue::Null, json_value)
            })
            .collect();
        geometries.push(geometry);
        rows.push(row);
    }

    let schema = infer_schema(names, &rows);
    let records = geometries
        .into_iter()
        .zip(rows)
        .map(|(geometry, values)| Record::new(geometry, values))
        .collect();

    Ok(Dataset::new(dataset_name(path), schema, records, Some(crs)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeometryKind;

    const ROADS: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4269" } },
        "features": [
            { "type": "Feature",
              "properties": { "MTFCC": "S1100", "FULLNAME": "I- 5" },
              "geometry": { "type": "LineString", "coordinates": [[-121.5, 38.5], [-121.4, 38.6]] } },
            { "type": "Feature",
              "properties": { "MTFCC": "S1400", "FULLNAME": null, "LANES": 2 },
              "geometry": { "type": "LineString", "coordinates": [[-118.3, 34.0], [-118.2, 34.1]] } }
        ]
    }"#;

    fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn loads_geojson_with_legacy_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "roads.geojson", ROADS);

        let roads = load_dataset(&path).unwrap();
        assert_eq!(roads.name(), "roads");
        assert_eq!(roads.len(), 2);
        assert_eq!(roads.crs().and_then(Crs::epsg), Some(4269));
        assert_eq!(roads.schema().names(), vec!["MTFCC", "FULLNAME", "LANES"]);
        assert_eq!(roads.schema().column("LANES").unwrap().kind, FieldKind::Numeric);
        assert_eq!(roads.schema().column("FULLNAME").unwrap().kind, FieldKind::Text);
        assert_eq!(roads.geometry_kinds(), vec![GeometryKind::Line]);

        let lanes = roads.schema().column("LANES").unwrap();
        assert!(roads.records()[0].value(lanes).is_null());
        assert_eq!(roads.records()[1].value(lanes), &AttributeValue::Integer(2));
    }

    #[test]
    fn geojson_without_crs_is_wgs84() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "site.json",
            r#"{ "type": "Feature", "properties": { "name": "a" },
                 "geometry": { "type": "Point", "coordinates": [-120.0, 37.0] } }"#,
        );
        let site = load_dataset(&path).unwrap();
        assert_eq!(site.crs().and_then(Crs::epsg), Some(4326));
        assert_eq!(site.geometry_kinds(), vec![GeometryKind::Point]);
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = load_dataset(Path::new("/nonexistent/tracts.shp")).unwrap_err();
        assert!(matches!(err, GisError::FileNotFound { .. }));
    }

    #[test]
    fn malformed_geojson_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.geojson", "{ \"type\": \"FeatureCollection\", ");
        assert!(matches!(load_dataset(&path).unwrap_err(), GisError::Parse { .. }));
    }

    #[test]
    fn non_utf8_geojson_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.geojson");
        fs::write(&path, b"{\xff\xfe}").unwrap();
        assert!(matches!(load_dataset(&path).unwrap_err(), GisError::Parse { .. }));
    }

    const TEALE_ALBERS_PRJ: &str = r#"PROJCS["NAD_1983_California_Teale_Albers",GEOGCS["GCS_North_American_1983",DATUM["D_North_American_1983",SPHEROID["GRS_1980",6378137.0,298.257222101]],PRIMEM["Greenwich",0.0],UNIT["Degree",0.0174532925199433]],PROJECTION["Albers"],PARAMETER["False_Easting",0.0],PARAMETER["False_Northing",-4000000.0],PARAMETER["Central_Meridian",-120.0],PARAMETER["Standard_Parallel_1",34.0],PARAMETER["Standard_Parallel_2",40.5],PARAMETER["Latitude_Of_Origin",0.0],UNIT["Meter",1.0]]"#;

    fn square(x: f64, y: f64) -> shapefile::Polygon {
        // Clockwise, so the ring is read back as an outer ring
        shapefile::Polygon::new(shapefile::PolygonRing::Outer(vec![
            shapefile::Point::new(x, y),
            shapefile::Point::new(x, y + 1.0),
            shapefile::Point::new(x + 1.0, y + 1.0),
            shapefile::Point::new(x + 1.0, y),
            shapefile::Point::new(x, y),
        ]))
    }

    /// Writes tracts.shp with two squares followed by a null shape, and a
    /// matching .dbf and .prj.
    fn write_tracts_shapefile(dir: &Path) -> std::path::PathBuf {
        use shapefile::dbase::{FieldName, FieldValue, Record as DbfRecord, TableWriterBuilder};

        let shp = dir.join("tracts.shp");
        {
            let mut writer = shapefile::ShapeWriter::from_path(&shp).unwrap();
            writer.write_shape(&square(0.0, 0.0)).unwrap();
            writer.write_shape(&square(2.0, 0.0)).unwrap();
        }

        // The writer cannot emit null shapes, so append one by hand: record
        // number 3, content of 2 words, shape type 0. The header length grows
        // by the 6 words of the record.
        fs::remove_file(shp.with_extension("shx")).unwrap();
        let mut bytes = fs::read(&shp).unwrap();
        bytes.extend_from_slice(&[0, 0, 0, 3, 0, 0, 0, 2, 0, 0, 0, 0]);
        let words = i32::from_be_bytes(bytes[24..28].try_into().unwrap()) + 6;
        bytes[24..28].copy_from_slice(&words.to_be_bytes());
        fs::write(&shp, bytes).unwrap();

        let mut table = TableWriterBuilder::new()
            .add_character_field(FieldName::try_from("COUNTY").unwrap(), 12)
            .add_numeric_field(FieldName::try_from("CIscoreP").unwrap(), 8, 2)
            .build_with_file_dest(shp.with_extension("dbf"))
            .unwrap();
        for (county, score) in [("Fresno", Some(91.5)), ("Kern", Some(-999.0)), ("Inyo", None)] {
            let mut record = DbfRecord::default();
            record.insert("COUNTY".to_string(), FieldValue::Character(Some(county.to_string())));
            record.insert("CIscoreP".to_string(), FieldValue::Numeric(score));
            table.write_record(&record).unwrap();
        }
        drop(table);

        write(dir, "tracts.prj", TEALE_ALBERS_PRJ);
        shp
    }

    #[test]
    fn loads_shapefile_with_prj_and_null_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tracts_shapefile(dir.path());

        let tracts = load_dataset(&path).unwrap();
        assert_eq!(tracts.name(), "tracts");
        assert_eq!(tracts.len(), 3);
        assert_eq!(tracts.crs().and_then(Crs::epsg), Some(3310));
        assert_eq!(tracts.schema().names(), vec!["COUNTY", "CIscoreP"]);

        let county = tracts.schema().column("COUNTY").unwrap();
        let score = tracts.schema().column("CIscoreP").unwrap();
        assert_eq!(county.kind, FieldKind::Text);
        assert_eq!(score.kind, FieldKind::Numeric);

        let records = tracts.records();
        assert_eq!(records[0].value(county), &AttributeValue::Text("Fresno".to_string()));
        assert_eq!(records[0].value(score), &AttributeValue::Float(91.5));
        assert_eq!(records[1].value(score), &AttributeValue::Float(-999.0));
        assert_eq!(records[2].value(county), &AttributeValue::Text("Inyo".to_string()));
        assert!(records[2].value(score).is_null());

        assert_eq!(GeometryKind::of(&records[0].geometry), GeometryKind::Polygon);
        assert_eq!(GeometryKind::of(&records[2].geometry), GeometryKind::Collection);
        let bounds = tracts.bounds().unwrap();
        assert_eq!((bounds.min().x, bounds.max().x), (0.0, 3.0));
    }

    #[test]
    fn shapefile_without_prj_has_no_crs() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_tracts_shapefile(dir.path());
        fs::remove_file(path.with_extension("prj")).unwrap();

        let tracts = load_dataset(&path).unwrap();
        assert_eq!(tracts.len(), 3);
        assert!(tracts.crs().is_none());
    }

    #[test]
    fn corrupt_shapefile_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "tracts.shp", "not a shapefile");
        write(dir.path(), "tracts.dbf", "not a dbase table");
        assert!(matches!(load_dataset(&path).unwrap_err(), GisError::Parse { .. }));
    }

    #[test]
    fn unknown_extension_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "tracts.csv", "a,b\n1,2\n");
        assert!(matches!(load_dataset(&path).unwrap_err(), GisError::Parse { .. }));
        let bare = write(dir.path(), "tracts", "");
        assert!(matches!(load_dataset(&bare).unwrap_err(), GisError::Parse { .. }));
    }
}
