//! Vector data access.

use crate::crs::Crs;
use crate::data;
use crate::error::Result;
use crate::reproject;
use crate::types::{Dataset, Record};
use std::path::Path;

/// Source of vector datasets.
///
/// Only `load` is backend specific; reprojection and filtering operate on
/// in-memory datasets and never modify their input.
pub trait VectorDataStore {
    /// Load the dataset at `path`.
    ///
    /// # Errors
    ///
    /// `GisError::FileNotFound` if nothing exists at `path`, `GisError::Parse`
    /// if the format is unknown or the file is corrupt.
    fn load(&self, path: &Path) -> Result<Dataset>;

    /// Copy of `dataset` with every geometry transformed into `target`.
    fn reproject(&self, dataset: &Dataset, target: &Crs) -> Result<Dataset> {
        reproject::reproject(dataset, target)
    }

    /// Records satisfying `predicate`; may be empty.
    fn filter(&self, dataset: &Dataset, predicate: &dyn Fn(&Record) -> bool) -> Dataset {
        dataset.filter(predicate)
    }
}

/// Reads shapefiles and GeoJSON from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileStore;

impl VectorDataStore for FileStore {
    fn load(&self, path: &Path) -> Result<Dataset> {
        data::load_dataset(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AttributeValue, Field, FieldKind, Schema};
    use geo::point;

    #[test]
    fn default_filter_keeps_matching_records() {
        let schema = Schema::new(vec![Field::new("asthmaP", FieldKind::Numeric)]);
        let records = (0..5)
            .map(|i| Record::new(point!(x: i as f64, y: 0.0).into(), vec![AttributeValue::Float(i as f64 * 20.0)]))
            .collect();
        let tracts = Dataset::new("tracts", schema, records, Some(Crs::wgs84()));
        let column = tracts.schema().column("asthmaP").unwrap();

        let high = FileStore.filter(&tracts, &|r: &Record| r.value(column).as_f64().is_some_and(|v| v > 50.0));
        assert_eq!(high.len(), 2);
        assert_eq!(tracts.len(), 5);
    }

    #[test]
    fn file_store_reports_missing_files() {
        let err = FileStore.load(Path::new("missing/roads.geojson")).unwrap_err();
        assert!(matches!(err, crate::error::GisError::FileNotFound { .. }));
    }
}
