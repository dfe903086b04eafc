use crate::crs::{Crs, Transformer};
use crate::error::{ProjectionError, Result};
use crate::types::{Dataset, Record};
use geo::MapCoords;
use rayon::prelude::*;
use tracing::debug;

/// Transform every geometry of `dataset` into `target`, returning a new dataset.
///
/// The input is left untouched. Reprojecting into an equivalent CRS copies
/// the records unchanged, which makes the operation idempotent.
pub fn reproject(dataset: &Dataset, target: &Crs) -> Result<Dataset> {
    let source = dataset.crs().ok_or(ProjectionError::Undefined("source"))?;
    let transformer = Transformer::new(source, target)?;

    if transformer.is_identity() {
        debug!("{} already in {}, copying records", dataset.name(), target);
        return Ok(dataset.derive(dataset.records().to_vec(), Some(target.clone())));
    }

    debug!(
        "Reprojecting {} records of {} from {} to {}",
        dataset.len(),
        dataset.name(),
        source,
        target
    );

    let records = dataset
        .records()
        .par_iter()
        .map(|record| {
            let geometry = record
                .geometry
                .try_map_coords(|coord| transformer.transform(coord))?;
            Ok(Record::new(geometry, record.values.clone()))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(dataset.derive(records, Some(target.clone())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GisError;
    use crate::types::{AttributeValue, Field, FieldKind, Schema};
    use approx::assert_abs_diff_eq;
    use geo::{line_string, Geometry};

    fn roads_nad83() -> Dataset {
        let schema = Schema::new(vec![Field::new("MTFCC", FieldKind::Text)]);
        let records = vec![
            Record::new(
                line_string![(x: -121.5, y: 38.5), (x: -121.4, y: 38.6)].into(),
                vec![AttributeValue::from("S1100")],
            ),
            Record::new(
                line_string![(x: -118.3, y: 34.0), (x: -118.2, y: 34.1), (x: -118.1, y: 34.1)].into(),
                vec![AttributeValue::from("S1400")],
            ),
        ];
        Dataset::new("roads", schema, records, Some(Crs::from_epsg(4269).unwrap()))
    }

    fn coords(geometry: &Geometry<f64>) -> Vec<geo::Coord<f64>> {
        use geo::CoordsIter;
        geometry.coords_iter().collect()
    }

    #[test]
    fn reproject_produces_target_crs_without_touching_input() {
        let roads = roads_nad83();
        let before = roads.records().to_vec();
        let albers = Crs::from_epsg(3310).unwrap();

        let projected = reproject(&roads, &albers).unwrap();

        assert_eq!(projected.crs().and_then(Crs::epsg), Some(3310));
        assert_eq!(projected.len(), roads.len());
        assert_eq!(roads.crs().and_then(Crs::epsg), Some(4269));
        assert_eq!(roads.records(), before.as_slice());

        // metres, not degrees
        let first = coords(&projected.records()[0].geometry)[0];
        assert!(first.x.abs() > 1_000.0 && first.y.abs() > 1_000.0);
        assert_eq!(projected.records()[1].values, roads.records()[1].values);
    }

    #[test]
    fn reproject_is_idempotent() {
        let albers = Crs::from_epsg(3310).unwrap();
        let once = reproject(&roads_nad83(), &albers).unwrap();
        let twice = reproject(&once, &albers).unwrap();

        for (a, b) in once.records().iter().zip(twice.records()) {
            for (ca, cb) in coords(&a.geometry).iter().zip(coords(&b.geometry)) {
                assert_abs_diff_eq!(ca.x, cb.x, epsilon = 1e-9);
                assert_abs_diff_eq!(ca.y, cb.y, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn round_trip_returns_original_coordinates() {
        let roads = roads_nad83();
        let albers = Crs::from_epsg(3310).unwrap();
        let back = reproject(&reproject(&roads, &albers).unwrap(), roads.crs().unwrap()).unwrap();

        for (a, b) in roads.records().iter().zip(back.records()) {
            for (ca, cb) in coords(&a.geometry).iter().zip(coords(&b.geometry)) {
                assert_abs_diff_eq!(ca.x, cb.x, epsilon = 1e-8);
                assert_abs_diff_eq!(ca.y, cb.y, epsilon = 1e-8);
            }
        }
    }

    #[test]
    fn undefined_source_crs_is_a_projection_error() {
        let roads = roads_nad83();
        let unknown = roads.derive(roads.records().to_vec(), None);
        let err = reproject(&unknown, &Crs::from_epsg(3310).unwrap()).unwrap_err();
        assert!(matches!(
            err,
            GisError::Projection(ProjectionError::Undefined("source"))
        ));
    }
}
