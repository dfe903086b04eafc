//! The tract / road overlay analysis, run as one sequential procedure.

use crate::config::AnalysisConfig;
use crate::error::{ProjectionError, Result};
use crate::figure::{ColorSpec, Figure, FigureSize, LegendSpec};
use crate::store::VectorDataStore;
use crate::surface::{PlottingSurface, Presented};
use crate::types::{AttributeValue, Dataset, Record};
use std::path::Path;
use tracing::{info, info_span, warn};

/// Everything produced by one run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub tracts: Dataset,
    pub roads: Dataset,
    pub roads_reprojected: Dataset,
    pub roads_primary: Dataset,
    pub tracts_overview: Figure,
    pub tracts_burden: Figure,
    pub roads_overview: Figure,
    pub asthma_primary_roads: Figure,
    /// One entry per figure, in presentation order.
    pub presented: Vec<(String, Presented)>,
}

pub struct AnalysisProcedure<S, P> {
    store: S,
    surface: P,
    settings: AnalysisConfig,
    size: FigureSize,
}

impl<S: VectorDataStore, P: PlottingSurface> AnalysisProcedure<S, P> {
    pub fn new(store: S, surface: P, settings: AnalysisConfig, size: FigureSize) -> Self {
        Self {
            store,
            surface,
            settings,
            size,
        }
    }

    fn present(&self, figure: &Figure, name: &str, presented: &mut Vec<(String, Presented)>) -> Result<()> {
        let result = self.surface.present(figure, name)?;
        presented.push((name.to_string(), result));
        Ok(())
    }

    /// Run all steps in order; the first failure aborts the run.
    pub fn run(&self, tracts_path: &Path, roads_path: &Path) -> Result<AnalysisOutcome> {
        let mut presented = Vec::with_capacity(4);

        let tracts = info_span!("load_tracts").in_scope(|| -> Result<Dataset> {
            let tracts = self.store.load(tracts_path)?;
            info!(
                "Tracts: {} records, {} columns, CRS {}",
                tracts.len(),
                tracts.schema().len(),
                tracts.crs().map_or_else(|| "undefined".to_string(), |c| c.to_string())
            );
            Ok(tracts)
        })?;

        let tracts_overview = info_span!("render_tracts_overview").in_scope(|| -> Result<Figure> {
            let figure = self.surface.render(&tracts, self.size, None, None)?;
            self.present(&figure, "tracts_overview", &mut presented)?;
            Ok(figure)
        })?;

        let tracts_burden = info_span!("render_tracts_burden").in_scope(|| -> Result<Figure> {
            let figure = self.surface.render(
                &tracts,
                self.size,
                Some(self.settings.burden_column.as_str()),
                Some(LegendSpec::default()),
            )?;
            self.present(&figure, "tracts_burden", &mut presented)?;
            Ok(figure)
        })?;

        let roads = info_span!("load_roads").in_scope(|| -> Result<Dataset> {
            let roads = self.store.load(roads_path)?;
            info!(
                "Roads: {} records, native CRS {}",
                roads.len(),
                roads.crs().map_or_else(|| "undefined".to_string(), |c| c.to_string())
            );
            Ok(roads)
        })?;

        let roads_reprojected = info_span!("reproject_roads").in_scope(|| -> Result<Dataset> {
            let target = tracts.crs().ok_or(ProjectionError::Undefined("target"))?;
            let reprojected = self.store.reproject(&roads, target)?;
            info!("Roads reprojected to {}", target);
            Ok(reprojected)
        })?;

        let roads_overview = info_span!("render_roads_overview").in_scope(|| -> Result<Figure> {
            let mut figure = self.surface.render(&roads_reprojected, self.size, None, None)?;
            self.surface
                .set_axis_labels(&mut figure, "X coordinate (m)", "Y coordinate (m)");
            self.present(&figure, "roads_overview", &mut presented)?;
            Ok(figure)
        })?;

        let roads_primary = info_span!("filter_primary_roads").in_scope(|| -> Result<Dataset> {
            let column = roads_reprojected
                .schema()
                .column(&self.settings.feature_class_column)?;
            let class = AttributeValue::from(self.settings.primary_class.as_str());
            let primary = self
                .store
                .filter(&roads_reprojected, &|r: &Record| r.value(column).matches(&class));

            if primary.is_empty() {
                warn!(
                    "No roads with {} = {}",
                    self.settings.feature_class_column, self.settings.primary_class
                );
            } else {
                info!("{} of {} roads are {}", primary.len(), roads_reprojected.len(), self.settings.primary_class);
            }
            Ok(primary)
        })?;

        let asthma_primary_roads = info_span!("render_asthma_primary_roads").in_scope(|| -> Result<Figure> {
            let mut figure = self.surface.render(
                &tracts,
                self.size,
                Some(self.settings.asthma_column.as_str()),
                Some(LegendSpec::labelled(&self.settings.asthma_legend)),
            )?;
            self.surface
                .overlay(&mut figure, &roads_primary, ColorSpec::solid(self.settings.overlay_color))?;
            self.present(&figure, "asthma_primary_roads", &mut presented)?;
            Ok(figure)
        })?;

        Ok(AnalysisOutcome {
            tracts,
            roads,
            roads_reprojected,
            roads_primary,
            tracts_overview,
            tracts_burden,
            roads_overview,
            asthma_primary_roads,
            presented,
        })
    }
}
