//! Figure construction and presentation.

use crate::colormap::{ColorScheme, Rgb};
use crate::error::Result;
use crate::figure::{ColorSpec, Figure, FigureSize, Layer, LegendSpec};
use crate::render;
use crate::types::Dataset;
use std::path::PathBuf;
use tracing::info;

/// What `present` produced for one figure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presented {
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

/// Target that figures are drawn on.
///
/// Every call takes the figure explicitly, so overlays always land on the
/// handle they were given.
pub trait PlottingSurface {
    /// New figure showing `dataset`, uniformly filled or colored by `color_column`.
    ///
    /// # Errors
    ///
    /// `GisError::ColumnNotFound` if `color_column` is not in the schema.
    fn render(
        &self,
        dataset: &Dataset,
        size: FigureSize,
        color_column: Option<&str>,
        legend: Option<LegendSpec>,
    ) -> Result<Figure>;

    /// Draw `dataset` on top of `figure` using its existing axes.
    ///
    /// # Errors
    ///
    /// `ProjectionError::CrsMismatch` if `dataset` is not in the figure's CRS.
    fn overlay(&self, figure: &mut Figure, dataset: &Dataset, color: ColorSpec) -> Result<()> {
        figure.add_layer(Layer::solid(dataset, color), dataset.crs())
    }

    fn set_axis_labels(&self, figure: &mut Figure, x_label: &str, y_label: &str) {
        figure.set_axis_labels(x_label, y_label);
    }

    /// Finish `figure` under `name`.
    fn present(&self, figure: &Figure, name: &str) -> Result<Presented>;
}

/// Rasterizes figures in memory, writing PNGs when an output directory is set.
#[derive(Debug, Clone, Default)]
pub struct RasterSurface {
    pub output_dir: Option<PathBuf>,
    pub nodata: Option<f64>,
    pub scheme: ColorScheme,
}

impl RasterSurface {
    pub fn new(output_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir,
            ..Default::default()
        }
    }

    pub fn with_nodata(mut self, nodata: Option<f64>) -> Self {
        self.nodata = nodata;
        self
    }

    pub fn with_scheme(mut self, scheme: ColorScheme) -> Self {
        self.scheme = scheme;
        self
    }
}

impl PlottingSurface for RasterSurface {
    fn render(
        &self,
        dataset: &Dataset,
        size: FigureSize,
        color_column: Option<&str>,
        legend: Option<LegendSpec>,
    ) -> Result<Figure> {
        let layer = match color_column {
            Some(column) => Layer::choropleth(dataset, column, self.scheme, self.nodata)?,
            None => Layer::solid(dataset, ColorSpec::solid(Rgb::DEFAULT_FILL)),
        };
        Ok(Figure::with_base(size, dataset.crs().cloned(), layer, legend))
    }

    fn present(&self, figure: &Figure, name: &str) -> Result<Presented> {
        let image = render::rasterize(figure)?;
        let (width, height) = image.dimensions();

        let path = match &self.output_dir {
            Some(dir) => {
                let path = dir.join(format!("{name}.png"));
                render::save_png(&image, &path)?;
                info!("Figure {} saved to {} ({}x{})", name, path.display(), width, height);
                Some(path)
            }
            None => {
                info!("Figure {} rasterized ({}x{})", name, width, height);
                None
            }
        };

        Ok(Presented { path, width, height })
    }
}
