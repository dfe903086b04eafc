//! Retained figure scenes.
//!
//! A [`Figure`] is an explicit handle: every rendering call receives the
//! figure it draws on, so overlay order and target are never implicit.

use crate::colormap::{self, ColorScheme, Rgb};
use crate::crs::Crs;
use crate::error::{GisError, ProjectionError, Result};
use crate::types::{union_rect, ColumnRef, Dataset, FieldKind};
use geo::{BoundingRect, Geometry, Rect};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Largest raster side in pixels.
pub const MAX_PIXELS: u32 = 8192;

/// Physical figure size; pixels are `inches * dpi`, clamped to
/// `64..=MAX_PIXELS` per side.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct FigureSize {
    pub width_in: f64,
    pub height_in: f64,
    pub dpi: u32,
}

impl FigureSize {
    pub fn square(inches: f64) -> Self {
        Self {
            width_in: inches,
            height_in: inches,
            dpi: 100,
        }
    }

    pub fn pixels(&self) -> (u32, u32) {
        let px = |inches: f64| ((inches * f64::from(self.dpi)).round() as u32).clamp(64, MAX_PIXELS);
        (px(self.width_in), px(self.height_in))
    }
}

impl Default for FigureSize {
    fn default() -> Self {
        Self::square(12.0)
    }
}

/// Request for a legend, optionally with a label.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegendSpec {
    pub label: Option<String>,
}

impl LegendSpec {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
        }
    }
}

/// Single solid color for an overlay layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorSpec {
    pub color: Rgb,
    pub line_width: u32,
}

impl ColorSpec {
    pub fn solid(color: Rgb) -> Self {
        Self {
            color,
            line_width: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Legend {
    Colorbar {
        label: Option<String>,
        scheme: ColorScheme,
        min: f64,
        max: f64,
    },
    Categories {
        label: Option<String>,
        entries: Vec<(String, Rgb)>,
    },
}

/// How the features of one layer are colored.
#[derive(Debug, Clone, PartialEq)]
pub enum ColorScale {
    Uniform(Rgb),
    Continuous {
        scheme: ColorScheme,
        min: f64,
        max: f64,
    },
    Categorical(Vec<(String, Rgb)>),
}

impl ColorScale {
    fn legend(&self, spec: LegendSpec) -> Option<Legend> {
        match self {
            ColorScale::Uniform(_) => None,
            ColorScale::Continuous { scheme, min, max } => Some(Legend::Colorbar {
                label: spec.label,
                scheme: *scheme,
                min: *min,
                max: *max,
            }),
            ColorScale::Categorical(entries) => Some(Legend::Categories {
                label: spec.label,
                entries: entries.clone(),
            }),
        }
    }
}

/// One drawn dataset: geometries with a per-feature color.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub geometries: Vec<Geometry<f64>>,
    pub colors: Vec<Rgb>,
    pub line_width: u32,
    pub scale: ColorScale,
}

impl Layer {
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    fn bounds(&self) -> Option<Rect<f64>> {
        self.geometries
            .iter()
            .filter_map(|g| g.bounding_rect())
            .reduce(union_rect)
    }

    /// Every feature in `color`.
    pub fn solid(dataset: &Dataset, color: ColorSpec) -> Self {
        Self {
            geometries: geometries(dataset),
            colors: vec![color.color; dataset.len()],
            line_width: color.line_width,
            scale: ColorScale::Uniform(color.color),
        }
    }

    /// Features colored by the values of `column`. Numeric columns map
    /// linearly onto `scheme` over their valid range; other kinds get a
    /// categorical palette. Nulls and values equal to `nodata` are drawn in
    /// [`Rgb::MISSING`] and excluded from the range.
    pub fn choropleth(
        dataset: &Dataset,
        column: &str,
        scheme: ColorScheme,
        nodata: Option<f64>,
    ) -> Result<Self> {
        let column = dataset.schema().column(column)?;
        let (colors, scale) = match column.kind {
            FieldKind::Numeric => continuous_colors(dataset, column, scheme, nodata),
            FieldKind::Text | FieldKind::Logical => categorical_colors(dataset, column),
        };

        Ok(Self {
            geometries: geometries(dataset),
            colors,
            line_width: 1,
            scale,
        })
    }
}

fn geometries(dataset: &Dataset) -> Vec<Geometry<f64>> {
    dataset.records().iter().map(|r| r.geometry.clone()).collect()
}

fn continuous_colors(
    dataset: &Dataset,
    column: ColumnRef,
    scheme: ColorScheme,
    nodata: Option<f64>,
) -> (Vec<Rgb>, ColorScale) {
    let valid = |v: Option<f64>| {
        v.filter(|v| v.is_finite() && !nodata.is_some_and(|nd| (v - nd).abs() < 1e-9))
    };

    let values: Vec<Option<f64>> = dataset
        .records()
        .iter()
        .map(|r| valid(r.value(column).as_f64()))
        .collect();

    let (mut min, mut max) = values
        .iter()
        .flatten()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));

    // All missing or constant column
    if !min.is_finite() || !max.is_finite() {
        min = 0.0;
        max = 1.0;
    } else if (max - min).abs() < f64::EPSILON {
        max = min + 1.0;
    }

    let colors = values
        .iter()
        .map(|v| match v {
            Some(v) => colormap::evaluate(scheme, (v - min) / (max - min)),
            None => Rgb::MISSING,
        })
        .collect();

    (colors, ColorScale::Continuous { scheme, min, max })
}

fn categorical_colors(dataset: &Dataset, column: ColumnRef) -> (Vec<Rgb>, ColorScale) {
    let categories: BTreeMap<String, Rgb> = dataset
        .records()
        .iter()
        .map(|r| r.value(column))
        .filter(|v| !v.is_null())
        .map(|v| v.to_string().trim_end().to_string())
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(i, name)| (name, colormap::categorical(i)))
        .collect();

    let colors = dataset
        .records()
        .iter()
        .map(|r| {
            let value = r.value(column);
            if value.is_null() {
                return Rgb::MISSING;
            }
            categories
                .get(value.to_string().trim_end())
                .copied()
                .unwrap_or(Rgb::MISSING)
        })
        .collect();

    (colors, ColorScale::Categorical(categories.into_iter().collect()))
}

/// A figure under construction: layers share one coordinate space.
#[derive(Debug, Clone)]
pub struct Figure {
    size: FigureSize,
    crs: Option<Crs>,
    layers: Vec<Layer>,
    legend: Option<Legend>,
    x_label: Option<String>,
    y_label: Option<String>,
    extent: Option<Rect<f64>>,
}

impl Figure {
    pub fn new(size: FigureSize, crs: Option<Crs>) -> Self {
        Self {
            size,
            crs,
            layers: Vec::new(),
            legend: None,
            x_label: None,
            y_label: None,
            extent: None,
        }
    }

    /// Start a figure from a base layer; a legend is attached when requested
    /// and the layer's scale has one.
    pub fn with_base(size: FigureSize, crs: Option<Crs>, layer: Layer, legend: Option<LegendSpec>) -> Self {
        let mut figure = Self::new(size, crs);
        figure.legend = legend.and_then(|spec| layer.scale.legend(spec));
        figure.push(layer);
        figure
    }

    /// Add a layer on top of the existing ones. The layer's CRS must match
    /// the figure's; the axes are kept and only the data extent grows.
    pub fn add_layer(&mut self, layer: Layer, crs: Option<&Crs>) -> Result<()> {
        let compatible = match (self.crs.as_ref(), crs) {
            (Some(a), Some(b)) => a.is_equivalent(b),
            (None, None) => true,
            _ => false,
        };
        if !compatible {
            let describe = |c: Option<&Crs>| c.map_or_else(|| "undefined".to_string(), Crs::identifier);
            return Err(GisError::Projection(ProjectionError::CrsMismatch(
                describe(self.crs.as_ref()),
                describe(crs),
            )));
        }
        self.push(layer);
        Ok(())
    }

    fn push(&mut self, layer: Layer) {
        self.extent = match (self.extent, layer.bounds()) {
            (Some(a), Some(b)) => Some(union_rect(a, b)),
            (a, b) => a.or(b),
        };
        self.layers.push(layer);
    }

    pub fn set_axis_labels(&mut self, x_label: impl Into<String>, y_label: impl Into<String>) {
        self.x_label = Some(x_label.into());
        self.y_label = Some(y_label.into());
    }

    pub fn size(&self) -> FigureSize {
        self.size
    }

    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn legend(&self) -> Option<&Legend> {
        self.legend.as_ref()
    }

    pub fn x_label(&self) -> Option<&str> {
        self.x_label.as_deref()
    }

    pub fn y_label(&self) -> Option<&str> {
        self.y_label.as_deref()
    }

    pub fn extent(&self) -> Option<Rect<f64>> {
        self.extent
    }
}
