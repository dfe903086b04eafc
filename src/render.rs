use crate::colormap::{self, Rgb};
use crate::error::{GisError, Result};
use crate::figure::{Figure, Layer, Legend};
use geo::{Area, Geometry, LineString, Rect};
use image::RgbImage;
use plotters::chart::ChartContext;
use plotters::coord::cartesian::Cartesian2d;
use plotters::coord::types::RangedCoordf64;
use plotters::coord::Shift;
use plotters::prelude::{
    BitMapBackend, ChartBuilder, Circle, Color, DrawingArea, DrawingAreaErrorKind, DrawingBackend,
    IntoDrawingArea, PathElement, Polygon as FillPolygon, RGBColor, Rectangle,
};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

const MARGIN: u32 = 20;
const X_LABEL_AREA: u32 = 40;
const Y_LABEL_AREA: u32 = 60;
// Fraction of the figure width given to the legend panel
const LEGEND_FRACTION: f64 = 0.15;
const COLORBAR_STEPS: u32 = 128;

type DrawResult<DB> = std::result::Result<(), DrawingAreaErrorKind<<DB as DrawingBackend>::ErrorType>>;

/// Flattened drawing primitive in data coordinates.
#[derive(Debug, Clone, PartialEq)]
enum Primitive {
    Fill { ring: Vec<(f64, f64)>, area: f64 },
    Path(Vec<(f64, f64)>),
    Dot((f64, f64)),
}

fn ring_points(ring: &LineString<f64>) -> Vec<(f64, f64)> {
    ring.coords().map(|c| (c.x, c.y)).collect()
}

fn primitives(geometry: &Geometry<f64>, out: &mut Vec<Primitive>) {
    match geometry {
        Geometry::Point(p) => out.push(Primitive::Dot((p.x(), p.y()))),
        Geometry::MultiPoint(mp) => out.extend(mp.iter().map(|p| Primitive::Dot((p.x(), p.y())))),
        Geometry::Line(l) => out.push(Primitive::Path(vec![(l.start.x, l.start.y), (l.end.x, l.end.y)])),
        Geometry::LineString(ls) => out.push(Primitive::Path(ring_points(ls))),
        Geometry::MultiLineString(mls) => out.extend(mls.iter().map(|ls| Primitive::Path(ring_points(ls)))),
        Geometry::Polygon(poly) => {
            out.push(Primitive::Fill {
                ring: ring_points(poly.exterior()),
                area: poly.unsigned_area(),
            });
            // Holes are outlined, not cut
            out.extend(poly.interiors().iter().map(|r| Primitive::Path(ring_points(r))));
        }
        Geometry::MultiPolygon(mp) => {
            for poly in mp {
                primitives(&Geometry::Polygon(poly.clone()), out);
            }
        }
        Geometry::Rect(r) => primitives(&Geometry::Polygon(r.to_polygon()), out),
        Geometry::Triangle(t) => primitives(&Geometry::Polygon(t.to_polygon()), out),
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                primitives(g, out);
            }
        }
    }
}

fn rgb(color: Rgb) -> RGBColor {
    RGBColor(color.r, color.g, color.b)
}

/// Axis ranges covering `extent` with a small pad, widened on one axis so
/// one data unit spans the same number of pixels horizontally and vertically.
pub fn fit_extent(extent: Option<Rect<f64>>, plot_width: u32, plot_height: u32) -> (Range<f64>, Range<f64>) {
    let Some(extent) = extent else {
        return (0.0..1.0, 0.0..1.0);
    };

    let center = extent.center();
    let width = if extent.width() > 0.0 { extent.width() } else { 1.0 };
    let height = if extent.height() > 0.0 { extent.height() } else { 1.0 };
    let (width, height) = (width * 1.04, height * 1.04);

    let plot_width = f64::from(plot_width.max(1));
    let plot_height = f64::from(plot_height.max(1));
    let units_per_px = (width / plot_width).max(height / plot_height);
    let (half_w, half_h) = (units_per_px * plot_width / 2.0, units_per_px * plot_height / 2.0);

    (
        center.x - half_w..center.x + half_w,
        center.y - half_h..center.y + half_h,
    )
}

/// Rasterize `figure` to an RGB image of its configured pixel size.
pub fn rasterize(figure: &Figure) -> Result<RgbImage> {
    let (width, height) = figure.size().pixels();
    let mut buffer = vec![0u8; width as usize * height as usize * 3];

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw_figure(figure, &root).map_err(|e| GisError::Render(e.to_string()))?;
        root.present().map_err(|e| GisError::Render(e.to_string()))?;
    }

    RgbImage::from_raw(width, height, buffer)
        .ok_or_else(|| GisError::Render(format!("pixel buffer does not match {width}x{height}")))
}

/// Write `image` as PNG, creating parent directories as needed.
pub fn save_png(image: &RgbImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    image
        .save(path)
        .map_err(|e| GisError::Render(format!("{}: {e}", path.display())))?;
    debug!("Saved {}", path.display());
    Ok(())
}

fn draw_figure<DB: DrawingBackend>(figure: &Figure, root: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
    root.fill(&RGBColor(255, 255, 255))?;

    match figure.legend() {
        Some(legend) => {
            let (width, _) = root.dim_in_pixel();
            let split = (f64::from(width) * (1.0 - LEGEND_FRACTION)).round() as i32;
            let (map_area, legend_area) = root.split_horizontally(split);
            draw_map(figure, &map_area)?;
            draw_legend(legend, &legend_area)
        }
        None => draw_map(figure, root),
    }
}

fn draw_map<DB: DrawingBackend>(figure: &Figure, area: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
    let (width, height) = area.dim_in_pixel();
    let plot_width = width.saturating_sub(2 * MARGIN + Y_LABEL_AREA);
    let plot_height = height.saturating_sub(2 * MARGIN + X_LABEL_AREA);
    let (x_range, y_range) = fit_extent(figure.extent(), plot_width, plot_height);

    let mut chart = ChartBuilder::on(area)
        .margin(MARGIN)
        .x_label_area_size(X_LABEL_AREA)
        .y_label_area_size(Y_LABEL_AREA)
        .build_cartesian_2d(x_range, y_range)?;

    draw_axes(figure, &mut chart)?;

    for layer in figure.layers() {
        draw_layer(layer, &mut chart)?;
    }
    Ok(())
}

type MapChart<'a, DB> = ChartContext<'a, DB, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

#[cfg(feature = "fonts")]
fn draw_axes<DB: DrawingBackend>(figure: &Figure, chart: &mut MapChart<'_, DB>) -> DrawResult<DB> {
    use plotters::prelude::IntoFont;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc(figure.x_label().unwrap_or_default())
        .y_desc(figure.y_label().unwrap_or_default())
        .label_style(("sans-serif", 12).into_font())
        .draw()
}

/// Without a font backend only the plot frame is drawn.
#[cfg(not(feature = "fonts"))]
fn draw_axes<DB: DrawingBackend>(figure: &Figure, chart: &mut MapChart<'_, DB>) -> DrawResult<DB> {
    if figure.x_label().is_some() || figure.y_label().is_some() {
        debug!("Built without fonts, axis labels skipped");
    }
    let (x, y) = (chart.x_range(), chart.y_range());
    chart.plotting_area().draw(&Rectangle::new(
        [(x.start, y.start), (x.end, y.end)],
        RGBColor(0, 0, 0).stroke_width(1),
    ))
}

#[cfg(feature = "fonts")]
fn draw_text<DB: DrawingBackend>(area: &DrawingArea<DB, Shift>, text: &str, at: (i32, i32)) -> DrawResult<DB> {
    use plotters::prelude::{IntoFont, Text};

    area.draw(&Text::new(text.to_string(), at, ("sans-serif", 14).into_font()))
}

#[cfg(not(feature = "fonts"))]
fn draw_text<DB: DrawingBackend>(_area: &DrawingArea<DB, Shift>, _text: &str, _at: (i32, i32)) -> DrawResult<DB> {
    Ok(())
}

fn draw_layer<DB: DrawingBackend>(layer: &Layer, chart: &mut MapChart<'_, DB>) -> DrawResult<DB> {
    let mut fills = Vec::new();
    let mut paths = Vec::new();
    let mut dots = Vec::new();

    for (geometry, &color) in layer.geometries.iter().zip(&layer.colors) {
        let mut prims = Vec::new();
        primitives(geometry, &mut prims);
        for prim in prims {
            match prim {
                Primitive::Fill { ring, area } => fills.push((area, ring, color)),
                Primitive::Path(points) => paths.push((points, color)),
                Primitive::Dot(point) => dots.push((point, color)),
            }
        }
    }

    // Largest first so small polygons stay visible
    fills.sort_by(|a, b| b.0.total_cmp(&a.0));

    let stroke = layer.line_width.max(1);
    chart.draw_series(
        fills
            .into_iter()
            .map(|(_, ring, color)| FillPolygon::new(ring, rgb(color).filled())),
    )?;
    chart.draw_series(
        paths
            .into_iter()
            .map(|(points, color)| PathElement::new(points, rgb(color).stroke_width(stroke))),
    )?;
    chart.draw_series(
        dots.into_iter()
            .map(|(point, color)| Circle::new(point, stroke + 2, rgb(color).filled())),
    )?;
    Ok(())
}

fn draw_legend<DB: DrawingBackend>(legend: &Legend, area: &DrawingArea<DB, Shift>) -> DrawResult<DB> {
    let (width, height) = area.dim_in_pixel();
    let (width, height) = (width as i32, height as i32);
    let left = 10;

    match legend {
        Legend::Colorbar {
            label,
            scheme,
            min,
            max,
        } => {
            let top = MARGIN as i32 + 30;
            let bottom = height - (MARGIN + X_LABEL_AREA) as i32;
            let bar_width = (width / 4).clamp(10, 40);
            let span = (bottom - top).max(1);

            for step in 0..COLORBAR_STEPS {
                let t0 = f64::from(step) / f64::from(COLORBAR_STEPS);
                let t1 = f64::from(step + 1) / f64::from(COLORBAR_STEPS);
                // t = 0 at the bottom
                let y0 = bottom - (t0 * f64::from(span)).round() as i32;
                let y1 = bottom - (t1 * f64::from(span)).round() as i32;
                let color = colormap::evaluate(*scheme, (t0 + t1) / 2.0);
                area.draw(&Rectangle::new([(left, y1), (left + bar_width, y0)], rgb(color).filled()))?;
            }
            area.draw(&Rectangle::new(
                [(left, top), (left + bar_width, bottom)],
                RGBColor(0, 0, 0).stroke_width(1),
            ))?;

            let ticks = [(*min, bottom), ((min + max) / 2.0, (top + bottom) / 2), (*max, top)];
            for (value, y) in ticks {
                draw_text(area, &format!("{value:.1}"), (left + bar_width + 6, y - 7))?;
            }
            if let Some(label) = label {
                draw_text(area, label, (left, MARGIN as i32))?;
            }
        }
        Legend::Categories { label, entries } => {
            let mut y = MARGIN as i32;
            if let Some(label) = label {
                draw_text(area, label, (left, y))?;
                y += 24;
            }
            for (name, color) in entries {
                area.draw(&Rectangle::new([(left, y), (left + 16, y + 16)], rgb(*color).filled()))?;
                draw_text(area, name, (left + 24, y + 1))?;
                y += 22;
            }
        }
    }
    Ok(())
}
