use crate::colormap::{ColorScheme, Rgb};
use crate::figure::FigureSize;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub analysis: AnalysisConfig,
    pub figure: FigureSize,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InputConfig {
    pub tracts: PathBuf,
    pub roads: PathBuf,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            tracts: PathBuf::from("data/ces3shp/CESJune2018Update_SHP/CES3June2018Update.shp"),
            roads: PathBuf::from("data/tl_2019_06_prisecroads/tl_2019_06_prisecroads.shp"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalysisConfig {
    pub burden_column: String,
    pub asthma_column: String,
    pub asthma_legend: String,
    pub feature_class_column: String,
    pub primary_class: String,
    /// Score marking a tract with no data.
    pub nodata: Option<f64>,
    pub overlay_color: Rgb,
    pub colormap: ColorScheme,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            burden_column: "CIscoreP".to_string(),
            asthma_column: "asthmaP".to_string(),
            asthma_legend: "Asthma Percentile".to_string(),
            feature_class_column: "MTFCC".to_string(),
            primary_class: "S1100".to_string(),
            nodata: Some(-999.0),
            overlay_color: Rgb::BLACK,
            colormap: ColorScheme::Viridis,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OutputConfig {
    /// Where PNGs go. An empty path only rasterizes.
    pub figure_dir: Option<PathBuf>,
}

impl OutputConfig {
    pub fn figure_dir(&self) -> Option<&Path> {
        self.figure_dir
            .as_deref()
            .filter(|dir| !dir.as_os_str().is_empty())
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            figure_dir: Some(PathBuf::from("figures")),
        }
    }
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| "Failed to parse TOML configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.analysis.burden_column, "CIscoreP");
        assert_eq!(config.analysis.primary_class, "S1100");
        assert_eq!(config.analysis.nodata, Some(-999.0));
        assert_eq!(config.analysis.overlay_color, Rgb::BLACK);
        assert_eq!(config.figure, FigureSize::square(12.0));
        assert_eq!(config.output.figure_dir(), Some(Path::new("figures")));
    }

    #[test]
    fn empty_figure_dir_disables_saving() {
        let config: AppConfig = toml::from_str("[output]\nfigure_dir = \"\"\n").unwrap();
        assert_eq!(config.output.figure_dir(), None);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config: AppConfig = toml::from_str(
            r##"
            [analysis]
            asthma_column = "pm25P"
            overlay_color = "#ff0000"
            colormap = "greys"

            [figure]
            dpi = 72
            "##,
        )
        .unwrap();
        assert_eq!(config.analysis.asthma_column, "pm25P");
        assert_eq!(config.analysis.asthma_legend, "Asthma Percentile");
        assert_eq!(config.analysis.overlay_color, Rgb::new(255, 0, 0));
        assert_eq!(config.analysis.colormap, ColorScheme::Greys);
        assert_eq!(config.figure.dpi, 72);
        assert_eq!(config.figure.width_in, 12.0);
    }

    #[test]
    fn bad_color_is_rejected() {
        let result: std::result::Result<AppConfig, _> =
            toml::from_str("[analysis]\noverlay_color = \"chartreuse\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn load_from_file_reports_missing_file() {
        let err = AppConfig::load_from_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn sample_config_parses() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("config.toml");
        let config = AppConfig::load_from_file(&path).unwrap();
        assert_eq!(config.analysis.feature_class_column, "MTFCC");
        assert_eq!(config.figure.pixels(), (1200, 1200));
    }
}
