//! Census-tract environmental indicators overlaid with the road network.
//!
//! Loads a tract layer and a road layer, brings the roads into the tracts'
//! CRS, keeps the primary roads and draws them over an asthma choropleth.

pub mod colormap;
pub mod config;
pub mod crs;
pub mod data;
pub mod error;
pub mod figure;
pub mod procedure;
pub mod render;
pub mod reproject;
pub mod store;
pub mod surface;
pub mod types;

pub use error::{GisError, ProjectionError, Result};
pub use procedure::{AnalysisOutcome, AnalysisProcedure};
pub use store::{FileStore, VectorDataStore};
pub use surface::{PlottingSurface, Presented, RasterSurface};
