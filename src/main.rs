use anyhow::{Context, Result};
use ces_overlay::config::AppConfig;
use ces_overlay::types::GeometryKind;
use ces_overlay::{AnalysisProcedure, FileStore, RasterSurface, VectorDataStore};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the tract / road overlay analysis
    Run {
        /// Configuration file; config.toml is used when present
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,
        /// Override the tract dataset
        #[arg(long, value_name = "PATH")]
        tracts: Option<PathBuf>,
        /// Override the road dataset
        #[arg(long, value_name = "PATH")]
        roads: Option<PathBuf>,
        /// Override the figure output directory
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Describe a vector dataset
    Info {
        path: PathBuf,
        /// Number of records to print
        #[arg(short, long, default_value_t = 5)]
        rows: usize,
    },
}

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install log subscriber")
}

fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    match path {
        Some(path) => AppConfig::load_from_file(path),
        None if Path::new("config.toml").exists() => AppConfig::load_from_file(Path::new("config.toml")),
        None => {
            info!("No config.toml, using defaults");
            Ok(AppConfig::default())
        }
    }
}

fn run(
    config: Option<PathBuf>,
    tracts: Option<PathBuf>,
    roads: Option<PathBuf>,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut app_config = load_config(config.as_deref())?;
    if let Some(tracts) = tracts {
        app_config.input.tracts = tracts;
    }
    if let Some(roads) = roads {
        app_config.input.roads = roads;
    }
    if let Some(output) = output {
        app_config.output.figure_dir = Some(output);
    }

    let surface = RasterSurface::new(app_config.output.figure_dir().map(Path::to_path_buf))
        .with_nodata(app_config.analysis.nodata)
        .with_scheme(app_config.analysis.colormap);
    let procedure = AnalysisProcedure::new(FileStore, surface, app_config.analysis.clone(), app_config.figure);

    let outcome = procedure
        .run(&app_config.input.tracts, &app_config.input.roads)
        .context("Analysis failed")?;

    for (name, presented) in &outcome.presented {
        match &presented.path {
            Some(path) => println!("{name}: {} ({}x{})", path.display(), presented.width, presented.height),
            None => println!("{name}: {}x{}", presented.width, presented.height),
        }
    }
    println!(
        "{} primary roads of {} overlaid on {} tracts",
        outcome.roads_primary.len(),
        outcome.roads.len(),
        outcome.tracts.len()
    );
    Ok(())
}

fn describe(path: &Path, rows: usize) -> Result<()> {
    let dataset = FileStore
        .load(path)
        .with_context(|| format!("Failed to load {:?}", path))?;

    println!("{}", dataset.name());
    println!(
        "  CRS:      {}",
        dataset.crs().map_or_else(|| "undefined".to_string(), |c| format!("{c} ({})", c.name()))
    );
    println!("  Records:  {}", dataset.len());
    let kinds: Vec<String> = dataset.geometry_kinds().iter().map(GeometryKind::to_string).collect();
    println!("  Geometry: {}", kinds.join(", "));
    if let Some(bounds) = dataset.bounds() {
        println!(
            "  Bounds:   ({:.3}, {:.3}) - ({:.3}, {:.3})",
            bounds.min().x,
            bounds.min().y,
            bounds.max().x,
            bounds.max().y
        );
    }

    println!("  Columns:");
    for field in dataset.schema().fields() {
        println!("    {:<16} {}", field.name, field.kind);
    }

    for (i, record) in dataset.records().iter().take(rows).enumerate() {
        let values: Vec<String> = record.values.iter().map(ToString::to_string).collect();
        println!("  [{i}] {}", values.join(" | "));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run {
            config,
            tracts,
            roads,
            output,
        } => run(config, tracts, roads, output),
        Commands::Info { path, rows } => describe(&path, rows),
    }
}
