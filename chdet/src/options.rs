use changedet::{georaster::Crs, DisplayMode};
use clap::{Args, Parser};
use std::path::PathBuf;

/// Detect structural change between two aerial surveys of a site.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub enum Cli {
    /// Compare two surveys given as DSM/DTM GeoTIFFs.
    Dems(Dems),

    /// Compare two surveys given as classified point clouds,
    /// rasterizing and aligning them first where needed.
    Clouds(Clouds),
}

#[derive(Debug, Clone, Args)]
pub struct Dems {
    /// Reference surface model.
    #[arg(long)]
    pub reference_dsm: PathBuf,

    /// Reference terrain model.
    #[arg(long)]
    pub reference_dtm: PathBuf,

    /// Surface model to compare against the reference.
    #[arg(long)]
    pub compare_dsm: PathBuf,

    /// Terrain model to compare against the reference.
    #[arg(long)]
    pub compare_dtm: PathBuf,

    #[command(flatten)]
    pub compare: CompareOpts,
}

#[derive(Debug, Clone, Args)]
pub struct Clouds {
    /// Reference point cloud.
    #[arg(long)]
    pub reference_pc: PathBuf,

    /// Point cloud to compare against the reference.
    #[arg(long)]
    pub compare_pc: PathBuf,

    /// Reference surface model, rasterized if missing.
    #[arg(long)]
    pub reference_dsm: PathBuf,

    /// Reference terrain model, rasterized if missing.
    #[arg(long)]
    pub reference_dtm: PathBuf,

    /// Surface model of the aligned compare cloud, built if missing.
    #[arg(long)]
    pub aligned_dsm: PathBuf,

    /// Terrain model of the aligned compare cloud, built if missing.
    #[arg(long)]
    pub aligned_dtm: PathBuf,

    /// `pdal` executable.
    #[arg(long, default_value = "pdal")]
    pub pdal: PathBuf,

    #[command(flatten)]
    pub compare: CompareOpts,
}

#[derive(Debug, Clone, Args)]
pub struct CompareOpts {
    /// Output coordinate reference system.
    #[arg(long, default_value_t = Crs::WEB_MERCATOR)]
    pub epsg: Crs,

    /// Finest pixel size to compare at, in raster units.
    #[arg(short, long, default_value_t = 0.5)]
    pub resolution: f64,

    /// Smallest height difference that counts as change.
    #[arg(long, default_value_t = 5.0)]
    pub min_height: f64,

    /// Smallest changed area reported as a contour.
    #[arg(long, default_value_t = 40.0)]
    pub min_area: f64,

    /// Output "contours" or "heatmap".
    #[arg(short, long, default_value_t = DisplayMode::Contours)]
    pub display: DisplayMode,

    /// Resample with bilinear instead of nearest neighbor.
    #[arg(long)]
    pub bilinear: bool,

    /// Output file.
    #[arg(short, long, default_value = "output.json")]
    pub out: PathBuf,
}
