use georaster::{Crs, RasterError};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChangeError {
    #[error("{0}")]
    Raster(#[from] RasterError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("raster CRS {} does not match reference CRS {}", crs_name(.found), crs_name(.expected))]
    CrsMismatch {
        expected: Option<Crs>,
        found: Option<Crs>,
    },

    #[error("rasters do not overlap")]
    NoOverlap,

    #[error("point cloud {} has no ground classified points", .0.display())]
    UnclassifiedPointCloud(PathBuf),

    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    #[error("projection: {0}")]
    Projection(String),

    #[error("missing input {}", .0.display())]
    MissingInput(PathBuf),

    #[error("missing required parameter '{0}'")]
    Builder(&'static str),

    #[error("{0}")]
    Json(#[from] serde_json::Error),

    #[error("grid size mismatch, {0:?} vs {1:?}")]
    GridMismatch((usize, usize), (usize, usize)),
}

fn crs_name(crs: &Option<Crs>) -> String {
    crs.map_or_else(|| "<none>".to_string(), |crs| crs.to_string())
}
