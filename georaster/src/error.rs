use thiserror::Error;

#[derive(Error, Debug)]
pub enum RasterError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("unsupported raster: {0}")]
    Unsupported(String),

    #[error("crop window ({width} x {height} px) has no area")]
    EmptyWindow { width: f64, height: f64 },

    #[error("band {0} out of range for raster with {1} band(s)")]
    BandIndex(usize, usize),

    #[error("expected {expected} samples per band, found {found}")]
    Dimensions { expected: usize, found: usize },
}
