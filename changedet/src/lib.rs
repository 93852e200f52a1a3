//! Change detection between two aerial surveys of one site.
//!
//! Each survey is a surface model (DSM) and a terrain model (DTM).
//! Their difference is the height of whatever stands on the ground, and
//! [`Comparison`] reports where that height dropped or grew by more than
//! a threshold, either as outlined regions or as a point heatmap.
//!
//! Surveys that only exist as classified point clouds are turned into
//! elevation models by [`pointcloud::prepare_dems`] first.

mod align;
mod contour;
mod detect;
mod error;
mod grid;
mod mapper;
mod morph;
pub mod pointcloud;

pub use crate::{
    align::{align, align_altitudes, Resampler},
    contour::{BorderFollowing, Contour, ContourExtractor},
    detect::{
        compare, ChangeFeature, ChangeReport, Comparison, ComparisonBuilder, Dems, DisplayMode,
        Heatmap,
    },
    error::ChangeError,
    grid::{Grid, MaskedGrid},
    mapper::{pixels_to_coordinates, Proj4Reprojector, Reprojector},
    morph::{ellipse, EllipseFilter, MorphologicalFilter},
};
pub use georaster;

#[cfg(test)]
pub(crate) mod test_util {
    use georaster::{Crs, GeoTransform, Raster, C};

    /// Returns a single band Web Mercator raster with `f(row, col)`
    /// samples, -9999 no-data, and an upper-left corner at `origin`.
    pub fn raster<F: Fn(usize, usize) -> C>(
        width: usize,
        height: usize,
        origin: (C, C),
        res: C,
        f: F,
    ) -> Raster {
        let mut samples = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                samples.push(f(row, col));
            }
        }
        Raster::new(
            width,
            height,
            GeoTransform::new(origin.0, origin.1, res, -res),
            vec![samples],
        )
        .unwrap()
        .with_crs(Crs::WEB_MERCATOR)
        .with_nodata(-9999.0)
    }
}
