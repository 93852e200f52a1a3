use crate::ChangeError;
use georaster::{Raster, RasterError, Resampling, C};
use log::{debug, info};

/// Puts a raster onto a new pixel lattice.
pub trait Resampler {
    fn resample(&self, raster: &Raster, x_res: C, y_res: C) -> Result<Raster, RasterError>;
}

impl Resampler for Resampling {
    fn resample(&self, raster: &Raster, x_res: C, y_res: C) -> Result<Raster, RasterError> {
        raster.resample(x_res, y_res, *self)
    }
}

/// Resamples `reference` and `others` onto one common grid and crops
/// them all to their shared extent.
///
/// The common pixel size is the coarsest width and height among the
/// inputs, widened to `target_resolution` when that is coarser still.
pub fn align<R: Resampler + ?Sized>(
    reference: Raster,
    others: Vec<Raster>,
    target_resolution: Option<C>,
    resampler: &R,
) -> Result<(Raster, Vec<Raster>), ChangeError> {
    for other in &others {
        if other.crs() != reference.crs() {
            return Err(ChangeError::CrsMismatch {
                expected: reference.crs(),
                found: other.crs(),
            });
        }
    }

    let (mut x_res, mut y_res) = reference.resolution();
    for (ox, oy) in others.iter().map(Raster::resolution) {
        x_res = x_res.max(ox);
        y_res = y_res.max(oy);
    }
    if let Some(target) = target_resolution {
        x_res = x_res.max(target);
        y_res = y_res.max(target);
    }
    info!(
        "aligning {} rasters at ({x_res}, {y_res})",
        others.len() + 1
    );

    let reference = resampler.resample(&reference, x_res, y_res)?;
    let others = others
        .iter()
        .map(|r| resampler.resample(r, x_res, y_res))
        .collect::<Result<Vec<_>, _>>()?;

    let bounds = others
        .iter()
        .fold(reference.bounds(), |acc, r| acc.intersection(&r.bounds()));
    debug!("common bounds {:?}", bounds.as_tuple());
    if bounds.is_empty() {
        return Err(ChangeError::NoOverlap);
    }

    let reference = reference.crop_to_bounds(&bounds)?;
    let others = others
        .iter()
        .map(|r| r.crop_to_bounds(&bounds))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((reference, others))
}

/// Shifts every band of every raster so its lowest valid sample is
/// zero.
///
/// This stands in for a vertical datum transformation and is only
/// exact when both surveys saw the same lowest point.
pub fn align_altitudes(
    reference: Raster,
    others: Vec<Raster>,
) -> Result<(Raster, Vec<Raster>), ChangeError> {
    let reference = zero_base(reference)?;
    let others = others
        .into_iter()
        .map(zero_base)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((reference, others))
}

fn zero_base(mut raster: Raster) -> Result<Raster, ChangeError> {
    for band in 0..raster.band_count() {
        if let Some(min) = raster.band_min(band)? {
            debug!("band {band} min {min}");
            raster = raster.shift_band_values(band, min)?;
        }
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::{align, align_altitudes};
    use crate::{test_util::raster, ChangeError};
    use approx::assert_relative_eq;
    use georaster::{Bounds, Crs, Resampling};

    #[test]
    fn test_align_to_coarsest_common_grid() {
        let fine = raster(10, 10, (0.0, 10.0), 1.0, |_, _| 1.0);
        let coarse = raster(4, 4, (2.0, 8.0), 2.0, |_, _| 2.0);
        let (a, others) = align(fine, vec![coarse], None, &Resampling::Nearest).unwrap();
        let b = &others[0];
        assert_eq!(a.resolution(), (2.0, 2.0));
        assert_eq!(b.resolution(), (2.0, 2.0));
        assert_eq!(a.bounds(), Bounds::new(2.0, 0.0, 10.0, 8.0));
        assert_eq!(a.bounds(), b.bounds());
        assert_eq!((a.width(), a.height()), (b.width(), b.height()));
    }

    #[test]
    fn test_align_widens_to_target() {
        let a = raster(10, 10, (0.0, 10.0), 1.0, |_, _| 1.0);
        let b = raster(10, 10, (0.0, 10.0), 1.0, |_, _| 1.0);
        let (a, others) = align(a, vec![b], Some(2.5), &Resampling::Bilinear).unwrap();
        assert_relative_eq!(a.resolution().0, 2.5);
        assert_relative_eq!(others[0].resolution().1, 2.5);
    }

    #[test]
    fn test_align_rejects_crs_mismatch() {
        let a = raster(2, 2, (0.0, 2.0), 1.0, |_, _| 0.0);
        let b = raster(2, 2, (0.0, 2.0), 1.0, |_, _| 0.0).with_crs(Crs::WGS84);
        assert!(matches!(
            align(a, vec![b], None, &Resampling::Nearest),
            Err(ChangeError::CrsMismatch { .. })
        ));
    }

    #[test]
    fn test_align_disjoint_is_no_overlap() {
        let a = raster(2, 2, (0.0, 2.0), 1.0, |_, _| 0.0);
        let b = raster(2, 2, (10.0, 12.0), 1.0, |_, _| 0.0);
        assert!(matches!(
            align(a, vec![b], None, &Resampling::Nearest),
            Err(ChangeError::NoOverlap)
        ));
    }

    #[test]
    fn test_align_altitudes_zero_bases_each_raster() {
        let a = raster(2, 2, (0.0, 2.0), 1.0, |row, col| 100.0 + (row * 2 + col) as f64)
            .with_nodata(-9999.0);
        let a = a.with_band(0, vec![-9999.0, 101.0, 102.0, 103.0]).unwrap();
        let b = raster(2, 2, (0.0, 2.0), 1.0, |_, col| 7.0 + col as f64);
        let (a, others) = align_altitudes(a, vec![b]).unwrap();
        assert_eq!(a.band(0).unwrap(), &[-9999.0, 0.0, 1.0, 2.0]);
        assert_eq!(a.band_min(0).unwrap(), Some(0.0));
        assert_eq!(others[0].band(0).unwrap(), &[0.0, 1.0, 0.0, 1.0]);
    }
}
