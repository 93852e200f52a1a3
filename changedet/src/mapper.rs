use crate::ChangeError;
use georaster::{Crs, Raster, C};
use log::debug;
use proj4rs::{proj::Proj, transform::transform};

/// Moves coordinates from one CRS to another.
pub trait Reprojector {
    /// Reprojects the points `(xs[i], ys[i])` from `from` to `to` in
    /// place. Geographic coordinates are in degrees, longitude first.
    fn reproject(&self, from: Crs, to: Crs, xs: &mut [C], ys: &mut [C]) -> Result<(), ChangeError>;
}

/// [`Reprojector`] backed by `proj4rs`, with PROJ strings looked up
/// from the EPSG registry.
#[derive(Debug, Clone, Copy, Default)]
pub struct Proj4Reprojector;

struct Projection {
    proj: Proj,
    geographic: bool,
}

impl Projection {
    fn new(crs: Crs) -> Result<Self, ChangeError> {
        let def = crs_definitions::from_code(crs.code())
            .ok_or_else(|| ChangeError::Projection(format!("{crs} is not a known CRS")))?;
        let proj = Proj::from_proj_string(def.proj4)
            .map_err(|e| ChangeError::Projection(format!("invalid projection {crs}: {e:?}")))?;
        Ok(Self {
            proj,
            geographic: def.proj4.contains("+proj=longlat"),
        })
    }
}

impl Reprojector for Proj4Reprojector {
    fn reproject(&self, from: Crs, to: Crs, xs: &mut [C], ys: &mut [C]) -> Result<(), ChangeError> {
        check_lengths(xs.len(), ys.len())?;
        if from == to {
            return Ok(());
        }
        let src = Projection::new(from)?;
        let dst = Projection::new(to)?;
        debug!("reprojecting {} points {from} -> {to}", xs.len());

        for (x, y) in xs.iter_mut().zip(ys.iter_mut()) {
            let mut point = if src.geographic {
                (x.to_radians(), y.to_radians(), 0.0)
            } else {
                (*x, *y, 0.0)
            };
            transform(&src.proj, &dst.proj, &mut point)
                .map_err(|e| ChangeError::Projection(format!("({x}, {y}): {e:?}")))?;
            (*x, *y) = if dst.geographic {
                (point.0.to_degrees(), point.1.to_degrees())
            } else {
                (point.0, point.1)
            };
        }
        Ok(())
    }
}

/// Returns the `target` coordinates of the centers of pixels
/// `(rows[i], cols[i])` of `raster`.
pub fn pixels_to_coordinates<P: Reprojector + ?Sized>(
    raster: &Raster,
    target: Crs,
    rows: &[usize],
    cols: &[usize],
    reprojector: &P,
) -> Result<(Vec<C>, Vec<C>), ChangeError> {
    check_lengths(rows.len(), cols.len())?;
    let t = raster.transform();
    let (mut xs, mut ys): (Vec<C>, Vec<C>) = rows
        .iter()
        .zip(cols)
        .map(|(&row, &col)| {
            #[allow(clippy::cast_precision_loss)]
            let c = t.pixel_to_world(row as C, col as C);
            (c.x, c.y)
        })
        .unzip();

    match raster.crs() {
        Some(source) => reprojector.reproject(source, target, &mut xs, &mut ys)?,
        None if xs.is_empty() => (),
        None => {
            return Err(ChangeError::Projection(format!(
                "raster has no CRS to reproject to {target} from"
            )))
        }
    }
    Ok((xs, ys))
}

fn check_lengths(a: usize, b: usize) -> Result<(), ChangeError> {
    if a == b {
        Ok(())
    } else {
        Err(ChangeError::Projection(format!(
            "coordinate arrays differ in length, {a} vs {b}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::{pixels_to_coordinates, Proj4Reprojector, Reprojector};
    use crate::{test_util::raster, ChangeError};
    use approx::assert_relative_eq;
    use georaster::Crs;

    #[test]
    fn test_identity_uses_cell_centers() {
        let r = raster(10, 10, (100.0, 200.0), 0.5, |_, _| 0.0);
        let (xs, ys) =
            pixels_to_coordinates(&r, Crs::WEB_MERCATOR, &[0, 3], &[0, 7], &Proj4Reprojector).unwrap();
        assert_eq!(xs, vec![100.25, 103.75]);
        assert_eq!(ys, vec![199.75, 198.25]);
    }

    #[test]
    fn test_round_trip_through_wgs84() {
        let mut xs = vec![1_113_194.907_932_735_9, -8_238_310.235_647_004];
        let mut ys = vec![6_274_861.394_006_576, 4_970_071.579_142_427];
        let (x0, y0) = (xs.clone(), ys.clone());

        Proj4Reprojector
            .reproject(Crs::WEB_MERCATOR, Crs::WGS84, &mut xs, &mut ys)
            .unwrap();
        assert_relative_eq!(xs[0], 10.0, epsilon = 1e-6);
        assert_relative_eq!(ys[0], 49.0, epsilon = 1e-6);
        assert_relative_eq!(xs[1], -74.006, epsilon = 1e-6);
        assert_relative_eq!(ys[1], 40.7128, epsilon = 1e-6);

        Proj4Reprojector
            .reproject(Crs::WGS84, Crs::WEB_MERCATOR, &mut xs, &mut ys)
            .unwrap();
        for i in 0..2 {
            assert_relative_eq!(xs[i], x0[i], epsilon = 1e-3);
            assert_relative_eq!(ys[i], y0[i], epsilon = 1e-3);
        }
    }

    #[test]
    fn test_mismatched_lengths() {
        let r = raster(2, 2, (0.0, 2.0), 1.0, |_, _| 0.0);
        assert!(matches!(
            pixels_to_coordinates(&r, Crs::WGS84, &[0, 1], &[0], &Proj4Reprojector),
            Err(ChangeError::Projection(_))
        ));
    }

    #[test]
    fn test_unknown_code() {
        let (mut xs, mut ys) = (vec![0.0], vec![0.0]);
        assert!(matches!(
            Proj4Reprojector.reproject(Crs::WGS84, Crs::epsg(1), &mut xs, &mut ys),
            Err(ChangeError::Projection(_))
        ));
    }
}
