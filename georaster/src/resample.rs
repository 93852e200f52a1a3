use crate::{Bounds, GeoTransform, Raster, RasterError, C};
use log::debug;

/// Tolerance, in pixels, for window edges that are a rounding error
/// away from a pixel boundary.
const PIXEL_EPS: C = 1e-6;

/// How destination samples are taken from the source grid.
///
/// Use the same method for every raster that will be compared, or the
/// comparison picks up a systematic bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resampling {
    /// Value of the source pixel containing the destination center.
    #[default]
    Nearest,

    /// Distance weighted mean of the four closest valid source pixels.
    Bilinear,
}

impl Resampling {
    fn sample(self, raster: &Raster, band: &[C], row: C, col: C) -> C {
        match self {
            Self::Nearest => nearest(raster, band, row, col),
            Self::Bilinear => bilinear(raster, band, row, col),
        }
    }
}

pub(crate) fn resample(
    raster: &Raster,
    x_res: C,
    y_res: C,
    method: Resampling,
) -> Result<Raster, RasterError> {
    if !(x_res > 0.0 && y_res > 0.0) {
        return Err(RasterError::Unsupported(format!(
            "resolution must be positive, got ({x_res}, {y_res})"
        )));
    }

    let src_t = raster.transform();
    let target = raster.bounds().snap_outward(x_res, y_res);
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let width = (target.width() / x_res).round() as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let height = (target.height() / y_res).round() as usize;

    // Keep the source's vertical orientation.
    let transform = if src_t.pixel_height < 0.0 {
        GeoTransform::new(target.left, target.top, x_res, -y_res)
    } else {
        GeoTransform::new(target.left, target.bottom, x_res, y_res)
    };

    debug!(
        "resample {}x{} @ {:?} -> {width}x{height} @ ({x_res}, {y_res}), {method:?}",
        raster.width(),
        raster.height(),
        raster.resolution(),
    );

    let fill = raster.fill_value();
    let mut bands = Vec::with_capacity(raster.band_count());
    for band in 0..raster.band_count() {
        let src = raster.band(band)?;
        let mut dst = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                #[allow(clippy::cast_precision_loss)]
                let center = transform.pixel_to_world(row as C, col as C);
                let (src_row, src_col) = src_t.world_to_pixel(center);
                let v = method.sample(raster, src, src_row, src_col);
                dst.push(if raster.is_valid(v) { v } else { fill });
            }
        }
        bands.push(dst);
    }

    Ok(raster.derive(width, height, transform, bands))
}

pub(crate) fn crop(raster: &Raster, bounds: &Bounds) -> Result<Raster, RasterError> {
    let t = raster.transform();
    let (x_res, y_res) = t.resolution();
    let window_width = bounds.width() / x_res;
    let window_height = bounds.height() / y_res;
    let empty = || RasterError::EmptyWindow {
        width: window_width,
        height: window_height,
    };

    if bounds.is_empty() {
        return Err(empty());
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let width = (window_width - PIXEL_EPS).ceil().max(0.0) as usize;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let height = (window_height - PIXEL_EPS).ceil().max(0.0) as usize;
    if width == 0 || height == 0 {
        return Err(empty());
    }

    let edge_y = if t.pixel_height < 0.0 {
        bounds.top
    } else {
        bounds.bottom
    };
    #[allow(clippy::cast_possible_truncation)]
    let col_off = ((bounds.left - t.origin_x) / t.pixel_width + PIXEL_EPS).floor() as isize;
    #[allow(clippy::cast_possible_truncation)]
    let row_off = ((edge_y - t.origin_y) / t.pixel_height + PIXEL_EPS).floor() as isize;

    debug!(
        "crop {}x{} to window {width}x{height} at (row {row_off}, col {col_off})",
        raster.width(),
        raster.height(),
    );

    let fill = raster.fill_value();
    let mut bands = Vec::with_capacity(raster.band_count());
    for band in 0..raster.band_count() {
        let src = raster.band(band)?;
        let mut dst = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                #[allow(clippy::cast_possible_wrap)]
                let v = checked_index(raster, row_off + row as isize, col_off + col as isize)
                    .map_or(fill, |idx| src[idx]);
                dst.push(v);
            }
        }
        bands.push(dst);
    }

    Ok(raster.derive(width, height, t.offset(row_off, col_off), bands))
}

/// Returns the linear index of `(row, col)` if it lies inside `raster`.
fn checked_index(raster: &Raster, row: isize, col: isize) -> Option<usize> {
    let row = usize::try_from(row).ok()?;
    let col = usize::try_from(col).ok()?;
    (row < raster.height() && col < raster.width()).then(|| raster.index(row, col))
}

fn nearest(raster: &Raster, band: &[C], row: C, col: C) -> C {
    #[allow(clippy::cast_possible_truncation)]
    let idx = checked_index(raster, (row + 0.5).floor() as isize, (col + 0.5).floor() as isize);
    idx.map_or(C::NAN, |idx| band[idx])
}

fn bilinear(raster: &Raster, band: &[C], row: C, col: C) -> C {
    // Destination centers beyond the outer half pixel have no source.
    #[allow(clippy::cast_precision_loss)]
    let inside = (-0.5..raster.height() as C - 0.5).contains(&row)
        && (-0.5..raster.width() as C - 0.5).contains(&col);
    if !inside {
        return C::NAN;
    }

    let (r0, c0) = (row.floor(), col.floor());
    let (fr, fc) = (row - r0, col - c0);
    #[allow(clippy::cast_possible_truncation)]
    let (r0, c0) = (r0 as isize, c0 as isize);

    let mut sum = 0.0;
    let mut weight = 0.0;
    for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
        for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
            let w = wr * wc;
            if w == 0.0 {
                continue;
            }
            if let Some(idx) = checked_index(raster, r0 + dr, c0 + dc) {
                let v = band[idx];
                if raster.is_valid(v) {
                    sum += w * v;
                    weight += w;
                }
            }
        }
    }

    if weight > 0.0 {
        sum / weight
    } else {
        C::NAN
    }
}
