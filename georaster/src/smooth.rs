use crate::{Raster, RasterError, C};

/// Returns `band` after a `size` by `size` median filter.
///
/// Only valid samples take part in a neighborhood, and no-data cells
/// keep their value. Windows are clipped at the raster edges.
pub(crate) fn median(raster: &Raster, band: usize, size: usize) -> Result<Vec<C>, RasterError> {
    let src = raster.band(band)?;
    let (width, height) = (raster.width(), raster.height());
    let half = size / 2;
    let mut window = Vec::with_capacity(size * size);

    let mut out = Vec::with_capacity(src.len());
    for row in 0..height {
        for col in 0..width {
            let v = src[raster.index(row, col)];
            if !raster.is_valid(v) {
                out.push(v);
                continue;
            }
            window.clear();
            for r in row.saturating_sub(half)..(row + half + 1).min(height) {
                for c in col.saturating_sub(half)..(col + half + 1).min(width) {
                    let n = src[raster.index(r, c)];
                    if raster.is_valid(n) {
                        window.push(n);
                    }
                }
            }
            window.sort_unstable_by(C::total_cmp);
            out.push(window[window.len() / 2]);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use crate::test_util::raster_from_fn;

    #[test]
    fn test_median_removes_spike() {
        let raster = raster_from_fn(5, 5, (0.0, 5.0), 1.0, |row, col| {
            if (row, col) == (2, 2) {
                100.0
            } else {
                1.0
            }
        });
        let smoothed = raster.median_smooth(0, 5).unwrap();
        assert!(smoothed.band(0).unwrap().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_median_keeps_nodata() {
        let raster = raster_from_fn(3, 3, (0.0, 3.0), 1.0, |row, col| {
            if (row, col) == (0, 0) {
                -9999.0
            } else {
                (row * 3 + col) as f64
            }
        })
        .with_nodata(-9999.0);
        let smoothed = raster.median_smooth(0, 3).unwrap();
        let band = smoothed.band(0).unwrap();
        assert_eq!(band[0], -9999.0);
        // Center sees 1..=8, no-data excluded.
        assert_eq!(band[4], 5.0);
    }
}
