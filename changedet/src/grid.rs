use crate::ChangeError;
use georaster::{Raster, C};

/// A dense row-major grid of samples with no georeferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    width: usize,
    height: usize,
    values: Vec<C>,
}

impl Grid {
    pub fn new(width: usize, height: usize, values: Vec<C>) -> Result<Self, ChangeError> {
        if values.len() != width * height {
            return Err(ChangeError::GridMismatch(
                (width, height),
                (values.len(), 1),
            ));
        }
        Ok(Self {
            width,
            height,
            values,
        })
    }

    pub fn from_fn<F: Fn(usize, usize) -> C>(width: usize, height: usize, f: F) -> Self {
        let mut values = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                values.push(f(row, col));
            }
        }
        Self {
            width,
            height,
            values,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    pub fn values(&self) -> &[C] {
        &self.values
    }

    pub fn get(&self, row: usize, col: usize) -> C {
        self.values[row * self.width + col]
    }
}

/// A [`Grid`] paired with a validity mask.
///
/// `mask[i]` is true when sample `i` carries no measurement. Masked
/// samples keep whatever value arithmetic produced for them and must
/// not be read as data.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskedGrid {
    grid: Grid,
    mask: Vec<bool>,
}

impl MaskedGrid {
    /// Returns the zero-indexed `band` of `raster`, masking no-data and
    /// NaN samples.
    pub fn from_band(raster: &Raster, band: usize) -> Result<Self, ChangeError> {
        let values = raster.band(band)?.to_vec();
        let mask = values.iter().map(|&v| !raster.is_valid(v)).collect();
        Ok(Self {
            grid: Grid::new(raster.width(), raster.height(), values)?,
            mask,
        })
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn is_masked(&self, idx: usize) -> bool {
        self.mask[idx]
    }

    /// Returns the value at `idx` unless it is masked.
    pub fn get(&self, idx: usize) -> Option<C> {
        (!self.mask[idx]).then(|| self.grid.values[idx])
    }

    pub fn valid_count(&self) -> usize {
        self.mask.iter().filter(|&&m| !m).count()
    }

    /// Returns `self - other`, masked wherever either operand is.
    pub fn difference(&self, other: &Self) -> Result<Self, ChangeError> {
        if self.grid.dims() != other.grid.dims() {
            return Err(ChangeError::GridMismatch(
                self.grid.dims(),
                other.grid.dims(),
            ));
        }
        let values = self
            .grid
            .values
            .iter()
            .zip(&other.grid.values)
            .map(|(a, b)| a - b)
            .collect();
        let mask = self
            .mask
            .iter()
            .zip(&other.mask)
            .map(|(&a, &b)| a || b)
            .collect();
        Ok(Self {
            grid: Grid {
                values,
                ..self.grid
            },
            mask,
        })
    }

    /// Returns `self` with every sample below `threshold` also masked.
    #[must_use]
    pub fn mask_below(mut self, threshold: C) -> Self {
        for (m, &v) in self.mask.iter_mut().zip(&self.grid.values) {
            *m = *m || v.is_nan() || v < threshold;
        }
        self
    }

    /// Returns a plain grid with masked samples replaced by `fill`.
    pub fn filled(&self, fill: C) -> Grid {
        let values = self
            .grid
            .values
            .iter()
            .zip(&self.mask)
            .map(|(&v, &m)| if m { fill } else { v })
            .collect();
        Grid {
            values,
            ..self.grid
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Grid, MaskedGrid};
    use crate::ChangeError;
    use georaster::{GeoTransform, Raster};

    fn raster(values: Vec<f64>) -> Raster {
        Raster::new(3, 1, GeoTransform::new(0.0, 1.0, 1.0, -1.0), vec![values])
            .unwrap()
            .with_nodata(-9999.0)
    }

    #[test]
    fn test_difference_propagates_mask() {
        let a = MaskedGrid::from_band(&raster(vec![10.0, -9999.0, 4.0]), 0).unwrap();
        let b = MaskedGrid::from_band(&raster(vec![3.0, 1.0, f64::NAN]), 0).unwrap();
        let d = a.difference(&b).unwrap();
        assert_eq!(d.get(0), Some(7.0));
        assert!(d.is_masked(1));
        assert!(d.is_masked(2));
        assert_eq!(d.valid_count(), 1);
    }

    #[test]
    fn test_mask_below_and_fill() {
        let a = MaskedGrid::from_band(&raster(vec![10.0, 4.9, 5.0]), 0).unwrap();
        let m = a.mask_below(5.0);
        assert_eq!(m.filled(0.0).values(), &[10.0, 0.0, 5.0]);
    }

    #[test]
    fn test_mismatched_grids() {
        let a = MaskedGrid::from_band(&raster(vec![1.0, 2.0, 3.0]), 0).unwrap();
        let b = MaskedGrid::from_band(
            &Raster::new(1, 1, GeoTransform::new(0.0, 1.0, 1.0, -1.0), vec![vec![0.0]]).unwrap(),
            0,
        )
        .unwrap();
        assert!(matches!(
            a.difference(&b),
            Err(ChangeError::GridMismatch((3, 1), (1, 1)))
        ));
        assert!(Grid::new(2, 2, vec![0.0; 3]).is_err());
    }
}
