use crate::C;
use geo::geometry::Coord;

/// Affine pixel to world mapping, in GDAL coefficient order.
///
/// ```text
/// x = origin_x + col * pixel_width  + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// `(col, row)` here address pixel _corners_. Rasters handled by this
/// crate are north-up, so both rotation terms are zero and
/// `pixel_height` is usually negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    pub origin_x: C,
    pub pixel_width: C,
    pub row_rotation: C,
    pub origin_y: C,
    pub col_rotation: C,
    pub pixel_height: C,
}

impl GeoTransform {
    /// Returns a north-up transform with the upper-left corner at
    /// `(origin_x, origin_y)`.
    pub fn new(origin_x: C, origin_y: C, pixel_width: C, pixel_height: C) -> Self {
        Self {
            origin_x,
            pixel_width,
            row_rotation: 0.0,
            origin_y,
            col_rotation: 0.0,
            pixel_height,
        }
    }

    /// Returns the absolute `(x, y)` pixel size.
    pub fn resolution(&self) -> (C, C) {
        (self.pixel_width.abs(), self.pixel_height.abs())
    }

    /// Returns the world coordinate of the center of pixel `(row, col)`.
    ///
    /// Fractional indices are allowed.
    pub fn pixel_to_world(&self, row: C, col: C) -> Coord<C> {
        let (row, col) = (row + 0.5, col + 0.5);
        Coord {
            x: self.origin_x + col * self.pixel_width + row * self.row_rotation,
            y: self.origin_y + col * self.col_rotation + row * self.pixel_height,
        }
    }

    /// Inverse of [`GeoTransform::pixel_to_world`]: returns the
    /// fractional `(row, col)` whose center is at `coord`.
    pub fn world_to_pixel(&self, coord: Coord<C>) -> (C, C) {
        let det = self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation;
        let dx = coord.x - self.origin_x;
        let dy = coord.y - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.row_rotation) / det;
        let row = (dy * self.pixel_width - dx * self.col_rotation) / det;
        (row - 0.5, col - 0.5)
    }

    /// Returns the transform of a window whose upper-left pixel is
    /// `(row_off, col_off)` in `self`.
    #[must_use]
    pub fn offset(&self, row_off: isize, col_off: isize) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let (row_off, col_off) = (row_off as C, col_off as C);
        Self {
            origin_x: self.origin_x + col_off * self.pixel_width + row_off * self.row_rotation,
            origin_y: self.origin_y + col_off * self.col_rotation + row_off * self.pixel_height,
            ..*self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Coord, GeoTransform};
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_world_uses_cell_center() {
        let t = GeoTransform::new(500_000.0, 4_000_000.0, 2.0, -2.0);
        let c = t.pixel_to_world(0.0, 0.0);
        assert_relative_eq!(c.x, 500_001.0);
        assert_relative_eq!(c.y, 3_999_999.0);
        let c = t.pixel_to_world(9.0, 4.0);
        assert_relative_eq!(c.x, 500_009.0);
        assert_relative_eq!(c.y, 3_999_981.0);
    }

    #[test]
    fn test_round_trip() {
        let t = GeoTransform::new(-123.25, 45.5, 0.25, -0.5);
        for row in [0.0, 1.0, 17.0, 99.0] {
            for col in [0.0, 3.0, 42.0, 250.0] {
                let (r, c) = t.world_to_pixel(t.pixel_to_world(row, col));
                assert_relative_eq!(r, row, epsilon = 1e-9);
                assert_relative_eq!(c, col, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_world_to_pixel_fractional() {
        let t = GeoTransform::new(0.0, 10.0, 1.0, -1.0);
        // Upper-left corner of the raster is half a pixel before the
        // first center.
        let (r, c) = t.world_to_pixel(Coord { x: 0.0, y: 10.0 });
        assert_relative_eq!(r, -0.5);
        assert_relative_eq!(c, -0.5);
    }

    #[test]
    fn test_offset() {
        let t = GeoTransform::new(100.0, 200.0, 0.5, -0.5);
        let w = t.offset(4, 10);
        assert_relative_eq!(w.origin_x, 105.0);
        assert_relative_eq!(w.origin_y, 198.0);
        assert_eq!(w.resolution(), (0.5, 0.5));
    }
}
