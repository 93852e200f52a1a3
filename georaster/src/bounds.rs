use crate::C;

/// Axis-aligned rectangle in a raster's projected units.
///
/// An intersection of disjoint rectangles is still a `Bounds`, just
/// one with zero or negative width/height. Check [`Bounds::is_empty`]
/// before using it as a window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: C,
    pub bottom: C,
    pub right: C,
    pub top: C,
}

impl Bounds {
    pub fn new(left: C, bottom: C, right: C, top: C) -> Self {
        Self {
            left,
            bottom,
            right,
            top,
        }
    }

    pub fn width(&self) -> C {
        self.right - self.left
    }

    pub fn height(&self) -> C {
        self.top - self.bottom
    }

    /// Returns true if this rectangle covers no area.
    pub fn is_empty(&self) -> bool {
        !(self.width() > 0.0 && self.height() > 0.0)
    }

    /// Returns the overlap of `self` and `other`.
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Self {
        Self {
            left: self.left.max(other.left),
            bottom: self.bottom.max(other.bottom),
            right: self.right.min(other.right),
            top: self.top.min(other.top),
        }
    }

    /// Grows `self` outward to the nearest whole multiples of the
    /// given resolution.
    ///
    /// Edges within a millionth of a pixel of a grid line stay on that
    /// line.
    #[must_use]
    pub fn snap_outward(&self, x_res: C, y_res: C) -> Self {
        Self {
            left: snap(self.left, x_res, C::floor),
            bottom: snap(self.bottom, y_res, C::floor),
            right: snap(self.right, x_res, C::ceil),
            top: snap(self.top, y_res, C::ceil),
        }
    }

    pub fn as_tuple(&self) -> (C, C, C, C) {
        (self.left, self.bottom, self.right, self.top)
    }
}

/// Tolerance, in pixels, for an edge that already sits on the lattice.
const SNAP_EPS: C = 1e-6;

fn snap(v: C, res: C, outward: fn(C) -> C) -> C {
    let cells = v / res;
    let nearest = cells.round();
    if (cells - nearest).abs() < SNAP_EPS {
        nearest * res
    } else {
        outward(cells) * res
    }
}
