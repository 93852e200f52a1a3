use crate::grid::Grid;
use georaster::C;

/// Grey-level morphology on a [`Grid`].
pub trait MorphologicalFilter {
    /// Removes bright features smaller than the structuring element.
    fn open(&self, grid: &Grid) -> Grid;

    /// Fills dark gaps smaller than the structuring element.
    fn close(&self, grid: &Grid) -> Grid;
}

/// Opening and closing with elliptical structuring elements.
///
/// Dilation reads through the reflected element, so these are true
/// morphological openings and closings. OpenCV's `morphologyEx` does
/// not reflect the kernel, so for even sizes (the 10 and 20 defaults)
/// results differ from it by a one pixel shift along region edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EllipseFilter {
    open_size: usize,
    close_size: usize,
}

impl Default for EllipseFilter {
    fn default() -> Self {
        Self {
            open_size: 10,
            close_size: 20,
        }
    }
}

impl EllipseFilter {
    pub fn new(open_size: usize, close_size: usize) -> Self {
        Self {
            open_size,
            close_size,
        }
    }

    pub fn open_size(&self) -> usize {
        self.open_size
    }

    pub fn close_size(&self) -> usize {
        self.close_size
    }
}

impl MorphologicalFilter for EllipseFilter {
    fn open(&self, grid: &Grid) -> Grid {
        let se = ellipse(self.open_size);
        dilate(&erode(grid, &se), &se)
    }

    fn close(&self, grid: &Grid) -> Grid {
        let se = ellipse(self.close_size);
        erode(&dilate(grid, &se), &se)
    }
}

/// Returns the `(row, col)` offsets of a `size` by `size` elliptical
/// structuring element, anchored at `(size / 2, size / 2)`.
///
/// Rows are filled the same way OpenCV's `MORPH_ELLIPSE` fills them,
/// so even sizes give a kernel that is one pixel heavier on the
/// top-left. See [`EllipseFilter`] for how that interacts with
/// dilation.
pub fn ellipse(size: usize) -> Vec<(isize, isize)> {
    #[allow(clippy::cast_possible_wrap)]
    let (size, r) = (size.max(1) as isize, (size / 2) as isize);
    let c = r;
    #[allow(clippy::cast_precision_loss)]
    let inv_r2 = if r > 0 { 1.0 / (r * r) as C } else { 0.0 };

    let mut offsets = Vec::new();
    for i in 0..size {
        let dy = i - r;
        let (j1, j2) = if dy.abs() <= r {
            #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
            let dx = (c as C * (((r * r - dy * dy) as C) * inv_r2).sqrt()).round_ties_even() as isize;
            ((c - dx).max(0), (c + dx + 1).min(size))
        } else {
            (0, 0)
        };
        offsets.extend((j1..j2).map(|j| (dy, j - c)));
    }
    offsets
}

fn erode(grid: &Grid, se: &[(isize, isize)]) -> Grid {
    apply(grid, se, 1, C::min, C::INFINITY)
}

fn dilate(grid: &Grid, se: &[(isize, isize)]) -> Grid {
    // Dilation reads through the reflected element.
    apply(grid, se, -1, C::max, C::NEG_INFINITY)
}

/// Folds `op` over the neighbors `p + sign * o` of every pixel `p`.
/// Neighbors outside the grid are skipped.
fn apply(grid: &Grid, se: &[(isize, isize)], sign: isize, op: fn(C, C) -> C, init: C) -> Grid {
    let (width, height) = grid.dims();
    #[allow(clippy::cast_possible_wrap)]
    let (w, h) = (width as isize, height as isize);
    let src = grid.values();

    Grid::from_fn(width, height, |row, col| {
        #[allow(clippy::cast_possible_wrap)]
        let (row, col) = (row as isize, col as isize);
        let mut acc = init;
        for &(dr, dc) in se {
            let (r, c) = (row + sign * dr, col + sign * dc);
            if (0..h).contains(&r) && (0..w).contains(&c) {
                #[allow(clippy::cast_sign_loss)]
                let v = src[(r * w + c) as usize];
                acc = op(acc, v);
            }
        }
        acc
    })
}
