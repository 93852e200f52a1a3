use crate::grid::Grid;
use geo::{Contains, Coord, LineString, Point, Polygon, Simplify};
use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use std::collections::HashSet;

/// Below this distance, in pixels, a vertex counts as collinear with
/// its neighbors.
const COLLINEAR_EPS: f64 = 1e-9;

/// One traced outer border.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contour {
    /// Border pixels in tracing order, as `(row, col)`.
    pub border: Vec<(usize, usize)>,

    /// `border` with collinear runs collapsed to their end points.
    pub vertices: Vec<(usize, usize)>,
}

impl Contour {
    /// Returns true if the outline has at least three distinct
    /// vertices, so it encloses a non-degenerate polygon.
    pub fn has_area(&self) -> bool {
        let distinct: HashSet<&(usize, usize)> = self.vertices.iter().collect();
        distinct.len() >= 3
    }

    /// Returns every pixel on or enclosed by this border.
    pub fn enclosed_pixels(&self) -> Vec<(usize, usize)> {
        let Some(&(first_row, first_col)) = self.border.first() else {
            return Vec::new();
        };
        let (mut r0, mut r1, mut c0, mut c1) = (first_row, first_row, first_col, first_col);
        for &(row, col) in &self.border {
            r0 = r0.min(row);
            r1 = r1.max(row);
            c0 = c0.min(col);
            c1 = c1.max(col);
        }

        let on_border: HashSet<(usize, usize)> = self.border.iter().copied().collect();
        let polygon = (self.vertices.len() >= 3).then(|| {
            #[allow(clippy::cast_precision_loss)]
            let ring: Vec<Coord> = self
                .vertices
                .iter()
                .map(|&(row, col)| Coord {
                    x: col as f64,
                    y: row as f64,
                })
                .collect();
            Polygon::new(LineString::new(ring), vec![])
        });

        let mut pixels = Vec::new();
        for row in r0..=r1 {
            for col in c0..=c1 {
                #[allow(clippy::cast_precision_loss)]
                let inside = on_border.contains(&(row, col))
                    || polygon
                        .as_ref()
                        .is_some_and(|p| p.contains(&Point::new(col as f64, row as f64)));
                if inside {
                    pixels.push((row, col));
                }
            }
        }
        pixels
    }
}

/// Traces the outlines of positive regions of a grid.
pub trait ContourExtractor {
    /// Returns the outermost borders of the `> 0` regions of `grid`.
    /// Holes and regions nested inside holes are not reported.
    fn external_contours(&self, grid: &Grid) -> Vec<Contour>;
}

/// Suzuki-Abe border following.
#[derive(Debug, Clone, Copy, Default)]
pub struct BorderFollowing;

impl ContourExtractor for BorderFollowing {
    fn external_contours(&self, grid: &Grid) -> Vec<Contour> {
        let Some(image) = binarize(grid) else {
            return Vec::new();
        };
        let contours: Vec<imageproc::contours::Contour<u32>> = find_contours(&image);

        contours
            .into_iter()
            .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
            .map(|c| {
                let border: Vec<(usize, usize)> = c
                    .points
                    .iter()
                    .map(|p| (p.y as usize, p.x as usize))
                    .collect();
                Contour {
                    vertices: collapse_collinear(&border),
                    border,
                }
            })
            .collect()
    }
}

fn binarize(grid: &Grid) -> Option<GrayImage> {
    let width = u32::try_from(grid.width()).ok()?;
    let height = u32::try_from(grid.height()).ok()?;
    let pixels = grid
        .values()
        .iter()
        .map(|&v| if v > 0.0 { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width, height, pixels)
}

fn collapse_collinear(border: &[(usize, usize)]) -> Vec<(usize, usize)> {
    if border.len() < 3 {
        return border.to_vec();
    }
    // Closed ring, so only the tracing start point is pinned.
    #[allow(clippy::cast_precision_loss)]
    let ring: LineString = border
        .iter()
        .chain(border.first())
        .map(|&(row, col)| Coord {
            x: col as f64,
            y: row as f64,
        })
        .collect();
    let simplified = ring.simplify(&COLLINEAR_EPS);
    let coords = simplified.0.split_last().map_or(&[][..], |(_, rest)| rest);
    coords
        .iter()
        .map(|c| {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let px = (c.y.round() as usize, c.x.round() as usize);
            px
        })
        .collect()
}
