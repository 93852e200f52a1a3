use crate::{
    align::{align, align_altitudes, Resampler},
    contour::{BorderFollowing, ContourExtractor},
    grid::{Grid, MaskedGrid},
    mapper::{pixels_to_coordinates, Proj4Reprojector, Reprojector},
    morph::{EllipseFilter, MorphologicalFilter},
    ChangeError,
};
use geo::{LineString, Polygon};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject};
use georaster::{Crs, Raster, Resampling, C};
use log::{debug, info};
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Shape of a comparison's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayMode {
    /// Polygons around changed regions, with statistics.
    #[default]
    Contours,

    /// Every changed pixel as a weighted point.
    Heatmap,
}

impl FromStr for DisplayMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "contours" | "contour" => Ok(Self::Contours),
            "heatmap" => Ok(Self::Heatmap),
            other => Err(format!("unknown display mode '{other}'")),
        }
    }
}

impl fmt::Display for DisplayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Contours => "contours",
            Self::Heatmap => "heatmap",
        })
    }
}

/// The four elevation models of a comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct Dems<T> {
    pub reference_dsm: T,
    pub reference_dtm: T,
    pub compare_dsm: T,
    pub compare_dtm: T,
}

impl<T> Dems<T> {
    fn iter(&self) -> impl Iterator<Item = &T> {
        [
            &self.reference_dsm,
            &self.reference_dtm,
            &self.compare_dsm,
            &self.compare_dtm,
        ]
        .into_iter()
    }
}

impl Dems<PathBuf> {
    /// Fails with [`ChangeError::MissingInput`] naming the first file
    /// that does not exist.
    pub fn check_exist(&self) -> Result<(), ChangeError> {
        match self.iter().find(|p| !p.exists()) {
            Some(missing) => Err(ChangeError::MissingInput(missing.clone())),
            None => Ok(()),
        }
    }

    pub fn open(&self) -> Result<Dems<Raster>, ChangeError> {
        Ok(Dems {
            reference_dsm: Raster::open(&self.reference_dsm)?,
            reference_dtm: Raster::open(&self.reference_dtm)?,
            compare_dsm: Raster::open(&self.compare_dsm)?,
            compare_dtm: Raster::open(&self.compare_dtm)?,
        })
    }
}

/// One changed region.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeFeature {
    /// Outline in the target CRS.
    pub polygon: Polygon<C>,

    /// Enclosed area in squared raster units.
    pub area: C,

    pub avg: C,
    pub min: C,
    pub max: C,

    /// Population standard deviation.
    pub std: C,
}

impl From<&ChangeFeature> for Feature {
    fn from(f: &ChangeFeature) -> Self {
        let ring = f
            .polygon
            .exterior()
            .coords()
            .map(|c| vec![c.x, c.y])
            .collect();
        let mut properties = JsonObject::new();
        for (key, value) in [
            ("area", f.area),
            ("avg", f.avg),
            ("min", f.min),
            ("max", f.max),
            ("std", f.std),
        ] {
            properties.insert(key.to_string(), value.into());
        }
        Self {
            bbox: None,
            geometry: Some(Geometry::new(geojson::Value::Polygon(vec![ring]))),
            id: None,
            properties: Some(properties),
            foreign_members: None,
        }
    }
}

/// Changed pixels as `[x, y, value]` points.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    /// Values are shifted so the smallest is zero.
    pub values: Vec<[C; 3]>,

    /// Largest value before the shift, 0 when there are no points.
    pub max: C,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChangeReport {
    Contours(Vec<ChangeFeature>),
    Heatmap(Heatmap),
}

impl ChangeReport {
    /// Serializes contours as a GeoJSON `FeatureCollection` and a
    /// heatmap as `{"values": [...], "max": ...}`.
    pub fn to_json(&self) -> Result<String, ChangeError> {
        Ok(match self {
            Self::Contours(features) => serde_json::to_string(&FeatureCollection {
                bbox: None,
                features: features.iter().map(Feature::from).collect(),
                foreign_members: None,
            })?,
            Self::Heatmap(heatmap) => serde_json::to_string(heatmap)?,
        })
    }
}

/// A configured change detection between two surveys.
pub struct Comparison {
    target_crs: Crs,
    resolution: C,
    mode: DisplayMode,
    min_height: C,
    min_area: C,
    resampler: Box<dyn Resampler>,
    filter: Box<dyn MorphologicalFilter>,
    extractor: Box<dyn ContourExtractor>,
    reprojector: Box<dyn Reprojector>,
}

impl Comparison {
    pub fn builder() -> ComparisonBuilder {
        ComparisonBuilder {
            target_crs: None,
            resolution: 0.5,
            mode: DisplayMode::default(),
            min_height: 5.0,
            min_area: 40.0,
            resampler: Box::new(Resampling::Nearest),
            filter: Box::new(EllipseFilter::default()),
            extractor: Box::new(BorderFollowing),
            reprojector: Box::new(Proj4Reprojector),
        }
    }

    /// Reads `paths` and runs [`Comparison::detect`] on them.
    pub fn run(&self, paths: &Dems<PathBuf>) -> Result<ChangeReport, ChangeError> {
        info!("reading {:?}", paths);
        self.detect(paths.open()?)
    }

    /// Returns the regions where the reference surface stands at least
    /// `min_height` above the compared one.
    pub fn detect(&self, dems: Dems<Raster>) -> Result<ChangeReport, ChangeError> {
        let Dems {
            reference_dsm,
            reference_dtm,
            compare_dsm,
            compare_dtm,
        } = dems;
        let (reference, others) = align(
            reference_dsm,
            vec![reference_dtm, compare_dsm, compare_dtm],
            Some(self.resolution),
            self.resampler.as_ref(),
        )?;
        let (reference, others) = align_altitudes(reference, others)?;

        let chm_ref = canopy_height(&reference, &others[0])?;
        let chm_cmp = canopy_height(&others[1], &others[2])?;
        let diff = chm_ref.difference(&chm_cmp)?.mask_below(self.min_height);
        info!(
            "{} of {} cells changed by at least {}",
            diff.valid_count(),
            reference.width() * reference.height(),
            self.min_height
        );

        let filtered = self.filter.close(&self.filter.open(&diff.filled(0.0)));
        match self.mode {
            DisplayMode::Contours => self.contours(&reference, &diff, &filtered),
            DisplayMode::Heatmap => self.heatmap(&reference, &diff, &filtered),
        }
    }
}

/// Private API
impl Comparison {
    fn contours(
        &self,
        raster: &Raster,
        diff: &MaskedGrid,
        filtered: &Grid,
    ) -> Result<ChangeReport, ChangeError> {
        let (pw, ph) = raster.resolution();
        let pixel_area = (pw * ph).abs();
        let width = filtered.width();

        let mut features = Vec::new();
        for contour in self.extractor.external_contours(filtered) {
            if !contour.has_area() {
                debug!("dropping degenerate contour {:?}", contour.vertices);
                continue;
            }
            let pixels = contour.enclosed_pixels();
            #[allow(clippy::cast_precision_loss)]
            let area = pixels.len() as C * pixel_area;
            if area < self.min_area {
                debug!("dropping contour of area {area}");
                continue;
            }
            let values: Vec<C> = pixels
                .iter()
                .filter_map(|&(row, col)| diff.get(row * width + col))
                .collect();
            let Some((avg, min, max, std)) = summarize(&values) else {
                debug!("dropping contour without valid values");
                continue;
            };

            let (rows, cols): (Vec<usize>, Vec<usize>) = contour.vertices.iter().copied().unzip();
            let (xs, ys) = pixels_to_coordinates(
                raster,
                self.target_crs,
                &rows,
                &cols,
                self.reprojector.as_ref(),
            )?;
            let exterior: LineString<C> = xs.into_iter().zip(ys).collect();
            features.push(ChangeFeature {
                polygon: Polygon::new(exterior, vec![]),
                area,
                avg,
                min,
                max,
                std,
            });
        }
        info!("{} changed regions", features.len());
        Ok(ChangeReport::Contours(features))
    }

    fn heatmap(
        &self,
        raster: &Raster,
        diff: &MaskedGrid,
        filtered: &Grid,
    ) -> Result<ChangeReport, ChangeError> {
        let width = filtered.width();
        let mut rows = Vec::new();
        let mut cols = Vec::new();
        let mut values = Vec::new();
        for (idx, &v) in filtered.values().iter().enumerate() {
            if !diff.is_masked(idx) {
                rows.push(idx / width);
                cols.push(idx % width);
                values.push(v);
            }
        }

        let (xs, ys) =
            pixels_to_coordinates(raster, self.target_crs, &rows, &cols, self.reprojector.as_ref())?;
        let min = values.iter().copied().fold(C::INFINITY, C::min);
        let max = values.iter().copied().fold(C::NEG_INFINITY, C::max);
        let points = xs
            .into_iter()
            .zip(ys)
            .zip(values)
            .map(|((x, y), v)| [x, y, v - min])
            .collect::<Vec<_>>();
        info!("{} heatmap points", points.len());
        Ok(ChangeReport::Heatmap(Heatmap {
            max: if points.is_empty() { 0.0 } else { max },
            values: points,
        }))
    }
}

pub struct ComparisonBuilder {
    /// CRS of the output coordinates (required).
    target_crs: Option<Crs>,

    /// Finest pixel size to compare at (defaults to 0.5).
    resolution: C,

    /// Output shape (defaults to contours).
    mode: DisplayMode,

    /// Smallest height difference that counts as change (defaults to
    /// 5).
    min_height: C,

    /// Smallest region area reported in contour mode (defaults to 40).
    min_area: C,

    resampler: Box<dyn Resampler>,
    filter: Box<dyn MorphologicalFilter>,
    extractor: Box<dyn ContourExtractor>,
    reprojector: Box<dyn Reprojector>,
}

impl ComparisonBuilder {
    /// CRS of the output coordinates (required).
    #[must_use]
    pub fn target_crs(mut self, crs: Crs) -> Self {
        self.target_crs = Some(crs);
        self
    }

    /// Finest pixel size to compare at (defaults to 0.5). Inputs
    /// coarser than this are compared at their own resolution.
    #[must_use]
    pub fn resolution(mut self, resolution: C) -> Self {
        self.resolution = resolution;
        self
    }

    /// Output shape (defaults to contours).
    #[must_use]
    pub fn mode(mut self, mode: DisplayMode) -> Self {
        self.mode = mode;
        self
    }

    /// Smallest height difference that counts as change (defaults to
    /// 5).
    #[must_use]
    pub fn min_height(mut self, min_height: C) -> Self {
        self.min_height = min_height;
        self
    }

    /// Smallest region area reported in contour mode (defaults to 40).
    #[must_use]
    pub fn min_area(mut self, min_area: C) -> Self {
        self.min_area = min_area;
        self
    }

    /// Sampling method for every input (defaults to nearest).
    #[must_use]
    pub fn resampling(self, method: Resampling) -> Self {
        self.resampler(method)
    }

    /// Opening and closing kernel sizes in pixels (defaults to 10 and
    /// 20).
    #[must_use]
    pub fn kernel_sizes(self, open: usize, close: usize) -> Self {
        self.filter(EllipseFilter::new(open, close))
    }

    #[must_use]
    pub fn resampler<R: Resampler + 'static>(mut self, resampler: R) -> Self {
        self.resampler = Box::new(resampler);
        self
    }

    #[must_use]
    pub fn filter<F: MorphologicalFilter + 'static>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    #[must_use]
    pub fn extractor<E: ContourExtractor + 'static>(mut self, extractor: E) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    #[must_use]
    pub fn reprojector<P: Reprojector + 'static>(mut self, reprojector: P) -> Self {
        self.reprojector = Box::new(reprojector);
        self
    }

    pub fn build(self) -> Result<Comparison, ChangeError> {
        let target_crs = self.target_crs.ok_or(ChangeError::Builder("target_crs"))?;
        Ok(Comparison {
            target_crs,
            resolution: self.resolution,
            mode: self.mode,
            min_height: self.min_height,
            min_area: self.min_area,
            resampler: self.resampler,
            filter: self.filter,
            extractor: self.extractor,
            reprojector: self.reprojector,
        })
    }
}

/// Compares two surveys stored as GeoTIFFs and returns the serialized
/// report.
#[allow(clippy::too_many_arguments)]
pub fn compare(
    reference_dsm: &Path,
    reference_dtm: &Path,
    compare_dsm: &Path,
    compare_dtm: &Path,
    target_crs: Crs,
    resolution: C,
    mode: DisplayMode,
    min_height: C,
    min_area: C,
) -> Result<String, ChangeError> {
    let paths = Dems {
        reference_dsm: reference_dsm.to_path_buf(),
        reference_dtm: reference_dtm.to_path_buf(),
        compare_dsm: compare_dsm.to_path_buf(),
        compare_dtm: compare_dtm.to_path_buf(),
    };
    Comparison::builder()
        .target_crs(target_crs)
        .resolution(resolution)
        .mode(mode)
        .min_height(min_height)
        .min_area(min_area)
        .build()?
        .run(&paths)?
        .to_json()
}

fn canopy_height(dsm: &Raster, dtm: &Raster) -> Result<MaskedGrid, ChangeError> {
    MaskedGrid::from_band(dsm, 0)?.difference(&MaskedGrid::from_band(dtm, 0)?)
}

/// Returns `(avg, min, max, std)` of `values`.
fn summarize(values: &[C]) -> Option<(C, C, C, C)> {
    if values.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as C;
    let avg = values.iter().sum::<C>() / n;
    let min = values.iter().copied().fold(C::INFINITY, C::min);
    let max = values.iter().copied().fold(C::NEG_INFINITY, C::max);
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<C>() / n;
    Some((avg, min, max, var.sqrt()))
}
