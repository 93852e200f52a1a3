//! In-memory elevation rasters.
//!
//! A [`Raster`] is read once from a GeoTIFF and then passed by value
//! through resampling, windowing and value shifts. Every operation
//! returns a new raster and leaves its input untouched.
//!
//! # References
//!
//! 1. [GeoTIFF format specification](https://docs.ogc.org/is/19-008r4/19-008r4.html)
//! 1. [GDAL raster data model](https://gdal.org/user/raster_data_model.html)

mod bounds;
mod error;
mod geotiff;
mod resample;
mod smooth;
mod transform;

pub use crate::{bounds::Bounds, error::RasterError, resample::Resampling, transform::GeoTransform};
pub use geo;
use std::{fmt, path::Path, str::FromStr};

/// Base floating point type used for all coordinates and samples.
pub type C = f64;

/// Coordinate reference system, identified by its EPSG code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Crs(u16);

impl Crs {
    pub const WGS84: Self = Self(4326);
    pub const WEB_MERCATOR: Self = Self(3857);

    pub const fn epsg(code: u16) -> Self {
        Self(code)
    }

    pub fn code(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.0)
    }
}

impl FromStr for Crs {
    type Err = std::num::ParseIntError;

    /// Parses `"3857"` or `"EPSG:3857"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let code = s
            .strip_prefix("EPSG:")
            .or_else(|| s.strip_prefix("epsg:"))
            .unwrap_or(s);
        code.parse().map(Self)
    }
}

/// On-disk sample type of a raster.
///
/// Samples are held as [`C`] in memory; this only decides how they
/// are written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleType {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    #[default]
    F32,
    F64,
}

impl SampleType {
    pub fn bits(self) -> u16 {
        match self {
            Self::U8 | Self::I8 => 8,
            Self::U16 | Self::I16 => 16,
            Self::U32 | Self::I32 | Self::F32 => 32,
            Self::U64 | Self::I64 | Self::F64 => 64,
        }
    }

    /// TIFF `SampleFormat` value.
    fn tiff_format(self) -> u16 {
        match self {
            Self::U8 | Self::U16 | Self::U32 | Self::U64 => 1,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 => 2,
            Self::F32 | Self::F64 => 3,
        }
    }
}

/// A georeferenced grid of one or more bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    /// Number of columns.
    width: usize,

    /// Number of rows.
    height: usize,

    /// Pixel to world mapping shared by all bands.
    transform: GeoTransform,

    /// Coordinate reference system of `transform`, if known.
    crs: Option<Crs>,

    /// Sentinel marking samples without a measurement.
    nodata: Option<C>,

    /// How samples are stored on disk.
    sample_type: SampleType,

    /// Row-major samples, one `Vec` per band.
    bands: Vec<Vec<C>>,
}

impl Raster {
    /// Returns a raster built from row-major `bands`.
    ///
    /// Every band must hold exactly `width * height` samples.
    pub fn new(
        width: usize,
        height: usize,
        transform: GeoTransform,
        bands: Vec<Vec<C>>,
    ) -> Result<Self, RasterError> {
        let expected = width * height;
        if let Some(found) = bands.iter().map(Vec::len).find(|&len| len != expected) {
            return Err(RasterError::Dimensions { expected, found });
        }
        if bands.is_empty() {
            return Err(RasterError::Unsupported("raster has no bands".into()));
        }
        Ok(Self {
            width,
            height,
            transform,
            crs: None,
            nodata: None,
            sample_type: SampleType::default(),
            bands,
        })
    }

    #[must_use]
    pub fn with_crs(mut self, crs: Crs) -> Self {
        self.crs = Some(crs);
        self
    }

    #[must_use]
    pub fn with_nodata(mut self, nodata: C) -> Self {
        self.nodata = Some(nodata);
        self
    }

    #[must_use]
    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.sample_type = sample_type;
        self
    }

    /// Reads the GeoTIFF at `path` into memory.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RasterError> {
        geotiff::read(path.as_ref())
    }

    /// Writes this raster to `path` as a GeoTIFF.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<(), RasterError> {
        geotiff::write(self, path.as_ref())
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// Returns the absolute `(x, y)` pixel size.
    pub fn resolution(&self) -> (C, C) {
        self.transform.resolution()
    }

    pub fn crs(&self) -> Option<Crs> {
        self.crs
    }

    pub fn nodata(&self) -> Option<C> {
        self.nodata
    }

    pub fn sample_type(&self) -> SampleType {
        self.sample_type
    }

    /// Returns the samples of the zero-indexed `band`.
    pub fn band(&self, band: usize) -> Result<&[C], RasterError> {
        self.bands
            .get(band)
            .map(Vec::as_slice)
            .ok_or(RasterError::BandIndex(band, self.bands.len()))
    }

    /// Returns a copy of `self` with the zero-indexed `band` replaced.
    pub fn with_band(&self, band: usize, samples: Vec<C>) -> Result<Self, RasterError> {
        self.band(band)?;
        let expected = self.width * self.height;
        if samples.len() != expected {
            return Err(RasterError::Dimensions {
                expected,
                found: samples.len(),
            });
        }
        let mut out = self.clone();
        out.bands[band] = samples;
        Ok(out)
    }

    /// Returns true if `sample` is a measurement rather than no-data.
    pub fn is_valid(&self, sample: C) -> bool {
        !sample.is_nan() && Some(sample) != self.nodata
    }

    /// Value written into cells that have no source measurement.
    pub fn fill_value(&self) -> C {
        self.nodata.unwrap_or(C::NAN)
    }

    /// Returns the rectangle covered by this raster.
    pub fn bounds(&self) -> Bounds {
        let t = &self.transform;
        #[allow(clippy::cast_precision_loss)]
        let (w, h) = (self.width as C, self.height as C);
        let x0 = t.origin_x;
        let x1 = t.origin_x + w * t.pixel_width;
        let y0 = t.origin_y;
        let y1 = t.origin_y + h * t.pixel_height;
        Bounds::new(x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1))
    }

    /// Returns the lowest valid sample of `band`, if it has any.
    pub fn band_min(&self, band: usize) -> Result<Option<C>, RasterError> {
        Ok(self
            .band(band)?
            .iter()
            .copied()
            .filter(|&v| self.is_valid(v))
            .min_by(C::total_cmp))
    }

    /// Returns a new raster with `delta` subtracted from every valid
    /// sample of `band`.
    pub fn shift_band_values(&self, band: usize, delta: C) -> Result<Self, RasterError> {
        let shifted = self
            .band(band)?
            .iter()
            .map(|&v| if self.is_valid(v) { v - delta } else { v })
            .collect();
        self.with_band(band, shifted)
    }

    /// Returns a raster holding only the pixels of `self` that
    /// overlap `bounds`.
    ///
    /// The window's size is rounded up to whole pixels. Window pixels
    /// outside `self` are filled with no-data.
    pub fn crop_to_bounds(&self, bounds: &Bounds) -> Result<Self, RasterError> {
        resample::crop(self, bounds)
    }

    /// Returns `self` resampled onto a grid of `x_res` by `y_res`
    /// pixels, snapped to whole multiples of the resolution.
    pub fn resample(&self, x_res: C, y_res: C, method: Resampling) -> Result<Self, RasterError> {
        resample::resample(self, x_res, y_res, method)
    }

    /// Returns a raster whose `band` has gone through a `size` by
    /// `size` median filter. No-data cells are left untouched.
    pub fn median_smooth(&self, band: usize, size: usize) -> Result<Self, RasterError> {
        let smoothed = smooth::median(self, band, size)?;
        self.with_band(band, smoothed)
    }
}

/// Private API.
impl Raster {
    /// Returns a raster that shares everything but size, transform,
    /// and samples with `self`.
    fn derive(&self, width: usize, height: usize, transform: GeoTransform, bands: Vec<Vec<C>>) -> Self {
        debug_assert!(bands.iter().all(|b| b.len() == width * height));
        Self {
            width,
            height,
            transform,
            crs: self.crs,
            nodata: self.nodata,
            sample_type: self.sample_type,
            bands,
        }
    }

    fn index(&self, row: usize, col: usize) -> usize {
        row * self.width + col
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::{GeoTransform, Raster, C};

    /// Returns a single band raster with `f(row, col)` samples and an
    /// upper-left corner at `(origin_x, origin_y)`.
    pub fn raster_from_fn<F: Fn(usize, usize) -> C>(
        width: usize,
        height: usize,
        origin: (C, C),
        res: C,
        f: F,
    ) -> Raster {
        let mut samples = Vec::with_capacity(width * height);
        for row in 0..height {
            for col in 0..width {
                samples.push(f(row, col));
            }
        }
        Raster::new(
            width,
            height,
            GeoTransform::new(origin.0, origin.1, res, -res),
            vec![samples],
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::{test_util::raster_from_fn, Bounds, Crs, GeoTransform, Raster, RasterError};

    #[test]
    fn test_new_rejects_bad_dimensions() {
        let t = GeoTransform::new(0.0, 0.0, 1.0, -1.0);
        let res = Raster::new(3, 3, t, vec![vec![0.0; 9], vec![0.0; 8]]);
        assert!(matches!(
            res,
            Err(RasterError::Dimensions {
                expected: 9,
                found: 8
            })
        ));
    }

    #[test]
    fn test_bounds_folds_pixel_height_sign() {
        let north_up = raster_from_fn(4, 3, (10.0, 20.0), 2.0, |_, _| 0.0);
        assert_eq!(north_up.bounds(), Bounds::new(10.0, 14.0, 18.0, 20.0));

        let south_up = Raster::new(
            4,
            3,
            GeoTransform::new(10.0, 14.0, 2.0, 2.0),
            vec![vec![0.0; 12]],
        )
        .unwrap();
        assert_eq!(south_up.bounds(), north_up.bounds());
    }

    #[test]
    fn test_shift_preserves_nodata() {
        let raster = raster_from_fn(3, 1, (0.0, 1.0), 1.0, |_, col| [5.0, -9999.0, 7.0][col])
            .with_nodata(-9999.0);
        assert_eq!(raster.band_min(0).unwrap(), Some(5.0));
        let shifted = raster.shift_band_values(0, 5.0).unwrap();
        assert_eq!(shifted.band(0).unwrap(), &[0.0, -9999.0, 2.0]);
        assert_eq!(shifted.band_min(0).unwrap(), Some(0.0));
        // Input is untouched.
        assert_eq!(raster.band(0).unwrap(), &[5.0, -9999.0, 7.0]);
    }

    #[test]
    fn test_band_min_skips_nan() {
        let raster = raster_from_fn(2, 2, (0.0, 2.0), 1.0, |row, col| {
            if row == col {
                f64::NAN
            } else {
                (row * 10 + col) as f64
            }
        });
        assert_eq!(raster.band_min(0).unwrap(), Some(1.0));
        assert!(matches!(raster.band(1), Err(RasterError::BandIndex(1, 1))));
    }

    #[test]
    fn test_crs_parse() {
        assert_eq!("EPSG:32633".parse::<Crs>().unwrap(), Crs::epsg(32633));
        assert_eq!("3857".parse::<Crs>().unwrap(), Crs::WEB_MERCATOR);
        assert_eq!(Crs::WGS84.to_string(), "EPSG:4326");
        assert!("EPSG:abc".parse::<Crs>().is_err());
    }
}
