//! GeoTIFF reading and writing.
//!
//! Only pixel-interleaved, north-up images georeferenced through
//! `ModelPixelScale` + `ModelTiepoint` are handled.

use crate::{Crs, GeoTransform, Raster, RasterError, SampleType, C};
use log::warn;
use num_traits::AsPrimitive;
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};
use tiff::{
    decoder::{Decoder, DecodingResult},
    encoder::TiffEncoder,
    tags::Tag,
};

const GT_MODEL_TYPE_GEO_KEY: u16 = 1024;
const GT_RASTER_TYPE_GEO_KEY: u16 = 1025;
const GEOGRAPHIC_TYPE_GEO_KEY: u16 = 2048;
const PROJECTED_CS_TYPE_GEO_KEY: u16 = 3072;

const MODEL_TYPE_PROJECTED: u16 = 1;
const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_AREA: u16 = 1;

pub(crate) fn read(path: &Path) -> Result<Raster, RasterError> {
    let file = File::open(path)?;
    let mut decoder = Decoder::new(BufReader::new(file))?;
    let (width, height) = decoder.dimensions()?;
    let (width, height) = (width as usize, height as usize);

    if let Some(planar) = decoder.find_tag(Tag::PlanarConfiguration)? {
        if planar.into_u16()? != 1 {
            return Err(RasterError::Unsupported(format!(
                "{}: planar band layout",
                path.display()
            )));
        }
    }

    let transform = read_transform(&mut decoder, path)?;
    let crs = read_crs(&mut decoder)?;
    let nodata = read_nodata(&mut decoder)?;

    let (sample_type, samples) = widen(decoder.read_image()?)?;
    let pixels = width * height;
    if pixels == 0 || samples.len() % pixels != 0 {
        return Err(RasterError::Dimensions {
            expected: pixels,
            found: samples.len(),
        });
    }
    let band_count = samples.len() / pixels;

    let mut bands = vec![Vec::with_capacity(pixels); band_count];
    for pixel in samples.chunks_exact(band_count) {
        for (band, &v) in bands.iter_mut().zip(pixel) {
            band.push(v);
        }
    }

    let mut raster = Raster::new(width, height, transform, bands)?.with_sample_type(sample_type);
    if let Some(crs) = crs {
        raster = raster.with_crs(crs);
    } else {
        warn!("{}: no EPSG code in GeoKey directory", path.display());
    }
    if let Some(nodata) = nodata {
        raster = raster.with_nodata(nodata);
    }
    Ok(raster)
}

pub(crate) fn write(raster: &Raster, path: &Path) -> Result<(), RasterError> {
    let width = u32::try_from(raster.width()).map_err(|_| too_large(raster))?;
    let height = u32::try_from(raster.height()).map_err(|_| too_large(raster))?;
    let bands = u16::try_from(raster.band_count()).map_err(|_| too_large(raster))?;
    let sample_type = raster.sample_type();
    let t = raster.transform();

    let file = File::create(path)?;
    let mut encoder = TiffEncoder::new(BufWriter::new(file))?;
    let mut dir = encoder.image_directory()?;

    dir.write_tag(Tag::ImageWidth, width)?;
    dir.write_tag(Tag::ImageLength, height)?;
    dir.write_tag(Tag::BitsPerSample, &vec![sample_type.bits(); bands.into()][..])?;
    dir.write_tag(Tag::Compression, 1u16)?;
    dir.write_tag(Tag::PhotometricInterpretation, 1u16)?;
    dir.write_tag(Tag::SamplesPerPixel, bands)?;
    dir.write_tag(Tag::SampleFormat, &vec![sample_type.tiff_format(); bands.into()][..])?;
    dir.write_tag(Tag::PlanarConfiguration, 1u16)?;
    dir.write_tag(Tag::RowsPerStrip, height)?;
    if bands > 1 {
        dir.write_tag(Tag::ExtraSamples, &vec![0u16; usize::from(bands) - 1][..])?;
    }

    let pixel_scale = [t.pixel_width.abs(), t.pixel_height.abs(), 0.0];
    dir.write_tag(Tag::ModelPixelScaleTag, &pixel_scale[..])?;
    let tiepoint = [0.0, 0.0, 0.0, t.origin_x, t.origin_y, 0.0];
    dir.write_tag(Tag::ModelTiepointTag, &tiepoint[..])?;
    dir.write_tag(Tag::GeoKeyDirectoryTag, &geokey_directory(raster.crs())[..])?;
    if let Some(nodata) = raster.nodata() {
        dir.write_tag(Tag::GdalNodata, nodata.to_string().as_str())?;
    }

    let data = narrow(raster);
    let offset = dir.write_data(&data[..])?;
    let offset = u32::try_from(offset).map_err(|_| too_large(raster))?;
    let byte_count = u32::try_from(data.len()).map_err(|_| too_large(raster))?;
    dir.write_tag(Tag::StripOffsets, offset)?;
    dir.write_tag(Tag::StripByteCounts, byte_count)?;
    dir.finish()?;
    Ok(())
}

fn too_large(raster: &Raster) -> RasterError {
    RasterError::Unsupported(format!(
        "{}x{}x{} raster exceeds classic TIFF limits",
        raster.width(),
        raster.height(),
        raster.band_count()
    ))
}

fn read_transform<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
    path: &Path,
) -> Result<GeoTransform, RasterError> {
    let scale = decoder
        .find_tag(Tag::ModelPixelScaleTag)?
        .map(tiff::decoder::ifd::Value::into_f64_vec)
        .transpose()?;
    let tiepoint = decoder
        .find_tag(Tag::ModelTiepointTag)?
        .map(tiff::decoder::ifd::Value::into_f64_vec)
        .transpose()?;

    let (res_x, res_y) = match scale.as_deref() {
        Some([x, y, ..]) => (*x, *y),
        _ => {
            warn!("{}: no ModelPixelScale, assuming 1.0", path.display());
            (1.0, 1.0)
        }
    };
    // Tiepoint (i, j, k, x, y, z) ties raster pixel (i, j) to world
    // (x, y).
    let (origin_x, origin_y) = match tiepoint.as_deref() {
        Some([i, j, _, x, y, ..]) => (x - i * res_x, y + j * res_y),
        _ => {
            warn!("{}: no ModelTiepoint, assuming (0, 0)", path.display());
            (0.0, 0.0)
        }
    };

    Ok(GeoTransform::new(origin_x, origin_y, res_x, -res_y))
}

fn read_crs<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<Crs>, RasterError> {
    let Some(keys) = decoder.find_tag(Tag::GeoKeyDirectoryTag)? else {
        return Ok(None);
    };
    Ok(parse_geokeys(&keys.into_u16_vec()?))
}

/// Returns the EPSG code stored inline in a GeoKey directory.
///
/// Projected systems take precedence over geographic ones.
fn parse_geokeys(keys: &[u16]) -> Option<Crs> {
    // Header is (version, revision, minor, key count), followed by
    // (key id, tag location, count, value) quadruples.
    let entries = keys.get(4..)?;
    let inline_value = |wanted: u16| {
        entries
            .chunks_exact(4)
            .find(|entry| entry[0] == wanted && entry[1] == 0)
            .map(|entry| entry[3])
    };
    // 32767 is "user defined", which carries no EPSG code.
    [PROJECTED_CS_TYPE_GEO_KEY, GEOGRAPHIC_TYPE_GEO_KEY]
        .into_iter()
        .filter_map(inline_value)
        .find(|&code| code != 0 && code != 32767)
        .map(Crs::epsg)
}

fn geokey_directory(crs: Option<Crs>) -> Vec<u16> {
    let mut keys = vec![1, 1, 0, 0];
    let mut push = |id: u16, value: u16| keys.extend_from_slice(&[id, 0, 1, value]);
    match crs {
        Some(crs) if is_geographic(crs) => {
            push(GT_MODEL_TYPE_GEO_KEY, MODEL_TYPE_GEOGRAPHIC);
            push(GT_RASTER_TYPE_GEO_KEY, RASTER_PIXEL_IS_AREA);
            push(GEOGRAPHIC_TYPE_GEO_KEY, crs.code());
        }
        Some(crs) => {
            push(GT_MODEL_TYPE_GEO_KEY, MODEL_TYPE_PROJECTED);
            push(GT_RASTER_TYPE_GEO_KEY, RASTER_PIXEL_IS_AREA);
            push(PROJECTED_CS_TYPE_GEO_KEY, crs.code());
        }
        None => push(GT_RASTER_TYPE_GEO_KEY, RASTER_PIXEL_IS_AREA),
    }
    #[allow(clippy::cast_possible_truncation)]
    let count = ((keys.len() - 4) / 4) as u16;
    keys[3] = count;
    keys
}

/// Geographic 2D systems live in the EPSG 4000-4999 range.
fn is_geographic(crs: Crs) -> bool {
    (4000..5000).contains(&crs.code())
}

fn read_nodata<R: std::io::Read + std::io::Seek>(
    decoder: &mut Decoder<R>,
) -> Result<Option<C>, RasterError> {
    let Some(value) = decoder.find_tag(Tag::GdalNodata)? else {
        return Ok(None);
    };
    let text = value.into_string()?;
    Ok(text.trim_matches(|c: char| c == '\0' || c.is_whitespace()).parse().ok())
}

#[allow(unreachable_patterns)]
fn widen(decoded: DecodingResult) -> Result<(SampleType, Vec<C>), RasterError> {
    fn cast<T: AsPrimitive<C>>(samples: Vec<T>) -> Vec<C> {
        samples.into_iter().map(AsPrimitive::as_).collect()
    }
    Ok(match decoded {
        DecodingResult::U8(v) => (SampleType::U8, cast(v)),
        DecodingResult::I8(v) => (SampleType::I8, cast(v)),
        DecodingResult::U16(v) => (SampleType::U16, cast(v)),
        DecodingResult::I16(v) => (SampleType::I16, cast(v)),
        DecodingResult::U32(v) => (SampleType::U32, cast(v)),
        DecodingResult::I32(v) => (SampleType::I32, cast(v)),
        DecodingResult::U64(v) => (SampleType::U64, cast(v)),
        DecodingResult::I64(v) => (SampleType::I64, cast(v)),
        DecodingResult::F32(v) => (SampleType::F32, cast(v)),
        DecodingResult::F64(v) => (SampleType::F64, v),
        _ => return Err(RasterError::Unsupported("sample type".into())),
    })
}

/// Returns `raster`'s samples, pixel-interleaved and encoded as its
/// sample type in native byte order.
fn narrow(raster: &Raster) -> Vec<u8> {
    let pixels = raster.width() * raster.height();
    let bands: Vec<&[C]> = raster.bands.iter().map(Vec::as_slice).collect();
    let interleaved = (0..pixels).flat_map(|idx| bands.iter().map(move |band| band[idx]));
    let mut out = Vec::with_capacity(pixels * bands.len() * usize::from(raster.sample_type().bits() / 8));

    macro_rules! encode {
        ($t:ty) => {
            for v in interleaved {
                let v: $t = v.as_();
                out.extend_from_slice(&v.to_ne_bytes());
            }
        };
    }

    match raster.sample_type() {
        SampleType::U8 => encode!(u8),
        SampleType::I8 => encode!(i8),
        SampleType::U16 => encode!(u16),
        SampleType::I16 => encode!(i16),
        SampleType::U32 => encode!(u32),
        SampleType::I32 => encode!(i32),
        SampleType::U64 => encode!(u64),
        SampleType::I64 => encode!(i64),
        SampleType::F32 => encode!(f32),
        SampleType::F64 => encode!(f64),
    }
    out
}
