//! Turning classified point clouds into the elevation models a
//! [`Comparison`](crate::Comparison) consumes.
//!
//! The heavy lifting is done by external tools behind
//! [`PointCloudRasterizer`] and [`PointCloudAligner`]; [`Pdal`] drives
//! the `pdal` command line application.

use crate::ChangeError;
use georaster::{Raster, C};
use log::{debug, info};
use serde_json::json;
use std::{
    ffi::OsStr,
    fmt, fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

/// ASPRS classification code of ground points.
pub const GROUND_CLASS: u8 = 2;

/// Side of the median filter applied to freshly rasterized models.
pub const MEDIAN_SIZE: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DemKind {
    /// Highest return per cell.
    Dsm,

    /// Lowest ground return per cell.
    Dtm,
}

impl fmt::Display for DemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Dsm => "dsm",
            Self::Dtm => "dtm",
        })
    }
}

/// Writes single band GeoTIFF elevation models from point clouds.
pub trait PointCloudRasterizer {
    /// Returns the distinct classification codes present in `cloud`.
    fn classifications(&self, cloud: &Path) -> Result<Vec<u8>, ChangeError>;

    /// Rasterizes `cloud` into a GeoTIFF at `out`.
    fn rasterize(&self, cloud: &Path, kind: DemKind, out: &Path) -> Result<(), ChangeError>;
}

/// Rigidly registers one point cloud onto another.
pub trait PointCloudAligner {
    /// Writes a copy of `moving`, aligned to `reference`, to `out`.
    /// Any side files go next to `out`.
    fn align(&self, reference: &Path, moving: &Path, out: &Path) -> Result<(), ChangeError>;
}

/// Rasterizes `cloud` and writes a median smoothed model to `out`.
///
/// Fails with [`ChangeError::UnclassifiedPointCloud`] before any
/// rasterization when `cloud` has no ground points.
pub fn rasterize_cloud<R: PointCloudRasterizer + ?Sized>(
    rasterizer: &R,
    cloud: &Path,
    kind: DemKind,
    out: &Path,
) -> Result<(), ChangeError> {
    let classes = rasterizer.classifications(cloud)?;
    debug!("{} classes {classes:?}", cloud.display());
    if !classes.contains(&GROUND_CLASS) {
        return Err(ChangeError::UnclassifiedPointCloud(cloud.to_path_buf()));
    }

    let scratch = tempfile::tempdir()?;
    let raw = scratch.path().join(format!("{kind}.tif"));
    rasterizer.rasterize(cloud, kind, &raw)?;
    if !raw.exists() {
        return Err(ChangeError::ExternalTool {
            tool: "rasterizer".into(),
            message: format!("no {kind} written for {}", cloud.display()),
        });
    }

    Raster::open(&raw)?
        .median_smooth(0, MEDIAN_SIZE)?
        .write(out)?;
    info!("wrote {kind} {}", out.display());
    Ok(())
}

/// Paths for a point cloud comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudInputs {
    pub reference_pc: PathBuf,
    pub compare_pc: PathBuf,
    pub reference_dsm: PathBuf,
    pub reference_dtm: PathBuf,
    pub aligned_dsm: PathBuf,
    pub aligned_dtm: PathBuf,
}

/// Produces whichever of the four elevation models in `inputs` do not
/// exist yet.
///
/// The compare cloud is registered onto the reference cloud only when
/// an aligned model is missing. The registered cloud lives in a
/// temporary directory that is removed before returning.
pub fn prepare_dems<A, R>(aligner: &A, rasterizer: &R, inputs: &CloudInputs) -> Result<(), ChangeError>
where
    A: PointCloudAligner + ?Sized,
    R: PointCloudRasterizer + ?Sized,
{
    for cloud in [&inputs.reference_pc, &inputs.compare_pc] {
        if !cloud.exists() {
            return Err(ChangeError::MissingInput(cloud.clone()));
        }
    }

    for (path, kind) in [
        (&inputs.reference_dsm, DemKind::Dsm),
        (&inputs.reference_dtm, DemKind::Dtm),
    ] {
        if !path.exists() {
            info!("rasterizing reference {kind}");
            create_parent(path)?;
            rasterize_cloud(rasterizer, &inputs.reference_pc, kind, path)?;
        }
    }

    let missing: Vec<(&PathBuf, DemKind)> = [
        (&inputs.aligned_dsm, DemKind::Dsm),
        (&inputs.aligned_dtm, DemKind::Dtm),
    ]
    .into_iter()
    .filter(|(path, _)| !path.exists())
    .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let scratch = tempfile::tempdir()?;
    let aligned = scratch.path().join("aligned.laz");
    info!("aligning {}", inputs.compare_pc.display());
    aligner.align(&inputs.reference_pc, &inputs.compare_pc, &aligned)?;
    if !aligned.exists() {
        return Err(ChangeError::ExternalTool {
            tool: "aligner".into(),
            message: format!("no aligned cloud written for {}", inputs.compare_pc.display()),
        });
    }

    for (path, kind) in missing {
        info!("rasterizing aligned {kind}");
        create_parent(path)?;
        rasterize_cloud(rasterizer, &aligned, kind, path)?;
    }
    Ok(())
}

fn create_parent(path: &Path) -> Result<(), ChangeError> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

/// Point cloud tools backed by the `pdal` executable.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdal {
    program: PathBuf,
    resolution: C,
    window_size: u32,
}

impl Default for Pdal {
    fn default() -> Self {
        Self::new("pdal")
    }
}

impl Pdal {
    pub fn new<P: Into<PathBuf>>(program: P) -> Self {
        Self {
            program: program.into(),
            resolution: 0.5,
            window_size: 3,
        }
    }

    /// Output cell size (defaults to 0.5).
    #[must_use]
    pub fn resolution(mut self, resolution: C) -> Self {
        self.resolution = resolution;
        self
    }

    /// Radius, in cells, of the hole filling done while rasterizing
    /// (defaults to 3, 0 disables).
    #[must_use]
    pub fn window_size(mut self, cells: u32) -> Self {
        self.window_size = cells;
        self
    }

    /// Returns the `pdal pipeline` description rasterizing `cloud`.
    pub fn rasterize_pipeline(&self, cloud: &Path, kind: DemKind, out: &Path) -> serde_json::Value {
        let cloud = cloud.display().to_string();
        let writer = json!({
            "type": "writers.gdal",
            "filename": out.display().to_string(),
            "resolution": self.resolution,
            "output_type": match kind {
                DemKind::Dsm => "max",
                DemKind::Dtm => "min",
            },
            "data_type": "float32",
            "nodata": -9999,
            "window_size": self.window_size,
            "gdaldriver": "GTiff",
        });
        let stages = match kind {
            DemKind::Dsm => json!([cloud, writer]),
            DemKind::Dtm => json!([
                cloud,
                {
                    "type": "filters.range",
                    "limits": format!("Classification[{GROUND_CLASS}:{GROUND_CLASS}]"),
                },
                writer,
            ]),
        };
        json!({ "pipeline": stages })
    }

    /// Returns the `pdal pipeline` description registering `moving`
    /// onto `reference`.
    pub fn align_pipeline(reference: &Path, moving: &Path, out: &Path) -> serde_json::Value {
        json!({
            "pipeline": [
                reference.display().to_string(),
                moving.display().to_string(),
                { "type": "filters.icp" },
                { "type": "writers.las", "filename": out.display().to_string(), "forward": "all" },
            ]
        })
    }
}

/// Private API
impl Pdal {
    /// Runs `pdal` with `args` in `dir` and returns its stdout.
    fn run<I, S>(&self, args: I, dir: Option<&Path>) -> Result<Vec<u8>, ChangeError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(dir) = dir {
            cmd.current_dir(dir);
        }
        debug!("{cmd:?}");
        let output = cmd.output().map_err(|e| self.failure(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.failure(format!("{}, {}", output.status, stderr.trim())));
        }
        Ok(output.stdout)
    }

    fn run_pipeline(&self, pipeline: &serde_json::Value, dir: Option<&Path>) -> Result<(), ChangeError> {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile()?;
        serde_json::to_writer(&mut file, pipeline)?;
        file.flush()?;
        self.run([OsStr::new("pipeline"), file.path().as_os_str()], dir)?;
        Ok(())
    }

    fn failure(&self, message: String) -> ChangeError {
        ChangeError::ExternalTool {
            tool: self.program.display().to_string(),
            message,
        }
    }
}

impl PointCloudRasterizer for Pdal {
    fn classifications(&self, cloud: &Path) -> Result<Vec<u8>, ChangeError> {
        let stdout = self.run(
            [
                OsStr::new("info"),
                OsStr::new("--stats"),
                OsStr::new("--enumerate"),
                OsStr::new("Classification"),
                cloud.as_os_str(),
            ],
            None,
        )?;
        parse_classifications(&stdout)
    }

    fn rasterize(&self, cloud: &Path, kind: DemKind, out: &Path) -> Result<(), ChangeError> {
        self.run_pipeline(&self.rasterize_pipeline(cloud, kind, out), None)
    }
}

impl PointCloudAligner for Pdal {
    fn align(&self, reference: &Path, moving: &Path, out: &Path) -> Result<(), ChangeError> {
        self.run_pipeline(&Self::align_pipeline(reference, moving, out), out.parent())
    }
}

/// Extracts the enumerated `Classification` values from `pdal info
/// --stats` output. A cloud without that dimension has no classes.
pub fn parse_classifications(info: &[u8]) -> Result<Vec<u8>, ChangeError> {
    let info: serde_json::Value = serde_json::from_slice(info)?;
    let statistics = info["stats"]["statistic"].as_array();
    let Some(classification) = statistics
        .into_iter()
        .flatten()
        .find(|dim| dim["name"] == "Classification")
    else {
        return Ok(Vec::new());
    };
    Ok(classification["values"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(serde_json::Value::as_u64)
        .filter_map(|v| u8::try_from(v).ok())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::{
        parse_classifications, prepare_dems, rasterize_cloud, CloudInputs, DemKind, Pdal,
        PointCloudAligner, PointCloudRasterizer,
    };
    use crate::{test_util::raster, ChangeError};
    use std::{
        cell::RefCell,
        fs,
        path::{Path, PathBuf},
    };

    /// Records calls and writes a fixed elevation model.
    #[derive(Default)]
    struct FakeTools {
        classes: Vec<u8>,
        silent: bool,
        calls: RefCell<Vec<String>>,
        aligned: RefCell<Option<PathBuf>>,
    }

    impl FakeTools {
        fn classified() -> Self {
            Self {
                classes: vec![1, 2, 6],
                ..Self::default()
            }
        }
    }

    impl PointCloudRasterizer for FakeTools {
        fn classifications(&self, _cloud: &Path) -> Result<Vec<u8>, ChangeError> {
            Ok(self.classes.clone())
        }

        fn rasterize(&self, cloud: &Path, kind: DemKind, out: &Path) -> Result<(), ChangeError> {
            let name = cloud.file_name().unwrap().to_string_lossy();
            self.calls.borrow_mut().push(format!("rasterize {name} {kind}"));
            if !self.silent {
                raster(7, 7, (0.0, 7.0), 1.0, |row, col| match (row, col) {
                    (3, 3) => 50.0,
                    (0, 0) => -9999.0,
                    _ => 1.0,
                })
                .write(out)?;
            }
            Ok(())
        }
    }

    impl PointCloudAligner for FakeTools {
        fn align(&self, _reference: &Path, moving: &Path, out: &Path) -> Result<(), ChangeError> {
            self.calls.borrow_mut().push("align".into());
            fs::copy(moving, out)?;
            fs::write(out.with_extension("txt"), "transform report")?;
            *self.aligned.borrow_mut() = Some(out.to_path_buf());
            Ok(())
        }
    }

    fn inputs(dir: &Path) -> CloudInputs {
        let reference_pc = dir.join("reference.laz");
        let compare_pc = dir.join("compare.laz");
        fs::write(&reference_pc, b"ref").unwrap();
        fs::write(&compare_pc, b"cmp").unwrap();
        CloudInputs {
            reference_pc,
            compare_pc,
            reference_dsm: dir.join("reference/dsm.tif"),
            reference_dtm: dir.join("reference/dtm.tif"),
            aligned_dsm: dir.join("aligned/nested/dsm.tif"),
            aligned_dtm: dir.join("aligned/nested/dtm.tif"),
        }
    }

    #[test]
    fn test_rasterize_smooths_and_keeps_nodata() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("dsm.tif");
        let tools = FakeTools::classified();
        rasterize_cloud(&tools, Path::new("cloud.laz"), DemKind::Dsm, &out).unwrap();

        let dem = georaster::Raster::open(&out).unwrap();
        let band = dem.band(0).unwrap();
        assert_eq!(band[0], -9999.0);
        assert!(band[1..].iter().all(|&v| v == 1.0));
        assert_eq!(dem.nodata(), Some(-9999.0));
    }

    #[test]
    fn test_unclassified_cloud_is_rejected_before_rasterizing() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeTools {
            classes: vec![0, 1],
            ..FakeTools::default()
        };
        let res = rasterize_cloud(&tools, Path::new("raw.laz"), DemKind::Dtm, &dir.path().join("x.tif"));
        assert!(matches!(res, Err(ChangeError::UnclassifiedPointCloud(p)) if p == Path::new("raw.laz")));
        assert!(tools.calls.borrow().is_empty());
    }

    #[test]
    fn test_missing_output_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tools = FakeTools {
            silent: true,
            ..FakeTools::classified()
        };
        let out = dir.path().join("dtm.tif");
        assert!(matches!(
            rasterize_cloud(&tools, Path::new("c.laz"), DemKind::Dtm, &out),
            Err(ChangeError::ExternalTool { .. })
        ));
        assert!(!out.exists());
    }

    #[test]
    fn test_prepare_builds_everything_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path());
        let tools = FakeTools::classified();
        prepare_dems(&tools, &tools, &inputs).unwrap();

        assert_eq!(
            *tools.calls.borrow(),
            vec![
                "rasterize reference.laz dsm",
                "rasterize reference.laz dtm",
                "align",
                "rasterize aligned.laz dsm",
                "rasterize aligned.laz dtm",
            ]
        );
        for dem in [
            &inputs.reference_dsm,
            &inputs.reference_dtm,
            &inputs.aligned_dsm,
            &inputs.aligned_dtm,
        ] {
            assert!(dem.exists(), "{}", dem.display());
        }
        let aligned = tools.aligned.borrow().clone().unwrap();
        assert!(!aligned.parent().unwrap().exists());
    }

    #[test]
    fn test_prepare_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = inputs(dir.path());
        let tools = FakeTools::classified();
        prepare_dems(&tools, &tools, &inputs).unwrap();
        fs::remove_file(&inputs.aligned_dtm).unwrap();
        tools.calls.borrow_mut().clear();

        prepare_dems(&tools, &tools, &inputs).unwrap();
        assert_eq!(
            *tools.calls.borrow(),
            vec!["align", "rasterize aligned.laz dtm"]
        );
    }

    #[test]
    fn test_prepare_requires_clouds() {
        let dir = tempfile::tempdir().unwrap();
        let mut inputs = inputs(dir.path());
        inputs.compare_pc = dir.path().join("missing.laz");
        let tools = FakeTools::classified();
        assert!(matches!(
            prepare_dems(&tools, &tools, &inputs),
            Err(ChangeError::MissingInput(p)) if p.ends_with("missing.laz")
        ));
        assert!(tools.calls.borrow().is_empty());
    }

    #[test]
    fn test_parse_classifications() {
        let info = br#"{
            "filename": "cloud.laz",
            "stats": {
                "statistic": [
                    { "name": "X", "average": 1.0 },
                    { "name": "Classification", "values": [1, 2, 7] }
                ]
            }
        }"#;
        assert_eq!(parse_classifications(info).unwrap(), vec![1, 2, 7]);
        assert!(parse_classifications(br#"{"stats": {"statistic": []}}"#)
            .unwrap()
            .is_empty());
        assert!(matches!(
            parse_classifications(b"not json"),
            Err(ChangeError::Json(_))
        ));
    }

    #[test]
    fn test_pipelines() {
        let pdal = Pdal::default().resolution(0.25);
        let dsm = pdal.rasterize_pipeline(Path::new("a.laz"), DemKind::Dsm, Path::new("dsm.tif"));
        assert_eq!(dsm["pipeline"][0], "a.laz");
        assert_eq!(dsm["pipeline"][1]["output_type"], "max");
        assert_eq!(dsm["pipeline"][1]["resolution"], 0.25);

        let dtm = pdal.rasterize_pipeline(Path::new("a.laz"), DemKind::Dtm, Path::new("dtm.tif"));
        assert_eq!(dtm["pipeline"][1]["limits"], "Classification[2:2]");
        assert_eq!(dtm["pipeline"][2]["output_type"], "min");
        assert_eq!(dtm["pipeline"][2]["filename"], "dtm.tif");

        let icp = Pdal::align_pipeline(Path::new("r.laz"), Path::new("m.laz"), Path::new("o.laz"));
        assert_eq!(icp["pipeline"][2]["type"], "filters.icp");
        assert_eq!(icp["pipeline"][3]["filename"], "o.laz");
    }

    #[test]
    fn test_missing_program() {
        let pdal = Pdal::new("/nonexistent/pdal");
        assert!(matches!(
            pdal.classifications(Path::new("cloud.laz")),
            Err(ChangeError::ExternalTool { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_program() {
        let pdal = Pdal::new("false");
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            pdal.rasterize(Path::new("c.laz"), DemKind::Dsm, &dir.path().join("o.tif")),
            Err(ChangeError::ExternalTool { tool, .. }) if tool == "false"
        ));
    }
}
