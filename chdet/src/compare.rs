use crate::options::{Clouds, CompareOpts, Dems};
use anyhow::Result;
use changedet::{
    georaster::Resampling,
    pointcloud::{prepare_dems, CloudInputs, Pdal},
    Comparison, Dems as DemPaths,
};
use log::info;
use std::{fs, path::PathBuf};

impl CompareOpts {
    fn run(&self, paths: &DemPaths<PathBuf>) -> Result<()> {
        paths.check_exist()?;
        let report = Comparison::builder()
            .target_crs(self.epsg)
            .resolution(self.resolution)
            .min_height(self.min_height)
            .min_area(self.min_area)
            .mode(self.display)
            .resampling(if self.bilinear {
                Resampling::Bilinear
            } else {
                Resampling::Nearest
            })
            .build()?
            .run(paths)?;
        fs::write(&self.out, report.to_json()?)?;
        info!("wrote {} to {}", self.display, self.out.display());
        println!("{}", self.out.display());
        Ok(())
    }
}

impl Dems {
    pub fn run(&self) -> Result<()> {
        self.compare.run(&DemPaths {
            reference_dsm: self.reference_dsm.clone(),
            reference_dtm: self.reference_dtm.clone(),
            compare_dsm: self.compare_dsm.clone(),
            compare_dtm: self.compare_dtm.clone(),
        })
    }
}

impl Clouds {
    pub fn run(&self) -> Result<()> {
        let pdal = Pdal::new(&self.pdal).resolution(self.compare.resolution);
        let inputs = CloudInputs {
            reference_pc: self.reference_pc.clone(),
            compare_pc: self.compare_pc.clone(),
            reference_dsm: self.reference_dsm.clone(),
            reference_dtm: self.reference_dtm.clone(),
            aligned_dsm: self.aligned_dsm.clone(),
            aligned_dtm: self.aligned_dtm.clone(),
        };
        prepare_dems(&pdal, &pdal, &inputs)?;
        self.compare.run(&DemPaths {
            reference_dsm: inputs.reference_dsm,
            reference_dtm: inputs.reference_dtm,
            compare_dsm: inputs.aligned_dsm,
            compare_dtm: inputs.aligned_dtm,
        })
    }
}
