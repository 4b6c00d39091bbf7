//! Reduce every spectrum in a file read with `mzdata`, reusing one engine and its cache.
//!
//! Usage: `cargo run --example reduce_spectrum --features mzdata-example -- <path> [config.toml]`
//!
//! Parameters are read from `mzreduce.toml`, the optional configuration file and then
//! `MZREDUCE_`-prefixed environment variables.
use std::{env, io, path::PathBuf};

use mzdata::prelude::*;
use mzreduce::{
    isotopic_model::{Averagine, CachingAbundanceModel},
    PeakList, ReductionEngine, ReductionParams,
};

fn main() -> io::Result<()> {
    let mut args = env::args().skip(1);
    let path = PathBuf::from(args.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "Expected a path to a spectrum file")
    })?);
    let config_path = args.next().map(PathBuf::from);

    let params = ReductionParams::load(config_path.as_deref())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    eprintln!("{params:?}");

    let mut estimator = CachingAbundanceModel::from(Averagine::Peptide);
    estimator.populate_cache(50.0, 3000.0);
    let mut engine = ReductionEngine::new(params, estimator);

    let reader = mzdata::MZReader::open_path(&path)?;
    for mut spec in reader {
        // Pick peaks from the spectrum so there will be centroids.
        if spec.pick_peaks(1.0).is_err() {
            continue;
        }
        let Some(peaks) = spec.peaks.as_ref() else {
            continue;
        };
        let peak_list = PeakList::from(peaks.clone());
        let n_raw = peak_list.len();
        let reduced = engine.reduce(peak_list);
        eprintln!(
            "{} (MS{}): {n_raw} centroids => {} peaks, TIC {:0.1}",
            spec.id(),
            spec.ms_level(),
            reduced.len(),
            reduced.tic()
        );
    }
    Ok(())
}
