//! A basic demonstration of how to use [`mzreduce::deisotope_and_reduce`]
use std::collections::BTreeMap;

use mzreduce::{
    self,
    isotopic_model::{Averagine, CachingAbundanceModel, PROTON},
    AssignmentTarget, Peak, PeakList, ReductionParams,
};

fn main() {
    // A doubly charged envelope, a triply charged envelope and some singly charged noise
    let mut peaks = Vec::new();
    for (mono, charge, heights) in [
        (600.3, 2u32, [8000.0, 6000.0, 2500.0]),
        (480.9, 3u32, [5000.0, 5200.0, 3000.0]),
    ] {
        for (i, height) in heights.into_iter().enumerate() {
            peaks.push(Peak::new(mono + i as f64 * PROTON / charge as f64, height));
        }
    }
    peaks.push(Peak::new(350.2, 4000.0));
    peaks.push(Peak::new(812.4, 900.0));
    let peak_list = PeakList::new(peaks).with_parent_peak(Peak::with_charge(730.4, 2e6, 3));

    // Peptide averagine abundances, cached in 1 Da bins and filled ahead of time
    let mut estimator = CachingAbundanceModel::from(Averagine::Peptide);
    estimator.populate_cache(200.0, 2500.0);

    let params = ReductionParams::default()
        .with_intensity_threshold(1000.0)
        // Averagine isn't a perfect fit for every envelope
        .with_allowed_isotope_deviation(0.5)
        .with_assignment_target(AssignmentTarget::MatchedPeak);

    let n_raw = peak_list.len();
    let reduced = mzreduce::deisotope_and_reduce(peak_list, params, estimator);

    let mut table: BTreeMap<Option<u32>, usize> = BTreeMap::new();
    for peak in reduced.iter() {
        *table.entry(peak.charge).or_default() += 1;
        eprintln!("{peak}");
    }
    for (z, count) in table.iter() {
        eprintln!("{z:?} => {count}");
    }
    eprintln!("{n_raw} raw centroids reduced to {} peaks", reduced.len());
}
