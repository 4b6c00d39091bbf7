/*! Isotopic abundance models for predicting the relative heights of isotope peaks */
use std::collections::btree_map::{self, BTreeMap};
use std::collections::hash_map::{self, HashMap};
use std::hash;
use std::str::FromStr;

#[doc(hidden)]
pub use chemical_elements::isotopic_pattern::{
    BafflingRecursiveIsotopicPatternGenerator, TheoreticalIsotopicPattern,
};

use chemical_elements::{
    neutral_mass, ChemicalComposition, ElementSpecification, PROTON as _PROTON,
};
use num_traits::Float;
use thiserror::Error;
use tracing::{trace, warn};

pub(crate) fn isclose<T: Float>(a: T, b: T, delta: T) -> bool {
    (a - b).abs() < delta
}

/// The mass of H+, a hydrogen atom minus an electron. Isotope peaks of an ion of charge
/// `z` are expected to be spaced `PROTON / z` apart.
pub const PROTON: f64 = _PROTON;

/// The mass difference between isotopes `C[13]` and `C[12]`, used to number the peaks of
/// a theoretical isotopic distribution.
pub const NEUTRON_SHIFT: f64 = 1.0033548378;

/// Monoisotopic abundances at or below this value cannot anchor an isotope prediction
pub const MIN_MONOISOTOPIC_ABUNDANCE: f64 = 1e-12;

/// The capability to predict the relative abundances of the isotope peaks of an ion.
///
/// `abundances(mass)` receives the singly-protonated mass of the ion and returns relative
/// abundances indexed from the monoisotopic peak (index 0) upward. Values should lie in
/// `[0, 1]`, and the same mass should always produce the same vector.
///
/// Any `FnMut(f64) -> Vec<f64>` is an estimator, which makes it easy to inject
/// a fixed model:
/// ```
/// use mzreduce::isotopic_model::IsotopeAbundanceEstimator;
///
/// let mut model = |_mass: f64| vec![0.6, 0.3, 0.1];
/// assert_eq!(model.abundances(1000.0)[1], 0.3);
/// ```
pub trait IsotopeAbundanceEstimator {
    fn abundances(&mut self, mass: f64) -> Vec<f64>;

    /// The ratio of the `index`-th isotope's abundance to the monoisotopic abundance,
    /// or `None` if the monoisotopic abundance can't support a prediction.
    fn relative_to_monoisotopic(&mut self, mass: f64, index: usize) -> Option<f64> {
        let abundances = self.abundances(mass);
        isotope_ratio(&abundances, index)
    }
}

impl<F: FnMut(f64) -> Vec<f64>> IsotopeAbundanceEstimator for F {
    fn abundances(&mut self, mass: f64) -> Vec<f64> {
        self(mass)
    }
}

/// Compute `abundances[index] / abundances[0]`, guarding against a missing, zero or
/// non-finite monoisotopic abundance.
pub fn isotope_ratio(abundances: &[f64], index: usize) -> Option<f64> {
    let mono = *abundances.first()?;
    let other = *abundances.get(index)?;
    if !mono.is_finite() || mono <= MIN_MONOISOTOPIC_ABUNDANCE {
        return None;
    }
    let ratio = other / mono;
    if ratio.is_finite() {
        Some(ratio)
    } else {
        None
    }
}

/// An error that might occur while building an isotopic model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("Unknown element specification {0:?}")]
    UnknownElement(String),
    #[error("The base composition has no mass")]
    EmptyComposition,
    #[error("Unknown averagine model {0:?}")]
    UnknownAveragine(String),
    #[error("The cache bin width must be a finite, positive number, got {0}")]
    InvalidBinWidth(f64),
}

/// A fractional elemental composition with non-ordinal element counts used to represent
/// "averaged" chemical compositions.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FractionalComposition<'a>(HashMap<ElementSpecification<'a>, f64>);

impl<'a> FromIterator<(ElementSpecification<'a>, f64)> for FractionalComposition<'a> {
    fn from_iter<T: IntoIterator<Item = (ElementSpecification<'a>, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> FractionalComposition<'a> {
    #[inline]
    pub fn get<Q>(&self, k: &Q) -> Option<&f64>
    where
        ElementSpecification<'a>: std::borrow::Borrow<Q>,
        Q: hash::Hash + Eq + ?Sized,
    {
        self.0.get(k)
    }

    #[inline]
    pub fn iter(&self) -> hash_map::Iter<'_, ElementSpecification<'a>, f64> {
        self.0.iter()
    }

    /// The mass of the composition, weighting each element by its most abundant isotope
    #[inline]
    pub fn mass(&self) -> f64 {
        self.iter()
            .map(|(e, c)| e.element.most_abundant_mass * *c)
            .sum()
    }

    pub fn insert(&mut self, k: ElementSpecification<'a>, v: f64) -> Option<f64> {
        self.0.insert(k, v)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Named "average monomer" compositions for common classes of biomolecules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Averagine {
    #[default]
    Peptide,
    Glycan,
    Glycopeptide,
    PermethylatedGlycan,
    Heparin,
    HeparanSulfate,
}

impl Averagine {
    /// The element symbols and fractional counts of the average monomer
    pub fn element_counts(&self) -> &'static [(&'static str, f64)] {
        match self {
            Self::Peptide => &[
                ("H", 7.7583),
                ("C", 4.9384),
                ("S", 0.0417),
                ("O", 1.4773),
                ("N", 1.3577),
            ],
            Self::Glycan => &[("H", 11.8333), ("C", 7.0), ("O", 5.16666), ("N", 0.5)],
            Self::Glycopeptide => &[
                ("H", 15.75),
                ("C", 10.93),
                ("S", 0.02054),
                ("O", 6.4773),
                ("N", 1.6577),
            ],
            Self::PermethylatedGlycan => &[("C", 12.0), ("H", 21.8333), ("N", 0.5), ("O", 5.16666)],
            Self::Heparin => &[("H", 10.5), ("C", 6.0), ("S", 0.5), ("O", 5.5), ("N", 0.5)],
            Self::HeparanSulfate => &[
                ("H", 10.667),
                ("C", 6.0),
                ("S", 1.333),
                ("O", 9.0),
                ("N", 0.667),
            ],
        }
    }
}

impl FromStr for Averagine {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "peptide" => Ok(Self::Peptide),
            "glycan" => Ok(Self::Glycan),
            "glycopeptide" => Ok(Self::Glycopeptide),
            "permethylatedglycan" => Ok(Self::PermethylatedGlycan),
            "heparin" => Ok(Self::Heparin),
            "heparansulfate" => Ok(Self::HeparanSulfate),
            _ => Err(ModelError::UnknownAveragine(s.to_string())),
        }
    }
}

/// An [`IsotopeAbundanceEstimator`] that scales an "average monomer" composition to the
/// queried mass and computes the isotopic distribution of the resulting composition.
///
/// This is an implementation of Senko's Averagine [^1]
///
/// # References
/// [^1]: Senko M, Beu S, McLafferty F: Determination of Monoisotopic Masses and Ion
///       Populations for Large Biomolecules from Resolved Isotopic Distributions.
///       Journal of the American Society for Mass Spectrometry 1995, 6:229-233
///       <https://doi.org/10.1016/1044-0305(95)00017-8>
#[derive(Debug, Clone)]
pub struct AveragineModel<'lifespan> {
    /// The "average" monomer composition
    pub base_composition: FractionalComposition<'lifespan>,
    /// The mass of the average monomer to interpolate with
    pub base_mass: f64,
    /// The cumulative abundance of the distribution to keep before discarding the tail
    pub truncate_after: f64,
    hydrogen: ElementSpecification<'lifespan>,
    generator: BafflingRecursiveIsotopicPatternGenerator<'lifespan>,
}

impl PartialEq for AveragineModel<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.base_composition == other.base_composition
            && isclose(self.truncate_after, other.truncate_after, 1e-9)
    }
}

impl<'lifespan: 'transient, 'transient> AveragineModel<'lifespan> {
    pub fn new(base_composition: FractionalComposition<'lifespan>) -> Self {
        Self {
            base_mass: base_composition.mass(),
            base_composition,
            truncate_after: 0.95,
            hydrogen: ElementSpecification::parse("H").expect("hydrogen is a known element"),
            generator: BafflingRecursiveIsotopicPatternGenerator::new(),
        }
    }

    /// Build a model from `(element symbol, count)` pairs
    pub fn from_element_counts<T: IntoIterator<Item = (&'static str, f64)>>(
        counts: T,
    ) -> Result<Self, ModelError> {
        let mut composition = FractionalComposition::default();
        for (symbol, count) in counts {
            let elt: ElementSpecification<'lifespan> = symbol
                .parse()
                .map_err(|_| ModelError::UnknownElement(symbol.to_string()))?;
            composition.insert(elt, count);
        }
        if composition.is_empty() || composition.mass() <= 0.0 {
            return Err(ModelError::EmptyComposition);
        }
        Ok(Self::new(composition))
    }

    pub fn with_truncate_after(mut self, truncate_after: f64) -> Self {
        self.truncate_after = truncate_after;
        self
    }

    /// Scale the base composition to the neutral mass of an ion whose singly protonated
    /// mass is `mass`, correcting the hydrogen count for rounding drift.
    pub fn scale(&self, mass: f64) -> ChemicalComposition<'transient> {
        let neutral = neutral_mass(mass, 1, PROTON);
        let scale = neutral / self.base_mass;

        let mut scaled = ChemicalComposition::new();
        for (elt, count) in self.base_composition.iter() {
            scaled.set(*elt, (*count * scale).round() as i32);
        }
        let delta = (scaled.mass() - neutral).round() as i32;
        let hydrogens = scaled[&self.hydrogen];
        if hydrogens > delta {
            scaled[&self.hydrogen] -= delta;
        } else {
            scaled[&self.hydrogen] = 0;
        }
        scaled
    }

    /// Generate the theoretical isotopic pattern for a singly protonated `mass`
    pub fn isotopic_pattern(&mut self, mass: f64) -> TheoreticalIsotopicPattern {
        let composition = self.scale(mass);
        let peaks = self.generator.isotopic_variants(composition, 0, 1, PROTON);
        TheoreticalIsotopicPattern::from(peaks).truncate_after(self.truncate_after)
    }
}

impl IsotopeAbundanceEstimator for AveragineModel<'_> {
    fn abundances(&mut self, mass: f64) -> Vec<f64> {
        if !mass.is_finite() || mass <= PROTON {
            return Vec::new();
        }
        let tid = self.isotopic_pattern(mass);
        let Some(first_mz) = tid.peaks.first().map(|p| p.mz) else {
            return Vec::new();
        };

        // Fine structure peaks that share a nominal isotope number are pooled.
        let mut abundances: Vec<f64> = Vec::with_capacity(tid.peaks.len());
        for p in tid.peaks.iter() {
            let index = ((p.mz - first_mz) / NEUTRON_SHIFT).round() as usize;
            if abundances.len() <= index {
                abundances.resize(index + 1, 0.0);
            }
            abundances[index] += p.intensity;
        }

        let total: f64 = abundances.iter().sum();
        if total > 0.0 {
            abundances.iter_mut().for_each(|a| *a /= total);
        }
        abundances
    }
}

impl From<Averagine> for AveragineModel<'_> {
    fn from(source: Averagine) -> Self {
        let composition = source
            .element_counts()
            .iter()
            .map(|(symbol, count)| {
                let elt = ElementSpecification::parse(symbol)
                    .expect("built-in averagine compositions use known elements");
                (elt, *count)
            })
            .collect();
        Self::new(composition)
    }
}

#[derive(Debug, Clone, Copy)]
struct FloatRange {
    start: f64,
    end: f64,
    step: f64,
    index: usize,
}

impl FloatRange {
    fn new(start: f64, end: f64, step: f64) -> Self {
        Self {
            start,
            end,
            step,
            index: 0,
        }
    }
}

impl Iterator for FloatRange {
    type Item = f64;

    fn next(&mut self) -> Option<Self::Item> {
        let val = self.start + self.step * (self.index as f64);
        if val < self.end {
            self.index += 1;
            Some(val)
        } else {
            None
        }
    }
}

#[inline]
fn valid_bin_width(bin_width: f64) -> bool {
    bin_width.is_finite() && bin_width > 0.0
}

/// A wrapper around another [`IsotopeAbundanceEstimator`] which remembers the abundances
/// computed for each mass bin of width `bin_width`, answering queries that fall in the same
/// bin from the cache.
///
/// Cached vectors are computed at the center of their bin, so the answer for a mass does not
/// depend on which mass in the bin was queried first.
#[derive(Debug, Clone)]
pub struct CachingAbundanceModel<E: IsotopeAbundanceEstimator> {
    inner: E,
    bin_width: f64,
    cache: BTreeMap<i64, Vec<f64>>,
}

impl<E: IsotopeAbundanceEstimator> CachingAbundanceModel<E> {
    /// Wrap `inner`. A `bin_width` that is not finite and positive disables the cache and
    /// every query is passed straight through to `inner`.
    pub fn new(inner: E, bin_width: f64) -> Self {
        Self {
            inner,
            bin_width,
            cache: BTreeMap::new(),
        }
    }

    /// Wrap `inner`, rejecting a `bin_width` that is not finite and positive
    pub fn try_new(inner: E, bin_width: f64) -> Result<Self, ModelError> {
        if valid_bin_width(bin_width) {
            Ok(Self::new(inner, bin_width))
        } else {
            Err(ModelError::InvalidBinWidth(bin_width))
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, i64, Vec<f64>> {
        self.cache.iter()
    }

    pub fn clear(&mut self) {
        self.cache.clear()
    }

    pub fn bin_width(&self) -> f64 {
        self.bin_width
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn into_inner(self) -> E {
        self.inner
    }

    #[inline(always)]
    fn key_for(&self, mass: f64) -> i64 {
        (mass / self.bin_width).round() as i64
    }

    /// Pre-compute abundances for every bin between `min_mass` and `max_mass`
    pub fn populate_cache(&mut self, min_mass: f64, max_mass: f64) {
        if !valid_bin_width(self.bin_width) {
            warn!("Cannot populate a cache with bin width {}", self.bin_width);
            return;
        }
        trace!("Starting isotopic abundance cache population");
        for mass in FloatRange::new(min_mass, max_mass, self.bin_width) {
            self.abundances(mass);
        }
        trace!(
            "Finished isotopic abundance cache population, {} entries created",
            self.len()
        );
    }
}

impl<E: IsotopeAbundanceEstimator> IsotopeAbundanceEstimator for CachingAbundanceModel<E> {
    fn abundances(&mut self, mass: f64) -> Vec<f64> {
        if !(mass.is_finite() && valid_bin_width(self.bin_width)) {
            return self.inner.abundances(mass);
        }
        let key = self.key_for(mass);
        let center = key as f64 * self.bin_width;
        let inner = &mut self.inner;
        self.cache
            .entry(key)
            .or_insert_with(|| inner.abundances(center))
            .clone()
    }
}

impl<'a> From<Averagine> for CachingAbundanceModel<AveragineModel<'a>> {
    fn from(source: Averagine) -> Self {
        Self::new(source.into(), 1.0)
    }
}

impl<'a> From<AveragineModel<'a>> for CachingAbundanceModel<AveragineModel<'a>> {
    fn from(model: AveragineModel<'a>) -> Self {
        Self::new(model, 1.0)
    }
}
