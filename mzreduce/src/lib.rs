//! Charge state assignment, deisotoping and charge reduction of centroided peak lists.
//!
//! A peak list flows through [`charge::ChargeAssignmentEngine`], which infers charge
//! states from isotope peak spacing and relative abundance, and then through
//! [`reduction::ReductionEngine`], which explains away isotope peaks and folds every multiply
//! charged peak onto its singly charged m/z. Both rely on [`matcher::PeakMatcher`] for
//! tolerance-aware peak lookup and on an injected [`isotopic_model::IsotopeAbundanceEstimator`].
pub mod isotopic_model;
pub mod matcher;
pub mod params;
pub mod peaks;

pub mod charge;
pub mod reduction;

pub mod api;
pub mod batch;

pub use crate::api::{assign_charges, deisotope_and_reduce};
pub use crate::batch::BatchError;
pub use crate::charge::{AssignmentTarget, ChargeAssignmentEngine};
pub use crate::isotopic_model::{
    Averagine, AveragineModel, CachingAbundanceModel, IsotopeAbundanceEstimator, ModelError,
    PROTON,
};
pub use crate::matcher::PeakMatcher;
pub use crate::params::{ChargeAssignmentParams, ParameterError, ReductionParams};
#[cfg(feature = "config")]
pub use crate::params::ConfigError;
pub use crate::peaks::{Peak, PeakList, Tristate};
pub use crate::reduction::ReductionEngine;
