use crate::defaults::{POSITIVE_EIG_THRESHOLD, REAL_EIG_THRESHOLD};
use crate::error::ResponseError;
use log::{info, warn};
use ndarray::prelude::*;
use ndarray_linalg::c64;
use std::cmp::Ordering;

/// Excitation (X) and de-excitation (Y) amplitudes in the flattened (occ, virt) layout of all
/// spin channels. Tamm-Dancoff amplitudes carry no Y.
#[derive(Debug, Clone, PartialEq)]
pub struct ExcitationAmplitude {
    pub x: Array1<c64>,
    pub y: Option<Array1<c64>>,
}

impl ExcitationAmplitude {
    pub fn tda(x: Array1<c64>) -> Self {
        Self { x, y: None }
    }

    pub fn tddft(x: Array1<c64>, y: Array1<c64>) -> Self {
        Self { x, y: Some(y) }
    }

    /// X†X - Y†Y
    pub fn norm(&self) -> f64 {
        let squared = |v: &Array1<c64>| v.iter().map(|c| c.norm_sqr()).sum::<f64>();
        squared(&self.x) - self.y.as_ref().map(squared).unwrap_or(0.0)
    }

    fn scale(&mut self, factor: f64) {
        self.x.mapv_inplace(|c| c * factor);
        if let Some(y) = self.y.as_mut() {
            y.mapv_inplace(|c| c * factor);
        }
    }
}

/// A physical excited state: positive excitation energy (Hartree) and normalized amplitudes.
#[derive(Debug, Clone)]
pub struct Root {
    pub energy: f64,
    pub amplitude: ExcitationAmplitude,
}

/// Raw eigenpair of the response problem before filtering.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub energy: c64,
    pub amplitude: ExcitationAmplitude,
}

/// Selects, orders and normalizes the physical roots among raw eigenpairs.
#[derive(Debug, Clone, Copy)]
pub struct RootFilter {
    nstates: usize,
    positive_eig_threshold: f64,
    real_eig_threshold: f64,
}

impl Default for RootFilter {
    fn default() -> Self {
        Self::new(crate::defaults::NSTATES, POSITIVE_EIG_THRESHOLD)
    }
}

impl RootFilter {
    /// `positive_eig_threshold` may be negative; roots are kept if their real part is strictly
    /// larger.
    pub fn new(nstates: usize, positive_eig_threshold: f64) -> Self {
        Self {
            nstates,
            positive_eig_threshold,
            real_eig_threshold: REAL_EIG_THRESHOLD,
        }
    }

    /// Largest imaginary part of a root that is still considered real.
    pub fn with_real_eig_threshold(mut self, real_eig_threshold: f64) -> Self {
        self.real_eig_threshold = real_eig_threshold;
        self
    }

    pub fn nstates(&self) -> usize {
        self.nstates
    }

    pub fn positive_eig_threshold(&self) -> f64 {
        self.positive_eig_threshold
    }

    pub fn real_eig_threshold(&self) -> f64 {
        self.real_eig_threshold
    }

    /// Re w > positive_eig_threshold and |Im w| < real_eig_threshold
    pub fn accepts(&self, energy: c64) -> bool {
        energy.re > self.positive_eig_threshold && energy.im.abs() < self.real_eig_threshold
    }

    /// Sorts the candidates by the real part of their energy, discards the unphysical ones,
    /// normalizes the rest to X†X - Y†Y = 1 and keeps the lowest `nstates`.
    ///
    /// Candidates with a non-positive norm are dropped. If this leaves fewer than `nstates`
    /// roots, `InsufficientRoots` is returned.
    pub fn apply(&self, mut candidates: Vec<Candidate>) -> Result<Vec<Root>, ResponseError> {
        candidates.sort_by(|a, b| {
            a.energy
                .re
                .partial_cmp(&b.energy.re)
                .unwrap_or(Ordering::Equal)
        });
        let n_candidates: usize = candidates.len();

        let mut roots: Vec<Root> = Vec::with_capacity(self.nstates);
        let mut n_discarded: usize = 0;
        let mut n_degenerate: usize = 0;
        for candidate in candidates.into_iter() {
            if roots.len() == self.nstates {
                break;
            }
            if !self.accepts(candidate.energy) {
                n_discarded += 1;
                continue;
            }
            let norm: f64 = candidate.amplitude.norm();
            if norm <= 0.0 {
                let err = ResponseError::DegenerateNorm {
                    energy: candidate.energy.re,
                    norm,
                };
                warn!("dropping root: {}", err);
                n_degenerate += 1;
                continue;
            }
            let mut amplitude: ExcitationAmplitude = candidate.amplitude;
            amplitude.scale(1.0 / norm.sqrt());
            roots.push(Root {
                energy: candidate.energy.re,
                amplitude,
            });
        }
        if n_discarded > 0 {
            info!(
                "{} of {} eigenvalues discarded (Re w <= {:.2e} or |Im w| >= {:.2e})",
                n_discarded, n_candidates, self.positive_eig_threshold, self.real_eig_threshold
            );
        }
        if roots.len() < self.nstates {
            if n_degenerate > 0 {
                return Err(ResponseError::InsufficientRoots {
                    requested: self.nstates,
                    found: roots.len(),
                });
            }
            info!(
                "only {} of {} requested roots were found",
                roots.len(),
                self.nstates
            );
        }
        Ok(roots)
    }
}
