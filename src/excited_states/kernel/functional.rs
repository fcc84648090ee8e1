use crate::constants::SLATER_CX;
use crate::defaults::DENSITY_CUTOFF;
use crate::error::ResponseError;
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};

/// Class of the exchange-correlation functional, which fixes the density variables the kernel
/// depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FunctionalClass {
    /// No exchange-correlation kernel (Hartree-Fock).
    None,
    /// Density only (LDA).
    Local,
    /// Density and its gradient (GGA).
    SemiLocal,
    /// Density, gradient and kinetic energy density (meta-GGA).
    MetaLocal,
}

impl FunctionalClass {
    /// Number of density variables per spin: [rho], [rho, d_x, d_y, d_z] or
    /// [rho, d_x, d_y, d_z, tau].
    pub fn n_variables(&self) -> usize {
        match self {
            FunctionalClass::None => 0,
            FunctionalClass::Local => 1,
            FunctionalClass::SemiLocal => 4,
            FunctionalClass::MetaLocal => 5,
        }
    }

    pub fn needs_gradients(&self) -> bool {
        self.n_variables() > 1
    }
}

/// Collaborator that evaluates second functional derivatives at the reference density.
pub trait XcFunctional: Send + Sync {
    fn class(&self) -> FunctionalClass;

    /// Fraction of exact exchange mixed into the kernel.
    fn hybrid_coefficient(&self) -> f64;

    /// Second derivatives of the energy density with respect to the spin-resolved density
    /// variables. `rho` has the shape [2, n_var, n_points] and the returned kernel the shape
    /// [2, n_var, 2, n_var, n_points]; it must be symmetric under (s, i) <-> (t, j).
    fn kernel(&self, rho: ArrayView3<f64>) -> Result<Array5<f64>, ResponseError>;
}

/// Dirac-Slater exchange, E_x = 2^(1/3) C_x sum_s int rho_s^(4/3).
#[derive(Debug, Clone, Copy, Default)]
pub struct SlaterExchange;

impl XcFunctional for SlaterExchange {
    fn class(&self) -> FunctionalClass {
        FunctionalClass::Local
    }

    fn hybrid_coefficient(&self) -> f64 {
        0.0
    }

    fn kernel(&self, rho: ArrayView3<f64>) -> Result<Array5<f64>, ResponseError> {
        let (n_spin, n_var, n_points) = rho.dim();
        if n_spin != 2 || n_var != 1 {
            return Err(ResponseError::shape((2, 1, n_points), rho.dim()));
        }
        let prefactor: f64 = 4.0 / 9.0 * 2.0_f64.powf(1.0 / 3.0) * SLATER_CX;
        let mut kernel: Array5<f64> = Array5::zeros((2, 1, 2, 1, n_points));
        for s in 0..2 {
            let f_ss: Array1<f64> = rho.slice(s![s, 0, ..]).mapv(|r| {
                if r > DENSITY_CUTOFF {
                    prefactor * r.powf(-2.0 / 3.0)
                } else {
                    0.0
                }
            });
            kernel.slice_mut(s![s, 0, s, 0, ..]).assign(&f_ss);
        }
        Ok(kernel)
    }
}
