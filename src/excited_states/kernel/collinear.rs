use crate::error::ResponseError;
use crate::excited_states::kernel::functional::{FunctionalClass, XcFunctional};
use crate::excited_states::kernel::grid::XcGrid;
use itertools::iproduct;
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_linalg::c64;

/// Spin-resolved density variables [2, n_var, n_points] of a pair of (reference) density
/// matrices. Only the real part is kept, the reference densities are Hermitian.
pub(crate) fn spin_density(
    grid: &XcGrid,
    class: FunctionalClass,
    dm_a: ArrayView2<c64>,
    dm_b: ArrayView2<c64>,
) -> Array3<f64> {
    let mut rho: Array3<f64> = Array3::zeros((2, class.n_variables(), grid.n_points()));
    rho.index_axis_mut(Axis(0), 0)
        .assign(&grid.density(dm_a, class).mapv(|c| c.re));
    rho.index_axis_mut(Axis(0), 1)
        .assign(&grid.density(dm_b, class).mapv(|c| c.re));
    rho
}

/// Contraction of a kernel [2, n_var, 2, n_var, n_points] with a density response
/// [2, n_var, n_points] over the second spin/variable pair.
pub(crate) fn contract_kernel(kernel: ArrayView5<f64>, rho1: ArrayView3<c64>) -> Array3<c64> {
    let (n_spin, n_var, _, _, n_points) = kernel.dim();
    let mut v: Array3<c64> = Array3::zeros((n_spin, n_var, n_points));
    for (s, i, t, j) in iproduct!(0..n_spin, 0..n_var, 0..n_spin, 0..n_var) {
        Zip::from(v.slice_mut(s![s, i, ..]))
            .and(kernel.slice(s![s, i, t, j, ..]))
            .and(rho1.slice(s![t, j, ..]))
            .par_for_each(|v, &k, &r| *v += r * k);
    }
    v
}

/// Checks the shape of a kernel returned by the functional collaborator.
pub(crate) fn checked_kernel(
    functional: &dyn XcFunctional,
    rho: ArrayView3<f64>,
) -> Result<Array5<f64>, ResponseError> {
    let (_, n_var, n_points) = rho.dim();
    let kernel: Array5<f64> = functional.kernel(rho)?;
    if kernel.dim() != (2, n_var, 2, n_var, n_points) {
        return Err(ResponseError::shape(
            (2, n_var, 2, n_var, n_points),
            kernel.dim(),
        ));
    }
    Ok(kernel)
}

/// Collinear exchange-correlation response: the second derivatives with respect to the alpha
/// and beta densities are evaluated once at the reference density and reused for every trial
/// density afterwards.
pub(crate) struct CollinearXc<'a> {
    grid: &'a XcGrid,
    class: FunctionalClass,
    kernel: Array5<f64>,
}

impl<'a> CollinearXc<'a> {
    pub fn new(
        functional: &dyn XcFunctional,
        grid: &'a XcGrid,
        dm_a: ArrayView2<c64>,
        dm_b: ArrayView2<c64>,
    ) -> Result<Self, ResponseError> {
        let class: FunctionalClass = functional.class();
        let rho0: Array3<f64> = spin_density(grid, class, dm_a, dm_b);
        let kernel: Array5<f64> = checked_kernel(functional, rho0.view())?;
        Ok(Self {
            grid,
            class,
            kernel,
        })
    }

    /// AO response potentials (V_alpha, V_beta) of the transition densities (D_alpha, D_beta).
    pub fn potential(
        &self,
        da: ArrayView2<c64>,
        db: ArrayView2<c64>,
    ) -> (Array2<c64>, Array2<c64>) {
        let n_var: usize = self.class.n_variables();
        let mut rho1: Array3<c64> = Array3::zeros((2, n_var, self.grid.n_points()));
        rho1.index_axis_mut(Axis(0), 0)
            .assign(&self.grid.density(da, self.class));
        rho1.index_axis_mut(Axis(0), 1)
            .assign(&self.grid.density(db, self.class));

        let v: Array3<c64> = contract_kernel(self.kernel.view(), rho1.view());
        (
            self.grid.potential(v.index_axis(Axis(0), 0), self.class),
            self.grid.potential(v.index_axis(Axis(0), 1), self.class),
        )
    }
}
