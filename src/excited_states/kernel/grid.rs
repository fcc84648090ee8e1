use crate::error::ResponseError;
use crate::excited_states::kernel::functional::FunctionalClass;
use ndarray::prelude::*;
use ndarray_linalg::c64;

/// Quadrature grid together with the AO values (and optionally AO gradients) on the grid points,
/// as produced by the numerical integration collaborator.
#[derive(Debug, Clone)]
pub struct XcGrid {
    weights: Array1<f64>,
    /// AO values of the shape [n_comp, n_points, n_ao] with n_comp = 1 (values) or
    /// 4 (values, d/dx, d/dy, d/dz).
    ao: Array3<c64>,
}

impl XcGrid {
    pub fn new(weights: Array1<f64>, ao: Array3<f64>) -> Result<Self, ResponseError> {
        let (n_comp, n_points, n_ao) = ao.dim();
        if n_comp != 1 && n_comp != 4 {
            return Err(ResponseError::shape("[1 or 4, n_points, n_ao]", ao.dim()));
        }
        if weights.len() != n_points {
            return Err(ResponseError::shape(n_points, weights.len()));
        }
        if n_ao == 0 {
            return Err(ResponseError::shape("n_ao > 0", n_ao));
        }
        Ok(Self {
            weights,
            ao: ao.mapv(c64::from),
        })
    }

    pub fn n_points(&self) -> usize {
        self.weights.len()
    }

    pub fn n_ao(&self) -> usize {
        self.ao.dim().2
    }

    pub fn has_gradients(&self) -> bool {
        self.ao.dim().0 == 4
    }

    /// Density variables of an AO density matrix on the grid, shape [n_var, n_points].
    /// rho = sum_uv ao_u D_uv ao_v, the gradient and tau = 1/2 sum_k d_k ao_u D_uv d_k ao_v
    /// follow the variable layout of `FunctionalClass`.
    pub fn density(&self, dm: ArrayView2<c64>, class: FunctionalClass) -> Array2<c64> {
        let n_var: usize = class.n_variables();
        let mut rho: Array2<c64> = Array2::zeros((n_var, self.n_points()));
        if n_var == 0 {
            return rho;
        }
        let ao0: ArrayView2<c64> = self.ao.index_axis(Axis(0), 0);
        let c0: Array2<c64> = ao0.dot(&dm);
        rho.row_mut(0).assign(&(&c0 * &ao0).sum_axis(Axis(1)));

        if n_var >= 4 {
            for k in 1..4 {
                let aok: ArrayView2<c64> = self.ao.index_axis(Axis(0), k);
                let ck: Array2<c64> = aok.dot(&dm);
                let grad: Array1<c64> = (&ck * &ao0).sum_axis(Axis(1)) + (&c0 * &aok).sum_axis(Axis(1));
                rho.row_mut(k).assign(&grad);
                if n_var == 5 {
                    let tau: Array1<c64> = (&ck * &aok).sum_axis(Axis(1)) * c64::new(0.5, 0.0);
                    let mut row = rho.row_mut(4);
                    row += &tau;
                }
            }
        }
        rho
    }

    /// AO matrix of a potential given in the density variables, shape of `v` [n_var, n_points].
    /// This is the adjoint of [XcGrid::density] including the quadrature weights.
    pub fn potential(&self, v: ArrayView2<c64>, class: FunctionalClass) -> Array2<c64> {
        let n_var: usize = class.n_variables();
        let n_ao: usize = self.n_ao();
        let mut vmat: Array2<c64> = Array2::zeros((n_ao, n_ao));
        if n_var == 0 {
            return vmat;
        }
        // Quadrature weights are folded into the potential.
        let wv: Array2<c64> = &v * &self.weights.view().insert_axis(Axis(0));
        let ao0: ArrayView2<c64> = self.ao.index_axis(Axis(0), 0);
        let scaled0: Array2<c64> = &ao0 * &wv.row(0).insert_axis(Axis(1));
        vmat = vmat + ao0.t().dot(&scaled0);

        if n_var >= 4 {
            for k in 1..4 {
                let aok: ArrayView2<c64> = self.ao.index_axis(Axis(0), k);
                let scaled: Array2<c64> = &ao0 * &wv.row(k).insert_axis(Axis(1));
                let half: Array2<c64> = aok.t().dot(&scaled);
                vmat = vmat + &half + &half.t();
                if n_var == 5 {
                    let scaled_tau: Array2<c64> =
                        &aok * &wv.row(4).insert_axis(Axis(1)).mapv(|x| x * 0.5);
                    vmat = vmat + aok.t().dot(&scaled_tau);
                }
            }
        }
        vmat
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::tests::random_grid;
    use approx::assert_abs_diff_eq;

    fn random_dm(n: usize) -> Array2<c64> {
        Array2::from_shape_fn((n, n), |(i, j)| {
            c64::new(0.3 * (i as f64) - 0.1 * (j as f64), 0.2 * (j as f64) - 0.05)
        })
    }

    #[test]
    fn potential_is_adjoint_to_density() {
        // sum_g w v(g) rho[D](g) = sum_uv V_uv D_vu for every class
        let n_ao: usize = 4;
        let grid: XcGrid = random_grid(n_ao, 30, true, 5);
        let dm: Array2<c64> = random_dm(n_ao);
        for class in [
            FunctionalClass::Local,
            FunctionalClass::SemiLocal,
            FunctionalClass::MetaLocal,
        ] {
            let n_var: usize = class.n_variables();
            let v: Array2<c64> = Array2::from_shape_fn((n_var, grid.n_points()), |(i, g)| {
                c64::new(((i + 1) * (g + 2)) as f64 * 0.01, 0.02 * i as f64)
            });
            let rho: Array2<c64> = grid.density(dm.view(), class);
            let lhs: c64 = (&rho * &v * &grid.weights.view().insert_axis(Axis(0))).sum();
            let vmat: Array2<c64> = grid.potential(v.view(), class);
            let rhs: c64 = (&vmat * &dm.t()).sum();
            assert_abs_diff_eq!((lhs - rhs).norm(), 0.0, epsilon = 1e-10);
        }
    }

    #[test]
    fn gradients_are_required_for_four_components() {
        let weights: Array1<f64> = Array1::ones(3);
        let ao: Array3<f64> = Array3::zeros((2, 3, 2));
        assert!(XcGrid::new(weights, ao).is_err());
    }
}
