use crate::error::ResponseError;
use ndarray::prelude::*;
use ndarray_linalg::c64;

/// Coulomb and exchange builds for (generally non-Hermitian) AO density matrices.
///
/// The integrals themselves are provided by an external integral engine; the response
/// kernel only needs their contraction with transition densities.
pub trait TwoElectronIntegrals: Send + Sync {
    /// Number of spatial atomic orbitals.
    fn n_ao(&self) -> usize;

    /// J[D]_pq = sum_rs (pq|rs) D_sr
    fn coulomb(&self, dm: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError>;

    /// K[D]_pq = sum_rs (pr|sq) D_rs
    fn exchange(&self, dm: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError>;
}

/// In-core four-index electron repulsion integrals (pq|rs) in chemists' notation.
#[derive(Debug, Clone)]
pub struct DenseEri {
    n_ao: usize,
    /// (pq|rs) as a [n_ao^2, n_ao^2] supermatrix.
    coulomb_matrix: Array2<c64>,
    /// (pr|sq) as a [n_ao^2, n_ao^2] supermatrix with row index pq and column index rs.
    exchange_matrix: Array2<c64>,
}

impl DenseEri {
    pub fn new(eri: Array4<f64>) -> Result<Self, ResponseError> {
        let n_ao: usize = eri.dim().0;
        if eri.dim() != (n_ao, n_ao, n_ao, n_ao) {
            return Err(ResponseError::shape((n_ao, n_ao, n_ao, n_ao), eri.dim()));
        }
        let n2: usize = n_ao * n_ao;
        let coulomb_matrix: Array2<c64> =
            Array2::from_shape_vec((n2, n2), eri.iter().map(|&v| c64::from(v)).collect())?;
        // (pq|rs) -> (pr|sq): the new axes [p, q, r, s] are the old axes [0, 3, 1, 2].
        let exchange_matrix: Array2<c64> = Array2::from_shape_vec(
            (n2, n2),
            eri.view()
                .permuted_axes([0, 3, 1, 2])
                .iter()
                .map(|&v| c64::from(v))
                .collect(),
        )?;
        Ok(Self {
            n_ao,
            coulomb_matrix,
            exchange_matrix,
        })
    }

    fn check_density(&self, dm: ArrayView2<c64>) -> Result<(), ResponseError> {
        if dm.dim() != (self.n_ao, self.n_ao) {
            return Err(ResponseError::shape((self.n_ao, self.n_ao), dm.dim()));
        }
        Ok(())
    }

    fn contract(
        &self,
        supermatrix: &Array2<c64>,
        dm: ArrayView1<c64>,
    ) -> Result<Array2<c64>, ResponseError> {
        let flat: Array1<c64> = supermatrix.dot(&dm);
        let n_flat: usize = flat.len();
        flat.into_shape((self.n_ao, self.n_ao))
            .map_err(|_| ResponseError::shape(self.n_ao * self.n_ao, n_flat))
    }
}

impl TwoElectronIntegrals for DenseEri {
    fn n_ao(&self) -> usize {
        self.n_ao
    }

    fn coulomb(&self, dm: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError> {
        self.check_density(dm)?;
        // The row-major flattening of D^T runs over (r, s) with the value D_sr.
        let dm_t: Array1<c64> = dm.t().iter().cloned().collect();
        self.contract(&self.coulomb_matrix, dm_t.view())
    }

    fn exchange(&self, dm: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError> {
        self.check_density(dm)?;
        let dm_flat: Array1<c64> = dm.iter().cloned().collect();
        self.contract(&self.exchange_matrix, dm_flat.view())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::tests::random_eri;
    use approx::assert_abs_diff_eq;

    #[test]
    fn coulomb_and_exchange_against_loops() {
        let n: usize = 3;
        let eri: Array4<f64> = random_eri(n, 11);
        let engine = DenseEri::new(eri.clone()).unwrap();
        let dm: Array2<c64> = Array2::from_shape_fn((n, n), |(i, j)| {
            c64::new(0.1 * (i as f64) - 0.2 * (j as f64), 0.05 * ((i * j) as f64) + 0.01)
        });
        let vj: Array2<c64> = engine.coulomb(dm.view()).unwrap();
        let vk: Array2<c64> = engine.exchange(dm.view()).unwrap();
        for p in 0..n {
            for q in 0..n {
                let mut j_ref = c64::new(0.0, 0.0);
                let mut k_ref = c64::new(0.0, 0.0);
                for r in 0..n {
                    for s in 0..n {
                        j_ref += dm[[s, r]] * eri[[p, q, r, s]];
                        k_ref += dm[[r, s]] * eri[[p, r, s, q]];
                    }
                }
                assert_abs_diff_eq!((vj[[p, q]] - j_ref).norm(), 0.0, epsilon = 1e-12);
                assert_abs_diff_eq!((vk[[p, q]] - k_ref).norm(), 0.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn density_of_another_basis_is_rejected() {
        let engine = DenseEri::new(random_eri(3, 12)).unwrap();
        let dm: Array2<c64> = Array2::ones((2, 2));
        assert!(matches!(
            engine.coulomb(dm.view()),
            Err(ResponseError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            engine.exchange(dm.view()),
            Err(ResponseError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn non_square_tensor_is_rejected() {
        let eri: Array4<f64> = Array4::zeros((2, 2, 2, 3));
        assert!(DenseEri::new(eri).is_err());
    }
}
