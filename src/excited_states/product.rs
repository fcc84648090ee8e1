use crate::error::ResponseError;
use crate::excited_states::kernel::ResponseKernelEvaluator;
use crate::excited_states::solvers::{shifted_inverse, DavidsonEngine, PairedEngine};
use ndarray::prelude::*;
use ndarray_linalg::c64;

/// Matrix-free action of the response operator on batches of trial amplitudes.
///
/// Every call goes through the kernel evaluator; nothing is kept between calls, so the same
/// product can be handed to any number of solver iterations.
pub struct OperatorProduct<'a> {
    evaluator: &'a ResponseKernelEvaluator<'a>,
    omega: Array1<f64>,
}

impl<'a> OperatorProduct<'a> {
    pub fn new(evaluator: &'a ResponseKernelEvaluator<'a>) -> Self {
        Self {
            evaluator,
            omega: evaluator.partition().omega(),
        }
    }

    /// Length of a flattened amplitude vector.
    pub fn dim(&self) -> usize {
        self.omega.len()
    }

    /// Orbital energy differences, the diagonal of the zeroth-order A.
    pub fn omega(&self) -> ArrayView1<f64> {
        self.omega.view()
    }

    /// (e_a - e_i) x_ia for every column.
    fn orbital_part(&self, xs: ArrayView2<c64>) -> Array2<c64> {
        let omega: ArrayView2<f64> = self.omega.view().insert_axis(Axis(1));
        Array2::from_shape_fn(xs.raw_dim(), |(k, n)| xs[[k, n]] * omega[[k, 0]])
    }

    /// A X for every column of `xs`.
    pub fn tda(&self, xs: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError> {
        let (v_ov, _) = self.evaluator.apply(xs, None)?;
        Ok(self.orbital_part(xs) + v_ov)
    }

    /// (A X + B Y, -(B* X + A* Y)) for every pair of columns of `xs` and `ys`. The second
    /// component already carries the sign of the metric, i.e. this is the action of the paired
    /// matrix [[A, B], [-B*, -A*]].
    pub fn tddft(
        &self,
        xs: ArrayView2<c64>,
        ys: ArrayView2<c64>,
    ) -> Result<(Array2<c64>, Array2<c64>), ResponseError> {
        let (v_ov, v_vo) = self.evaluator.apply(xs, Some(ys))?;
        let v_vo: Array2<c64> = v_vo.ok_or_else(|| ResponseError::shape(ys.dim(), "no Y image"))?;
        let first: Array2<c64> = self.orbital_part(xs) + v_ov;
        let second: Array2<c64> = (self.orbital_part(ys) + v_vo).mapv(|c| -c);
        Ok((first, second))
    }
}

impl DavidsonEngine for OperatorProduct<'_> {
    fn compute_products(&self, x: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError> {
        self.tda(x)
    }

    /// The orbital energy differences are used as the approximate diagonal.
    fn precondition(&self, r_k: ArrayView1<c64>, w_k: f64) -> Array1<c64> {
        shifted_inverse(r_k, w_k, self.omega.view())
    }

    fn get_size(&self) -> usize {
        self.dim()
    }
}

impl PairedEngine for OperatorProduct<'_> {
    fn compute_pair_products(
        &self,
        x: ArrayView2<c64>,
        y: ArrayView2<c64>,
    ) -> Result<(Array2<c64>, Array2<c64>), ResponseError> {
        self.tddft(x, y)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::excited_states::kernel::{Collinearity, SlaterExchange, XcGrid, XcInput};
    use crate::excited_states::response_matrix::{ResponseBlock, ResponseMatrixBuilder};
    use crate::utils::tests::*;

    fn max_deviation(a: &Array2<c64>, b: &Array2<c64>) -> f64 {
        (a - b).iter().fold(0.0, |m, c| m.max(c.norm()))
    }

    fn check_against_explicit(evaluator: &ResponseKernelEvaluator) {
        let product = OperatorProduct::new(evaluator);
        let block: ResponseBlock = ResponseMatrixBuilder::new(evaluator).build(true).unwrap();
        let a: &Array2<c64> = block.a();
        let b: &Array2<c64> = block.b().unwrap();
        let dim: usize = product.dim();
        let xs: Array2<c64> = random_amplitudes(dim, 3, 21);
        let ys: Array2<c64> = random_amplitudes(dim, 3, 22);

        let ax: Array2<c64> = product.tda(xs.view()).unwrap();
        let scale: f64 = a.iter().fold(0.0, |m, c| m.max(c.norm()));
        assert!(max_deviation(&ax, &a.dot(&xs)) < 1e-10 * scale);

        let (first, second) = product.tddft(xs.view(), ys.view()).unwrap();
        let a_conj: Array2<c64> = a.mapv(|c| c.conj());
        let b_conj: Array2<c64> = b.mapv(|c| c.conj());
        let first_ref: Array2<c64> = a.dot(&xs) + b.dot(&ys);
        let second_ref: Array2<c64> = (b_conj.dot(&xs) + a_conj.dot(&ys)).mapv(|c| -c);
        assert!(max_deviation(&first, &first_ref) < 1e-10 * scale);
        assert!(max_deviation(&second, &second_ref) < 1e-10 * scale);
    }

    #[test]
    fn matrix_free_products_of_restricted_hartree_fock() {
        let system = ModelSystem::restricted(1);
        let evaluator = ResponseKernelEvaluator::new(&system.orbitals, &system.eri, None).unwrap();
        check_against_explicit(&evaluator);
        check_against_explicit(&evaluator.singlet(false));
    }

    #[test]
    fn matrix_free_products_of_unrestricted_lda() {
        let system = ModelSystem::unrestricted(2);
        let grid: XcGrid = random_grid(system.n_ao(), 30, false, 7);
        let input = XcInput {
            functional: &SlaterExchange,
            grid: &grid,
            collinearity: Collinearity::Collinear,
        };
        let evaluator =
            ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input)).unwrap();
        check_against_explicit(&evaluator);
    }

    #[test]
    fn matrix_free_products_of_spinor_gga() {
        let system = ModelSystem::spinor(3);
        let grid: XcGrid = random_grid(system.n_ao(), 30, true, 8);
        for collinearity in [
            Collinearity::Collinear,
            Collinearity::NonCollinear { spin_samples: 6 },
        ] {
            let input = XcInput {
                functional: &MockSemiLocal,
                grid: &grid,
                collinearity,
            };
            let evaluator =
                ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input)).unwrap();
            check_against_explicit(&evaluator);
        }
    }

    #[test]
    fn wrong_vector_length_is_rejected() {
        let system = ModelSystem::restricted(4);
        let evaluator = ResponseKernelEvaluator::new(&system.orbitals, &system.eri, None).unwrap();
        let product = OperatorProduct::new(&evaluator);
        let xs: Array2<c64> = Array2::zeros((product.dim() + 1, 1));
        assert!(matches!(
            product.tda(xs.view()),
            Err(ResponseError::ShapeMismatch { .. })
        ));
    }
}
