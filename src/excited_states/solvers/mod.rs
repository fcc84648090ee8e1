use crate::defaults::PRECONDITIONER_CUTOFF;
use crate::error::ResponseError;
use ndarray::prelude::*;
use ndarray::Data;
use ndarray_linalg::c64;
pub use utils::*;

pub(crate) mod davidson;
pub(crate) mod paired_davidson;
pub mod utils;

pub use davidson::Davidson;
pub use paired_davidson::PairedDavidson;

/// Abstract Trait defining the API required by solver engines.
///
/// Engines implement the correct product functions for iterative solvers that
/// do not require the target matrix be stored directly.
/// Classes intended to be used as an `engine` for `Davidson` should implement this Trait
/// to ensure that the required methods are defined.
pub trait DavidsonEngine {
    /// Compute a Matrix * trial vector products
    /// Expected output:
    ///  The product`A x X_{i}` for each `X_{i}` in `X`, in that order.
    ///   Where `A` is the hermitian matrix to be diagonalized.
    fn compute_products(&self, x: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError>;

    /// Apply the preconditioner to a Residual vector.
    /// The preconditioner is usually defined as :math:`(w_k - D_{i})^-1` where
    /// `D` is an approximation of the diagonal of the matrix that is being diagonalized.
    fn precondition(&self, r_k: ArrayView1<c64>, w_k: f64) -> Array1<c64>;

    /// Return the size of the matrix problem.
    fn get_size(&self) -> usize;
}

/// Engine of the paired (non-Hermitian) response problem
/// [[A, B], [-B*, -A*]] [X, Y] = w [X, Y].
pub trait PairedEngine: DavidsonEngine {
    /// The images (A X + B Y, -(B* X + A* Y)) of the trial pairs, one pair per column.
    fn compute_pair_products(
        &self,
        x: ArrayView2<c64>,
        y: ArrayView2<c64>,
    ) -> Result<(Array2<c64>, Array2<c64>), ResponseError>;
}

/// (w - d)^-1 r with denominators close to zero replaced by 1.0.
pub(crate) fn shifted_inverse(r_k: ArrayView1<c64>, w_k: f64, diag: ArrayView1<f64>) -> Array1<c64> {
    let denom: Array1<f64> = diag.mapv(|d| {
        let x: f64 = w_k - d;
        if x.abs() < PRECONDITIONER_CUTOFF {
            1.0
        } else {
            x
        }
    });
    Array1::from_iter(r_k.iter().zip(denom.iter()).map(|(r, d)| r / d))
}

impl<S> DavidsonEngine for ArrayBase<S, Ix2>
where
    S: Data<Elem = c64>,
{
    fn compute_products(&self, x: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError> {
        Ok(self.dot(&x))
    }

    fn precondition(&self, r_k: ArrayView1<c64>, w_k: f64) -> Array1<c64> {
        let diag: Array1<f64> = self.diag().mapv(|d| d.re);
        shifted_inverse(r_k, w_k, diag.view())
    }

    fn get_size(&self) -> usize {
        self.nrows()
    }
}
