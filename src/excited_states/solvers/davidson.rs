/*!

# Davidson Diagonalization

The Davidson method is suitable for diagonal-dominant hermitian matrices,
that are quite common in certain scientific problems like [electronic
structure](https://en.wikipedia.org/wiki/Electronic_structure). The Davidson
method could be not practical for other kind of hermitian matrices.

The current implementation uses a general davidson algorithm, meaning
that it compute all the requested eigenvalues simultaneusly using a variable
size block approach. The family of Davidson algorithm only differ in the way
that the correction vector is computed.

*/

use crate::error::ResponseError;
use crate::excited_states::roots::RootFilter;
use crate::excited_states::solvers::utils;
use crate::excited_states::solvers::DavidsonEngine;
use ndarray::prelude::*;
use ndarray_linalg::*;
use ndarray_stats::QuantileExt;
use std::time::Instant;

/// Structure with the configuration data
pub struct Davidson {
    pub eigenvalues: Array1<f64>,
    pub eigenvectors: Array2<c64>,
}

impl Davidson {
    /// Compute the lowest eigenvalues of a hermitian, diagonal dominant matrix that pass the
    /// root filter. Eigenvalues below the filter threshold are converged along with them, so
    /// that `n_roots` accepted eigenpairs are returned whenever the matrix has them.
    /// * `engine` an object that implements the `DavidsonEngine` trait.
    /// * `guess` the initial guess for the eigenvectors (orthonormal columns).
    /// * `filter` decides which eigenvalues are physical.
    /// * `n_roots` the number of (lowest) accepted eigenvalues/eigenvectors to compute.
    /// * `tolerance` numerical tolerance for convergence.
    /// * `max_iter` the maximal number of iterations.
    /// * `subspace_multiplier` Determines the maximum size of the number of expansion vectors
    pub fn new<D: DavidsonEngine>(
        engine: &D,
        guess: Array2<c64>,
        filter: &RootFilter,
        n_roots: usize,
        tolerance: f64,
        max_iter: usize,
        subspace_multiplier: usize,
    ) -> Result<Self, ResponseError> {
        // Timer to measure the time within the Davidson routine.
        let timer: Instant = Instant::now();

        // Dimension of the original matrix problem.
        let dim: usize = engine.get_size();
        if guess.nrows() != dim || guess.ncols() < n_roots || n_roots == 0 {
            return Err(ResponseError::shape((dim, n_roots), guess.dim()));
        }

        // The initial guess needs to be mutable.
        let mut guess: Array2<c64> = guess;

        // Dimension of the subspace.
        let dim_sub_origin: usize = guess.ncols();

        // The maximal possible subspace, before it will be collapsed.
        let max_space: usize = (subspace_multiplier * n_roots).max(dim_sub_origin + n_roots);

        // Products of the matrix with the subspace vectors of the previous iterations.
        let mut ax: Array2<c64> = Array2::zeros((dim, 0));

        // The initial information of the Davidson routine are printed.
        utils::print_davidson_init(max_iter, n_roots, tolerance);

        // Initialization of the result.
        let mut result = Err(ResponseError::EigensolveDidNotConverge {
            solver: "Davidson",
            iterations: max_iter,
        });

        // Outer loop block Davidson schema.
        for i in 0..max_iter {
            // 1. The initial subspace is formed by projecting into the new guess vectors.
            // Matrix-vector product of A with the trial vectors, only the new vectors are
            // computed.
            let n_old: usize = ax.ncols();
            if guess.ncols() > n_old {
                let new_ax: Array2<c64> = engine.compute_products(guess.slice(s![.., n_old..]))?;
                ax = ndarray::concatenate(Axis(1), &[ax.view(), new_ax.view()])?;
            }
            let dim_sub: usize = guess.ncols();

            // 1.1 Initialization of the subspace Hamiltonian.
            let a_proj: Array2<c64> = guess.t().mapv(|c| c.conj()).dot(&ax);
            let a_proj: Array2<c64> = (&a_proj + &a_proj.t().mapv(|c| c.conj())) * c64::new(0.5, 0.0);

            // 2. Solve the eigenvalue problem for the subspace Hamiltonian.
            // The eigenvalues (u) and eigenvectors (v) are already sorted in ascending order.
            let (u_all, v_all): (Array1<f64>, Array2<c64>) = a_proj.eigh(UPLO::Upper)?;

            // The rejected eigenvalues lie below the accepted ones. They are followed together
            // with the first n_roots accepted eigenvalues.
            let n_rejected: usize = u_all
                .iter()
                .take_while(|&&x| !filter.accepts(c64::from(x)))
                .count();
            let n_target: usize = (n_roots + n_rejected).min(dim);
            let n_follow: usize = n_target.min(dim_sub);
            let u: Array1<f64> = u_all.slice(s![0..n_follow]).to_owned();
            let v: Array2<c64> = v_all.slice(s![.., 0..n_follow]).to_owned();

            // 3. Convergence checks are made.
            // 3.1 Compute the Ritz vectors.
            let ritz: Array2<c64> = guess.dot(&v);

            // 3.2 Compute the residue vectors.
            let rk: Array2<c64> = ax.dot(&v) - &ritz * &u.mapv(c64::from);

            // 3.3 Convergence check for each pair of eigenvalue and eigenvector.
            let errors: Array1<f64> = rk.axis_iter(Axis(1)).map(|col| col.norm_l2()).collect();

            // The sum of all errors.
            let error: f64 = errors.sum();
            // The maximum value of the errors.
            let max_error: f64 = *errors.max().map_err(|err| ResponseError::Linalg(err.to_string()))?;

            // 4.3 Check how many eigenvalues are converged.
            let roots_cvd: usize = errors
                .iter()
                .fold(0, |n, &x| if x < tolerance { n + 1 } else { n });
            let roots_lft: usize = n_target - roots_cvd;

            // The information of the current iteration is printed to the console.
            utils::print_davidson_iteration(i, roots_cvd, roots_lft, dim_sub, error, max_error);

            // If all eigenvalues are converged, the Davidson routine finished successfully.
            if roots_lft == 0 {
                let accepted: Vec<usize> = (0..n_follow)
                    .filter(|&k| filter.accepts(c64::from(u[k])))
                    .take(n_roots)
                    .collect();
                result = Ok(Self {
                    eigenvalues: u.select(Axis(0), &accepted),
                    eigenvectors: ritz.select(Axis(1), &accepted),
                });
                break;
            }

            // 5.  If the eigenvalues are not yet converged, the subspace basis is updated.
            // 5.1 Correction vectors are added to the current subspace basis, if the new
            //     dimension is lower than the maximal subspace size.
            if dim_sub + roots_lft <= max_space {
                let mut n_added: usize = 0;
                // For each (not converged) eigenvalue a new preconditioned subspace vector is
                // added after it was orthonormalized against the existing basis.
                for (idx, _) in errors.iter().enumerate().filter(|(_, &x)| x >= tolerance) {
                    let correction: Array1<c64> = engine.precondition(rk.column(idx), u[idx]);
                    if let Some(vec) = utils::orthonormalize(guess.view(), correction.view()) {
                        guess.push_column(vec.view())?;
                        n_added += 1;
                    }
                }
                // The subspace cannot be extended anymore.
                if n_added == 0 {
                    break;
                }
            }
            // 5.1 If the dimension is larger than the maximal subspace size, the subspace is
            //     collapsed onto the lowest Ritz vectors. Their products follow from the stored
            //     ones by linearity.
            else {
                let n_keep: usize = dim_sub_origin.max(n_target).min(v_all.ncols());
                let v_keep: ArrayView2<c64> = v_all.slice(s![.., 0..n_keep]);
                guess = guess.dot(&v_keep);
                ax = ax.dot(&v_keep);
            }
        }
        // The end of the Davidson routine is noted in the console together with information
        // about the used wall time.
        utils::print_davidson_end(result.is_ok(), timer);

        // The returned result contains either an Err if the iteration is not converged or
        // an instance of Davidson that contains the eigenvectors and eigenvalues.
        result
    }
}
