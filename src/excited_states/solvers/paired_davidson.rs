/*!

# Davidson Diagonalization of the paired response problem

The paired matrix H = [[A, B], [-B*, -A*]] is not hermitian, but for every
eigenpair (w, [X, Y]) there is a partner (-w*, [Y*, X*]). The expansion
space is kept closed under this pairing: every correction vector [x, y]
enters the subspace together with its partner [y*, x*]. The subspace
problem is solved with a general (non-hermitian) eigensolver, and only
Ritz values with a positive real part above the threshold and a negligible
imaginary part are followed.

*/

use crate::error::ResponseError;
use crate::excited_states::roots::RootFilter;
use crate::excited_states::solvers::utils;
use crate::excited_states::solvers::PairedEngine;
use ndarray::prelude::*;
use ndarray_linalg::*;
use std::cmp::Ordering;
use std::time::Instant;

/// Converged positive eigenvalues and the eigenvectors [X, Y] (as columns of length 2 n).
pub struct PairedDavidson {
    pub eigenvalues: Array1<c64>,
    pub eigenvectors: Array2<c64>,
}

/// The pairing partner [y*, x*] of a vector [x, y].
fn partner(v: ArrayView1<c64>) -> Array1<c64> {
    let n: usize = v.len() / 2;
    let mut p: Array1<c64> = Array1::zeros(v.len());
    p.slice_mut(s![..n]).assign(&v.slice(s![n..]).mapv(|c| c.conj()));
    p.slice_mut(s![n..]).assign(&v.slice(s![..n]).mapv(|c| c.conj()));
    p
}

/// Adds a vector and its partner to the basis. Returns the number of added columns.
fn push_with_partner(basis: &mut Array2<c64>, v: ArrayView1<c64>) -> Result<usize, ResponseError> {
    let mut n_added: usize = 0;
    for vec in [v.to_owned(), partner(v)] {
        if let Some(orth) = utils::orthonormalize(basis.view(), vec.view()) {
            basis.push_column(orth.view())?;
            n_added += 1;
        }
    }
    Ok(n_added)
}

impl PairedDavidson {
    /// Compute the lowest physical eigenvalues of the paired response problem.
    /// * `engine` an object that implements the `PairedEngine` trait.
    /// * `guess` the initial guess for the X components, Y starts at zero.
    /// * `filter` decides which Ritz values are physical.
    /// * `n_roots` the number of (lowest) eigenvalues/eigenvectors to compute.
    /// * `tolerance` numerical tolerance for convergence.
    /// * `max_iter` the maximal number of iterations.
    /// * `subspace_multiplier` Determines the maximum size of the number of expansion vectors
    pub fn new<D: PairedEngine>(
        engine: &D,
        guess: Array2<c64>,
        filter: &RootFilter,
        n_roots: usize,
        tolerance: f64,
        max_iter: usize,
        subspace_multiplier: usize,
    ) -> Result<Self, ResponseError> {
        let timer: Instant = Instant::now();
        let n: usize = engine.get_size();
        if guess.nrows() != n || guess.ncols() < n_roots || n_roots == 0 {
            return Err(ResponseError::shape((n, n_roots), guess.dim()));
        }
        let n_guess: usize = guess.ncols();

        // The subspace basis in the paired space of the dimension 2 n.
        let mut basis: Array2<c64> = Array2::zeros((2 * n, 0));
        for x in guess.axis_iter(Axis(1)) {
            let mut v: Array1<c64> = Array1::zeros(2 * n);
            v.slice_mut(s![..n]).assign(&x);
            push_with_partner(&mut basis, v.view())?;
        }
        let dim_sub_origin: usize = basis.ncols();
        let max_space: usize = (subspace_multiplier * n_roots).max(dim_sub_origin + 2 * n_roots);

        // Products of H with the basis vectors.
        let mut hv: Array2<c64> = Array2::zeros((2 * n, 0));

        utils::print_davidson_init(max_iter, n_roots, tolerance);

        let mut result = Err(ResponseError::EigensolveDidNotConverge {
            solver: "paired Davidson",
            iterations: max_iter,
        });

        for i in 0..max_iter {
            // 1. Products of the new basis vectors.
            let n_old: usize = hv.ncols();
            if basis.ncols() > n_old {
                let (hx, hy) = engine.compute_pair_products(
                    basis.slice(s![..n, n_old..]),
                    basis.slice(s![n.., n_old..]),
                )?;
                let new_hv: Array2<c64> = ndarray::concatenate(Axis(0), &[hx.view(), hy.view()])?;
                hv = ndarray::concatenate(Axis(1), &[hv.view(), new_hv.view()])?;
            }
            let dim_sub: usize = basis.ncols();

            // 2. Subspace eigenvalue problem.
            let h_proj: Array2<c64> = basis.t().mapv(|c| c.conj()).dot(&hv);
            let (w, c): (Array1<c64>, Array2<c64>) = h_proj.eig()?;

            // Physical roots first (sorted by their real part), followed by the remaining
            // positive ones, which are only used to drive the expansion.
            let mut physical: Vec<usize> = (0..w.len()).filter(|&k| filter.accepts(w[k])).collect();
            let mut positive: Vec<usize> = (0..w.len())
                .filter(|&k| !filter.accepts(w[k]) && w[k].re > filter.positive_eig_threshold())
                .collect();
            let by_real_part = |a: &usize, b: &usize| {
                w[*a].re.partial_cmp(&w[*b].re).unwrap_or(Ordering::Equal)
            };
            physical.sort_by(by_real_part);
            positive.sort_by(by_real_part);
            let n_physical: usize = physical.len().min(n_roots);
            let mut selected: Vec<usize> = physical.iter().take(n_roots).cloned().collect();
            selected.extend(positive.iter().take(n_roots - n_physical));
            if selected.is_empty() {
                break;
            }

            // 3. Ritz vectors and residues.
            let c_sel: Array2<c64> = c.select(Axis(1), &selected);
            let w_sel: Array1<c64> = w.select(Axis(0), &selected);
            let ritz: Array2<c64> = basis.dot(&c_sel);
            let rk: Array2<c64> = hv.dot(&c_sel) - &ritz * &w_sel;
            let errors: Array1<f64> = rk.axis_iter(Axis(1)).map(|col| col.norm_l2()).collect();
            let error: f64 = errors.sum();
            let max_error: f64 = errors.iter().cloned().fold(0.0, f64::max);

            let roots_cvd: usize = errors
                .iter()
                .take(n_physical)
                .filter(|&&x| x < tolerance)
                .count();
            let roots_lft: usize = n_roots - roots_cvd;
            utils::print_davidson_iteration(i, roots_cvd, roots_lft, dim_sub, error, max_error);

            if roots_lft == 0 {
                result = Ok(Self {
                    eigenvalues: w_sel,
                    eigenvectors: ritz,
                });
                break;
            }

            // 4. Expansion with the preconditioned residues and their partners.
            if dim_sub + 2 * roots_lft <= max_space {
                let mut n_added: usize = 0;
                for (k, _) in errors.iter().enumerate().filter(|(_, &x)| x >= tolerance) {
                    let omega: f64 = w_sel[k].re;
                    let r: ArrayView1<c64> = rk.column(k);
                    let mut t: Array1<c64> = Array1::zeros(2 * n);
                    t.slice_mut(s![..n])
                        .assign(&engine.precondition(r.slice(s![..n]), omega));
                    t.slice_mut(s![n..])
                        .assign(&engine.precondition(r.slice(s![n..]), -omega));
                    n_added += push_with_partner(&mut basis, t.view())?;
                }
                if n_added == 0 {
                    break;
                }
            }
            // 5. Collapse onto the leading Ritz vectors and their partners.
            else {
                let n_keep: usize = n_guess.min(physical.len() + positive.len());
                let keep: Vec<usize> = physical.iter().chain(positive.iter()).take(n_keep).cloned().collect();
                let ritz_keep: Array2<c64> = basis.dot(&c.select(Axis(1), &keep));
                basis = Array2::zeros((2 * n, 0));
                for v in ritz_keep.axis_iter(Axis(1)) {
                    push_with_partner(&mut basis, v)?;
                }
                hv = Array2::zeros((2 * n, 0));
            }
        }
        utils::print_davidson_end(result.is_ok(), timer);
        result
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::excited_states::response_matrix::ResponseBlock;
    use crate::excited_states::solvers::utils::initial_subspace;
    use crate::utils::tests::random_amplitudes;
    use approx::assert_abs_diff_eq;

    /// Diagonally dominant A with a weak complex-symmetric B.
    fn model_block(n: usize) -> ResponseBlock {
        let noise: Array2<c64> = random_amplitudes(n, n, 31);
        let mut a: Array2<c64> = (&noise + &noise.t().mapv(|c| c.conj())).mapv(|c| c * 0.01);
        for k in 0..n {
            a[[k, k]] += c64::from(0.5 + 0.1 * k as f64);
        }
        let noise_b: Array2<c64> = random_amplitudes(n, n, 32);
        let b: Array2<c64> = (&noise_b + &noise_b.t()).mapv(|c| c * 0.01);
        ResponseBlock::from_matrices(a, Some(b), vec![(1, n)]).unwrap()
    }

    #[test]
    fn partner_swaps_and_conjugates() {
        let v: Array1<c64> = array![c64::new(1.0, 2.0), c64::new(3.0, -1.0)];
        assert_eq!(partner(v.view()), array![c64::new(3.0, 1.0), c64::new(1.0, -2.0)]);
    }

    #[test]
    fn paired_davidson_against_full_diagonalization() {
        let n: usize = 40;
        let n_roots: usize = 3;
        let block: ResponseBlock = model_block(n);
        let diag: Array1<f64> = block.a().diag().mapv(|c| c.re);
        let guess: Array2<c64> = initial_subspace(diag.view(), n_roots + 2);
        let filter = RootFilter::new(n_roots, 1.0e-3);
        let davidson = PairedDavidson::new(&block, guess, &filter, n_roots, 1e-8, 100, 20).unwrap();

        let (w, _) = block.paired_matrix().unwrap().eig().unwrap();
        let mut reference: Vec<f64> = w.iter().filter(|c| c.re > 0.0).map(|c| c.re).collect();
        reference.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for k in 0..n_roots {
            assert_abs_diff_eq!(davidson.eigenvalues[k].re, reference[k], epsilon = 1e-7);
            assert_abs_diff_eq!(davidson.eigenvalues[k].im, 0.0, epsilon = 1e-7);
        }
    }
}
