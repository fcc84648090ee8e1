/*!

## Auxiliar functions of the iterative solvers

 */

use crate::defaults::ORTHOGONALITY_THRESHOLD;
use log::info;
use ndarray::prelude::*;
use ndarray_linalg::c64;
use ndarray_linalg::generate::random;
use ndarray_linalg::Norm;
use std::cmp::Ordering;
use std::time::Instant;

/// Generate the initial subspace vectors. These correspond to the `dim` lowest
/// diagonal elements of the matrix that will be diagonalized.
pub fn initial_subspace(diag: ArrayView1<f64>, dim: usize) -> Array2<c64> {
    let order: Vec<usize> = argsort(diag.view());
    let mut mtx: Array2<c64> = Array2::zeros([diag.len(), dim]);
    for (idx, i) in order.into_iter().enumerate() {
        if idx < dim {
            mtx[[i, idx]] = c64::new(1.0, 0.0);
        }
    }
    mtx
}

/// Generate a random highly diagonal hermitian matrix
pub fn generate_diagonal_dominant(dim: usize, sparsity: f64) -> Array2<c64> {
    let diag: Array1<f64> = 10.0 * random([dim]);
    let off_diag: Array2<c64> = random((dim, dim));
    let arr: Array2<c64> = &off_diag + &off_diag.t().mapv(|c| c.conj());
    let mut arr: Array2<c64> = arr.mapv(|c| c * sparsity);
    arr.diag_mut().assign(&diag.mapv(c64::from));
    arr
}

/// Orthogonalizes `vec` against the orthonormal columns of `basis` (two Gram-Schmidt passes)
/// and returns the normalized vector, or None if nothing linearly independent is left.
pub fn orthonormalize(basis: ArrayView2<c64>, vec: ArrayView1<c64>) -> Option<Array1<c64>> {
    let mut orth_v: Array1<c64> = vec.to_owned();
    for _ in 0..2 {
        let overlap: Array1<c64> = basis.t().mapv(|c| c.conj()).dot(&orth_v);
        orth_v = &orth_v - &basis.dot(&overlap);
    }
    let norm: f64 = orth_v.norm_l2();
    if norm > ORTHOGONALITY_THRESHOLD {
        Some(orth_v.mapv(|c| c / norm))
    } else {
        None
    }
}

pub(crate) fn argsort(v: ArrayView1<f64>) -> Vec<usize> {
    let mut idx = (0..v.len()).collect::<Vec<_>>();
    idx.sort_unstable_by(|&i, &j| v[i].partial_cmp(&v[j]).unwrap_or(Ordering::Equal));
    idx
}

pub fn print_davidson_init(max_iter: usize, nroots: usize, tolerance: f64) {
    info!("{:^80}", "");
    info!("{: ^80}", "Iterative Davidson Routine");
    info!("{:-^80}", "");
    info!(
        "{: <25} {:4.2e}",
        "Energy is converged when residual is below:", tolerance
    );
    info!("{: <25} {}", "Maximum number of iterations:", max_iter);
    if nroots == 1 {
        info!("{: >4} {: <25}", nroots, " Root will be computed.");
    } else {
        info!("{: >4} {: <25}", nroots, " Roots will be computed.");
    }
    info!("{:-^75} ", "");
    info!(
        "{: <5}{: >14}{: >14}{: >14}{: >14}{: >14}",
        "Iter.", "Roots conv.", "Roots left", "#subsp. Vec.", "Total dev.", "Max dev."
    );
    info!("{:-^75} ", "");
}

pub fn print_davidson_iteration(
    iter: usize,
    roots_cvd: usize,
    roots_lft: usize,
    nvec: usize,
    t_dev: f64,
    max_dev: f64,
) {
    info!(
        "{: >5}{:>14}{:>14}{:>14}{:>14.8}{:>14.8}",
        iter + 1,
        roots_cvd,
        roots_lft,
        nvec,
        t_dev,
        max_dev
    );
}

pub fn print_davidson_end(result_is_ok: bool, time: Instant) {
    info!("{:-^75} ", "");
    if result_is_ok {
        info!("Davidson routine converged")
    } else {
        info!("Davidson routine did not converge!")
    }
    info!(
        "{:>68} {:>8.2} s",
        "elapsed time:",
        time.elapsed().as_secs_f32()
    );
    info!("{:-^80}", "");
    info!("{:^80}", "");
}
