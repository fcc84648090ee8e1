use crate::defaults::SPIN_SCALING_STEP;
use crate::error::ResponseError;
use crate::excited_states::kernel::collinear::checked_kernel;
use crate::excited_states::kernel::functional::{FunctionalClass, XcFunctional};
use crate::excited_states::kernel::grid::XcGrid;
use itertools::iproduct;
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_linalg::c64;

/// Point counts of the available spherical designs.
pub const SPHERICAL_DESIGN_SIZES: [usize; 3] = [6, 14, 26];

/// Octahedral (Lebedev) quadrature on the unit sphere with at least `spin_samples` points:
/// directions [n, 3] and weights [n] summing to one. The 6-point design integrates polynomials
/// up to degree 3 exactly, the 14- and 26-point designs up to degree 5 and 7. Returns `None`
/// if more points are requested than the largest design has.
pub fn spherical_design(spin_samples: usize) -> Option<(Array2<f64>, Array1<f64>)> {
    let size: usize = SPHERICAL_DESIGN_SIZES
        .iter()
        .copied()
        .find(|&n| n >= spin_samples)?;
    let (w_axis, w_edge, w_vertex): (f64, f64, f64) = match size {
        6 => (1.0 / 6.0, 0.0, 0.0),
        14 => (1.0 / 15.0, 0.0, 3.0 / 40.0),
        _ => (1.0 / 21.0, 4.0 / 105.0, 9.0 / 280.0),
    };
    let signs: [f64; 2] = [1.0, -1.0];
    let mut points: Vec<([f64; 3], f64)> = Vec::with_capacity(size);
    for (axis, sign) in iproduct!(0..3, signs) {
        let mut p: [f64; 3] = [0.0; 3];
        p[axis] = sign;
        points.push((p, w_axis));
    }
    if w_edge > 0.0 {
        let a: f64 = 0.5_f64.sqrt();
        for ((i, j), si, sj) in iproduct!([(0, 1), (0, 2), (1, 2)], signs, signs) {
            let mut p: [f64; 3] = [0.0; 3];
            p[i] = si * a;
            p[j] = sj * a;
            points.push((p, w_edge));
        }
    }
    if w_vertex > 0.0 {
        let a: f64 = (1.0 / 3.0_f64).sqrt();
        for (x, y, z) in iproduct!(signs, signs, signs) {
            points.push(([x * a, y * a, z * a], w_vertex));
        }
    }
    let directions: Array2<f64> =
        Array2::from_shape_fn((points.len(), 3), |(k, c)| points[k].0[c]);
    let weights: Array1<f64> = points.iter().map(|p| p.1).collect();
    Some((directions, weights))
}

/// Splits a spinor AO matrix [2 n_ao, 2 n_ao] into its (aa, ab, ba, bb) blocks.
pub(crate) fn spin_blocks(
    dm: ArrayView2<c64>,
    n_ao: usize,
) -> [ArrayView2<c64>; 4] {
    [
        dm.slice_move(s![..n_ao, ..n_ao]),
        dm.slice_move(s![..n_ao, n_ao..]),
        dm.slice_move(s![n_ao.., ..n_ao]),
        dm.slice_move(s![n_ao.., n_ao..]),
    ]
}

/// Assembles a spinor AO matrix from its (aa, ab, ba, bb) blocks.
pub(crate) fn from_spin_blocks(blocks: [Array2<c64>; 4]) -> Array2<c64> {
    let n_ao: usize = blocks[0].nrows();
    let mut matrix: Array2<c64> = Array2::zeros((2 * n_ao, 2 * n_ao));
    let [aa, ab, ba, bb] = blocks;
    matrix.slice_mut(s![..n_ao, ..n_ao]).assign(&aa);
    matrix.slice_mut(s![..n_ao, n_ao..]).assign(&ab);
    matrix.slice_mut(s![n_ao.., ..n_ao]).assign(&ba);
    matrix.slice_mut(s![n_ao.., n_ao..]).assign(&bb);
    matrix
}

/// Second derivatives [n_var, n_var, n_points] in the (rho, s) basis, with the spin densities
/// rho_a = (rho + s) / 2 and rho_b = (rho - s) / 2.
struct SpinProjection {
    rr: Array3<f64>,
    rs: Array3<f64>,
    sr: Array3<f64>,
    ss: Array3<f64>,
}

impl SpinProjection {
    /// Collinear kernel at (rho, scale * s), transformed from the (alpha, beta) basis.
    fn evaluate(
        functional: &dyn XcFunctional,
        rho: ArrayView2<f64>,
        s: ArrayView2<f64>,
        scale: f64,
    ) -> Result<Self, ResponseError> {
        let (n_var, n_points) = rho.dim();
        let mut rho_spin: Array3<f64> = Array3::zeros((2, n_var, n_points));
        Zip::from(rho_spin.slice_mut(s![0, .., ..]))
            .and(&rho)
            .and(&s)
            .for_each(|r, &rho, &s| *r = 0.5 * (rho + scale * s));
        Zip::from(rho_spin.slice_mut(s![1, .., ..]))
            .and(&rho)
            .and(&s)
            .for_each(|r, &rho, &s| *r = 0.5 * (rho - scale * s));
        let kernel: Array5<f64> = checked_kernel(functional, rho_spin.view())?;
        let aa = kernel.slice(s![0, .., 0, .., ..]);
        let ab = kernel.slice(s![0, .., 1, .., ..]);
        let ba = kernel.slice(s![1, .., 0, .., ..]);
        let bb = kernel.slice(s![1, .., 1, .., ..]);
        Ok(Self {
            rr: (&aa + &ab + &ba + &bb) * 0.25,
            rs: (&aa - &ab + &ba - &bb) * 0.25,
            sr: (&aa + &ab - &ba - &bb) * 0.25,
            ss: (&aa - &ab - &ba + &bb) * 0.25,
        })
    }
}

/// Kernel of one sampled spin direction `n`: the (rho, s) Hessian of the multi-collinear
/// energy density g(rho, s) = e(rho, s) + sum_i s_i de/ds_i at s = m . n.
struct ProjectedKernel {
    n: [f64; 3],
    weight: f64,
    rr: Array3<f64>,
    rs: Array3<f64>,
    sr: Array3<f64>,
    ss: Array3<f64>,
}

impl ProjectedKernel {
    fn new(
        functional: &dyn XcFunctional,
        rho: ArrayView2<f64>,
        s: ArrayView2<f64>,
        n: [f64; 3],
        weight: f64,
    ) -> Result<Self, ResponseError> {
        let e: SpinProjection = SpinProjection::evaluate(functional, rho, s, 1.0)?;
        let up: SpinProjection =
            SpinProjection::evaluate(functional, rho, s, 1.0 + SPIN_SCALING_STEP)?;
        let down: SpinProjection =
            SpinProjection::evaluate(functional, rho, s, 1.0 - SPIN_SCALING_STEP)?;
        // sum_i s_i d/ds_i of a kernel block, by central differences along the scaling of s
        let along_s = |up: &Array3<f64>, down: &Array3<f64>| (up - down) / (2.0 * SPIN_SCALING_STEP);
        // g_ab = (1 + [a in s] + [b in s]) e_ab + sum_i s_i e_ab,s_i
        Ok(Self {
            n,
            weight,
            rr: &e.rr + &along_s(&up.rr, &down.rr),
            rs: &e.rs * 2.0 + along_s(&up.rs, &down.rs),
            sr: &e.sr * 2.0 + along_s(&up.sr, &down.sr),
            ss: &e.ss * 3.0 + along_s(&up.ss, &down.ss),
        })
    }
}

/// v[i, g] += sum_j k[i, j, g] rho[j, g]
fn accumulate(mut v: ArrayViewMut2<c64>, k: &Array3<f64>, rho: ArrayView2<c64>, factor: f64) {
    let n_var: usize = k.dim().0;
    for (i, j) in iproduct!(0..n_var, 0..n_var) {
        Zip::from(v.row_mut(i))
            .and(k.slice(s![i, j, ..]))
            .and(rho.row(j))
            .for_each(|v, &k, &r| *v += r * (factor * k));
    }
}

/// Multi-collinear exchange-correlation response of two-component spinors. The collinear
/// kernel is evaluated on a spherical design of spin directions at the spin density projected
/// onto each direction, and the kernel of the multi-collinear functional is the weighted sum
/// of the projected responses. A vanishing magnetization gives the isotropic kernel f_ss.
pub(crate) struct MultiCollinearXc<'a> {
    grid: &'a XcGrid,
    class: FunctionalClass,
    n_ao: usize,
    samples: Vec<ProjectedKernel>,
}

impl<'a> MultiCollinearXc<'a> {
    /// `dm` is the spinor reference density of the shape [2 n_ao, 2 n_ao].
    pub fn new(
        functional: &dyn XcFunctional,
        grid: &'a XcGrid,
        dm: ArrayView2<c64>,
        spin_samples: usize,
    ) -> Result<Self, ResponseError> {
        let class: FunctionalClass = functional.class();
        let n_ao: usize = grid.n_ao();
        let n_var: usize = class.n_variables();
        let n_points: usize = grid.n_points();
        let (directions, weights) =
            spherical_design(spin_samples).ok_or_else(|| ResponseError::KernelUnavailable {
                kind: format!("{:?} x NonCollinear({})", class, spin_samples),
                reason: format!(
                    "at most {} spin samples are supported",
                    SPHERICAL_DESIGN_SIZES[SPHERICAL_DESIGN_SIZES.len() - 1]
                ),
            })?;
        // [rho, m_x, m_y, m_z] of the reference
        let magnetization: Array3<f64> = Self::magnetization(grid, class, dm, n_ao).mapv(|c| c.re);
        let rho: ArrayView2<f64> = magnetization.index_axis(Axis(0), 0);

        let mut samples: Vec<ProjectedKernel> = Vec::with_capacity(weights.len());
        for (direction, &weight) in directions.outer_iter().zip(weights.iter()) {
            let mut s: Array2<f64> = Array2::zeros((n_var, n_points));
            for c in 0..3 {
                s.scaled_add(direction[c], &magnetization.index_axis(Axis(0), c + 1));
            }
            let n: [f64; 3] = [direction[0], direction[1], direction[2]];
            samples.push(ProjectedKernel::new(functional, rho, s.view(), n, weight)?);
        }
        Ok(Self {
            grid,
            class,
            n_ao,
            samples,
        })
    }

    /// Density and magnetization [4, n_var, n_points] of a spinor density matrix:
    /// rho = aa + bb, m_x = ab + ba, m_y = i (ab - ba), m_z = aa - bb.
    fn magnetization(
        grid: &XcGrid,
        class: FunctionalClass,
        dm: ArrayView2<c64>,
        n_ao: usize,
    ) -> Array3<c64> {
        let [aa, ab, ba, bb] = spin_blocks(dm, n_ao);
        let rho_aa: Array2<c64> = grid.density(aa, class);
        let rho_ab: Array2<c64> = grid.density(ab, class);
        let rho_ba: Array2<c64> = grid.density(ba, class);
        let rho_bb: Array2<c64> = grid.density(bb, class);
        let i: c64 = c64::new(0.0, 1.0);
        let mut m: Array3<c64> = Array3::zeros((4, class.n_variables(), grid.n_points()));
        m.index_axis_mut(Axis(0), 0).assign(&(&rho_aa + &rho_bb));
        m.index_axis_mut(Axis(0), 1).assign(&(&rho_ab + &rho_ba));
        m.index_axis_mut(Axis(0), 2)
            .assign(&((&rho_ab - &rho_ba).mapv(|c| c * i)));
        m.index_axis_mut(Axis(0), 3).assign(&(&rho_aa - &rho_bb));
        m
    }

    /// Spinor AO response potential [2 n_ao, 2 n_ao] of a spinor transition density.
    pub fn potential(&self, dm: ArrayView2<c64>) -> Array2<c64> {
        let n_var: usize = self.class.n_variables();
        let n_points: usize = self.grid.n_points();
        let rho1: Array3<c64> = Self::magnetization(self.grid, self.class, dm, self.n_ao);
        let d_rho: ArrayView2<c64> = rho1.index_axis(Axis(0), 0);

        // response in [rho, m_x, m_y, m_z]
        let mut v: Array3<c64> = Array3::zeros((4, n_var, n_points));
        for sample in self.samples.iter() {
            let mut ds: Array2<c64> = Array2::zeros((n_var, n_points));
            for c in 0..3 {
                ds.scaled_add(c64::from(sample.n[c]), &rho1.index_axis(Axis(0), c + 1));
            }
            accumulate(v.index_axis_mut(Axis(0), 0), &sample.rr, d_rho, sample.weight);
            accumulate(v.index_axis_mut(Axis(0), 0), &sample.rs, ds.view(), sample.weight);
            let mut vs: Array2<c64> = Array2::zeros((n_var, n_points));
            accumulate(vs.view_mut(), &sample.sr, d_rho, sample.weight);
            accumulate(vs.view_mut(), &sample.ss, ds.view(), sample.weight);
            for c in 0..3 {
                v.index_axis_mut(Axis(0), c + 1)
                    .scaled_add(c64::from(sample.n[c]), &vs);
            }
        }

        let i: c64 = c64::new(0.0, 1.0);
        let v_rho: Array2<c64> = self.grid.potential(v.index_axis(Axis(0), 0), self.class);
        let v_x: Array2<c64> = self.grid.potential(v.index_axis(Axis(0), 1), self.class);
        let v_y: Array2<c64> = self.grid.potential(v.index_axis(Axis(0), 2), self.class);
        let v_z: Array2<c64> = self.grid.potential(v.index_axis(Axis(0), 3), self.class);
        from_spin_blocks([
            &v_rho + &v_z,
            &v_x - &v_y.mapv(|c| c * i),
            &v_x + &v_y.mapv(|c| c * i),
            &v_rho - &v_z,
        ])
    }
}
