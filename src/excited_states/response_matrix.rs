use crate::error::ResponseError;
use crate::excited_states::kernel::ResponseKernelEvaluator;
use crate::excited_states::solvers::{shifted_inverse, DavidsonEngine, PairedEngine};
use log::debug;
use ndarray::prelude::*;
use ndarray_linalg::c64;

/// Number of unit vectors that are pushed through the kernel at once.
const UNIT_VECTOR_BATCH: usize = 64;

/// Explicit A and (optionally) B matrices in the flattened amplitude basis.
#[derive(Debug, Clone)]
pub struct ResponseBlock {
    a: Array2<c64>,
    b: Option<Array2<c64>>,
    /// (n_occ, n_virt) of every spin channel.
    layout: Vec<(usize, usize)>,
}

impl ResponseBlock {
    pub fn from_matrices(
        a: Array2<c64>,
        b: Option<Array2<c64>>,
        layout: Vec<(usize, usize)>,
    ) -> Result<Self, ResponseError> {
        let dim: usize = layout.iter().map(|(o, v)| o * v).sum();
        if a.dim() != (dim, dim) {
            return Err(ResponseError::shape((dim, dim), a.dim()));
        }
        if let Some(b) = b.as_ref() {
            if b.dim() != (dim, dim) {
                return Err(ResponseError::shape((dim, dim), b.dim()));
            }
        }
        Ok(Self { a, b, layout })
    }

    pub fn dim(&self) -> usize {
        self.a.nrows()
    }

    pub fn a(&self) -> &Array2<c64> {
        &self.a
    }

    pub fn b(&self) -> Option<&Array2<c64>> {
        self.b.as_ref()
    }

    pub fn layout(&self) -> &[(usize, usize)] {
        &self.layout
    }

    fn offsets(&self) -> Vec<usize> {
        self.layout
            .iter()
            .scan(0, |offset, (o, v)| {
                let start: usize = *offset;
                *offset += o * v;
                Some(start)
            })
            .collect()
    }

    fn tensor(&self, matrix: &Array2<c64>, left: usize, right: usize) -> Array4<c64> {
        let offsets: Vec<usize> = self.offsets();
        let (no_l, nv_l) = self.layout[left];
        let (no_r, nv_r) = self.layout[right];
        let block = matrix.slice(s![
            offsets[left]..offsets[left] + no_l * nv_l,
            offsets[right]..offsets[right] + no_r * nv_r
        ]);
        Array4::from_shape_fn((no_l, nv_l, no_r, nv_r), |(i, a, j, b)| {
            block[[i * nv_l + a, j * nv_r + b]]
        })
    }

    /// A[i, a, j, b] between the spin channels `left` and `right`.
    pub fn a_block(&self, left: usize, right: usize) -> Array4<c64> {
        self.tensor(&self.a, left, right)
    }

    /// B[i, a, j, b] between the spin channels `left` and `right`.
    pub fn b_block(&self, left: usize, right: usize) -> Option<Array4<c64>> {
        self.b.as_ref().map(|b| self.tensor(b, left, right))
    }

    fn require_b(&self) -> Result<&Array2<c64>, ResponseError> {
        self.b.as_ref().ok_or_else(|| {
            ResponseError::shape("a B matrix", "a response block built without B")
        })
    }

    /// The paired matrix [[A, B], [-B*, -A*]] of the dimension 2 n.
    pub fn paired_matrix(&self) -> Result<Array2<c64>, ResponseError> {
        let b: &Array2<c64> = self.require_b()?;
        let n: usize = self.dim();
        let mut h: Array2<c64> = Array2::zeros((2 * n, 2 * n));
        h.slice_mut(s![..n, ..n]).assign(&self.a);
        h.slice_mut(s![..n, n..]).assign(b);
        h.slice_mut(s![n.., ..n]).assign(&b.mapv(|c| -c.conj()));
        h.slice_mut(s![n.., n..]).assign(&self.a.mapv(|c| -c.conj()));
        Ok(h)
    }
}

impl DavidsonEngine for ResponseBlock {
    fn compute_products(&self, x: ArrayView2<c64>) -> Result<Array2<c64>, ResponseError> {
        Ok(self.a.dot(&x))
    }

    fn precondition(&self, r_k: ArrayView1<c64>, w_k: f64) -> Array1<c64> {
        let diag: Array1<f64> = self.a.diag().mapv(|d| d.re);
        shifted_inverse(r_k, w_k, diag.view())
    }

    fn get_size(&self) -> usize {
        self.dim()
    }
}

impl PairedEngine for ResponseBlock {
    fn compute_pair_products(
        &self,
        x: ArrayView2<c64>,
        y: ArrayView2<c64>,
    ) -> Result<(Array2<c64>, Array2<c64>), ResponseError> {
        let b: &Array2<c64> = self.require_b()?;
        let first: Array2<c64> = self.a.dot(&x) + b.dot(&y);
        let second: Array2<c64> =
            (b.mapv(|c| c.conj()).dot(&x) + self.a.mapv(|c| c.conj()).dot(&y)).mapv(|c| -c);
        Ok((first, second))
    }
}

/// Builds explicit response matrices column by column from the kernel images of unit
/// excitations. The number of kernel evaluations grows with the square of the dimension, so
/// this is meant for small systems and validation.
pub struct ResponseMatrixBuilder<'a> {
    evaluator: &'a ResponseKernelEvaluator<'a>,
}

impl<'a> ResponseMatrixBuilder<'a> {
    pub fn new(evaluator: &'a ResponseKernelEvaluator<'a>) -> Self {
        Self { evaluator }
    }

    /// A is always built, B only if `with_b` is set.
    pub fn build(&self, with_b: bool) -> Result<ResponseBlock, ResponseError> {
        let partition = self.evaluator.partition();
        let dim: usize = partition.dim();
        let omega: Array1<f64> = partition.omega();
        let mut a: Array2<c64> = Array2::zeros((dim, dim));
        let mut b: Option<Array2<c64>> = if with_b {
            Some(Array2::zeros((dim, dim)))
        } else {
            None
        };
        debug!("building explicit response matrices of dimension {}", dim);

        let mut start: usize = 0;
        while start < dim {
            let end: usize = (start + UNIT_VECTOR_BATCH).min(dim);
            let mut units: Array2<c64> = Array2::zeros((dim, end - start));
            for (col, k) in (start..end).enumerate() {
                units[[k, col]] = c64::new(1.0, 0.0);
            }
            let zeros: Array2<c64> = Array2::zeros(units.raw_dim());
            let ys: Option<ArrayView2<c64>> = if with_b { Some(zeros.view()) } else { None };
            let (v_ov, v_vo) = self.evaluator.apply(units.view(), ys)?;
            a.slice_mut(s![.., start..end]).assign(&v_ov);
            // The Y image of a unit X excitation is column k of B*.
            if let (Some(b), Some(v_vo)) = (b.as_mut(), v_vo) {
                b.slice_mut(s![.., start..end])
                    .assign(&v_vo.mapv(|c| c.conj()));
            }
            start = end;
        }
        for (k, w) in omega.iter().enumerate() {
            a[[k, k]] += *w;
        }
        ResponseBlock::from_matrices(a, b, partition.layout())
    }
}
