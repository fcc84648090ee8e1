mod collinear;
pub mod functional;
pub mod grid;
pub mod integrals;
mod multicollinear;

pub use functional::{FunctionalClass, SlaterExchange, XcFunctional};
pub use grid::XcGrid;
pub use integrals::{DenseEri, TwoElectronIntegrals};
pub use multicollinear::{spherical_design, SPHERICAL_DESIGN_SIZES};

use crate::error::ResponseError;
use crate::excited_states::orbitals::{ChannelPartition, OrbitalKind, OrbitalPartition, OrbitalSet};
use collinear::CollinearXc;
use log::debug;
use multicollinear::{from_spin_blocks, spin_blocks, MultiCollinearXc};
use ndarray::prelude::*;
use ndarray_linalg::c64;
use std::fmt;

/// Treatment of the spin degrees of freedom in the exchange-correlation kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collinearity {
    Collinear,
    /// Multi-collinear kernel on the smallest spherical design with at least `spin_samples`
    /// spin directions. Collinear references fall back to `Collinear`.
    NonCollinear { spin_samples: usize },
}

/// The functional class and spin treatment of the response kernel. It is resolved once when
/// the evaluator is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelKind {
    pub class: FunctionalClass,
    pub collinearity: Collinearity,
}

impl KernelKind {
    /// Checks that a kernel exists for the combination of orbitals, functional and grid.
    pub fn resolve(
        orbital_kind: OrbitalKind,
        class: FunctionalClass,
        collinearity: Collinearity,
        has_gradients: bool,
    ) -> Result<Self, ResponseError> {
        // Without an XC kernel the spin treatment is irrelevant.
        if class == FunctionalClass::None {
            return Ok(Self {
                class,
                collinearity: Collinearity::Collinear,
            });
        }
        let kind = Self {
            class,
            collinearity,
        };
        let unavailable = |reason: &str| ResponseError::KernelUnavailable {
            kind: kind.to_string(),
            reason: String::from(reason),
        };
        if class.needs_gradients() && !has_gradients {
            return Err(unavailable("the grid provides no AO gradients"));
        }
        match (orbital_kind, collinearity) {
            // Spin-conserving excitations of collinear references only see the longitudinal
            // kernel, which is the collinear one.
            (OrbitalKind::Restricted | OrbitalKind::Unrestricted, Collinearity::NonCollinear { .. }) => {
                return Ok(Self {
                    class,
                    collinearity: Collinearity::Collinear,
                });
            }
            (OrbitalKind::Spinor, Collinearity::NonCollinear { spin_samples }) => {
                if spin_samples == 0 {
                    return Err(unavailable("at least one spin sample is required"));
                }
                if spherical_design(spin_samples).is_none() {
                    return Err(unavailable(&format!(
                        "at most {} spin samples are supported",
                        SPHERICAL_DESIGN_SIZES[SPHERICAL_DESIGN_SIZES.len() - 1]
                    )));
                }
            }
            _ => {}
        }
        Ok(kind)
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.collinearity {
            Collinearity::Collinear => write!(f, "{:?} x Collinear", self.class),
            Collinearity::NonCollinear { spin_samples } => {
                write!(f, "{:?} x NonCollinear({})", self.class, spin_samples)
            }
        }
    }
}

/// Exchange-correlation collaborators of the response kernel.
#[derive(Clone, Copy)]
pub struct XcInput<'a> {
    pub functional: &'a dyn XcFunctional,
    pub grid: &'a XcGrid,
    pub collinearity: Collinearity,
}

enum XcStrategy<'a> {
    None,
    Collinear(CollinearXc<'a>),
    MultiCollinear(MultiCollinearXc<'a>),
}

/// Coulomb, exact exchange and exchange-correlation kernel acting on trial amplitudes.
///
/// The XC strategy is chosen and its kernel evaluated at the reference density when the
/// evaluator is constructed; applying the kernel afterwards only reads this state, so one
/// evaluator can be shared between any number of products.
pub struct ResponseKernelEvaluator<'a> {
    partition: OrbitalPartition,
    eri: &'a dyn TwoElectronIntegrals,
    kind: KernelKind,
    hybrid: f64,
    singlet: bool,
    xc: XcStrategy<'a>,
}

impl<'a> ResponseKernelEvaluator<'a> {
    /// Without an `XcInput` the kernel is the Hartree-Fock one (Coulomb and full exchange).
    pub fn new(
        orbitals: &OrbitalSet,
        eri: &'a dyn TwoElectronIntegrals,
        xc: Option<XcInput<'a>>,
    ) -> Result<Self, ResponseError> {
        if eri.n_ao() != orbitals.n_ao() {
            return Err(ResponseError::shape(orbitals.n_ao(), eri.n_ao()));
        }
        let partition: OrbitalPartition = OrbitalPartition::new(orbitals);

        let (kind, hybrid, strategy) = match xc {
            None => (
                KernelKind {
                    class: FunctionalClass::None,
                    collinearity: Collinearity::Collinear,
                },
                1.0,
                XcStrategy::None,
            ),
            Some(input) => {
                if input.grid.n_ao() != orbitals.n_ao() {
                    return Err(ResponseError::shape(orbitals.n_ao(), input.grid.n_ao()));
                }
                let kind: KernelKind = KernelKind::resolve(
                    orbitals.kind(),
                    input.functional.class(),
                    input.collinearity,
                    input.grid.has_gradients(),
                )?;
                let strategy: XcStrategy = Self::build_strategy(&partition, kind, input)
                    .map_err(|err| match err {
                        ResponseError::KernelUnavailable { .. } => err,
                        other => ResponseError::KernelUnavailable {
                            kind: kind.to_string(),
                            reason: other.to_string(),
                        },
                    })?;
                (kind, input.functional.hybrid_coefficient(), strategy)
            }
        };
        debug!(
            "response kernel {} with {:.3} exact exchange for {:?} orbitals",
            kind,
            hybrid,
            partition.kind()
        );
        Ok(Self {
            partition,
            eri,
            kind,
            hybrid,
            singlet: true,
            xc: strategy,
        })
    }

    fn build_strategy(
        partition: &OrbitalPartition,
        kind: KernelKind,
        input: XcInput<'a>,
    ) -> Result<XcStrategy<'a>, ResponseError> {
        if kind.class == FunctionalClass::None {
            return Ok(XcStrategy::None);
        }
        let n_ao: usize = partition.n_ao();
        let channels: &[ChannelPartition] = partition.channels();
        let strategy = match (partition.kind(), kind.collinearity) {
            (OrbitalKind::Restricted, _) => {
                let dm: Array2<c64> = channels[0].reference_density();
                XcStrategy::Collinear(CollinearXc::new(
                    input.functional,
                    input.grid,
                    dm.view(),
                    dm.view(),
                )?)
            }
            (OrbitalKind::Unrestricted, _) => XcStrategy::Collinear(CollinearXc::new(
                input.functional,
                input.grid,
                channels[0].reference_density().view(),
                channels[1].reference_density().view(),
            )?),
            (OrbitalKind::Spinor, Collinearity::Collinear) => {
                let dm: Array2<c64> = channels[0].reference_density();
                let [aa, _, _, bb] = spin_blocks(dm.view(), n_ao);
                XcStrategy::Collinear(CollinearXc::new(input.functional, input.grid, aa, bb)?)
            }
            (OrbitalKind::Spinor, Collinearity::NonCollinear { spin_samples }) => {
                let dm: Array2<c64> = channels[0].reference_density();
                XcStrategy::MultiCollinear(MultiCollinearXc::new(
                    input.functional,
                    input.grid,
                    dm.view(),
                    spin_samples,
                )?)
            }
        };
        Ok(strategy)
    }

    /// Selects the singlet (default) or triplet manifold of restricted references. The flag has
    /// no effect on other orbital kinds.
    pub fn singlet(mut self, singlet: bool) -> Self {
        self.singlet = singlet;
        self
    }

    pub fn is_singlet(&self) -> bool {
        self.singlet
    }

    pub fn partition(&self) -> &OrbitalPartition {
        &self.partition
    }

    pub fn kind(&self) -> KernelKind {
        self.kind
    }

    pub fn hybrid_coefficient(&self) -> f64 {
        self.hybrid
    }

    /// Kernel part of the response for a batch of trial amplitudes (one per column). Returns
    /// the occupied-virtual projection C_o^H V C_v of the response potential and, if `ys` is
    /// given, the virtual-occupied projection (C_v^H V C_o)^T. The orbital energy differences
    /// are not included.
    pub fn apply(
        &self,
        xs: ArrayView2<c64>,
        ys: Option<ArrayView2<c64>>,
    ) -> Result<(Array2<c64>, Option<Array2<c64>>), ResponseError> {
        let dim: usize = self.partition.dim();
        if xs.nrows() != dim {
            return Err(ResponseError::shape(dim, xs.nrows()));
        }
        if let Some(ys) = ys {
            if ys.dim() != xs.dim() {
                return Err(ResponseError::shape(xs.dim(), ys.dim()));
            }
        }
        let mut v_ov: Array2<c64> = Array2::zeros(xs.raw_dim());
        let mut v_vo: Option<Array2<c64>> = ys.map(|_| Array2::zeros(xs.raw_dim()));

        for (idx, x) in xs.axis_iter(Axis(1)).enumerate() {
            let y: Option<ArrayView1<c64>> = ys.map(|ys| ys.index_axis_move(Axis(1), idx));
            let densities: Vec<Array2<c64>> = self
                .partition
                .channels()
                .iter()
                .map(|ch| {
                    let y_block: Option<Array2<c64>> = y.map(|y| ch.block(y)).transpose()?;
                    Ok(ch.transition_density(
                        ch.block(x)?.view(),
                        y_block.as_ref().map(|b| b.view()),
                    ))
                })
                .collect::<Result<Vec<Array2<c64>>, ResponseError>>()?;
            let potentials: Vec<Array2<c64>> = self.potentials(&densities)?;

            for (ch, v) in self.partition.channels().iter().zip(potentials.iter()) {
                let range = ch.offset..ch.offset + ch.n_ov();
                let ov: Array2<c64> = ch.project_ov(v.view());
                v_ov.slice_mut(s![range.clone(), idx])
                    .assign(&Array1::from_iter(ov.iter().cloned()));
                if let Some(v_vo) = v_vo.as_mut() {
                    let vo: Array2<c64> = ch.project_vo(v.view());
                    v_vo.slice_mut(s![range, idx])
                        .assign(&Array1::from_iter(vo.iter().cloned()));
                }
            }
        }
        Ok((v_ov, v_vo))
    }

    /// AO response potentials of the per-channel transition densities.
    fn potentials(&self, densities: &[Array2<c64>]) -> Result<Vec<Array2<c64>>, ResponseError> {
        match self.partition.kind() {
            OrbitalKind::Restricted => {
                let dm: &Array2<c64> = &densities[0];
                let mut v: Array2<c64> = Array2::zeros(dm.raw_dim());
                if self.singlet {
                    v = v + self.eri.coulomb(dm.view())? * c64::from(2.0);
                }
                self.subtract_exchange(&mut v, dm.view())?;
                if let XcStrategy::Collinear(xc) = &self.xc {
                    let dm_b: Array2<c64> = if self.singlet {
                        dm.clone()
                    } else {
                        dm.mapv(|c| -c)
                    };
                    let (v_xc, _) = xc.potential(dm.view(), dm_b.view());
                    v = v + v_xc;
                }
                Ok(vec![v])
            }
            OrbitalKind::Unrestricted => {
                let (da, db) = (&densities[0], &densities[1]);
                let vj: Array2<c64> = self.eri.coulomb((da + db).view())?;
                let mut va: Array2<c64> = vj.clone();
                let mut vb: Array2<c64> = vj;
                self.subtract_exchange(&mut va, da.view())?;
                self.subtract_exchange(&mut vb, db.view())?;
                if let XcStrategy::Collinear(xc) = &self.xc {
                    let (va_xc, vb_xc) = xc.potential(da.view(), db.view());
                    va = va + va_xc;
                    vb = vb + vb_xc;
                }
                Ok(vec![va, vb])
            }
            OrbitalKind::Spinor => {
                let n_ao: usize = self.partition.n_ao();
                let [aa, ab, ba, bb] = spin_blocks(densities[0].view(), n_ao);
                let vj: Array2<c64> = self.eri.coulomb((&aa + &bb).view())?;
                let mut blocks: [Array2<c64>; 4] = [
                    vj.clone(),
                    Array2::zeros((n_ao, n_ao)),
                    Array2::zeros((n_ao, n_ao)),
                    vj,
                ];
                for (v, dm) in blocks.iter_mut().zip([aa, ab, ba, bb]) {
                    self.subtract_exchange(v, dm)?;
                }
                match &self.xc {
                    XcStrategy::Collinear(xc) => {
                        let (v_aa, v_bb) = xc.potential(aa, bb);
                        blocks[0] = &blocks[0] + &v_aa;
                        blocks[3] = &blocks[3] + &v_bb;
                        Ok(vec![from_spin_blocks(blocks)])
                    }
                    XcStrategy::MultiCollinear(xc) => {
                        Ok(vec![from_spin_blocks(blocks) + xc.potential(densities[0].view())])
                    }
                    XcStrategy::None => Ok(vec![from_spin_blocks(blocks)]),
                }
            }
        }
    }

    fn subtract_exchange(&self, v: &mut Array2<c64>, dm: ArrayView2<c64>) -> Result<(), ResponseError> {
        if self.hybrid != 0.0 {
            v.scaled_add(c64::from(-self.hybrid), &self.eri.exchange(dm)?);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::utils::tests::*;

    #[test]
    fn hartree_fock_ignores_collinearity() {
        let kind = KernelKind::resolve(
            OrbitalKind::Restricted,
            FunctionalClass::None,
            Collinearity::NonCollinear { spin_samples: 0 },
            false,
        )
        .unwrap();
        assert_eq!(kind.collinearity, Collinearity::Collinear);
    }

    #[test]
    fn unavailable_kernels() {
        let cases = [
            (OrbitalKind::Spinor, FunctionalClass::Local, Collinearity::NonCollinear { spin_samples: 0 }, true),
            (OrbitalKind::Spinor, FunctionalClass::Local, Collinearity::NonCollinear { spin_samples: 27 }, true),
            (OrbitalKind::Restricted, FunctionalClass::SemiLocal, Collinearity::Collinear, false),
            (OrbitalKind::Spinor, FunctionalClass::MetaLocal, Collinearity::NonCollinear { spin_samples: 6 }, false),
        ];
        for (orbital_kind, class, collinearity, has_gradients) in cases {
            let result = KernelKind::resolve(orbital_kind, class, collinearity, has_gradients);
            assert!(matches!(result, Err(ResponseError::KernelUnavailable { .. })));
        }
        for class in [FunctionalClass::SemiLocal, FunctionalClass::MetaLocal] {
            let kind = KernelKind::resolve(
                OrbitalKind::Spinor,
                class,
                Collinearity::NonCollinear { spin_samples: 6 },
                true,
            )
            .unwrap();
            assert_eq!(kind.collinearity, Collinearity::NonCollinear { spin_samples: 6 });
        }
    }

    #[test]
    fn collinear_references_fall_back_to_the_collinear_kernel() {
        for orbital_kind in [OrbitalKind::Restricted, OrbitalKind::Unrestricted] {
            let kind = KernelKind::resolve(
                orbital_kind,
                FunctionalClass::MetaLocal,
                Collinearity::NonCollinear { spin_samples: 6 },
                true,
            )
            .unwrap();
            assert_eq!(kind.collinearity, Collinearity::Collinear);
        }

        let system = ModelSystem::restricted(7);
        let grid: XcGrid = random_grid(system.n_ao(), 20, true, 8);
        let dim: usize = OrbitalPartition::new(&system.orbitals).dim();
        let xs: Array2<c64> = random_amplitudes(dim, 2, 9);
        for singlet in [true, false] {
            let products: Vec<Array2<c64>> = [
                Collinearity::Collinear,
                Collinearity::NonCollinear { spin_samples: 6 },
            ]
            .into_iter()
            .map(|collinearity| {
                let input = XcInput {
                    functional: &MockMetaLocal,
                    grid: &grid,
                    collinearity,
                };
                ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input))
                    .unwrap()
                    .singlet(singlet)
                    .apply(xs.view(), None)
                    .unwrap()
                    .0
            })
            .collect();
            let deviation: f64 = (&products[0] - &products[1])
                .iter()
                .fold(0.0, |acc, c| acc.max(c.norm()));
            assert!(deviation < 1e-14);
        }
    }

    #[test]
    fn failing_functional_is_reported_as_unavailable() {
        let system = ModelSystem::unrestricted(3);
        let grid: XcGrid = random_grid(system.n_ao(), 20, true, 4);
        let input = XcInput {
            functional: &FailingFunctional,
            grid: &grid,
            collinearity: Collinearity::Collinear,
        };
        let result = ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input));
        assert!(matches!(result, Err(ResponseError::KernelUnavailable { .. })));
    }

    #[test]
    fn mismatched_basis_is_rejected() {
        let system = ModelSystem::restricted(3);
        let eri = DenseEri::new(random_eri(system.n_ao() + 1, 1)).unwrap();
        let result = ResponseKernelEvaluator::new(&system.orbitals, &eri, None);
        assert!(matches!(result, Err(ResponseError::ShapeMismatch { .. })));
    }

    #[test]
    fn kernel_is_linear_in_the_amplitudes() {
        let system = ModelSystem::spinor(6);
        let grid: XcGrid = random_grid(system.n_ao(), 20, true, 6);
        let input = XcInput {
            functional: &MockSemiLocal,
            grid: &grid,
            collinearity: Collinearity::NonCollinear { spin_samples: 6 },
        };
        let evaluator = ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input)).unwrap();
        let dim: usize = evaluator.partition().dim();
        let xs: Array2<c64> = random_amplitudes(dim, 2, 3);
        let ys: Array2<c64> = random_amplitudes(dim, 2, 4);
        let (ax, ay) = evaluator.apply(xs.view(), Some(ys.view())).unwrap();
        let sum_x: Array2<c64> = (&xs.column(0) + &xs.column(1)).insert_axis(Axis(1));
        let sum_y: Array2<c64> = (&ys.column(0) + &ys.column(1)).insert_axis(Axis(1));
        let (sx, sy) = evaluator.apply(sum_x.view(), Some(sum_y.view())).unwrap();
        let ay = ay.unwrap();
        let sy = sy.unwrap();
        for k in 0..dim {
            assert!((sx[[k, 0]] - ax[[k, 0]] - ax[[k, 1]]).norm() < 1e-10);
            assert!((sy[[k, 0]] - ay[[k, 0]] - ay[[k, 1]]).norm() < 1e-10);
        }
    }
}
