use crate::defaults::*;
use crate::error::ResponseError;
use crate::excited_states::kernel::ResponseKernelEvaluator;
use crate::excited_states::product::OperatorProduct;
use crate::excited_states::response_matrix::{ResponseBlock, ResponseMatrixBuilder};
use crate::excited_states::roots::{Candidate, ExcitationAmplitude, Root, RootFilter};
use crate::excited_states::solvers::{initial_subspace, Davidson, PairedDavidson};
use log::info;
use ndarray::prelude::*;
use ndarray_linalg::{c64, Eig, Eigh, UPLO};
use serde::{Deserialize, Serialize};

/// Tamm-Dancoff (A only) or the full coupled response problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Tda,
    Tddft,
}

/// Full diagonalization of the explicit matrices or Davidson iterations on the matrix-free
/// products.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverPath {
    Iterative,
    Explicit,
}

#[derive(Debug, Clone, Copy)]
pub struct SolverSettings {
    pub mode: ResponseMode,
    pub path: SolverPath,
    pub nstates: usize,
    pub positive_eig_threshold: f64,
    pub real_eig_threshold: f64,
    pub max_iter: usize,
    pub conv_tol: f64,
    pub subspace_multiplier: usize,
    pub n_extra_guess: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            mode: ResponseMode::Tddft,
            path: SolverPath::Iterative,
            nstates: NSTATES,
            positive_eig_threshold: POSITIVE_EIG_THRESHOLD,
            real_eig_threshold: REAL_EIG_THRESHOLD,
            max_iter: DAVIDSON_MAX_ITER,
            conv_tol: DAVIDSON_CONV_TOL,
            subspace_multiplier: DAVIDSON_SUBSPACE_MULTIPLIER,
            n_extra_guess: DAVIDSON_EXTRA_GUESS,
        }
    }
}

/// Eigenpairs of the Hermitian A.
pub fn diagonalize_tda(block: &ResponseBlock) -> Result<Vec<Candidate>, ResponseError> {
    let (energies, vectors): (Array1<f64>, Array2<c64>) = block.a().eigh(UPLO::Upper)?;
    Ok(energies
        .iter()
        .zip(vectors.axis_iter(Axis(1)))
        .map(|(e, v)| Candidate {
            energy: c64::from(*e),
            amplitude: ExcitationAmplitude::tda(v.to_owned()),
        })
        .collect())
}

/// Eigenpairs of the paired matrix [[A, B], [-B*, -A*]], which come in (w, -w*) pairs.
pub fn diagonalize_tddft(block: &ResponseBlock) -> Result<Vec<Candidate>, ResponseError> {
    let n: usize = block.dim();
    let (energies, vectors): (Array1<c64>, Array2<c64>) = block.paired_matrix()?.eig()?;
    Ok(energies
        .iter()
        .zip(vectors.axis_iter(Axis(1)))
        .map(|(e, v)| Candidate {
            energy: *e,
            amplitude: ExcitationAmplitude::tddft(
                v.slice(s![..n]).to_owned(),
                v.slice(s![n..]).to_owned(),
            ),
        })
        .collect())
}

/// Solves the response eigenvalue problem of one kernel for the configured mode and path and
/// hands the raw eigenpairs to the root filter.
pub struct EigenSolver<'a> {
    evaluator: &'a ResponseKernelEvaluator<'a>,
    settings: SolverSettings,
}

impl<'a> EigenSolver<'a> {
    pub fn new(evaluator: &'a ResponseKernelEvaluator<'a>, settings: SolverSettings) -> Self {
        Self {
            evaluator,
            settings,
        }
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub fn filter(&self) -> RootFilter {
        RootFilter::new(self.settings.nstates, self.settings.positive_eig_threshold)
            .with_real_eig_threshold(self.settings.real_eig_threshold)
    }

    /// The lowest physical roots, at most `nstates`.
    pub fn kernel(&self) -> Result<Vec<Root>, ResponseError> {
        let dim: usize = self.evaluator.partition().dim();
        info!(
            "{:?} excitation energies ({:?} path), {} roots requested, dimension {}",
            self.settings.mode, self.settings.path, self.settings.nstates, dim
        );
        if self.settings.nstates == 0 {
            return Ok(Vec::new());
        }
        let candidates: Vec<Candidate> = match (self.settings.mode, self.settings.path) {
            (ResponseMode::Tda, SolverPath::Explicit) => self.tda_explicit()?,
            (ResponseMode::Tda, SolverPath::Iterative) => self.tda_iterative()?,
            (ResponseMode::Tddft, SolverPath::Explicit) => self.tddft_explicit()?,
            (ResponseMode::Tddft, SolverPath::Iterative) => self.tddft_iterative()?,
        };
        self.filter().apply(candidates)
    }

    /// Number of roots followed by the iterative solvers and the number of guess vectors.
    fn subspace_size(&self, dim: usize) -> (usize, usize) {
        let n_roots: usize = self.settings.nstates.min(dim);
        let n_guess: usize = (self.settings.nstates + self.settings.n_extra_guess).min(dim);
        (n_roots, n_guess)
    }

    fn tda_explicit(&self) -> Result<Vec<Candidate>, ResponseError> {
        let block: ResponseBlock = ResponseMatrixBuilder::new(self.evaluator).build(false)?;
        diagonalize_tda(&block)
    }

    fn tddft_explicit(&self) -> Result<Vec<Candidate>, ResponseError> {
        let block: ResponseBlock = ResponseMatrixBuilder::new(self.evaluator).build(true)?;
        diagonalize_tddft(&block)
    }

    fn tda_iterative(&self) -> Result<Vec<Candidate>, ResponseError> {
        let product = OperatorProduct::new(self.evaluator);
        let (n_roots, n_guess) = self.subspace_size(product.dim());
        let guess: Array2<c64> = initial_subspace(product.omega(), n_guess);
        let davidson: Davidson = Davidson::new(
            &product,
            guess,
            &self.filter(),
            n_roots,
            self.settings.conv_tol,
            self.settings.max_iter,
            self.settings.subspace_multiplier,
        )?;
        Ok(davidson
            .eigenvalues
            .iter()
            .zip(davidson.eigenvectors.axis_iter(Axis(1)))
            .map(|(e, v)| Candidate {
                energy: c64::from(*e),
                amplitude: ExcitationAmplitude::tda(v.to_owned()),
            })
            .collect())
    }

    fn tddft_iterative(&self) -> Result<Vec<Candidate>, ResponseError> {
        let product = OperatorProduct::new(self.evaluator);
        let n: usize = product.dim();
        let (n_roots, n_guess) = self.subspace_size(n);
        let guess: Array2<c64> = initial_subspace(product.omega(), n_guess);
        let davidson: PairedDavidson = PairedDavidson::new(
            &product,
            guess,
            &self.filter(),
            n_roots,
            self.settings.conv_tol,
            self.settings.max_iter,
            self.settings.subspace_multiplier,
        )?;
        Ok(davidson
            .eigenvalues
            .iter()
            .zip(davidson.eigenvectors.axis_iter(Axis(1)))
            .map(|(e, v)| Candidate {
                energy: *e,
                amplitude: ExcitationAmplitude::tddft(
                    v.slice(s![..n]).to_owned(),
                    v.slice(s![n..]).to_owned(),
                ),
            })
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::constants::HARTREE_TO_EV;
    use crate::excited_states::kernel::{Collinearity, SlaterExchange, XcGrid, XcInput};
    use crate::excited_states::utils::fingerprint;
    use crate::io::{load_calculation, Configuration, FunctionalChoice};
    use crate::utils::tests::*;
    use approx::assert_abs_diff_eq;
    use std::path::Path;

    fn settings(mode: ResponseMode, path: SolverPath, nstates: usize) -> SolverSettings {
        SolverSettings {
            mode,
            path,
            nstates,
            conv_tol: 1.0e-7,
            ..SolverSettings::default()
        }
    }

    fn energies(roots: &[Root]) -> Vec<f64> {
        roots.iter().map(|root| root.energy).collect()
    }

    fn compare_paths(evaluator: &ResponseKernelEvaluator, mode: ResponseMode, nstates: usize) {
        let explicit: Vec<Root> =
            EigenSolver::new(evaluator, settings(mode, SolverPath::Explicit, nstates))
                .kernel()
                .unwrap();
        let iterative: Vec<Root> =
            EigenSolver::new(evaluator, settings(mode, SolverPath::Iterative, nstates))
                .kernel()
                .unwrap();
        assert_eq!(explicit.len(), nstates);
        assert_eq!(iterative.len(), nstates);
        for (e, i) in energies(&explicit).iter().zip(energies(&iterative).iter()) {
            assert_abs_diff_eq!(e, i, epsilon = 1e-5);
        }
        for root in explicit.iter().chain(iterative.iter()) {
            assert!(root.energy > 0.0);
            assert_abs_diff_eq!(root.amplitude.norm(), 1.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn explicit_and_iterative_paths_agree_for_restricted_references() {
        let system = ModelSystem::restricted(41);
        let grid: XcGrid = random_grid(system.n_ao(), 30, true, 42);
        let input = XcInput {
            functional: &MockSemiLocal,
            grid: &grid,
            collinearity: Collinearity::Collinear,
        };
        let evaluator =
            ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input)).unwrap();
        compare_paths(&evaluator, ResponseMode::Tda, 3);
        compare_paths(&evaluator, ResponseMode::Tddft, 3);
        let triplet = evaluator.singlet(false);
        compare_paths(&triplet, ResponseMode::Tda, 3);
    }

    #[test]
    fn explicit_and_iterative_paths_agree_for_unrestricted_references() {
        let system = ModelSystem::unrestricted(43);
        let grid: XcGrid = random_grid(system.n_ao(), 30, false, 44);
        let input = XcInput {
            functional: &SlaterExchange,
            grid: &grid,
            collinearity: Collinearity::Collinear,
        };
        let evaluator =
            ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input)).unwrap();
        compare_paths(&evaluator, ResponseMode::Tda, 5);
        compare_paths(&evaluator, ResponseMode::Tddft, 4);
    }

    #[test]
    fn explicit_and_iterative_paths_agree_for_spinors() {
        let system = ModelSystem::spinor(45);
        let hartree_fock = ResponseKernelEvaluator::new(&system.orbitals, &system.eri, None).unwrap();
        compare_paths(&hartree_fock, ResponseMode::Tda, 5);
        compare_paths(&hartree_fock, ResponseMode::Tddft, 4);

        let grid: XcGrid = random_grid(system.n_ao(), 30, true, 46);
        let input = XcInput {
            functional: &MockSemiLocal,
            grid: &grid,
            collinearity: Collinearity::NonCollinear { spin_samples: 6 },
        };
        let evaluator =
            ResponseKernelEvaluator::new(&system.orbitals, &system.eri, Some(input)).unwrap();
        compare_paths(&evaluator, ResponseMode::Tda, 5);
    }

    fn tda_spectrum(evaluator: &ResponseKernelEvaluator) -> Vec<f64> {
        let block = ResponseMatrixBuilder::new(evaluator).build(false).unwrap();
        diagonalize_tda(&block)
            .unwrap()
            .iter()
            .map(|c| c.energy.re)
            .collect()
    }

    #[test]
    fn singlets_and_triplets_span_the_unrestricted_spectrum() {
        let restricted = ModelSystem::restricted(47);
        let unrestricted = ModelSystem::unrestricted_closed_shell(47);
        let grid: XcGrid = random_grid(restricted.n_ao(), 30, false, 48);
        let input = XcInput {
            functional: &SlaterExchange,
            grid: &grid,
            collinearity: Collinearity::Collinear,
        };
        let singlet =
            ResponseKernelEvaluator::new(&restricted.orbitals, &restricted.eri, Some(input)).unwrap();
        let mut restricted_energies: Vec<f64> = tda_spectrum(&singlet);
        let triplet = singlet.singlet(false);
        restricted_energies.extend(tda_spectrum(&triplet));
        restricted_energies.sort_by(|a, b| a.partial_cmp(b).unwrap());

        let open_shell =
            ResponseKernelEvaluator::new(&unrestricted.orbitals, &unrestricted.eri, Some(input))
                .unwrap();
        let unrestricted_energies: Vec<f64> = tda_spectrum(&open_shell);
        assert_eq!(restricted_energies.len(), unrestricted_energies.len());
        for (r, u) in restricted_energies.iter().zip(unrestricted_energies.iter()) {
            assert_abs_diff_eq!(r, u, epsilon = 1e-10);
        }
    }

    #[test]
    fn root_exactly_at_the_threshold_is_excluded() {
        let threshold: f64 = 1.0e-3;
        let a: Array2<c64> = Array2::from_diag(&array![
            c64::from(threshold),
            c64::from(0.2),
            c64::from(0.5)
        ]);
        let block =
            ResponseBlock::from_matrices(a, Some(Array2::zeros((3, 3))), vec![(1, 3)]).unwrap();
        let filter = RootFilter::new(3, threshold);
        for candidates in [
            diagonalize_tda(&block).unwrap(),
            diagonalize_tddft(&block).unwrap(),
        ] {
            let roots: Vec<Root> = filter.apply(candidates).unwrap();
            assert_eq!(roots.len(), 2);
            assert_abs_diff_eq!(roots[0].energy, 0.2, epsilon = 1e-14);
            assert_abs_diff_eq!(roots[1].energy, 0.5, epsilon = 1e-14);
        }
    }

    #[test]
    fn iterative_tda_skips_an_unstable_root() {
        let n: usize = 12;
        let noise: Array2<c64> = random_amplitudes(n, n, 50);
        let mut a: Array2<c64> = (&noise + &noise.t().mapv(|c| c.conj())).mapv(|c| c * 0.01);
        for k in 0..n {
            a[[k, k]] += c64::from(0.3 + 0.1 * k as f64);
        }
        // an instability below the positive-energy threshold
        a[[0, 0]] -= c64::from(0.5);
        let block = ResponseBlock::from_matrices(a, None, vec![(1, n)]).unwrap();
        let nstates: usize = 4;
        let filter = RootFilter::new(nstates, POSITIVE_EIG_THRESHOLD);
        let explicit: Vec<Root> = filter.apply(diagonalize_tda(&block).unwrap()).unwrap();

        let diag: Array1<f64> = block.a().diag().mapv(|c| c.re);
        let guess: Array2<c64> = initial_subspace(diag.view(), nstates + DAVIDSON_EXTRA_GUESS);
        let davidson = Davidson::new(&block, guess, &filter, nstates, 1e-8, 100, 20).unwrap();
        let candidates: Vec<Candidate> = davidson
            .eigenvalues
            .iter()
            .zip(davidson.eigenvectors.axis_iter(Axis(1)))
            .map(|(e, v)| Candidate {
                energy: c64::from(*e),
                amplitude: ExcitationAmplitude::tda(v.to_owned()),
            })
            .collect();
        let iterative: Vec<Root> = filter.apply(candidates).unwrap();

        assert_eq!(explicit.len(), nstates);
        assert_eq!(iterative.len(), nstates);
        for (e, i) in energies(&explicit).iter().zip(energies(&iterative).iter()) {
            assert_abs_diff_eq!(e, i, epsilon = 1e-7);
        }
    }

    #[test]
    fn closed_shell_spinors_reproduce_singlets_and_triplets() {
        let restricted = ModelSystem::restricted(51);
        let spinor = ModelSystem::closed_shell_spinor(51);
        let grid: XcGrid = random_grid(restricted.n_ao(), 30, false, 52);
        let input = XcInput {
            functional: &SlaterExchange,
            grid: &grid,
            collinearity: Collinearity::Collinear,
        };
        let singlet =
            ResponseKernelEvaluator::new(&restricted.orbitals, &restricted.eri, Some(input)).unwrap();
        let singlets: Vec<f64> = tda_spectrum(&singlet);
        let triplet = singlet.singlet(false);
        let triplets: Vec<f64> = tda_spectrum(&triplet);
        let mut reference: Vec<f64> = singlets.clone();
        for e in triplets.iter() {
            reference.extend([*e; 3]);
        }
        reference.sort_by(|a, b| a.partial_cmp(b).unwrap());

        for spin_samples in [6, 14, 26] {
            let input = XcInput {
                functional: &SlaterExchange,
                grid: &grid,
                collinearity: Collinearity::NonCollinear { spin_samples },
            };
            let evaluator =
                ResponseKernelEvaluator::new(&spinor.orbitals, &spinor.eri, Some(input)).unwrap();
            let spectrum: Vec<f64> = tda_spectrum(&evaluator);
            assert_eq!(spectrum.len(), reference.len());
            for (s, r) in spectrum.iter().zip(reference.iter()) {
                assert_abs_diff_eq!(s, r, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn lowest_tddft_root_lies_below_the_tda_root() {
        // Thouless: the TDA energy is the y = 0 trial of the TDDFT minimum.
        let system = ModelSystem::restricted(49);
        let evaluator = ResponseKernelEvaluator::new(&system.orbitals, &system.eri, None).unwrap();
        let tda = EigenSolver::new(&evaluator, settings(ResponseMode::Tda, SolverPath::Explicit, 4))
            .kernel()
            .unwrap();
        let tddft =
            EigenSolver::new(&evaluator, settings(ResponseMode::Tddft, SolverPath::Explicit, 4))
                .kernel()
                .unwrap();
        assert!(tddft[0].energy <= tda[0].energy + 1e-12);
    }

    /// Two-component H3 (6-31G) with Slater exchange. The checkpoint, integrals and grid are
    /// exported to `tests/data/h3_lda` as described in the README there.
    #[test]
    #[ignore]
    fn h3_lda_fingerprints() {
        let directory = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/h3_lda");
        let mut config = Configuration::default();
        config.xc.functional = FunctionalChoice::Slater;
        let calculation = load_calculation(&directory, &config).unwrap();
        let input = calculation.xc_input(Collinearity::Collinear);
        let evaluator =
            ResponseKernelEvaluator::new(&calculation.orbitals, &calculation.eri, input).unwrap();

        let tda = EigenSolver::new(&evaluator, settings(ResponseMode::Tda, SolverPath::Iterative, 5))
            .kernel()
            .unwrap();
        let e: Array1<f64> = energies(&tda[..3]).into_iter().map(|e| e * HARTREE_TO_EV).collect();
        assert_abs_diff_eq!(fingerprint(e.view()), 3.1825211067032253, epsilon = 1e-5);

        let tddft =
            EigenSolver::new(&evaluator, settings(ResponseMode::Tddft, SolverPath::Iterative, 4))
                .kernel()
                .unwrap();
        let e: Array1<f64> = energies(&tddft[..3]).into_iter().map(|e| e * HARTREE_TO_EV).collect();
        assert_abs_diff_eq!(fingerprint(e.view()), 3.119041718921026, epsilon = 1e-5);

        let explicit =
            EigenSolver::new(&evaluator, settings(ResponseMode::Tddft, SolverPath::Explicit, 4))
                .kernel()
                .unwrap();
        for (i, r) in tddft.iter().zip(explicit.iter()) {
            assert_abs_diff_eq!(i.energy * HARTREE_TO_EV, r.energy * HARTREE_TO_EV, epsilon = 1e-5);
        }
    }
}
