use crate::defaults::*;
use crate::excited_states::kernel::{Collinearity, SlaterExchange, XcFunctional};
use crate::excited_states::{ResponseMode, SolverPath, SolverSettings};
use serde::{Deserialize, Serialize};

fn default_verbose() -> i8 {
    0
}
fn default_number_of_cores() -> usize {
    1
}
fn default_mode() -> ResponseMode {
    ResponseMode::Tddft
}
fn default_path() -> SolverPath {
    SolverPath::Iterative
}
fn default_nstates() -> usize {
    NSTATES
}
fn default_positive_eig_threshold() -> f64 {
    POSITIVE_EIG_THRESHOLD
}
fn default_real_eig_threshold() -> f64 {
    REAL_EIG_THRESHOLD
}
fn default_singlet() -> bool {
    SINGLET
}
fn default_write_ab() -> bool {
    false
}
fn default_davidson_iterations() -> usize {
    DAVIDSON_MAX_ITER
}
fn default_davidson_convergence() -> f64 {
    DAVIDSON_CONV_TOL
}
fn default_davidson_subspace_multiplier() -> usize {
    DAVIDSON_SUBSPACE_MULTIPLIER
}
fn default_davidson_extra_guess() -> usize {
    DAVIDSON_EXTRA_GUESS
}
fn default_functional() -> FunctionalChoice {
    FunctionalChoice::None
}
fn default_collinearity() -> CollinearityChoice {
    CollinearityChoice::Col
}
fn default_spin_samples() -> usize {
    SPIN_SAMPLES
}
fn default_checkpoint() -> String {
    String::from(CHECKPOINT_FILE_NAME)
}
fn default_eri() -> String {
    String::from(ERI_FILE_NAME)
}
fn default_grid_weights() -> String {
    String::from(GRID_WEIGHTS_FILE_NAME)
}
fn default_grid_ao() -> String {
    String::from(GRID_AO_FILE_NAME)
}
fn default_response_config() -> ResponseConfig {
    let response_config: ResponseConfig = toml::from_str("").unwrap();
    response_config
}
fn default_davidson_config() -> DavidsonConfig {
    let davidson_config: DavidsonConfig = toml::from_str("").unwrap();
    davidson_config
}
fn default_xc_config() -> XcConfig {
    let xc_config: XcConfig = toml::from_str("").unwrap();
    xc_config
}
fn default_input_config() -> InputConfig {
    let input_config: InputConfig = toml::from_str("").unwrap();
    input_config
}
fn default_parallelization_config() -> ParallelizationConfig {
    let parallelization_config: ParallelizationConfig = toml::from_str("").unwrap();
    parallelization_config
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Configuration {
    #[serde(default = "default_verbose")]
    pub verbose: i8,
    #[serde(default = "default_response_config")]
    pub response: ResponseConfig,
    #[serde(default = "default_davidson_config")]
    pub davidson: DavidsonConfig,
    #[serde(default = "default_xc_config")]
    pub xc: XcConfig,
    #[serde(default = "default_input_config")]
    pub input: InputConfig,
    #[serde(default = "default_parallelization_config")]
    pub parallelization: ParallelizationConfig,
}

impl Default for Configuration {
    fn default() -> Self {
        toml::from_str("").unwrap()
    }
}

impl Configuration {
    /// Settings of the eigenvalue solver.
    pub fn solver_settings(&self) -> SolverSettings {
        SolverSettings {
            mode: self.response.mode,
            path: self.response.path,
            nstates: self.response.nstates,
            positive_eig_threshold: self.response.positive_eig_threshold,
            real_eig_threshold: self.response.real_eig_threshold,
            max_iter: self.davidson.max_iter,
            conv_tol: self.davidson.conv_tol,
            subspace_multiplier: self.davidson.subspace_multiplier,
            n_extra_guess: self.davidson.n_extra_guess,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ResponseConfig {
    #[serde(default = "default_mode")]
    pub mode: ResponseMode,
    #[serde(default = "default_path")]
    pub path: SolverPath,
    #[serde(default = "default_nstates")]
    pub nstates: usize,
    #[serde(default = "default_positive_eig_threshold")]
    pub positive_eig_threshold: f64,
    #[serde(default = "default_real_eig_threshold")]
    pub real_eig_threshold: f64,
    #[serde(default = "default_singlet")]
    pub singlet: bool,
    #[serde(default = "default_write_ab")]
    pub write_ab: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct DavidsonConfig {
    #[serde(default = "default_davidson_iterations")]
    pub max_iter: usize,
    #[serde(default = "default_davidson_convergence")]
    pub conv_tol: f64,
    #[serde(default = "default_davidson_subspace_multiplier")]
    pub subspace_multiplier: usize,
    #[serde(default = "default_davidson_extra_guess")]
    pub n_extra_guess: usize,
}

/// Exchange-correlation functionals that can be selected from the configuration file.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FunctionalChoice {
    /// Hartree-Fock
    None,
    Slater,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CollinearityChoice {
    Col,
    Mcol,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct XcConfig {
    #[serde(default = "default_functional")]
    pub functional: FunctionalChoice,
    #[serde(default = "default_collinearity")]
    pub collinearity: CollinearityChoice,
    #[serde(default = "default_spin_samples")]
    pub spin_samples: usize,
}

impl XcConfig {
    pub fn functional(&self) -> Option<Box<dyn XcFunctional>> {
        match self.functional {
            FunctionalChoice::None => None,
            FunctionalChoice::Slater => Some(Box::new(SlaterExchange)),
        }
    }

    pub fn collinearity(&self) -> Collinearity {
        match self.collinearity {
            CollinearityChoice::Col => Collinearity::Collinear,
            CollinearityChoice::Mcol => Collinearity::NonCollinear {
                spin_samples: self.spin_samples,
            },
        }
    }
}

/// File names of the reference data, relative to the working directory.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InputConfig {
    #[serde(default = "default_checkpoint")]
    pub checkpoint: String,
    #[serde(default = "default_eri")]
    pub eri: String,
    #[serde(default = "default_grid_weights")]
    pub grid_weights: String,
    #[serde(default = "default_grid_ao")]
    pub grid_ao: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
pub struct ParallelizationConfig {
    #[serde(default = "default_number_of_cores")]
    pub number_of_cores: usize,
}
