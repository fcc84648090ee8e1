// CONFIGURATION
// config file
pub const CONFIG_FILE_NAME: &str = "tdscf.toml";
// input files that are expected in the working directory
pub const CHECKPOINT_FILE_NAME: &str = "checkpoint.json";
pub const ERI_FILE_NAME: &str = "eri.npy";
pub const GRID_WEIGHTS_FILE_NAME: &str = "grid_weights.npy";
pub const GRID_AO_FILE_NAME: &str = "grid_ao.npy";
// output files
pub const ENERGIES_FILE_NAME: &str = "excitation_energies.npy";

// EXCITED STATES
// number of requested roots
pub const NSTATES: usize = 3;
// roots with a real part at or below this value (in Hartree) are discarded
pub const POSITIVE_EIG_THRESHOLD: f64 = 1.0e-3;
// roots with an imaginary part above this value (in Hartree) are discarded
pub const REAL_EIG_THRESHOLD: f64 = 1.0e-4;
// singlet manifold for restricted references
pub const SINGLET: bool = true;

// DAVIDSON
pub const DAVIDSON_MAX_ITER: usize = 100;
// convergence threshold for the norm of the residual vectors
pub const DAVIDSON_CONV_TOL: f64 = 1.0e-5;
// maximal subspace is subspace_multiplier * nroots before it is collapsed
pub const DAVIDSON_SUBSPACE_MULTIPLIER: usize = 20;
// additional guess vectors on top of the requested number of roots
pub const DAVIDSON_EXTRA_GUESS: usize = 3;
// new subspace vectors with a smaller norm after orthogonalization are dropped
pub const ORTHOGONALITY_THRESHOLD: f64 = 1.0e-7;
// denominators of the preconditioner below this value are replaced by 1.0
pub const PRECONDITIONER_CUTOFF: f64 = 1.0e-4;

// EXCHANGE-CORRELATION
// number of sampled spin directions for the multi-collinear kernel, rounded up to 6, 14 or 26
pub const SPIN_SAMPLES: usize = 6;
// relative step of the spin-density scaling that differentiates the kernel along s
pub const SPIN_SCALING_STEP: f64 = 1.0e-4;
// densities below this value do not contribute to the kernel
pub const DENSITY_CUTOFF: f64 = 1.0e-10;
