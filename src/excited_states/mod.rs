pub mod eigen;
pub mod kernel;
pub mod orbitals;
pub mod product;
pub mod response_matrix;
pub mod roots;
pub mod solvers;
mod utils;

pub use eigen::{
    diagonalize_tda, diagonalize_tddft, EigenSolver, ResponseMode, SolverPath, SolverSettings,
};
pub use kernel::{
    Collinearity, KernelKind, ResponseKernelEvaluator, SlaterExchange, XcFunctional, XcGrid,
    XcInput,
};
pub use orbitals::{OrbitalKind, OrbitalPartition, OrbitalSet, SpinChannel};
pub use product::OperatorProduct;
pub use response_matrix::{ResponseBlock, ResponseMatrixBuilder};
pub use roots::{Candidate, ExcitationAmplitude, Root, RootFilter};
pub use utils::*;
