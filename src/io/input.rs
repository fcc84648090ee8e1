use crate::excited_states::kernel::{Collinearity, DenseEri, XcFunctional, XcGrid, XcInput};
use crate::excited_states::orbitals::OrbitalSet;
use crate::io::Configuration;
use anyhow::{Context, Result};
use log::info;
use ndarray::prelude::*;
use ndarray_npy::read_npy;
use std::fs;
use std::path::Path;

/// Reads the configuration file. If it does not exist, the program initializes the default
/// settings and writes them to the file so that the user can see all the used options.
pub fn read_input(config_file_path: &Path) -> Result<Configuration> {
    let config_string: String = if config_file_path.exists() {
        fs::read_to_string(config_file_path)
            .with_context(|| format!("Unable to read config file {}", config_file_path.display()))?
    } else {
        String::from("")
    };
    // Load the configuration.
    let config: Configuration =
        toml::from_str(&config_string).context("Unable to parse the config file")?;
    if !config_file_path.exists() {
        let config_string: String =
            toml::to_string(&config).context("Unable to serialize the configuration")?;
        fs::write(config_file_path, config_string).context("Unable to write config file")?;
    }
    Ok(config)
}

/// Reference data of one response calculation: the orbitals, the electron repulsion integrals
/// and, for density functionals, the quadrature grid together with the functional.
pub struct Calculation {
    pub orbitals: OrbitalSet,
    pub eri: DenseEri,
    pub grid: Option<XcGrid>,
    pub functional: Option<Box<dyn XcFunctional>>,
}

impl Calculation {
    /// The XC collaborators for the kernel evaluator, None for Hartree-Fock.
    pub fn xc_input(&self, collinearity: Collinearity) -> Option<XcInput<'_>> {
        match (&self.functional, &self.grid) {
            (Some(functional), Some(grid)) => Some(XcInput {
                functional: functional.as_ref(),
                grid,
                collinearity,
            }),
            _ => None,
        }
    }
}

/// Loads the checkpoint, the ERI tensor and, if a functional is configured, the grid from
/// `directory`.
pub fn load_calculation(directory: &Path, config: &Configuration) -> Result<Calculation> {
    let orbitals: OrbitalSet = OrbitalSet::from_checkpoint(&directory.join(&config.input.checkpoint))?;
    info!(
        "{:?} reference with {} AOs read from {}",
        orbitals.kind(),
        orbitals.n_ao(),
        config.input.checkpoint
    );

    let eri_path = directory.join(&config.input.eri);
    let eri: Array4<f64> = read_npy(&eri_path)
        .with_context(|| format!("Unable to read the integrals {}", eri_path.display()))?;
    let eri: DenseEri = DenseEri::new(eri)?;

    let functional: Option<Box<dyn XcFunctional>> = config.xc.functional();
    let grid: Option<XcGrid> = match functional {
        None => None,
        Some(_) => {
            let weights_path = directory.join(&config.input.grid_weights);
            let weights: Array1<f64> = read_npy(&weights_path).with_context(|| {
                format!("Unable to read the grid weights {}", weights_path.display())
            })?;
            let ao_path = directory.join(&config.input.grid_ao);
            let ao: Array3<f64> = read_npy(&ao_path).with_context(|| {
                format!("Unable to read the AO values {}", ao_path.display())
            })?;
            info!("quadrature grid with {} points", weights.len());
            Some(XcGrid::new(weights, ao)?)
        }
    };
    Ok(Calculation {
        orbitals,
        eri,
        grid,
        functional,
    })
}
