use crate::error::ResponseError;
use crate::excited_states::orbitals::{OrbitalKind, OrbitalSet, SpinChannel};
use anyhow::{Context, Result};
use ndarray::prelude::*;
use ndarray::Zip;
use ndarray_linalg::c64;
use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fs;
use std::path::Path;

/// Mean-field results as they are exported by the ground state code. The MO coefficients are
/// stored row-wise ([AO][MO]); the imaginary part is absent for real orbitals.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Checkpoint {
    pub kind: OrbitalKind,
    pub n_ao: usize,
    pub channels: Vec<ChannelData>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChannelData {
    pub mo_energy: Vec<f64>,
    pub mo_occ: Vec<f64>,
    pub mo_coeff_real: Vec<Vec<f64>>,
    #[serde(default)]
    pub mo_coeff_imag: Option<Vec<Vec<f64>>>,
}

fn to_matrix(rows: &[Vec<f64>]) -> Result<Array2<f64>, ResponseError> {
    let n_cols: usize = rows.first().map_or(0, |row| row.len());
    if let Some(row) = rows.iter().find(|row| row.len() != n_cols) {
        return Err(ResponseError::shape(n_cols, row.len()));
    }
    Ok(Array2::from_shape_vec((rows.len(), n_cols), rows.concat())?)
}

impl TryFrom<ChannelData> for SpinChannel {
    type Error = ResponseError;

    fn try_from(data: ChannelData) -> Result<Self, Self::Error> {
        let real: Array2<f64> = to_matrix(&data.mo_coeff_real)?;
        let coefficients: Array2<c64> = match data.mo_coeff_imag {
            None => real.mapv(c64::from),
            Some(imag) => {
                let imag: Array2<f64> = to_matrix(&imag)?;
                if imag.dim() != real.dim() {
                    return Err(ResponseError::shape(real.dim(), imag.dim()));
                }
                Zip::from(&real)
                    .and(&imag)
                    .map_collect(|&re, &im| c64::new(re, im))
            }
        };
        Ok(SpinChannel::new(
            Array1::from(data.mo_energy),
            coefficients,
            Array1::from(data.mo_occ),
        ))
    }
}

impl TryFrom<Checkpoint> for OrbitalSet {
    type Error = ResponseError;

    fn try_from(checkpoint: Checkpoint) -> Result<Self, Self::Error> {
        let channels: Vec<SpinChannel> = checkpoint
            .channels
            .into_iter()
            .map(SpinChannel::try_from)
            .collect::<Result<_, _>>()?;
        OrbitalSet::new(checkpoint.kind, checkpoint.n_ao, channels)
    }
}

impl OrbitalSet {
    /// Reads a JSON checkpoint and builds the validated orbital set.
    pub fn from_checkpoint(path: &Path) -> Result<Self> {
        let text: String = fs::read_to_string(path)
            .with_context(|| format!("Unable to read checkpoint {}", path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_str(&text)
            .with_context(|| format!("Unable to parse checkpoint {}", path.display()))?;
        Ok(OrbitalSet::try_from(checkpoint)?)
    }
}
