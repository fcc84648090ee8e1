use crate::constants::HARTREE_TO_EV;
use crate::excited_states::orbitals::OrbitalPartition;
use crate::excited_states::response_matrix::ResponseBlock;
use crate::excited_states::roots::Root;
use anyhow::{Context, Result};
use log::info;
use ndarray::prelude::*;
use ndarray_linalg::c64;
use ndarray_npy::write_npy;
use std::cmp::Ordering;
use std::path::Path;

/// Number of amplitudes that are printed for every root.
const N_AMPLITUDES: usize = 3;

/// Maps a flattened amplitude index to (spin channel, occupied orbital, virtual orbital).
fn excitation_label(layout: &[(usize, usize)], mut index: usize) -> (usize, usize, usize) {
    for (channel, &(n_occ, n_virt)) in layout.iter().enumerate() {
        if index < n_occ * n_virt {
            return (channel, index / n_virt, n_occ + index % n_virt);
        }
        index -= n_occ * n_virt;
    }
    (layout.len(), 0, 0)
}

/// The largest excitation amplitudes |X_ia|^2 of a root.
fn dominant_amplitudes(x: ArrayView1<c64>, n: usize) -> Vec<(usize, f64)> {
    let mut weights: Vec<(usize, f64)> = x.iter().map(|c| c.norm_sqr()).enumerate().collect();
    weights.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    weights.truncate(n);
    weights
}

pub fn print_roots(roots: &[Root], partition: &OrbitalPartition) {
    let layout: Vec<(usize, usize)> = partition.layout();
    info!("{:^80}", "");
    info!("{: ^80}", "Excitation Energies");
    info!("{:-^80}", "");
    info!(
        "{: <7}{: >16}{: >12}   {: <40}",
        "Root", "Energy [Eh]", "[eV]", "Largest amplitudes |X|^2 (spin: occ -> virt)"
    );
    info!("{:-^80}", "");
    for (n, root) in roots.iter().enumerate() {
        let labels: Vec<String> = dominant_amplitudes(root.amplitude.x.view(), N_AMPLITUDES)
            .into_iter()
            .map(|(k, weight)| {
                let (channel, i, a) = excitation_label(&layout, k);
                format!("{}: {} -> {} ({:.3})", channel, i, a, weight)
            })
            .collect();
        info!(
            "{: <7}{: >16.10}{: >12.6}   {}",
            n + 1,
            root.energy,
            root.energy * HARTREE_TO_EV,
            labels.join(", ")
        );
    }
    info!("{:-^80}", "");
}

/// Writes the excitation energies in eV.
pub fn write_energies(roots: &[Root], path: &Path) -> Result<()> {
    let energies: Array1<f64> = roots.iter().map(|root| root.energy * HARTREE_TO_EV).collect();
    write_npy(path, &energies)
        .with_context(|| format!("Unable to write the energies to {}", path.display()))
}

/// Real and imaginary part of a complex matrix, stacked along the first axis.
fn split_complex(m: &Array2<c64>) -> Array3<f64> {
    let mut parts: Array3<f64> = Array3::zeros((2, m.nrows(), m.ncols()));
    parts.index_axis_mut(Axis(0), 0).assign(&m.mapv(|c| c.re));
    parts.index_axis_mut(Axis(0), 1).assign(&m.mapv(|c| c.im));
    parts
}

/// Writes A (and B, if present) as `a_matrix.npy` and `b_matrix.npy` into `directory`.
pub fn write_response_matrices(block: &ResponseBlock, directory: &Path) -> Result<()> {
    let a_path = directory.join("a_matrix.npy");
    write_npy(&a_path, &split_complex(block.a()))
        .with_context(|| format!("Unable to write {}", a_path.display()))?;
    if let Some(b) = block.b() {
        let b_path = directory.join("b_matrix.npy");
        write_npy(&b_path, &split_complex(b))
            .with_context(|| format!("Unable to write {}", b_path.display()))?;
    }
    Ok(())
}
