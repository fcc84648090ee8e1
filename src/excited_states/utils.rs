use ndarray::prelude::*;

/// The differences between the virtual and occupied orbitals are computed. The quantity to be
/// computed can be either the energies of the orbitals sets or e.g. the occupation. The length
/// of the output Array will be the `len(occ_quant) x len(virt_quant)`, ordered with the
/// occupied index running slowest.
pub fn orbe_differences(occ_quant: ArrayView1<f64>, virt_quant: ArrayView1<f64>) -> Array1<f64> {
    occ_quant
        .iter()
        .flat_map(|&occ| virt_quant.iter().map(move |&virt| virt - occ))
        .collect()
}

/// Fingerprint sum_k a_k cos(k) of the flattened array, used to compare against published
/// reference values.
pub fn fingerprint<D: Dimension>(a: ArrayView<f64, D>) -> f64 {
    a.iter()
        .enumerate()
        .map(|(k, value)| value * (k as f64).cos())
        .sum()
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn orbital_energy_differences() {
        let occ: Array1<f64> = array![-1.0, -0.5];
        let virt: Array1<f64> = array![0.25, 0.75, 1.0];
        let omega: Array1<f64> = orbe_differences(occ.view(), virt.view());
        assert_eq!(omega, array![1.25, 1.75, 2.0, 0.75, 1.25, 1.5]);
    }

    #[test]
    fn fingerprint_is_a_cosine_weighted_sum() {
        let a: Array1<f64> = array![1.0, 2.0, 3.0];
        let reference: f64 = 1.0 + 2.0 * 1.0_f64.cos() + 3.0 * 2.0_f64.cos();
        assert_abs_diff_eq!(fingerprint(a.view()), reference, epsilon = 1e-14);
    }
}
