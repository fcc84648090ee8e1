use crate::error::ResponseError;
use crate::excited_states::utils::orbe_differences;
use ndarray::prelude::*;
use ndarray_linalg::c64;
use serde::{Deserialize, Serialize};

/// Spin structure of the reference orbitals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrbitalKind {
    /// Closed-shell spatial orbitals, every occupied orbital holds two electrons.
    Restricted,
    /// Separate alpha and beta spatial orbitals.
    Unrestricted,
    /// Two-component spinors, the coefficient rows are ordered [alpha AOs, beta AOs].
    Spinor,
}

impl OrbitalKind {
    /// Occupation number of a fully occupied orbital.
    pub fn full_occupation(&self) -> f64 {
        match self {
            OrbitalKind::Restricted => 2.0,
            _ => 1.0,
        }
    }

    fn n_channels(&self) -> usize {
        match self {
            OrbitalKind::Unrestricted => 2,
            _ => 1,
        }
    }
}

/// Orbital energies, coefficients and occupations of one spin channel.
#[derive(Debug, Clone)]
pub struct SpinChannel {
    pub energies: Array1<f64>,
    /// MO coefficients of the shape [n_ao, n_mo] (or [2 n_ao, n_mo] for spinors).
    pub coefficients: Array2<c64>,
    pub occupations: Array1<f64>,
}

impl SpinChannel {
    pub fn new(energies: Array1<f64>, coefficients: Array2<c64>, occupations: Array1<f64>) -> Self {
        Self {
            energies,
            coefficients,
            occupations,
        }
    }

    /// A channel with real MO coefficients.
    pub fn real(energies: Array1<f64>, coefficients: Array2<f64>, occupations: Array1<f64>) -> Self {
        Self::new(energies, coefficients.mapv(c64::from), occupations)
    }

    pub fn n_mo(&self) -> usize {
        self.energies.len()
    }
}

/// The frozen reference state produced by the mean-field solver.
#[derive(Debug, Clone)]
pub struct OrbitalSet {
    kind: OrbitalKind,
    n_ao: usize,
    channels: Vec<SpinChannel>,
}

impl OrbitalSet {
    /// Validates and assembles an orbital set. `n_ao` is the number of spatial basis functions.
    pub fn new(
        kind: OrbitalKind,
        n_ao: usize,
        channels: Vec<SpinChannel>,
    ) -> Result<Self, ResponseError> {
        if channels.len() != kind.n_channels() {
            return Err(ResponseError::InvalidOrbitals(format!(
                "{:?} orbitals need {} spin channel(s), got {}",
                kind,
                kind.n_channels(),
                channels.len()
            )));
        }
        let n_rows: usize = match kind {
            OrbitalKind::Spinor => 2 * n_ao,
            _ => n_ao,
        };
        let full: f64 = kind.full_occupation();
        let mut n_excitations: usize = 0;

        for (idx, channel) in channels.iter().enumerate() {
            let n_mo: usize = channel.n_mo();
            if channel.coefficients.dim() != (n_rows, n_mo) {
                return Err(ResponseError::shape(
                    (n_rows, n_mo),
                    channel.coefficients.dim(),
                ));
            }
            if channel.occupations.len() != n_mo {
                return Err(ResponseError::shape(n_mo, channel.occupations.len()));
            }
            // Only integer occupations are allowed: every orbital is either occupied or virtual.
            if let Some(occ) = channel
                .occupations
                .iter()
                .find(|&&f| f.abs() > 1.0e-8 && (f - full).abs() > 1.0e-8)
            {
                return Err(ResponseError::InvalidOrbitals(format!(
                    "fractional occupation {} in channel {}",
                    occ, idx
                )));
            }
            let n_occ: usize = channel.occupations.iter().filter(|&&f| f > 0.5 * full).count();
            n_excitations += n_occ * (n_mo - n_occ);
        }
        if n_excitations == 0 {
            return Err(ResponseError::InvalidOrbitals(String::from(
                "no occupied-virtual excitation space",
            )));
        }
        Ok(Self {
            kind,
            n_ao,
            channels,
        })
    }

    pub fn restricted(n_ao: usize, channel: SpinChannel) -> Result<Self, ResponseError> {
        Self::new(OrbitalKind::Restricted, n_ao, vec![channel])
    }

    pub fn unrestricted(
        n_ao: usize,
        alpha: SpinChannel,
        beta: SpinChannel,
    ) -> Result<Self, ResponseError> {
        Self::new(OrbitalKind::Unrestricted, n_ao, vec![alpha, beta])
    }

    pub fn spinor(n_ao: usize, channel: SpinChannel) -> Result<Self, ResponseError> {
        Self::new(OrbitalKind::Spinor, n_ao, vec![channel])
    }

    pub fn kind(&self) -> OrbitalKind {
        self.kind
    }

    /// Number of spatial atomic orbitals.
    pub fn n_ao(&self) -> usize {
        self.n_ao
    }

    pub fn channels(&self) -> &[SpinChannel] {
        &self.channels
    }
}

/// Occupied and virtual subspace of one spin channel.
#[derive(Debug, Clone)]
pub struct ChannelPartition {
    pub n_occ: usize,
    pub n_virt: usize,
    /// Offset of this channel inside the flattened amplitude vector.
    pub offset: usize,
    /// Occupied MO coefficients.
    pub orbo: Array2<c64>,
    /// Virtual MO coefficients.
    pub orbv: Array2<c64>,
    /// Conjugate transposes of `orbo` and `orbv`.
    orbo_h: Array2<c64>,
    orbv_h: Array2<c64>,
    /// Orbital energy differences e_a - e_i, flattened in (occ, virt) order.
    pub omega: Array1<f64>,
}

impl ChannelPartition {
    fn new(channel: &SpinChannel, full: f64, offset: usize) -> Self {
        let occ_indices: Vec<usize> = (0..channel.n_mo())
            .filter(|&i| channel.occupations[i] > 0.5 * full)
            .collect();
        let virt_indices: Vec<usize> = (0..channel.n_mo())
            .filter(|&i| channel.occupations[i] <= 0.5 * full)
            .collect();

        let orbo: Array2<c64> = channel.coefficients.select(Axis(1), &occ_indices);
        let orbv: Array2<c64> = channel.coefficients.select(Axis(1), &virt_indices);
        let occ_energies: Array1<f64> = channel.energies.select(Axis(0), &occ_indices);
        let virt_energies: Array1<f64> = channel.energies.select(Axis(0), &virt_indices);

        Self {
            n_occ: occ_indices.len(),
            n_virt: virt_indices.len(),
            offset,
            orbo_h: orbo.t().mapv(|c| c.conj()),
            orbv_h: orbv.t().mapv(|c| c.conj()),
            orbo,
            orbv,
            omega: orbe_differences(occ_energies.view(), virt_energies.view()),
        }
    }

    /// Number of occupied-virtual pairs of this channel.
    pub fn n_ov(&self) -> usize {
        self.n_occ * self.n_virt
    }

    /// Extracts the (n_occ, n_virt) block of this channel from a flattened amplitude vector.
    pub fn block(&self, v: ArrayView1<c64>) -> Result<Array2<c64>, ResponseError> {
        let end: usize = self.offset + self.n_ov();
        if v.len() < end {
            return Err(ResponseError::shape(end, v.len()));
        }
        let segment: ArrayView1<c64> = v.slice(s![self.offset..end]);
        segment
            .to_owned()
            .into_shape((self.n_occ, self.n_virt))
            .map_err(|_| ResponseError::shape((self.n_occ, self.n_virt), segment.len()))
    }

    /// AO transition density D = C_o X C_v^H + C_v Y^T C_o^H of a trial amplitude pair.
    pub fn transition_density(&self, x: ArrayView2<c64>, y: Option<ArrayView2<c64>>) -> Array2<c64> {
        let mut dm: Array2<c64> = self.orbo.dot(&x).dot(&self.orbv_h);
        if let Some(y) = y {
            dm = dm + self.orbv.dot(&y.t()).dot(&self.orbo_h);
        }
        dm
    }

    /// Projection C_o^H V C_v of an AO potential onto the occupied-virtual block.
    pub fn project_ov(&self, v: ArrayView2<c64>) -> Array2<c64> {
        self.orbo_h.dot(&v).dot(&self.orbv)
    }

    /// Projection (C_v^H V C_o)^T of an AO potential onto the virtual-occupied block.
    pub fn project_vo(&self, v: ArrayView2<c64>) -> Array2<c64> {
        self.orbv_h.dot(&v).dot(&self.orbo).reversed_axes()
    }

    /// Density matrix C_o C_o^H of the occupied orbitals (one electron per orbital).
    pub fn reference_density(&self) -> Array2<c64> {
        self.orbo.dot(&self.orbo_h)
    }
}

/// Classification of an `OrbitalSet` into occupied and virtual subspaces per spin channel.
#[derive(Debug, Clone)]
pub struct OrbitalPartition {
    kind: OrbitalKind,
    n_ao: usize,
    channels: Vec<ChannelPartition>,
    dim: usize,
}

impl OrbitalPartition {
    pub fn new(orbitals: &OrbitalSet) -> Self {
        let full: f64 = orbitals.kind().full_occupation();
        let mut offset: usize = 0;
        let mut channels: Vec<ChannelPartition> = Vec::with_capacity(orbitals.channels().len());
        for channel in orbitals.channels().iter() {
            let partition = ChannelPartition::new(channel, full, offset);
            offset += partition.n_ov();
            channels.push(partition);
        }
        Self {
            kind: orbitals.kind(),
            n_ao: orbitals.n_ao(),
            channels,
            dim: offset,
        }
    }

    pub fn kind(&self) -> OrbitalKind {
        self.kind
    }

    pub fn n_ao(&self) -> usize {
        self.n_ao
    }

    /// Length of the flattened amplitude vector.
    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn channels(&self) -> &[ChannelPartition] {
        &self.channels
    }

    /// (n_occ, n_virt) for every spin channel.
    pub fn layout(&self) -> Vec<(usize, usize)> {
        self.channels.iter().map(|c| (c.n_occ, c.n_virt)).collect()
    }

    /// Orbital energy differences of all channels, in the order of the amplitude vector.
    pub fn omega(&self) -> Array1<f64> {
        let mut omega: Array1<f64> = Array1::zeros(self.dim);
        for channel in self.channels.iter() {
            omega
                .slice_mut(s![channel.offset..channel.offset + channel.n_ov()])
                .assign(&channel.omega);
        }
        omega
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn channel(occ: Vec<f64>) -> SpinChannel {
        let n: usize = occ.len();
        let energies: Array1<f64> = Array1::linspace(-1.0, 1.0, n);
        SpinChannel::real(energies, Array2::eye(n), Array1::from(occ))
    }

    #[test]
    fn amplitude_blocks_of_the_channels() {
        let orbitals = OrbitalSet::unrestricted(
            3,
            channel(vec![1.0, 0.0, 0.0]),
            channel(vec![1.0, 1.0, 0.0]),
        )
        .unwrap();
        let partition = OrbitalPartition::new(&orbitals);
        let v: Array1<c64> = (0..partition.dim()).map(|k| c64::from(k as f64)).collect();
        let beta: Array2<c64> = partition.channels()[1].block(v.view()).unwrap();
        assert_eq!(beta, array![[c64::from(2.0)], [c64::from(3.0)]]);
        // a vector that ends inside the beta block
        let short: Array1<c64> = v.slice(s![..3]).to_owned();
        assert!(matches!(
            partition.channels()[1].block(short.view()),
            Err(ResponseError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn partition_of_unrestricted_orbitals() {
        let orbitals = OrbitalSet::unrestricted(
            4,
            channel(vec![1.0, 1.0, 0.0, 0.0]),
            channel(vec![1.0, 0.0, 0.0, 0.0]),
        )
        .unwrap();
        let partition = OrbitalPartition::new(&orbitals);
        assert_eq!(partition.layout(), vec![(2, 2), (1, 3)]);
        assert_eq!(partition.dim(), 7);
        assert_eq!(partition.channels()[1].offset, 4);
        let omega: Array1<f64> = partition.omega();
        // e_2 - e_0 for the first pair of the alpha channel
        assert!((omega[0] - (1.0 / 3.0 + 1.0)).abs() < 1e-12);
        assert!(omega.iter().all(|&x| x > 0.0));
    }

    #[test]
    fn fractional_occupations_are_rejected() {
        let result = OrbitalSet::restricted(3, channel(vec![2.0, 1.0, 0.0]));
        assert!(matches!(result, Err(ResponseError::InvalidOrbitals(_))));
    }

    #[test]
    fn spinor_coefficients_need_two_components() {
        let result = OrbitalSet::spinor(4, channel(vec![1.0, 1.0, 0.0, 0.0]));
        assert!(matches!(result, Err(ResponseError::ShapeMismatch { .. })));
    }

    #[test]
    fn transition_density_of_a_unit_excitation() {
        let orbitals = OrbitalSet::restricted(3, channel(vec![2.0, 0.0, 0.0])).unwrap();
        let partition = OrbitalPartition::new(&orbitals);
        let ch: &ChannelPartition = &partition.channels()[0];
        let mut x: Array2<c64> = Array2::zeros((1, 2));
        x[[0, 1]] = c64::new(1.0, 0.0);
        let dm: Array2<c64> = ch.transition_density(x.view(), None);
        // |0><2| in the AO basis since the orbitals are the unit vectors
        assert_eq!(dm[[0, 2]], c64::new(1.0, 0.0));
        assert_eq!(dm.iter().filter(|c| c.norm() > 0.0).count(), 1);
        assert_eq!(ch.project_ov(dm.view())[[0, 0]], c64::new(0.0, 0.0));
        assert_eq!(ch.project_ov(dm.view())[[0, 1]], c64::new(1.0, 0.0));
        assert_eq!(ch.project_vo(dm.t().view())[[0, 1]], c64::new(1.0, 0.0));
    }
}
