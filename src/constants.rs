/// Conversion factor from Hartree to electron volt.
pub const HARTREE_TO_EV: f64 = 27.2114;

/// Slater exchange prefactor -(3/4)(3/pi)^(1/3).
pub const SLATER_CX: f64 = -0.738_558_766_382_022_4;
