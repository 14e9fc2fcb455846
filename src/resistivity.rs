//! Resistance and resistivity arithmetic.
//!
//! Pure functions only. The lock-in oscillator output plus a series shunt
//! resistor stand in for a current source; channel 1 reads the voltage drop
//! across the sample, so resistance follows from Ohm's law and resistivity
//! from the sample geometry.

/// Output impedance of the lock-in oscillator, in ohms.
pub const OSC_OUTPUT_IMPEDANCE_OHM: f64 = 50.0;

/// Additional fixed series resistance in the excitation path, in ohms.
pub const WIRING_SERIES_OHM: f64 = 12.0;

/// Total fixed resistance in series with the configured shunt.
pub const FIXED_SERIES_OHM: f64 = OSC_OUTPUT_IMPEDANCE_OHM + WIRING_SERIES_OHM;

/// Values derived from one set of raw lock-in readings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedValues {
    /// Estimated excitation current through the sample, in amperes.
    pub current_a: f64,
    /// Sample resistance, in ohms.
    pub resistance_ohm: f64,
    /// Sample resistivity, in ohm meters.
    pub resistivity_ohm_m: f64,
}

/// Conversion factor from resistance to resistivity for a rectangular
/// sample, `rho = R * A / L`.
///
/// `cs1_mm` and `cs2_mm` are the sides making up the cross-section and
/// `length_mm` is the length of the current path, all in millimeters. The
/// returned factor carries the mm-to-m conversion, so applying it to an
/// ohm value yields ohm meters.
pub fn geometry_factor(cs1_mm: f64, cs2_mm: f64, length_mm: f64) -> f64 {
    let area_m2 = cs1_mm * cs2_mm * 1e-6;
    let length_m = length_mm * 1e-3;
    area_m2 / length_m
}

/// Estimated current sourced through the shunt and sample.
///
/// The denominator must be nonzero; config validation guarantees
/// `shunt_ohm + FIXED_SERIES_OHM != 0` before a run starts.
pub fn current_estimate(src_voltage: f64, shunt_ohm: f64) -> f64 {
    src_voltage / (shunt_ohm + FIXED_SERIES_OHM)
}

/// Derive current, resistance and resistivity from one reading.
///
/// Deterministic and side-effect free. A zero oscillator reading produces
/// an infinite resistance under IEEE semantics rather than an error.
pub fn derive(src_voltage: f64, ch1_magnitude: f64, shunt_ohm: f64, geometry: f64) -> DerivedValues {
    let current_a = current_estimate(src_voltage, shunt_ohm);
    let resistance_ohm = ch1_magnitude / current_a;
    DerivedValues {
        current_a,
        resistance_ohm,
        resistivity_ohm_m: resistance_ohm * geometry,
    }
}
