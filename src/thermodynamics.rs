//! Nearest-neighbor duplex thermodynamics.
//!
//! Parameters are the unified DNA/DNA set of SantaLucia & Hicks (2004),
//! Annu. Rev. Biophys. Biomol. Struct. 33:415-440. Enthalpies are in
//! kcal/mol, entropies in cal/(K·mol). Salt handling follows the
//! SantaLucia (1998) entropy correction with the von Ahsen et al. (2001)
//! sodium equivalent for Mg²⁺ and dNTPs.

use crate::dna_sequence::{normalize_dna, reverse_complement};
use crate::error::PrimerResult;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

/// Gas constant in cal/(K·mol).
pub const R_CAL: f64 = 1.987;
pub const KELVIN: f64 = 273.15;
/// Reference temperature of tabulated free energies.
pub const REFERENCE_TEMPERATURE: f64 = 37.0;

pub const INITIATION: (f64, f64) = (0.2, -5.7);
pub const TERMINAL_AT: (f64, f64) = (2.2, 6.9);
pub const SYMMETRY: (f64, f64) = (0.0, -1.4);

/// Empirical upward shift applied for proofreading polymerase buffers.
const HIGH_FIDELITY_TM_SHIFT: f64 = 3.0;

lazy_static! {
    // Indexed [5' base][3' base] on the top strand.
    static ref NN_TABLE: [[(f64, f64); 4]; 4] = {
        let raw: [(&[u8; 2], (f64, f64)); 10] = [
            (b"AA", (-7.6, -21.3)),
            (b"AT", (-7.2, -20.4)),
            (b"TA", (-7.2, -21.3)),
            (b"CA", (-8.5, -22.7)),
            (b"GT", (-8.4, -22.4)),
            (b"CT", (-7.8, -21.0)),
            (b"GA", (-8.2, -22.2)),
            (b"CG", (-10.6, -27.2)),
            (b"GC", (-9.8, -24.4)),
            (b"GG", (-8.0, -19.9)),
        ];
        let mut table = [[(0.0, 0.0); 4]; 4];
        for (pair, value) in raw {
            table[base_index(pair[0])][base_index(pair[1])] = value;
            // Same stack read from the other strand.
            let rc = reverse_complement(pair);
            table[base_index(rc[0])][base_index(rc[1])] = value;
        }
        table
    };
}

#[inline(always)]
pub fn base_index(base: u8) -> usize {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        _ => 3,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polymerase {
    Generic,
    HighFidelity,
}

/// Reaction conditions shared by every thermodynamic calculation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermoConditions {
    /// Monovalent cation concentration (mM).
    pub monovalent_mm: f64,
    /// Mg²⁺ concentration (mM).
    pub magnesium_mm: f64,
    /// Total dNTP concentration (mM).
    pub dntp_mm: f64,
    /// Concentration of each primer (nM).
    pub primer_nm: f64,
    /// Template concentration (nM).
    pub template_nm: f64,
    pub polymerase: Polymerase,
}

impl Default for ThermoConditions {
    fn default() -> Self {
        Self {
            monovalent_mm: 50.0,
            magnesium_mm: 1.5,
            dntp_mm: 0.2,
            primer_nm: 500.0,
            template_nm: 1.0,
            polymerase: Polymerase::Generic,
        }
    }
}

impl ThermoConditions {
    /// Sodium-equivalent concentration in mol/L.
    pub fn sodium_equivalent(&self) -> f64 {
        let free_mg = (self.magnesium_mm - self.dntp_mm).max(0.0);
        let na_eq_mm = self.monovalent_mm + 120.0 * free_mg.sqrt();
        (na_eq_mm / 1000.0).max(1e-4)
    }

    /// Entropy correction per nearest-neighbor stack, cal/(K·mol).
    pub fn salt_entropy_per_stack(&self) -> f64 {
        0.368 * self.sodium_equivalent().ln()
    }

    pub fn primer_molar(&self) -> f64 {
        self.primer_nm * 1e-9
    }

    pub fn template_molar(&self) -> f64 {
        self.template_nm * 1e-9
    }
}

#[inline(always)]
pub fn stack(a: u8, b: u8) -> (f64, f64) {
    NN_TABLE[base_index(a)][base_index(b)]
}

#[inline(always)]
pub fn to_kelvin(temperature_c: f64) -> f64 {
    temperature_c + KELVIN
}

/// ΔG (kcal/mol) from ΔH (kcal/mol) and ΔS (cal/(K·mol)) at a Celsius temperature.
#[inline(always)]
pub fn free_energy_at(dh: f64, ds: f64, temperature_c: f64) -> f64 {
    dh - to_kelvin(temperature_c) * ds / 1000.0
}

/// ΔG of a single salt-corrected stack at a Celsius temperature.
#[inline(always)]
pub fn stack_free_energy(a: u8, b: u8, temperature_c: f64, conditions: &ThermoConditions) -> f64 {
    let (dh, ds) = stack(a, b);
    free_energy_at(dh, ds + conditions.salt_entropy_per_stack(), temperature_c)
}

/// Terminal A/T penalty contribution for one duplex end.
#[inline(always)]
pub fn terminal_penalty(base: u8) -> (f64, f64) {
    match base {
        b'A' | b'T' => TERMINAL_AT,
        _ => (0.0, 0.0),
    }
}

pub fn is_self_complementary(sequence: &[u8]) -> bool {
    !sequence.is_empty() && reverse_complement(sequence) == sequence
}

/// Adds initiation, terminal and symmetry terms plus the salt correction to
/// raw stack sums. Shared by direct evaluation and the candidate cache so
/// both paths agree.
pub fn finish_duplex(
    stack_dh: f64,
    stack_ds: f64,
    first: u8,
    last: u8,
    length: usize,
    self_complementary: bool,
    conditions: &ThermoConditions,
) -> (f64, f64) {
    let mut dh = stack_dh + INITIATION.0;
    let mut ds = stack_ds + INITIATION.1;
    for end in [first, last] {
        let (h, s) = terminal_penalty(end);
        dh += h;
        ds += s;
    }
    if self_complementary {
        dh += SYMMETRY.0;
        ds += SYMMETRY.1;
    }
    ds += conditions.salt_entropy_per_stack() * length.saturating_sub(1) as f64;
    (dh, ds)
}

/// ΔH and ΔS of a sequence paired with its perfect complement.
pub fn duplex_enthalpy_entropy(sequence: &[u8], conditions: &ThermoConditions) -> (f64, f64) {
    let (dh, ds) = sequence
        .windows(2)
        .map(|w| stack(w[0], w[1]))
        .fold((0.0, 0.0), |(h, s), (dh, ds)| (h + dh, s + ds));
    finish_duplex(
        dh,
        ds,
        sequence[0],
        sequence[sequence.len() - 1],
        sequence.len(),
        is_self_complementary(sequence),
        conditions,
    )
}

/// Tm (°C) from duplex ΔH/ΔS, the strand concentration and symmetry.
pub fn tm_from_parameters(
    dh: f64,
    ds: f64,
    self_complementary: bool,
    conditions: &ThermoConditions,
) -> f64 {
    let x = if self_complementary { 1.0 } else { 4.0 };
    let ct = conditions.primer_molar().max(1e-15);
    let denominator = ds + R_CAL * (ct / x).ln();
    if denominator >= 0.0 {
        return 0.0;
    }
    let tm = 1000.0 * dh / denominator - KELVIN;
    match conditions.polymerase {
        Polymerase::Generic => tm,
        Polymerase::HighFidelity => tm + HIGH_FIDELITY_TM_SHIFT,
    }
}

/// Melting temperature (°C) of a validated, uppercase sequence.
/// Returns 0.0 for sequences shorter than two bases.
pub fn melting_temperature(sequence: &[u8], conditions: &ThermoConditions) -> f64 {
    if sequence.len() < 2 {
        return 0.0;
    }
    let (dh, ds) = duplex_enthalpy_entropy(sequence, conditions);
    tm_from_parameters(dh, ds, is_self_complementary(sequence), conditions)
}

/// Validating wrapper over [`melting_temperature`] for raw text input.
pub fn melting_temperature_str(sequence: &str, conditions: &ThermoConditions) -> PrimerResult<f64> {
    let seq = normalize_dna(sequence)?;
    Ok(melting_temperature(&seq, conditions))
}

/// ΔG (kcal/mol) of a sequence bound to its perfect complement.
pub fn duplex_free_energy(sequence: &[u8], temperature_c: f64, conditions: &ThermoConditions) -> f64 {
    if sequence.len() < 2 {
        return 0.0;
    }
    let (dh, ds) = duplex_enthalpy_entropy(sequence, conditions);
    free_energy_at(dh, ds, temperature_c)
}

/// 3′-end stability: duplex ΔG of the last `TERMINAL_WINDOW` bases at 37 °C.
pub const TERMINAL_WINDOW: usize = 5;

pub fn terminal_free_energy(sequence: &[u8], conditions: &ThermoConditions) -> f64 {
    let start = sequence.len().saturating_sub(TERMINAL_WINDOW);
    duplex_free_energy(&sequence[start..], REFERENCE_TEMPERATURE, conditions)
}

/// Association constant (M⁻¹, or dimensionless for unimolecular folds)
/// from ΔG. Non-negative ΔG means no stable structure and yields zero.
pub fn association_constant(dg: f64, temperature_c: f64) -> f64 {
    if dg >= 0.0 {
        return 0.0;
    }
    let exponent = -dg * 1000.0 / (R_CAL * to_kelvin(temperature_c));
    exponent.min(700.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond() -> ThermoConditions {
        ThermoConditions::default()
    }

    #[test]
    fn test_nn_table_symmetry() {
        assert_eq!(stack(b'A', b'A'), stack(b'T', b'T'));
        assert_eq!(stack(b'C', b'A'), stack(b'T', b'G'));
        assert_eq!(stack(b'G', b'T'), stack(b'A', b'C'));
        assert_eq!(stack(b'C', b'C'), stack(b'G', b'G'));
        assert_eq!(stack(b'C', b'G'), (-10.6, -27.2));
    }

    #[test]
    fn test_tm_typical_primer() {
        let tm = melting_temperature(b"AGCGGATAACAATTTCACACAGGA", &cond());
        assert!(tm > 50.0 && tm < 70.0, "tm = {tm}");
    }

    #[test]
    fn test_tm_gc_rich_is_higher() {
        let at = melting_temperature(b"ATATTAATATTTAATATAAT", &cond());
        let gc = melting_temperature(b"GCGGCCGCGGCGCCGGCGCC", &cond());
        assert!(gc > at);
    }

    #[test]
    fn test_tm_salt_dependence() {
        let low = ThermoConditions {
            monovalent_mm: 10.0,
            magnesium_mm: 0.0,
            ..cond()
        };
        let high = ThermoConditions {
            monovalent_mm: 500.0,
            ..cond()
        };
        let seq = b"ACGTTGCAAGCTTGCAGGTA";
        assert!(melting_temperature(seq, &high) > melting_temperature(seq, &low));
    }

    #[test]
    fn test_tm_high_fidelity_shift() {
        let seq = b"ACGTTGCAAGCTTGCAGGTA";
        let generic = melting_temperature(seq, &cond());
        let hf = melting_temperature(
            seq,
            &ThermoConditions {
                polymerase: Polymerase::HighFidelity,
                ..cond()
            },
        );
        assert!((hf - generic - HIGH_FIDELITY_TM_SHIFT).abs() < 1e-9);
    }

    #[test]
    fn test_tm_short_sequence() {
        assert_eq!(melting_temperature(b"A", &cond()), 0.0);
        assert!(melting_temperature_str("ACGX", &cond()).is_err());
    }

    #[test]
    fn test_duplex_gc_more_stable() {
        let at = duplex_free_energy(b"ATTATAATTAAT", 37.0, &cond());
        let gc = duplex_free_energy(b"GCCGCGGCGGCC", 37.0, &cond());
        assert!(gc < at);
        assert!(at < 0.0);
    }

    #[test]
    fn test_self_complementary() {
        assert!(is_self_complementary(b"GAATTC"));
        assert!(!is_self_complementary(b"GAATTA"));
    }

    #[test]
    fn test_association_constant() {
        assert_eq!(association_constant(0.0, 60.0), 0.0);
        assert_eq!(association_constant(1.5, 60.0), 0.0);
        assert!(association_constant(-10.0, 60.0) > association_constant(-5.0, 60.0));
    }

    #[test]
    fn test_terminal_free_energy() {
        let gc_end = terminal_free_energy(b"AAAAAAAAAAGCGCG", &cond());
        let at_end = terminal_free_energy(b"GGGGGGGGGGATATA", &cond());
        assert!(gc_end < at_end);
    }
}
