use crate::equilibrium::StrandFreeEnergies;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "forward"),
            Strand::Reverse => write!(f, "reverse"),
        }
    }
}

/// User-facing quality label; ordered best first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QualityTier {
    Excellent,
    Good,
    Acceptable,
    Marginal,
    Poor,
}

impl QualityTier {
    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Excellent => "excellent",
            QualityTier::Good => "good",
            QualityTier::Acceptable => "acceptable",
            QualityTier::Marginal => "marginal",
            QualityTier::Poor => "poor",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Warning {
    ExtremeLength,
    HomopolymerRun,
    SevereHomopolymerRun,
    NoGcClamp,
    GQuadruplexMotif,
    StrongHairpin,
    StrongDimer,
    OffTargetBinding,
    TmDifference,
    HardTmDifference,
    LowEfficiency,
}

impl Warning {
    /// Critical warnings subtract a fixed penalty from the effective score.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Warning::ExtremeLength | Warning::SevereHomopolymerRun | Warning::HardTmDifference
        )
    }
}

/// Raw penalty terms, each already multiplied by its weight.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PenaltyBreakdown {
    pub tm: f64,
    pub tm_diff: f64,
    pub gc: f64,
    pub len: f64,
    pub dg: f64,
    pub off_target: f64,
}

impl PenaltyBreakdown {
    pub fn total(&self) -> f64 {
        self.tm + self.tm_diff + self.gc + self.len + self.dg + self.off_target
    }
}

/// Fraction of a strand lost to each competing pool, each in [0,1].
///
/// Diagnostic only: together with the efficiency these need not sum to 1.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumLosses {
    pub hairpin: f64,
    pub homodimer: f64,
    pub heterodimer: f64,
    pub off_target: f64,
    pub free: f64,
}

/// Normalized per-feature scores in [0,1]; pair-only terms stay `None`
/// until a partner is known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureScores {
    pub tm: f64,
    pub gc: f64,
    pub length: f64,
    pub terminal_dg: f64,
    pub hairpin: f64,
    pub homodimer: f64,
    pub off_target: f64,
    pub g_quadruplex: f64,
    pub three_prime: f64,
    pub heterodimer: Option<f64>,
    pub tm_diff: Option<f64>,
    pub efficiency: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scoring {
    pub penalty: PenaltyBreakdown,
    pub efficiency: Option<f64>,
    pub losses: Option<EquilibriumLosses>,
    pub features: FeatureScores,
    pub composite: f64,
    pub effective: f64,
    pub tier: QualityTier,
    pub warnings: Vec<Warning>,
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            penalty: PenaltyBreakdown::default(),
            efficiency: None,
            losses: None,
            features: FeatureScores::default(),
            composite: 0.0,
            effective: 0.0,
            tier: QualityTier::Poor,
            warnings: vec![],
        }
    }
}

impl Scoring {
    pub fn critical_count(&self) -> usize {
        self.warnings.iter().filter(|w| w.is_critical()).count()
    }
}

/// Structure free energies at 37 °C, the reference for scoring curves.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimerEnergies {
    pub hairpin: f64,
    pub homodimer: f64,
    /// Most stable off-target site, measured at the annealing temperature.
    pub off_target: f64,
}

/// Everything measured for a primer before it is scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimerMeasurements {
    pub tm: f64,
    pub gc: f64,
    /// 3′-terminal ΔG.
    pub dg: f64,
    pub off_target_count: usize,
    pub energies: PrimerEnergies,
    /// Competitor energies at the annealing temperature.
    pub binding: StrandFreeEnergies,
}

/// An immutable scored primer. Updates produce new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Primer {
    seq: String,
    tail: String,
    len: usize,
    tm: f64,
    gc: f64,
    dg: f64,
    strand: Strand,
    position: Option<isize>,
    off_target_count: usize,
    energies: PrimerEnergies,
    binding: StrandFreeEnergies,
    scoring: Scoring,
}

impl Primer {
    /// `anneal` is the template-matching part; `tail` is a fixed 5′ addition.
    pub fn new(
        anneal: &[u8],
        tail: &[u8],
        strand: Strand,
        position: Option<isize>,
        measured: PrimerMeasurements,
    ) -> Self {
        let mut seq = String::from_utf8_lossy(tail).into_owned();
        seq.push_str(&String::from_utf8_lossy(anneal));
        Self {
            seq,
            tail: String::from_utf8_lossy(tail).into_owned(),
            len: anneal.len() + tail.len(),
            tm: measured.tm,
            gc: measured.gc,
            dg: measured.dg,
            strand,
            position,
            off_target_count: measured.off_target_count,
            energies: measured.energies,
            binding: measured.binding,
            scoring: Scoring::default(),
        }
    }

    pub fn with_scoring(&self, scoring: Scoring) -> Self {
        Self {
            scoring,
            ..self.clone()
        }
    }

    /// Full 5′→3′ sequence including any tail.
    pub fn seq(&self) -> &str {
        &self.seq
    }

    pub fn anneal(&self) -> &str {
        &self.seq[self.tail.len()..]
    }

    pub fn tail(&self) -> &str {
        &self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn tm(&self) -> f64 {
        self.tm
    }

    pub fn gc(&self) -> f64 {
        self.gc
    }

    /// 3′-terminal ΔG.
    pub fn dg(&self) -> f64 {
        self.dg
    }

    pub fn strand(&self) -> Strand {
        self.strand
    }

    /// For forward primers the template position of the 5′ base; for
    /// reverse primers the exclusive top-strand end of the binding site.
    pub fn position(&self) -> Option<isize> {
        self.position
    }

    pub fn off_target_count(&self) -> usize {
        self.off_target_count
    }

    pub fn energies(&self) -> &PrimerEnergies {
        &self.energies
    }

    pub fn binding(&self) -> &StrandFreeEnergies {
        &self.binding
    }

    /// Most negative of hairpin and homodimer ΔG at 37 °C.
    pub fn worst_structure_dg(&self) -> f64 {
        self.energies.hairpin.min(self.energies.homodimer).min(0.0)
    }

    pub fn scoring(&self) -> &Scoring {
        &self.scoring
    }
}

impl fmt::Display for Primer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} (Tm {:.1}°C, GC {:.0}%, {})",
            self.strand,
            self.seq,
            self.tm,
            self.gc * 100.0,
            self.scoring.tier.label()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn primer() -> Primer {
        Primer::new(
            b"ACGTACGTACGTACGTAC",
            b"GGATCC",
            Strand::Forward,
            Some(0),
            PrimerMeasurements {
                tm: 55.0,
                gc: 0.5,
                dg: -6.0,
                ..PrimerMeasurements::default()
            },
        )
    }

    #[test]
    fn test_tail_and_anneal() {
        let p = primer();
        assert_eq!(p.seq(), "GGATCCACGTACGTACGTACGTAC");
        assert_eq!(p.anneal(), "ACGTACGTACGTACGTAC");
        assert_eq!(p.len(), 24);
    }

    #[test]
    fn test_with_scoring_leaves_original() {
        let p = primer();
        let scored = p.with_scoring(Scoring {
            composite: 80.0,
            tier: QualityTier::Good,
            ..Scoring::default()
        });
        assert_eq!(p.scoring().composite, 0.0);
        assert_eq!(scored.scoring().composite, 80.0);
        assert_eq!(scored.seq(), p.seq());
    }

    #[test]
    fn test_critical_warnings() {
        let s = Scoring {
            warnings: vec![Warning::ExtremeLength, Warning::NoGcClamp, Warning::HardTmDifference],
            ..Scoring::default()
        };
        assert_eq!(s.critical_count(), 2);
        assert!(QualityTier::Excellent < QualityTier::Poor);
    }
}
