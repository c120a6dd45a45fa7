//! Composite scoring.
//!
//! Raw physical quantities pass through the per-mode piecewise curves of
//! [`ScoringPreset`] and are combined by fixed weights into a 0–100
//! composite. The effective score additionally subtracts a fixed amount per
//! critical warning, and the quality tier is read off the effective score.

use crate::dna_sequence::{gc_fraction, longest_homopolymer};
use crate::equilibrium::{EquilibriumResult, efficiency_to_score};
use crate::options::ScoringOptions;
use crate::primer::{EquilibriumLosses, FeatureScores, PenaltyBreakdown, Primer, QualityTier, Scoring, Warning};
use crate::scoring_presets::{PiecewiseCurve, ScoringPreset};
use crate::secondary_structure::OffTargetSite;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Points removed from the effective score per critical warning.
pub const CRITICAL_WARNING_PENALTY: f64 = 15.0;

pub const EXTREME_LENGTH_MIN: usize = 15;
pub const EXTREME_LENGTH_MAX: usize = 35;
pub const HOMOPOLYMER_RUN: usize = 5;
pub const SEVERE_HOMOPOLYMER_RUN: usize = 7;
pub const STRONG_HAIRPIN_DG: f64 = -6.0;
pub const STRONG_DIMER_DG: f64 = -10.0;
pub const TM_DIFFERENCE_WARNING: f64 = 3.0;
pub const HARD_TM_DIFFERENCE: f64 = 5.0;
pub const LOW_EFFICIENCY: f64 = 0.5;

const GC_CLAMP_WINDOW: usize = 5;
/// Off-target sites this close to the target ΔG, or with a 3′ identity run
/// this long, count as strong competitors.
const STRONG_OFF_TARGET_RATIO: f64 = 0.8;
const STRONG_OFF_TARGET_RUN: usize = 12;

lazy_static! {
    static ref G_QUADRUPLEX: Regex =
        Regex::new("G{3,}[ACGT]{1,7}G{3,}[ACGT]{1,7}G{3,}[ACGT]{1,7}G{3,}").expect("valid regex");
    static ref C_QUADRUPLEX: Regex =
        Regex::new("C{3,}[ACGT]{1,7}C{3,}[ACGT]{1,7}C{3,}[ACGT]{1,7}C{3,}").expect("valid regex");
    static ref G_RUN: Regex = Regex::new("G{4,}|C{4,}").expect("valid regex");
}

/// Composite weights, calibrated against validated primer pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompositeWeights {
    pub tm: f64,
    pub gc: f64,
    pub length: f64,
    pub terminal_dg: f64,
    pub hairpin: f64,
    pub homodimer: f64,
    pub heterodimer: f64,
    pub off_target: f64,
    pub g_quadruplex: f64,
    pub three_prime: f64,
    pub tm_diff: f64,
    pub efficiency: f64,
}

pub const WEIGHTS: CompositeWeights = CompositeWeights {
    tm: 0.15,
    gc: 0.08,
    length: 0.05,
    terminal_dg: 0.08,
    hairpin: 0.12,
    homodimer: 0.10,
    heterodimer: 0.10,
    off_target: 0.12,
    g_quadruplex: 0.05,
    three_prime: 0.07,
    tm_diff: 0.08,
    efficiency: 0.10,
};

pub fn tier_for_score(score: f64) -> QualityTier {
    match score {
        s if s >= 85.0 => QualityTier::Excellent,
        s if s >= 70.0 => QualityTier::Good,
        s if s >= 55.0 => QualityTier::Acceptable,
        s if s >= 40.0 => QualityTier::Marginal,
        _ => QualityTier::Poor,
    }
}

/// 0.1 for a full four-tract motif, 0.6 for a bare G₄/C₄ run, 1 otherwise.
pub fn g_quadruplex_score(sequence: &[u8]) -> f64 {
    let text = String::from_utf8_lossy(sequence);
    if G_QUADRUPLEX.is_match(&text) || C_QUADRUPLEX.is_match(&text) {
        0.1
    } else if G_RUN.is_match(&text) {
        0.6
    } else {
        1.0
    }
}

/// Rewards one to three G/C in the last five bases; a 3′ A/T trims it.
pub fn three_prime_score(sequence: &[u8]) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let tail = &sequence[sequence.len().saturating_sub(GC_CLAMP_WINDOW)..];
    let gc = tail.iter().filter(|&&b| b == b'G' || b == b'C').count();
    let base: f64 = match gc {
        0 => 0.4,
        1..=3 => 1.0,
        4 => 0.7,
        _ => 0.4,
    };
    match sequence.last() {
        Some(b'A' | b'T') => base.min(0.85),
        _ => base,
    }
}

pub fn has_gc_clamp(sequence: &[u8]) -> bool {
    sequence
        .iter()
        .rev()
        .take(GC_CLAMP_WINDOW)
        .any(|&b| b == b'G' || b == b'C')
}

/// Classifies off-target sites against the intended target ΔG.
pub fn off_target_score(sites: &[OffTargetSite], target_dg: f64) -> f64 {
    if sites.is_empty() {
        return 1.0;
    }
    let strong = sites
        .iter()
        .filter(|s| {
            (target_dg < 0.0 && s.dg <= STRONG_OFF_TARGET_RATIO * target_dg)
                || s.three_prime_run >= STRONG_OFF_TARGET_RUN
        })
        .count();
    match (strong, sites.len()) {
        (1, _) => 0.3,
        (s, _) if s >= 2 => 0.1,
        (_, 1) => 0.75,
        _ => 0.55,
    }
}

/// Renormalized weighted mean of the present features, scaled to [0,100].
pub fn composite_score(features: &FeatureScores) -> f64 {
    let w = &WEIGHTS;
    let mut terms = vec![
        (features.tm, w.tm),
        (features.gc, w.gc),
        (features.length, w.length),
        (features.terminal_dg, w.terminal_dg),
        (features.hairpin, w.hairpin),
        (features.homodimer, w.homodimer),
        (features.off_target, w.off_target),
        (features.g_quadruplex, w.g_quadruplex),
        (features.three_prime, w.three_prime),
    ];
    terms.extend(features.heterodimer.map(|s| (s, w.heterodimer)));
    terms.extend(features.tm_diff.map(|s| (s, w.tm_diff)));
    terms.extend(features.efficiency.map(|s| (s, w.efficiency)));
    let total_weight: f64 = terms.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let sum: f64 = terms.iter().map(|(s, w)| s.clamp(0.0, 1.0) * w).sum();
    (100.0 * sum / total_weight).clamp(0.0, 100.0)
}

pub fn effective_score(composite: f64, warnings: &[Warning]) -> f64 {
    let critical = warnings.iter().filter(|w| w.is_critical()).count() as f64;
    (composite - CRITICAL_WARNING_PENALTY * critical).max(0.0)
}

fn finish(mut scoring: Scoring) -> Scoring {
    scoring.warnings.sort();
    scoring.warnings.dedup();
    scoring.composite = composite_score(&scoring.features);
    scoring.effective = effective_score(scoring.composite, &scoring.warnings);
    scoring.tier = tier_for_score(scoring.effective);
    scoring
}

/// Pair-level outcome; both primers carry their own per-strand scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairScore {
    pub forward: Primer,
    pub reverse: Primer,
    pub scoring: Scoring,
    pub tm_diff: f64,
    pub heterodimer_dg: f64,
}

/// Curves and penalty weights resolved for one request.
#[derive(Debug, Clone)]
pub struct Scorer {
    preset: ScoringPreset,
    options: ScoringOptions,
    tm_curve: PiecewiseCurve,
    gc_curve: PiecewiseCurve,
    len_curve: PiecewiseCurve,
}

impl Scorer {
    pub fn new(options: &ScoringOptions) -> Self {
        let preset = options.preset();
        Self {
            tm_curve: preset.tm_curve(options.resolved_tm()),
            gc_curve: preset.gc_curve(options.resolved_gc()),
            len_curve: preset.len_curve(options.resolved_len() as f64),
            preset,
            options: options.clone(),
        }
    }

    pub fn preset(&self) -> &ScoringPreset {
        &self.preset
    }

    pub fn options(&self) -> &ScoringOptions {
        &self.options
    }

    /// Tier 1: `None` outside the hard bounds, otherwise a [0,1] score from
    /// the same curves the later tiers use.
    pub fn quick_score(&self, tm: f64, gc: f64, len: usize, terminal_dg: f64) -> Option<f64> {
        let hard = &self.preset.hard;
        if !(hard.tm_min..=hard.tm_max).contains(&tm) || !(hard.gc_min..=hard.gc_max).contains(&gc) {
            return None;
        }
        let w = &WEIGHTS;
        let sum = self.tm_curve.evaluate(tm) * w.tm
            + self.gc_curve.evaluate(gc) * w.gc
            + self.len_curve.evaluate(len as f64) * w.length
            + self.preset.terminal_dg.evaluate(terminal_dg) * w.terminal_dg;
        Some(sum / (w.tm + w.gc + w.length + w.terminal_dg))
    }

    pub fn individual_penalty(&self, primer: &Primer) -> PenaltyBreakdown {
        let o = &self.options;
        let anneal_len = primer.anneal().len() as f64;
        PenaltyBreakdown {
            tm: o.penalty_tm * (primer.tm() - o.resolved_tm()).abs(),
            tm_diff: 0.0,
            gc: o.penalty_gc * (primer.gc() - o.resolved_gc()).abs() * 100.0,
            len: o.penalty_len * (anneal_len - o.resolved_len() as f64).abs(),
            dg: o.penalty_dg * primer.worst_structure_dg().abs(),
            off_target: o.penalty_off_target * primer.off_target_count() as f64,
        }
    }

    pub fn primer_warnings(&self, primer: &Primer) -> Vec<Warning> {
        let anneal = primer.anneal().as_bytes();
        let full = primer.seq().as_bytes();
        let mut warnings = vec![];
        if anneal.len() < EXTREME_LENGTH_MIN || anneal.len() > EXTREME_LENGTH_MAX {
            warnings.push(Warning::ExtremeLength);
        }
        match longest_homopolymer(anneal) {
            n if n >= SEVERE_HOMOPOLYMER_RUN => warnings.push(Warning::SevereHomopolymerRun),
            n if n >= HOMOPOLYMER_RUN => warnings.push(Warning::HomopolymerRun),
            _ => {}
        }
        if !has_gc_clamp(anneal) {
            warnings.push(Warning::NoGcClamp);
        }
        if g_quadruplex_score(full) < 1.0 {
            warnings.push(Warning::GQuadruplexMotif);
        }
        let energies = primer.energies();
        if energies.hairpin < STRONG_HAIRPIN_DG {
            warnings.push(Warning::StrongHairpin);
        }
        if energies.homodimer < STRONG_DIMER_DG {
            warnings.push(Warning::StrongDimer);
        }
        if primer.off_target_count() > 0 {
            warnings.push(Warning::OffTargetBinding);
        }
        warnings
    }

    pub fn individual_features(&self, primer: &Primer, sites: &[OffTargetSite]) -> FeatureScores {
        let anneal = primer.anneal().as_bytes();
        let energies = primer.energies();
        FeatureScores {
            tm: self.tm_curve.evaluate(primer.tm()),
            gc: self.gc_curve.evaluate(gc_fraction(anneal)),
            length: self.len_curve.evaluate(anneal.len() as f64),
            terminal_dg: self.preset.terminal_dg.evaluate(primer.dg()),
            hairpin: self.preset.hairpin.evaluate(energies.hairpin),
            homodimer: self.preset.homodimer.evaluate(energies.homodimer),
            off_target: off_target_score(sites, primer.binding().target),
            g_quadruplex: g_quadruplex_score(primer.seq().as_bytes()),
            three_prime: three_prime_score(anneal),
            heterodimer: None,
            tm_diff: None,
            efficiency: None,
        }
    }

    /// Tier 2: single-primer scoring without cross-primer terms.
    pub fn score_individual(&self, primer: &Primer, sites: &[OffTargetSite]) -> Primer {
        let scoring = finish(Scoring {
            penalty: self.individual_penalty(primer),
            features: self.individual_features(primer, sites),
            warnings: self.primer_warnings(primer),
            ..Scoring::default()
        });
        primer.with_scoring(scoring)
    }

    /// Re-scores a single primer with its equilibrium outcome attached.
    pub fn with_single_equilibrium(&self, primer: &Primer, equilibrium: &EquilibriumResult) -> Primer {
        let mut scoring = primer.scoring().clone();
        scoring.efficiency = Some(equilibrium.efficiency_fwd);
        scoring.losses = Some(equilibrium.losses_fwd);
        scoring.features.efficiency = Some(efficiency_to_score(equilibrium.efficiency_fwd) / 100.0);
        if equilibrium.efficiency_fwd < LOW_EFFICIENCY {
            scoring.warnings.push(Warning::LowEfficiency);
        }
        primer.with_scoring(finish(scoring))
    }

    fn pair_terms(&self, tm_diff: f64, heterodimer_dg: f64, efficiency: Option<f64>) -> (Vec<Warning>, FeatureScores) {
        let mut warnings = vec![];
        if heterodimer_dg < STRONG_DIMER_DG {
            warnings.push(Warning::StrongDimer);
        }
        if tm_diff > HARD_TM_DIFFERENCE {
            warnings.push(Warning::HardTmDifference);
        } else if tm_diff > TM_DIFFERENCE_WARNING {
            warnings.push(Warning::TmDifference);
        }
        if efficiency.is_some_and(|e| e < LOW_EFFICIENCY) {
            warnings.push(Warning::LowEfficiency);
        }
        let features = FeatureScores {
            heterodimer: Some(self.preset.heterodimer.evaluate(heterodimer_dg)),
            tm_diff: Some(self.preset.tm_diff.evaluate(tm_diff)),
            efficiency: efficiency.map(|e| efficiency_to_score(e) / 100.0),
            ..FeatureScores::default()
        };
        (warnings, features)
    }

    /// Tier 3: full pair scoring. Both primers must already carry their
    /// individual scoring; `heterodimer_dg` is taken at 37 °C.
    pub fn score_pair(
        &self,
        forward: &Primer,
        reverse: &Primer,
        heterodimer_dg: f64,
        equilibrium: Option<&EquilibriumResult>,
    ) -> PairScore {
        let tm_diff = (forward.tm() - reverse.tm()).abs();
        let (pair_warnings, pair_features) =
            self.pair_terms(tm_diff, heterodimer_dg, equilibrium.map(|e| e.efficiency));

        let per_strand = |primer: &Primer, efficiency: Option<f64>, losses: Option<EquilibriumLosses>| {
            let mut scoring = primer.scoring().clone();
            let (warnings, features) = self.pair_terms(tm_diff, heterodimer_dg, efficiency);
            scoring.features.heterodimer = features.heterodimer;
            scoring.features.tm_diff = features.tm_diff;
            scoring.features.efficiency = features.efficiency;
            scoring.efficiency = efficiency;
            scoring.losses = losses;
            scoring.warnings.extend(warnings);
            primer.with_scoring(finish(scoring))
        };
        let fwd = per_strand(
            forward,
            equilibrium.map(|e| e.efficiency_fwd),
            equilibrium.map(|e| e.losses_fwd),
        );
        let rev = per_strand(
            reverse,
            equilibrium.and_then(|e| e.efficiency_rev),
            equilibrium.and_then(|e| e.losses_rev),
        );

        let (f, r) = (&forward.scoring().features, &reverse.scoring().features);
        let features = FeatureScores {
            tm: f.tm.min(r.tm),
            gc: f.gc.min(r.gc),
            length: f.length.min(r.length),
            terminal_dg: f.terminal_dg.min(r.terminal_dg),
            hairpin: f.hairpin.min(r.hairpin),
            homodimer: f.homodimer.min(r.homodimer),
            off_target: f.off_target.min(r.off_target),
            g_quadruplex: f.g_quadruplex.min(r.g_quadruplex),
            three_prime: f.three_prime.min(r.three_prime),
            ..pair_features
        };
        let (fp, rp) = (&forward.scoring().penalty, &reverse.scoring().penalty);
        let penalty = PenaltyBreakdown {
            tm: fp.tm + rp.tm,
            tm_diff: self.options.penalty_tm_diff * tm_diff,
            gc: fp.gc + rp.gc,
            len: fp.len + rp.len,
            dg: fp.dg + rp.dg + self.options.penalty_dg * heterodimer_dg.min(0.0).abs(),
            off_target: fp.off_target + rp.off_target,
        };
        let mut warnings = forward.scoring().warnings.clone();
        warnings.extend(reverse.scoring().warnings.iter().copied());
        warnings.extend(pair_warnings);
        let scoring = finish(Scoring {
            penalty,
            efficiency: equilibrium.map(|e| e.efficiency),
            losses: equilibrium.map(|e| e.losses),
            features,
            warnings,
            ..Scoring::default()
        });
        PairScore {
            forward: fwd,
            reverse: rev,
            scoring,
            tm_diff,
            heterodimer_dg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primer::{PrimerEnergies, PrimerMeasurements, Strand};
    use crate::secondary_structure::SiteStrand;

    fn primer(seq: &[u8], tm: f64, energies: PrimerEnergies, off_target_count: usize) -> Primer {
        Primer::new(
            seq,
            b"",
            Strand::Forward,
            Some(0),
            PrimerMeasurements {
                tm,
                gc: gc_fraction(seq),
                dg: -7.0,
                off_target_count,
                energies,
                ..PrimerMeasurements::default()
            },
        )
    }

    fn site(dg: f64, run: usize) -> OffTargetSite {
        OffTargetSite {
            strand: SiteStrand::Top,
            position: 0,
            three_prime_run: run,
            identity: 0.9,
            dg,
        }
    }

    #[test]
    fn test_tier_thresholds() {
        assert_eq!(tier_for_score(100.0), QualityTier::Excellent);
        assert_eq!(tier_for_score(85.0), QualityTier::Excellent);
        assert_eq!(tier_for_score(84.9), QualityTier::Good);
        assert_eq!(tier_for_score(55.0), QualityTier::Acceptable);
        assert_eq!(tier_for_score(40.0), QualityTier::Marginal);
        assert_eq!(tier_for_score(0.0), QualityTier::Poor);
    }

    #[test]
    fn test_g_quadruplex() {
        assert_eq!(g_quadruplex_score(b"GGGAGGGTGGGAGGGA"), 0.1);
        assert_eq!(g_quadruplex_score(b"ATCGGGGATC"), 0.6);
        assert_eq!(g_quadruplex_score(b"ATCGATCGATCG"), 1.0);
    }

    #[test]
    fn test_three_prime() {
        assert_eq!(three_prime_score(b"AAAAAAAAGC"), 1.0);
        assert_eq!(three_prime_score(b"AAAAAATTTT"), 0.4);
        assert_eq!(three_prime_score(b"AAAAAAGCGC"), 0.7);
        assert_eq!(three_prime_score(b"AAAAAAAGCA"), 0.85);
        assert!(!has_gc_clamp(b"GGGGGATATA"));
    }

    #[test]
    fn test_three_prime_weak_terminal_base_caps_score() {
        // Two G/C in the last five bases, terminal A.
        let capped: f64 = three_prime_score(b"ACGTACGTAAAAGCA");
        assert!((capped - 0.85).abs() < 1e-12);
        assert_eq!(three_prime_score(b"ACGTACGTAAATAGC"), 1.0);
        assert_eq!(three_prime_score(b""), 0.0);
    }

    #[test]
    fn test_off_target_classification() {
        assert_eq!(off_target_score(&[], -20.0), 1.0);
        assert_eq!(off_target_score(&[site(-5.0, 8)], -20.0), 0.75);
        assert_eq!(off_target_score(&[site(-5.0, 8), site(-6.0, 9)], -20.0), 0.55);
        assert_eq!(off_target_score(&[site(-18.0, 8)], -20.0), 0.3);
        assert_eq!(off_target_score(&[site(-5.0, 14), site(-18.0, 8)], -20.0), 0.1);
    }

    #[test]
    fn test_composite_in_range() {
        let perfect = FeatureScores {
            tm: 1.0,
            gc: 1.0,
            length: 1.0,
            terminal_dg: 1.0,
            hairpin: 1.0,
            homodimer: 1.0,
            off_target: 1.0,
            g_quadruplex: 1.0,
            three_prime: 1.0,
            heterodimer: Some(1.0),
            tm_diff: Some(1.0),
            efficiency: None,
        };
        assert!((composite_score(&perfect) - 100.0).abs() < 1e-9);
        assert_eq!(composite_score(&FeatureScores::default()), 0.0);
        let half = FeatureScores {
            efficiency: Some(0.0),
            ..perfect
        };
        let c = composite_score(&half);
        assert!(c < 100.0 && c > 80.0);
    }

    #[test]
    fn test_effective_subtracts_critical() {
        let warnings = [Warning::ExtremeLength, Warning::NoGcClamp];
        assert_eq!(effective_score(90.0, &warnings), 75.0);
        assert_eq!(effective_score(10.0, &[Warning::ExtremeLength, Warning::HardTmDifference]), 0.0);
    }

    #[test]
    fn test_score_individual_prefers_optimal_tm() {
        let scorer = Scorer::new(&ScoringOptions::default());
        let good = scorer.score_individual(
            &primer(b"AGCGGATAACAATTTCACACAGGC", 62.0, PrimerEnergies::default(), 0),
            &[],
        );
        let off = scorer.score_individual(
            &primer(b"AGCGGATAACAATTTCACACAGGC", 50.0, PrimerEnergies::default(), 0),
            &[],
        );
        assert!(good.scoring().composite > off.scoring().composite);
        assert!(good.scoring().features.heterodimer.is_none());
        assert!(off.scoring().penalty.tm > good.scoring().penalty.tm);
    }

    #[test]
    fn test_warnings() {
        let scorer = Scorer::new(&ScoringOptions::default());
        let p = primer(
            b"AAAAAAAATTGCATTTTT",
            55.0,
            PrimerEnergies {
                hairpin: -7.0,
                homodimer: -11.0,
                off_target: -9.0,
            },
            1,
        );
        let w = scorer.primer_warnings(&p);
        assert!(w.contains(&Warning::SevereHomopolymerRun));
        assert!(!w.contains(&Warning::HomopolymerRun));
        assert!(w.contains(&Warning::NoGcClamp));
        assert!(w.contains(&Warning::StrongHairpin));
        assert!(w.contains(&Warning::StrongDimer));
        assert!(w.contains(&Warning::OffTargetBinding));
        assert!(!w.contains(&Warning::ExtremeLength));
    }

    #[test]
    fn test_quick_score_hard_bounds() {
        let scorer = Scorer::new(&ScoringOptions::default());
        assert!(scorer.quick_score(40.0, 0.5, 20, -7.0).is_none());
        assert!(scorer.quick_score(62.0, 0.95, 20, -7.0).is_none());
        let best = scorer.quick_score(62.0, 0.5, 22, -7.0).unwrap();
        let worse = scorer.quick_score(57.0, 0.5, 22, -7.0).unwrap();
        assert!((best - 1.0).abs() < 1e-12);
        assert!(worse < best);
    }

    #[test]
    fn test_score_pair_takes_minimum_and_flags_tm_difference() {
        let scorer = Scorer::new(&ScoringOptions::default());
        let f = scorer.score_individual(&primer(b"AGCGGATAACAATTTCACACAGGC", 62.0, PrimerEnergies::default(), 0), &[]);
        let r = scorer.score_individual(&primer(b"GTAAAACGACGGCCAGTGAGCGCG", 55.0, PrimerEnergies::default(), 0), &[]);
        let pair = scorer.score_pair(&f, &r, -3.0, None);
        assert!((pair.tm_diff - 7.0).abs() < 1e-12);
        assert_eq!(pair.scoring.features.tm, r.scoring().features.tm);
        assert!(pair.scoring.warnings.contains(&Warning::HardTmDifference));
        assert!(pair.scoring.effective <= pair.scoring.composite - CRITICAL_WARNING_PENALTY);
        assert!(pair.forward.scoring().features.tm_diff.is_some());
        assert!((0.0..=100.0).contains(&pair.scoring.composite));
    }
}
