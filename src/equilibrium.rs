//! Mass-action equilibrium between a primer pair, its target and competing
//! structures.
//!
//! Each strand partitions into free primer, hairpin, homodimer,
//! heterodimer (with the partner), target-bound and off-target-bound pools.
//! Per strand the free concentration is found in closed form by bisection on
//! the monotone mass balance; the two strands share the heterodimer term and
//! are refined alternately until the free pools stop moving.
//!
//! Efficiency is reported as the fraction of target sites occupied, while
//! losses are fractions of the primer total. The two normalizations differ
//! on purpose, so `efficiency + losses` is only approximately 1.

use crate::primer::{EquilibriumLosses, QualityTier, Strand};
use crate::thermodynamics::{ThermoConditions, association_constant};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

const BISECTION_STEPS: usize = 200;
const MAX_SWEEPS: usize = 200;
const SWEEP_TOLERANCE: f64 = 1e-12;

/// Efficiency at or above which [`efficiency_to_score`] saturates.
pub const SATURATION_EFFICIENCY: f64 = 0.95;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrandConstants {
    /// Primer/target association, M⁻¹.
    pub k_target: f64,
    /// Unimolecular fold, dimensionless.
    pub k_hairpin: f64,
    /// Self association, M⁻¹.
    pub k_homodimer: f64,
    /// Per off-target site association, M⁻¹.
    pub k_off_target: f64,
    pub off_target_sites: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MassActionSystem {
    pub forward: StrandConstants,
    pub reverse: Option<StrandConstants>,
    /// Forward/reverse association, M⁻¹.
    pub k_heterodimer: f64,
    /// Total concentration of each primer, M.
    pub primer_total: f64,
    /// Total concentration of each target strand, M.
    pub template_total: f64,
}

/// Concentrations (M) of every pool one strand participates in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrandState {
    pub free: f64,
    pub hairpin: f64,
    pub homodimer: f64,
    pub heterodimer: f64,
    pub target: f64,
    pub off_target: f64,
}

impl StrandState {
    pub fn losses(&self, primer_total: f64) -> EquilibriumLosses {
        let frac = |x: f64| (x / primer_total).clamp(0.0, 1.0);
        EquilibriumLosses {
            hairpin: frac(self.hairpin),
            homodimer: frac(self.homodimer),
            heterodimer: frac(self.heterodimer),
            off_target: frac(self.off_target),
            free: frac(self.free),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumState {
    pub forward: StrandState,
    pub reverse: Option<StrandState>,
    pub sweeps: usize,
}

struct Balance<'a> {
    constants: &'a StrandConstants,
    primer_total: f64,
    template_total: f64,
    k_heterodimer: f64,
    partner_free: f64,
}

impl Balance<'_> {
    fn state(&self, p: f64) -> StrandState {
        let c = self.constants;
        let target = self.template_total * c.k_target * p / (1.0 + c.k_target * p);
        let off_total = self.template_total * c.off_target_sites as f64;
        let off_target = off_total * c.k_off_target * p / (1.0 + c.k_off_target * p);
        StrandState {
            free: p,
            hairpin: c.k_hairpin * p,
            homodimer: 2.0 * c.k_homodimer * p * p,
            heterodimer: self.k_heterodimer * p * self.partner_free,
            target,
            off_target,
        }
    }

    fn bound_total(&self, p: f64) -> f64 {
        let s = self.state(p);
        s.free + s.hairpin + s.homodimer + s.heterodimer + s.target + s.off_target
    }

    /// Free primer satisfying the mass balance; the balance is strictly
    /// increasing in `p`, so bisection on [0, total] always brackets it.
    fn solve_free(&self) -> f64 {
        let (mut lo, mut hi) = (0.0, self.primer_total);
        for _ in 0..BISECTION_STEPS {
            let mid = 0.5 * (lo + hi);
            if mid <= lo || mid >= hi {
                break;
            }
            if self.bound_total(mid) > self.primer_total {
                hi = mid;
            } else {
                lo = mid;
            }
        }
        0.5 * (lo + hi)
    }
}

pub fn solve(system: &MassActionSystem) -> EquilibriumState {
    let balance = |constants: &StrandConstants, partner_free: f64| -> f64 {
        Balance {
            constants,
            primer_total: system.primer_total,
            template_total: system.template_total,
            k_heterodimer: system.k_heterodimer,
            partner_free,
        }
        .solve_free()
    };
    let state_of = |constants: &StrandConstants, p: f64, partner_free: f64| -> StrandState {
        Balance {
            constants,
            primer_total: system.primer_total,
            template_total: system.template_total,
            k_heterodimer: system.k_heterodimer,
            partner_free,
        }
        .state(p)
    };

    let Some(reverse) = system.reverse.as_ref() else {
        let p = balance(&system.forward, 0.0);
        return EquilibriumState {
            forward: state_of(&system.forward, p, 0.0),
            reverse: None,
            sweeps: 1,
        };
    };

    let mut pf = balance(&system.forward, 0.0);
    let mut pr = balance(reverse, pf);
    let mut sweeps = 1;
    let mut converged = false;
    while sweeps < MAX_SWEEPS {
        let next_f = balance(&system.forward, pr);
        let next_r = balance(reverse, next_f);
        let delta = (next_f - pf).abs().max((next_r - pr).abs());
        pf = next_f;
        pr = next_r;
        sweeps += 1;
        if delta <= SWEEP_TOLERANCE * system.primer_total {
            converged = true;
            break;
        }
    }
    if converged {
        trace!(sweeps, pf, pr, "equilibrium converged");
    } else {
        warn!(sweeps, pf, pr, "equilibrium sweeps hit the iteration cap");
    }
    EquilibriumState {
        forward: state_of(&system.forward, pf, pr),
        reverse: Some(state_of(reverse, pr, pf)),
        sweeps,
    }
}

/// Fraction of target sites occupied by the strand.
fn target_efficiency(state: &StrandState, system: &MassActionSystem) -> f64 {
    let limiting = system.template_total.min(system.primer_total);
    if limiting <= 0.0 {
        return 0.0;
    }
    (state.target / limiting).clamp(0.0, 1.0)
}

/// Free energies (kcal/mol) describing one strand's competitors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrandFreeEnergies {
    pub target: f64,
    pub hairpin: f64,
    pub homodimer: f64,
    pub off_target: f64,
    pub off_target_sites: usize,
}

impl StrandFreeEnergies {
    pub fn constants(&self, temperature_c: f64) -> StrandConstants {
        StrandConstants {
            k_target: association_constant(self.target, temperature_c),
            k_hairpin: association_constant(self.hairpin, temperature_c),
            k_homodimer: association_constant(self.homodimer, temperature_c),
            k_off_target: if self.off_target_sites > 0 {
                association_constant(self.off_target, temperature_c)
            } else {
                0.0
            },
            off_target_sites: self.off_target_sites,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PairFreeEnergies {
    pub forward: StrandFreeEnergies,
    pub reverse: Option<StrandFreeEnergies>,
    pub heterodimer: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquilibriumResult {
    /// min(forward, reverse) for pairs.
    pub efficiency: f64,
    pub efficiency_fwd: f64,
    pub efficiency_rev: Option<f64>,
    /// Limiting strand; `None` for a single primer.
    pub bottleneck: Option<Strand>,
    pub quality: QualityTier,
    /// Losses of the limiting strand.
    pub losses: EquilibriumLosses,
    pub losses_fwd: EquilibriumLosses,
    pub losses_rev: Option<EquilibriumLosses>,
    pub temperature: f64,
    pub state: EquilibriumState,
}

pub fn efficiency_quality(efficiency: f64) -> QualityTier {
    match efficiency {
        e if e >= 0.9 => QualityTier::Excellent,
        e if e >= 0.75 => QualityTier::Good,
        e if e >= 0.5 => QualityTier::Acceptable,
        e if e >= 0.25 => QualityTier::Marginal,
        _ => QualityTier::Poor,
    }
}

pub fn solve_free_energies(
    energies: &PairFreeEnergies,
    temperature_c: f64,
    conditions: &ThermoConditions,
) -> EquilibriumResult {
    let system = MassActionSystem {
        forward: energies.forward.constants(temperature_c),
        reverse: energies.reverse.map(|r| r.constants(temperature_c)),
        k_heterodimer: if energies.reverse.is_some() {
            association_constant(energies.heterodimer, temperature_c)
        } else {
            0.0
        },
        primer_total: conditions.primer_molar(),
        template_total: conditions.template_molar(),
    };
    let state = solve(&system);
    let efficiency_fwd = target_efficiency(&state.forward, &system);
    let efficiency_rev = state.reverse.map(|r| target_efficiency(&r, &system));
    let losses_fwd = state.forward.losses(system.primer_total);
    let losses_rev = state.reverse.map(|r| r.losses(system.primer_total));

    let (efficiency, bottleneck, losses) = match (efficiency_rev, losses_rev) {
        (Some(er), Some(lr)) if er < efficiency_fwd => (er, Some(Strand::Reverse), lr),
        (Some(_), Some(_)) => (efficiency_fwd, Some(Strand::Forward), losses_fwd),
        _ => (efficiency_fwd, None, losses_fwd),
    };

    EquilibriumResult {
        efficiency,
        efficiency_fwd,
        efficiency_rev,
        bottleneck,
        quality: efficiency_quality(efficiency),
        losses,
        losses_fwd,
        losses_rev,
        temperature: temperature_c,
        state,
    }
}

/// Monotone map of efficiency onto [0,100], saturating at
/// [`SATURATION_EFFICIENCY`].
pub fn efficiency_to_score(efficiency: f64) -> f64 {
    let e = if efficiency.is_nan() { 0.0 } else { efficiency.clamp(0.0, 1.0) };
    let points = [(0.0, 0.0), (0.5, 50.0), (0.8, 85.0), (SATURATION_EFFICIENCY, 100.0)];
    if e >= SATURATION_EFFICIENCY {
        return 100.0;
    }
    points
        .windows(2)
        .find(|w| e <= w[1].0)
        .map(|w| {
            let ((x0, y0), (x1, y1)) = (w[0], w[1]);
            y0 + (e - x0) / (x1 - x0) * (y1 - y0)
        })
        .unwrap_or(100.0)
}
