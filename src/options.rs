//! Configuration records for scoring, search and design requests.
//!
//! Every struct deserializes with `#[serde(default)]`, so a JSON object only
//! needs to name the fields it overrides.

use crate::dna_sequence::{DNAstring, normalize_dna};
use crate::error::{PrimerError, PrimerResult};
use crate::scoring_presets::{DesignMode, ScoringPreset};
use crate::thermodynamics::ThermoConditions;
use serde::{Deserialize, Serialize};

/// Shortest primer accepted anywhere.
pub const MIN_PRIMER_LENGTH: usize = 10;
/// Default annealing temperature sits this far below the optimal Tm.
pub const ANNEALING_OFFSET: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringOptions {
    pub mode: DesignMode,
    /// Overrides the preset centers when set.
    pub optimal_tm: Option<f64>,
    pub optimal_gc: Option<f64>,
    pub optimal_len: Option<usize>,
    pub penalty_tm: f64,
    /// Applied to the GC difference in percentage points.
    pub penalty_gc: f64,
    pub penalty_len: f64,
    pub penalty_tm_diff: f64,
    pub penalty_dg: f64,
    pub penalty_off_target: f64,
}

impl Default for ScoringOptions {
    fn default() -> Self {
        Self {
            mode: DesignMode::Amplification,
            optimal_tm: None,
            optimal_gc: None,
            optimal_len: None,
            penalty_tm: 1.0,
            penalty_gc: 0.2,
            penalty_len: 0.5,
            penalty_tm_diff: 1.0,
            penalty_dg: 2.0,
            penalty_off_target: 20.0,
        }
    }
}

impl ScoringOptions {
    pub fn preset(&self) -> ScoringPreset {
        ScoringPreset::for_mode(self.mode)
    }

    pub fn resolved_tm(&self) -> f64 {
        self.optimal_tm.unwrap_or_else(|| self.preset().optimal_tm)
    }

    pub fn resolved_gc(&self) -> f64 {
        self.optimal_gc.unwrap_or_else(|| self.preset().optimal_gc)
    }

    pub fn resolved_len(&self) -> usize {
        self.optimal_len.unwrap_or_else(|| self.preset().optimal_len)
    }

    pub fn validate(&self) -> PrimerResult<()> {
        if let Some(gc) = self.optimal_gc {
            if !(0.0..=1.0).contains(&gc) {
                return Err(PrimerError::invalid_input(format!(
                    "optimal_gc must be a fraction in [0,1], got {gc}"
                )));
            }
        }
        let penalties = [
            self.penalty_tm,
            self.penalty_gc,
            self.penalty_len,
            self.penalty_tm_diff,
            self.penalty_dg,
            self.penalty_off_target,
        ];
        if penalties.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(PrimerError::invalid_input("Penalty weights must be finite and non-negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    pub min_len: usize,
    pub max_len: usize,
    pub allow_extended_primers: bool,
    /// Upper length bound used when `allow_extended_primers` is set.
    pub extended_max_len: usize,
    /// How far (bp) a primer's 5′ end may sit outside the design region.
    pub position_window: usize,
    pub tier2_pool: usize,
    pub tier3_pool: usize,
    /// Joint-Tm pairs injected into Tier 3.
    pub joint_pairs: usize,
    pub max_alternatives: usize,
    pub exhaustive_search: bool,
    pub use_composite_score: bool,
    pub use_smart_design: bool,
    /// Tier 3 early-reject limits.
    pub max_tm_diff: f64,
    pub min_heterodimer_dg: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            min_len: 18,
            max_len: 25,
            allow_extended_primers: false,
            extended_max_len: 35,
            position_window: 20,
            tier2_pool: 40,
            tier3_pool: 15,
            joint_pairs: 20,
            max_alternatives: 5,
            exhaustive_search: false,
            use_composite_score: true,
            use_smart_design: false,
            max_tm_diff: 5.0,
            min_heterodimer_dg: -10.0,
        }
    }
}

impl SearchOptions {
    pub fn effective_max_len(&self) -> usize {
        if self.allow_extended_primers {
            self.max_len.max(self.extended_max_len)
        } else {
            self.max_len
        }
    }

    pub fn validate(&self) -> PrimerResult<()> {
        if self.min_len > self.max_len {
            return Err(PrimerError::invalid_input(format!(
                "Malformed length range: min_len {} > max_len {}",
                self.min_len, self.max_len
            )));
        }
        if self.min_len < MIN_PRIMER_LENGTH {
            return Err(PrimerError::invalid_input(format!(
                "min_len must be at least {MIN_PRIMER_LENGTH}, got {}",
                self.min_len
            )));
        }
        if self.tier2_pool == 0 || self.tier3_pool == 0 {
            return Err(PrimerError::invalid_input("Tier pool sizes must be positive"));
        }
        Ok(())
    }
}

/// Half-open template interval `[start, end)` the amplicon must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesignRegion {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignOptions {
    pub conditions: ThermoConditions,
    pub scoring: ScoringOptions,
    pub search: SearchOptions,
    /// Defaults to the optimal Tm minus [`ANNEALING_OFFSET`].
    pub annealing_temperature: Option<f64>,
    pub include_equilibrium: bool,
    /// Whole template when unset.
    pub region: Option<DesignRegion>,
    pub fwd_tail: String,
    pub rev_tail: String,
}

impl Default for DesignOptions {
    fn default() -> Self {
        Self {
            conditions: ThermoConditions::default(),
            scoring: ScoringOptions::default(),
            search: SearchOptions::default(),
            annealing_temperature: None,
            include_equilibrium: false,
            region: None,
            fwd_tail: String::new(),
            rev_tail: String::new(),
        }
    }
}

impl DesignOptions {
    pub fn annealing_temperature(&self) -> f64 {
        self.annealing_temperature
            .unwrap_or_else(|| self.scoring.resolved_tm() - ANNEALING_OFFSET)
    }

    pub fn tails(&self) -> PrimerResult<(DNAstring, DNAstring)> {
        Ok((normalize_dna(&self.fwd_tail)?, normalize_dna(&self.rev_tail)?))
    }

    pub fn validate(&self) -> PrimerResult<()> {
        self.scoring.validate()?;
        self.search.validate()?;
        self.tails()?;
        if let Some(region) = self.region {
            if region.start >= region.end {
                return Err(PrimerError::invalid_input(format!(
                    "Empty design region {}..{}",
                    region.start, region.end
                )));
            }
        }
        let c = &self.conditions;
        if c.primer_nm <= 0.0 || c.template_nm <= 0.0 {
            return Err(PrimerError::invalid_input("Primer and template concentrations must be positive"));
        }
        Ok(())
    }
}
