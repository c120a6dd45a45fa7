use serde::{Deserialize, Serialize};

/// Logistic steepness inside the acceptable zone.
const STEEPNESS: f64 = 6.0;
/// Score at the outer edge of the acceptable zone.
const ACCEPTABLE_FLOOR: f64 = 0.1;
/// Decay rate past the acceptable zone, per zone width.
const REJECT_DECAY: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DesignMode {
    Amplification,
    Sequencing,
    Assembly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Zone {
    Optimal,
    Acceptable,
    Reject,
}

/// Three-zone scoring curve: 1 inside `[optimal_low, optimal_high]`,
/// logistic decay to [`ACCEPTABLE_FLOOR`] across the acceptable band and
/// exponential decay toward 0 beyond it. Infinite bounds make a side open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseCurve {
    pub acceptable_low: f64,
    pub optimal_low: f64,
    pub optimal_high: f64,
    pub acceptable_high: f64,
}

impl PiecewiseCurve {
    pub const fn new(acceptable_low: f64, optimal_low: f64, optimal_high: f64, acceptable_high: f64) -> Self {
        Self {
            acceptable_low,
            optimal_low,
            optimal_high,
            acceptable_high,
        }
    }

    pub fn centered(center: f64, optimal_half: f64, acceptable_half: f64) -> Self {
        Self::new(
            center - acceptable_half,
            center - optimal_half,
            center + optimal_half,
            center + acceptable_half,
        )
    }

    /// Optimal at or above `optimal_low`; used for free energies.
    pub const fn at_least(acceptable_low: f64, optimal_low: f64) -> Self {
        Self::new(acceptable_low, optimal_low, f64::INFINITY, f64::INFINITY)
    }

    /// Optimal at or below `optimal_high`; used for differences.
    pub const fn at_most(optimal_high: f64, acceptable_high: f64) -> Self {
        Self::new(f64::NEG_INFINITY, f64::NEG_INFINITY, optimal_high, acceptable_high)
    }

    /// Distance outside the optimal zone and the width of the acceptable
    /// band on that side.
    fn excursion(&self, x: f64) -> Option<(f64, f64)> {
        if x < self.optimal_low {
            Some((self.optimal_low - x, self.optimal_low - self.acceptable_low))
        } else if x > self.optimal_high {
            Some((x - self.optimal_high, self.acceptable_high - self.optimal_high))
        } else {
            None
        }
    }

    pub fn zone(&self, x: f64) -> Zone {
        match self.excursion(x) {
            None => Zone::Optimal,
            Some((d, w)) if d <= w => Zone::Acceptable,
            Some(_) => Zone::Reject,
        }
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        if x.is_nan() {
            return 0.0;
        }
        let Some((d, w)) = self.excursion(x) else {
            return 1.0;
        };
        if w <= 0.0 {
            return 0.0;
        }
        if d <= w {
            let logistic = |t: f64| 1.0 / (1.0 + (STEEPNESS * (t - 0.5)).exp());
            let (top, bottom) = (logistic(0.0), logistic(1.0));
            let t = d / w;
            ACCEPTABLE_FLOOR + (1.0 - ACCEPTABLE_FLOOR) * (logistic(t) - bottom) / (top - bottom)
        } else {
            ACCEPTABLE_FLOOR * (-REJECT_DECAY * (d - w) / w).exp()
        }
    }
}

/// Absolute limits enforced by the Tier 1 quick reject.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HardBounds {
    pub tm_min: f64,
    pub tm_max: f64,
    pub gc_min: f64,
    pub gc_max: f64,
}

/// Calibrated breakpoints for one design mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPreset {
    pub mode: DesignMode,
    pub optimal_tm: f64,
    pub optimal_gc: f64,
    pub optimal_len: usize,
    pub tm_optimal_half: f64,
    pub tm_acceptable_half: f64,
    pub gc_optimal_half: f64,
    pub gc_acceptable_half: f64,
    pub len_optimal_half: f64,
    pub len_acceptable_half: f64,
    pub terminal_dg: PiecewiseCurve,
    pub hairpin: PiecewiseCurve,
    pub homodimer: PiecewiseCurve,
    pub heterodimer: PiecewiseCurve,
    pub tm_diff: PiecewiseCurve,
    pub hard: HardBounds,
}

impl ScoringPreset {
    pub fn for_mode(mode: DesignMode) -> Self {
        let base = Self {
            mode,
            optimal_tm: 62.0,
            optimal_gc: 0.5,
            optimal_len: 22,
            tm_optimal_half: 2.0,
            tm_acceptable_half: 7.0,
            gc_optimal_half: 0.1,
            gc_acceptable_half: 0.2,
            len_optimal_half: 2.0,
            len_acceptable_half: 6.0,
            terminal_dg: PiecewiseCurve::new(-11.0, -9.0, -5.0, -3.0),
            hairpin: PiecewiseCurve::at_least(-6.0, -2.0),
            homodimer: PiecewiseCurve::at_least(-10.0, -5.0),
            heterodimer: PiecewiseCurve::at_least(-10.0, -5.0),
            tm_diff: PiecewiseCurve::at_most(1.0, 5.0),
            hard: HardBounds {
                tm_min: 48.0,
                tm_max: 76.0,
                gc_min: 0.2,
                gc_max: 0.8,
            },
        };
        match mode {
            DesignMode::Amplification => base,
            DesignMode::Sequencing => Self {
                optimal_tm: 56.0,
                optimal_len: 20,
                tm_optimal_half: 3.0,
                hairpin: PiecewiseCurve::at_least(-5.0, -1.5),
                hard: HardBounds {
                    tm_min: 45.0,
                    tm_max: 70.0,
                    ..base.hard
                },
                ..base
            },
            DesignMode::Assembly => Self {
                optimal_tm: 60.0,
                optimal_len: 24,
                len_optimal_half: 4.0,
                len_acceptable_half: 10.0,
                gc_acceptable_half: 0.25,
                tm_diff: PiecewiseCurve::at_most(2.0, 6.0),
                hard: HardBounds {
                    gc_min: 0.15,
                    gc_max: 0.85,
                    ..base.hard
                },
                ..base
            },
        }
    }

    pub fn tm_curve(&self, center: f64) -> PiecewiseCurve {
        PiecewiseCurve::centered(center, self.tm_optimal_half, self.tm_acceptable_half)
    }

    pub fn gc_curve(&self, center: f64) -> PiecewiseCurve {
        PiecewiseCurve::centered(center, self.gc_optimal_half, self.gc_acceptable_half)
    }

    pub fn len_curve(&self, center: f64) -> PiecewiseCurve {
        PiecewiseCurve::centered(center, self.len_optimal_half, self.len_acceptable_half)
    }
}
