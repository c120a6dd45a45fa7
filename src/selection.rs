//! Diversity, Pareto and hybrid selection over scored candidates.
//!
//! All functions return indices into the caller's slice, in pick order, and
//! break ties by the lower index so results do not depend on thread timing.

use serde::{Deserialize, Serialize};

/// Floor of the rescaled quality range.
const MIN_QUALITY: f64 = 0.1;

/// A candidate that can take part in diversity selection.
pub trait DiversityPoint {
    /// Higher is better.
    fn quality(&self) -> f64;
    /// Coordinates for the distance metric, e.g. position, length and Tm.
    fn coordinates(&self) -> Vec<f64>;
}

fn rescaled_quality<T: DiversityPoint>(pool: &[T]) -> Vec<f64> {
    let raw: Vec<f64> = pool.iter().map(|c| c.quality()).collect();
    let lo = raw.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !(hi - lo).is_finite() || hi - lo <= 0.0 {
        return vec![1.0; raw.len()];
    }
    raw.iter()
        .map(|q| MIN_QUALITY + (1.0 - MIN_QUALITY) * (q - lo) / (hi - lo))
        .collect()
}

/// Coordinates scaled to [0,1] per axis over the pool.
fn normalized_coordinates<T: DiversityPoint>(pool: &[T]) -> Vec<Vec<f64>> {
    let coords: Vec<Vec<f64>> = pool.iter().map(|c| c.coordinates()).collect();
    let dims = coords.iter().map(|c| c.len()).min().unwrap_or(0);
    let ranges: Vec<(f64, f64)> = (0..dims)
        .map(|d| {
            let lo = coords.iter().map(|c| c[d]).fold(f64::INFINITY, f64::min);
            let hi = coords.iter().map(|c| c[d]).fold(f64::NEG_INFINITY, f64::max);
            (lo, hi - lo)
        })
        .collect();
    coords
        .iter()
        .map(|c| {
            ranges
                .iter()
                .enumerate()
                .map(|(d, (lo, span))| if *span > 0.0 { (c[d] - lo) / span } else { 0.0 })
                .collect()
        })
        .collect()
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() {
        return 0.0;
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    (sum / a.len() as f64).sqrt()
}

/// Picks up to `count` candidates, each maximizing
/// √(quality × distance to the nearest pick so far). The first pick is the
/// best-quality candidate; a pool no larger than `count` comes back whole.
pub fn diversity_select<T: DiversityPoint>(pool: &[T], count: usize) -> Vec<usize> {
    if pool.is_empty() || count == 0 {
        return vec![];
    }
    let quality = rescaled_quality(pool);
    let coords = normalized_coordinates(pool);
    let first = pool
        .iter()
        .enumerate()
        .fold(0, |best, (i, c)| if c.quality() > pool[best].quality() { i } else { best });
    let mut picked = vec![first];
    let mut taken = vec![false; pool.len()];
    taken[first] = true;
    let mut nearest: Vec<f64> = coords.iter().map(|c| distance(c, &coords[first])).collect();

    while picked.len() < count.min(pool.len()) {
        let mut best: Option<(usize, f64)> = None;
        for i in (0..pool.len()).filter(|&i| !taken[i]) {
            let value = (quality[i] * nearest[i]).sqrt();
            match best {
                Some((_, v)) if v >= value => {}
                _ => best = Some((i, value)),
            }
        }
        let Some((next, _)) = best else { break };
        picked.push(next);
        taken[next] = true;
        for (i, c) in coords.iter().enumerate() {
            nearest[i] = nearest[i].min(distance(c, &coords[next]));
        }
    }
    picked
}

fn non_dominated(values: &[Vec<f64>]) -> Vec<usize> {
    let dominates = |a: &[f64], b: &[f64]| {
        a.iter().zip(b).all(|(x, y)| x >= y) && a.iter().zip(b).any(|(x, y)| x > y)
    };
    (0..values.len())
        .filter(|&i| !(0..values.len()).any(|j| j != i && dominates(&values[j], &values[i])))
        .collect()
}

/// Indices not dominated by any other item; every objective is maximized.
pub fn pareto_front<T>(items: &[T], objectives: &[&dyn Fn(&T) -> f64]) -> Vec<usize> {
    let values: Vec<Vec<f64>> = items
        .iter()
        .map(|item| objectives.iter().map(|f| f(item)).collect())
        .collect();
    non_dominated(&values)
}

/// The first `top_k` entries of an already ranked pool, then diversity
/// picks from the Pareto front of the remainder, then diversity picks from
/// whatever is left.
pub fn hybrid_select<T: DiversityPoint>(
    ranked: &[T],
    top_k: usize,
    total: usize,
    objectives: &[&dyn Fn(&T) -> f64],
) -> Vec<usize> {
    let mut chosen: Vec<usize> = (0..top_k.min(total).min(ranked.len())).collect();
    let rest: Vec<usize> = (chosen.len()..ranked.len()).collect();
    let values: Vec<Vec<f64>> = rest
        .iter()
        .map(|&i| objectives.iter().map(|f| f(&ranked[i])).collect())
        .collect();
    let front: Vec<usize> = non_dominated(&values).into_iter().map(|j| rest[j]).collect();

    let fill = |from: &[usize], chosen: &mut Vec<usize>| {
        let slots = total.saturating_sub(chosen.len());
        if slots == 0 {
            return;
        }
        let subset: Vec<&T> = from.iter().map(|&i| &ranked[i]).collect();
        chosen.extend(diversity_select(&subset, slots).into_iter().map(|j| from[j]));
    };
    fill(&front, &mut chosen);
    let remaining: Vec<usize> = rest.iter().copied().filter(|i| !chosen.contains(i)).collect();
    fill(&remaining, &mut chosen);
    chosen
}

impl<T: DiversityPoint> DiversityPoint for &T {
    fn quality(&self) -> f64 {
        T::quality(*self)
    }

    fn coordinates(&self) -> Vec<f64> {
        T::coordinates(*self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlternativeLabel {
    BestTmMatch,
    SafestDimer,
    ShortestAmplicon,
    HighestEfficiency,
}

/// A labeled strength: larger `value` is better, and the label is only
/// awarded when the best item beats every other by at least `margin`.
pub struct LabelRule<'a, T> {
    pub label: AlternativeLabel,
    pub value: &'a dyn Fn(&T) -> Option<f64>,
    pub margin: f64,
}

pub fn distinguishing_labels<T>(items: &[T], rules: &[LabelRule<'_, T>]) -> Vec<Vec<AlternativeLabel>> {
    let mut labels = vec![vec![]; items.len()];
    if items.len() < 2 {
        return labels;
    }
    for rule in rules {
        let values: Vec<Option<f64>> = items.iter().map(|i| (rule.value)(i)).collect();
        let mut best: Option<(usize, f64)> = None;
        let mut runner_up = f64::NEG_INFINITY;
        for (i, v) in values.iter().enumerate() {
            let Some(v) = *v else { continue };
            match best {
                Some((_, b)) if v <= b => runner_up = runner_up.max(v),
                Some((_, b)) => {
                    runner_up = runner_up.max(b);
                    best = Some((i, v));
                }
                None => best = Some((i, v)),
            }
        }
        if let Some((i, b)) = best {
            if runner_up.is_finite() && b - runner_up >= rule.margin {
                labels[i].push(rule.label);
            }
        }
    }
    labels
}
