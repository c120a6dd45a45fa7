//! Hairpin, dimer, duplex and off-target free energies.
//!
//! All searches here are exhaustive over alignments of short oligos
//! (< 100 nt). Each returns 0.0 when no structure with negative ΔG exists.

use crate::dna_sequence::{DNAstring, Template, is_complementary, reverse_complement};
use crate::thermodynamics::{
    INITIATION, R_CAL, REFERENCE_TEMPERATURE, ThermoConditions, duplex_free_energy, free_energy_at,
    stack_free_energy, terminal_penalty, to_kelvin,
};
use serde::{Deserialize, Serialize};

pub const MIN_HAIRPIN_LOOP: usize = 3;
/// Minimum paired bases in a hairpin stem or dimer run.
pub const MIN_STEM: usize = 3;
pub const MIN_DIMER_LENGTH: usize = 5;
/// Extra weight for dimers that engage a 3′ end.
const THREE_PRIME_DIMER_WEIGHT: f64 = 1.25;
const THREE_PRIME_REACH: usize = 2;

/// 3′-anchored identity run that qualifies a template site as off-target.
pub const OFF_TARGET_MIN_RUN: usize = 8;
pub const OFF_TARGET_MIN_IDENTITY: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    Hairpin,
    Homodimer,
    Heterodimer,
    Duplex,
}

/// Hairpin loop initiation ΔG at 37 °C (SantaLucia & Hicks 2004).
fn hairpin_loop_dg37(loop_len: usize) -> f64 {
    match loop_len {
        0..=2 => f64::INFINITY,
        3 | 4 => 3.5,
        5 => 3.3,
        6 => 4.0,
        7 => 4.2,
        8 => 4.3,
        9 => 4.5,
        n => 4.6 + 2.44 * R_CAL * to_kelvin(REFERENCE_TEMPERATURE) * (n as f64 / 10.0).ln() / 1000.0,
    }
}

/// Loops are treated as purely entropic, so ΔG scales with absolute temperature.
fn hairpin_loop_dg(loop_len: usize, temperature_c: f64) -> f64 {
    hairpin_loop_dg37(loop_len) * to_kelvin(temperature_c) / to_kelvin(REFERENCE_TEMPERATURE)
}

fn end_penalty_dg(base: u8, temperature_c: f64) -> f64 {
    let (dh, ds) = terminal_penalty(base);
    free_energy_at(dh, ds, temperature_c)
}

/// Best self-folding stem-loop of a single strand.
pub fn hairpin_dg(sequence: &[u8], temperature_c: f64, conditions: &ThermoConditions) -> f64 {
    let n = sequence.len();
    if n < 2 * MIN_STEM + MIN_HAIRPIN_LOOP {
        return 0.0;
    }
    let mut best = 0.0f64;
    for i in 0..n {
        for j in (i + 2 * MIN_STEM + MIN_HAIRPIN_LOOP - 1)..n {
            if !is_complementary(sequence[i], sequence[j]) {
                continue;
            }
            let closing = end_penalty_dg(sequence[i], temperature_c);
            let mut stacks = 0.0;
            let mut k = 1;
            // Grow the stem inward while pairs hold and the loop stays legal.
            while i + k < j - k
                && is_complementary(sequence[i + k], sequence[j - k])
                && j - i - 2 * k - 1 >= MIN_HAIRPIN_LOOP
            {
                stacks += stack_free_energy(sequence[i + k - 1], sequence[i + k], temperature_c, conditions);
                k += 1;
                if k >= MIN_STEM {
                    let loop_len = j - i - 2 * k + 1;
                    let dg = stacks + closing + hairpin_loop_dg(loop_len, temperature_c);
                    best = best.min(dg);
                }
            }
        }
    }
    best
}

/// Best contiguous pairing run between `a` (5′→3′) and `b` (5′→3′) in
/// antiparallel orientation. `weight_three_prime` boosts runs touching a 3′ end.
fn best_alignment_dg(
    a: &[u8],
    b: &[u8],
    temperature_c: f64,
    conditions: &ThermoConditions,
    weight_three_prime: bool,
) -> f64 {
    if a.len() < MIN_DIMER_LENGTH || b.len() < MIN_DIMER_LENGTH {
        return 0.0;
    }
    let init = free_energy_at(INITIATION.0, INITIATION.1, temperature_c);
    let (la, lb) = (a.len() as isize, b.len() as isize);
    let mut best = 0.0f64;
    // a[i] pairs with b[lb - 1 - (i - offset)]
    for offset in -(lb - 1)..la {
        let lo = offset.max(0);
        let hi = la.min(offset + lb);
        let mut run_start: Option<isize> = None;
        let mut stacks = 0.0;
        let mut i = lo;
        while i <= hi {
            let pairs = i < hi && {
                let j = (lb - 1 - (i - offset)) as usize;
                is_complementary(a[i as usize], b[j])
            };
            if pairs {
                match run_start {
                    None => {
                        run_start = Some(i);
                        stacks = 0.0;
                    }
                    Some(_) => {
                        stacks += stack_free_energy(a[(i - 1) as usize], a[i as usize], temperature_c, conditions);
                    }
                }
            } else if let Some(start) = run_start.take() {
                let end = i - 1;
                if (end - start + 1) as usize >= MIN_STEM {
                    let mut dg = stacks
                        + init
                        + end_penalty_dg(a[start as usize], temperature_c)
                        + end_penalty_dg(a[end as usize], temperature_c);
                    if weight_three_prime && dg < 0.0 {
                        let a_end = end >= la - 1 - THREE_PRIME_REACH as isize;
                        // The lowest a index of the run pairs with b's 3′-most base in it.
                        let b_index_of_start = lb - 1 - (start - offset);
                        let b_end = b_index_of_start >= lb - 1 - THREE_PRIME_REACH as isize;
                        if a_end || b_end {
                            dg *= THREE_PRIME_DIMER_WEIGHT;
                        }
                    }
                    best = best.min(dg);
                }
            }
            i += 1;
        }
    }
    best
}

/// Two copies of the same primer, weighted toward 3′-end involvement.
pub fn homodimer_dg(sequence: &[u8], temperature_c: f64, conditions: &ThermoConditions) -> f64 {
    best_alignment_dg(sequence, sequence, temperature_c, conditions, true)
}

pub fn heterodimer_dg(a: &[u8], b: &[u8], temperature_c: f64, conditions: &ThermoConditions) -> f64 {
    best_alignment_dg(a, b, temperature_c, conditions, false)
}

/// Watson–Crick pairing of `sequence` against `partner` (both 5′→3′),
/// aligned end to end. A perfect reverse complement yields the full duplex ΔG.
pub fn duplex_dg(
    sequence: &[u8],
    partner: &[u8],
    temperature_c: f64,
    conditions: &ThermoConditions,
) -> f64 {
    if sequence.len() < 2 || partner.len() != sequence.len() {
        return 0.0;
    }
    if reverse_complement(partner) == sequence {
        return duplex_free_energy(sequence, temperature_c, conditions).min(0.0);
    }
    let n = sequence.len();
    let mut best = 0.0f64;
    let mut start = None;
    for i in 0..=n {
        let pairs = i < n && is_complementary(sequence[i], partner[n - 1 - i]);
        if pairs {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            if i - s >= 2 {
                best = best.min(duplex_free_energy(&sequence[s..i], temperature_c, conditions));
            }
        }
    }
    best
}

/// Dispatch over the four structure kinds. `second` is required for
/// heterodimer and duplex; without it those kinds report 0.0.
pub fn free_energy(
    kind: StructureKind,
    sequence: &[u8],
    second: Option<&[u8]>,
    temperature_c: f64,
    conditions: &ThermoConditions,
) -> f64 {
    match (kind, second) {
        (StructureKind::Hairpin, _) => hairpin_dg(sequence, temperature_c, conditions),
        (StructureKind::Homodimer, _) => homodimer_dg(sequence, temperature_c, conditions),
        (StructureKind::Heterodimer, Some(b)) => heterodimer_dg(sequence, b, temperature_c, conditions),
        (StructureKind::Duplex, Some(b)) => duplex_dg(sequence, b, temperature_c, conditions),
        (_, None) => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SiteStrand {
    Top,
    Bottom,
}

/// A primer-sized template window the primer could also prime from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OffTargetSite {
    pub strand: SiteStrand,
    /// 5′ position of the window in that strand's own coordinates.
    pub position: usize,
    pub three_prime_run: usize,
    pub identity: f64,
    pub dg: f64,
}

fn strand_windows(template: &Template, strand: SiteStrand, len: usize) -> (DNAstring, usize) {
    let seq = match strand {
        SiteStrand::Top => template.forward().to_vec(),
        SiteStrand::Bottom => reverse_complement(template.forward()),
    };
    let n = seq.len();
    if template.is_circular() && n >= len {
        let mut extended = seq.clone();
        extended.extend_from_slice(&seq[..len - 1]);
        (extended, n)
    } else {
        let count = (n + 1).saturating_sub(len);
        (seq, count)
    }
}

/// Sites other than `intended` where the primer could bind.
///
/// Binding is judged by identity between the primer and a window of the
/// same strand orientation; the primer anneals to that window's complement.
pub fn off_target_sites(
    primer: &[u8],
    template: &Template,
    intended: Option<(SiteStrand, usize)>,
    temperature_c: f64,
    conditions: &ThermoConditions,
) -> Vec<OffTargetSite> {
    let len = primer.len();
    if len < MIN_DIMER_LENGTH || template.len() < len {
        return vec![];
    }
    let mut sites = vec![];
    for strand in [SiteStrand::Top, SiteStrand::Bottom] {
        let (seq, count) = strand_windows(template, strand, len);
        for position in 0..count {
            if intended == Some((strand, position)) {
                continue;
            }
            let window = &seq[position..position + len];
            let three_prime_run = primer
                .iter()
                .rev()
                .zip(window.iter().rev())
                .take_while(|(p, w)| p == w)
                .count();
            let matches = primer.iter().zip(window).filter(|(p, w)| p == w).count();
            let identity = matches as f64 / len as f64;
            if three_prime_run < OFF_TARGET_MIN_RUN && identity < OFF_TARGET_MIN_IDENTITY {
                continue;
            }
            let dg = best_matching_run_dg(primer, window, temperature_c, conditions);
            sites.push(OffTargetSite {
                strand,
                position,
                three_prime_run,
                identity,
                dg,
            });
        }
    }
    sites
}

fn best_matching_run_dg(
    primer: &[u8],
    window: &[u8],
    temperature_c: f64,
    conditions: &ThermoConditions,
) -> f64 {
    let n = primer.len();
    let mut best = 0.0f64;
    let mut start = None;
    for i in 0..=n {
        let same = i < n && primer[i] == window[i];
        if same {
            start.get_or_insert(i);
        } else if let Some(s) = start.take() {
            if i - s >= 2 {
                best = best.min(duplex_free_energy(&primer[s..i], temperature_c, conditions));
            }
        }
    }
    best
}

/// Most stable off-target binding ΔG, or 0.0 when there is none.
pub fn off_target_dg(sites: &[OffTargetSite]) -> f64 {
    sites.iter().map(|s| s.dg).fold(0.0, f64::min)
}
