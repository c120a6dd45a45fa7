//! Tiered primer pair search and the scoring entry points.
//!
//! A design request walks three tiers of increasing cost: a cache-backed
//! quick reject over every candidate, full single-primer scoring of a
//! diversity-narrowed pool, and pair scoring of the surviving cross product
//! (plus the joint-Tm pairs). Pairs are bucketed by Tm difference and worst
//! structure ΔG; the first non-empty bucket wins unless exhaustive search is
//! requested.
//!
//! Scoring of individual candidates and pairs runs on rayon, always
//! collected in input order, so results match a sequential run.

use crate::candidate_cache::CandidateCache;
use crate::dna_sequence::{DNAstring, Template, gc_fraction, normalize_dna, reverse_complement};
use crate::equilibrium::{EquilibriumResult, PairFreeEnergies, StrandFreeEnergies, solve_free_energies};
use crate::error::{PrimerError, PrimerResult};
use crate::options::{DesignOptions, DesignRegion, MIN_PRIMER_LENGTH};
use crate::primer::{Primer, PrimerEnergies, PrimerMeasurements, Scoring, Strand};
use crate::scoring::{PairScore, Scorer};
use crate::secondary_structure::{
    OffTargetSite, SiteStrand, hairpin_dg, heterodimer_dg, homodimer_dg, off_target_dg, off_target_sites,
};
use crate::selection::{
    AlternativeLabel, DiversityPoint, LabelRule, diversity_select, distinguishing_labels, hybrid_select,
};
use crate::thermodynamics::{
    REFERENCE_TEMPERATURE, ThermoConditions, duplex_free_energy, melting_temperature, terminal_free_energy,
};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use tracing::{debug, info, warn};

/// Joint-Tm bins are this wide (°C) and matched within this many bins.
const JOINT_BIN_WIDTH: f64 = 1.0;
const JOINT_BIN_REACH: i64 = 2;
/// Alternatives always include this many next-best pairs.
const ALTERNATIVE_TOP_K: usize = 2;
const SMART_DESIGN_STEPS: [isize; 4] = [-2, -1, 1, 2];

/// Search-order bucket of a pair, best first. Only used to prioritize;
/// the user-facing tier comes from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TierBucket {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl TierBucket {
    pub fn classify(tm_diff: f64, worst_structure_dg: f64) -> Self {
        match (tm_diff, worst_structure_dg) {
            (t, g) if t <= 2.0 && g > -3.0 => TierBucket::Excellent,
            (t, g) if t <= 3.5 && g > -5.0 => TierBucket::Good,
            (t, g) if t <= 5.0 && g > -8.0 => TierBucket::Fair,
            _ => TierBucket::Poor,
        }
    }
}

/// Cache coordinates of one candidate: (offset in strand window, length).
type CandidateKey = (usize, usize);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairCandidate {
    pub forward: Primer,
    pub reverse: Primer,
    /// Effective pair score.
    pub score: f64,
    pub penalty: f64,
    pub tm_diff: f64,
    pub heterodimer_dg: f64,
    pub amplicon_len: usize,
    pub bucket: TierBucket,
    pub scoring: Scoring,
    pub equilibrium: Option<EquilibriumResult>,
    #[serde(skip)]
    keys: (CandidateKey, CandidateKey),
}

impl PairCandidate {
    fn tiebreak(&self) -> (Option<isize>, usize, Option<isize>, usize, &str, &str) {
        (
            self.forward.position(),
            self.forward.len(),
            self.reverse.position(),
            self.reverse.len(),
            self.forward.seq(),
            self.reverse.seq(),
        )
    }

    pub fn worst_structure_dg(&self) -> f64 {
        self.forward
            .worst_structure_dg()
            .min(self.reverse.worst_structure_dg())
            .min(self.heterodimer_dg)
    }
}

impl DiversityPoint for PairCandidate {
    fn quality(&self) -> f64 {
        self.score
    }

    fn coordinates(&self) -> Vec<f64> {
        vec![
            self.forward.position().unwrap_or(0) as f64,
            self.reverse.position().unwrap_or(0) as f64,
            (self.forward.len() + self.reverse.len()) as f64,
            (self.forward.tm() + self.reverse.tm()) / 2.0,
        ]
    }
}

/// Bucket first, then composite score (or penalty), then a fixed positional order.
fn heuristic_order(a: &PairCandidate, b: &PairCandidate, use_composite: bool) -> Ordering {
    a.bucket
        .cmp(&b.bucket)
        .then_with(|| {
            if use_composite {
                b.scoring.composite.total_cmp(&a.scoring.composite)
            } else {
                a.penalty.total_cmp(&b.penalty)
            }
        })
        .then_with(|| a.tiebreak().cmp(&b.tiebreak()))
}

/// Global composite order used by exhaustive search; fewer warnings win ties.
fn exhaustive_order(a: &PairCandidate, b: &PairCandidate) -> Ordering {
    b.scoring
        .composite
        .total_cmp(&a.scoring.composite)
        .then_with(|| a.scoring.warnings.len().cmp(&b.scoring.warnings.len()))
        .then_with(|| a.tiebreak().cmp(&b.tiebreak()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alternative {
    pub pair: PairCandidate,
    pub labels: Vec<AlternativeLabel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignResult {
    pub forward: Primer,
    pub reverse: Primer,
    pub scoring: Scoring,
    pub amplicon_len: usize,
    pub tm_diff: f64,
    pub heterodimer_dg: f64,
    pub equilibrium: Option<EquilibriumResult>,
    pub alternatives: Vec<Alternative>,
}

impl DesignResult {
    fn new(best: PairCandidate, alternatives: Vec<Alternative>) -> Self {
        Self {
            forward: best.forward,
            reverse: best.reverse,
            scoring: best.scoring,
            amplicon_len: best.amplicon_len,
            tm_diff: best.tm_diff,
            heterodimer_dg: best.heterodimer_dg,
            equilibrium: best.equilibrium,
            alternatives,
        }
    }
}

/// Where a primer sits relative to the template it is measured against.
#[derive(Debug, Clone, Copy, Default)]
struct Placement {
    position: Option<isize>,
    intended: Option<(SiteStrand, usize)>,
    /// Replaces the perfect-duplex target ΔG for mismatched sites.
    target_dg: Option<f64>,
}

/// Thermodynamic context shared by every primer measured in one request.
struct Measurer<'a> {
    conditions: &'a ThermoConditions,
    annealing: f64,
    off_target_template: Option<&'a Template>,
}

impl Measurer<'_> {
    fn measure(
        &self,
        anneal: &[u8],
        tail: &[u8],
        strand: Strand,
        placement: Placement,
        cached: Option<(f64, f64, f64)>,
    ) -> (Primer, Vec<OffTargetSite>) {
        let c = self.conditions;
        let full: DNAstring = tail.iter().chain(anneal).copied().collect();
        let (tm, gc, dg) = cached.unwrap_or_else(|| {
            (
                melting_temperature(anneal, c),
                gc_fraction(anneal),
                terminal_free_energy(anneal, c),
            )
        });
        let sites = match self.off_target_template {
            Some(template) => off_target_sites(anneal, template, placement.intended, self.annealing, c),
            None => vec![],
        };
        let binding = StrandFreeEnergies {
            target: placement
                .target_dg
                .unwrap_or_else(|| duplex_free_energy(anneal, self.annealing, c))
                .min(0.0),
            hairpin: hairpin_dg(&full, self.annealing, c),
            homodimer: homodimer_dg(&full, self.annealing, c),
            off_target: off_target_dg(&sites),
            off_target_sites: sites.len(),
        };
        let energies = PrimerEnergies {
            hairpin: hairpin_dg(&full, REFERENCE_TEMPERATURE, c),
            homodimer: homodimer_dg(&full, REFERENCE_TEMPERATURE, c),
            off_target: binding.off_target,
        };
        let measured = PrimerMeasurements {
            tm,
            gc,
            dg,
            off_target_count: sites.len(),
            energies,
            binding,
        };
        (Primer::new(anneal, tail, strand, placement.position, measured), sites)
    }

    fn pair_equilibrium(&self, forward: &Primer, reverse: Option<&Primer>) -> EquilibriumResult {
        let heterodimer = reverse
            .map(|r| heterodimer_dg(forward.seq().as_bytes(), r.seq().as_bytes(), self.annealing, self.conditions))
            .unwrap_or(0.0);
        let energies = PairFreeEnergies {
            forward: *forward.binding(),
            reverse: reverse.map(|r| *r.binding()),
            heterodimer,
        };
        solve_free_energies(&energies, self.annealing, self.conditions)
    }
}

/// Candidate window for one strand, with its precomputed cache.
struct StrandWindow {
    strand: Strand,
    cache: CandidateCache,
    /// Top-strand coordinate of cache offset 0: the window start for the
    /// forward strand, the window end for the reverse strand.
    anchor: isize,
    offsets: RangeInclusive<usize>,
    tail: DNAstring,
}

impl StrandWindow {
    /// Forward: 5′ start. Reverse: exclusive top-strand end of the site.
    fn position(&self, offset: usize) -> isize {
        match self.strand {
            Strand::Forward => self.anchor + offset as isize,
            Strand::Reverse => self.anchor - offset as isize,
        }
    }

    fn raw(&self, offset: usize, len: usize, scorer: &Scorer) -> Option<RawCandidate> {
        if !self.offsets.contains(&offset) {
            return None;
        }
        let tm = self.cache.tm(offset, len)?;
        let gc = self.cache.gc(offset, len)?;
        let terminal_dg = self.cache.terminal_dg(offset, len)?;
        Some(RawCandidate {
            strand: self.strand,
            offset,
            len,
            position: self.position(offset),
            tm,
            gc,
            terminal_dg,
            quick: scorer.quick_score(tm, gc, len, terminal_dg),
        })
    }
}

#[derive(Debug, Clone)]
struct RawCandidate {
    strand: Strand,
    offset: usize,
    len: usize,
    position: isize,
    tm: f64,
    gc: f64,
    terminal_dg: f64,
    /// `None` when Tier 1 hard-rejects the candidate.
    quick: Option<f64>,
}

impl RawCandidate {
    fn key(&self) -> CandidateKey {
        (self.offset, self.len)
    }
}

impl DiversityPoint for RawCandidate {
    fn quality(&self) -> f64 {
        self.quick.unwrap_or(0.0)
    }

    fn coordinates(&self) -> Vec<f64> {
        vec![self.position as f64, self.len as f64, self.tm]
    }
}

#[derive(Debug, Clone)]
struct ScoredCandidate {
    raw: RawCandidate,
    primer: Primer,
}

/// Explicitly owned state of one design request.
struct DesignContext<'a> {
    template: &'a Template,
    options: &'a DesignOptions,
    scorer: Scorer,
    measurer: Measurer<'a>,
    forward: StrandWindow,
    reverse: StrandWindow,
}

impl<'a> DesignContext<'a> {
    fn new(template: &'a Template, options: &'a DesignOptions) -> PrimerResult<Self> {
        options.validate()?;
        let n = template.len();
        let search = &options.search;
        let max_len = search.effective_max_len();
        if n < max_len {
            return Err(PrimerError::invalid_input(format!(
                "Template of {n} bp is shorter than the maximum primer length {max_len}"
            )));
        }
        let region = options.region.unwrap_or(DesignRegion { start: 0, end: n });
        if region.end > n {
            return Err(PrimerError::invalid_input(format!(
                "Design region {}..{} exceeds the {n} bp template",
                region.start, region.end
            )));
        }
        let (fwd_tail, rev_tail) = options.tails()?;
        let conditions = &options.conditions;
        let forward = forward_window(template, region, search.position_window, search.min_len, max_len, conditions, fwd_tail)?;
        let reverse = reverse_window(template, region, search.position_window, search.min_len, max_len, conditions, rev_tail)?;
        let measurer = Measurer {
            conditions,
            annealing: options.annealing_temperature(),
            off_target_template: Some(template),
        };
        Ok(Self {
            template,
            options,
            scorer: Scorer::new(&options.scoring),
            measurer,
            forward,
            reverse,
        })
    }

    fn window(&self, strand: Strand) -> &StrandWindow {
        match strand {
            Strand::Forward => &self.forward,
            Strand::Reverse => &self.reverse,
        }
    }

    fn raw_candidates(&self, strand: Strand) -> Vec<RawCandidate> {
        let window = self.window(strand);
        window
            .cache
            .entries()
            .filter_map(|(offset, len)| window.raw(offset, len, &self.scorer))
            .collect()
    }

    /// Tier 1 survivors, best quick score first.
    fn tier1(&self, raws: &[RawCandidate]) -> Vec<RawCandidate> {
        let mut survivors: Vec<RawCandidate> = raws.iter().filter(|r| r.quick.is_some()).cloned().collect();
        survivors.sort_by(|a, b| {
            b.quality()
                .total_cmp(&a.quality())
                .then_with(|| (a.position, a.len).cmp(&(b.position, b.len)))
        });
        survivors
    }

    fn intended_site(&self, raw: &RawCandidate) -> (SiteStrand, usize) {
        let n = self.template.len() as isize;
        match raw.strand {
            Strand::Forward => (SiteStrand::Top, raw.position.rem_euclid(n) as usize),
            Strand::Reverse => (SiteStrand::Bottom, (n - raw.position).rem_euclid(n) as usize),
        }
    }

    /// Reported template coordinate; reverse ends stay in 1..=n.
    fn reported_position(&self, raw: &RawCandidate) -> isize {
        let n = self.template.len() as isize;
        if !self.template.is_circular() {
            return raw.position;
        }
        match raw.strand {
            Strand::Forward => raw.position.rem_euclid(n),
            Strand::Reverse => (raw.position - 1).rem_euclid(n) + 1,
        }
    }

    /// Tier 2 scoring of one candidate.
    fn score_candidate(&self, raw: &RawCandidate) -> Option<ScoredCandidate> {
        let window = self.window(raw.strand);
        let anneal = window.cache.sequence(raw.offset, raw.len)?;
        let placement = Placement {
            position: Some(self.reported_position(raw)),
            intended: Some(self.intended_site(raw)),
            target_dg: None,
        };
        let (primer, sites) = self.measurer.measure(
            anneal,
            &window.tail,
            raw.strand,
            placement,
            Some((raw.tm, raw.gc, raw.terminal_dg)),
        );
        let primer = self.scorer.score_individual(&primer, &sites);
        Some(ScoredCandidate { raw: raw.clone(), primer })
    }

    fn score_candidates(&self, raws: &[RawCandidate]) -> Vec<ScoredCandidate> {
        raws.par_iter().filter_map(|raw| self.score_candidate(raw)).collect()
    }

    fn amplicon_len(&self, forward: &RawCandidate, reverse: &RawCandidate) -> Option<usize> {
        let n = self.template.len() as isize;
        let mut span = reverse.position - forward.position;
        if self.template.is_circular() {
            if span <= 0 {
                span += n;
            }
            if span > n {
                return None;
            }
        }
        (span >= (forward.len + reverse.len) as isize).then_some(span as usize)
    }

    /// Tier 3 evaluation; `None` when rejected.
    fn evaluate_pair(&self, forward: &ScoredCandidate, reverse: &ScoredCandidate, cutoffs: bool) -> Option<PairCandidate> {
        let amplicon_len = self.amplicon_len(&forward.raw, &reverse.raw)?;
        let keys = (forward.raw.key(), reverse.raw.key());
        let search = &self.options.search;
        let (f, r) = (&forward.primer, &reverse.primer);
        if cutoffs && (f.tm() - r.tm()).abs() > search.max_tm_diff {
            return None;
        }
        let het = heterodimer_dg(
            f.seq().as_bytes(),
            r.seq().as_bytes(),
            REFERENCE_TEMPERATURE,
            self.measurer.conditions,
        );
        if cutoffs && het < search.min_heterodimer_dg {
            return None;
        }
        let equilibrium = self
            .options
            .include_equilibrium
            .then(|| self.measurer.pair_equilibrium(f, Some(r)));
        let pair = self.scorer.score_pair(f, r, het, equilibrium.as_ref());
        Some(pair_candidate(pair, amplicon_len, equilibrium, keys))
    }

    fn evaluate_pairs(
        &self,
        forward: &BTreeMap<CandidateKey, ScoredCandidate>,
        reverse: &BTreeMap<CandidateKey, ScoredCandidate>,
        pairs: &[(CandidateKey, CandidateKey)],
    ) -> Vec<PairCandidate> {
        let run = |cutoffs: bool| -> Vec<PairCandidate> {
            pairs
                .par_iter()
                .filter_map(|(fk, rk)| {
                    let f = forward.get(fk)?;
                    let r = reverse.get(rk)?;
                    self.evaluate_pair(f, r, cutoffs)
                })
                .collect()
        };
        let evaluated = run(true);
        if evaluated.is_empty() && !pairs.is_empty() {
            warn!(
                pairs = pairs.len(),
                "no pair passed the Tm difference and heterodimer cutoffs, evaluating without them"
            );
            return run(false);
        }
        evaluated
    }

    /// Pairs of raw candidates whose Tm bins lie within reach, ranked by
    /// 10·ΔTm² + 0.2·|Δlen| + 0.1·(|ΔG_f| + |ΔG_r|).
    fn joint_tm_pairs(&self, forward: &[RawCandidate], reverse: &[RawCandidate]) -> Vec<(usize, usize)> {
        let limit = self.options.search.joint_pairs;
        if limit == 0 {
            return vec![];
        }
        let bin = |tm: f64| (tm / JOINT_BIN_WIDTH).round() as i64;
        let mut bins: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (j, r) in reverse.iter().enumerate().filter(|(_, r)| r.tm.is_finite()) {
            bins.entry(bin(r.tm)).or_default().push(j);
        }
        let mut scored: Vec<(f64, usize, usize)> = vec![];
        for (i, f) in forward.iter().enumerate().filter(|(_, f)| f.tm.is_finite()) {
            let b = bin(f.tm);
            for (_, js) in bins.range(b - JOINT_BIN_REACH..=b + JOINT_BIN_REACH) {
                for &j in js {
                    let r = &reverse[j];
                    if self.amplicon_len(f, r).is_none() {
                        continue;
                    }
                    let d_tm = f.tm - r.tm;
                    let score = 10.0 * d_tm * d_tm
                        + 0.2 * (f.len as f64 - r.len as f64).abs()
                        + 0.1 * (f.terminal_dg.abs() + r.terminal_dg.abs());
                    scored.push((score, i, j));
                }
            }
        }
        scored.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| (a.1, a.2).cmp(&(b.1, b.2))));
        scored.truncate(limit);
        scored.into_iter().map(|(_, i, j)| (i, j)).collect()
    }

    /// Scores `raws` missing from `scored` and adds them.
    fn ensure_scored(&self, raws: &[RawCandidate], scored: &mut BTreeMap<CandidateKey, ScoredCandidate>) {
        let missing: Vec<RawCandidate> = raws.iter().filter(|r| !scored.contains_key(&r.key())).cloned().collect();
        for candidate in self.score_candidates(&missing) {
            scored.insert(candidate.raw.key(), candidate);
        }
    }

    fn no_candidate(strand: Strand) -> PrimerError {
        PrimerError::no_candidate(format!(
            "No {strand} primer candidate satisfies the hard Tm/GC/length bounds"
        ))
    }

    /// Tiers 1–3 plus the joint-Tm pass. Returns every evaluated pair,
    /// ranked by [`heuristic_order`].
    fn heuristic_pairs(&self, raw_fwd: &[RawCandidate], raw_rev: &[RawCandidate]) -> PrimerResult<Vec<PairCandidate>> {
        let search = &self.options.search;
        let tier1_fwd = self.tier1(raw_fwd);
        let tier1_rev = self.tier1(raw_rev);
        debug!(
            forward = tier1_fwd.len(),
            reverse = tier1_rev.len(),
            "tier 1 survivors"
        );
        if tier1_fwd.is_empty() {
            return Err(Self::no_candidate(Strand::Forward));
        }
        if tier1_rev.is_empty() {
            return Err(Self::no_candidate(Strand::Reverse));
        }

        let tier2 = |survivors: &[RawCandidate]| -> Vec<ScoredCandidate> {
            let picks: Vec<RawCandidate> = diversity_select(survivors, search.tier2_pool)
                .into_iter()
                .map(|i| survivors[i].clone())
                .collect();
            let mut scored = self.score_candidates(&picks);
            scored.sort_by(|a, b| {
                b.primer
                    .scoring()
                    .effective
                    .total_cmp(&a.primer.scoring().effective)
                    .then_with(|| (a.raw.position, a.raw.len).cmp(&(b.raw.position, b.raw.len)))
            });
            scored
        };
        let tier2_fwd = tier2(&tier1_fwd);
        let tier2_rev = tier2(&tier1_rev);
        debug!(forward = tier2_fwd.len(), reverse = tier2_rev.len(), "tier 2 scored");

        let mut fwd_scored: BTreeMap<CandidateKey, ScoredCandidate> =
            tier2_fwd.iter().map(|c| (c.raw.key(), c.clone())).collect();
        let mut rev_scored: BTreeMap<CandidateKey, ScoredCandidate> =
            tier2_rev.iter().map(|c| (c.raw.key(), c.clone())).collect();

        let mut pairs: BTreeSet<(CandidateKey, CandidateKey)> = tier2_fwd
            .iter()
            .take(search.tier3_pool)
            .cartesian_product(tier2_rev.iter().take(search.tier3_pool))
            .map(|(f, r)| (f.raw.key(), r.raw.key()))
            .collect();

        let joint = self.joint_tm_pairs(raw_fwd, raw_rev);
        let joint_fwd: Vec<RawCandidate> = joint.iter().map(|&(i, _)| raw_fwd[i].clone()).collect();
        let joint_rev: Vec<RawCandidate> = joint.iter().map(|&(_, j)| raw_rev[j].clone()).collect();
        self.ensure_scored(&joint_fwd, &mut fwd_scored);
        self.ensure_scored(&joint_rev, &mut rev_scored);
        pairs.extend(joint.iter().map(|&(i, j)| (raw_fwd[i].key(), raw_rev[j].key())));
        debug!(pairs = pairs.len(), joint = joint.len(), "tier 3 pairs");

        let pairs: Vec<(CandidateKey, CandidateKey)> = pairs.into_iter().collect();
        let mut evaluated = self.evaluate_pairs(&fwd_scored, &rev_scored, &pairs);
        if evaluated.is_empty() {
            return Err(PrimerError::no_candidate(
                "No forward/reverse combination forms a valid amplicon",
            ));
        }
        let use_composite = search.use_composite_score;
        evaluated.sort_by(|a, b| heuristic_order(a, b, use_composite));
        if let Some(best) = evaluated.first() {
            if best.bucket != TierBucket::Excellent {
                warn!(bucket = ?best.bucket, "no pair in the excellent search bucket");
            }
        }
        Ok(evaluated)
    }

    /// Every Tier 1 survivor pair plus the heuristic pool, ranked by
    /// [`exhaustive_order`].
    fn exhaustive_pairs(
        &self,
        raw_fwd: &[RawCandidate],
        raw_rev: &[RawCandidate],
        heuristic: Vec<PairCandidate>,
    ) -> Vec<PairCandidate> {
        let tier1_fwd = self.tier1(raw_fwd);
        let tier1_rev = self.tier1(raw_rev);
        let mut fwd_scored = BTreeMap::new();
        let mut rev_scored = BTreeMap::new();
        self.ensure_scored(&tier1_fwd, &mut fwd_scored);
        self.ensure_scored(&tier1_rev, &mut rev_scored);
        let known: BTreeSet<(CandidateKey, CandidateKey)> = heuristic.iter().map(|p| p.keys).collect();
        let pairs: Vec<(CandidateKey, CandidateKey)> = tier1_fwd
            .iter()
            .cartesian_product(tier1_rev.iter())
            .map(|(f, r)| (f.key(), r.key()))
            .filter(|k| !known.contains(k))
            .collect();
        debug!(pairs = pairs.len(), "exhaustive pair evaluation");
        let mut all = heuristic;
        all.extend(self.evaluate_pairs(&fwd_scored, &rev_scored, &pairs));
        all.sort_by(exhaustive_order);
        all
    }

    /// Nudges each primer's length by up to two bases at a fixed 5′ end and
    /// keeps a variant only if its 3′ score rises and the composite holds.
    fn smart_design(&self, best: PairCandidate) -> PairCandidate {
        let ((f_off, f_len), (r_off, r_len)) = best.keys;
        let rescore = |strand: Strand, offset: usize, len: usize| -> Option<ScoredCandidate> {
            let raw = self.window(strand).raw(offset, len, &self.scorer)?;
            if raw.quick.is_none() {
                return None;
            }
            self.score_candidate(&raw)
        };
        let (Some(fwd), Some(rev)) = (
            rescore(Strand::Forward, f_off, f_len),
            rescore(Strand::Reverse, r_off, r_len),
        ) else {
            return best;
        };
        let mut variants = vec![];
        for step in SMART_DESIGN_STEPS {
            if let Some(len) = f_len.checked_add_signed(step) {
                if let Some(nudged) = rescore(Strand::Forward, f_off, len) {
                    variants.push((Strand::Forward, nudged));
                }
            }
            if let Some(len) = r_len.checked_add_signed(step) {
                if let Some(nudged) = rescore(Strand::Reverse, r_off, len) {
                    variants.push((Strand::Reverse, nudged));
                }
            }
        }
        let accepted = variants
            .par_iter()
            .filter_map(|(strand, nudged)| {
                let (old, pair) = match strand {
                    Strand::Forward => (&best.forward, self.evaluate_pair(nudged, &rev, true)?),
                    Strand::Reverse => (&best.reverse, self.evaluate_pair(&fwd, nudged, true)?),
                };
                let improves_three_prime =
                    nudged.primer.scoring().features.three_prime > old.scoring().features.three_prime;
                (improves_three_prime && pair.scoring.composite >= best.scoring.composite).then_some(pair)
            })
            .collect::<Vec<_>>();
        match accepted.into_iter().min_by(exhaustive_order) {
            Some(nudged) => {
                debug!(
                    forward = nudged.forward.seq(),
                    reverse = nudged.reverse.seq(),
                    "smart design adjusted primer length"
                );
                nudged
            }
            None => best,
        }
    }

    fn alternatives(&self, best: &PairCandidate, ranked: &[PairCandidate]) -> Vec<Alternative> {
        let max = self.options.search.max_alternatives;
        let rest: Vec<PairCandidate> = ranked.iter().filter(|p| p.keys != best.keys).cloned().collect();
        if max == 0 || rest.is_empty() {
            return vec![];
        }
        let composite = |p: &PairCandidate| p.scoring.composite;
        let tm_match = |p: &PairCandidate| -p.tm_diff;
        let dimer = |p: &PairCandidate| p.heterodimer_dg;
        let short = |p: &PairCandidate| -(p.amplicon_len as f64);
        let objectives: [&dyn Fn(&PairCandidate) -> f64; 4] = [&composite, &tm_match, &dimer, &short];
        let picked: Vec<PairCandidate> = hybrid_select(&rest, ALTERNATIVE_TOP_K, max, &objectives)
            .into_iter()
            .map(|i| rest[i].clone())
            .collect();

        let mut field = vec![best.clone()];
        field.extend(picked.iter().cloned());
        let tm_value = |p: &PairCandidate| Some(-p.tm_diff);
        let dimer_value = |p: &PairCandidate| Some(p.heterodimer_dg);
        let amplicon_value = |p: &PairCandidate| Some(-(p.amplicon_len as f64));
        let efficiency_value = |p: &PairCandidate| p.equilibrium.as_ref().map(|e| e.efficiency);
        let rules = [
            LabelRule {
                label: AlternativeLabel::BestTmMatch,
                value: &tm_value,
                margin: 0.5,
            },
            LabelRule {
                label: AlternativeLabel::SafestDimer,
                value: &dimer_value,
                margin: 1.0,
            },
            LabelRule {
                label: AlternativeLabel::ShortestAmplicon,
                value: &amplicon_value,
                margin: 10.0,
            },
            LabelRule {
                label: AlternativeLabel::HighestEfficiency,
                value: &efficiency_value,
                margin: 0.05,
            },
        ];
        let labels = distinguishing_labels(&field, &rules);
        picked
            .into_iter()
            .zip(labels.into_iter().skip(1))
            .map(|(pair, labels)| Alternative { pair, labels })
            .collect()
    }

    fn design(&self) -> PrimerResult<DesignResult> {
        let search = &self.options.search;
        let raw_fwd = self.raw_candidates(Strand::Forward);
        let raw_rev = self.raw_candidates(Strand::Reverse);
        debug!(forward = raw_fwd.len(), reverse = raw_rev.len(), "raw candidates");

        let heuristic = self.heuristic_pairs(&raw_fwd, &raw_rev)?;
        let ranked = if search.exhaustive_search {
            let heuristic_best = heuristic.first().map(|p| self.finalize(p.clone()));
            let mut ranked = self.exhaustive_pairs(&raw_fwd, &raw_rev, heuristic);
            // The heuristic pick may carry a smart-design nudge the pool lacks.
            if let Some(pick) = heuristic_best {
                if !ranked.iter().any(|p| p.keys == pick.keys) {
                    ranked.push(pick);
                    ranked.sort_by(exhaustive_order);
                }
            }
            ranked
        } else {
            heuristic
        };
        let Some(first) = ranked.first() else {
            return Err(PrimerError::no_candidate("No primer pair could be evaluated"));
        };
        let best = self.finalize(first.clone());
        let alternatives = self.alternatives(&best, &ranked);
        info!(
            forward = best.forward.seq(),
            reverse = best.reverse.seq(),
            composite = best.scoring.composite,
            tier = best.scoring.tier.label(),
            amplicon = best.amplicon_len,
            "selected primer pair"
        );
        Ok(DesignResult::new(best, alternatives))
    }

    fn finalize(&self, best: PairCandidate) -> PairCandidate {
        if self.options.search.use_smart_design {
            self.smart_design(best)
        } else {
            best
        }
    }
}

fn pair_candidate(
    pair: PairScore,
    amplicon_len: usize,
    equilibrium: Option<EquilibriumResult>,
    keys: (CandidateKey, CandidateKey),
) -> PairCandidate {
    let mut candidate = PairCandidate {
        score: pair.scoring.effective,
        penalty: pair.scoring.penalty.total(),
        bucket: TierBucket::Poor,
        tm_diff: pair.tm_diff,
        heterodimer_dg: pair.heterodimer_dg,
        amplicon_len,
        scoring: pair.scoring,
        equilibrium,
        forward: pair.forward,
        reverse: pair.reverse,
        keys,
    };
    candidate.bucket = TierBucket::classify(candidate.tm_diff, candidate.worst_structure_dg());
    candidate
}

fn forward_window(
    template: &Template,
    region: DesignRegion,
    slack: usize,
    min_len: usize,
    max_len: usize,
    conditions: &ThermoConditions,
    tail: DNAstring,
) -> PrimerResult<StrandWindow> {
    let n = template.len() as isize;
    let slack = slack as isize;
    let (mut lo, mut hi) = (region.start as isize - slack, region.start as isize + slack);
    if !template.is_circular() {
        lo = lo.max(0);
        hi = hi.min(n - min_len as isize);
    }
    if hi < lo {
        return Err(PrimerError::no_candidate(
            "No room for a forward primer near the region start",
        ));
    }
    let mut end = hi + max_len as isize;
    end = if template.is_circular() { end.min(lo + n) } else { end.min(n) };
    let seq = template
        .get_signed_range(lo, end)
        .ok_or_else(|| PrimerError::internal(format!("Forward window {lo}..{end} is out of range")))?;
    Ok(StrandWindow {
        strand: Strand::Forward,
        cache: CandidateCache::build(&seq, min_len, max_len, conditions),
        anchor: lo,
        offsets: 0..=(hi - lo) as usize,
        tail,
    })
}

fn reverse_window(
    template: &Template,
    region: DesignRegion,
    slack: usize,
    min_len: usize,
    max_len: usize,
    conditions: &ThermoConditions,
    tail: DNAstring,
) -> PrimerResult<StrandWindow> {
    let n = template.len() as isize;
    let slack = slack as isize;
    let (mut lo, mut hi) = (region.end as isize - slack, region.end as isize + slack);
    if !template.is_circular() {
        lo = lo.max(min_len as isize);
        hi = hi.min(n);
    }
    if hi < lo {
        return Err(PrimerError::no_candidate(
            "No room for a reverse primer near the region end",
        ));
    }
    let mut start = lo - max_len as isize;
    start = if template.is_circular() { start.max(hi - n) } else { start.max(0) };
    let top = template
        .get_signed_range(start, hi)
        .ok_or_else(|| PrimerError::internal(format!("Reverse window {start}..{hi} is out of range")))?;
    Ok(StrandWindow {
        strand: Strand::Reverse,
        cache: CandidateCache::build(&reverse_complement(&top), min_len, max_len, conditions),
        anchor: hi,
        offsets: 0..=(hi - lo) as usize,
        tail,
    })
}

/// Searches `template` for the best primer pair around the design region.
pub fn design_primers(template: &Template, options: &DesignOptions) -> PrimerResult<DesignResult> {
    DesignContext::new(template, options)?.design()
}

fn validated_primer(sequence: &str, role: &str) -> PrimerResult<DNAstring> {
    let seq = normalize_dna(sequence)?;
    if seq.len() < MIN_PRIMER_LENGTH {
        return Err(PrimerError::invalid_input(format!(
            "{role} primer has {} nt; at least {MIN_PRIMER_LENGTH} are required",
            seq.len()
        )));
    }
    Ok(seq)
}

/// First exact occurrence of `needle` in the top strand, wrapping on
/// circular templates.
fn find_exact(template: &Template, needle: &[u8]) -> Option<usize> {
    let seq = template.forward();
    let mut haystack = seq.to_vec();
    if template.is_circular() && !needle.is_empty() && seq.len() >= needle.len() {
        haystack.extend_from_slice(&seq[..needle.len() - 1]);
    }
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
        .filter(|&i| i < seq.len())
}

/// Locates a user-supplied primer. Exact sites are preferred; otherwise the
/// most stable similar site is taken as the target.
fn place_primer(
    anneal: &[u8],
    strand: Strand,
    template: Option<&Template>,
    scan_template: Option<&Template>,
    measurer: &Measurer,
) -> Placement {
    let Some(template) = template else {
        return Placement::default();
    };
    let n = template.len() as isize;
    let same_scan = scan_template.is_none_or(|t| std::ptr::eq(t, template));
    let exact = match strand {
        Strand::Forward => find_exact(template, anneal).map(|s| {
            let s = s as isize;
            (s, (SiteStrand::Top, s as usize))
        }),
        Strand::Reverse => find_exact(template, &reverse_complement(anneal)).map(|i| {
            let e = i as isize + anneal.len() as isize;
            (e, (SiteStrand::Bottom, (n - e).rem_euclid(n) as usize))
        }),
    };
    if let Some((position, intended)) = exact {
        return Placement {
            position: Some(position),
            intended: same_scan.then_some(intended),
            target_dg: None,
        };
    }
    let sites = off_target_sites(anneal, template, None, measurer.annealing, measurer.conditions);
    let Some(best) = sites.iter().min_by(|a, b| a.dg.total_cmp(&b.dg)) else {
        return Placement::default();
    };
    let position = match best.strand {
        SiteStrand::Top => best.position as isize,
        SiteStrand::Bottom => n - best.position as isize,
    };
    Placement {
        position: Some(position),
        intended: same_scan.then_some((best.strand, best.position)),
        target_dg: Some(best.dg),
    }
}

fn scoring_measurer<'a>(
    template: Option<&'a Template>,
    off_target_template: Option<&'a Template>,
    options: &'a DesignOptions,
) -> Measurer<'a> {
    Measurer {
        conditions: &options.conditions,
        annealing: options.annealing_temperature(),
        off_target_template: off_target_template.or(template),
    }
}

fn measure_user_primer(
    sequence: &str,
    strand: Strand,
    template: Option<&Template>,
    off_target_template: Option<&Template>,
    measurer: &Measurer,
    scorer: &Scorer,
) -> PrimerResult<Primer> {
    let anneal = validated_primer(sequence, &strand.to_string())?;
    let placement = place_primer(&anneal, strand, template, off_target_template, measurer);
    let (primer, sites) = measurer.measure(&anneal, b"", strand, placement, None);
    Ok(scorer.score_individual(&primer, &sites))
}

/// Scores one already chosen primer.
pub fn score_single(
    sequence: &str,
    template: Option<&Template>,
    off_target_template: Option<&Template>,
    options: &DesignOptions,
) -> PrimerResult<Primer> {
    options.validate()?;
    let measurer = scoring_measurer(template, off_target_template, options);
    let scorer = Scorer::new(&options.scoring);
    let primer = measure_user_primer(sequence, Strand::Forward, template, off_target_template, &measurer, &scorer)?;
    if !options.include_equilibrium {
        return Ok(primer);
    }
    let equilibrium = measurer.pair_equilibrium(&primer, None);
    Ok(scorer.with_single_equilibrium(&primer, &equilibrium))
}

/// Scores an already chosen pair.
pub fn score_pair(
    forward: &str,
    reverse: &str,
    template: Option<&Template>,
    off_target_template: Option<&Template>,
    options: &DesignOptions,
) -> PrimerResult<PairScore> {
    options.validate()?;
    let measurer = scoring_measurer(template, off_target_template, options);
    let scorer = Scorer::new(&options.scoring);
    let f = measure_user_primer(forward, Strand::Forward, template, off_target_template, &measurer, &scorer)?;
    let r = measure_user_primer(reverse, Strand::Reverse, template, off_target_template, &measurer, &scorer)?;
    let het = heterodimer_dg(
        f.seq().as_bytes(),
        r.seq().as_bytes(),
        REFERENCE_TEMPERATURE,
        &options.conditions,
    );
    let equilibrium = options
        .include_equilibrium
        .then(|| measurer.pair_equilibrium(&f, Some(&r)));
    Ok(scorer.score_pair(&f, &r, het, equilibrium.as_ref()))
}

/// Equilibrium efficiency of a primer, or of a pair when `reverse` is set,
/// at the request's annealing temperature.
pub fn calculate_equilibrium_efficiency(
    forward: &str,
    reverse: Option<&str>,
    template: Option<&Template>,
    options: &DesignOptions,
) -> PrimerResult<EquilibriumResult> {
    options.validate()?;
    let measurer = scoring_measurer(template, None, options);
    let scorer = Scorer::new(&options.scoring);
    let f = measure_user_primer(forward, Strand::Forward, template, None, &measurer, &scorer)?;
    let r = reverse
        .map(|seq| measure_user_primer(seq, Strand::Reverse, template, None, &measurer, &scorer))
        .transpose()?;
    Ok(measurer.pair_equilibrium(&f, r.as_ref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::options::{ScoringOptions, SearchOptions};

    /// Deterministic sequence with roughly 56 % GC.
    fn synthetic_sequence(len: usize, seed: u64) -> String {
        let mut state = seed;
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                match (state >> 33) % 100 {
                    0..=27 => 'G',
                    28..=55 => 'C',
                    56..=77 => 'A',
                    _ => 'T',
                }
            })
            .collect()
    }

    fn region_options(start: usize, end: usize) -> DesignOptions {
        DesignOptions {
            region: Some(DesignRegion { start, end }),
            ..DesignOptions::default()
        }
    }

    #[test]
    fn test_tier_bucket() {
        assert_eq!(TierBucket::classify(1.0, -2.0), TierBucket::Excellent);
        assert_eq!(TierBucket::classify(1.0, -4.0), TierBucket::Good);
        assert_eq!(TierBucket::classify(3.0, -2.0), TierBucket::Good);
        assert_eq!(TierBucket::classify(4.5, -7.0), TierBucket::Fair);
        assert_eq!(TierBucket::classify(6.0, 0.0), TierBucket::Poor);
        assert_eq!(TierBucket::classify(1.0, -9.0), TierBucket::Poor);
    }

    #[test]
    fn test_heuristic_order_ranks_bucket_by_composite() {
        let text = synthetic_sequence(300, 29);
        let forward = &text[40..62];
        let reverse = String::from_utf8(reverse_complement(text[230..252].as_bytes())).unwrap();
        let pair = score_pair(forward, &reverse, None, None, &DesignOptions::default()).unwrap();
        let base = pair_candidate(pair, 212, None, ((0, 22), (0, 22)));

        // Higher composite but lower effective score.
        let mut strong = base.clone();
        strong.scoring.composite = 80.0;
        strong.score = 40.0;
        let mut weak = base.clone();
        weak.scoring.composite = 60.0;
        weak.score = 70.0;

        assert_eq!(heuristic_order(&strong, &weak, true), Ordering::Less);
        assert_eq!(heuristic_order(&weak, &strong, true), Ordering::Greater);

        let mut worse_bucket = strong.clone();
        worse_bucket.bucket = TierBucket::Poor;
        weak.bucket = TierBucket::Excellent;
        assert_eq!(heuristic_order(&weak, &worse_bucket, true), Ordering::Less);
    }

    #[test]
    fn test_design_places_primers_around_region() {
        let text = synthetic_sequence(320, 7);
        let template = Template::from_sequence(&text).unwrap();
        let result = design_primers(&template, &region_options(60, 260)).unwrap();

        let f = &result.forward;
        let r = &result.reverse;
        let fpos = f.position().unwrap();
        let rpos = r.position().unwrap();
        assert!((40..=80).contains(&fpos), "forward at {fpos}");
        assert!((240..=280).contains(&rpos), "reverse ends at {rpos}");
        assert_eq!(result.amplicon_len as isize, rpos - fpos);

        let fpos = fpos as usize;
        assert_eq!(&text[fpos..fpos + f.len()], f.seq());
        let site = &text[rpos as usize - r.len()..rpos as usize];
        assert_eq!(reverse_complement(r.seq().as_bytes()), site.as_bytes().to_vec());

        assert!((0.0..=100.0).contains(&result.scoring.composite));
        assert!(result.alternatives.len() <= SearchOptions::default().max_alternatives);
        assert!(result.alternatives.iter().all(|a| a.pair.forward.seq() != f.seq()
            || a.pair.reverse.seq() != r.seq()));
    }

    #[test]
    fn test_design_with_tails() {
        let text = synthetic_sequence(300, 11);
        let template = Template::from_sequence(&text).unwrap();
        let options = DesignOptions {
            fwd_tail: "ggatcc".to_string(),
            rev_tail: "GAATTC".to_string(),
            ..region_options(50, 250)
        };
        let result = design_primers(&template, &options).unwrap();
        assert!(result.forward.seq().starts_with("GGATCC"));
        assert_eq!(result.forward.tail(), "GGATCC");
        assert!(text.contains(result.forward.anneal()));
        assert!(result.reverse.seq().starts_with("GAATTC"));
        let direct = melting_temperature(result.forward.anneal().as_bytes(), &options.conditions);
        assert!((result.forward.tm() - direct).abs() < 1e-9);
    }

    #[test]
    fn test_design_circular_wraps_origin() {
        let text = synthetic_sequence(260, 3);
        let template = Template::circular(&text).unwrap();
        let result = design_primers(&template, &region_options(5, 180)).unwrap();
        let fpos = result.forward.position().unwrap();
        assert!((0..260).contains(&fpos));
        assert!(result.amplicon_len > 0 && result.amplicon_len <= 260);
    }

    #[test]
    fn test_design_rejects_short_template() {
        let template = Template::from_sequence("ACGTACGTACGTACGTAC").unwrap();
        let err = design_primers(&template, &DesignOptions::default()).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_design_rejects_bad_length_range() {
        let template = Template::from_sequence(&synthetic_sequence(200, 5)).unwrap();
        let options = DesignOptions {
            search: SearchOptions {
                min_len: 24,
                max_len: 20,
                ..SearchOptions::default()
            },
            ..DesignOptions::default()
        };
        assert_eq!(
            design_primers(&template, &options).unwrap_err().code,
            ErrorCode::InvalidInput
        );
    }

    #[test]
    fn test_unreachable_bounds_name_the_strand() {
        let template = Template::from_sequence(&"AT".repeat(150)).unwrap();
        let err = design_primers(&template, &region_options(50, 250)).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoCandidate);
        assert!(err.message.contains("forward"));
    }

    #[test]
    fn test_penalty_ranking_mode() {
        let template = Template::from_sequence(&synthetic_sequence(300, 13)).unwrap();
        let options = DesignOptions {
            search: SearchOptions {
                use_composite_score: false,
                ..SearchOptions::default()
            },
            ..region_options(50, 250)
        };
        let result = design_primers(&template, &options).unwrap();
        assert!(result.scoring.penalty.total() >= 0.0);
    }

    #[test]
    fn test_smart_design_never_lowers_composite() {
        let template = Template::from_sequence(&synthetic_sequence(300, 17)).unwrap();
        let plain = design_primers(&template, &region_options(50, 250)).unwrap();
        let smart = design_primers(
            &template,
            &DesignOptions {
                search: SearchOptions {
                    use_smart_design: true,
                    ..SearchOptions::default()
                },
                ..region_options(50, 250)
            },
        )
        .unwrap();
        assert!(smart.scoring.composite >= plain.scoring.composite);
    }

    #[test]
    fn test_score_pair_validation() {
        let options = DesignOptions::default();
        let err = score_pair("ACGTACG", "ACGTACGTACGTAC", None, None, &options).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        let err = score_pair("ACGTACGTNCGTAC", "ACGTACGTACGTAC", None, None, &options).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_score_pair_locates_primers() {
        let text = synthetic_sequence(300, 19);
        let template = Template::from_sequence(&text).unwrap();
        let forward = &text[40..62];
        let reverse = String::from_utf8(reverse_complement(text[230..252].as_bytes())).unwrap();
        let options = DesignOptions {
            include_equilibrium: true,
            ..DesignOptions::default()
        };
        let pair = score_pair(forward, &reverse, Some(&template), None, &options).unwrap();
        assert_eq!(pair.forward.position(), Some(40));
        assert_eq!(pair.reverse.position(), Some(252));
        assert!(pair.scoring.efficiency.is_some());
        assert!(pair.forward.scoring().efficiency.is_some());
        assert!((0.0..=100.0).contains(&pair.scoring.composite));
    }

    #[test]
    fn test_score_single_lowercase() {
        let options = DesignOptions {
            scoring: ScoringOptions {
                optimal_tm: Some(60.0),
                ..ScoringOptions::default()
            },
            ..DesignOptions::default()
        };
        let upper = score_single("AGCGGATAACAATTTCACACAGGA", None, None, &options).unwrap();
        let lower = score_single("agcggataacaatttcacacagga", None, None, &options).unwrap();
        assert_eq!(upper, lower);
        assert_eq!(upper.off_target_count(), 0);
    }

    #[test]
    fn test_equilibrium_efficiency_pair_is_minimum() {
        let text = synthetic_sequence(300, 23);
        let template = Template::from_sequence(&text).unwrap();
        let forward = &text[30..52];
        let reverse = String::from_utf8(reverse_complement(text[240..262].as_bytes())).unwrap();
        let options = DesignOptions::default();
        let result =
            calculate_equilibrium_efficiency(forward, Some(&reverse), Some(&template), &options).unwrap();
        let rev = result.efficiency_rev.unwrap();
        assert_eq!(result.efficiency, result.efficiency_fwd.min(rev));
        assert!((0.0..=1.0).contains(&result.efficiency));
        assert!(result.bottleneck.is_some());

        let single = calculate_equilibrium_efficiency(forward, None, Some(&template), &options).unwrap();
        assert!(single.bottleneck.is_none());
        assert!(single.efficiency > 0.0);
    }
}
