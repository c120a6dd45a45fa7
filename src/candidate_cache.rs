//! Per-request table of GC fraction, Tm and terminal ΔG for every
//! candidate substring of one strand window.
//!
//! Storage is a band of the start/end triangle: one row per start, one
//! column per permitted length. Stack enthalpy/entropy and GC counts are
//! kept as prefix sums so each entry costs O(1) apart from the palindrome
//! check.

use crate::dna_sequence::DNAstring;
use crate::thermodynamics::{
    ThermoConditions, finish_duplex, is_self_complementary, stack, terminal_free_energy,
    tm_from_parameters,
};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct CandidateCache {
    seq: DNAstring,
    min_len: usize,
    max_len: usize,
    gc: Vec<f64>,
    tm: Vec<f64>,
    /// Indexed by exclusive end position.
    terminal: Vec<f64>,
}

impl CandidateCache {
    /// `seq` is read 5′→3′ in primer orientation.
    pub fn build(seq: &[u8], min_len: usize, max_len: usize, conditions: &ThermoConditions) -> Self {
        let n = seq.len();
        let band = max_len + 1 - min_len.min(max_len);
        let mut gc_prefix = vec![0usize; n + 1];
        for (i, b) in seq.iter().enumerate() {
            gc_prefix[i + 1] = gc_prefix[i] + usize::from(*b == b'G' || *b == b'C');
        }
        // stack_prefix[k] sums stacks (0,1)..(k-1,k)
        let mut dh_prefix = vec![0.0; n.max(1)];
        let mut ds_prefix = vec![0.0; n.max(1)];
        for k in 1..n {
            let (dh, ds) = stack(seq[k - 1], seq[k]);
            dh_prefix[k] = dh_prefix[k - 1] + dh;
            ds_prefix[k] = ds_prefix[k - 1] + ds;
        }

        let mut gc = vec![f64::NAN; n * band];
        let mut tm = vec![f64::NAN; n * band];
        for start in 0..n {
            for len in min_len..=max_len {
                let end = start + len;
                if len < 2 || end > n {
                    continue;
                }
                let idx = start * band + (len - min_len);
                gc[idx] = (gc_prefix[end] - gc_prefix[start]) as f64 / len as f64;
                let window = &seq[start..end];
                let self_comp = is_self_complementary(window);
                let (dh, ds) = finish_duplex(
                    dh_prefix[end - 1] - dh_prefix[start],
                    ds_prefix[end - 1] - ds_prefix[start],
                    window[0],
                    window[len - 1],
                    len,
                    self_comp,
                    conditions,
                );
                tm[idx] = tm_from_parameters(dh, ds, self_comp, conditions);
            }
        }
        let terminal = (0..=n)
            .map(|end| terminal_free_energy(&seq[..end], conditions))
            .collect();
        debug!(positions = n, min_len, max_len, "built candidate cache");
        Self {
            seq: seq.to_vec(),
            min_len,
            max_len,
            gc,
            tm,
            terminal,
        }
    }

    fn index(&self, start: usize, len: usize) -> Option<usize> {
        if len < self.min_len || len > self.max_len || len < 2 || start + len > self.seq.len() {
            return None;
        }
        Some(start * (self.max_len + 1 - self.min_len) + (len - self.min_len))
    }

    pub fn contains(&self, start: usize, len: usize) -> bool {
        self.index(start, len).is_some()
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn min_len(&self) -> usize {
        self.min_len
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn sequence(&self, start: usize, len: usize) -> Option<&[u8]> {
        self.index(start, len).map(|_| &self.seq[start..start + len])
    }

    pub fn gc(&self, start: usize, len: usize) -> Option<f64> {
        self.index(start, len).map(|i| self.gc[i])
    }

    pub fn tm(&self, start: usize, len: usize) -> Option<f64> {
        self.index(start, len).map(|i| self.tm[i])
    }

    pub fn terminal_dg(&self, start: usize, len: usize) -> Option<f64> {
        self.index(start, len).map(|_| self.terminal[start + len])
    }

    /// Every cached (start, length) in start-major order.
    pub fn entries(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.seq.len()).flat_map(move |start| {
            (self.min_len..=self.max_len)
                .filter(move |&len| self.contains(start, len))
                .map(move |len| (start, len))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dna_sequence::gc_fraction;
    use crate::thermodynamics::melting_temperature;

    const SEQ: &[u8] = b"ATGACCATGATTACGCCAAGCTTGCATGCCTGCAGGTCGACTCTAGAGGATCC";

    #[test]
    fn test_cache_matches_direct_evaluation() {
        let cond = ThermoConditions::default();
        let cache = CandidateCache::build(SEQ, 18, 24, &cond);
        for (start, len) in cache.entries() {
            let window = &SEQ[start..start + len];
            let direct = melting_temperature(window, &cond);
            assert!((cache.tm(start, len).unwrap() - direct).abs() < 1e-9);
            assert!((cache.gc(start, len).unwrap() - gc_fraction(window)).abs() < 1e-12);
            assert_eq!(
                cache.terminal_dg(start, len).unwrap(),
                terminal_free_energy(window, &cond)
            );
        }
    }

    #[test]
    fn test_palindrome_uses_symmetry() {
        let cond = ThermoConditions::default();
        let seq = b"AAGAATTCGCGAATTCTT";
        let cache = CandidateCache::build(seq, 18, 18, &cond);
        assert!((cache.tm(0, 18).unwrap() - melting_temperature(seq, &cond)).abs() < 1e-9);
    }

    #[test]
    fn test_bounds() {
        let cache = CandidateCache::build(SEQ, 18, 24, &ThermoConditions::default());
        assert!(cache.contains(0, 18));
        assert!(!cache.contains(0, 17));
        assert!(!cache.contains(0, 25));
        assert!(!cache.contains(SEQ.len() - 17, 18));
        assert_eq!(cache.sequence(2, 18), Some(&SEQ[2..20]));
        let count = cache.entries().count();
        let expected: usize = (18..=24).map(|l| SEQ.len() + 1 - l).sum();
        assert_eq!(count, expected);
    }
}
