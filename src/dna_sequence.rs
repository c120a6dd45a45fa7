use crate::error::{PrimerError, PrimerResult};
use bio::io::fasta;
use gb_io::seq::Topology;
use serde::{Deserialize, Serialize};
use std::{fmt, fs::File, ops::Range};

pub type DNAstring = Vec<u8>;

/// Uppercase a sequence and reject anything outside `ACGT`.
pub fn normalize_dna(sequence: &str) -> PrimerResult<DNAstring> {
    sequence
        .bytes()
        .enumerate()
        .map(|(i, b)| match b.to_ascii_uppercase() {
            c @ (b'A' | b'C' | b'G' | b'T') => Ok(c),
            _ => Err(PrimerError::invalid_input(format!(
                "Invalid base '{}' at position {i}; only A, C, G and T are allowed",
                b as char
            ))),
        })
        .collect()
}

#[inline(always)]
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'C' => b'G',
        b'G' => b'C',
        b'T' => b'A',
        other => other,
    }
}

#[inline(always)]
pub fn is_complementary(a: u8, b: u8) -> bool {
    complement(a) == b
}

pub fn reverse_complement(sequence: &[u8]) -> DNAstring {
    bio::alphabets::dna::revcomp(sequence)
}

pub fn gc_fraction(sequence: &[u8]) -> f64 {
    if sequence.is_empty() {
        return 0.0;
    }
    let gc = sequence
        .iter()
        .filter(|&&c| c == b'G' || c == b'C')
        .count() as f64;
    gc / sequence.len() as f64
}

/// Length of the longest single-base run.
pub fn longest_homopolymer(sequence: &[u8]) -> usize {
    let mut best = 0;
    let mut run = 0;
    let mut last = None;
    for &b in sequence {
        if Some(b) == last {
            run += 1;
        } else {
            run = 1;
            last = Some(b);
        }
        best = best.max(run);
    }
    best
}

pub fn to_string(sequence: &[u8]) -> String {
    String::from_utf8_lossy(sequence).into_owned()
}

/// A validated template, linear or circular.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Template {
    name: Option<String>,
    seq: DNAstring,
    circular: bool,
}

impl Template {
    pub fn from_sequence(sequence: &str) -> PrimerResult<Template> {
        Ok(Template {
            name: None,
            seq: normalize_dna(sequence)?,
            circular: false,
        })
    }

    pub fn circular(sequence: &str) -> PrimerResult<Template> {
        let mut ret = Self::from_sequence(sequence)?;
        ret.circular = true;
        Ok(ret)
    }

    pub fn from_fasta_file(filename: &str) -> PrimerResult<Vec<Template>> {
        let file = File::open(filename)?;
        fasta::Reader::new(file)
            .records()
            .map(|record| {
                let record = record.map_err(|e| {
                    PrimerError::io(format!("Could not read FASTA record in '{filename}': {e}"))
                })?;
                Ok(Template {
                    name: Some(record.id().to_string()),
                    seq: normalize_dna(&String::from_utf8_lossy(record.seq()))?,
                    circular: false,
                })
            })
            .collect()
    }

    pub fn from_genbank_file(filename: &str) -> PrimerResult<Vec<Template>> {
        gb_io::reader::parse_file(filename)
            .map_err(|e| PrimerError::io(format!("Could not parse GenBank file '{filename}': {e}")))?
            .into_iter()
            .map(|seq| {
                Ok(Template {
                    name: seq.name.clone(),
                    seq: normalize_dna(&String::from_utf8_lossy(&seq.seq))?,
                    circular: seq.topology == Topology::Circular,
                })
            })
            .collect()
    }

    /// Pick the loader from the file extension.
    pub fn from_file(filename: &str) -> PrimerResult<Vec<Template>> {
        let lower = filename.to_ascii_lowercase();
        if lower.ends_with(".gb") || lower.ends_with(".gbk") || lower.ends_with(".genbank") {
            Self::from_genbank_file(filename)
        } else {
            Self::from_fasta_file(filename)
        }
    }

    pub fn name(&self) -> &Option<String> {
        &self.name
    }

    pub fn forward(&self) -> &[u8] {
        &self.seq
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq.is_empty()
    }

    pub fn is_circular(&self) -> bool {
        self.circular
    }

    pub fn set_circular(&mut self, circular: bool) {
        self.circular = circular;
    }

    /// Signed-range access; negative or overlong coordinates wrap on
    /// circular templates and yield `None` on linear ones.
    pub fn get_signed_range(&self, start: isize, end: isize) -> Option<DNAstring> {
        if start >= end || self.is_empty() {
            return None;
        }
        if self.circular {
            let len = self.len() as isize;
            if end - start > len {
                return None;
            }
            let s = start.rem_euclid(len) as usize;
            return self.get_range_safe(s..s + (end - start) as usize);
        }
        if start < 0 {
            return None;
        }
        self.get_range_safe(start as usize..end as usize)
    }

    pub fn get_range_safe(&self, range: Range<usize>) -> Option<DNAstring> {
        let Range { start, end } = range;
        if start >= end || self.is_empty() {
            return None;
        }
        let start = if self.is_circular() {
            start % self.len()
        } else {
            start
        };
        let end = if self.is_circular() {
            (end - 1) % self.len()
        } else {
            end - 1
        };
        if start >= self.len() || end >= self.len() {
            return None;
        }
        if start > end {
            if self.is_circular() {
                Some(
                    self.seq[start..]
                        .iter()
                        .chain(self.seq[..=end].iter())
                        .copied()
                        .collect(),
                )
            } else {
                None
            }
        } else {
            Some(self.seq[start..=end].to_vec())
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.seq))
    }
}
