//! Shared fixtures for the integration tests.

/// Deterministic pseudo-random DNA with roughly 56 % GC.
pub fn synthetic_sequence(len: usize, seed: u64) -> String {
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

/// Same generator as [`synthetic_sequence`] with the GC share set in percent.
#[allow(dead_code)]
pub fn sequence_with_gc(len: usize, seed: u64, gc_percent: u64) -> String {
    let mut state = seed;
    (0..len)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let r = (state >> 33) % 100;
            if r < gc_percent / 2 {
                'G'
            } else if r < gc_percent {
                'C'
            } else if r < (100 + gc_percent) / 2 {
                'A'
            } else {
                'T'
            }
        })
        .collect()
}
