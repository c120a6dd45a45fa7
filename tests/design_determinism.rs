//! End-to-end design runs: repeated requests must give identical results,
//! and the parallel tiers must not leak thread timing into the output.

mod common;

use common::synthetic_sequence;
use gentle_primers::{DesignOptions, DesignRegion, Template, design_primers};

fn options(start: usize, end: usize) -> DesignOptions {
    DesignOptions {
        region: Some(DesignRegion { start, end }),
        include_equilibrium: true,
        ..DesignOptions::default()
    }
}

mod determinism_tests {
    use super::*;

    #[test]
    fn test_repeated_design_is_identical() {
        let template = Template::from_sequence(&synthetic_sequence(360, 42)).unwrap();
        let opts = options(80, 280);
        let first = design_primers(&template, &opts).unwrap();
        let second = design_primers(&template, &opts).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_thread_pool_size_does_not_matter() {
        let template = Template::from_sequence(&synthetic_sequence(360, 43)).unwrap();
        let opts = options(80, 280);
        let single = rayon::ThreadPoolBuilder::new()
            .num_threads(1)
            .build()
            .unwrap()
            .install(|| design_primers(&template, &opts))
            .unwrap();
        let parallel = design_primers(&template, &opts).unwrap();
        assert_eq!(single, parallel);
    }
}

mod result_shape_tests {
    use super::*;

    #[test]
    fn test_alternatives_are_distinct_pairs() {
        let template = Template::from_sequence(&synthetic_sequence(360, 44)).unwrap();
        let result = design_primers(&template, &options(80, 280)).unwrap();
        let mut seen = vec![(result.forward.seq().to_string(), result.reverse.seq().to_string())];
        for alt in &result.alternatives {
            let key = (alt.pair.forward.seq().to_string(), alt.pair.reverse.seq().to_string());
            assert!(!seen.contains(&key), "duplicate pair {key:?}");
            seen.push(key);
        }
    }

    #[test]
    fn test_equilibrium_attached_when_requested() {
        let template = Template::from_sequence(&synthetic_sequence(360, 45)).unwrap();
        let result = design_primers(&template, &options(80, 280)).unwrap();
        let eq = result.equilibrium.as_ref().unwrap();
        assert!((0.0..=1.0).contains(&eq.efficiency));
        assert_eq!(result.scoring.efficiency, Some(eq.efficiency));
        assert!(result.scoring.features.efficiency.is_some());
    }
}
