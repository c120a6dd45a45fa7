//! Templates carrying a second copy of the forward primer window, either
//! repeated or reverse complemented: the designed forward primer must report
//! the extra site and lose some of its binding to it at equilibrium.

mod common;

use common::{sequence_with_gc, synthetic_sequence};
use gentle_primers::dna_sequence::reverse_complement;
use gentle_primers::{
    DesignOptions, DesignRegion, Template, Warning, design_primers, score_single,
};

const REGION_START: usize = 60;
const REGION_END: usize = 300;

/// Random template with `[35, 110)` copied again after the reverse window.
fn duplicated_template() -> (Template, String) {
    let base = synthetic_sequence(340, 7);
    let copy = &base[35..110];
    let tail = synthetic_sequence(40, 8);
    let text = format!("{base}{copy}{tail}");
    (Template::from_sequence(&text).unwrap(), text)
}

fn options() -> DesignOptions {
    DesignOptions {
        region: Some(DesignRegion {
            start: REGION_START,
            end: REGION_END,
        }),
        include_equilibrium: true,
        ..DesignOptions::default()
    }
}

mod design_tests {
    use super::*;

    #[test]
    fn test_forward_primer_sees_duplicate() {
        let (template, _) = duplicated_template();
        let result = design_primers(&template, &options()).unwrap();
        let forward = &result.forward;
        assert!(forward.off_target_count() >= 1);
        assert!(forward.energies().off_target < 0.0);
        assert!(forward.scoring().warnings.contains(&Warning::OffTargetBinding));
        let losses = forward.scoring().losses.unwrap();
        assert!(losses.off_target > 0.0);
    }

    #[test]
    fn test_reverse_primer_is_unique() {
        let (template, _) = duplicated_template();
        let result = design_primers(&template, &options()).unwrap();
        assert_eq!(result.reverse.off_target_count(), 0);
    }
}

mod scoring_tests {
    use super::*;

    #[test]
    fn test_intended_site_is_not_off_target() {
        let (template, text) = duplicated_template();
        let unique = &text[200..222];
        let primer = score_single(unique, Some(&template), None, &DesignOptions::default()).unwrap();
        assert_eq!(primer.position(), Some(200));
        assert_eq!(primer.off_target_count(), 0);
    }

    #[test]
    fn test_separate_off_target_template_counts_every_site() {
        let (template, text) = duplicated_template();
        let primer_seq = &text[200..222];
        let genome = Template::from_sequence(&text).unwrap();
        let primer = score_single(primer_seq, Some(&template), Some(&genome), &DesignOptions::default()).unwrap();
        assert_eq!(primer.off_target_count(), 1);
        assert!(primer.scoring().features.off_target < 1.0);
    }
}

mod gc_rich_tests {
    use super::*;

    /// Two ~70 % GC regions around a neutral middle, then the reverse
    /// complement of the first region's core after the second one.
    fn gc_rich_template(seed: u64) -> Template {
        let lead = sequence_with_gc(20, seed + 50, 45);
        let first = sequence_with_gc(80, seed, 70);
        let middle = sequence_with_gc(140, seed + 10, 50);
        let second = sequence_with_gc(80, seed + 20, 70);
        let spacer = sequence_with_gc(60, seed + 30, 45);
        let complement = String::from_utf8(reverse_complement(first[5..75].as_bytes())).unwrap();
        let tail = sequence_with_gc(40, seed + 40, 45);
        let text = format!("{lead}{first}{middle}{second}{spacer}{complement}{tail}");
        Template::from_sequence(&text).unwrap()
    }

    fn gc_rich_options() -> DesignOptions {
        DesignOptions {
            region: Some(DesignRegion { start: 45, end: 285 }),
            include_equilibrium: true,
            ..DesignOptions::default()
        }
    }

    #[test]
    fn test_complementary_site_is_counted_and_costs_binding() {
        for seed in 1..=3 {
            let result = design_primers(&gc_rich_template(seed), &gc_rich_options()).unwrap();
            let forward = &result.forward;
            assert!(forward.off_target_count() >= 1, "seed {seed}");
            let losses = forward.scoring().losses.unwrap();
            assert!(losses.off_target > 0.0, "seed {seed}");
        }
    }
}
