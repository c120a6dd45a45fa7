pub mod about;
pub mod candidate_cache;
pub mod dna_sequence;
pub mod engine;
pub mod equilibrium;
pub mod error;
pub mod options;
pub mod primer;
pub mod scoring;
pub mod scoring_presets;
pub mod search;
pub mod secondary_structure;
pub mod selection;
pub mod thermodynamics;

pub use dna_sequence::Template;
pub use engine::{Engine, Operation, PrimerEngine, Workflow};
pub use equilibrium::EquilibriumResult;
pub use error::{ErrorCode, PrimerError, PrimerResult};
pub use options::{DesignOptions, DesignRegion, ScoringOptions, SearchOptions};
pub use primer::{Primer, QualityTier, Strand, Warning};
pub use scoring::PairScore;
pub use scoring_presets::DesignMode;
pub use search::{DesignResult, calculate_equilibrium_efficiency, design_primers, score_pair, score_single};
pub use thermodynamics::ThermoConditions;
