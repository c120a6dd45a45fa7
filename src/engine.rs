use crate::{
    dna_sequence::{Template, normalize_dna},
    equilibrium::EquilibriumResult,
    error::{PrimerError, PrimerResult},
    options::DesignOptions,
    primer::Primer,
    scoring::PairScore,
    scoring_presets::DesignMode,
    search::{self, DesignResult},
    thermodynamics::{ThermoConditions, melting_temperature},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub type OpId = String;
pub type RunId = String;

/// Where an operation gets its template from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TemplateSource {
    Sequence {
        sequence: String,
        #[serde(default)]
        circular: bool,
    },
    /// First record of a FASTA or GenBank file.
    File {
        path: String,
        /// Overrides the topology read from the file.
        circular: Option<bool>,
    },
}

impl TemplateSource {
    pub fn load(&self) -> PrimerResult<Template> {
        match self {
            TemplateSource::Sequence { sequence, circular } => {
                let mut template = Template::from_sequence(sequence)?;
                template.set_circular(*circular);
                Ok(template)
            }
            TemplateSource::File { path, circular } => {
                let mut template = Template::from_file(path)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| PrimerError::invalid_input(format!("No sequence records in '{path}'")))?;
                if let Some(circular) = circular {
                    template.set_circular(*circular);
                }
                Ok(template)
            }
        }
    }
}

/// Requests without explicit options use the engine defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Operation {
    Design {
        template: TemplateSource,
        options: Option<DesignOptions>,
    },
    /// A single primer when `reverse` is unset, otherwise a pair.
    Score {
        forward: String,
        reverse: Option<String>,
        template: Option<TemplateSource>,
        off_target_template: Option<TemplateSource>,
        options: Option<DesignOptions>,
    },
    Equilibrium {
        forward: String,
        reverse: Option<String>,
        template: Option<TemplateSource>,
        options: Option<DesignOptions>,
    },
    Tm {
        sequence: String,
        conditions: Option<ThermoConditions>,
    },
    SetDefaults {
        options: DesignOptions,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Design { .. } => "Design",
            Operation::Score { .. } => "Score",
            Operation::Equilibrium { .. } => "Equilibrium",
            Operation::Tm { .. } => "Tm",
            Operation::SetDefaults { .. } => "SetDefaults",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub run_id: RunId,
    pub ops: Vec<Operation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpOutput {
    Design(Box<DesignResult>),
    Primer(Box<Primer>),
    Pair(Box<PairScore>),
    Equilibrium(EquilibriumResult),
    Tm { tm: f64 },
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpResult {
    pub op_id: OpId,
    pub output: OpOutput,
    pub warnings: Vec<String>,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationRecord {
    pub run_id: RunId,
    pub op: Operation,
    pub result: OpResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub supported_operations: Vec<String>,
    pub design_modes: Vec<DesignMode>,
    pub deterministic_operation_log: bool,
}

pub trait Engine {
    fn apply(&mut self, op: Operation) -> PrimerResult<OpResult>;
    fn apply_workflow(&mut self, wf: Workflow) -> PrimerResult<Vec<OpResult>>;
}

#[derive(Debug, Clone, Default)]
pub struct PrimerEngine {
    defaults: DesignOptions,
    journal: Vec<OperationRecord>,
    op_counter: u64,
}

impl PrimerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(defaults: DesignOptions) -> Self {
        Self {
            defaults,
            ..Self::default()
        }
    }

    pub fn defaults(&self) -> &DesignOptions {
        &self.defaults
    }

    pub fn capabilities() -> Capabilities {
        Capabilities {
            protocol_version: "v1".to_string(),
            supported_operations: vec![
                "Design".to_string(),
                "Score".to_string(),
                "Equilibrium".to_string(),
                "Tm".to_string(),
                "SetDefaults".to_string(),
            ],
            design_modes: vec![DesignMode::Amplification, DesignMode::Sequencing, DesignMode::Assembly],
            deterministic_operation_log: true,
        }
    }

    pub fn operation_log(&self) -> &[OperationRecord] {
        &self.journal
    }

    fn next_op_id(&mut self) -> OpId {
        self.op_counter += 1;
        format!("op-{}", self.op_counter)
    }

    fn options_or_defaults(&self, options: &Option<DesignOptions>) -> DesignOptions {
        options.clone().unwrap_or_else(|| self.defaults.clone())
    }

    fn load_optional(source: &Option<TemplateSource>) -> PrimerResult<Option<Template>> {
        source.as_ref().map(TemplateSource::load).transpose()
    }

    fn result(op_id: OpId, output: OpOutput, warnings: Vec<String>, messages: Vec<String>) -> OpResult {
        OpResult {
            op_id,
            output,
            warnings,
            messages,
        }
    }

    fn apply_internal(&mut self, op: &Operation) -> PrimerResult<OpResult> {
        let op_id = self.next_op_id();
        debug!(op_id = op_id.as_str(), operation = op.name(), "applying operation");
        match op {
            Operation::Design { template, options } => {
                let options = self.options_or_defaults(options);
                let template = template.load()?;
                let design = search::design_primers(&template, &options)?;
                let warnings = design.scoring.warnings.iter().map(|w| format!("{w:?}")).collect();
                let messages = vec![format!(
                    "Designed {} / {} ({} bp amplicon, composite {:.1}, {})",
                    design.forward.seq(),
                    design.reverse.seq(),
                    design.amplicon_len,
                    design.scoring.composite,
                    design.scoring.tier.label()
                )];
                Ok(Self::result(op_id, OpOutput::Design(Box::new(design)), warnings, messages))
            }
            Operation::Score {
                forward,
                reverse,
                template,
                off_target_template,
                options,
            } => {
                let options = self.options_or_defaults(options);
                let template = Self::load_optional(template)?;
                let off_target = Self::load_optional(off_target_template)?;
                match reverse {
                    Some(reverse) => {
                        let pair =
                            search::score_pair(forward, reverse, template.as_ref(), off_target.as_ref(), &options)?;
                        let warnings = pair.scoring.warnings.iter().map(|w| format!("{w:?}")).collect();
                        let messages = vec![format!(
                            "Pair composite {:.1} ({})",
                            pair.scoring.composite,
                            pair.scoring.tier.label()
                        )];
                        Ok(Self::result(op_id, OpOutput::Pair(Box::new(pair)), warnings, messages))
                    }
                    None => {
                        let primer = search::score_single(forward, template.as_ref(), off_target.as_ref(), &options)?;
                        let warnings = primer.scoring().warnings.iter().map(|w| format!("{w:?}")).collect();
                        let messages = vec![format!(
                            "Primer composite {:.1} ({})",
                            primer.scoring().composite,
                            primer.scoring().tier.label()
                        )];
                        Ok(Self::result(op_id, OpOutput::Primer(Box::new(primer)), warnings, messages))
                    }
                }
            }
            Operation::Equilibrium {
                forward,
                reverse,
                template,
                options,
            } => {
                let options = self.options_or_defaults(options);
                let template = Self::load_optional(template)?;
                let result = search::calculate_equilibrium_efficiency(
                    forward,
                    reverse.as_deref(),
                    template.as_ref(),
                    &options,
                )?;
                let messages = vec![format!(
                    "Efficiency {:.3} at {:.1} °C",
                    result.efficiency, result.temperature
                )];
                Ok(Self::result(op_id, OpOutput::Equilibrium(result), vec![], messages))
            }
            Operation::Tm { sequence, conditions } => {
                let seq = normalize_dna(sequence)?;
                if seq.len() < 2 {
                    return Err(PrimerError::invalid_input("Tm needs at least two bases"));
                }
                let conditions = conditions.clone().unwrap_or_else(|| self.defaults.conditions.clone());
                let tm = melting_temperature(&seq, &conditions);
                Ok(Self::result(op_id, OpOutput::Tm { tm }, vec![], vec![]))
            }
            Operation::SetDefaults { options } => {
                options.validate()?;
                self.defaults = options.clone();
                Ok(Self::result(
                    op_id,
                    OpOutput::None,
                    vec![],
                    vec!["Updated default design options".to_string()],
                ))
            }
        }
    }
}

impl Engine for PrimerEngine {
    fn apply(&mut self, op: Operation) -> PrimerResult<OpResult> {
        let run_id = "interactive".to_string();
        let result = self.apply_internal(&op)?;
        self.journal.push(OperationRecord {
            run_id,
            op,
            result: result.clone(),
        });
        Ok(result)
    }

    fn apply_workflow(&mut self, wf: Workflow) -> PrimerResult<Vec<OpResult>> {
        let mut results = Vec::new();
        for op in wf.ops {
            let result = self.apply_internal(&op)?;
            self.journal.push(OperationRecord {
                run_id: wf.run_id.clone(),
                op,
                result: result.clone(),
            });
            results.push(result);
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const PUC_MCS: &str = "TGTAAAACGACGGCCAGTGAATTCGAGCTCGGTACCCGGGGATCCTCTAGAGTCGACCTGCAGGCATGCAAGCTTGGCGTAATCATGGTCATAGCTGTTTCC";

    #[test]
    fn test_tm_operation() {
        let mut engine = PrimerEngine::new();
        let res = engine
            .apply(Operation::Tm {
                sequence: "agcggataacaatttcacacagga".to_string(),
                conditions: None,
            })
            .unwrap();
        assert_eq!(res.op_id, "op-1");
        match res.output {
            OpOutput::Tm { tm } => assert!(tm > 50.0 && tm < 70.0, "tm {tm}"),
            other => panic!("unexpected output {other:?}"),
        }
        assert_eq!(engine.operation_log().len(), 1);
    }

    #[test]
    fn test_tm_rejects_bad_base() {
        let mut engine = PrimerEngine::new();
        let err = engine
            .apply(Operation::Tm {
                sequence: "ACGTXACGT".to_string(),
                conditions: None,
            })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidInput);
        assert!(engine.operation_log().is_empty());
    }

    #[test]
    fn test_score_pair_operation() {
        let mut engine = PrimerEngine::new();
        let res = engine
            .apply(Operation::Score {
                forward: "TGTAAAACGACGGCCAGTGAATTC".to_string(),
                reverse: Some("GGAAACAGCTATGACCATGATTAC".to_string()),
                template: Some(TemplateSource::Sequence {
                    sequence: PUC_MCS.to_string(),
                    circular: false,
                }),
                off_target_template: None,
                options: None,
            })
            .unwrap();
        match res.output {
            OpOutput::Pair(pair) => {
                assert_eq!(pair.forward.position(), Some(0));
                assert_eq!(pair.reverse.position(), Some(PUC_MCS.len() as isize));
            }
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_set_defaults_applies_to_later_ops() {
        let mut engine = PrimerEngine::new();
        let mut options = DesignOptions::default();
        options.annealing_temperature = Some(50.0);
        engine.apply(Operation::SetDefaults { options }).unwrap();
        let res = engine
            .apply(Operation::Equilibrium {
                forward: "TGTAAAACGACGGCCAGTGAATTC".to_string(),
                reverse: None,
                template: None,
                options: None,
            })
            .unwrap();
        match res.output {
            OpOutput::Equilibrium(eq) => assert_eq!(eq.temperature, 50.0),
            other => panic!("unexpected output {other:?}"),
        }
    }

    #[test]
    fn test_workflow_journal_and_json() {
        let json = r#"{
            "run_id": "wf-1",
            "ops": [
                {"Tm": {"sequence": "GGAAACAGCTATGACCATGATTAC", "conditions": null}},
                {"Score": {"forward": "TGTAAAACGACGGCCAGTGAATTC", "reverse": null,
                           "template": null, "off_target_template": null, "options": null}}
            ]
        }"#;
        let wf: Workflow = serde_json::from_str(json).unwrap();
        let mut engine = PrimerEngine::new();
        let results = engine.apply_workflow(wf).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[1].op_id, "op-2");
        assert!(matches!(results[1].output, OpOutput::Primer(_)));
        assert!(engine.operation_log().iter().all(|r| r.run_id == "wf-1"));
    }

    #[test]
    fn test_missing_template_file() {
        let mut engine = PrimerEngine::new();
        let err = engine
            .apply(Operation::Design {
                template: TemplateSource::File {
                    path: "/nonexistent/template.fa".to_string(),
                    circular: None,
                },
                options: None,
            })
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
