//! Generation orchestrator: prompt, generate, parse, repair, validate, and
//! either accept or loop with a revision prompt until the attempt budget is
//! spent.
//!
//! The loop is an explicit state machine over [`Step`]. A run never persists
//! anything; the store decides what to do with the outcome.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use uuid::Uuid;

use crate::board::{Board, RawBoard};
use crate::error::ConfigError;
use crate::generator::{GenerationConfig, Generator};
use crate::parser::parse_board;
use crate::prompt::{self, Prompt, Upstream};
use crate::provenance::{self, Artifact, ArtifactMetadata, SemVer};
use crate::repair::{RepairPolicy, repair_storylines};
use crate::rules::RuleSet;
use crate::validate::{self, VALIDATOR_VERSION, Violation, suggest_fixes};

/// Default generator calls per run.
pub const MAX_ATTEMPTS: u32 = 3;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Generator calls allowed per run. Values below 1 are treated as 1.
    pub max_attempts: u32,
    pub repair_policy: RepairPolicy,
    pub generation: GenerationConfig,
    pub project_id: String,
    pub stage_id: String,
    pub stage_name: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            repair_policy: RepairPolicy::default(),
            generation: GenerationConfig::default(),
            project_id: "default".to_string(),
            stage_id: "scene_board".to_string(),
            stage_name: "Scene Board".to_string(),
        }
    }
}

/// Starting point for a revision run: the stored board and what is wrong
/// with it (including the revision request itself).
#[derive(Debug, Clone)]
pub struct RevisionSeed {
    pub prior: RawBoard,
    pub violations: Vec<Violation>,
    pub previous_version: SemVer,
}

/// Result of a run.
#[derive(Debug, Clone)]
pub enum GenerationOutcome {
    /// A candidate passed every rule.
    Accepted(Artifact),
    /// The budget ran out. Carries the last candidate, the provenance it
    /// would have been stored with, and what is still wrong with it.
    Exhausted {
        attempts: u32,
        provenance: ArtifactMetadata,
        last_candidate: RawBoard,
        violations: Vec<Violation>,
        suggestions: Vec<String>,
    },
}

impl GenerationOutcome {
    /// Generator calls spent.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Accepted(artifact) => artifact.metadata.attempts,
            Self::Exhausted { attempts, .. } => *attempts,
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted(_))
    }
}

/// States of the generation loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    BuildPrompt,
    CallGenerator,
    Parse,
    Repair,
    Validate,
    BuildRevisionPrompt,
    Finalize,
}

/// What validation means for the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Valid,
    InvalidWithBudget,
    InvalidExhausted,
}

fn verdict(violations: &[Violation], attempts: u32, max_attempts: u32) -> Verdict {
    if violations.is_empty() {
        Verdict::Valid
    } else if attempts < max_attempts {
        Verdict::InvalidWithBudget
    } else {
        Verdict::InvalidExhausted
    }
}

/// Drives a [`Generator`] until a board passes or the budget is spent.
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    rules: Arc<RuleSet>,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, rules: Arc<RuleSet>, config: OrchestratorConfig) -> Self {
        Self {
            generator,
            rules,
            config,
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Fail fast on upstream artifacts a prompt cannot be built from.
    pub fn check_upstream(&self, upstream: &Upstream) -> Result<(), ConfigError> {
        prompt::require_upstream(upstream)
    }

    /// Run the loop once.
    ///
    /// With a `seed` the first prompt is a revision prompt built from the
    /// seed; otherwise it is the initial prompt. Revision requests in the seed
    /// are repeated in every later revision prompt but never count against
    /// a candidate. Missing upstream fields fail before any generator call.
    /// Generator errors propagate and end the run.
    pub async fn run(
        &self,
        upstream: &Upstream,
        seed: Option<RevisionSeed>,
    ) -> Result<GenerationOutcome> {
        let rules = self.rules.as_ref();
        let max_attempts = self.config.max_attempts.max(1);

        let mut attempts: u32 = 0;
        let mut prompt = Prompt::default();
        let mut response = String::new();
        let mut candidate = RawBoard::default();
        let mut violations: Vec<Violation> = Vec::new();
        let mut step = Step::BuildPrompt;

        let carried: Vec<Violation> = seed
            .iter()
            .flat_map(|s| s.violations.iter())
            .filter(|v| matches!(v, Violation::RevisionRequested { .. }))
            .cloned()
            .collect();

        tracing::info!(
            project_id = %self.config.project_id,
            stage = %self.config.stage_id,
            revision = seed.is_some(),
            max_attempts,
            "starting board generation"
        );

        loop {
            step = match step {
                Step::BuildPrompt => {
                    prompt = match &seed {
                        Some(seed) => {
                            let hints = suggest_fixes(&seed.violations, rules);
                            prompt::build_revision(
                                &seed.prior,
                                &seed.violations,
                                &hints,
                                upstream,
                                rules,
                            )?
                        }
                        None => prompt::build_initial(upstream, rules)?,
                    };
                    Step::CallGenerator
                }

                Step::CallGenerator => {
                    attempts += 1;
                    tracing::debug!(attempt = attempts, "calling generator");
                    response = self
                        .generator
                        .generate(&prompt, &self.config.generation)
                        .await
                        .with_context(|| format!("generator failed on attempt {attempts}"))?;
                    Step::Parse
                }

                Step::Parse => {
                    candidate = parse_board(&response, rules);
                    Step::Repair
                }

                Step::Repair => {
                    candidate = repair_storylines(&candidate, rules, self.config.repair_policy);
                    Step::Validate
                }

                Step::Validate => {
                    violations = validate::validate(&candidate, rules);
                    match verdict(&violations, attempts, max_attempts) {
                        Verdict::Valid => {
                            tracing::info!(attempt = attempts, "candidate accepted");
                            Step::Finalize
                        }
                        Verdict::InvalidWithBudget => {
                            tracing::warn!(
                                attempt = attempts,
                                violations = violations.len(),
                                "candidate rejected; requesting revision"
                            );
                            Step::BuildRevisionPrompt
                        }
                        Verdict::InvalidExhausted => {
                            tracing::warn!(
                                attempt = attempts,
                                violations = violations.len(),
                                "candidate rejected; attempt budget exhausted"
                            );
                            Step::Finalize
                        }
                    }
                }

                Step::BuildRevisionPrompt => {
                    let feedback: Vec<Violation> =
                        violations.iter().chain(&carried).cloned().collect();
                    let hints = suggest_fixes(&feedback, rules);
                    prompt =
                        prompt::build_revision(&candidate, &feedback, &hints, upstream, rules)?;
                    Step::CallGenerator
                }

                Step::Finalize => {
                    let previous_version = seed.as_ref().map(|s| s.previous_version);
                    return Ok(self.finalize(
                        candidate,
                        &prompt,
                        upstream,
                        attempts,
                        previous_version,
                    ));
                }
            };
        }
    }

    /// Attach provenance and run the final gate.
    fn finalize(
        &self,
        candidate: RawBoard,
        prompt: &Prompt,
        upstream: &Upstream,
        attempts: u32,
        previous_version: Option<SemVer>,
    ) -> GenerationOutcome {
        let rules = self.rules.as_ref();
        let metadata = ArtifactMetadata {
            artifact_id: Uuid::new_v4(),
            project_id: self.config.project_id.clone(),
            stage_id: self.config.stage_id.clone(),
            stage_name: self.config.stage_name.clone(),
            version: previous_version
                .map(SemVer::bump_minor)
                .unwrap_or(SemVer::INITIAL),
            created_at: Utc::now(),
            model_id: self.generator.model_id().to_string(),
            temperature: self.config.generation.temperature,
            prompt_hash: provenance::hash_prompt(prompt),
            validator_version: VALIDATOR_VERSION.to_string(),
            upstream_hash: provenance::hash_upstream(upstream),
            attempts,
            previous_version,
        };
        match Board::try_from_raw(&candidate, rules) {
            Ok(board) => {
                tracing::info!(
                    project_id = %metadata.project_id,
                    stage = %metadata.stage_id,
                    version = %metadata.version,
                    attempts,
                    "board finalized"
                );
                GenerationOutcome::Accepted(Artifact { metadata, board })
            }
            Err(violations) => {
                let suggestions = suggest_fixes(&violations, rules);
                tracing::warn!(
                    attempts,
                    violations = violations.len(),
                    prompt_hash = %metadata.prompt_hash,
                    "board generation exhausted"
                );
                GenerationOutcome::Exhausted {
                    attempts,
                    provenance: metadata,
                    last_candidate: candidate,
                    violations,
                    suggestions,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::default_rules;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedGenerator {
        response: Result<String, String>,
        calls: AtomicU32,
    }

    impl FixedGenerator {
        fn new(response: Result<&str, &str>) -> Arc<Self> {
            Arc::new(Self {
                response: response.map(str::to_string).map_err(str::to_string),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Generator for FixedGenerator {
        fn model_id(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &Prompt, _config: &GenerationConfig) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone().map_err(anyhow::Error::msg)
        }
    }

    fn upstream() -> Upstream {
        Upstream::from([
            ("title".to_string(), json!("Tidewater")),
            ("logline".to_string(), json!("A ferry pilot runs the last crossing.")),
            ("genre".to_string(), json!("Dude with a Problem")),
            ("beat_sheet".to_string(), json!({"Catalyst": "The storm warning."})),
            ("characters".to_string(), json!(["Ada"])),
        ])
    }

    fn orchestrator(generator: Arc<FixedGenerator>, max_attempts: u32) -> Orchestrator {
        Orchestrator::new(
            generator,
            Arc::new(default_rules().clone()),
            OrchestratorConfig {
                max_attempts,
                ..OrchestratorConfig::default()
            },
        )
    }

    #[test]
    fn verdict_table() {
        let v = vec![Violation::MissingGroup {
            group: "act_one".to_string(),
        }];
        assert_eq!(verdict(&[], 1, 3), Verdict::Valid);
        assert_eq!(verdict(&[], 3, 3), Verdict::Valid);
        assert_eq!(verdict(&v, 1, 3), Verdict::InvalidWithBudget);
        assert_eq!(verdict(&v, 2, 3), Verdict::InvalidWithBudget);
        assert_eq!(verdict(&v, 3, 3), Verdict::InvalidExhausted);
    }

    #[tokio::test]
    async fn missing_upstream_fails_before_any_call() {
        let generator = FixedGenerator::new(Ok("{}"));
        let orch = orchestrator(generator.clone(), 3);
        let mut up = upstream();
        up.remove("logline");

        let err = orch.run(&up, None).await.unwrap_err();
        assert!(err.to_string().contains("logline"), "got: {err}");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn generator_error_is_a_hard_failure() {
        let generator = FixedGenerator::new(Err("connection reset"));
        let orch = orchestrator(generator.clone(), 3);

        let err = orch.run(&upstream(), None).await.unwrap_err();
        assert!(format!("{err:#}").contains("connection reset"), "got: {err:#}");
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn garbage_exhausts_the_budget() {
        let generator = FixedGenerator::new(Ok("no board here"));
        let orch = orchestrator(generator.clone(), 2);

        let outcome = orch.run(&upstream(), None).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        match outcome {
            GenerationOutcome::Exhausted {
                attempts,
                provenance: meta,
                last_candidate,
                violations,
                suggestions,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(meta.attempts, 2);
                assert_eq!(meta.model_id, "fixed");
                assert_eq!(meta.version, SemVer::INITIAL);
                assert_eq!(meta.upstream_hash, provenance::hash_upstream(&upstream()));
                assert_eq!(meta.prompt_hash.len(), 64);
                assert_eq!(last_candidate, RawBoard::skeleton(default_rules()));
                assert!(!violations.is_empty());
                assert!(!suggestions.is_empty());
            }
            GenerationOutcome::Accepted(_) => panic!("garbage should never be accepted"),
        }
    }

    #[tokio::test]
    async fn zero_attempt_budget_still_calls_once() {
        let generator = FixedGenerator::new(Ok("nothing"));
        let orch = orchestrator(generator.clone(), 0);

        let outcome = orch.run(&upstream(), None).await.unwrap();
        assert_eq!(outcome.attempts(), 1);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }
}
