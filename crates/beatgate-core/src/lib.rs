//! Scene-board generation pipeline.
//!
//! Turns upstream story artifacts into a validated scene board: prompt a
//! [`Generator`], extract a candidate, repair storylines, validate against
//! the [`RuleSet`], loop with revision prompts while the attempt budget
//! lasts, and persist accepted boards with provenance.

pub mod board;
pub mod config;
pub mod error;
pub mod generator;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod provenance;
pub mod repair;
pub mod rules;
pub mod store;
pub mod validate;

pub use board::{Board, BoardGroup, CardRef, Polarity, RawBoard, SceneCard};
pub use config::PipelineConfig;
pub use error::ConfigError;
pub use generator::{GenerationConfig, Generator};
pub use orchestrator::{
    GenerationOutcome, MAX_ATTEMPTS, Orchestrator, OrchestratorConfig, RevisionSeed,
};
pub use parser::parse_board;
pub use prompt::{Prompt, Upstream};
pub use provenance::{Artifact, ArtifactMetadata, SemVer};
pub use repair::{RepairPolicy, repair_storylines};
pub use rules::{RuleSet, default_rules};
pub use store::{ArtifactLocator, ArtifactStore, ReviseOutcome};
pub use validate::{ErrorCode, Violation, suggest_fix, suggest_fixes, validate, validate_board};

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::{Mutex, MutexGuard};

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    /// Serialize tests that touch process environment variables.
    pub(crate) fn lock_env() -> MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }
}
