//! The `Generator` trait -- the seam to whatever produces board text.
//!
//! The pipeline treats the model as an opaque string-in, string-out call.
//! Concrete generators wrap an API client or a local model; tests use
//! scripted ones. The trait is object-safe so the orchestrator can hold an
//! `Arc<dyn Generator>`.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::prompt::Prompt;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f64 = 0.7;
/// Default completion budget, large enough for a 44-card board.
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

/// Per-call generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Model identifier. Empty means "the generator's own default".
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Produces raw board text from a prompt.
///
/// # Object Safety
///
/// Every method returns a concrete type, so `dyn Generator` is usable.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Identifier of the underlying model, stamped into provenance.
    fn model_id(&self) -> &str;

    /// Generate a response for `prompt`.
    ///
    /// Errors are treated as hard faults by the orchestrator; they do not
    /// consume a retry.
    async fn generate(&self, prompt: &Prompt, config: &GenerationConfig) -> Result<String>;
}

// Compile-time assertion: Generator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn Generator) {}
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    /// Echoes the user prompt back.
    struct EchoGenerator;

    #[async_trait]
    impl Generator for EchoGenerator {
        fn model_id(&self) -> &str {
            "echo"
        }

        async fn generate(&self, prompt: &Prompt, _config: &GenerationConfig) -> Result<String> {
            Ok(prompt.user.clone())
        }
    }

    #[test]
    fn generator_is_object_safe() {
        let generator: Arc<dyn Generator> = Arc::new(EchoGenerator);
        assert_eq!(generator.model_id(), "echo");
    }

    #[tokio::test]
    async fn echo_generator_round_trips_user_text() {
        let generator: Box<dyn Generator> = Box::new(EchoGenerator);
        let prompt = Prompt {
            system: String::new(),
            user: "hello".to_string(),
            meta: BTreeMap::new(),
        };
        let out = generator
            .generate(&prompt, &GenerationConfig::default())
            .await
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn config_defaults_fill_missing_fields() {
        let config: GenerationConfig = serde_json::from_str(r#"{"model": "m"}"#).unwrap();
        assert_eq!(config.model, "m");
        assert_eq!(config.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(config.max_tokens, DEFAULT_MAX_TOKENS);
    }
}
