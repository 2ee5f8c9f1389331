//! Shared test fixtures for beatgate integration tests.
//!
//! Provides a canonical 40-card board that passes every default rule, an
//! upstream fixture, and scripted generators that stand in for a model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

use beatgate_core::generator::{GenerationConfig, Generator};
use beatgate_core::orchestrator::{Orchestrator, OrchestratorConfig};
use beatgate_core::prompt::{Prompt, Upstream};
use beatgate_core::rules::default_rules;
use beatgate_core::RawBoard;

/// Install a test-friendly tracing subscriber, filtered by `RUST_LOG`.
/// Safe to call from every test; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Project id used by [`orchestrator`].
pub const PROJECT_ID: &str = "lighthouse";
/// Stage id used by [`orchestrator`].
pub const STAGE_ID: &str = "scene_board";

// ---------------------------------------------------------------------------
// Canonical board
// ---------------------------------------------------------------------------

/// Beat for each 1-based card position of the canonical board.
fn beat_for(n: usize) -> &'static str {
    match n {
        1 => "Opening Image",
        2 => "Theme Stated",
        3 | 5 => "Set-Up",
        4 => "Catalyst",
        6..=9 => "Debate",
        10 => "Break into Two",
        11 => "B Story",
        12..=19 => "Fun and Games",
        20 => "Midpoint",
        21..=28 => "Bad Guys Close In",
        29 => "All Is Lost",
        30 => "Dark Night of the Soul",
        31 => "Break into Three",
        32..=39 => "Finale",
        _ => "Final Image",
    }
}

const PLACES: [&str; 5] = ["LAMP ROOM", "HARBOUR", "KEEPER'S COTTAGE", "FERRY DECK", "CLIFF PATH"];

/// A 40-card, four-row board with zero violations under the default rules.
///
/// Ten cards per row; landmarks sit exactly on their expected positions;
/// storylines follow the default template; odd cards turn `+` to `-` and
/// even cards `-` to `+`, so Midpoint (20) ends `+` and All Is Lost (29)
/// ends `-`.
pub fn canonical_board() -> RawBoard {
    let rules = default_rules();
    let storylines = rules.storyline_sequence(40);
    let mut map = Map::new();

    for (g, key) in rules.groups.iter().enumerate() {
        let cards: Vec<Value> = (1..=10)
            .map(|i| {
                let n = g * 10 + i;
                let (start, end) = if n % 2 == 1 { ("+", "-") } else { ("-", "+") };
                let place = PLACES[n % PLACES.len()];
                let prefix = if n % 3 == 0 { "EXT." } else { "INT." };
                let time = if n % 2 == 0 { "NIGHT" } else { "DAY" };
                let characters = if n % 2 == 0 {
                    json!(["Mara", "Ines"])
                } else {
                    json!(["Mara"])
                };
                json!({
                    "card_number": n,
                    "heading": format!("{prefix} {place} - {time}"),
                    "beat": beat_for(n),
                    "storyline": storylines[n - 1].to_string(),
                    "emotional_start": start,
                    "emotional_end": end,
                    "description": format!(
                        "Mara works the {} while the storm builds; scene {n} of the story.",
                        place.to_lowercase()
                    ),
                    "conflict": "Mara wants to keep the light burning; Ines wants her to leave.",
                    "characters": characters,
                })
            })
            .collect();
        map.insert(key.clone(), Value::Array(cards));
    }
    RawBoard::new(map)
}

/// The canonical board as a generator would return it: prose, then a
/// fenced JSON block.
pub fn canonical_response() -> String {
    format!(
        "Here is the scene board.\n\n```json\n{}\n```\n",
        canonical_board().to_pretty_json()
    )
}

/// Set `field` on the card numbered `card_number`. Panics if there is no
/// such card.
pub fn set_card_field(board: &mut RawBoard, card_number: u64, field: &str, value: Value) {
    let rules = default_rules();
    let mut found = false;
    board.for_each_card_mut(rules, |_, card| {
        if card.get("card_number").and_then(Value::as_u64) == Some(card_number) {
            card.insert(field.to_string(), value.clone());
            found = true;
        }
    });
    assert!(found, "no card numbered {card_number}");
}

/// Upstream artifacts with every required field.
pub fn sample_upstream() -> Upstream {
    Upstream::from([
        ("title".to_string(), json!("The Lighthouse Keeper")),
        (
            "logline".to_string(),
            json!("A lighthouse keeper must choose between the failing light and her sister."),
        ),
        ("genre".to_string(), json!("Rites of Passage")),
        (
            "beat_sheet".to_string(),
            json!({
                "Opening Image": "Mara alone in the lamp room.",
                "Catalyst": "The lamp fails on the night of the storm.",
                "Midpoint": "The light is restored, for now.",
                "All Is Lost": "Ines is lost at sea.",
                "Final Image": "Mara hands the keys to a stranger.",
            }),
        ),
        ("characters".to_string(), json!(["Mara", "Ines"])),
    ])
}

/// Orchestrator over the default rules with the fixture project identity.
pub fn orchestrator(generator: Arc<dyn Generator>, max_attempts: u32) -> Orchestrator {
    Orchestrator::new(
        generator,
        Arc::new(default_rules().clone()),
        OrchestratorConfig {
            max_attempts,
            project_id: PROJECT_ID.to_string(),
            stage_id: STAGE_ID.to_string(),
            ..OrchestratorConfig::default()
        },
    )
}

// ---------------------------------------------------------------------------
// Generators
// ---------------------------------------------------------------------------

/// Replays canned responses in order, repeating the last one once the
/// script runs out. Records every prompt it receives.
pub struct ScriptedGenerator {
    responses: Vec<String>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Self {
            responses: responses.into_iter().map(Into::into).collect(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order.
    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt, _config: &GenerationConfig) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());
        self.responses
            .get(call)
            .or_else(|| self.responses.last())
            .cloned()
            .ok_or_else(|| anyhow!("scripted generator has no responses"))
    }
}

/// Fails every call, like an unreachable model endpoint.
pub struct FailingGenerator;

#[async_trait]
impl Generator for FailingGenerator {
    fn model_id(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &Prompt, _config: &GenerationConfig) -> Result<String> {
        Err(anyhow!("model endpoint unreachable"))
    }
}
