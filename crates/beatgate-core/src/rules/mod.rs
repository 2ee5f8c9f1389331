//! Board grammar: group layout, beat vocabulary, storyline alphabet, the
//! storyline template and the landmark table.
//!
//! The default grammar is embedded as `save_the_cat.toml` and parsed once per
//! process. Validator, repairer, fix suggester and prompt builder all take a
//! `&RuleSet`, so tests and alternate genre templates can supply their own.

use std::sync::OnceLock;

use serde::Deserialize;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Named limits
// ---------------------------------------------------------------------------

/// Fewest cards a board may hold.
pub const MIN_UNITS: usize = 36;
/// Most cards a board may hold.
pub const MAX_UNITS: usize = 44;
/// Fewest cards any single group may hold.
pub const MIN_UNITS_PER_GROUP: usize = 8;
/// Word budget for a card description.
pub const MAX_DESCRIPTION_WORDS: usize = 50;
/// Longest run of consecutive cards a primary storyline may skip.
pub const MAX_PRIMARY_GAP: usize = 3;

/// Numeric thresholds used by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub min_units: usize,
    pub max_units: usize,
    pub min_units_per_group: usize,
    pub max_description_words: usize,
    pub max_primary_gap: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_units: MIN_UNITS,
            max_units: MAX_UNITS,
            min_units_per_group: MIN_UNITS_PER_GROUP,
            max_description_words: MAX_DESCRIPTION_WORDS,
            max_primary_gap: MAX_PRIMARY_GAP,
        }
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A beat that must appear exactly once near a fixed position.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Landmark {
    /// Canonical beat name.
    pub name: String,
    /// Expected 1-based position in the flattened board.
    pub position: usize,
    /// Allowed distance from `position`.
    pub tolerance: usize,
}

impl Landmark {
    /// Whether a 1-based position falls inside the tolerance window.
    pub fn accepts(&self, position: usize) -> bool {
        position.abs_diff(self.position) <= self.tolerance
    }
}

/// On-disk shape of a rule set file.
#[derive(Debug, Deserialize)]
struct RuleSetFile {
    name: String,
    groups: Vec<String>,
    beats: Vec<String>,
    storylines: Vec<char>,
    primary_storylines: Vec<char>,
    storyline_template: String,
    opposite_polarity_pair: [String; 2],
    landmarks: Vec<Landmark>,
    #[serde(default)]
    limits: Limits,
}

/// A validated board grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    /// Rule set identifier, stamped into prompts.
    pub name: String,
    /// Group keys in board order. The last one is the final group.
    pub groups: Vec<String>,
    /// Canonical beat vocabulary.
    pub beats: Vec<String>,
    /// Storyline alphabet, in display order.
    pub storylines: Vec<char>,
    /// The two primary storylines.
    pub primary: [char; 2],
    /// Deterministic storyline labels used by the repairer.
    pub template: Vec<char>,
    /// Landmarks whose `emotional_end` markers must differ.
    pub opposite_pair: [String; 2],
    /// Landmark table.
    pub landmarks: Vec<Landmark>,
    /// Numeric thresholds.
    pub limits: Limits,
}

static SAVE_THE_CAT_TOML: &str = include_str!("save_the_cat.toml");

static DEFAULT_RULES: OnceLock<RuleSet> = OnceLock::new();

/// The embedded default rule set.
///
/// # Panics
///
/// Panics if the embedded TOML is malformed. The file ships inside the
/// binary and is covered by the unit tests below.
pub fn default_rules() -> &'static RuleSet {
    DEFAULT_RULES.get_or_init(|| {
        RuleSet::from_toml(SAVE_THE_CAT_TOML).expect("embedded save_the_cat.toml is invalid")
    })
}

impl RuleSet {
    /// Parse and check a rule set from TOML.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let file: RuleSetFile = toml::from_str(content)?;

        let primary = match file.primary_storylines.as_slice() {
            [a, b] if a != b => [a.to_ascii_uppercase(), b.to_ascii_uppercase()],
            other => {
                return Err(ConfigError::InvalidRuleSet(format!(
                    "expected exactly two distinct primary storylines, got {other:?}"
                )));
            }
        };

        let rules = Self {
            name: file.name,
            groups: file.groups,
            beats: file.beats,
            storylines: file
                .storylines
                .iter()
                .map(char::to_ascii_uppercase)
                .collect(),
            primary,
            template: file
                .storyline_template
                .chars()
                .filter(|c| !c.is_whitespace())
                .map(|c| c.to_ascii_uppercase())
                .collect(),
            opposite_pair: file.opposite_polarity_pair,
            landmarks: file.landmarks,
            limits: file.limits,
        };
        rules.check()?;
        Ok(rules)
    }

    /// Internal consistency checks.
    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidRuleSet(msg));

        if self.groups.is_empty() {
            return invalid("at least one group is required".to_string());
        }
        if self.beats.is_empty() {
            return invalid("beat vocabulary is empty".to_string());
        }
        for p in self.primary {
            if !self.storylines.contains(&p) {
                return invalid(format!("primary storyline {p} is not in the alphabet"));
            }
        }
        if self.template.is_empty() {
            return invalid("storyline template is empty".to_string());
        }
        if let Some(bad) = self.template.iter().find(|c| !self.storylines.contains(c)) {
            return invalid(format!("storyline template uses unknown label {bad}"));
        }
        for lm in &self.landmarks {
            if self.canonical_beat(&lm.name) != Some(lm.name.as_str()) {
                return invalid(format!("landmark {:?} is not a canonical beat", lm.name));
            }
        }
        for name in &self.opposite_pair {
            if self.landmark(name).is_none() {
                return invalid(format!("opposite-polarity beat {name:?} is not a landmark"));
            }
        }
        if self.limits.min_units > self.limits.max_units {
            return invalid(format!(
                "min_units {} exceeds max_units {}",
                self.limits.min_units, self.limits.max_units
            ));
        }
        Ok(())
    }

    /// Key of the final group.
    pub fn final_group(&self) -> &str {
        // `check` guarantees at least one group.
        self.groups.last().map(String::as_str).unwrap_or_default()
    }

    /// Whether `label` is one of the two primary storylines.
    pub fn is_primary(&self, label: char) -> bool {
        self.primary.contains(&label)
    }

    /// Look up a landmark by canonical name.
    pub fn landmark(&self, name: &str) -> Option<&Landmark> {
        self.landmarks.iter().find(|l| l.name == name)
    }

    /// Resolve a free-form beat label to its canonical name.
    ///
    /// Matching ignores case and punctuation, and tolerates trailing text
    /// after the canonical name ("Catalyst: the letter arrives"). When several
    /// names match, the longest wins.
    pub fn canonical_beat(&self, label: &str) -> Option<&str> {
        let wanted = normalize_beat(label);
        if wanted.is_empty() {
            return None;
        }
        self.beats
            .iter()
            .filter(|beat| wanted.starts_with(&normalize_beat(beat)))
            .max_by_key(|beat| beat.len())
            .map(String::as_str)
    }

    /// Storyline labels for a board of `count` cards.
    ///
    /// Takes the template prefix and, past the template's end, alternates
    /// the two primary storylines.
    pub fn storyline_sequence(&self, count: usize) -> Vec<char> {
        (0..count)
            .map(|i| match self.template.get(i) {
                Some(label) => *label,
                None => self.primary[(i - self.template.len()) % 2],
            })
            .collect()
    }
}

/// Lowercase alphanumerics only.
fn normalize_beat(label: &str) -> String {
    label
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}
