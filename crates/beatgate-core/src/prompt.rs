//! Prompt construction for initial generation and revision.
//!
//! Pure logic. The system prompt is assembled from the injected [`RuleSet`],
//! so the constraints the generator is told about are the ones the validator
//! enforces.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::{RawBoard, fields};
use crate::error::ConfigError;
use crate::rules::RuleSet;
use crate::validate::Violation;

/// Upstream artifacts keyed by field name (title, logline, beat sheet...).
pub type Upstream = BTreeMap<String, Value>;

/// Upstream fields every prompt needs.
pub const REQUIRED_UPSTREAM_FIELDS: [&str; 5] =
    ["title", "logline", "genre", "beat_sheet", "characters"];

/// A system + user message pair for one generator call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Small key/value annotations (`kind`, `rule_set`, ...). Not sent to the
    /// generator; recorded for logging and tests.
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

/// Output format reference included in the system prompt.
const OUTPUT_FORMAT: &str = r#"## Output Format

Respond with a single JSON object inside a ```json fenced block. No prose
before or after the block is needed.

```json
{
  "act_one": [
    {
      "card_number": 1,
      "heading": "INT. PLACE - TIME",
      "beat": "Opening Image",
      "storyline": "A",
      "emotional_start": "+",
      "emotional_end": "-",
      "description": "What happens in the scene.",
      "conflict": "Who wants what, and what stands in the way.",
      "characters": ["Name", "Name"]
    }
  ],
  "act_two_a": [],
  "act_two_b": [],
  "act_three": []
}
```
"#;

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// Prompt for the first attempt.
pub fn build_initial(upstream: &Upstream, rules: &RuleSet) -> Result<Prompt, ConfigError> {
    require_upstream(upstream)?;

    let mut user = String::with_capacity(2048);
    user.push_str("Write the scene board for this story.\n\n");
    push_upstream(&mut user, upstream);

    Ok(Prompt {
        system: build_system_prompt(rules),
        user,
        meta: BTreeMap::from([
            ("kind".to_string(), "initial".to_string()),
            ("rule_set".to_string(), rules.name.clone()),
        ]),
    })
}

/// Prompt asking the generator to fix a rejected candidate.
///
/// Embeds the full prior candidate, every violation as `code: message` and
/// every remediation hint.
pub fn build_revision(
    prior: &RawBoard,
    violations: &[Violation],
    hints: &[String],
    upstream: &Upstream,
    rules: &RuleSet,
) -> Result<Prompt, ConfigError> {
    require_upstream(upstream)?;

    let mut user = String::with_capacity(8192);
    user.push_str(
        "Your previous scene board broke the board rules. Rewrite it so every \
         problem below is fixed and nothing else breaks. Return the complete \
         board, not a diff.\n\n",
    );

    user.push_str("## Problems\n\n");
    for v in violations {
        user.push_str(&format!("- {}\n", v.to_line()));
    }

    if !hints.is_empty() {
        user.push_str("\n## How to fix them\n\n");
        for hint in hints {
            user.push_str(&format!("- {hint}\n"));
        }
    }

    user.push_str("\n## Previous board\n\n```json\n");
    user.push_str(&prior.to_pretty_json());
    user.push_str("\n```\n\n");

    push_upstream(&mut user, upstream);

    Ok(Prompt {
        system: build_system_prompt(rules),
        user,
        meta: BTreeMap::from([
            ("kind".to_string(), "revision".to_string()),
            ("rule_set".to_string(), rules.name.clone()),
            ("violations".to_string(), violations.len().to_string()),
        ]),
    })
}

/// System prompt enumerating every board rule.
pub fn build_system_prompt(rules: &RuleSet) -> String {
    let limits = &rules.limits;
    let mut prompt = String::with_capacity(4096);

    prompt.push_str("# Scene Board Writer\n\n");
    prompt.push_str(
        "You turn a story's beat sheet into a scene board: an ordered set of \
         scene cards grouped into act rows. The board is checked mechanically \
         against the rules below; a board that breaks any rule is sent back.\n\n",
    );
    prompt.push_str(&format!("Rule set: `{}`\n\n", rules.name));

    prompt.push_str("## Structure\n\n");
    prompt.push_str(&format!(
        "- Act rows, in order: {}.\n",
        rules
            .groups
            .iter()
            .map(|g| format!("`{g}`"))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    prompt.push_str(&format!(
        "- Between {} and {} cards in total, at least {} in every row.\n",
        limits.min_units, limits.max_units, limits.min_units_per_group
    ));
    prompt.push_str(&format!(
        "- `{}` must hold at least as many cards as the thinnest other row.\n",
        rules.final_group()
    ));
    prompt.push_str("- Number cards from 1 with no repeats.\n\n");

    prompt.push_str("## Cards\n\n");
    prompt.push_str(&format!(
        "- Every card has these fields: {}.\n",
        fields::REQUIRED
            .iter()
            .map(|f| format!("`{f}`"))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    prompt.push_str(
        "- `heading` reads `INT. PLACE - TIME` (or `EXT.`, `INT./EXT.`, `I/E.`).\n",
    );
    prompt.push_str(
        "- `emotional_start` and `emotional_end` are `+` or `-` and must differ: \
         every scene turns.\n",
    );
    prompt.push_str(&format!(
        "- `description` is at most {} words.\n",
        limits.max_description_words
    ));
    prompt.push_str(&format!(
        "- `beat` is one of: {}.\n\n",
        rules.beats.join(", ")
    ));

    prompt.push_str("## Storylines\n\n");
    prompt.push_str(&format!(
        "- Tag each card with one storyline letter: {}.\n",
        rules.storylines.iter().collect::<String>()
    ));
    prompt.push_str(&format!(
        "- {} and {} are the primary storylines. Neither may be absent for \
         more than {} cards in a row.\n",
        rules.primary[0], rules.primary[1], limits.max_primary_gap
    ));
    prompt.push_str(&format!(
        "- Every storyline you use must appear at least once in `{}`.\n\n",
        rules.final_group()
    ));

    prompt.push_str("## Landmark Beats\n\n");
    prompt.push_str("Each of these beats appears exactly once, near its card position:\n\n");
    for lm in &rules.landmarks {
        prompt.push_str(&format!(
            "- {} at card {} (+/- {})\n",
            lm.name, lm.position, lm.tolerance
        ));
    }
    prompt.push_str(&format!(
        "\n{} and {} must end on opposite charges.\n\n",
        rules.opposite_pair[0], rules.opposite_pair[1]
    ));

    prompt.push_str(OUTPUT_FORMAT);
    prompt
}

// ---------------------------------------------------------------------------
// Upstream
// ---------------------------------------------------------------------------

pub(crate) fn require_upstream(upstream: &Upstream) -> Result<(), ConfigError> {
    for field in REQUIRED_UPSTREAM_FIELDS {
        let present = match upstream.get(field) {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(_) => true,
        };
        if !present {
            return Err(ConfigError::MissingUpstreamField {
                field: field.to_string(),
            });
        }
    }
    Ok(())
}

/// Required fields first, in their fixed order, then any extra context.
fn push_upstream(out: &mut String, upstream: &Upstream) {
    out.push_str("## Story\n\n");
    for field in REQUIRED_UPSTREAM_FIELDS {
        if let Some(value) = upstream.get(field) {
            push_field(out, field, value);
        }
    }

    let extra: Vec<(&String, &Value)> = upstream
        .iter()
        .filter(|(k, _)| !REQUIRED_UPSTREAM_FIELDS.contains(&k.as_str()))
        .collect();
    if !extra.is_empty() {
        out.push_str("## Additional Context\n\n");
        for (key, value) in extra {
            push_field(out, key, value);
        }
    }
}

fn push_field(out: &mut String, name: &str, value: &Value) {
    out.push_str(&format!("### {name}\n\n"));
    match value {
        Value::String(s) => out.push_str(s.trim()),
        other => {
            let rendered =
                serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
            out.push_str(&rendered);
        }
    }
    out.push_str("\n\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CardRef;
    use crate::rules::default_rules;
    use serde_json::json;

    fn upstream() -> Upstream {
        Upstream::from([
            ("title".to_string(), json!("The Lighthouse Keeper")),
            ("logline".to_string(), json!("A keeper must choose between the light and her sister.")),
            ("genre".to_string(), json!("Rites of Passage")),
            ("beat_sheet".to_string(), json!({"Catalyst": "The lamp fails."})),
            ("characters".to_string(), json!(["Mara", "Ines"])),
        ])
    }

    #[test]
    fn initial_prompt_carries_story_and_rules() {
        let rules = default_rules();
        let prompt = build_initial(&upstream(), rules).unwrap();
        assert!(prompt.user.contains("The Lighthouse Keeper"));
        assert!(prompt.user.contains("The lamp fails."));
        assert!(prompt.system.contains("Catalyst at card 4 (+/- 2)"));
        assert!(prompt.system.contains("Between 36 and 44 cards"));
        assert_eq!(prompt.meta.get("kind").map(String::as_str), Some("initial"));
    }

    #[test]
    fn system_prompt_lists_every_beat_and_group() {
        let rules = default_rules();
        let system = build_system_prompt(rules);
        for beat in &rules.beats {
            assert!(system.contains(beat.as_str()), "missing beat {beat}");
        }
        for group in &rules.groups {
            assert!(system.contains(group.as_str()), "missing group {group}");
        }
    }

    #[test]
    fn missing_upstream_field_is_a_config_error() {
        let rules = default_rules();
        for field in REQUIRED_UPSTREAM_FIELDS {
            let mut up = upstream();
            up.remove(field);
            let err = build_initial(&up, rules).unwrap_err();
            assert!(
                matches!(&err, ConfigError::MissingUpstreamField { field: f } if f == field),
                "expected missing {field}, got: {err}"
            );
        }
    }

    #[test]
    fn blank_upstream_values_count_as_missing() {
        let rules = default_rules();
        for blank in [json!(null), json!("   "), json!([]), json!({})] {
            let mut up = upstream();
            up.insert("logline".to_string(), blank);
            assert!(build_initial(&up, rules).is_err());
        }
    }

    #[test]
    fn extra_upstream_context_is_included() {
        let rules = default_rules();
        let mut up = upstream();
        up.insert("tone".to_string(), json!("bleak, salt-stained"));
        let prompt = build_initial(&up, rules).unwrap();
        assert!(prompt.user.contains("Additional Context"));
        assert!(prompt.user.contains("bleak, salt-stained"));
    }

    #[test]
    fn revision_prompt_embeds_prior_violations_and_hints() {
        let rules = default_rules();
        let prior = {
            let mut map = RawBoard::skeleton(rules).into_map();
            map.insert(
                "act_one".to_string(),
                json!([{"card_number": 1, "heading": "INT. LAMP ROOM - NIGHT"}]),
            );
            RawBoard::new(map)
        };
        let violations = vec![
            Violation::MissingLandmark {
                landmark: "Catalyst".to_string(),
            },
            Violation::NoEmotionalChange {
                card: CardRef {
                    group: "act_one".to_string(),
                    index: 0,
                    number: Some(1),
                },
                polarity: "+".to_string(),
            },
        ];
        let hints = vec!["Place each landmark beat exactly once.".to_string()];

        let prompt = build_revision(&prior, &violations, &hints, &upstream(), rules).unwrap();
        assert!(prompt.user.contains("INT. LAMP ROOM - NIGHT"));
        assert!(prompt.user.contains("missing_landmark: "));
        assert!(prompt.user.contains("no_emotional_change: "));
        assert!(prompt.user.contains("Place each landmark beat exactly once."));
        assert!(prompt.user.contains("The Lighthouse Keeper"));
        assert_eq!(prompt.meta.get("violations").map(String::as_str), Some("2"));
    }
}
