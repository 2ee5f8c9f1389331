//! Board model: the untyped candidate ([`RawBoard`]) and the typed board
//! ([`Board`]) that is only built from a candidate that passed validation.

pub mod raw;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rules::RuleSet;
use crate::validate::{self, Violation};

pub use raw::{CardRef, RawBoard, fields};

// ---------------------------------------------------------------------------
// Polarity
// ---------------------------------------------------------------------------

/// Emotional charge at the start or end of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarity {
    #[serde(rename = "+")]
    Positive,
    #[serde(rename = "-")]
    Negative,
}

impl Polarity {
    pub fn opposite(self) -> Self {
        match self {
            Self::Positive => Self::Negative,
            Self::Negative => Self::Positive,
        }
    }
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Positive => "+",
            Self::Negative => "-",
        };
        f.write_str(s)
    }
}

impl FromStr for Polarity {
    type Err = PolarityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "+" => Ok(Self::Positive),
            "-" => Ok(Self::Negative),
            other => Err(PolarityParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Polarity`] marker.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid polarity marker: {0:?}")]
pub struct PolarityParseError(pub String);

// ---------------------------------------------------------------------------
// Typed board
// ---------------------------------------------------------------------------

/// One scene card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneCard {
    pub card_number: u64,
    pub heading: String,
    /// Canonical beat name.
    pub beat: String,
    pub storyline: char,
    pub emotional_start: Polarity,
    pub emotional_end: Polarity,
    pub description: String,
    pub conflict: String,
    pub characters: Vec<String>,
}

/// One act row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardGroup {
    pub key: String,
    pub cards: Vec<SceneCard>,
}

/// A board that satisfied every rule at the time it was built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub groups: Vec<BoardGroup>,
}

impl Board {
    /// Validate a raw candidate and, only if it passes, build the typed board.
    pub fn try_from_raw(raw: &RawBoard, rules: &RuleSet) -> Result<Self, Vec<Violation>> {
        let violations = validate::validate(raw, rules);
        if !violations.is_empty() {
            return Err(violations);
        }

        let groups = rules
            .groups
            .iter()
            .map(|key| {
                let cards = raw
                    .group_cards(key)
                    .into_iter()
                    .flatten()
                    .filter_map(|card| typed_card(card, rules))
                    .collect();
                BoardGroup {
                    key: key.clone(),
                    cards,
                }
            })
            .collect();

        Ok(Self { groups })
    }

    /// Convert back to the untyped form the validator and prompts consume.
    pub fn to_raw(&self) -> RawBoard {
        let mut map = Map::new();
        for group in &self.groups {
            let cards = group
                .cards
                .iter()
                .map(|card| {
                    let mut obj = Map::new();
                    obj.insert(fields::CARD_NUMBER.into(), card.card_number.into());
                    obj.insert(fields::HEADING.into(), card.heading.clone().into());
                    obj.insert(fields::BEAT.into(), card.beat.clone().into());
                    obj.insert(fields::STORYLINE.into(), card.storyline.to_string().into());
                    obj.insert(
                        fields::EMOTIONAL_START.into(),
                        card.emotional_start.to_string().into(),
                    );
                    obj.insert(
                        fields::EMOTIONAL_END.into(),
                        card.emotional_end.to_string().into(),
                    );
                    obj.insert(fields::DESCRIPTION.into(), card.description.clone().into());
                    obj.insert(fields::CONFLICT.into(), card.conflict.clone().into());
                    obj.insert(fields::CHARACTERS.into(), card.characters.clone().into());
                    Value::Object(obj)
                })
                .collect();
            map.insert(group.key.clone(), Value::Array(cards));
        }
        RawBoard::new(map)
    }

    /// Every card in board order.
    pub fn cards(&self) -> impl Iterator<Item = &SceneCard> {
        self.groups.iter().flat_map(|g| g.cards.iter())
    }

    pub fn card_count(&self) -> usize {
        self.groups.iter().map(|g| g.cards.len()).sum()
    }
}

/// Build a typed card from an object the validator already accepted.
fn typed_card(card: &Value, rules: &RuleSet) -> Option<SceneCard> {
    let text = |field: &str| card.get(field).and_then(Value::as_str).map(str::trim);

    Some(SceneCard {
        card_number: card.get(fields::CARD_NUMBER)?.as_u64()?,
        heading: text(fields::HEADING)?.to_string(),
        beat: rules.canonical_beat(text(fields::BEAT)?)?.to_string(),
        storyline: text(fields::STORYLINE)?.chars().next()?.to_ascii_uppercase(),
        emotional_start: text(fields::EMOTIONAL_START)?.parse().ok()?,
        emotional_end: text(fields::EMOTIONAL_END)?.parse().ok()?,
        description: text(fields::DESCRIPTION)?.to_string(),
        conflict: text(fields::CONFLICT)?.to_string(),
        characters: card
            .get(fields::CHARACTERS)?
            .as_array()?
            .iter()
            .filter_map(Value::as_str)
            .map(|s| s.trim().to_string())
            .collect(),
    })
}
