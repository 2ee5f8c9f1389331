//! Loosely typed board, as extracted from generator output.
//!
//! Nothing about its shape is trusted: groups may be missing or not lists,
//! cards may not be objects, fields may be absent or of the wrong type. The
//! validator inspects a `RawBoard`; only a board that passes every check is
//! turned into a typed [`super::Board`].

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::rules::RuleSet;

/// Card field names.
pub mod fields {
    pub const CARD_NUMBER: &str = "card_number";
    pub const HEADING: &str = "heading";
    pub const BEAT: &str = "beat";
    pub const STORYLINE: &str = "storyline";
    pub const EMOTIONAL_START: &str = "emotional_start";
    pub const EMOTIONAL_END: &str = "emotional_end";
    pub const DESCRIPTION: &str = "description";
    pub const CONFLICT: &str = "conflict";
    pub const CHARACTERS: &str = "characters";

    /// Every card must carry all of these.
    pub const REQUIRED: [&str; 9] = [
        CARD_NUMBER,
        HEADING,
        BEAT,
        STORYLINE,
        EMOTIONAL_START,
        EMOTIONAL_END,
        DESCRIPTION,
        CONFLICT,
        CHARACTERS,
    ];
}

/// Where a card sits on the board, for error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRef {
    /// Group key the card was found in.
    pub group: String,
    /// 0-based index within the group.
    pub index: usize,
    /// The card's own number, when it has a usable one.
    pub number: Option<u64>,
}

impl fmt::Display for CardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.number {
            Some(n) => write!(f, "card {n} ({}[{}])", self.group, self.index),
            None => write!(f, "card {}[{}]", self.group, self.index),
        }
    }
}

/// A board candidate as an untyped JSON object.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawBoard(Map<String, Value>);

impl RawBoard {
    /// Wrap an already-parsed JSON object.
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// A board with every group present and empty.
    pub fn skeleton(rules: &RuleSet) -> Self {
        let map = rules
            .groups
            .iter()
            .map(|key| (key.clone(), Value::Array(Vec::new())))
            .collect();
        Self(map)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// The value stored under a group key, whatever its type.
    pub fn group(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Cards of a group, if the group exists and is a list.
    pub fn group_cards(&self, key: &str) -> Option<&Vec<Value>> {
        self.0.get(key).and_then(Value::as_array)
    }

    /// Every card in board order, skipping groups that are absent or not
    /// lists.
    pub fn cards<'a>(&'a self, rules: &'a RuleSet) -> impl Iterator<Item = (CardRef, &'a Value)> + 'a {
        rules.groups.iter().flat_map(move |key| {
            self.group_cards(key)
                .into_iter()
                .flatten()
                .enumerate()
                .map(move |(index, card)| {
                    let card_ref = CardRef {
                        group: key.clone(),
                        index,
                        number: card.get(fields::CARD_NUMBER).and_then(Value::as_u64),
                    };
                    (card_ref, card)
                })
        })
    }

    /// Number of cards across all list-valued groups.
    pub fn card_count(&self, rules: &RuleSet) -> usize {
        rules
            .groups
            .iter()
            .filter_map(|key| self.group_cards(key))
            .map(Vec::len)
            .sum()
    }

    /// Visit every object-valued card mutably, in board order.
    ///
    /// The callback receives the card's flattened 0-based position, counting
    /// non-object cards too so positions line up with [`Self::cards`].
    pub fn for_each_card_mut(
        &mut self,
        rules: &RuleSet,
        mut f: impl FnMut(usize, &mut Map<String, Value>),
    ) {
        let mut position = 0;
        for key in &rules.groups {
            let Some(Value::Array(cards)) = self.0.get_mut(key) else {
                continue;
            };
            for card in cards.iter_mut() {
                if let Value::Object(obj) = card {
                    f(position, obj);
                }
                position += 1;
            }
        }
    }

    /// Pretty-printed JSON, used in revision prompts.
    pub fn to_pretty_json(&self) -> String {
        serde_json::to_string_pretty(&self.0).unwrap_or_else(|_| "{}".to_string())
    }
}

impl From<Map<String, Value>> for RawBoard {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}
