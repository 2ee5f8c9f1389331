//! Board validator: an ordered battery of named rules evaluated over a
//! [`RawBoard`].
//!
//! Validation is a pure function. Rules never short-circuit one another, so a
//! single pass collects every problem and one revision prompt can address
//! them all. Each rule reports a field only once: rules that read a field
//! skip it when it is absent or of the wrong type, which `required_fields`
//! has already reported.

pub mod fix;
pub(crate) mod document;
mod structure;
mod unit;
pub mod violation;

use serde_json::Value;

use crate::board::{CardRef, Polarity, RawBoard, fields};
use crate::rules::RuleSet;

pub use fix::{suggest_fix, suggest_fixes};
pub use violation::{ErrorCode, Violation};

/// Version of the rule battery, stamped into artifact provenance.
pub const VALIDATOR_VERSION: &str = concat!("board-rules/", env!("CARGO_PKG_VERSION"));

type Check = fn(&BoardView<'_>, &mut Vec<Violation>);

/// The rule battery, in evaluation order: structure, then per card, then
/// whole board.
const BATTERY: &[(&str, Check)] = &[
    ("group_presence", structure::group_presence),
    ("unit_count", structure::unit_count),
    ("group_minimum", structure::group_minimum),
    ("final_group_population", structure::final_group_population),
    ("required_fields", unit::required_fields),
    ("polarity", unit::polarity),
    ("heading", unit::heading),
    ("beat_vocabulary", unit::beat_vocabulary),
    ("description_length", unit::description_length),
    ("card_number_uniqueness", unit::card_number_uniqueness),
    ("storyline_alphabet", unit::storyline_alphabet),
    ("primary_storyline_gap", document::primary_storyline_gap),
    ("landmark_polarity", document::landmark_polarity),
    ("payoff", document::payoff),
    ("landmarks", document::landmarks),
];

/// Names of the rules in evaluation order.
pub fn rule_names() -> impl Iterator<Item = &'static str> {
    BATTERY.iter().map(|(name, _)| *name)
}

/// Run every rule and return all violations. Empty means valid.
pub fn validate(raw: &RawBoard, rules: &RuleSet) -> Vec<Violation> {
    let view = BoardView::new(raw, rules);
    let mut out = Vec::new();
    for (name, check) in BATTERY {
        let before = out.len();
        check(&view, &mut out);
        if out.len() > before {
            tracing::trace!(rule = name, found = out.len() - before, "rule failed");
        }
    }
    tracing::debug!(
        cards = view.cards.len(),
        violations = out.len(),
        "board validated"
    );
    out
}

/// `(is_valid, violations)`.
pub fn validate_board(raw: &RawBoard, rules: &RuleSet) -> (bool, Vec<Violation>) {
    let violations = validate(raw, rules);
    (violations.is_empty(), violations)
}

// ---------------------------------------------------------------------------
// Board view
// ---------------------------------------------------------------------------

/// Pre-resolved facts about each card, shared by the rules.
pub(crate) struct BoardView<'a> {
    pub(crate) raw: &'a RawBoard,
    pub(crate) rules: &'a RuleSet,
    pub(crate) cards: Vec<CardView<'a>>,
}

pub(crate) struct CardView<'a> {
    pub(crate) card_ref: CardRef,
    pub(crate) value: &'a Value,
    /// 1-based position in the flattened board.
    pub(crate) position: usize,
    /// Storyline label, if valid for the alphabet.
    pub(crate) storyline: Option<char>,
    /// Canonical beat, if the label resolves.
    pub(crate) beat: Option<&'a str>,
    /// Ending polarity, if the marker is valid.
    pub(crate) emotional_end: Option<Polarity>,
}

impl<'a> BoardView<'a> {
    pub(crate) fn new(raw: &'a RawBoard, rules: &'a RuleSet) -> Self {
        let cards = raw
            .cards(rules)
            .enumerate()
            .map(|(i, (card_ref, value))| CardView {
                card_ref,
                value,
                position: i + 1,
                storyline: text(value, fields::STORYLINE).and_then(|s| storyline_label(s, rules)),
                beat: text(value, fields::BEAT).and_then(|b| rules.canonical_beat(b)),
                emotional_end: text(value, fields::EMOTIONAL_END).and_then(|p| p.parse().ok()),
            })
            .collect();
        Self { raw, rules, cards }
    }
}

/// A trimmed, non-empty string field.
pub(crate) fn text<'v>(card: &'v Value, field: &str) -> Option<&'v str> {
    card.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Resolve a storyline field to a label from the alphabet.
pub(crate) fn storyline_label(value: &str, rules: &RuleSet) -> Option<char> {
    let mut chars = value.trim().chars();
    let label = chars.next()?.to_ascii_uppercase();
    if chars.next().is_some() || !rules.storylines.contains(&label) {
        return None;
    }
    Some(label)
}
