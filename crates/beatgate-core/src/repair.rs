//! Deterministic storyline repair.
//!
//! Storyline interleaving is the rule generators break most often and the
//! cheapest to fix without another model call. The repairer rewrites only the
//! `storyline` field of each card:
//!
//! 1. cards are flattened in group order and take the first *n* labels of the
//!    rule set's storyline sequence;
//! 2. a payoff pass then makes sure every storyline in use also appears in the
//!    final group, reassigning final-group cards where that keeps the primary
//!    gap rule intact.
//!
//! The output depends only on the card count, the group sizes and which cards
//! carry landmark beats, so repairing twice gives the same labels as
//! repairing once.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::board::{RawBoard, fields};
use crate::rules::RuleSet;
use crate::validate::document::absence_runs;
use crate::validate::{self, text};

/// When the repairer rewrites storylines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairPolicy {
    /// Always relabel every card from the template.
    #[default]
    AlwaysNormalize,
    /// Leave the board alone when it has no storyline violations.
    PreserveIfValid,
}

impl std::fmt::Display for RepairPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlwaysNormalize => write!(f, "always_normalize"),
            Self::PreserveIfValid => write!(f, "preserve_if_valid"),
        }
    }
}

impl std::str::FromStr for RepairPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "always_normalize" => Ok(Self::AlwaysNormalize),
            "preserve_if_valid" => Ok(Self::PreserveIfValid),
            other => Err(format!(
                "unknown repair policy {other:?} (expected always_normalize or preserve_if_valid)"
            )),
        }
    }
}

/// Return a copy of `raw` with storyline labels rewritten.
///
/// Non-object cards and non-list groups are left untouched. Never fails; when
/// the payoff pass cannot place a storyline the validator reports it.
pub fn repair_storylines(raw: &RawBoard, rules: &RuleSet, policy: RepairPolicy) -> RawBoard {
    if policy == RepairPolicy::PreserveIfValid
        && !validate::validate(raw, rules)
            .iter()
            .any(|v| v.code().is_storyline())
    {
        tracing::debug!("storylines already valid; repair skipped");
        return raw.clone();
    }

    let slots = slots(raw, rules);
    let sequence = rules.storyline_sequence(slots.len());
    let mut labels: Vec<Option<char>> = slots
        .iter()
        .zip(sequence)
        .map(|(slot, label)| slot.is_object.then_some(label))
        .collect();

    let reassigned = pay_off(&mut labels, &slots, rules);

    let mut repaired = raw.clone();
    repaired.for_each_card_mut(rules, |position, card| {
        if let Some(label) = labels[position] {
            card.insert(fields::STORYLINE.to_string(), Value::String(label.to_string()));
        }
    });

    tracing::debug!(
        cards = labels.len(),
        reassigned,
        "storylines repaired"
    );
    repaired
}

/// What the payoff pass needs to know about each flattened position.
struct Slot {
    is_object: bool,
    in_final_group: bool,
    is_landmark: bool,
}

fn slots(raw: &RawBoard, rules: &RuleSet) -> Vec<Slot> {
    let final_key = rules.final_group();
    raw.cards(rules)
        .map(|(card_ref, value)| Slot {
            is_object: value.is_object(),
            in_final_group: card_ref.group == final_key,
            is_landmark: text(value, fields::BEAT)
                .and_then(|b| rules.canonical_beat(b))
                .is_some_and(|beat| rules.landmark(beat).is_some()),
        })
        .collect()
}

/// Place every used storyline at least once in the final group. Returns the
/// number of cards relabelled.
fn pay_off(labels: &mut [Option<char>], slots: &[Slot], rules: &RuleSet) -> usize {
    let mut reassigned = 0;

    // Primaries first: losing one is worse than losing a secondary.
    let order = rules
        .primary
        .iter()
        .chain(rules.storylines.iter().filter(|s| !rules.is_primary(**s)));

    for &storyline in order {
        let used = labels.contains(&Some(storyline));
        let paid_off = final_positions(slots).any(|p| labels[p] == Some(storyline));
        if !used || paid_off {
            continue;
        }

        let candidates = candidates(labels, slots, rules, storyline);
        let chosen = candidates
            .iter()
            .copied()
            .find(|&p| {
                let mut trial = labels.to_vec();
                trial[p] = Some(storyline);
                primary_gaps_ok(&trial, rules)
            })
            .or_else(|| {
                rules
                    .is_primary(storyline)
                    .then(|| candidates.first().copied())
                    .flatten()
            });

        match chosen {
            Some(p) => {
                labels[p] = Some(storyline);
                reassigned += 1;
            }
            None => tracing::debug!(%storyline, "no final-group card can carry payoff"),
        }
    }
    reassigned
}

fn final_positions(slots: &[Slot]) -> impl Iterator<Item = usize> + '_ {
    slots
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_object && s.in_final_group)
        .map(|(p, _)| p)
}

/// Final-group positions that may take `storyline`, non-landmark cards first.
///
/// A missing primary may displace any secondary. A missing secondary may
/// only displace a label that occurs more than once in the final group, so
/// it never costs another storyline its payoff.
fn candidates(
    labels: &[Option<char>],
    slots: &[Slot],
    rules: &RuleSet,
    storyline: char,
) -> Vec<usize> {
    let final_labels: Vec<char> = final_positions(slots).filter_map(|p| labels[p]).collect();
    let repeated = |label: char| final_labels.iter().filter(|l| **l == label).count() > 1;

    let mut out: Vec<usize> = final_positions(slots)
        .filter(|&p| match labels[p] {
            Some(current) if rules.is_primary(storyline) => !rules.is_primary(current),
            Some(current) => repeated(current),
            None => false,
        })
        .collect();
    out.sort_by_key(|&p| slots[p].is_landmark);
    out
}

fn primary_gaps_ok(labels: &[Option<char>], rules: &RuleSet) -> bool {
    let max = rules.limits.max_primary_gap;
    rules.primary.iter().all(|&primary| {
        let present: Vec<bool> = labels.iter().map(|l| *l == Some(primary)).collect();
        absence_runs(&present).iter().all(|(_, run)| *run <= max)
    })
}
