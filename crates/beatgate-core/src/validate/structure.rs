//! Structure rules: group presence, card count bounds, group sizes.

use serde_json::Value;

use super::{BoardView, Violation};

pub(super) fn group_presence(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for key in &view.rules.groups {
        match view.raw.group(key) {
            None => out.push(Violation::MissingGroup { group: key.clone() }),
            Some(Value::Array(_)) => {}
            Some(_) => out.push(Violation::GroupNotList { group: key.clone() }),
        }
    }
}

pub(super) fn unit_count(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let limits = &view.rules.limits;
    let count = view.cards.len();
    if count < limits.min_units || count > limits.max_units {
        out.push(Violation::UnitCountOutOfRange {
            count,
            min: limits.min_units,
            max: limits.max_units,
        });
    }
}

pub(super) fn group_minimum(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let min = view.rules.limits.min_units_per_group;
    for key in &view.rules.groups {
        if let Some(cards) = view.raw.group_cards(key) {
            if cards.len() < min {
                out.push(Violation::GroupUnderMinimum {
                    group: key.clone(),
                    count: cards.len(),
                    min,
                });
            }
        }
    }
}

/// The final group may not be smaller than the smallest other group.
pub(super) fn final_group_population(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let final_key = view.rules.final_group();
    let Some(final_cards) = view.raw.group_cards(final_key) else {
        return;
    };
    let smallest = view
        .rules
        .groups
        .iter()
        .filter(|key| key.as_str() != final_key)
        .filter_map(|key| view.raw.group_cards(key))
        .map(Vec::len)
        .min();

    if let Some(smallest) = smallest {
        if final_cards.len() < smallest {
            out.push(Violation::FinalGroupUnderpopulated {
                group: final_key.to_string(),
                count: final_cards.len(),
                smallest,
            });
        }
    }
}
