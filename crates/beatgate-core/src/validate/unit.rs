//! Per-card rules.

use std::collections::HashSet;

use serde_json::Value;

use crate::board::{Polarity, fields};

use super::{BoardView, Violation, text};

/// Accepted scene heading prefixes.
const HEADING_PREFIXES: [&str; 5] = ["INT./EXT. ", "EXT./INT. ", "I/E. ", "INT. ", "EXT. "];

pub(super) fn required_fields(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for card in &view.cards {
        let Some(obj) = card.value.as_object() else {
            out.push(Violation::UnitNotObject {
                card: card.card_ref.clone(),
            });
            continue;
        };

        for field in fields::REQUIRED {
            let value = obj.get(field);
            let blank = match value {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(Value::Array(items)) => items.is_empty(),
                Some(_) => false,
            };
            if blank {
                out.push(Violation::MissingField {
                    card: card.card_ref.clone(),
                    field: field.to_string(),
                });
                continue;
            }

            if let Some(expected) = value.and_then(|v| wrong_type(field, v)) {
                out.push(Violation::InvalidFieldType {
                    card: card.card_ref.clone(),
                    field: field.to_string(),
                    expected: expected.to_string(),
                });
            }
        }
    }
}

/// The expected type description when `value` does not fit `field`.
fn wrong_type(field: &str, value: &Value) -> Option<&'static str> {
    let ok = match field {
        fields::CARD_NUMBER => value.as_u64().is_some(),
        fields::CHARACTERS => value.as_array().is_some_and(|names| {
            names
                .iter()
                .all(|n| n.as_str().is_some_and(|s| !s.trim().is_empty()))
        }),
        _ => value.is_string(),
    };
    if ok {
        return None;
    }
    Some(match field {
        fields::CARD_NUMBER => "non-negative integer",
        fields::CHARACTERS => "list of character names",
        _ => "string",
    })
}

/// Markers must be `+`/`-` and must differ within a card.
pub(super) fn polarity(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for card in &view.cards {
        let mut parsed = [None, None];
        for (slot, field) in [fields::EMOTIONAL_START, fields::EMOTIONAL_END]
            .into_iter()
            .enumerate()
        {
            let Some(marker) = text(card.value, field) else {
                continue;
            };
            match marker.parse::<Polarity>() {
                Ok(p) => parsed[slot] = Some(p),
                Err(_) => out.push(Violation::InvalidPolarity {
                    card: card.card_ref.clone(),
                    field: field.to_string(),
                    value: marker.to_string(),
                }),
            }
        }

        if let [Some(start), Some(end)] = parsed {
            if start == end {
                out.push(Violation::NoEmotionalChange {
                    card: card.card_ref.clone(),
                    polarity: start.to_string(),
                });
            }
        }
    }
}

pub(super) fn heading(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for card in &view.cards {
        let Some(heading) = text(card.value, fields::HEADING) else {
            continue;
        };
        if !is_scene_heading(heading) {
            out.push(Violation::InvalidHeading {
                card: card.card_ref.clone(),
                heading: heading.to_string(),
            });
        }
    }
}

/// `INT. PLACE - TIME` and its EXT / INT./EXT. / I/E. variants.
fn is_scene_heading(heading: &str) -> bool {
    let upper = heading.to_ascii_uppercase();
    let Some(prefix) = HEADING_PREFIXES.iter().find(|p| upper.starts_with(*p)) else {
        return false;
    };
    let rest = &heading[prefix.len()..];
    match rest.rsplit_once(" - ") {
        Some((place, time)) => !place.trim().is_empty() && !time.trim().is_empty(),
        None => false,
    }
}

pub(super) fn beat_vocabulary(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for card in &view.cards {
        let Some(beat) = text(card.value, fields::BEAT) else {
            continue;
        };
        if card.beat.is_none() {
            out.push(Violation::UnknownBeat {
                card: card.card_ref.clone(),
                beat: beat.to_string(),
            });
        }
    }
}

pub(super) fn description_length(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let max = view.rules.limits.max_description_words;
    for card in &view.cards {
        let Some(description) = text(card.value, fields::DESCRIPTION) else {
            continue;
        };
        let words = description.split_whitespace().count();
        if words > max {
            out.push(Violation::DescriptionTooLong {
                card: card.card_ref.clone(),
                words,
                max,
            });
        }
    }
}

/// One violation per repeated occurrence; the first holder keeps the number.
pub(super) fn card_number_uniqueness(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let mut seen = HashSet::new();
    for card in &view.cards {
        let Some(number) = card.value.get(fields::CARD_NUMBER).and_then(Value::as_u64) else {
            continue;
        };
        if !seen.insert(number) {
            out.push(Violation::DuplicateCardNumber {
                card: card.card_ref.clone(),
                number,
            });
        }
    }
}

pub(super) fn storyline_alphabet(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for card in &view.cards {
        let Some(value) = text(card.value, fields::STORYLINE) else {
            continue;
        };
        if card.storyline.is_none() {
            out.push(Violation::InvalidStoryline {
                card: card.card_ref.clone(),
                value: value.to_string(),
                allowed: view.rules.storylines.iter().collect(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_standard_headings() {
        assert!(is_scene_heading("INT. KITCHEN - NIGHT"));
        assert!(is_scene_heading("EXT. HARBOUR DOCKS - DAWN"));
        assert!(is_scene_heading("INT./EXT. MOVING CAR - DAY"));
        assert!(is_scene_heading("I/E. LIGHTHOUSE - CONTINUOUS"));
        assert!(is_scene_heading("int. attic - later"));
    }

    #[test]
    fn rejects_malformed_headings() {
        assert!(!is_scene_heading("KITCHEN - NIGHT"));
        assert!(!is_scene_heading("INT. KITCHEN"));
        assert!(!is_scene_heading("INT.  - NIGHT"));
        assert!(!is_scene_heading("INT. KITCHEN - "));
        assert!(!is_scene_heading("Somewhere dark"));
    }

    #[test]
    fn wrong_type_descriptions() {
        assert_eq!(
            wrong_type(fields::CARD_NUMBER, &Value::from("four")),
            Some("non-negative integer")
        );
        assert_eq!(wrong_type(fields::CARD_NUMBER, &Value::from(4)), None);
        assert_eq!(
            wrong_type(fields::CHARACTERS, &Value::from("Mara")),
            Some("list of character names")
        );
        assert_eq!(
            wrong_type(fields::CHARACTERS, &serde_json::json!(["Mara", ""])),
            Some("list of character names")
        );
        assert_eq!(wrong_type(fields::BEAT, &Value::from(3)), Some("string"));
    }
}
