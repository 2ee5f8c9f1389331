//! Remediation hints for revision prompts.
//!
//! Hints are keyed on [`ErrorCode`] with an exhaustive match, so adding a
//! violation kind without a hint fails to compile.

use std::collections::HashSet;

use crate::rules::RuleSet;

use super::{ErrorCode, Violation};

/// Hint for a single violation.
pub fn suggest_fix(violation: &Violation, rules: &RuleSet) -> String {
    let limits = &rules.limits;
    match violation.code() {
        ErrorCode::MissingGroup => format!(
            "Include every act row as a top-level key: {}.",
            rules.groups.join(", ")
        ),
        ErrorCode::GroupNotList => {
            "Each act row must be a JSON array of card objects.".to_string()
        }
        ErrorCode::UnitCountOutOfRange => format!(
            "Write between {} and {} cards in total.",
            limits.min_units, limits.max_units
        ),
        ErrorCode::GroupUnderMinimum => format!(
            "Give every act row at least {} cards.",
            limits.min_units_per_group
        ),
        ErrorCode::FinalGroupUnderpopulated => format!(
            "Move or add cards so {} is at least as full as the thinnest other row.",
            rules.final_group()
        ),
        ErrorCode::UnitNotObject => {
            "Every card must be a JSON object with the card fields.".to_string()
        }
        ErrorCode::MissingField => format!(
            "Fill in every card field: {}.",
            crate::board::fields::REQUIRED.join(", ")
        ),
        ErrorCode::InvalidFieldType => {
            "Use an integer card_number, a list of names for characters and strings elsewhere."
                .to_string()
        }
        ErrorCode::InvalidPolarity => {
            "Mark emotional_start and emotional_end with \"+\" or \"-\" only.".to_string()
        }
        ErrorCode::NoEmotionalChange => {
            "Make each card turn: emotional_end must be the opposite of emotional_start."
                .to_string()
        }
        ErrorCode::InvalidHeading => {
            "Write headings as INT. PLACE - TIME (or EXT., INT./EXT., I/E.).".to_string()
        }
        ErrorCode::UnknownBeat => format!(
            "Use only these beat names: {}.",
            rules.beats.join(", ")
        ),
        ErrorCode::DescriptionTooLong => format!(
            "Trim card descriptions to {} words or fewer.",
            limits.max_description_words
        ),
        ErrorCode::DuplicateCardNumber => {
            "Number cards consecutively from 1 with no repeats.".to_string()
        }
        ErrorCode::InvalidStoryline => format!(
            "Tag each card with one storyline letter from {}.",
            rules.storylines.iter().collect::<String>()
        ),
        ErrorCode::PrimaryStorylineGap => format!(
            "Weave storylines {} and {} so neither disappears for more than {} cards in a row.",
            rules.primary[0], rules.primary[1], limits.max_primary_gap
        ),
        ErrorCode::LandmarkPolarityClash => format!(
            "{} and {} must end on opposite charges: if one ends \"+\" the other ends \"-\".",
            rules.opposite_pair[0], rules.opposite_pair[1]
        ),
        ErrorCode::MissingPayoff => format!(
            "Pay off every storyline you open with at least one card in {}.",
            rules.final_group()
        ),
        ErrorCode::MissingLandmark => format!(
            "Place each landmark beat exactly once: {}.",
            landmark_table(rules)
        ),
        ErrorCode::DuplicateLandmark => {
            "Use each landmark beat on exactly one card; relabel the extras.".to_string()
        }
        ErrorCode::LandmarkOutOfPosition => format!(
            "Move landmark beats near their expected card positions: {}.",
            landmark_table(rules)
        ),
        ErrorCode::RevisionRequested => {
            "Address the requested revision while keeping every other rule satisfied."
                .to_string()
        }
    }
}

/// Hints for a list of violations, de-duplicated in first-seen order.
pub fn suggest_fixes(violations: &[Violation], rules: &RuleSet) -> Vec<String> {
    let mut seen = HashSet::new();
    violations
        .iter()
        .map(|v| suggest_fix(v, rules))
        .filter(|hint| seen.insert(hint.clone()))
        .collect()
}

fn landmark_table(rules: &RuleSet) -> String {
    rules
        .landmarks
        .iter()
        .map(|l| format!("{} at card {} (+/- {})", l.name, l.position, l.tolerance))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CardRef;
    use crate::rules::{MAX_DESCRIPTION_WORDS, MAX_PRIMARY_GAP, default_rules};

    fn card(n: u64) -> CardRef {
        CardRef {
            group: "act_one".to_string(),
            index: 0,
            number: Some(n),
        }
    }

    #[test]
    fn hints_quote_the_shared_limits() {
        let rules = default_rules();
        let long = Violation::DescriptionTooLong {
            card: card(3),
            words: 80,
            max: MAX_DESCRIPTION_WORDS,
        };
        assert!(suggest_fix(&long, rules).contains(&MAX_DESCRIPTION_WORDS.to_string()));

        let gap = Violation::PrimaryStorylineGap {
            storyline: 'A',
            start: 5,
            run: 6,
            max: MAX_PRIMARY_GAP,
        };
        assert!(suggest_fix(&gap, rules).contains(&MAX_PRIMARY_GAP.to_string()));
    }

    #[test]
    fn missing_landmark_hint_lists_positions() {
        let rules = default_rules();
        let v = Violation::MissingLandmark {
            landmark: "Catalyst".to_string(),
        };
        let hint = suggest_fix(&v, rules);
        assert!(hint.contains("Catalyst at card 4 (+/- 2)"), "got: {hint}");
    }

    #[test]
    fn suggest_fixes_dedups_in_order() {
        let rules = default_rules();
        let violations = vec![
            Violation::NoEmotionalChange {
                card: card(1),
                polarity: "+".to_string(),
            },
            Violation::MissingLandmark {
                landmark: "Catalyst".to_string(),
            },
            Violation::NoEmotionalChange {
                card: card(2),
                polarity: "-".to_string(),
            },
        ];
        let hints = suggest_fixes(&violations, rules);
        assert_eq!(hints.len(), 2);
        assert!(hints[0].contains("emotional_end"));
        assert!(hints[1].contains("landmark"));
    }
}
