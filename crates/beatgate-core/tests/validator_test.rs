//! Integration tests for the validator battery against the canonical board
//! and targeted corruptions of it.

use serde_json::{Value, json};

use beatgate_core::board::fields;
use beatgate_core::rules::{MAX_DESCRIPTION_WORDS, default_rules};
use beatgate_core::validate::{ErrorCode, Violation, suggest_fix, validate, validate_board};
use beatgate_core::{Board, RawBoard};

use beatgate_test_utils::{canonical_board, set_card_field};

fn codes(violations: &[Violation]) -> Vec<&'static str> {
    violations.iter().map(|v| v.code().as_str()).collect()
}

fn with_group(board: RawBoard, key: &str, value: Value) -> RawBoard {
    let mut map = board.into_map();
    map.insert(key.to_string(), value);
    RawBoard::new(map)
}

// ===========================================================================
// Canonical board
// ===========================================================================

#[test]
fn canonical_board_is_valid() {
    let (ok, violations) = validate_board(&canonical_board(), default_rules());
    assert!(ok, "unexpected violations: {violations:?}");
    assert!(violations.is_empty());
}

#[test]
fn canonical_board_types_and_converts_back() {
    let rules = default_rules();
    let board = Board::try_from_raw(&canonical_board(), rules).unwrap();
    assert_eq!(board.card_count(), 40);
    assert_eq!(board.groups.len(), 4);
    assert_eq!(board.groups[0].cards[3].beat, "Catalyst");

    let (ok, violations) = validate_board(&board.to_raw(), rules);
    assert!(ok, "typed board converted back should stay valid: {violations:?}");
}

#[test]
fn typed_board_is_refused_for_invalid_candidates() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 1, fields::EMOTIONAL_END, json!("+"));
    let violations = Board::try_from_raw(&raw, default_rules()).unwrap_err();
    assert_eq!(codes(&violations), vec!["no_emotional_change"]);
}

// ===========================================================================
// Structure
// ===========================================================================

#[test]
fn missing_group_is_named() {
    let rules = default_rules();
    for key in &rules.groups {
        let mut map = canonical_board().into_map();
        map.remove(key);
        let violations = validate(&RawBoard::new(map), rules);
        assert!(
            violations
                .iter()
                .any(|v| matches!(v, Violation::MissingGroup { group } if group == key)),
            "expected missing-group for {key}, got {violations:?}"
        );
    }
}

#[test]
fn group_that_is_not_a_list() {
    let raw = with_group(canonical_board(), "act_two_a", json!("ten cards"));
    let violations = validate(&raw, default_rules());
    assert!(violations.iter().any(
        |v| matches!(v, Violation::GroupNotList { group } if group == "act_two_a")
    ));
}

#[test]
fn short_final_group_breaks_count_minimum_and_population() {
    let raw = canonical_board();
    let mut act_three = raw.group_cards("act_three").unwrap().clone();
    act_three.truncate(5);
    let raw = with_group(raw, "act_three", Value::Array(act_three));

    let codes = codes(&validate(&raw, default_rules()));
    assert!(codes.contains(&"unit_count_out_of_range"), "{codes:?}");
    assert!(codes.contains(&"group_under_minimum"), "{codes:?}");
    assert!(codes.contains(&"final_group_underpopulated"), "{codes:?}");
}

// ===========================================================================
// Per card
// ===========================================================================

#[test]
fn relabelled_catalyst_reports_only_the_missing_landmark() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 4, fields::BEAT, json!("Set-Up"));

    let violations = validate(&raw, default_rules());
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert!(matches!(
        &violations[0],
        Violation::MissingLandmark { landmark } if landmark == "Catalyst"
    ));
}

#[test]
fn equal_markers_on_card_one_report_only_no_change() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 1, fields::EMOTIONAL_END, json!("+"));

    let violations = validate(&raw, default_rules());
    assert_eq!(violations.len(), 1, "{violations:?}");
    match &violations[0] {
        Violation::NoEmotionalChange { card, polarity } => {
            assert_eq!(card.number, Some(1));
            assert_eq!(polarity, "+");
        }
        other => panic!("expected no_emotional_change, got {other:?}"),
    }
}

#[test]
fn polarity_rule_flags_equal_and_only_equal_markers() {
    let rules = default_rules();
    for start in ["+", "-"] {
        for end in ["+", "-"] {
            let mut raw = canonical_board();
            // Card 7 is not a landmark, so only the per-card rule can fire.
            set_card_field(&mut raw, 7, fields::EMOTIONAL_START, json!(start));
            set_card_field(&mut raw, 7, fields::EMOTIONAL_END, json!(end));
            let flagged = validate(&raw, rules)
                .iter()
                .any(|v| v.code() == ErrorCode::NoEmotionalChange);
            assert_eq!(flagged, start == end, "start {start} end {end}");
        }
    }
}

#[test]
fn invalid_polarity_marker() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 7, fields::EMOTIONAL_START, json!("up"));
    let violations = validate(&raw, default_rules());
    assert_eq!(codes(&violations), vec!["invalid_polarity"]);
}

#[test]
fn duplicate_numbers_report_each_extra_occurrence() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 2, fields::CARD_NUMBER, json!(1));
    set_card_field(&mut raw, 3, fields::CARD_NUMBER, json!(1));

    let violations = validate(&raw, default_rules());
    let duplicates: Vec<&Violation> = violations
        .iter()
        .filter(|v| v.code() == ErrorCode::DuplicateCardNumber)
        .collect();
    assert_eq!(duplicates.len(), 2);
    for v in duplicates {
        assert!(matches!(v, Violation::DuplicateCardNumber { number: 1, .. }));
    }
}

#[test]
fn missing_and_mistyped_fields() {
    let rules = default_rules();

    let mut raw = canonical_board();
    let mut act_one = raw.group_cards("act_one").unwrap().clone();
    act_one[6].as_object_mut().unwrap().remove(fields::CONFLICT);
    raw = with_group(raw, "act_one", Value::Array(act_one));
    let violations = validate(&raw, rules);
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert!(matches!(
        &violations[0],
        Violation::MissingField { field, .. } if field == fields::CONFLICT
    ));

    let mut raw = canonical_board();
    set_card_field(&mut raw, 7, fields::CHARACTERS, json!("Mara"));
    assert_eq!(codes(&validate(&raw, rules)), vec!["invalid_field_type"]);

    let mut raw = canonical_board();
    set_card_field(&mut raw, 7, fields::DESCRIPTION, json!("   "));
    assert_eq!(codes(&validate(&raw, rules)), vec!["missing_field"]);
}

#[test]
fn non_object_card() {
    let raw = canonical_board();
    let mut act_two_b = raw.group_cards("act_two_b").unwrap().clone();
    act_two_b.push(json!("a stray note"));
    let raw = with_group(raw, "act_two_b", Value::Array(act_two_b));

    let violations = validate(&raw, default_rules());
    assert!(violations
        .iter()
        .any(|v| v.code() == ErrorCode::UnitNotObject));
}

#[test]
fn heading_beat_and_description_rules() {
    let rules = default_rules();

    let mut raw = canonical_board();
    set_card_field(&mut raw, 7, fields::HEADING, json!("The lamp room at night"));
    assert_eq!(codes(&validate(&raw, rules)), vec!["invalid_heading"]);

    let mut raw = canonical_board();
    set_card_field(&mut raw, 7, fields::BEAT, json!("Inciting Incident"));
    assert_eq!(codes(&validate(&raw, rules)), vec!["unknown_beat"]);

    let mut raw = canonical_board();
    let long = vec!["word"; MAX_DESCRIPTION_WORDS + 1].join(" ");
    set_card_field(&mut raw, 7, fields::DESCRIPTION, json!(long));
    assert_eq!(codes(&validate(&raw, rules)), vec!["description_too_long"]);

    let mut raw = canonical_board();
    let exact = vec!["word"; MAX_DESCRIPTION_WORDS].join(" ");
    set_card_field(&mut raw, 7, fields::DESCRIPTION, json!(exact));
    assert!(validate(&raw, rules).is_empty());
}

#[test]
fn beat_labels_are_case_and_suffix_tolerant() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 4, fields::BEAT, json!("CATALYST: the lamp fails"));
    set_card_field(&mut raw, 7, fields::BEAT, json!("debate"));
    assert!(validate(&raw, default_rules()).is_empty());
}

// ===========================================================================
// Whole board
// ===========================================================================

#[test]
fn storyline_outside_alphabet() {
    let mut raw = canonical_board();
    set_card_field(&mut raw, 7, fields::STORYLINE, json!("F"));
    let codes = codes(&validate(&raw, default_rules()));
    assert!(codes.contains(&"invalid_storyline"), "{codes:?}");
}

#[test]
fn primary_storyline_gap_is_reported() {
    let mut raw = canonical_board();
    // Cards 1, 5 and 8 carry A in the first period; dropping 5 and 8 leaves
    // A absent from card 2 through card 8.
    set_card_field(&mut raw, 5, fields::STORYLINE, json!("C"));
    set_card_field(&mut raw, 8, fields::STORYLINE, json!("D"));
    let violations = validate(&raw, default_rules());
    assert!(violations.iter().any(|v| matches!(
        v,
        Violation::PrimaryStorylineGap { storyline: 'A', start: 2, run: 7, .. }
    )), "{violations:?}");
}

#[test]
fn missing_payoff_in_final_group() {
    let mut raw = canonical_board();
    // E appears at cards 7, 15, 23, 31 and 39; recolour the final-group ones.
    set_card_field(&mut raw, 31, fields::STORYLINE, json!("C"));
    set_card_field(&mut raw, 39, fields::STORYLINE, json!("D"));
    let violations = validate(&raw, default_rules());
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert!(matches!(
        &violations[0],
        Violation::MissingPayoff { storyline: 'E', group } if group == "act_three"
    ));
}

#[test]
fn opposite_landmarks_with_equal_endings_clash() {
    let mut raw = canonical_board();
    // Midpoint (20) normally turns - to +; make it end - like All Is Lost.
    set_card_field(&mut raw, 20, fields::EMOTIONAL_START, json!("+"));
    set_card_field(&mut raw, 20, fields::EMOTIONAL_END, json!("-"));
    let violations = validate(&raw, default_rules());
    assert_eq!(codes(&violations), vec!["landmark_polarity_clash"]);
}

#[test]
fn landmark_out_of_position_and_duplicated() {
    let rules = default_rules();

    let mut raw = canonical_board();
    set_card_field(&mut raw, 4, fields::BEAT, json!("Set-Up"));
    set_card_field(&mut raw, 8, fields::BEAT, json!("Catalyst"));
    let violations = validate(&raw, rules);
    assert_eq!(violations.len(), 1, "{violations:?}");
    assert!(matches!(
        &violations[0],
        Violation::LandmarkOutOfPosition { actual: 8, expected: 4, tolerance: 2, .. }
    ));

    let mut raw = canonical_board();
    set_card_field(&mut raw, 5, fields::BEAT, json!("Catalyst"));
    let violations = validate(&raw, rules);
    assert!(matches!(
        violations.as_slice(),
        [Violation::DuplicateLandmark { count: 2, .. }]
    ), "{violations:?}");
}

#[test]
fn every_violation_has_a_code_message_and_hint() {
    let rules = default_rules();
    let violations = validate(&RawBoard::skeleton(rules), rules);
    assert!(!violations.is_empty());
    for v in &violations {
        let line = v.to_line();
        assert!(line.starts_with(v.code().as_str()), "{line}");
        assert!(!suggest_fix(v, rules).is_empty());
    }
}
