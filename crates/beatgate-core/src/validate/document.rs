//! Whole-board rules: storyline gaps, payoff, landmark placement and the
//! opposite-polarity landmark pair.

use std::collections::BTreeSet;

use super::{BoardView, Violation};

/// A primary storyline may not be absent for more than `max_primary_gap`
/// consecutive cards. Leading and trailing runs count.
pub(super) fn primary_storyline_gap(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let max = view.rules.limits.max_primary_gap;
    if view.cards.is_empty() {
        return;
    }
    for storyline in view.rules.primary {
        let present: Vec<bool> = view
            .cards
            .iter()
            .map(|c| c.storyline == Some(storyline))
            .collect();
        for (start, run) in absence_runs(&present) {
            if run > max {
                out.push(Violation::PrimaryStorylineGap {
                    storyline,
                    start,
                    run,
                    max,
                });
            }
        }
    }
}

/// `(1-based start, length)` of every maximal run of `false`.
pub(crate) fn absence_runs(present: &[bool]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut run_start = None;
    for (i, here) in present.iter().enumerate() {
        match (here, run_start) {
            (false, None) => run_start = Some(i),
            (true, Some(start)) => {
                runs.push((start + 1, i - start));
                run_start = None;
            }
            _ => {}
        }
    }
    if let Some(start) = run_start {
        runs.push((start + 1, present.len() - start));
    }
    runs
}

/// The designated landmark pair must end on opposite polarity.
pub(super) fn landmark_polarity(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let [first, second] = &view.rules.opposite_pair;
    let unique_end = |name: &str| {
        let mut matches = view.cards.iter().filter(|c| c.beat == Some(name));
        match (matches.next(), matches.next()) {
            (Some(card), None) => card.emotional_end,
            _ => None,
        }
    };

    if let (Some(a), Some(b)) = (unique_end(first.as_str()), unique_end(second.as_str())) {
        if a == b {
            out.push(Violation::LandmarkPolarityClash {
                first: first.clone(),
                second: second.clone(),
                polarity: a.to_string(),
            });
        }
    }
}

/// Every storyline used anywhere must appear in the final group.
pub(super) fn payoff(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    let final_key = view.rules.final_group();
    if view.raw.group_cards(final_key).is_none() {
        return;
    }

    let used: BTreeSet<char> = view.cards.iter().filter_map(|c| c.storyline).collect();
    let paid_off: BTreeSet<char> = view
        .cards
        .iter()
        .filter(|c| c.card_ref.group == final_key)
        .filter_map(|c| c.storyline)
        .collect();

    for storyline in &view.rules.storylines {
        if used.contains(storyline) && !paid_off.contains(storyline) {
            out.push(Violation::MissingPayoff {
                storyline: *storyline,
                group: final_key.to_string(),
            });
        }
    }
}

/// Each landmark appears exactly once, within tolerance of its position.
pub(super) fn landmarks(view: &BoardView<'_>, out: &mut Vec<Violation>) {
    for landmark in &view.rules.landmarks {
        let positions: Vec<usize> = view
            .cards
            .iter()
            .filter(|c| c.beat == Some(landmark.name.as_str()))
            .map(|c| c.position)
            .collect();

        match positions.as_slice() {
            [] => out.push(Violation::MissingLandmark {
                landmark: landmark.name.clone(),
            }),
            [actual] => {
                if !landmark.accepts(*actual) {
                    out.push(Violation::LandmarkOutOfPosition {
                        landmark: landmark.name.clone(),
                        actual: *actual,
                        expected: landmark.position,
                        tolerance: landmark.tolerance,
                    });
                }
            }
            many => out.push(Violation::DuplicateLandmark {
                landmark: landmark.name.clone(),
                count: many.len(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_runs_cover_leading_inner_and_trailing() {
        let present = [false, false, true, false, true, true, false, false, false];
        assert_eq!(absence_runs(&present), vec![(1, 2), (4, 1), (7, 3)]);
    }

    #[test]
    fn absence_runs_all_present_or_all_absent() {
        assert!(absence_runs(&[true, true]).is_empty());
        assert_eq!(absence_runs(&[false, false, false]), vec![(1, 3)]);
        assert!(absence_runs(&[]).is_empty());
    }
}
