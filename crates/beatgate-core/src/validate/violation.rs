//! Validation findings.
//!
//! [`Violation`] is a closed set: every variant has a stable [`ErrorCode`]
//! and the fix suggester matches on codes exhaustively.

use std::fmt;

use thiserror::Error;

use crate::board::CardRef;

/// One failed rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    // -- structure --------------------------------------------------------
    #[error("missing group {group:?}")]
    MissingGroup { group: String },

    #[error("group {group:?} is not a list of cards")]
    GroupNotList { group: String },

    #[error("board has {count} cards; expected between {min} and {max}")]
    UnitCountOutOfRange { count: usize, min: usize, max: usize },

    #[error("group {group:?} has {count} cards; minimum is {min}")]
    GroupUnderMinimum {
        group: String,
        count: usize,
        min: usize,
    },

    #[error(
        "final group {group:?} has {count} cards, fewer than the smallest other group ({smallest})"
    )]
    FinalGroupUnderpopulated {
        group: String,
        count: usize,
        smallest: usize,
    },

    // -- per card ---------------------------------------------------------
    #[error("{card} is not a JSON object")]
    UnitNotObject { card: CardRef },

    #[error("{card} is missing required field {field:?}")]
    MissingField { card: CardRef, field: String },

    #[error("{card} field {field:?} has the wrong type (expected {expected})")]
    InvalidFieldType {
        card: CardRef,
        field: String,
        expected: String,
    },

    #[error("{card} has invalid {field} marker {value:?} (expected \"+\" or \"-\")")]
    InvalidPolarity {
        card: CardRef,
        field: String,
        value: String,
    },

    #[error("{card} has no emotional change (starts and ends {polarity})")]
    NoEmotionalChange { card: CardRef, polarity: String },

    #[error("{card} heading {heading:?} is not of the form \"INT. PLACE - TIME\"")]
    InvalidHeading { card: CardRef, heading: String },

    #[error("{card} beat {beat:?} is not a canonical beat")]
    UnknownBeat { card: CardRef, beat: String },

    #[error("{card} description has {words} words; maximum is {max}")]
    DescriptionTooLong {
        card: CardRef,
        words: usize,
        max: usize,
    },

    #[error("{card} reuses card number {number}")]
    DuplicateCardNumber { card: CardRef, number: u64 },

    #[error("{card} storyline {value:?} is not one of {allowed}")]
    InvalidStoryline {
        card: CardRef,
        value: String,
        allowed: String,
    },

    // -- whole board ------------------------------------------------------
    #[error(
        "storyline {storyline} is absent for {run} consecutive cards from position {start}; maximum gap is {max}"
    )]
    PrimaryStorylineGap {
        storyline: char,
        start: usize,
        run: usize,
        max: usize,
    },

    #[error("landmarks {first:?} and {second:?} must end on opposite polarity (both end {polarity})")]
    LandmarkPolarityClash {
        first: String,
        second: String,
        polarity: String,
    },

    #[error("storyline {storyline} is used but never pays off in final group {group:?}")]
    MissingPayoff { storyline: char, group: String },

    #[error("landmark {landmark:?} is missing")]
    MissingLandmark { landmark: String },

    #[error("landmark {landmark:?} appears {count} times; expected exactly once")]
    DuplicateLandmark { landmark: String, count: usize },

    #[error("landmark {landmark:?} is at position {actual}; expected {expected} +/- {tolerance}")]
    LandmarkOutOfPosition {
        landmark: String,
        actual: usize,
        expected: usize,
        tolerance: usize,
    },

    // -- revision ---------------------------------------------------------
    #[error("revision requested: {reason}")]
    RevisionRequested { reason: String },
}

/// Stable identifier for each kind of [`Violation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorCode {
    MissingGroup,
    GroupNotList,
    UnitCountOutOfRange,
    GroupUnderMinimum,
    FinalGroupUnderpopulated,
    UnitNotObject,
    MissingField,
    InvalidFieldType,
    InvalidPolarity,
    NoEmotionalChange,
    InvalidHeading,
    UnknownBeat,
    DescriptionTooLong,
    DuplicateCardNumber,
    InvalidStoryline,
    PrimaryStorylineGap,
    LandmarkPolarityClash,
    MissingPayoff,
    MissingLandmark,
    DuplicateLandmark,
    LandmarkOutOfPosition,
    RevisionRequested,
}

impl ErrorCode {
    /// The wire form used in prompts and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingGroup => "missing_group",
            Self::GroupNotList => "group_not_list",
            Self::UnitCountOutOfRange => "unit_count_out_of_range",
            Self::GroupUnderMinimum => "group_under_minimum",
            Self::FinalGroupUnderpopulated => "final_group_underpopulated",
            Self::UnitNotObject => "unit_not_object",
            Self::MissingField => "missing_field",
            Self::InvalidFieldType => "invalid_field_type",
            Self::InvalidPolarity => "invalid_polarity",
            Self::NoEmotionalChange => "no_emotional_change",
            Self::InvalidHeading => "invalid_heading",
            Self::UnknownBeat => "unknown_beat",
            Self::DescriptionTooLong => "description_too_long",
            Self::DuplicateCardNumber => "duplicate_card_number",
            Self::InvalidStoryline => "invalid_storyline",
            Self::PrimaryStorylineGap => "primary_storyline_gap",
            Self::LandmarkPolarityClash => "landmark_polarity_clash",
            Self::MissingPayoff => "missing_payoff",
            Self::MissingLandmark => "missing_landmark",
            Self::DuplicateLandmark => "duplicate_landmark",
            Self::LandmarkOutOfPosition => "landmark_out_of_position",
            Self::RevisionRequested => "revision_requested",
        }
    }

    /// Whether the storyline repairer can clear this kind of violation.
    pub fn is_storyline(self) -> bool {
        matches!(
            self,
            Self::PrimaryStorylineGap | Self::MissingPayoff | Self::InvalidStoryline
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Violation {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingGroup { .. } => ErrorCode::MissingGroup,
            Self::GroupNotList { .. } => ErrorCode::GroupNotList,
            Self::UnitCountOutOfRange { .. } => ErrorCode::UnitCountOutOfRange,
            Self::GroupUnderMinimum { .. } => ErrorCode::GroupUnderMinimum,
            Self::FinalGroupUnderpopulated { .. } => ErrorCode::FinalGroupUnderpopulated,
            Self::UnitNotObject { .. } => ErrorCode::UnitNotObject,
            Self::MissingField { .. } => ErrorCode::MissingField,
            Self::InvalidFieldType { .. } => ErrorCode::InvalidFieldType,
            Self::InvalidPolarity { .. } => ErrorCode::InvalidPolarity,
            Self::NoEmotionalChange { .. } => ErrorCode::NoEmotionalChange,
            Self::InvalidHeading { .. } => ErrorCode::InvalidHeading,
            Self::UnknownBeat { .. } => ErrorCode::UnknownBeat,
            Self::DescriptionTooLong { .. } => ErrorCode::DescriptionTooLong,
            Self::DuplicateCardNumber { .. } => ErrorCode::DuplicateCardNumber,
            Self::InvalidStoryline { .. } => ErrorCode::InvalidStoryline,
            Self::PrimaryStorylineGap { .. } => ErrorCode::PrimaryStorylineGap,
            Self::LandmarkPolarityClash { .. } => ErrorCode::LandmarkPolarityClash,
            Self::MissingPayoff { .. } => ErrorCode::MissingPayoff,
            Self::MissingLandmark { .. } => ErrorCode::MissingLandmark,
            Self::DuplicateLandmark { .. } => ErrorCode::DuplicateLandmark,
            Self::LandmarkOutOfPosition { .. } => ErrorCode::LandmarkOutOfPosition,
            Self::RevisionRequested { .. } => ErrorCode::RevisionRequested,
        }
    }

    /// The card this violation is about, if it concerns a single card.
    pub fn card(&self) -> Option<&CardRef> {
        match self {
            Self::UnitNotObject { card }
            | Self::MissingField { card, .. }
            | Self::InvalidFieldType { card, .. }
            | Self::InvalidPolarity { card, .. }
            | Self::NoEmotionalChange { card, .. }
            | Self::InvalidHeading { card, .. }
            | Self::UnknownBeat { card, .. }
            | Self::DescriptionTooLong { card, .. }
            | Self::DuplicateCardNumber { card, .. }
            | Self::InvalidStoryline { card, .. } => Some(card),
            _ => None,
        }
    }

    /// `code: message`, the line format used in revision prompts.
    pub fn to_line(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}
