//! Markdown rendering of a stored artifact.

use crate::board::SceneCard;
use crate::provenance::Artifact;

/// Human-readable view of the primary document. Regenerated on every write;
/// never parsed back.
pub fn render_markdown(artifact: &Artifact) -> String {
    let meta = &artifact.metadata;
    let mut out = String::with_capacity(8192);

    out.push_str(&format!("# {} ({})\n\n", meta.stage_name, meta.project_id));
    out.push_str(&format!("- **Version:** {}\n", meta.version));
    if let Some(prev) = meta.previous_version {
        out.push_str(&format!("- **Revised from:** {prev}\n"));
    }
    out.push_str(&format!("- **Created:** {}\n", meta.created_at.to_rfc3339()));
    out.push_str(&format!(
        "- **Model:** {} (temperature {})\n",
        meta.model_id, meta.temperature
    ));
    out.push_str(&format!("- **Attempts:** {}\n", meta.attempts));
    out.push_str(&format!("- **Validator:** {}\n", meta.validator_version));
    out.push_str(&format!("- **Cards:** {}\n\n", artifact.board.card_count()));

    for group in &artifact.board.groups {
        out.push_str(&format!("## {}\n\n", group_title(&group.key)));
        out.push_str("| # | Heading | Beat | Line | Charge | Description | Conflict | Characters |\n");
        out.push_str("|---|---|---|---|---|---|---|---|\n");
        for card in &group.cards {
            out.push_str(&card_row(card));
        }
        out.push('\n');
    }
    out
}

fn card_row(card: &SceneCard) -> String {
    format!(
        "| {} | {} | {} | {} | {} -> {} | {} | {} | {} |\n",
        card.card_number,
        cell(&card.heading),
        cell(&card.beat),
        card.storyline,
        card.emotional_start,
        card.emotional_end,
        cell(&card.description),
        cell(&card.conflict),
        cell(&card.characters.join(", ")),
    )
}

/// `act_two_a` -> `Act Two A`.
fn group_title(key: &str) -> String {
    key.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Keep table cells on one line and escape column separators.
fn cell(text: &str) -> String {
    text.replace('|', "\\|").replace(['\n', '\r'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_titles() {
        assert_eq!(group_title("act_one"), "Act One");
        assert_eq!(group_title("act_two_a"), "Act Two A");
    }

    #[test]
    fn cells_escape_pipes_and_newlines() {
        assert_eq!(cell("a|b\nc"), "a\\|b c");
    }
}
