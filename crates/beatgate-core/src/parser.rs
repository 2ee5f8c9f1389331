//! Board extraction from free-form generator output.
//!
//! Generators wrap JSON in markdown fences, lead with chatter, or append
//! commentary. Three strategies are tried in order and the first accepted
//! result wins:
//!
//! 1. each fenced code block holding a JSON object, ```` ```json ```` fences
//!    first, then any other fence;
//! 2. the whole trimmed response, when it looks like a JSON object;
//! 3. the span from the first `{` to the last `}`.
//!
//! A parse is accepted only if it is an object with at least one known group
//! key, so an unrelated JSON fragment is never mistaken for a board. When
//! nothing is accepted the caller gets an empty skeleton and the validator
//! reports concrete violations instead of the pipeline crashing.

use serde_json::Value;

use crate::board::RawBoard;
use crate::rules::RuleSet;

/// Bytes of response text quoted in parse-failure logs.
const PREVIEW_BYTES: usize = 160;

/// Extract a board candidate. Never fails.
pub fn parse_board(response: &str, rules: &RuleSet) -> RawBoard {
    let strategies = [
        ("fenced_block", fenced_blocks(response)),
        ("whole_text", whole_text(response).into_iter().collect()),
        ("outer_braces", outer_braces(response).into_iter().collect()),
    ];

    for (name, candidates) in strategies {
        for candidate in candidates {
            if let Some(board) = accept(candidate, rules) {
                tracing::debug!(strategy = name, "parsed board candidate");
                return board;
            }
        }
    }

    tracing::warn!(
        response_length = response.len(),
        preview = %truncate_snippet(response, PREVIEW_BYTES),
        "no board found in generator output; using empty skeleton"
    );
    RawBoard::skeleton(rules)
}

/// Parse `candidate` and keep it only if it is an object naming a group.
fn accept(candidate: &str, rules: &RuleSet) -> Option<RawBoard> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) if rules.groups.iter().any(|g| map.contains_key(g)) => {
            Some(RawBoard::new(map))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "candidate is not valid JSON");
            None
        }
    }
}

/// Contents of every fenced block that contains a `{`, ```` ```json ````
/// fences before the others, each group in document order.
///
/// An unterminated fence (truncated response) runs to the end of the text.
/// A brace on the opening line starts the body.
fn fenced_blocks(response: &str) -> Vec<&str> {
    let mut tagged = Vec::new();
    let mut untagged = Vec::new();

    let mut rest = response;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let line_end = after.find('\n').unwrap_or(after.len());
        let opening = &after[..line_end];
        let (tag, body) = match opening.find('{') {
            Some(brace) => (opening[..brace].trim(), &after[brace..]),
            None => (opening.trim(), &after[line_end..]),
        };
        let (content, next) = match body.find("```") {
            Some(end) => (&body[..end], &body[end + 3..]),
            None => (body, ""),
        };
        let content = content.trim();
        if tag.eq_ignore_ascii_case("json") {
            tagged.push(content);
        } else if content.contains('{') {
            untagged.push(content);
        }
        rest = next;
    }

    tagged.extend(untagged);
    tagged
}

fn whole_text(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}')).then_some(trimmed)
}

fn outer_braces(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    (start < end).then(|| &response[start..=end])
}

/// Truncate a string to at most `max_bytes` bytes, appending "..." if
/// truncated.
pub(crate) fn truncate_snippet(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_owned();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = s[..end].to_owned();
    truncated.push_str("...");
    truncated
}
