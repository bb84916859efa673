//! Display-label synthesis for tree nodes.
//!
//! Non-label nodes get a short human-readable summary of the lines they
//! cover so the tree can be shown without loading node content. Dialogue
//! lines are preferred when a range is long; very short results fall back to
//! the full range.

use crate::ast::NodeKind;
use crate::classifier;

/// Labels longer than this are cut and suffixed with `...`.
const MAX_LABEL_CHARS: usize = 100;

/// Below this length a summary is too terse to be useful and the whole range
/// is used instead.
const MIN_USEFUL_CHARS: usize = 20;

/// Lines per range above which the summary heuristics kick in.
const FULL_JOIN_MAX_LINES: usize = 4;

/// Synthesize the display label for a node covering
/// `lines[start_line..=end_line]`.
///
/// Out-of-range bounds yield an empty label rather than failing.
pub fn synthesize(lines: &[String], kind: NodeKind, start_line: usize, end_line: usize) -> String {
    if start_line >= lines.len() || end_line >= lines.len() || end_line < start_line {
        return String::new();
    }

    let first = lines[start_line].trim();
    let mut text = if classifier::is_statement(first) && first.ends_with(':') {
        // The node opens with its own declaration; that line is the label.
        first[..first.len() - 1].trim_end().to_string()
    } else {
        let total = end_line - start_line + 1;
        let mut text = if total <= FULL_JOIN_MAX_LINES {
            join_non_blank(lines, start_line, end_line)
        } else {
            summarize(lines, start_line, end_line)
        };
        if text.chars().count() < MIN_USEFUL_CHARS {
            text = join_non_blank(lines, start_line, end_line);
        }
        text
    };

    // Condition and choice text stays verbatim; everything else loses inline
    // {...} markup.
    if !matches!(kind, NodeKind::IfBlock | NodeKind::MenuOption) {
        text = strip_markup(&text);
    }

    truncate(text)
}

fn non_blank_lines(lines: &[String], start_line: usize, end_line: usize) -> Vec<(usize, &str)> {
    (start_line..=end_line)
        .filter_map(|i| {
            let text = lines[i].trim();
            (!text.is_empty()).then_some((i, text))
        })
        .collect()
}

fn join_non_blank(lines: &[String], start_line: usize, end_line: usize) -> String {
    non_blank_lines(lines, start_line, end_line)
        .iter()
        .map(|(_, text)| *text)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Summary for long ranges: up to two leading and two trailing
/// dialogue-shaped lines, with a `<...>` marker when lines were skipped
/// between the groups. Ranges without dialogue fall back to the first and
/// last three non-blank lines.
fn summarize(lines: &[String], start_line: usize, end_line: usize) -> String {
    let non_blank = non_blank_lines(lines, start_line, end_line);
    let dialogue: Vec<(usize, &str)> = non_blank
        .iter()
        .copied()
        .filter(|(_, text)| is_dialogue_line(text))
        .collect();

    let mut parts: Vec<&str> = Vec::new();
    if !dialogue.is_empty() {
        let lead_count = dialogue.len().min(2);
        let trail_start = dialogue.len().saturating_sub(2).max(lead_count);
        let lead = &dialogue[..lead_count];
        let trail = &dialogue[trail_start..];

        parts.extend(lead.iter().map(|(_, text)| *text));
        if let (Some((last_lead, _)), Some((first_trail, _))) = (lead.last(), trail.first()) {
            if *first_trail > last_lead + 1 {
                parts.push("<...>");
            }
        }
        parts.extend(trail.iter().map(|(_, text)| *text));
    } else if non_blank.len() <= 6 {
        parts.extend(non_blank.iter().map(|(_, text)| *text));
    } else {
        parts.extend(non_blank[..3].iter().map(|(_, text)| *text));
        parts.push("<...>");
        parts.extend(non_blank[non_blank.len() - 3..].iter().map(|(_, text)| *text));
    }

    parts.join("\n")
}

/// A dialogue-shaped line: quoted text, optionally prefixed by a speaker.
fn is_dialogue_line(line: &str) -> bool {
    let quoted = if line.starts_with('"') {
        line
    } else {
        match line.split_once(char::is_whitespace) {
            Some((speaker, rest)) if !speaker.is_empty() => rest.trim_start(),
            _ => return false,
        }
    };
    quoted.len() >= 2 && quoted.starts_with('"') && quoted.ends_with('"')
}

/// Removes `{...}` spans, braces included. An unterminated `{` keeps the
/// remainder verbatim.
fn strip_markup(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        match rest[open..].find('}') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn truncate(text: String) -> String {
    if text.chars().count() > MAX_LABEL_CHARS {
        let cut: String = text.chars().take(MAX_LABEL_CHARS).collect();
        format!("{}...", cut)
    } else {
        text
    }
}
