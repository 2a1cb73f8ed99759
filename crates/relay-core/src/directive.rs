//! Inline directive extraction: thinking-level and verbosity tokens, abort
//! words, and session-reset triggers embedded in an inbound body.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Directive, ThinkLevel, VerboseLevel};

const ABORT_WORDS: &[&str] = &["stop", "esc", "abort", "wait", "exit"];

// Matches any alphabetic value after the directive prefix, not just the
// recognised levels, so an attempt with a bogus value (e.g. `/think:ultra`)
// is still detected — and stripped — rather than falling through as prose.
// The value is validated against `ThinkLevel`/`VerboseLevel` afterwards.
static THINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(t|think|thinking)(:|\s+)([A-Za-z]+)\b")
        .expect("static THINK_RE is a valid pattern")
});

static VERBOSE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)/(v|verbose)(:|\s+)([A-Za-z]+)\b")
        .expect("static VERBOSE_RE is a valid pattern")
});

/// Parses directives out of a raw inbound body. `reset_triggers` is the
/// configured set of session-reset phrases (§6 `inbound.reply.session.*`).
pub fn parse(body: &str, reset_triggers: &[String]) -> Directive {
    let trimmed = body.trim();

    let abort_requested = ABORT_WORDS.iter().any(|w| trimmed.eq_ignore_ascii_case(w));

    // Last match wins for each token kind. An attempt with an unrecognised
    // value is kept around separately so the reply engine can hint at the
    // valid set instead of silently treating the message as prose.
    let last_think = THINK_RE.captures_iter(body).last().map(|c| c[3].to_string());
    let think = last_think.as_deref().and_then(ThinkLevel::parse);
    let think_unknown = match (&last_think, think) {
        (Some(token), None) => Some(token.clone()),
        _ => None,
    };

    let last_verbose = VERBOSE_RE.captures_iter(body).last().map(|c| c[3].to_string());
    let verbose = last_verbose.as_deref().and_then(VerboseLevel::parse);
    let verbose_unknown = match (&last_verbose, verbose) {
        (Some(token), None) => Some(token.clone()),
        _ => None,
    };

    let reset_requested = reset_triggers.iter().any(|trigger| {
        trimmed.eq_ignore_ascii_case(trigger)
            || trimmed
                .get(..trigger.len())
                .map(|prefix| {
                    prefix.eq_ignore_ascii_case(trigger)
                        && trimmed[trigger.len()..].starts_with(' ')
                })
                .unwrap_or(false)
    });

    let mut stripped_body = THINK_RE.replace_all(body, "").to_string();
    stripped_body = VERBOSE_RE.replace_all(&stripped_body, "").to_string();
    stripped_body = collapse_whitespace(stripped_body.trim());

    let has_directive =
        think.is_some() || verbose.is_some() || think_unknown.is_some() || verbose_unknown.is_some();
    let directive_only = has_directive && stripped_body.is_empty();

    Directive {
        think,
        verbose,
        think_unknown,
        verbose_unknown,
        reset_requested,
        abort_requested,
        directive_only,
        stripped_body,
    }
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
