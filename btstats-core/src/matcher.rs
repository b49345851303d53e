//! Emote pattern matching over chat text
//!
//! Chat emotes are written as markdown-style links: `[label](/name-flags trailing)`.
//! [`find_all`] scans a message left to right and yields every non-overlapping
//! match with its four capture segments.

use crate::value::{Document, Value};
use regex::Regex;
use std::sync::LazyLock;

/// Emote syntax from the Berrymotes client.
///
/// Word characters are ASCII only (`[[:word:]]`): a non-ASCII letter ends the
/// name and falls into the trailing segment. The classes hold both cases, so
/// matching is case-insensitive without a flag.
pub const EMOTE_PATTERN: &str = r"\[([^\]]*)\]\(/([[:word:]:!#/]+)([-[:word:]!]*)([^)]*)\)";

static EMOTE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(EMOTE_PATTERN).expect("hardcoded regex"));

/// Capture index of the emote name.
pub const NAME_CAPTURE: usize = 1;

/// One emote occurrence inside a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternMatch<'t> {
    /// Whole matched span
    pub text: &'t str,
    /// Byte offset of the span in the input
    pub start: usize,
    /// Marker label, name, flags, trailing arguments. Missing groups are `""`.
    pub captures: [&'t str; 4],
}

impl<'t> PatternMatch<'t> {
    pub fn marker(&self) -> &'t str {
        self.captures[0]
    }

    pub fn name(&self) -> &'t str {
        self.captures[NAME_CAPTURE]
    }

    pub fn flags(&self) -> &'t str {
        self.captures[2]
    }

    pub fn trailing(&self) -> &'t str {
        self.captures[3]
    }

    /// Document form used inside pipelines: `{match, idx, captures}`.
    pub fn to_document(&self) -> Document {
        Document::new()
            .with("match", self.text)
            .with("idx", self.start as i64)
            .with(
                "captures",
                Value::Array(self.captures.iter().map(|c| Value::from(*c)).collect()),
            )
    }
}

/// Lazy sequence of matches over one input.
pub struct Matches<'t> {
    inner: regex::CaptureMatches<'static, 't>,
}

impl<'t> Iterator for Matches<'t> {
    type Item = PatternMatch<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let caps = self.inner.next()?;
        let whole = caps.get(0)?;
        let captures = [1, 2, 3, 4].map(|i| caps.get(i).map_or("", |m| m.as_str()));
        Some(PatternMatch {
            text: whole.as_str(),
            start: whole.start(),
            captures,
        })
    }
}

/// Scan `text` for emotes. Calling again restarts from the beginning.
pub fn find_all(text: &str) -> Matches<'_> {
    Matches {
        inner: EMOTE_REGEX.captures_iter(text),
    }
}

/// Number of emotes in `text`.
pub fn count(text: &str) -> usize {
    find_all(text).count()
}
