use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::str::FromStr;
use tracing::debug;

/// Which side of a lookup is treated as the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchDirection {
    /// The user's message is compiled as a case-insensitive regex and tested
    /// against the stored field. This is the historical behaviour; it is
    /// likely inverted, since long questions never match short stored titles.
    Pattern,
    /// The stored field must appear, case-insensitively, inside the message.
    Contains,
    /// Every word of the stored field must appear among the message's words,
    /// in any order. "timetable for semester 3" finds "Semester 3 Timetable".
    Keywords,
    /// `Pattern` first, then `Keywords`.
    Either,
}

impl FromStr for MatchDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pattern" => Ok(MatchDirection::Pattern),
            "contains" => Ok(MatchDirection::Contains),
            "keywords" => Ok(MatchDirection::Keywords),
            "either" => Ok(MatchDirection::Either),
            other => Err(format!(
                "expected `either`, `pattern`, `contains` or `keywords`, got `{other}`"
            )),
        }
    }
}

/// A compiled lookup for one user message.
#[derive(Debug, Clone)]
pub enum TextMatcher {
    /// Message compiled as a regex, tested against the stored field.
    Pattern(Regex),
    /// Lowercased message that must occur verbatim in the stored field.
    Literal(String),
    /// Lowercased message that must contain the stored field.
    Contains(String),
    /// Lowercased words of the message; the field's words must be a subset.
    Keywords(HashSet<String>),
    /// Matches when any inner matcher does.
    Any(Vec<TextMatcher>),
}

impl TextMatcher {
    pub fn new(message: &str, direction: MatchDirection) -> Self {
        match direction {
            MatchDirection::Pattern => RegexBuilder::new(message)
                .case_insensitive(true)
                .build()
                .map(TextMatcher::Pattern)
                .unwrap_or_else(|e| {
                    // e.g. "c++ syllabus?"
                    debug!("Message is not a valid pattern, matching literally: {e}");
                    TextMatcher::Literal(message.to_lowercase())
                }),
            MatchDirection::Contains => TextMatcher::Contains(message.to_lowercase()),
            MatchDirection::Keywords => TextMatcher::Keywords(words(message).collect()),
            MatchDirection::Either => TextMatcher::Any(vec![
                Self::new(message, MatchDirection::Pattern),
                Self::new(message, MatchDirection::Keywords),
            ]),
        }
    }

    pub fn is_match(&self, field: &str) -> bool {
        match self {
            TextMatcher::Pattern(regex) => regex.is_match(field),
            TextMatcher::Literal(message) => field.to_lowercase().contains(message.as_str()),
            TextMatcher::Contains(message) => {
                let field = field.trim().to_lowercase();
                !field.is_empty() && message.contains(&field)
            }
            TextMatcher::Keywords(message) => {
                let mut field_words = words(field).peekable();
                field_words.peek().is_some() && field_words.all(|w| message.contains(&w))
            }
            TextMatcher::Any(matchers) => matchers.iter().any(|m| m.is_match(field)),
        }
    }
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}
