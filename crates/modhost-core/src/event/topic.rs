use std::fmt;

use regex::Regex;

use crate::event::error::EventSystemError;

/// Wildcard marker inside a subscription topic
pub const WILDCARD: char = '*';

/// Returns true when `topic` must be matched by pattern rather than exact key.
pub fn is_wildcard(topic: &str) -> bool {
    topic.contains(WILDCARD)
}

/// A compiled wildcard subscription pattern.
///
/// The pattern is escaped, each `*` becomes a run of one or more characters,
/// and the result is anchored at both ends. `user.*` therefore matches
/// `user.created` and `user.created.v2` but neither `user.` nor `order.created`.
#[derive(Clone)]
pub struct TopicPattern {
    raw: String,
    regex: Regex,
}

impl TopicPattern {
    pub fn new(pattern: &str) -> Result<Self, EventSystemError> {
        let body = pattern
            .split(WILDCARD)
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".+");
        let regex = Regex::new(&format!("^{}$", body)).map_err(|e| {
            EventSystemError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            raw: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, topic: &str) -> bool {
        self.regex.is_match(topic)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Debug for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TopicPattern").field(&self.raw).finish()
    }
}

impl PartialEq for TopicPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}
