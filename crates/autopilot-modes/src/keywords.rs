//! Keyword filtering for content selection.

use regex::{Regex, RegexBuilder};

use crate::error::ModeError;

/// Case-insensitive substring keyword matcher.
///
/// Avoid keywords win over target keywords. An empty target list matches
/// everything that is not avoided.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    target: Option<Regex>,
    avoid: Option<Regex>,
}

fn compile(keywords: &[String]) -> Result<Option<Regex>, ModeError> {
    let alternatives: Vec<String> = keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(regex::escape)
        .collect();
    if alternatives.is_empty() {
        return Ok(None);
    }
    RegexBuilder::new(&alternatives.join("|"))
        .case_insensitive(true)
        .build()
        .map(Some)
        .map_err(|e| ModeError::InvalidConfig(format!("Invalid keyword list: {}", e)))
}

impl KeywordFilter {
    pub fn new(target: &[String], avoid: &[String]) -> Result<Self, ModeError> {
        Ok(Self {
            target: compile(target)?,
            avoid: compile(avoid)?,
        })
    }

    /// A filter that accepts everything.
    pub fn accept_all() -> Self {
        Self {
            target: None,
            avoid: None,
        }
    }

    pub fn is_avoided(&self, text: &str) -> bool {
        self.avoid.as_ref().is_some_and(|re| re.is_match(text))
    }

    pub fn is_targeted(&self, text: &str) -> bool {
        self.target.as_ref().map_or(true, |re| re.is_match(text))
    }

    /// Whether `text` should be engaged with.
    pub fn matches(&self, text: &str) -> bool {
        !self.is_avoided(text) && self.is_targeted(text)
    }

    /// Distinct target keywords found in `text`, lowercased.
    pub fn matched_targets(&self, text: &str) -> Vec<String> {
        let Some(re) = &self.target else {
            return Vec::new();
        };
        let mut found: Vec<String> = re
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();
        found.sort();
        found.dedup();
        found
    }
}
