//! Party Code Parsing and Display
//!
//! A party is joined through the host's peer id. The full id is what gets
//! shared; a shortened form is shown in the UI.

use std::fmt;

/// Number of trailing characters shown in the short form
const SHORT_LENGTH: usize = 6;

/// Longest id we accept from user input
const MAX_LENGTH: usize = 64;

/// A party code that can be shared to join a party
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartyCode(String);

impl PartyCode {
    /// The code for a party hosted by `peer_id`
    pub fn from_peer_id(peer_id: &str) -> Self {
        PartyCode(peer_id.to_string())
    }

    /// Get the full code as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse a party code from user input
    ///
    /// Surrounding whitespace is ignored; peer ids consist of ASCII
    /// alphanumerics, `-` and `_`.
    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();

        if trimmed.is_empty() || trimmed.len() > MAX_LENGTH {
            return None;
        }

        if trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            Some(PartyCode(trimmed.to_string()))
        } else {
            None
        }
    }

    /// Shortened form for display, e.g. `...a1b2c3`
    pub fn short(&self) -> String {
        let start = self
            .0
            .char_indices()
            .rev()
            .nth(SHORT_LENGTH - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        format!("...{}", &self.0[start..])
    }
}

impl fmt::Display for PartyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short())
    }
}
