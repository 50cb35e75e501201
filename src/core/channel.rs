//! Channel identifier validation

use regex::Regex;

use crate::error::{RelayError, Result};

/// Validates channel identifiers: alphanumerics, underscore and hyphen
/// segments separated by single colons, ending on a word character
pub struct ChannelValidator {
    channel_regex: Regex,
}

impl ChannelValidator {
    pub fn new() -> Self {
        Self {
            // (?-u) keeps \w ASCII-only; channel ids are opaque ASCII
            channel_regex: Regex::new(r"(?-u)^([\w-]+:?)*\w$").expect("channel regex must compile"),
        }
    }

    pub fn validate(&self, channel: &str) -> Result<()> {
        if !self.channel_regex.is_match(channel) {
            return Err(RelayError::invalid_argument("invalid channel"));
        }

        Ok(())
    }
}

impl Default for ChannelValidator {
    fn default() -> Self {
        Self::new()
    }
}
