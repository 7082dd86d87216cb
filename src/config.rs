//! Engine configuration.

use crate::constraint::MatchType;
use log::warn;
use serde::{Deserialize, Serialize};

/// Environment variable overriding [`EngineConfig::max_recursive_rounds`]
pub const MAX_RECURSION_ENV: &str = "VIBECORE_MAX_RECURSION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Rounds a recursive query may run before `RecursionLimitExceeded`
    pub max_recursive_rounds: usize,
    /// Record a warning when an aggregate skips NULL inputs
    pub null_elimination_warnings: bool,
    /// Match type of foreign keys declared without MATCH
    pub default_match_type: MatchType,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_recursive_rounds: 1024,
            null_elimination_warnings: true,
            default_match_type: MatchType::Simple,
        }
    }
}

impl EngineConfig {
    /// Defaults overlaid with environment overrides
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(text) = std::env::var(MAX_RECURSION_ENV) {
            match text.trim().parse::<usize>() {
                Ok(rounds) => config.max_recursive_rounds = rounds,
                Err(_) => warn!("ignoring invalid {}={:?}", MAX_RECURSION_ENV, text),
            }
        }
        config
    }

    pub fn with_max_recursive_rounds(mut self, rounds: usize) -> Self {
        self.max_recursive_rounds = rounds;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.max_recursive_rounds, 1024);
        assert!(config.null_elimination_warnings);
        assert_eq!(config.default_match_type, MatchType::Simple);
        assert_eq!(
            config.with_max_recursive_rounds(8).max_recursive_rounds,
            8
        );
    }
}
