//! Per-process allow/deny decision from the whitelist and blacklist

use crate::config::Config;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Allowed,
    Blacklisted,
    NotWhitelisted,
}

impl FilterDecision {
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

/// Blacklist is checked first and always wins over the whitelist
pub fn evaluate(process_name: &str, config: &Config) -> FilterDecision {
    if config.process_blacklist.iter().any(|p| p == process_name) {
        return FilterDecision::Blacklisted;
    }
    if !config.process_whitelist.is_empty()
        && !config.process_whitelist.iter().any(|p| p == process_name)
    {
        return FilterDecision::NotWhitelisted;
    }
    FilterDecision::Allowed
}

pub fn is_allowed(process_name: &str, config: &Config) -> bool {
    evaluate(process_name, config).is_allowed()
}
