//! Where did a parameter value come from?

use std::collections::HashMap;

/// Source label of caller parameters before any configuration pass
pub const SOURCE_CALLER_DEFAULT: &str = "EsoRex default";
/// Source label of recipe parameters right after `init`
pub const SOURCE_RECIPE_DEFAULT: &str = "recipe default";
/// Source label of values given as command line options
pub const SOURCE_COMMAND_LINE: &str = "command line";

/// Source label of a value read from the environment variable `var`
pub fn env_source(var: &str) -> String {
    format!("environment variable '{var}'")
}

/// Side table mapping parameter names to the source of their current value.
///
/// Purely diagnostic, printed by `--params` at debug level.
#[derive(Debug, Clone, Default)]
pub struct SourceAnnotations {
    sources: HashMap<String, String>,
}

impl SourceAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: &str, source: impl Into<String>) {
        self.sources.insert(name.to_string(), source.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.sources.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_source_wins() {
        let mut sources = SourceAnnotations::new();
        sources.record("esorex.caller.log-level", SOURCE_CALLER_DEFAULT);
        sources.record("esorex.caller.log-level", env_source("ESOREX_LOG_LEVEL"));
        assert_eq!(
            sources.get("esorex.caller.log-level"),
            Some("environment variable 'ESOREX_LOG_LEVEL'")
        );
        assert_eq!(sources.len(), 1);
        assert_eq!(sources.get("other"), None);
    }
}
