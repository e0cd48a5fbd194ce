//! Executor limits, loaded from defaults or the environment.

use std::str::FromStr;

/// Most entities a single SET may touch for one variable.
pub const MAX_SET_BATCH: usize = 10;
/// Default cap on full-text search hits per lookup.
pub const DEFAULT_SEARCH_LIMIT: usize = 30;
/// Smaller cap used when ranking `=~` similarity candidates.
pub const SIMILAR_SEARCH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub max_set_batch: usize,
    pub search_limit: usize,
    pub similar_search_limit: usize,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_set_batch: MAX_SET_BATCH,
            search_limit: DEFAULT_SEARCH_LIMIT,
            similar_search_limit: SIMILAR_SEARCH_LIMIT,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {var}={value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl ExecutorConfig {
    /// Load from environment variables, falling back to the defaults:
    /// `THOUGHTQL_MAX_SET_BATCH`, `THOUGHTQL_SEARCH_LIMIT`,
    /// `THOUGHTQL_SIMILAR_SEARCH_LIMIT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Same as [`ExecutorConfig::from_env`] but reading from an arbitrary source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            max_set_batch: positive(&lookup, "THOUGHTQL_MAX_SET_BATCH", defaults.max_set_batch)?,
            search_limit: positive(&lookup, "THOUGHTQL_SEARCH_LIMIT", defaults.search_limit)?,
            similar_search_limit: positive(
                &lookup,
                "THOUGHTQL_SIMILAR_SEARCH_LIMIT",
                defaults.similar_search_limit,
            )?,
        })
    }

    pub fn with_max_set_batch(mut self, n: usize) -> Self {
        self.max_set_batch = n;
        self
    }

    pub fn with_search_limit(mut self, n: usize) -> Self {
        self.search_limit = n;
        self
    }

    pub fn with_similar_search_limit(mut self, n: usize) -> Self {
        self.similar_search_limit = n;
        self
    }
}

fn positive<F>(lookup: &F, var: &'static str, default: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(var) else {
        return Ok(default);
    };
    match usize::from_str(raw.trim()) {
        Ok(0) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "must be at least 1",
        }),
        Ok(n) => Ok(n),
        Err(_) => Err(ConfigError::Invalid {
            var,
            value: raw,
            reason: "not a positive integer",
        }),
    }
}
