//! Typed access to environment-style configuration.
//!
//! Both binaries read their settings from environment variables (after
//! `dotenvy` has loaded any `.env` file). [`EnvLookup`] wraps the lookup
//! function so config loaders can be exercised in tests with a plain map
//! instead of mutating the process environment.

use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{var}={value:?} is invalid: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Wrapper around a `name -> value` lookup. Blank values count as unset.
pub struct EnvLookup<F>(F);

impl<F> EnvLookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    pub fn new(lookup: F) -> Self {
        Self(lookup)
    }

    pub fn get(&self, var: &str) -> Option<String> {
        (self.0)(var).filter(|v| !v.trim().is_empty())
    }

    pub fn string(&self, var: &str, default: &str) -> String {
        self.get(var).unwrap_or_else(|| default.to_string())
    }

    pub fn required(&self, var: &'static str) -> Result<String, ConfigError> {
        self.get(var).ok_or(ConfigError::Missing(var))
    }

    pub fn optional<T>(&self, var: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(var)
            .map(|value| {
                value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                    var,
                    value: value.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    pub fn parsed<T>(&self, var: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        Ok(self.optional(var)?.unwrap_or(default))
    }

    /// Whole seconds as a [`Duration`].
    pub fn secs(&self, var: &'static str, default: Duration) -> Result<Duration, ConfigError> {
        Ok(self
            .optional::<u64>(var)?
            .map(Duration::from_secs)
            .unwrap_or(default))
    }

    pub fn optional_secs(&self, var: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.optional::<u64>(var)?.map(Duration::from_secs))
    }
}
