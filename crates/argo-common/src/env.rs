//! Typed environment variable lookups
//!
//! Unset and empty variables fall back to the supplied default. A variable that
//! is set but does not parse is an error, so a typo in deployment config never
//! silently runs with defaults.

use std::str::FromStr;

use crate::error::{CommonError, Result};

/// Read a variable, treating an empty value as unset
pub fn opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Read a string variable or fall back to `default`
pub fn var_or(name: &str, default: &str) -> String {
    opt(name).unwrap_or_else(|| default.to_string())
}

/// Parse a variable into `T` or fall back to `default`
pub fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match opt(name) {
        Some(raw) => raw.trim().parse::<T>().map_err(|e| CommonError::InvalidEnv {
            var: name.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
        None => Ok(default),
    }
}
