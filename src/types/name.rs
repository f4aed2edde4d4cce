// ABOUTME: Validated project and service names.
// ABOUTME: Both are restricted to alphanumeric characters, with no separators.

use std::fmt;

use crate::spec::ConfigError;

/// A project or service name.
///
/// Names appear in container names joined by underscores, so they are
/// restricted to `[A-Za-z0-9]+`. Anything else is a configuration fault.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name(String);

impl Name {
    pub fn new(kind: &'static str, value: &str) -> Result<Self, ConfigError> {
        if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ConfigError::InvalidName {
                kind,
                name: value.to_string(),
            });
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
