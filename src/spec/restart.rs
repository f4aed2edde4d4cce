// ABOUTME: Restart policy parsing for the "name[:max_retry]" short form.
// ABOUTME: Produces the daemon's {Name, MaximumRetryCount} record.

use serde::Serialize;

use super::ConfigError;

/// A restart policy, in the shape the daemon's host config expects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartSpec {
    pub name: String,
    pub maximum_retry_count: u32,
}

/// Parse `name[:max_retry]`. `None` input means no policy.
pub fn parse_restart_spec(config: Option<&str>) -> Result<Option<RestartSpec>, ConfigError> {
    let Some(config) = config else {
        return Ok(None);
    };

    let parts: Vec<&str> = config.split(':').collect();
    if parts.len() > 2 {
        return Err(ConfigError::RestartFormat(config.to_string()));
    }

    let maximum_retry_count = match parts.get(1) {
        Some(count) => count
            .parse()
            .map_err(|_| ConfigError::RestartFormat(config.to_string()))?,
        None => 0,
    };

    Ok(Some(RestartSpec {
        name: parts[0].to_string(),
        maximum_retry_count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_policy_is_none() {
        assert_eq!(parse_restart_spec(None).expect("valid"), None);
    }

    #[test]
    fn bare_name_defaults_to_zero_retries() {
        let spec = parse_restart_spec(Some("always")).expect("valid").expect("some");
        assert_eq!(spec.name, "always");
        assert_eq!(spec.maximum_retry_count, 0);
    }

    #[test]
    fn retry_count_is_parsed() {
        let spec = parse_restart_spec(Some("on-failure:5"))
            .expect("valid")
            .expect("some");
        assert_eq!(spec.name, "on-failure");
        assert_eq!(spec.maximum_retry_count, 5);
    }

    #[test]
    fn too_many_parts_is_a_fault() {
        assert!(parse_restart_spec(Some("a:b:c")).is_err());
    }

    #[test]
    fn non_numeric_retry_count_is_a_fault() {
        assert!(parse_restart_spec(Some("on-failure:many")).is_err());
    }
}
