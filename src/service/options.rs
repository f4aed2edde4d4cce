// ABOUTME: The typed option record for a service declaration.
// ABOUTME: Every recognized option is a field; unknown keys are a config fault.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::spec::ExtraHosts;

/// An option that may be written as a single string or a list of strings
/// (`dns`, `dns_search`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl StringOrList {
    /// Normalize to a list; a single string becomes a one-element list.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            StringOrList::One(value) => vec![value.clone()],
            StringOrList::Many(values) => values.clone(),
        }
    }
}

/// The free-form option bag of a service declaration, as a closed record.
/// Deserialization rejects unknown keys, so a typo in a declaration surfaces
/// as a configuration fault instead of being silently forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceOptions {
    /// Repository reference to run. Mutually exclusive with `build`.
    pub image: Option<String>,
    /// Build context path. Mutually exclusive with `image`.
    pub build: Option<PathBuf>,
    /// Alternate Dockerfile inside the build context.
    pub dockerfile: Option<String>,

    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub environment: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,

    pub hostname: Option<String>,
    pub domainname: Option<String>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub detach: Option<bool>,
    pub stdin_open: bool,
    pub tty: bool,

    /// Published ports, in the `[[ip:]host:]container[/proto]` short form.
    pub ports: Vec<String>,
    /// Ports exposed without publishing.
    pub expose: Vec<String>,
    /// Volumes, in the `[external:]internal[:mode]` short form.
    pub volumes: Vec<String>,

    pub restart: Option<String>,
    pub dns: Option<StringOrList>,
    pub dns_search: Option<StringOrList>,
    pub cap_add: Vec<String>,
    pub cap_drop: Vec<String>,
    pub devices: Vec<String>,
    pub log_driver: Option<String>,
    pub pid: Option<String>,
    pub privileged: bool,
    pub read_only: bool,
    pub security_opt: Vec<String>,
    pub extra_hosts: Option<ExtraHosts>,

    pub mem_limit: Option<i64>,
    pub cpu_shares: Option<i64>,
}

impl ServiceOptions {
    /// The options as a canonical JSON value, for fingerprinting.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).expect("service options serialize to JSON")
    }
}

/// Merge two environments; entries in `overrides` win.
pub fn merge_environment(
    base: &BTreeMap<String, String>,
    overrides: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut merged = base.clone();
    for (key, value) in overrides {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

/// Per-call overrides layered on top of the declared options when creating a
/// single container (one-off runs). Any override suppresses the config-hash
/// label, since the container no longer matches the declaration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOverrides {
    pub command: Option<Vec<String>>,
    pub entrypoint: Option<Vec<String>>,
    pub environment: Option<BTreeMap<String, String>>,
    pub user: Option<String>,
    pub working_dir: Option<String>,
    pub detach: Option<bool>,
    pub tty: Option<bool>,
    pub stdin_open: Option<bool>,
    pub ports: Option<Vec<String>>,
}

impl CreateOverrides {
    pub fn is_empty(&self) -> bool {
        self == &CreateOverrides::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<ServiceOptions, _> =
            serde_yaml::from_str("image: nginx\nportz: ['80']\n");
        assert!(result.is_err());
    }

    #[test]
    fn dns_accepts_string_or_list() {
        let one: ServiceOptions = serde_yaml::from_str("dns: 8.8.8.8").expect("valid");
        assert_eq!(one.dns.expect("set").to_vec(), vec!["8.8.8.8"]);

        let many: ServiceOptions =
            serde_yaml::from_str("dns: [8.8.8.8, 9.9.9.9]").expect("valid");
        assert_eq!(many.dns.expect("set").to_vec(), vec!["8.8.8.8", "9.9.9.9"]);
    }

    #[test]
    fn environment_merge_prefers_overrides() {
        let base = BTreeMap::from([
            ("A".to_string(), "1".to_string()),
            ("B".to_string(), "2".to_string()),
        ]);
        let over = BTreeMap::from([("B".to_string(), "3".to_string())]);
        let merged = merge_environment(&base, &over);
        assert_eq!(merged["A"], "1");
        assert_eq!(merged["B"], "3");
    }

    #[test]
    fn environment_keys_may_contain_colons() {
        let mut env = BTreeMap::new();
        env.insert("affinity:container".to_string(), "=abc".to_string());
        let merged = merge_environment(&env, &BTreeMap::new());
        assert_eq!(merged["affinity:container"], "=abc");
    }

    #[test]
    fn to_json_is_deterministic() {
        let options: ServiceOptions =
            serde_yaml::from_str("image: nginx\nports: ['80']\n").expect("valid");
        assert_eq!(options.to_json(), options.clone().to_json());
    }

    #[test]
    fn default_overrides_are_empty() {
        assert!(CreateOverrides::default().is_empty());
        let with_cmd = CreateOverrides {
            command: Some(vec!["sh".to_string()]),
            ..Default::default()
        };
        assert!(!with_cmd.is_empty());
    }
}
