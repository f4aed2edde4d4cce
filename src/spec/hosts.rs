// ABOUTME: Extra-hosts handling: a mapping, or a list of "host:ip" lines.
// ABOUTME: The list form collapses into a mapping, trimmed, repeated keys last-wins.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// The `extra_hosts` option as authored: either a mapping or a list of
/// `host:ip` lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExtraHosts {
    Map(BTreeMap<String, String>),
    List(Vec<String>),
}

impl ExtraHosts {
    /// Collapse into a host-to-ip mapping.
    pub fn to_map(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        match self {
            ExtraHosts::Map(map) => Ok(map.clone()),
            ExtraHosts::List(lines) => {
                let mut map = BTreeMap::new();
                for line in lines {
                    let (host, ip) = line
                        .split_once(':')
                        .ok_or_else(|| ConfigError::ExtraHostsFormat(line.clone()))?;
                    map.insert(host.trim().to_string(), ip.trim().to_string());
                }
                Ok(map)
            }
        }
    }
}
