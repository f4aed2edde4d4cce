// ABOUTME: Port spec parsing for the "[[ip:]host:]container[/proto]" short form.
// ABOUTME: Builds the daemon's container-port to host-bindings map.

use std::collections::BTreeMap;

use serde::Serialize;

use super::ConfigError;

/// The host side of a port mapping, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HostBinding {
    /// `host:container` - a bare host port.
    Port(String),
    /// `ip:host:container` - an interface address and an optional host port.
    Address { ip: String, port: Option<String> },
}

/// One parsed port declaration: the container side plus an optional host side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortSpec {
    /// Container port, including a `/proto` suffix when one was given.
    pub container: String,
    pub host: Option<HostBinding>,
}

/// Parse `[[remote_ip:]remote_port:]port[/protocol]`.
pub fn split_port(port: &str) -> Result<PortSpec, ConfigError> {
    let parts: Vec<&str> = port.split(':').collect();
    match parts.as_slice() {
        [container] => Ok(PortSpec {
            container: (*container).to_string(),
            host: None,
        }),
        [host, container] => Ok(PortSpec {
            container: (*container).to_string(),
            host: Some(HostBinding::Port((*host).to_string())),
        }),
        [ip, host, container] => Ok(PortSpec {
            container: (*container).to_string(),
            host: Some(HostBinding::Address {
                ip: (*ip).to_string(),
                port: if host.is_empty() {
                    None
                } else {
                    Some((*host).to_string())
                },
            }),
        }),
        _ => Err(ConfigError::PortFormat(port.to_string())),
    }
}

/// Group parsed ports into the daemon's `port_bindings` shape:
/// container port to the list of host bindings published for it.
pub fn build_port_bindings(
    ports: &[String],
) -> Result<BTreeMap<String, Vec<Option<HostBinding>>>, ConfigError> {
    let mut bindings: BTreeMap<String, Vec<Option<HostBinding>>> = BTreeMap::new();
    for port in ports {
        let spec = split_port(port)?;
        bindings.entry(spec.container).or_default().push(spec.host);
    }
    Ok(bindings)
}
