// ABOUTME: Parsers for the short string forms used in service declarations.
// ABOUTME: Volumes, ports, restart policies, extra hosts and repository:tag.

mod hosts;
mod port;
mod repository;
mod restart;
mod volume;

pub use hosts::ExtraHosts;
pub use port::{HostBinding, PortSpec, build_port_bindings, split_port};
pub use repository::split_repository_tag;
pub use restart::{RestartSpec, parse_restart_spec};
pub use volume::{VolumeSpec, parse_volume_spec};

use thiserror::Error;

/// Faults in a service declaration. Surfaced to the caller, never retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {kind} name \"{name}\" - only [a-zA-Z0-9] are allowed")]
    InvalidName { kind: &'static str, name: String },

    #[error(
        "service {0} has both an image and a build path specified - \
         a service can either be built or use an existing image, not both"
    )]
    ImageAndBuild(String),

    #[error("service {0} has neither an image nor a build path specified - exactly one must be provided")]
    NeitherImageNorBuild(String),

    #[error("volume {0} has incorrect format, should be external:internal[:mode]")]
    VolumeFormat(String),

    #[error("volume {spec} has invalid mode ({mode}), should be one of: rw, ro")]
    VolumeMode { spec: String, mode: String },

    #[error("invalid port \"{0}\", should be [[remote_ip:]remote_port:]port[/protocol]")]
    PortFormat(String),

    #[error("restart {0} has incorrect format, should be mode[:max_retry]")]
    RestartFormat(String),

    #[error("extra_hosts entry \"{0}\" must be of the form host:ip")]
    ExtraHostsFormat(String),

    #[error("linked service {0} is no longer reachable")]
    DanglingReference(String),
}
