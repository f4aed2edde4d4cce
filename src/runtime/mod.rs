// ABOUTME: Runtime layer: the daemon API the engine consumes.
// ABOUTME: Trait + payload records in api, bollard-backed implementation in bollard.

mod api;
mod bollard;

pub use api::{
    ApiError, BuildRequest, CreateOptions, DaemonApi, EventStream, ExposedPort, HostConfigSpec,
    ImageRecord, LogConfigSpec,
};
pub use bollard::BollardDaemon;
