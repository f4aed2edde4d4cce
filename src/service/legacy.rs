// ABOUTME: Detection of containers predating label-based identification.
// ABOUTME: Matches the old naming convention and warns; never mutates state.

use tracing::warn;

use crate::error::Result;
use crate::runtime::DaemonApi;

/// Called when a label query came back empty. Containers whose names follow
/// the old `<project>_<service>[_run]_<n>` convention are candidates that
/// predate labels; warn so the user can migrate them. Advisory only.
pub(crate) async fn check_for_legacy_containers(
    daemon: &dyn DaemonApi,
    project: &str,
    services: &[&str],
    stopped: bool,
    one_off: bool,
) -> Result<()> {
    for container in daemon.containers(stopped, None).await? {
        for service in services {
            let prefix = if one_off {
                format!("{project}_{service}_run_")
            } else {
                format!("{project}_{service}_")
            };

            if !container.name.starts_with(&prefix) {
                continue;
            }

            warn!(
                "Found a container named {} without any labels. Containers are now \
                 identified with labels instead of the naming convention. If you'd \
                 like this container to be picked up, run the label migration command.",
                container.name
            );
        }
    }

    Ok(())
}
