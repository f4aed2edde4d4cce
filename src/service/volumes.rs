// ABOUTME: Data-volume carry-over when a container is replaced.
// ABOUTME: Host paths of anonymous volumes migrate from the old container.

use std::collections::BTreeSet;

use crate::container::Container;
use crate::spec::{VolumeSpec, parse_volume_spec};

/// Find the old container's data volumes that the new declaration (or the
/// image itself) also wants, and fill in their host paths so the replacement
/// reuses the same data.
///
/// Volumes with an explicit external side are never migrated; those host
/// paths are declared, not inherited.
pub(crate) fn container_data_volumes(
    container: &Container,
    image_volumes: &[String],
    declared: &[VolumeSpec],
) -> Vec<VolumeSpec> {
    let mut candidates: BTreeSet<String> = image_volumes.iter().cloned().collect();
    for spec in declared {
        if spec.external.is_none() {
            candidates.insert(spec.internal.clone());
        }
    }

    // Declared host bindings win over anything the old container had.
    for spec in declared {
        if spec.external.is_some() {
            candidates.remove(&spec.internal);
        }
    }

    candidates
        .into_iter()
        .filter_map(|internal| {
            let host_path = container.volumes.get(&internal)?;
            Some(VolumeSpec {
                external: Some(host_path.clone()),
                internal,
                mode: "rw".to_string(),
            })
        })
        .collect()
}

/// The bind list for a new container: declared host bindings plus carry-over
/// from the container being replaced.
pub(crate) fn merge_volume_bindings(
    declared: &[VolumeSpec],
    previous: Option<(&Container, &[String])>,
) -> Vec<String> {
    let mut binds: Vec<String> = declared.iter().filter_map(VolumeSpec::to_bind).collect();

    if let Some((container, image_volumes)) = previous {
        for spec in container_data_volumes(container, image_volumes, declared) {
            if let Some(bind) = spec.to_bind() {
                binds.push(bind);
            }
        }
    }

    binds
}

/// Parse every declared volume string, faulting on the first malformed one.
pub(crate) fn parse_declared_volumes(
    volumes: &[String],
) -> Result<Vec<VolumeSpec>, crate::spec::ConfigError> {
    volumes.iter().map(|v| parse_volume_spec(v)).collect()
}
