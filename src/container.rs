// ABOUTME: Snapshot handle for a container known to the daemon.
// ABOUTME: Exposes identity, labels, liveness and the data-volume map.

use std::collections::HashMap;

use crate::labels::LABEL_CONTAINER_NUMBER;
use crate::types::ContainerId;

/// A point-in-time view of one container, built from the daemon's listing.
/// The engine never caches these across operations; each pass re-reads
/// observed reality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Container {
    pub id: ContainerId,
    /// Name without the daemon's leading slash.
    pub name: String,
    /// Image reference (or id) the container was created from.
    pub image: String,
    pub running: bool,
    pub labels: HashMap<String, String>,
    /// Mounted data volumes, internal path to host path.
    pub volumes: HashMap<String, String>,
}

impl Container {
    /// First 12 characters of the id.
    pub fn short_id(&self) -> &str {
        self.id.short()
    }

    /// The name with the `<project>_` prefix stripped.
    pub fn name_without_project(&self) -> &str {
        self.name
            .split_once('_')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.name)
    }

    /// The container number, parsed from its label. Absent on containers the
    /// engine does not own.
    pub fn number(&self) -> Option<u32> {
        self.labels
            .get(LABEL_CONTAINER_NUMBER)
            .and_then(|n| n.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str, labels: &[(&str, &str)]) -> Container {
        Container {
            id: ContainerId::new("0123456789abcdef"),
            name: name.to_string(),
            image: "nginx".to_string(),
            running: true,
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            volumes: HashMap::new(),
        }
    }

    #[test]
    fn name_without_project_strips_first_segment() {
        let c = container("myapp_web_1", &[]);
        assert_eq!(c.name_without_project(), "web_1");
    }

    #[test]
    fn number_comes_from_the_label() {
        let c = container("myapp_web_3", &[(LABEL_CONTAINER_NUMBER, "3")]);
        assert_eq!(c.number(), Some(3));
    }

    #[test]
    fn missing_or_garbled_number_is_none() {
        assert_eq!(container("x", &[]).number(), None);
        assert_eq!(container("x", &[(LABEL_CONTAINER_NUMBER, "n/a")]).number(), None);
    }

    #[test]
    fn short_id_is_twelve_chars() {
        assert_eq!(container("x", &[]).short_id(), "0123456789ab");
    }
}
