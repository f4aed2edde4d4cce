// ABOUTME: Standard label keys, container naming and numbering helpers.
// ABOUTME: Labels are how the engine re-discovers its containers after restarts.

use std::collections::BTreeMap;

/// Label keys stamped on every engine-owned container. The exact strings are
/// shared with the wider toolchain; the engine only needs them stable and
/// distinct.
pub const LABEL_PROJECT: &str = "com.docker.compose.project";
pub const LABEL_SERVICE: &str = "com.docker.compose.service";
pub const LABEL_ONE_OFF: &str = "com.docker.compose.oneoff";
pub const LABEL_CONTAINER_NUMBER: &str = "com.docker.compose.container-number";
pub const LABEL_VERSION: &str = "com.docker.compose.version";
pub const LABEL_CONFIG_HASH: &str = "com.docker.compose.config-hash";

/// The engine version stamped into the version label.
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// `<project>_<service>[_run]_<number>`; `run` marks one-off containers,
/// which are numbered in their own namespace.
pub fn build_container_name(project: &str, service: &str, number: u32, one_off: bool) -> String {
    if one_off {
        format!("{project}_{service}_run_{number}")
    } else {
        format!("{project}_{service}_{number}")
    }
}

/// The service-scope labels, as `key=value` filter selectors.
pub fn service_label_filters(project: &str, service: &str, one_off: bool) -> Vec<String> {
    vec![
        format!("{LABEL_PROJECT}={project}"),
        format!("{LABEL_SERVICE}={service}"),
        format!("{LABEL_ONE_OFF}={}", if one_off { "True" } else { "False" }),
    ]
}

/// Compose the full label set for a new container: user labels, the service
/// scope labels, and the per-container number and engine version.
pub fn build_container_labels(
    user_labels: BTreeMap<String, String>,
    project: &str,
    service: &str,
    one_off: bool,
    number: u32,
) -> BTreeMap<String, String> {
    let mut labels = user_labels;
    labels.insert(LABEL_PROJECT.to_string(), project.to_string());
    labels.insert(LABEL_SERVICE.to_string(), service.to_string());
    labels.insert(
        LABEL_ONE_OFF.to_string(),
        if one_off { "True" } else { "False" }.to_string(),
    );
    labels.insert(LABEL_CONTAINER_NUMBER.to_string(), number.to_string());
    labels.insert(LABEL_VERSION.to_string(), ENGINE_VERSION.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_names_join_with_underscores() {
        assert_eq!(build_container_name("myapp", "web", 1, false), "myapp_web_1");
        assert_eq!(build_container_name("myapp", "web", 3, true), "myapp_web_run_3");
    }

    #[test]
    fn filters_select_the_service_scope() {
        let filters = service_label_filters("myapp", "web", false);
        assert_eq!(
            filters,
            vec![
                "com.docker.compose.project=myapp",
                "com.docker.compose.service=web",
                "com.docker.compose.oneoff=False",
            ]
        );
    }

    #[test]
    fn standard_labels_override_user_labels() {
        let user = BTreeMap::from([
            ("team".to_string(), "infra".to_string()),
            (LABEL_PROJECT.to_string(), "spoofed".to_string()),
        ]);
        let labels = build_container_labels(user, "myapp", "web", false, 2);
        assert_eq!(labels["team"], "infra");
        assert_eq!(labels[LABEL_PROJECT], "myapp");
        assert_eq!(labels[LABEL_CONTAINER_NUMBER], "2");
        assert_eq!(labels[LABEL_VERSION], ENGINE_VERSION);
    }
}
