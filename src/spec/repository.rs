// ABOUTME: Repository reference splitting into repository and tag.
// ABOUTME: A colon inside a registry host:port is not a tag separator.

/// Split `repository[:tag]` on the last colon. When the would-be tag contains
/// a slash, the colon belonged to a registry port and the reference is
/// untagged.
pub fn split_repository_tag(reference: &str) -> (String, Option<String>) {
    match reference.rsplit_once(':') {
        Some((repo, tag)) if !tag.contains('/') => (repo.to_string(), Some(tag.to_string())),
        _ => (reference.to_string(), None),
    }
}
