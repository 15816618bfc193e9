//! Builders for the colon-delimited store namespaces.

use crate::config::Config;

pub fn loop_key(cfg: &Config, loop_id: &str) -> String {
    format!("{}:{}:loop:{}", cfg.namespace, cfg.server_id, loop_id)
}

pub fn loop_pattern(cfg: &Config) -> String {
    format!("{}:{}:loop:*", cfg.namespace, cfg.server_id)
}

pub fn running_key(cfg: &Config) -> String {
    format!("{}:{}:state:running", cfg.namespace, cfg.server_id)
}

pub fn history_key(cfg: &Config) -> String {
    format!("{}:{}:history", cfg.namespace, cfg.server_id)
}

pub fn sources_key(cfg: &Config) -> String {
    format!("{}:{}:sources", cfg.namespace, cfg.server_id)
}

pub fn ingest_key(cfg: &Config) -> String {
    format!("{}:{}:ingest", cfg.namespace, cfg.server_id)
}

/// Queues from any server in the namespace are swept.
pub fn ingest_pattern(cfg: &Config) -> String {
    format!("{}:*:ingest", cfg.namespace)
}

pub fn source_key(fingerprint: &str) -> String {
    format!("source:{fingerprint}")
}

pub fn source_pattern() -> String {
    "source:*".into()
}

pub fn map_resolution_field(map_name: &str, resolution: u16) -> String {
    format!("map:{map_name}:resolution:{resolution}")
}

pub fn map_image_field(map_name: &str, image_id: &str) -> String {
    format!("map:{map_name}:image:{image_id}")
}

/// Loop id is the final path segment of a loop key.
pub fn loop_id_from_key(key: &str) -> Option<&str> {
    let mut parts = key.split(':');
    if parts.clone().nth(2) != Some("loop") {
        return None;
    }
    parts.nth(3).filter(|id| !id.is_empty())
}

pub fn is_loop_key(key: &str) -> bool {
    loop_id_from_key(key).is_some()
}

pub fn is_ingest_key(key: &str) -> bool {
    key.ends_with(":ingest")
}
