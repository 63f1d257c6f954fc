//! Thin, non-owning lifecycle registries the Config Applier mutates,
//! grounded on `original_source/src/audio_engine/managers/{source,sink,
//! connection,receiver}_manager.h`. By design,
//! the applier holds a reference to these (via `Arc`), never ownership of
//! the actual audio-graph objects they track — the live processors/mixers
//! themselves are owned by `sr-engine::AudioManager`.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex as PLMutex;

use crate::types::{AppliedSinkParams, AppliedSourcePathParams};

/// Tracks which source paths currently exist, keyed by `path_id`, mirroring
/// the applier's view of the live graph so introspection (stats, the
/// Python-binding-equivalent control surface) can list active paths without
/// reaching into `sr-engine`.
#[derive(Default)]
pub struct SourceManager {
    paths: PLMutex<HashMap<String, AppliedSourcePathParams>>,
}

impl SourceManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, params: AppliedSourcePathParams) {
        self.paths.lock().insert(params.path_id.clone(), params);
    }

    pub fn remove(&self, path_id: &str) -> Option<AppliedSourcePathParams> {
        self.paths.lock().remove(path_id)
    }

    pub fn get(&self, path_id: &str) -> Option<AppliedSourcePathParams> {
        self.paths.lock().get(path_id).cloned()
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.paths.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}

/// Tracks which sinks currently exist, keyed by `sink_id`.
#[derive(Default)]
pub struct SinkManager {
    sinks: PLMutex<HashMap<String, AppliedSinkParams>>,
}

impl SinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, params: AppliedSinkParams) {
        self.sinks.lock().insert(params.sink_id.clone(), params);
    }

    pub fn remove(&self, sink_id: &str) -> Option<AppliedSinkParams> {
        self.sinks.lock().remove(sink_id)
    }

    pub fn get(&self, sink_id: &str) -> Option<AppliedSinkParams> {
        self.sinks.lock().get(sink_id).cloned()
    }

    pub fn all_ids(&self) -> Vec<String> {
        self.sinks.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.lock().is_empty()
    }
}

/// Explicit connection set between source paths and sinks, tracked
/// independently of `AppliedSinkParams.connected_source_path_ids` so
/// `connect_source_sink`/`disconnect_source_sink` (the engine's control surface)
/// have somewhere to record ad-hoc changes outside a full `apply_state`.
#[derive(Default)]
pub struct ConnectionManager {
    connections: PLMutex<HashSet<(String, String)>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, source_path_id: impl Into<String>, sink_id: impl Into<String>) {
        self.connections.lock().insert((source_path_id.into(), sink_id.into()));
    }

    pub fn disconnect(&self, source_path_id: &str, sink_id: &str) -> bool {
        self.connections.lock().remove(&(source_path_id.to_string(), sink_id.to_string()))
    }

    pub fn disconnect_all_for_source(&self, source_path_id: &str) {
        self.connections.lock().retain(|(s, _)| s != source_path_id);
    }

    pub fn disconnect_all_for_sink(&self, sink_id: &str) {
        self.connections.lock().retain(|(_, k)| k != sink_id);
    }

    pub fn sinks_for_source(&self, source_path_id: &str) -> Vec<String> {
        self.connections.lock().iter().filter(|(s, _)| s == source_path_id).map(|(_, k)| k.clone()).collect()
    }

    pub fn sources_for_sink(&self, sink_id: &str) -> Vec<String> {
        self.connections.lock().iter().filter(|(_, k)| k == sink_id).map(|(s, _)| s.clone()).collect()
    }

    /// Replaces every connection touching `sink_id` with `desired_source_ids`
    /// in one shot, matching `reconcile_connections_for_sink`.
    pub fn set_sources_for_sink(&self, sink_id: &str, desired_source_ids: &[String]) {
        let mut connections = self.connections.lock();
        connections.retain(|(_, k)| k != sink_id);
        for source_id in desired_source_ids {
            connections.insert((source_id.clone(), sink_id.to_string()));
        }
    }
}

/// Tracks concrete source tags known to the engine (observed by ingress
/// receivers, or bound via Timeshift Manager wildcard resolution), used by
/// the applier to expand `prefix*` source paths into concrete clones.
/// Grounded on the Timeshift Manager's wildcard-binding contract.
#[derive(Default)]
pub struct ReceiverManager {
    concrete_tags: PLMutex<HashSet<String>>,
}

impl ReceiverManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_tag(&self, tag: impl Into<String>) {
        self.concrete_tags.lock().insert(tag.into());
    }

    pub fn remove_tag(&self, tag: &str) {
        self.concrete_tags.lock().remove(tag);
    }

    pub fn tags_matching_prefix(&self, prefix: &str) -> Vec<String> {
        self.concrete_tags.lock().iter().filter(|t| t.starts_with(prefix)).cloned().collect()
    }

    pub fn all_tags(&self) -> Vec<String> {
        self.concrete_tags.lock().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receiver_manager_matches_prefix() {
        let receivers = ReceiverManager::new();
        receivers.register_tag("192.168.1.10");
        receivers.register_tag("192.168.1.11");
        receivers.register_tag("10.0.0.5");
        let mut matches = receivers.tags_matching_prefix("192.168.1.");
        matches.sort();
        assert_eq!(matches, vec!["192.168.1.10".to_string(), "192.168.1.11".to_string()]);
    }

    #[test]
    fn connection_manager_reconciles_sink_connections() {
        let connections = ConnectionManager::new();
        connections.connect("path-a", "sink-1");
        connections.connect("path-b", "sink-1");
        connections.set_sources_for_sink("sink-1", &["path-a".to_string(), "path-c".to_string()]);
        let mut sources = connections.sources_for_sink("sink-1");
        sources.sort();
        assert_eq!(sources, vec!["path-a".to_string(), "path-c".to_string()]);
    }
}
