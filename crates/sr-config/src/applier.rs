//! The Config Applier: diffs a `DesiredEngineState` against the live graph
//! and applies the minimal set of adds/removes/updates, grounded on
//! `original_source/src/audio_engine/configuration/
//! audio_engine_config_applier.{h,cpp}`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as PLMutex;

use sr_core::{wildcard_prefix, EngineResult};

use crate::managers::{ConnectionManager, ReceiverManager, SinkManager, SourceManager};
use crate::types::{AppliedSinkParams, AppliedSourcePathParams, DesiredEngineState};

/// The live-graph boundary the applier drives. Implemented by
/// `sr-engine::AudioManager`; kept as a trait so `sr-config` never depends
/// on `sr-engine` — the applier holds a reference to the live graph, never
/// ownership of it.
pub trait EngineGraph: Send + Sync {
    fn add_sink(&self, params: &AppliedSinkParams) -> EngineResult<()>;
    fn remove_sink(&self, sink_id: &str) -> EngineResult<()>;
    fn reconcile_connections_for_sink(&self, sink_id: &str, connected_source_path_ids: &[String]) -> EngineResult<()>;

    /// Creates a source processor for `params` and returns its generated
    /// instance id.
    fn configure_source(&self, params: &AppliedSourcePathParams) -> EngineResult<String>;
    fn remove_source(&self, instance_id: &str) -> EngineResult<()>;
    fn update_source_parameters(&self, instance_id: &str, params: &AppliedSourcePathParams) -> EngineResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    pub sinks_added: usize,
    pub sinks_removed: usize,
    pub sinks_updated: usize,
    pub paths_added: usize,
    pub paths_removed: usize,
    pub paths_updated: usize,
    /// Items skipped because the engine graph rejected them; the rest of
    /// the apply still runs to completion.
    pub errors: Vec<String>,
}

impl ApplyReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct ConfigApplier {
    graph: Arc<dyn EngineGraph>,
    sources: Arc<SourceManager>,
    sinks: Arc<SinkManager>,
    connections: Arc<ConnectionManager>,
    receivers: Arc<ReceiverManager>,
    cached_desired_state: PLMutex<Option<DesiredEngineState>>,
    clone_filter_lookup: PLMutex<HashMap<String, String>>,
}

impl ConfigApplier {
    pub fn new(
        graph: Arc<dyn EngineGraph>,
        sources: Arc<SourceManager>,
        sinks: Arc<SinkManager>,
        connections: Arc<ConnectionManager>,
        receivers: Arc<ReceiverManager>,
    ) -> Self {
        Self {
            graph,
            sources,
            sinks,
            connections,
            receivers,
            cached_desired_state: PLMutex::new(None),
            clone_filter_lookup: PLMutex::new(HashMap::new()),
        }
    }

    /// Applies `desired` to the live graph, returning a report of what was
    /// mutated. Idempotent in aggregate: calling this twice with the same
    /// `desired` performs no mutations the second time.
    pub fn apply_state(&self, desired: DesiredEngineState) -> ApplyReport {
        let effective = self.build_effective_state(&desired);
        *self.cached_desired_state.lock() = Some(desired);

        let mut report = ApplyReport::default();

        let (path_ids_to_remove, paths_to_add, paths_to_update) = self.reconcile_source_paths(&effective.source_paths);
        let (sink_ids_to_remove, sinks_to_add, sinks_to_update) = self.reconcile_sinks(&effective.sinks);

        // Remove source paths before sinks, so a sink never briefly outlives
        // the paths that fed it.
        for path_id in &path_ids_to_remove {
            self.remove_source_path(path_id, &mut report);
        }
        for sink_id in &sink_ids_to_remove {
            self.remove_sink(sink_id, &mut report);
        }

        for path in &paths_to_add {
            self.add_source_path(path, &mut report);
        }
        for sink in &sinks_to_add {
            self.add_sink(sink, &mut report);
        }

        for path in &paths_to_update {
            self.update_source_path(path, &mut report);
        }
        for sink in &sinks_to_update {
            self.update_sink_connections(sink, &mut report);
        }

        if report.sinks_added + report.sinks_removed + report.sinks_updated + report.paths_added + report.paths_removed + report.paths_updated
            > 0
        {
            log::debug!(
                "apply_state: sinks +{}/-{}/~{}, paths +{}/-{}/~{}, {} errors",
                report.sinks_added,
                report.sinks_removed,
                report.sinks_updated,
                report.paths_added,
                report.paths_removed,
                report.paths_updated,
                report.errors.len()
            );
        }

        report
    }

    /// Re-runs `apply_state` against the last applied desired state, used
    /// when a wildcard's set of matching concrete tags changes.
    fn reapply_cached_state(&self) {
        let cached = self.cached_desired_state.lock().clone();
        if let Some(state) = cached {
            self.apply_state(state);
        }
    }

    pub fn on_concrete_tag_resolved(&self, tag: &str) {
        self.receivers.register_tag(tag);
        self.reapply_cached_state();
    }

    pub fn on_concrete_tag_removed(&self, tag: &str) {
        self.receivers.remove_tag(tag);
        self.reapply_cached_state();
    }

    pub fn source_manager(&self) -> &Arc<SourceManager> {
        &self.sources
    }

    pub fn sink_manager(&self) -> &Arc<SinkManager> {
        &self.sinks
    }

    pub fn connection_manager(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn receiver_manager(&self) -> &Arc<ReceiverManager> {
        &self.receivers
    }

    /// Expands any `prefix*` source path into 0..N concrete clones (one per
    /// currently-known concrete tag matching the prefix), and resolves any
    /// sink connection list that names a wildcard path id into the set of
    /// resolved clone ids.
    fn build_effective_state(&self, base: &DesiredEngineState) -> DesiredEngineState {
        let mut clone_lookup = HashMap::new();
        let mut source_paths = Vec::with_capacity(base.source_paths.len());

        for path in &base.source_paths {
            if let Some(prefix) = wildcard_prefix(&path.source_tag) {
                for concrete in self.receivers.tags_matching_prefix(prefix) {
                    let mut clone = path.clone();
                    clone.path_id = format!("{}::{}", path.path_id, concrete);
                    clone.source_tag = concrete;
                    clone_lookup.insert(clone.path_id.clone(), path.path_id.clone());
                    source_paths.push(clone);
                }
            } else {
                source_paths.push(path.clone());
            }
        }

        let sinks = base
            .sinks
            .iter()
            .map(|sink| {
                let mut sink = sink.clone();
                sink.connected_source_path_ids = Self::resolve_connected_ids(&sink.connected_source_path_ids, &clone_lookup);
                sink
            })
            .collect();

        *self.clone_filter_lookup.lock() = clone_lookup;
        DesiredEngineState { sinks, source_paths }
    }

    fn resolve_connected_ids(ids: &[String], clone_lookup: &HashMap<String, String>) -> Vec<String> {
        let mut resolved = Vec::new();
        for id in ids {
            let clones: Vec<String> =
                clone_lookup.iter().filter(|(_, origin)| *origin == id).map(|(clone_id, _)| clone_id.clone()).collect();
            if clones.is_empty() {
                resolved.push(id.clone());
            } else {
                resolved.extend(clones);
            }
        }
        resolved
    }

    /// Classifies desired sinks against the live `SinkManager` into
    /// (remove, add, connections-only-update) lists. A sink whose engine
    /// config changed is split across remove+add (destroy/recreate);
    /// `to_update` carries only sinks whose config is unchanged but whose
    /// connection set differs, so `update_sink_connections` has something
    /// to reconcile.
    fn reconcile_sinks(
        &self,
        desired_sinks: &[AppliedSinkParams],
    ) -> (Vec<String>, Vec<AppliedSinkParams>, Vec<AppliedSinkParams>) {
        let mut to_remove = Vec::new();
        let mut to_add = Vec::new();
        let mut to_update = Vec::new();

        let active_ids = self.sinks.all_ids();
        let desired_ids: std::collections::HashSet<&str> = desired_sinks.iter().map(|s| s.sink_id.as_str()).collect();

        for id in &active_ids {
            if !desired_ids.contains(id.as_str()) {
                to_remove.push(id.clone());
            }
        }

        for desired in desired_sinks {
            match self.sinks.get(&desired.sink_id) {
                None => to_add.push(desired.clone()),
                Some(active) => {
                    if active.engine_config.differs(&desired.engine_config) {
                        to_remove.push(desired.sink_id.clone());
                        to_add.push(desired.clone());
                    } else if !sr_core::sets_equal(&active.connected_source_path_ids, &desired.connected_source_path_ids) {
                        to_update.push(desired.clone());
                    }
                    // Identical config and identical connection set: no-op,
                    // preserving idempotency.
                }
            }
        }

        (to_remove, to_add, to_update)
    }

    /// Same shape as `reconcile_sinks` but for source paths: a fundamental
    /// change (tag/sink/channels/rate) is split across remove+add so the
    /// path gets a fresh instance id; any other field difference becomes an
    /// in-place update.
    fn reconcile_source_paths(
        &self,
        desired_paths: &[AppliedSourcePathParams],
    ) -> (Vec<String>, Vec<AppliedSourcePathParams>, Vec<AppliedSourcePathParams>) {
        let mut to_remove = Vec::new();
        let mut to_add = Vec::new();
        let mut to_update = Vec::new();

        let active_ids = self.sources.all_ids();
        let desired_ids: std::collections::HashSet<&str> = desired_paths.iter().map(|p| p.path_id.as_str()).collect();

        for id in &active_ids {
            if !desired_ids.contains(id.as_str()) {
                to_remove.push(id.clone());
            }
        }

        for desired in desired_paths {
            match self.sources.get(&desired.path_id) {
                None => to_add.push(desired.clone()),
                Some(active) => {
                    if active.is_fundamental_change(desired) {
                        to_remove.push(desired.path_id.clone());
                        to_add.push(desired.clone());
                    } else if active.differs_in_place(desired) {
                        let mut desired = desired.clone();
                        desired.generated_instance_id = active.generated_instance_id;
                        to_update.push(desired);
                    }
                }
            }
        }

        (to_remove, to_add, to_update)
    }

    fn remove_source_path(&self, path_id: &str, report: &mut ApplyReport) {
        let Some(active) = self.sources.remove(path_id) else { return };
        if let Some(instance_id) = &active.generated_instance_id {
            if let Err(err) = self.graph.remove_source(instance_id) {
                report.errors.push(format!("remove_source({instance_id}): {err}"));
            }
        }
        self.connections.disconnect_all_for_source(path_id);
        report.paths_removed += 1;
    }

    fn remove_sink(&self, sink_id: &str, report: &mut ApplyReport) {
        if self.sinks.remove(sink_id).is_none() {
            return;
        }
        if let Err(err) = self.graph.remove_sink(sink_id) {
            report.errors.push(format!("remove_sink({sink_id}): {err}"));
        }
        self.connections.disconnect_all_for_sink(sink_id);
        report.sinks_removed += 1;
    }

    fn add_source_path(&self, path: &AppliedSourcePathParams, report: &mut ApplyReport) {
        match self.graph.configure_source(path) {
            Ok(instance_id) => {
                let mut stored = path.clone();
                stored.generated_instance_id = Some(instance_id);
                self.sources.insert(stored);
                report.paths_added += 1;
            }
            Err(err) => report.errors.push(format!("configure_source({}): {err}", path.path_id)),
        }
    }

    fn add_sink(&self, sink: &AppliedSinkParams, report: &mut ApplyReport) {
        match self.graph.add_sink(sink) {
            Ok(()) => {
                self.sinks.insert(sink.clone());
                self.connections.set_sources_for_sink(&sink.sink_id, &sink.connected_source_path_ids);
                let instance_ids = self.resolve_instance_ids(&sink.connected_source_path_ids);
                if let Err(err) = self.graph.reconcile_connections_for_sink(&sink.sink_id, &instance_ids) {
                    report.errors.push(format!("reconcile_connections_for_sink({}): {err}", sink.sink_id));
                }
                report.sinks_added += 1;
            }
            Err(err) => report.errors.push(format!("add_sink({}): {err}", sink.sink_id)),
        }
    }

    /// The live graph only knows about generated instance ids, not the
    /// config-layer path ids `AppliedSinkParams` lists its connections by;
    /// this translates at the boundary just before the call crosses into
    /// `sr-engine`.
    fn resolve_instance_ids(&self, path_ids: &[String]) -> Vec<String> {
        path_ids.iter().filter_map(|path_id| self.sources.get(path_id).and_then(|p| p.generated_instance_id)).collect()
    }

    fn update_source_path(&self, path: &AppliedSourcePathParams, report: &mut ApplyReport) {
        let Some(instance_id) = &path.generated_instance_id else {
            report.errors.push(format!("update_source_path({}): missing instance id", path.path_id));
            return;
        };
        match self.graph.update_source_parameters(instance_id, path) {
            Ok(()) => {
                self.sources.insert(path.clone());
                report.paths_updated += 1;
            }
            Err(err) => report.errors.push(format!("update_source_parameters({instance_id}): {err}")),
        }
    }

    fn update_sink_connections(&self, sink: &AppliedSinkParams, report: &mut ApplyReport) {
        let instance_ids = self.resolve_instance_ids(&sink.connected_source_path_ids);
        match self.graph.reconcile_connections_for_sink(&sink.sink_id, &instance_ids) {
            Ok(()) => {
                self.sinks.insert(sink.clone());
                self.connections.set_sources_for_sink(&sink.sink_id, &sink.connected_source_path_ids);
                report.sinks_updated += 1;
            }
            Err(err) => report.errors.push(format!("reconcile_connections_for_sink({}): {err}", sink.sink_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SinkEngineConfig;
    use parking_lot::Mutex as PLMutex2;
    use sr_core::EngineError;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct FakeGraph {
        next_instance: AtomicU64,
        calls: PLMutex2<Vec<String>>,
    }

    impl FakeGraph {
        fn new() -> Self {
            Self { next_instance: AtomicU64::new(1), calls: PLMutex2::new(Vec::new()) }
        }
    }

    impl EngineGraph for FakeGraph {
        fn add_sink(&self, params: &AppliedSinkParams) -> EngineResult<()> {
            self.calls.lock().push(format!("add_sink:{}", params.sink_id));
            Ok(())
        }
        fn remove_sink(&self, sink_id: &str) -> EngineResult<()> {
            self.calls.lock().push(format!("remove_sink:{sink_id}"));
            Ok(())
        }
        fn reconcile_connections_for_sink(&self, sink_id: &str, ids: &[String]) -> EngineResult<()> {
            self.calls.lock().push(format!("reconcile:{sink_id}:{}", ids.join(",")));
            Ok(())
        }
        fn configure_source(&self, params: &AppliedSourcePathParams) -> EngineResult<String> {
            let id = self.next_instance.fetch_add(1, Ordering::Relaxed);
            self.calls.lock().push(format!("configure_source:{}", params.path_id));
            Ok(format!("instance-{id}"))
        }
        fn remove_source(&self, instance_id: &str) -> EngineResult<()> {
            self.calls.lock().push(format!("remove_source:{instance_id}"));
            Ok(())
        }
        fn update_source_parameters(&self, instance_id: &str, _params: &AppliedSourcePathParams) -> EngineResult<()> {
            self.calls.lock().push(format!("update_source:{instance_id}"));
            Ok(())
        }
    }

    fn make_applier() -> (Arc<FakeGraph>, ConfigApplier) {
        let graph = Arc::new(FakeGraph::new());
        let applier = ConfigApplier::new(
            graph.clone(),
            Arc::new(SourceManager::new()),
            Arc::new(SinkManager::new()),
            Arc::new(ConnectionManager::new()),
            Arc::new(ReceiverManager::new()),
        );
        (graph, applier)
    }

    fn source_path(path_id: &str, tag: &str, sink: &str) -> AppliedSourcePathParams {
        AppliedSourcePathParams {
            path_id: path_id.to_string(),
            source_tag: tag.to_string(),
            target_sink_id: sink.to_string(),
            volume: 1.0,
            eq_values: [1.0; sr_core::EQ_BANDS],
            eq_normalization: false,
            volume_normalization: false,
            delay_ms: 0.0,
            timeshift_sec: 0.0,
            target_output_channels: 2,
            target_output_samplerate: 48000,
            speaker_layouts: Vec::new(),
            generated_instance_id: None,
        }
    }

    fn sink(sink_id: &str, connected: &[&str]) -> AppliedSinkParams {
        AppliedSinkParams {
            sink_id: sink_id.to_string(),
            engine_config: SinkEngineConfig::default(),
            connected_source_path_ids: connected.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn first_apply_creates_sink_and_path() {
        let (_graph, applier) = make_applier();
        let state = DesiredEngineState {
            sinks: vec![sink("sink-1", &["path-1"])],
            source_paths: vec![source_path("path-1", "192.168.1.5", "sink-1")],
        };
        let report = applier.apply_state(state);
        assert_eq!(report.paths_added, 1);
        assert_eq!(report.sinks_added, 1);
        assert!(report.is_clean());
    }

    #[test]
    fn second_identical_apply_is_a_no_op() {
        let (graph, applier) = make_applier();
        let state = DesiredEngineState {
            sinks: vec![sink("sink-1", &["path-1"])],
            source_paths: vec![source_path("path-1", "192.168.1.5", "sink-1")],
        };
        applier.apply_state(state.clone());
        let before = graph.calls.lock().len();
        let report = applier.apply_state(state);
        assert_eq!(report.sinks_added, 0);
        assert_eq!(report.paths_added, 0);
        assert_eq!(report.sinks_updated, 0);
        assert_eq!(report.paths_updated, 0);
        assert_eq!(graph.calls.lock().len(), before, "second identical apply must not touch the graph");
    }

    #[test]
    fn volume_change_is_an_in_place_update_not_a_recreate() {
        let (graph, applier) = make_applier();
        let state = DesiredEngineState {
            sinks: vec![sink("sink-1", &["path-1"])],
            source_paths: vec![source_path("path-1", "192.168.1.5", "sink-1")],
        };
        applier.apply_state(state.clone());

        let mut updated = state;
        updated.source_paths[0].volume = 0.5;
        let report = applier.apply_state(updated);
        assert_eq!(report.paths_updated, 1);
        assert_eq!(report.paths_added, 0);
        assert!(!graph.calls.lock().iter().any(|c| c.starts_with("remove_source")));
    }

    #[test]
    fn source_tag_change_forces_destroy_and_recreate() {
        let (_graph, applier) = make_applier();
        let state = DesiredEngineState {
            sinks: vec![sink("sink-1", &["path-1"])],
            source_paths: vec![source_path("path-1", "192.168.1.5", "sink-1")],
        };
        applier.apply_state(state.clone());

        let mut updated = state;
        updated.source_paths[0].source_tag = "192.168.1.6".to_string();
        let report = applier.apply_state(updated);
        assert_eq!(report.paths_removed, 1);
        assert_eq!(report.paths_added, 1);
    }

    #[test]
    fn wildcard_path_clones_per_known_concrete_tag() {
        let (_graph, applier) = make_applier();
        applier.receiver_manager().register_tag("192.168.1.10");
        applier.receiver_manager().register_tag("192.168.1.11");

        let state = DesiredEngineState {
            sinks: vec![sink("sink-1", &["path-wild"])],
            source_paths: vec![source_path("path-wild", "192.168.1.*", "sink-1")],
        };
        let report = applier.apply_state(state);
        assert_eq!(report.paths_added, 2, "one clone per known concrete tag");
        assert_eq!(applier.source_manager().len(), 2);
    }

    #[test]
    fn failed_removal_is_logged_but_apply_continues() {
        struct FlakyGraph;
        impl EngineGraph for FlakyGraph {
            fn add_sink(&self, _: &AppliedSinkParams) -> EngineResult<()> {
                Ok(())
            }
            fn remove_sink(&self, sink_id: &str) -> EngineResult<()> {
                Err(EngineError::UnknownSink(sink_id.to_string()))
            }
            fn reconcile_connections_for_sink(&self, _: &str, _: &[String]) -> EngineResult<()> {
                Ok(())
            }
            fn configure_source(&self, _: &AppliedSourcePathParams) -> EngineResult<String> {
                Ok("instance-1".to_string())
            }
            fn remove_source(&self, _: &str) -> EngineResult<()> {
                Ok(())
            }
            fn update_source_parameters(&self, _: &str, _: &AppliedSourcePathParams) -> EngineResult<()> {
                Ok(())
            }
        }

        let applier = ConfigApplier::new(
            Arc::new(FlakyGraph),
            Arc::new(SourceManager::new()),
            Arc::new(SinkManager::new()),
            Arc::new(ConnectionManager::new()),
            Arc::new(ReceiverManager::new()),
        );
        applier.apply_state(DesiredEngineState { sinks: vec![sink("sink-1", &[])], source_paths: vec![] });
        let report = applier.apply_state(DesiredEngineState { sinks: vec![], source_paths: vec![] });
        assert_eq!(report.sinks_removed, 0);
        assert!(!report.is_clean());
    }
}
