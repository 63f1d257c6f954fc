//! The Audio Manager: the engine's single facade, grounded on
//! `original_source/src/audio_engine/managers/audio_manager.{h,cpp}`. Owns
//! every live component (the Timeshift Manager, one Source Input Processor
//! per configured path, one Sink Audio Mixer per sink) and exposes both the
//! imperative control surface the original engine's binding layer calls and
//! the `EngineGraph` trait the Config Applier drives declaratively.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as PLMutex;

use sr_core::{
    AudioEngineSettings, AudioFormat, BitDepth, ComponentHandle, EngineError, EngineResult,
    SpeakerLayout, TaggedAudioPacket,
};
use sr_config::{
    AppliedSinkParams, AppliedSourcePathParams, ConfigApplier, ConnectionManager, DesiredEngineState,
    EngineGraph, ReceiverManager, SinkEngineConfig, SinkManager, SourceManager,
};
use sr_mixer::{EgressKind, EgressTransport, Mp3EncoderWorker, PassthroughMp3Encoder, SinkAudioMixer, SinkMixerConfig};
use sr_source::{SourceCommand, SourceInputProcessor, SourceProcessorConfig};
use sr_timeshift::{TimeshiftManager, WildcardEvent};

use crate::ids::{InstanceIdAllocator, PlaybackClock};
use crate::stats::{EngineStats, SinkStats, SourceStats};
use crate::types::{SinkConfig, SourceConfig, SourceParameterUpdates};

/// A sink's 20ms-equivalent output period at 48kHz, matching the mixer's
/// historical default tick size.
const DEFAULT_SINK_FRAME_COUNT: usize = 960;

struct SinkEntry {
    mixer: Arc<SinkAudioMixer>,
    engine_config: SinkEngineConfig,
}

struct SourceEntry {
    processor: Arc<SourceInputProcessor>,
}

/// Egress transport standing in for the WebRTC data-channel/SDP stack: this
/// workspace does not implement real signalling, so payloads handed to it
/// are simply discarded rather than actually reaching a remote peer.
struct WebRtcPlaceholderTransport;

impl EgressTransport for WebRtcPlaceholderTransport {
    fn send_payload(&self, _bytes: &[u8], _csrcs: &[u32]) -> bool {
        true
    }

    fn wants_multichannel(&self) -> bool {
        false
    }
}

/// The live audio graph: every sink, every source path, and the global
/// Timeshift Manager that feeds them. Constructed via `AudioManager::new`,
/// started with `initialize`, and driven either through the imperative
/// control-surface methods or through `apply_desired_state`.
pub struct AudioManager {
    settings: PLMutex<AudioEngineSettings>,
    running: AtomicBool,
    timeshift: PLMutex<Option<Arc<TimeshiftManager>>>,
    sinks: PLMutex<HashMap<String, SinkEntry>>,
    sources: PLMutex<HashMap<String, SourceEntry>>,
    /// (source instance id, sink id) pairs currently attached to a mixer.
    connections: PLMutex<HashSet<(String, String)>>,
    ids: InstanceIdAllocator,
    clock: PlaybackClock,
    receivers: Arc<ReceiverManager>,
    source_manager: Arc<SourceManager>,
    sink_manager: Arc<SinkManager>,
    connection_manager: Arc<ConnectionManager>,
    wildcard_watcher: PLMutex<Option<ComponentHandle>>,
    applier: PLMutex<Option<Arc<ConfigApplier>>>,
}

impl AudioManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            settings: PLMutex::new(AudioEngineSettings::default()),
            running: AtomicBool::new(false),
            timeshift: PLMutex::new(None),
            sinks: PLMutex::new(HashMap::new()),
            sources: PLMutex::new(HashMap::new()),
            connections: PLMutex::new(HashSet::new()),
            ids: InstanceIdAllocator::new(),
            clock: PlaybackClock::new(),
            receivers: Arc::new(ReceiverManager::new()),
            source_manager: Arc::new(SourceManager::new()),
            sink_manager: Arc::new(SinkManager::new()),
            connection_manager: Arc::new(ConnectionManager::new()),
            wildcard_watcher: PLMutex::new(None),
            applier: PLMutex::new(None),
        })
    }

    /// Starts the Timeshift Manager and the Config Applier's wildcard watch
    /// thread. Idempotent: calling this on an already-running manager is a
    /// no-op that returns `true`.
    pub fn initialize(self: &Arc<Self>, global_timeshift_buffer_duration_sec: u64) -> bool {
        if self.running.swap(true, Ordering::AcqRel) {
            return true;
        }

        let mut tuning = self.settings.lock().timeshift.clone();
        tuning.max_buffer_duration_sec = global_timeshift_buffer_duration_sec.max(1);
        let timeshift = TimeshiftManager::new(tuning);
        *self.timeshift.lock() = Some(Arc::clone(&timeshift));

        let graph: Arc<dyn EngineGraph> = Arc::clone(self) as Arc<dyn EngineGraph>;
        let applier = Arc::new(ConfigApplier::new(
            graph,
            Arc::clone(&self.source_manager),
            Arc::clone(&self.sink_manager),
            Arc::clone(&self.connection_manager),
            Arc::clone(&self.receivers),
        ));
        *self.applier.lock() = Some(Arc::clone(&applier));

        let watcher = {
            let timeshift = Arc::clone(&timeshift);
            let applier = Arc::clone(&applier);
            ComponentHandle::spawn("engine-wildcard-watch", move |stop_flag| {
                while !stop_flag.load(Ordering::Acquire) {
                    match timeshift.next_wildcard_event() {
                        Some(WildcardEvent::StreamTagResolved { concrete, .. }) => {
                            applier.on_concrete_tag_resolved(&concrete);
                        }
                        Some(WildcardEvent::StreamTagRemoved { concrete, .. }) => {
                            applier.on_concrete_tag_removed(&concrete);
                        }
                        None => std::thread::sleep(Duration::from_millis(20)),
                    }
                }
            })
        };
        *self.wildcard_watcher.lock() = Some(watcher);

        log::info!("audio engine initialized (timeshift_buffer_sec={global_timeshift_buffer_duration_sec})");
        true
    }

    /// Tears down every live source, sink, and the Timeshift Manager. Safe
    /// to call on an already-stopped manager.
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(mut watcher) = self.wildcard_watcher.lock().take() {
            watcher.stop();
        }
        for (_, entry) in self.sources.lock().drain() {
            entry.processor.stop();
        }
        for (_, entry) in self.sinks.lock().drain() {
            entry.mixer.stop();
        }
        self.connections.lock().clear();
        if let Some(timeshift) = self.timeshift.lock().take() {
            timeshift.stop();
        }
        *self.applier.lock() = None;
        log::info!("audio engine shut down");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    // -- sinks ----------------------------------------------------------

    pub fn add_sink(&self, config: SinkConfig) -> bool {
        self.do_add_sink(&config.sink_id, &config.engine).is_ok()
    }

    pub fn remove_sink(&self, sink_id: &str) -> bool {
        EngineGraph::remove_sink(self, sink_id).is_ok()
    }

    fn do_add_sink(&self, sink_id: &str, engine_config: &SinkEngineConfig) -> EngineResult<()> {
        let mut sinks = self.sinks.lock();
        if sinks.contains_key(sink_id) {
            return Err(EngineError::InvalidParameter(format!("sink '{sink_id}' already exists")));
        }

        let mixer = SinkAudioMixer::start(SinkMixerConfig {
            sink_id: sink_id.to_string(),
            output_channels: engine_config.channels,
            output_rate: engine_config.sample_rate,
            output_bit_depth: engine_config.bit_depth,
            frame_count: DEFAULT_SINK_FRAME_COUNT,
            tuning: self.settings.lock().mixer.clone(),
            stereo_downmix: engine_config.speaker_layout.clone(),
        });

        if engine_config.enable_mp3 {
            let tuning = self.settings.lock().mixer.clone();
            let worker = Mp3EncoderWorker::start(
                Box::new(PassthroughMp3Encoder::new()),
                tuning.mp3_bitrate_kbps,
                tuning.mp3_vbr_enabled,
                tuning.mp3_output_queue_max_size,
                tuning.mp3_output_queue_max_size,
            );
            mixer.enable_mp3(worker);
        }

        sinks.insert(sink_id.to_string(), SinkEntry { mixer, engine_config: engine_config.clone() });
        Ok(())
    }

    // -- sources ----------------------------------------------------------

    pub fn configure_source(&self, config: SourceConfig) -> String {
        match self.do_create_source(
            &config.source_tag,
            config.target_output_channels,
            config.target_output_samplerate,
            config.initial_volume,
            config.initial_eq,
            false,
            false,
            config.initial_delay_ms,
            config.initial_timeshift_sec,
            &[],
        ) {
            Ok(instance_id) => instance_id,
            Err(err) => {
                log::warn!("configure_source({}) failed: {err}", config.source_tag);
                String::new()
            }
        }
    }

    pub fn remove_source(&self, instance_id: &str) -> bool {
        EngineGraph::remove_source(self, instance_id).is_ok()
    }

    pub fn connect_source_sink(&self, source_instance_id: &str, sink_id: &str) -> bool {
        self.do_connect(source_instance_id, sink_id).is_ok()
    }

    pub fn disconnect_source_sink(&self, source_instance_id: &str, sink_id: &str) -> bool {
        self.do_disconnect(source_instance_id, sink_id).is_ok()
    }

    pub fn update_source_parameters(&self, instance_id: &str, updates: SourceParameterUpdates) {
        if let Err(err) = self.do_update_source_parameters(instance_id, &updates) {
            log::warn!("update_source_parameters({instance_id}) failed: {err}");
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn do_create_source(
        &self,
        source_tag: &str,
        output_channels: u8,
        output_rate: u32,
        volume: f64,
        eq_values: [f64; sr_core::EQ_BANDS],
        eq_normalization: bool,
        volume_normalization: bool,
        delay_ms: f64,
        timeshift_sec: f64,
        speaker_layouts: &[(u8, SpeakerLayout)],
    ) -> EngineResult<String> {
        let timeshift = self.timeshift.lock().clone().ok_or_else(|| {
            EngineError::GraphInconsistency("engine not initialized".to_string())
        })?;

        let instance_id = self.ids.allocate("src");
        let processor = SourceInputProcessor::start(SourceProcessorConfig {
            initial_volume: volume,
            ..SourceProcessorConfig::new(instance_id.clone(), source_tag, output_channels, output_rate)
        });

        timeshift.register_processor(instance_id.clone(), source_tag, processor.input_queue(), delay_ms, timeshift_sec);

        let commands = processor.command_queue();
        commands.push(SourceCommand::SetEqualizerGainsLinear(eq_values));
        commands.push(SourceCommand::SetEqNormalization(eq_normalization));
        commands.push(SourceCommand::SetVolumeNormalization(volume_normalization));
        commands.push(SourceCommand::SetDelayMs(delay_ms));
        commands.push(SourceCommand::SetTimeshiftSec(timeshift_sec));
        for (channels, layout) in speaker_layouts {
            commands.push(SourceCommand::SetSpeakerLayout { input_channels: *channels, layout: layout.clone() });
        }

        self.sources.lock().insert(instance_id.clone(), SourceEntry { processor });
        Ok(instance_id)
    }

    fn do_remove_source(&self, instance_id: &str) -> EngineResult<()> {
        let entry = self.sources.lock().remove(instance_id).ok_or_else(|| EngineError::UnknownSource(instance_id.to_string()))?;
        entry.processor.stop();
        if let Some(timeshift) = self.timeshift.lock().clone() {
            timeshift.unregister_processor(instance_id);
        }
        let sinks = self.sinks.lock();
        let mut connections = self.connections.lock();
        connections.retain(|(source, sink_id)| {
            if source == instance_id {
                if let Some(entry) = sinks.get(sink_id) {
                    entry.mixer.detach_source(instance_id);
                }
                false
            } else {
                true
            }
        });
        Ok(())
    }

    fn do_connect(&self, instance_id: &str, sink_id: &str) -> EngineResult<()> {
        let sources = self.sources.lock();
        let entry = sources.get(instance_id).ok_or_else(|| EngineError::UnknownSource(instance_id.to_string()))?;
        let sinks = self.sinks.lock();
        let sink_entry = sinks.get(sink_id).ok_or_else(|| EngineError::UnknownSink(sink_id.to_string()))?;

        let key = (instance_id.to_string(), sink_id.to_string());
        if self.connections.lock().contains(&key) {
            return Ok(());
        }
        sink_entry.mixer.attach_source(instance_id, entry.processor.output_queue(), Some(entry.processor.command_queue()));
        self.connections.lock().insert(key);
        Ok(())
    }

    fn do_disconnect(&self, instance_id: &str, sink_id: &str) -> EngineResult<()> {
        let key = (instance_id.to_string(), sink_id.to_string());
        if !self.connections.lock().remove(&key) {
            return Err(EngineError::UnknownConnection { source: instance_id.to_string(), sink: sink_id.to_string() });
        }
        if let Some(entry) = self.sinks.lock().get(sink_id) {
            entry.mixer.detach_source(instance_id);
        }
        Ok(())
    }

    fn do_update_source_parameters(&self, instance_id: &str, updates: &SourceParameterUpdates) -> EngineResult<()> {
        let sources = self.sources.lock();
        let entry = sources.get(instance_id).ok_or_else(|| EngineError::UnknownSource(instance_id.to_string()))?;
        let commands = entry.processor.command_queue();

        if let Some(volume) = updates.volume {
            commands.push(SourceCommand::SetVolume(volume));
        }
        if let Some(eq) = updates.eq {
            commands.push(SourceCommand::SetEqualizerGainsLinear(eq));
        }
        if let Some(enabled) = updates.eq_normalization {
            commands.push(SourceCommand::SetEqNormalization(enabled));
        }
        if let Some(enabled) = updates.volume_normalization {
            commands.push(SourceCommand::SetVolumeNormalization(enabled));
        }
        if let Some((channels, layout)) = &updates.speaker_layout {
            commands.push(SourceCommand::SetSpeakerLayout { input_channels: *channels, layout: layout.clone() });
        }

        if let Some(timeshift) = self.timeshift.lock().clone() {
            if let Some(delay_ms) = updates.delay_ms {
                commands.push(SourceCommand::SetDelayMs(delay_ms));
                timeshift.update_processor_delay(instance_id, delay_ms);
            }
            if let Some(timeshift_sec) = updates.timeshift_sec {
                commands.push(SourceCommand::SetTimeshiftSec(timeshift_sec));
                timeshift.update_processor_timeshift(instance_id, timeshift_sec);
            }
        }
        Ok(())
    }

    /// Pushes every field of a fully-specified path's parameters, used by the
    /// `EngineGraph` boundary where the Config Applier always supplies
    /// concrete values rather than a sparse update.
    fn apply_full_source_params(&self, instance_id: &str, params: &AppliedSourcePathParams) -> EngineResult<()> {
        let sources = self.sources.lock();
        let entry = sources.get(instance_id).ok_or_else(|| EngineError::UnknownSource(instance_id.to_string()))?;
        let commands = entry.processor.command_queue();
        commands.push(SourceCommand::SetVolume(params.volume));
        commands.push(SourceCommand::SetEqualizerGainsLinear(params.eq_values));
        commands.push(SourceCommand::SetEqNormalization(params.eq_normalization));
        commands.push(SourceCommand::SetVolumeNormalization(params.volume_normalization));
        commands.push(SourceCommand::SetDelayMs(params.delay_ms));
        commands.push(SourceCommand::SetTimeshiftSec(params.timeshift_sec));
        for (channels, layout) in &params.speaker_layouts {
            commands.push(SourceCommand::SetSpeakerLayout { input_channels: *channels, layout: layout.clone() });
        }
        drop(sources);

        if let Some(timeshift) = self.timeshift.lock().clone() {
            timeshift.update_processor_delay(instance_id, params.delay_ms);
            timeshift.update_processor_timeshift(instance_id, params.timeshift_sec);
        }
        Ok(())
    }

    // -- stats and data retrieval ------------------------------------------

    pub fn get_audio_engine_stats(&self) -> EngineStats {
        let timeshift =
            self.timeshift.lock().as_ref().map(|t| t.get_stats()).unwrap_or_default();

        let mut sinks = HashMap::new();
        for (id, entry) in self.sinks.lock().iter() {
            sinks.insert(id.clone(), SinkStats { mixer: entry.mixer.stats(), listener_count: entry.mixer.listeners.len() });
        }

        let mut sources = HashMap::new();
        for (id, entry) in self.sources.lock().iter() {
            sources.insert(id.clone(), SourceStats { reconfigurations: entry.processor.reconfigurations() });
        }

        EngineStats { timeshift, sinks, sources }
    }

    pub fn get_mp3_data(&self, sink_id: &str) -> Vec<u8> {
        self.sinks.lock().get(sink_id).and_then(|e| e.mixer.try_pop_mp3_frame()).unwrap_or_default()
    }

    pub fn get_mp3_data_by_ip(&self, ip_address: &str) -> Vec<u8> {
        self.sinks
            .lock()
            .values()
            .find(|e| e.engine_config.output_ip == ip_address)
            .and_then(|e| e.mixer.try_pop_mp3_frame())
            .unwrap_or_default()
    }

    /// Injects one packet as if it had arrived over the network, fabricating
    /// a monotonic producer timestamp via the manager's own `PlaybackClock`
    /// (plugin sources have no RTP-style counter of their own).
    pub fn write_plugin_packet(
        &self,
        source_tag: &str,
        payload: Vec<u8>,
        channels: u8,
        sample_rate: u32,
        bit_depth: u8,
        chlayout1: u8,
        chlayout2: u8,
    ) -> bool {
        let Some(bit_depth) = BitDepth::from_u8(bit_depth) else { return false };
        let Some(timeshift) = self.timeshift.lock().clone() else { return false };

        let format = AudioFormat { channels, sample_rate, bit_depth };
        let frame_bytes = format.frame_bytes();
        if frame_bytes == 0 {
            return false;
        }

        self.receivers.register_tag(source_tag);
        let frame_count = (payload.len() / frame_bytes) as u32;
        let producer_timestamp = self.clock.next_timestamp(source_tag, frame_count.max(1));

        timeshift.add_packet(TaggedAudioPacket {
            source_tag: source_tag.to_string(),
            payload,
            received_time: Instant::now(),
            producer_timestamp: Some(producer_timestamp),
            producer_ids: vec![],
            format,
            chlayout1,
            chlayout2,
            playback_rate: 1.0,
        });
        true
    }

    // -- settings -----------------------------------------------------------

    pub fn get_audio_settings(&self) -> AudioEngineSettings {
        self.settings.lock().clone()
    }

    pub fn set_audio_settings(&self, new_settings: AudioEngineSettings) {
        *self.settings.lock() = new_settings;
    }

    // -- declarative configuration --------------------------------------

    pub fn apply_desired_state(&self, desired: DesiredEngineState) -> Option<sr_config::ApplyReport> {
        self.applier.lock().as_ref().map(|applier| applier.apply_state(desired))
    }

    // -- WebRTC signalling stubs ------------------------------------------
    //
    // A real SDP/ICE negotiation stack is out of scope; these methods only
    // manage a listener's presence in the `ListenerDispatcher`, using
    // `WebRtcPlaceholderTransport` in place of an actual data channel.

    pub fn add_webrtc_listener(&self, sink_id: &str, listener_id: &str) -> bool {
        let sinks = self.sinks.lock();
        let Some(entry) = sinks.get(sink_id) else { return false };
        entry.mixer.listeners.add_listener(listener_id, EgressKind::WebRtc, Arc::new(WebRtcPlaceholderTransport));
        true
    }

    pub fn remove_webrtc_listener(&self, sink_id: &str, listener_id: &str) -> bool {
        self.sinks.lock().get(sink_id).map(|e| e.mixer.listeners.remove_listener(listener_id)).unwrap_or(false)
    }

    pub fn set_webrtc_remote_description(&self, _sink_id: &str, _listener_id: &str, _sdp: &str) {}

    pub fn add_webrtc_remote_ice_candidate(&self, _sink_id: &str, _listener_id: &str, _candidate: &str, _sdp_mid: &str) {}
}

impl EngineGraph for AudioManager {
    fn add_sink(&self, params: &AppliedSinkParams) -> EngineResult<()> {
        self.do_add_sink(&params.sink_id, &params.engine_config)
    }

    fn remove_sink(&self, sink_id: &str) -> EngineResult<()> {
        let entry = self.sinks.lock().remove(sink_id).ok_or_else(|| EngineError::UnknownSink(sink_id.to_string()))?;
        entry.mixer.stop();
        self.connections.lock().retain(|(_, sink)| sink != sink_id);
        Ok(())
    }

    fn reconcile_connections_for_sink(&self, sink_id: &str, connected_source_path_ids: &[String]) -> EngineResult<()> {
        if !self.sinks.lock().contains_key(sink_id) {
            return Err(EngineError::UnknownSink(sink_id.to_string()));
        }
        let desired: HashSet<String> = connected_source_path_ids.iter().cloned().collect();
        let current: HashSet<String> = self
            .connections
            .lock()
            .iter()
            .filter(|(_, sink)| sink == sink_id)
            .map(|(source, _)| source.clone())
            .collect();

        for instance_id in current.difference(&desired) {
            self.do_disconnect(instance_id, sink_id)?;
        }
        for instance_id in desired.difference(&current) {
            self.do_connect(instance_id, sink_id)?;
        }
        Ok(())
    }

    fn configure_source(&self, params: &AppliedSourcePathParams) -> EngineResult<String> {
        let instance_id = self.do_create_source(
            &params.source_tag,
            params.target_output_channels,
            params.target_output_samplerate,
            params.volume,
            params.eq_values,
            params.eq_normalization,
            params.volume_normalization,
            params.delay_ms,
            params.timeshift_sec,
            &params.speaker_layouts,
        )?;
        if !params.target_sink_id.is_empty() {
            self.do_connect(&instance_id, &params.target_sink_id)?;
        }
        Ok(instance_id)
    }

    fn remove_source(&self, instance_id: &str) -> EngineResult<()> {
        self.do_remove_source(instance_id)
    }

    fn update_source_parameters(&self, instance_id: &str, params: &AppliedSourcePathParams) -> EngineResult<()> {
        self.apply_full_source_params(instance_id, params)
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sr_core::EQ_BANDS;

    fn sink_config(id: &str) -> SinkConfig {
        SinkConfig { sink_id: id.to_string(), engine: SinkEngineConfig { output_ip: "192.168.1.50".to_string(), ..Default::default() } }
    }

    #[test]
    fn configure_connect_and_remove_round_trip() {
        let manager = AudioManager::new();
        manager.initialize(30);

        assert!(manager.add_sink(sink_config("sink-1")));
        let instance_id = manager.configure_source(SourceConfig { source_tag: "192.168.1.5".to_string(), ..Default::default() });
        assert!(!instance_id.is_empty());

        assert!(manager.connect_source_sink(&instance_id, "sink-1"));
        std::thread::sleep(Duration::from_millis(50));

        let stats = manager.get_audio_engine_stats();
        assert!(stats.sources.contains_key(&instance_id));
        assert!(stats.sinks.contains_key("sink-1"));

        assert!(manager.disconnect_source_sink(&instance_id, "sink-1"));
        assert!(manager.remove_source(&instance_id));
        assert!(manager.remove_sink("sink-1"));
        manager.shutdown();
    }

    #[test]
    fn write_plugin_packet_requires_initialized_engine() {
        let manager = AudioManager::new();
        assert!(!manager.write_plugin_packet("plugin-1", vec![0u8; 1152], 2, 48000, 16, 0x03, 0x00));
        manager.initialize(30);
        assert!(manager.write_plugin_packet("plugin-1", vec![0u8; 1152], 2, 48000, 16, 0x03, 0x00));
        manager.shutdown();
    }

    #[test]
    fn update_source_parameters_only_touches_requested_fields() {
        let manager = AudioManager::new();
        manager.initialize(30);
        let instance_id = manager.configure_source(SourceConfig { source_tag: "192.168.1.6".to_string(), ..Default::default() });

        manager.update_source_parameters(&instance_id, SourceParameterUpdates { volume: Some(0.5), ..Default::default() });
        manager.update_source_parameters(
            &instance_id,
            SourceParameterUpdates { eq: Some([0.5; EQ_BANDS]), ..Default::default() },
        );

        assert!(manager.remove_source(&instance_id));
        manager.shutdown();
    }

    #[test]
    fn applying_desired_state_through_the_declarative_surface_creates_the_graph() {
        let manager = AudioManager::new();
        manager.initialize(30);

        let desired = DesiredEngineState {
            sinks: vec![AppliedSinkParams {
                sink_id: "sink-1".to_string(),
                engine_config: SinkEngineConfig::default(),
                connected_source_path_ids: vec!["path-1".to_string()],
            }],
            source_paths: vec![AppliedSourcePathParams {
                path_id: "path-1".to_string(),
                source_tag: "192.168.1.7".to_string(),
                target_sink_id: "sink-1".to_string(),
                volume: 1.0,
                eq_values: [1.0; EQ_BANDS],
                eq_normalization: false,
                volume_normalization: false,
                delay_ms: 0.0,
                timeshift_sec: 0.0,
                target_output_channels: 2,
                target_output_samplerate: 48000,
                speaker_layouts: Vec::new(),
                generated_instance_id: None,
            }],
        };

        let report = manager.apply_desired_state(desired).expect("applier available once initialized");
        assert!(report.is_clean());
        assert_eq!(report.sinks_added, 1);
        assert_eq!(report.paths_added, 1);

        manager.shutdown();
    }
}
