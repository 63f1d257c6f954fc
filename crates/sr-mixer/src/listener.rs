//! Listener Dispatcher (sink egress): holds the ordered set of listeners
//! attached to a sink and fans each output frame out to them, honoring the
//! per-listener setup/teardown state machine.

use std::sync::Arc;

use parking_lot::Mutex as PLMutex;

use sr_core::ComponentHandle;

/// `added -> (setup-deferred for WebRTC | active immediately otherwise) ->
/// active -> closing -> closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Added,
    SetupDeferred,
    Active,
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EgressKind {
    ScreamUdp,
    Rtp,
    WebRtc,
    Test,
}

/// The wire-framing boundary this workspace does not implement: a real
/// crate supplies Scream/RTP/Opus framing and the actual socket/data
/// channel behind this trait.
pub trait EgressTransport: Send + Sync {
    /// Sends one output frame. Returns `false` if the transport has failed
    /// or closed, causing the dispatcher to reap the listener.
    fn send_payload(&self, bytes: &[u8], csrcs: &[u32]) -> bool;

    /// Blocking setup performed off the dispatcher's hot path. WebRTC's
    /// setup reenters the host binding layer and would deadlock if called
    /// while the dispatcher mutex is held.
    fn setup(&self) -> bool {
        true
    }

    fn wants_multichannel(&self) -> bool {
        false
    }
}

struct ListenerEntry {
    listener_id: String,
    kind: EgressKind,
    transport: Arc<dyn EgressTransport>,
    state: Arc<PLMutex<ListenerState>>,
    deferred_worker: Option<ComponentHandle>,
}

pub struct ListenerDispatcher {
    listeners: PLMutex<Vec<ListenerEntry>>,
}

impl ListenerDispatcher {
    pub fn new() -> Self {
        Self { listeners: PLMutex::new(Vec::new()) }
    }

    /// Registers a listener. Non-WebRTC kinds become `Active` immediately;
    /// WebRTC is left `SetupDeferred` and a short-lived worker runs its
    /// setup off-thread, flipping it to `Active` (or `Closed` on failure)
    /// when it completes.
    pub fn add_listener(&self, listener_id: impl Into<String>, kind: EgressKind, transport: Arc<dyn EgressTransport>) {
        let listener_id = listener_id.into();
        self.remove_listener(&listener_id);

        let initial_state = if kind == EgressKind::WebRtc { ListenerState::SetupDeferred } else { ListenerState::Active };
        let state = Arc::new(PLMutex::new(initial_state));

        let deferred_worker = if kind == EgressKind::WebRtc {
            let state = Arc::clone(&state);
            let transport = Arc::clone(&transport);
            Some(ComponentHandle::spawn(format!("listener-setup-{listener_id}"), move |_stop_flag| {
                let ok = transport.setup();
                *state.lock() = if ok { ListenerState::Active } else { ListenerState::Closed };
            }))
        } else {
            None
        };

        self.listeners.lock().push(ListenerEntry { listener_id, kind, transport, state, deferred_worker });
    }

    pub fn remove_listener(&self, listener_id: &str) -> bool {
        let mut listeners = self.listeners.lock();
        if let Some(pos) = listeners.iter().position(|l| l.listener_id == listener_id) {
            let mut entry = listeners.remove(pos);
            *entry.state.lock() = ListenerState::Closing;
            if let Some(mut worker) = entry.deferred_worker.take() {
                worker.stop();
            }
            true
        } else {
            false
        }
    }

    pub fn listener_state(&self, listener_id: &str) -> Option<ListenerState> {
        self.listeners.lock().iter().find(|l| l.listener_id == listener_id).map(|l| *l.state.lock())
    }

    pub fn listener_kind(&self, listener_id: &str) -> Option<EgressKind> {
        self.listeners.lock().iter().find(|l| l.listener_id == listener_id).map(|l| l.kind)
    }

    /// Sends one output frame to every `Active` listener, picking stereo or
    /// multichannel per listener's declared preference, and reaps any
    /// listener whose state has become `Closed` (either by send failure or
    /// by a completed/failed deferred setup).
    pub fn dispatch_frame(&self, stereo: &[u8], multichannel: &[u8], csrcs: &[u32]) {
        let mut listeners = self.listeners.lock();
        listeners.retain_mut(|entry| {
            let current = *entry.state.lock();
            if current == ListenerState::Active {
                let payload = if entry.transport.wants_multichannel() { multichannel } else { stereo };
                if !entry.transport.send_payload(payload, csrcs) {
                    *entry.state.lock() = ListenerState::Closed;
                }
            }
            *entry.state.lock() != ListenerState::Closed
        });
    }

    pub fn active_listener_ids(&self) -> Vec<String> {
        self.listeners
            .lock()
            .iter()
            .filter(|l| *l.state.lock() == ListenerState::Active)
            .map(|l| l.listener_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }
}

impl Default for ListenerDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
