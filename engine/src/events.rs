//! Structured events the engine emits, consumed by an `EventSink`.
//!
//! Replaces the global-bus/signal pattern in the original tooling: the UI
//! (or the daemon's WebSocket layer) never touches engine internals, it
//! only observes this stream.

use serde::{Deserialize, Serialize};

use crate::state_machine::BootloaderState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    State {
        state: BootloaderState,
        text: String,
        severity: Severity,
    },
    Progress {
        bytes_sent: u32,
        total_bytes: u32,
    },
    Finished {
        success: bool,
    },
    SourceAddressApplied {
        device: u8,
        tester: u8,
    },
    SourceAddressRead {
        device: u8,
    },
    ObserverUpdated {
        candidates: Vec<u8>,
    },
}

/// Callback-style sink; implementors usually just forward to a channel or
/// a WebSocket broadcast.
pub trait EventSink: Send {
    fn on_event(&mut self, event: &EngineEvent);

    /// Narrower callback kept for collaborators written against the
    /// four-method contract (`onState`/`onProgress`/`onFinished`); the
    /// default forwards through `on_event`.
    fn on_state(&mut self, text: &str, severity: Severity) {
        self.on_event(&EngineEvent::State {
            state: BootloaderState::Ready,
            text: text.to_string(),
            severity,
        });
    }
}

/// Sink used when no observer is attached; drops every event.
#[derive(Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: &EngineEvent) {}
}

/// Sink that records every event in order, for tests.
#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<EngineEvent>,
}

impl EventSink for RecordingSink {
    fn on_event(&mut self, event: &EngineEvent) {
        self.events.push(event.clone());
    }
}

/// Clonable variant of [`RecordingSink`] backed by a shared buffer, so a
/// test can keep a handle to inspect events after handing the other half
/// to an `Engine` (which takes ownership of its sink).
#[derive(Clone, Default)]
pub struct SharedRecordingSink(std::sync::Arc<std::sync::Mutex<Vec<EngineEvent>>>);

impl SharedRecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.0.lock().expect("recording sink mutex poisoned").clone()
    }
}

impl EventSink for SharedRecordingSink {
    fn on_event(&mut self, event: &EngineEvent) {
        self.0.lock().expect("recording sink mutex poisoned").push(event.clone());
    }
}
