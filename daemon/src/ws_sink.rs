//! `EventSink` that republishes every engine event as JSON to all
//! connected WebSocket clients: a push stream rather than a request/response
//! pattern, since the engine drives itself off CAN traffic rather than
//! answering one command at a time.

use tokio::sync::broadcast;
use uds_bootloader_engine::{EngineEvent, EventSink};

#[derive(Clone)]
pub struct WsEventSink {
    tx: broadcast::Sender<EngineEvent>,
}

impl WsEventSink {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<EngineEvent>) {
        let (tx, rx) = broadcast::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn sender(&self) -> broadcast::Sender<EngineEvent> {
        self.tx.clone()
    }
}

impl EventSink for WsEventSink {
    fn on_event(&mut self, event: &EngineEvent) {
        // No subscribers is a normal state (daemon started before any
        // browser connected); dropping the event is correct there.
        let _ = self.tx.send(event.clone());
    }
}
