//! Forwarding trip events to an in-process consumer.

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use rd_dispatch::{EventSink, PublishError, TripEvent};

/// One published event: its routing name and a JSON body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventMessage {
    pub name:    String,
    pub payload: serde_json::Value,
}

impl EventMessage {
    pub fn encode(event: &TripEvent) -> Result<Self, PublishError> {
        let payload = serde_json::to_value(event).map_err(|e| PublishError(e.to_string()))?;
        Ok(Self { name: event.name().to_owned(), payload })
    }
}

/// An [`EventSink`] feeding an unbounded channel.  Never blocks; fails only
/// once the receiver is gone.
#[derive(Clone)]
pub struct ChannelEventSink {
    tx: UnboundedSender<EventMessage>,
}

impl ChannelEventSink {
    pub fn channel() -> (Self, UnboundedReceiver<EventMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelEventSink {
    fn publish(&self, event: &TripEvent) -> Result<(), PublishError> {
        let message = EventMessage::encode(event)?;
        self.tx
            .send(message)
            .map_err(|_| PublishError(format!("{} dropped: receiver closed", event.name())))
    }
}
