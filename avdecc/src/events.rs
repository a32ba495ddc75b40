use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio::sync::mpsc;

use crate::{Acmpdu, AemAecpdu, DiscoveredEntity, EntityId, Pdu};

/// Something a `ProtocolInterface` observed on the network.
#[derive(Clone, Debug)]
pub enum Event {
    EntityOnline(DiscoveredEntity),
    /// Capabilities or gPTP information of a known entity changed.
    EntityUpdated(DiscoveredEntity),
    EntityOffline(EntityId),
    UnsolicitedNotification(AemAecpdu),
    /// An ACMP response that answered none of this interface's commands, typically one
    /// addressed to another controller.
    AcmpResponseSniffed(Acmpdu),
    TransportError(String),
}

/// PDUs to transmit and events to publish, collected while a state machine handles one input.
#[derive(Debug, Default)]
pub(crate) struct Outbox {
    pub(crate) pdus: Vec<Pdu>,
    pub(crate) events: Vec<Event>,
}

impl Outbox {
    pub(crate) fn send<P>(&mut self, pdu: P)
    where
        P: Into<Pdu>,
    {
        self.pdus.push(pdu.into());
    }

    pub(crate) fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pdus.is_empty() && self.events.is_empty()
    }
}

/// Events published after `ProtocolInterface::subscribe` was called. Ends when the interface
/// shuts down.
pub struct EventReader {
    pub(crate) rx: mpsc::UnboundedReceiver<Event>,
}

impl EventReader {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

impl Stream for EventReader {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.rx.poll_recv(cx)
    }
}
