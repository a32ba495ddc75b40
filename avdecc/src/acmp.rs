use std::collections::HashMap;

use avdecc_helpers::{Awaiting, Expired, SequenceIds};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::events::{Event, Outbox};
use crate::{
    AcmpConfig, AcmpMessageType, AcmpStatus, Acmpdu, EntityId, ErrorKind, MacAddress, Result,
    SequenceId, StreamIdentification, TalkerStreamConfig, AVDECC_MULTICAST_MAC,
};

/// Connection state reported by an ACMP response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub talker_stream: StreamIdentification,
    pub listener_stream: StreamIdentification,
    pub connection_count: u16,
    pub flags: u16,
    pub stream_id: u64,
    pub stream_dest_address: MacAddress,
    pub stream_vlan_id: u16,
}

impl From<&Acmpdu> for ConnectionInfo {
    fn from(pdu: &Acmpdu) -> Self {
        Self {
            talker_stream: pdu.talker_stream(),
            listener_stream: pdu.listener_stream(),
            connection_count: pdu.connection_count,
            flags: pdu.flags,
            stream_id: pdu.stream_id,
            stream_dest_address: pdu.stream_dest_address,
            stream_vlan_id: pdu.stream_vlan_id,
        }
    }
}

pub(crate) enum AcmpWaiter {
    /// A command of the local controller.
    Controller(oneshot::Sender<Result<Acmpdu>>),
    /// A talker command the local listener issued while handling this listener command.
    Listener(Acmpdu),
}

impl AcmpWaiter {
    fn is_closed(&self) -> bool {
        match self {
            AcmpWaiter::Controller(sender) => sender.is_closed(),
            AcmpWaiter::Listener(_) => false,
        }
    }
}

struct TalkerOutput {
    config: TalkerStreamConfig,
    listeners: Vec<StreamIdentification>,
}

#[derive(Clone, Debug)]
struct ListenerBinding {
    talker: StreamIdentification,
    stream_id: u64,
    stream_dest_address: MacAddress,
    stream_vlan_id: u16,
    flags: u16,
}

pub(crate) struct AcmpStateMachine {
    local_entity_id: EntityId,
    config: AcmpConfig,
    inflight: Awaiting<(EntityId, SequenceId), Acmpdu, AcmpWaiter>,
    sequence_ids: SequenceIds<EntityId>,
    /// Listener inputs known to be bound, and the talker output they are bound to.
    connections: HashMap<StreamIdentification, StreamIdentification>,
    talker_counts: HashMap<StreamIdentification, u16>,
    talker_outputs: Vec<TalkerOutput>,
    listener_sinks: Vec<Option<ListenerBinding>>,
}

impl AcmpStateMachine {
    pub(crate) fn new(
        local_entity_id: EntityId,
        config: AcmpConfig,
        talker_streams: &[TalkerStreamConfig],
        listener_sinks: u16,
    ) -> Self {
        Self {
            local_entity_id,
            config,
            inflight: Awaiting::new(),
            sequence_ids: SequenceIds::new(),
            connections: HashMap::new(),
            talker_counts: HashMap::new(),
            talker_outputs: talker_streams
                .iter()
                .map(|config| TalkerOutput {
                    config: config.clone(),
                    listeners: Vec::new(),
                })
                .collect(),
            listener_sinks: vec![None; usize::from(listener_sinks)],
        }
    }

    pub(crate) fn set_local_entity_id(&mut self, entity_id: EntityId) {
        self.local_entity_id = entity_id;
    }

    /// Number of listeners known to be bound to `talker`.
    pub(crate) fn connection_count(&self, talker: &StreamIdentification) -> u16 {
        self.talker_counts.get(talker).copied().unwrap_or(0)
    }

    /// Sends a controller command, unless the known connection state already rules it out.
    pub(crate) fn send_command(
        &mut self,
        mut command: Acmpdu,
        waiter: oneshot::Sender<Result<Acmpdu>>,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        let listener = command.listener_stream();
        let talker = command.talker_stream();
        let refused = match command.message_type {
            AcmpMessageType::ConnectRxCommand => self
                .connections
                .get(&listener)
                .map(|bound| ErrorKind::AlreadyConnected {
                    listener,
                    talker: *bound,
                }),
            AcmpMessageType::DisconnectRxCommand if !self.connections.contains_key(&listener) => {
                Some(ErrorKind::NotConnected(listener))
            }
            AcmpMessageType::DisconnectTxCommand
                if self.connections.get(&listener) != Some(&talker) =>
            {
                Some(ErrorKind::NotConnected(talker))
            }
            _ => None,
        };
        if let Some(kind) = refused {
            debug!("acmp: refusing {:?}: {}", command.message_type, kind);
            let _ = waiter.send(Err(kind.into()));
            return;
        }

        command.controller_entity_id = self.local_entity_id;
        command.ether2.dest_address = AVDECC_MULTICAST_MAC;
        self.issue(command, AcmpWaiter::Controller(waiter), now, outbox);
    }

    fn issue(
        &mut self,
        mut command: Acmpdu,
        waiter: AcmpWaiter,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        let target = command.target_entity_id();
        let inflight = &self.inflight;
        let sequence_id = match self
            .sequence_ids
            .next(&target, |id| inflight.contains(&(target, id)))
        {
            Some(sequence_id) => sequence_id,
            None => {
                self.fail(waiter, ErrorKind::SequenceIdsExhausted(target), outbox);
                return;
            }
        };
        command.sequence_id = sequence_id;

        debug!(
            "acmp: sending {:?} to {} (sequence ID {})",
            command.message_type, target, sequence_id
        );
        let policy = self.config.policy(command.message_type);
        match self
            .inflight
            .register((target, sequence_id), command.clone(), waiter, policy, now)
        {
            Ok(()) => outbox.send(command),
            Err((_, waiter)) => self.fail(waiter, ErrorKind::SequenceIdsExhausted(target), outbox),
        }
    }

    /// Resolves a waiter without a response.
    fn fail(&self, waiter: AcmpWaiter, kind: ErrorKind, outbox: &mut Outbox) {
        match waiter {
            AcmpWaiter::Controller(sender) => {
                let _ = sender.send(Err(kind.into()));
            }
            AcmpWaiter::Listener(original) => {
                debug!("acmp: {:?} failed: {}", original.message_type, kind);
                outbox.send(Acmpdu::response_to(
                    &original,
                    AcmpStatus::ListenerTalkerTimeout,
                ));
            }
        }
    }

    pub(crate) fn process(&mut self, pdu: Acmpdu, now: Instant, outbox: &mut Outbox) {
        if pdu.message_type.is_response() {
            self.process_response(pdu, outbox);
            return;
        }

        let message_type = pdu.message_type;
        match message_type {
            AcmpMessageType::ConnectTxCommand
            | AcmpMessageType::DisconnectTxCommand
            | AcmpMessageType::GetTxStateCommand
            | AcmpMessageType::GetTxConnectionCommand
                if pdu.talker_entity_id == self.local_entity_id =>
            {
                self.process_talker_command(&pdu, outbox)
            }
            AcmpMessageType::ConnectRxCommand
            | AcmpMessageType::DisconnectRxCommand
            | AcmpMessageType::GetRxStateCommand
                if pdu.listener_entity_id == self.local_entity_id =>
            {
                self.process_listener_command(pdu, now, outbox)
            }
            _ => {}
        }
    }

    fn process_response(&mut self, response: Acmpdu, outbox: &mut Outbox) {
        if response.status == AcmpStatus::Success {
            self.track_connection(&response);
        }

        let id = (response.target_entity_id(), response.sequence_id);
        let matches = match self.inflight.get(&id) {
            Some(entry) => {
                let command = &entry.command;
                // GET_TX_CONNECTION responses name the listener found by the talker.
                let same_listener = response.message_type
                    == AcmpMessageType::GetTxConnectionResponse
                    || command.listener_stream() == response.listener_stream();
                command.message_type.response() == response.message_type
                    && command.controller_entity_id == response.controller_entity_id
                    && same_listener
            }
            None => false,
        };
        if !matches {
            trace!(
                "acmp: {:?} from {} is not ours (sequence ID {})",
                response.message_type,
                id.0,
                response.sequence_id
            );
            outbox.emit(Event::AcmpResponseSniffed(response));
            return;
        }

        let entry = match self.inflight.deregister(&id) {
            Some(entry) => entry,
            None => return,
        };
        match entry.waiter {
            AcmpWaiter::Controller(sender) => {
                let result = match response.status {
                    AcmpStatus::Success => Ok(response),
                    status => Err(ErrorKind::AcmpStatus(status).into()),
                };
                let _ = sender.send(result);
            }
            AcmpWaiter::Listener(original) => {
                self.complete_listener_command(&original, &response, outbox)
            }
        }
    }

    /// Keeps the controller's view of the connections in step with successful responses,
    /// including those to other controllers.
    fn track_connection(&mut self, response: &Acmpdu) {
        let listener = response.listener_stream();
        let talker = response.talker_stream();
        match response.message_type {
            AcmpMessageType::ConnectRxResponse | AcmpMessageType::ConnectTxResponse => {
                if let Some(previous) = self.connections.insert(listener, talker) {
                    if previous == talker {
                        return;
                    }
                    self.decrement(&previous);
                }
                *self.talker_counts.entry(talker).or_insert(0) += 1;
                info!(
                    "acmp: {} connected to {} ({} listeners)",
                    listener,
                    talker,
                    self.connection_count(&talker)
                );
            }
            AcmpMessageType::DisconnectRxResponse | AcmpMessageType::DisconnectTxResponse => {
                if let Some(previous) = self.connections.remove(&listener) {
                    self.decrement(&previous);
                    info!("acmp: {} disconnected from {}", listener, previous);
                }
            }
            _ => {}
        }
    }

    fn decrement(&mut self, talker: &StreamIdentification) {
        if let Some(count) = self.talker_counts.get_mut(talker) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.talker_counts.remove(talker);
            }
        }
    }

    fn process_talker_command(&mut self, command: &Acmpdu, outbox: &mut Outbox) {
        let index = usize::from(command.talker_unique_id);
        let output = match self.talker_outputs.get_mut(index) {
            Some(output) => output,
            None => {
                outbox.send(Acmpdu::response_to(command, AcmpStatus::TalkerUnknownId));
                return;
            }
        };

        let listener = command.listener_stream();
        let mut status = AcmpStatus::Success;
        let mut response = Acmpdu::response_to(command, status);
        match command.message_type {
            AcmpMessageType::ConnectTxCommand => {
                if !output.listeners.contains(&listener) {
                    output.listeners.push(listener);
                }
                debug!(
                    "acmp: talker output {} has {} listeners",
                    index,
                    output.listeners.len()
                );
            }
            AcmpMessageType::DisconnectTxCommand => {
                output.listeners.retain(|bound| *bound != listener);
            }
            AcmpMessageType::GetTxConnectionCommand => {
                match output.listeners.get(usize::from(command.connection_count)) {
                    Some(bound) => {
                        response.listener_entity_id = bound.entity_id;
                        response.listener_unique_id = bound.stream_index;
                    }
                    None => status = AcmpStatus::NoSuchConnection,
                }
            }
            _ => {}
        }

        response.status = status;
        response.stream_id = output.config.stream_id;
        response.stream_dest_address = output.config.stream_dest_address;
        response.stream_vlan_id = output.config.stream_vlan_id;
        response.connection_count = output.listeners.len() as u16;
        outbox.send(response);
    }

    fn process_listener_command(&mut self, command: Acmpdu, now: Instant, outbox: &mut Outbox) {
        let index = usize::from(command.listener_unique_id);
        let binding = match self.listener_sinks.get(index) {
            Some(binding) => binding.clone(),
            None => {
                outbox.send(Acmpdu::response_to(&command, AcmpStatus::ListenerUnknownId));
                return;
            }
        };

        let listener = command.listener_stream();
        if self.is_forwarding(&listener)
            && matches!(
                command.message_type,
                AcmpMessageType::ConnectRxCommand | AcmpMessageType::DisconnectRxCommand
            )
        {
            trace!("acmp: {} is already waiting for its talker", listener);
            return;
        }

        match command.message_type {
            AcmpMessageType::ConnectRxCommand => {
                if let Some(bound) = &binding {
                    if bound.talker != command.talker_stream() {
                        outbox.send(Acmpdu::response_to(&command, AcmpStatus::ListenerExclusive));
                        return;
                    }
                }
                let forward = Acmpdu {
                    message_type: AcmpMessageType::ConnectTxCommand,
                    ..Acmpdu::response_to(&command, AcmpStatus::Success)
                };
                self.issue(forward, AcmpWaiter::Listener(command), now, outbox);
            }
            AcmpMessageType::DisconnectRxCommand => {
                let bound = match binding {
                    Some(bound) => bound,
                    None => {
                        outbox.send(Acmpdu::response_to(&command, AcmpStatus::NotConnected));
                        return;
                    }
                };
                self.listener_sinks[index] = None;
                let forward = Acmpdu {
                    message_type: AcmpMessageType::DisconnectTxCommand,
                    talker_entity_id: bound.talker.entity_id,
                    talker_unique_id: bound.talker.stream_index,
                    ..Acmpdu::response_to(&command, AcmpStatus::Success)
                };
                self.issue(forward, AcmpWaiter::Listener(command), now, outbox);
            }
            AcmpMessageType::GetRxStateCommand => {
                let mut response = Acmpdu::response_to(&command, AcmpStatus::Success);
                match binding {
                    Some(bound) => {
                        response.talker_entity_id = bound.talker.entity_id;
                        response.talker_unique_id = bound.talker.stream_index;
                        response.stream_id = bound.stream_id;
                        response.stream_dest_address = bound.stream_dest_address;
                        response.stream_vlan_id = bound.stream_vlan_id;
                        response.flags = bound.flags;
                        response.connection_count = 1;
                    }
                    None => {
                        response.talker_entity_id = EntityId::NULL;
                        response.talker_unique_id = 0;
                        response.stream_id = 0;
                        response.stream_dest_address = MacAddress::ZERO;
                        response.stream_vlan_id = 0;
                        response.connection_count = 0;
                    }
                }
                outbox.send(response);
            }
            _ => {}
        }
    }

    fn is_forwarding(&self, listener: &StreamIdentification) -> bool {
        self.inflight.iter().any(|(_, entry)| match &entry.waiter {
            AcmpWaiter::Listener(original) => original.listener_stream() == *listener,
            AcmpWaiter::Controller(_) => false,
        })
    }

    /// Answers a listener command once the talker responded.
    fn complete_listener_command(
        &mut self,
        original: &Acmpdu,
        talker: &Acmpdu,
        outbox: &mut Outbox,
    ) {
        let mut response = Acmpdu::response_to(original, talker.status);
        response.stream_id = talker.stream_id;
        response.stream_dest_address = talker.stream_dest_address;
        response.stream_vlan_id = talker.stream_vlan_id;
        response.connection_count = talker.connection_count;

        if original.message_type == AcmpMessageType::ConnectRxCommand
            && talker.status == AcmpStatus::Success
        {
            let index = usize::from(original.listener_unique_id);
            if let Some(sink) = self.listener_sinks.get_mut(index) {
                *sink = Some(ListenerBinding {
                    talker: original.talker_stream(),
                    stream_id: talker.stream_id,
                    stream_dest_address: talker.stream_dest_address,
                    stream_vlan_id: talker.stream_vlan_id,
                    flags: original.flags,
                });
            }
            info!(
                "acmp: listener {} bound to {}",
                original.listener_stream(),
                original.talker_stream()
            );
        }
        outbox.send(response);
    }

    pub(crate) fn expire(&mut self, now: Instant, outbox: &mut Outbox) {
        for ((target, sequence_id), _) in self
            .inflight
            .remove_where(|_, entry| entry.waiter.is_closed())
        {
            debug!(
                "acmp: command to {} (sequence ID {}) abandoned by caller",
                target, sequence_id
            );
        }

        for expired in self.inflight.expire(now) {
            match expired {
                Expired::Retry {
                    id: (target, sequence_id),
                    command,
                } => {
                    debug!("acmp: retrying {} (sequence ID {})", target, sequence_id);
                    outbox.send(command);
                }
                Expired::Exhausted {
                    id: (target, sequence_id),
                    entry,
                } => {
                    warn!("acmp: {} timed out (sequence ID {})", target, sequence_id);
                    self.fail(entry.waiter, ErrorKind::Timeout, outbox);
                }
            }
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.inflight.next_deadline()
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, entry) in self.inflight.drain() {
            if let AcmpWaiter::Controller(sender) = entry.waiter {
                let _ = sender.send(Err(ErrorKind::Cancelled.into()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{Error, Pdu};

    const CONTROLLER: EntityId = EntityId(0x0000_0000_0000_00C0);
    const TALKER: EntityId = EntityId(0x0000_0000_0000_00A1);
    const OTHER_TALKER: EntityId = EntityId(0x0000_0000_0000_00A2);
    const LISTENER: EntityId = EntityId(0x0000_0000_0000_00B1);

    fn controller() -> AcmpStateMachine {
        AcmpStateMachine::new(CONTROLLER, AcmpConfig::default(), &[], 0)
    }

    fn command(message_type: AcmpMessageType, talker: EntityId) -> Acmpdu {
        Acmpdu {
            message_type,
            talker_entity_id: talker,
            listener_entity_id: LISTENER,
            ..Default::default()
        }
    }

    fn sent(outbox: &mut Outbox) -> Vec<Acmpdu> {
        outbox
            .pdus
            .drain(..)
            .map(|pdu| match pdu {
                Pdu::Acmp(pdu) => pdu,
                other => panic!("unexpected {:?}", other),
            })
            .collect()
    }

    /// Sends a controller command and answers it with `status`.
    fn round_trip(
        acmp: &mut AcmpStateMachine,
        command: Acmpdu,
        status: AcmpStatus,
    ) -> Result<Acmpdu> {
        let now = Instant::now();
        let mut outbox = Outbox::default();
        let (tx, mut rx) = oneshot::channel();
        acmp.send_command(command, tx, now, &mut outbox);
        for sent in sent(&mut outbox) {
            acmp.process(Acmpdu::response_to(&sent, status), now, &mut outbox);
        }
        rx.try_recv().unwrap()
    }

    #[test]
    fn connect_is_refused_while_bound() {
        let mut acmp = controller();
        round_trip(
            &mut acmp,
            command(AcmpMessageType::ConnectRxCommand, TALKER),
            AcmpStatus::Success,
        )
        .unwrap();
        assert_eq!(
            acmp.connection_count(&StreamIdentification::new(TALKER, 0)),
            1
        );

        let mut outbox = Outbox::default();
        let (tx, mut rx) = oneshot::channel();
        acmp.send_command(
            command(AcmpMessageType::ConnectRxCommand, OTHER_TALKER),
            tx,
            Instant::now(),
            &mut outbox,
        );
        assert!(outbox.pdus.is_empty());
        match rx.try_recv().unwrap() {
            Err(Error {
                kind: ErrorKind::AlreadyConnected { talker, .. },
            }) => assert_eq!(talker, StreamIdentification::new(TALKER, 0)),
            other => panic!("unexpected {:?}", other),
        }

        round_trip(
            &mut acmp,
            command(AcmpMessageType::DisconnectRxCommand, TALKER),
            AcmpStatus::Success,
        )
        .unwrap();
        let connected = round_trip(
            &mut acmp,
            command(AcmpMessageType::ConnectRxCommand, OTHER_TALKER),
            AcmpStatus::Success,
        )
        .unwrap();
        assert_eq!(connected.talker_entity_id, OTHER_TALKER);
        assert_eq!(
            acmp.connection_count(&StreamIdentification::new(TALKER, 0)),
            0
        );
    }

    #[test]
    fn disconnect_without_connection_is_refused() {
        let mut acmp = controller();
        for message_type in [
            AcmpMessageType::DisconnectRxCommand,
            AcmpMessageType::DisconnectTxCommand,
        ] {
            match round_trip(&mut acmp, command(message_type, TALKER), AcmpStatus::Success) {
                Err(Error {
                    kind: ErrorKind::NotConnected(_),
                }) => {}
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn failures_and_state_queries_leave_the_table_alone() {
        let mut acmp = controller();
        match round_trip(
            &mut acmp,
            command(AcmpMessageType::ConnectRxCommand, TALKER),
            AcmpStatus::ListenerExclusive,
        ) {
            Err(Error {
                kind: ErrorKind::AcmpStatus(AcmpStatus::ListenerExclusive),
            }) => {}
            other => panic!("unexpected {:?}", other),
        }

        let state = round_trip(
            &mut acmp,
            command(AcmpMessageType::GetRxStateCommand, TALKER),
            AcmpStatus::Success,
        )
        .unwrap();
        assert_eq!(state.message_type, AcmpMessageType::GetRxStateResponse);
        assert!(acmp.connections.is_empty());
    }

    #[test]
    fn sniffed_responses_update_the_table() {
        let mut acmp = controller();
        let mut outbox = Outbox::default();

        let mut foreign = command(AcmpMessageType::ConnectRxCommand, TALKER);
        foreign.controller_entity_id = EntityId(0x0BAD);
        let response = Acmpdu::response_to(&foreign, AcmpStatus::Success);
        acmp.process(response.clone(), Instant::now(), &mut outbox);
        acmp.process(response, Instant::now(), &mut outbox);

        assert_eq!(
            acmp.connection_count(&StreamIdentification::new(TALKER, 0)),
            1
        );
        assert!(outbox.pdus.is_empty());
        match outbox.events.as_slice() {
            [Event::AcmpResponseSniffed(first), Event::AcmpResponseSniffed(second)] => {
                assert_eq!(first.message_type, AcmpMessageType::ConnectRxResponse);
                assert_eq!(first.controller_entity_id, EntityId(0x0BAD));
                assert_eq!(first, second);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn answered_commands_are_not_reported_as_sniffed() {
        let mut acmp = controller();
        let now = Instant::now();
        let mut outbox = Outbox::default();
        let (tx, mut rx) = oneshot::channel();
        acmp.send_command(
            command(AcmpMessageType::GetRxStateCommand, TALKER),
            tx,
            now,
            &mut outbox,
        );
        let sent = sent(&mut outbox).remove(0);
        acmp.process(
            Acmpdu::response_to(&sent, AcmpStatus::Success),
            now,
            &mut outbox,
        );

        assert!(rx.try_recv().unwrap().is_ok());
        assert!(outbox.is_empty());
    }

    #[test]
    fn disconnect_tx_needs_the_exact_pair() {
        let mut acmp = controller();
        let mut outbox = Outbox::default();
        // Listener 0 is bound to talker output 0, by another controller.
        let mut foreign = command(AcmpMessageType::ConnectRxCommand, TALKER);
        foreign.controller_entity_id = EntityId(0x0BAD);
        acmp.process(
            Acmpdu::response_to(&foreign, AcmpStatus::Success),
            Instant::now(),
            &mut outbox,
        );
        outbox.events.clear();

        let mut other_listener = command(AcmpMessageType::DisconnectTxCommand, TALKER);
        other_listener.listener_unique_id = 1;
        let mut other_talker = command(AcmpMessageType::DisconnectTxCommand, TALKER);
        other_talker.talker_unique_id = 1;
        for refused in [other_listener, other_talker] {
            let talker = refused.talker_stream();
            let (tx, mut rx) = oneshot::channel();
            acmp.send_command(refused, tx, Instant::now(), &mut outbox);
            assert!(outbox.is_empty());
            match rx.try_recv().unwrap() {
                Err(Error {
                    kind: ErrorKind::NotConnected(refused),
                }) => assert_eq!(refused, talker),
                other => panic!("unexpected {:?}", other),
            }
        }

        let info = round_trip(
            &mut acmp,
            command(AcmpMessageType::DisconnectTxCommand, TALKER),
            AcmpStatus::Success,
        )
        .unwrap();
        assert_eq!(info.message_type, AcmpMessageType::DisconnectTxResponse);
        assert!(acmp.connections.is_empty());
    }

    #[test]
    fn retries_then_times_out() {
        let start = Instant::now();
        let mut acmp = AcmpStateMachine::new(
            CONTROLLER,
            AcmpConfig::uniform(Duration::from_millis(100), 2),
            &[],
            0,
        );
        let mut outbox = Outbox::default();
        let (tx, mut rx) = oneshot::channel();
        acmp.send_command(
            command(AcmpMessageType::GetTxStateCommand, TALKER),
            tx,
            start,
            &mut outbox,
        );
        let original = sent(&mut outbox).remove(0);
        assert_eq!(original.controller_entity_id, CONTROLLER);

        for retry in 1..=2u32 {
            acmp.expire(start + Duration::from_millis(100) * retry, &mut outbox);
            assert_eq!(sent(&mut outbox), vec![original.clone()]);
        }
        acmp.expire(start + Duration::from_millis(300), &mut outbox);
        match rx.try_recv().unwrap() {
            Err(Error {
                kind: ErrorKind::Timeout,
            }) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    fn talker() -> AcmpStateMachine {
        let stream = TalkerStreamConfig {
            stream_id: 0x0011_2233_4455_0000,
            stream_dest_address: MacAddress([0x91, 0xe0, 0xf0, 0x00, 0x01, 0x00]),
            stream_vlan_id: 2,
        };
        AcmpStateMachine::new(TALKER, AcmpConfig::default(), &[stream], 0)
    }

    #[test]
    fn talker_tracks_its_listeners() {
        let now = Instant::now();
        let mut acmp = talker();
        let mut outbox = Outbox::default();

        let connect = command(AcmpMessageType::ConnectTxCommand, TALKER);
        acmp.process(connect.clone(), now, &mut outbox);
        acmp.process(connect, now, &mut outbox);
        let mut unknown = command(AcmpMessageType::ConnectTxCommand, TALKER);
        unknown.talker_unique_id = 3;
        acmp.process(unknown, now, &mut outbox);

        let responses = sent(&mut outbox);
        assert_eq!(responses[1].message_type, AcmpMessageType::ConnectTxResponse);
        assert_eq!(responses[1].status, AcmpStatus::Success);
        assert_eq!(responses[1].connection_count, 1);
        assert_eq!(responses[1].stream_id, 0x0011_2233_4455_0000);
        assert_eq!(responses[1].stream_vlan_id, 2);
        assert_eq!(responses[2].status, AcmpStatus::TalkerUnknownId);

        let mut query = command(AcmpMessageType::GetTxConnectionCommand, TALKER);
        acmp.process(query.clone(), now, &mut outbox);
        query.connection_count = 1;
        acmp.process(query, now, &mut outbox);
        acmp.process(
            command(AcmpMessageType::DisconnectTxCommand, TALKER),
            now,
            &mut outbox,
        );

        let responses = sent(&mut outbox);
        assert_eq!(responses[0].listener_entity_id, LISTENER);
        assert_eq!(responses[1].status, AcmpStatus::NoSuchConnection);
        assert_eq!(responses[2].status, AcmpStatus::Success);
        assert_eq!(responses[2].connection_count, 0);
    }

    fn listener() -> AcmpStateMachine {
        AcmpStateMachine::new(LISTENER, AcmpConfig::default(), &[], 1)
    }

    fn from_controller(message_type: AcmpMessageType, talker: EntityId) -> Acmpdu {
        Acmpdu {
            controller_entity_id: CONTROLLER,
            sequence_id: 7,
            ..command(message_type, talker)
        }
    }

    #[test]
    fn listener_connects_through_the_talker() {
        let now = Instant::now();
        let mut acmp = listener();
        let mut outbox = Outbox::default();

        acmp.process(
            from_controller(AcmpMessageType::ConnectRxCommand, TALKER),
            now,
            &mut outbox,
        );
        let forwarded = sent(&mut outbox).remove(0);
        assert_eq!(forwarded.message_type, AcmpMessageType::ConnectTxCommand);
        assert_eq!(forwarded.controller_entity_id, CONTROLLER);
        assert_eq!(forwarded.talker_entity_id, TALKER);

        // A retry from the controller while the talker has not answered yet.
        acmp.process(
            from_controller(AcmpMessageType::ConnectRxCommand, TALKER),
            now,
            &mut outbox,
        );
        assert!(outbox.pdus.is_empty());

        let mut talker_response = Acmpdu::response_to(&forwarded, AcmpStatus::Success);
        talker_response.stream_id = 0x42;
        talker_response.connection_count = 1;
        acmp.process(talker_response, now, &mut outbox);

        let response = sent(&mut outbox).remove(0);
        assert_eq!(response.message_type, AcmpMessageType::ConnectRxResponse);
        assert_eq!(response.status, AcmpStatus::Success);
        assert_eq!(response.sequence_id, 7);
        assert_eq!(response.stream_id, 0x42);

        acmp.process(
            from_controller(AcmpMessageType::ConnectRxCommand, OTHER_TALKER),
            now,
            &mut outbox,
        );
        acmp.process(
            from_controller(AcmpMessageType::GetRxStateCommand, OTHER_TALKER),
            now,
            &mut outbox,
        );
        let responses = sent(&mut outbox);
        assert_eq!(responses[0].status, AcmpStatus::ListenerExclusive);
        assert_eq!(responses[1].status, AcmpStatus::Success);
        assert_eq!(responses[1].talker_entity_id, TALKER);
        assert_eq!(responses[1].stream_id, 0x42);
    }

    #[test]
    fn listener_reports_a_silent_talker() {
        let start = Instant::now();
        let mut acmp = listener();
        let mut outbox = Outbox::default();

        acmp.process(
            from_controller(AcmpMessageType::ConnectRxCommand, TALKER),
            start,
            &mut outbox,
        );
        outbox.pdus.clear();

        let timeout = AcmpConfig::default().connect_tx;
        acmp.expire(start + timeout, &mut outbox);
        assert_eq!(sent(&mut outbox).len(), 1);
        acmp.expire(start + timeout * 2, &mut outbox);

        let response = sent(&mut outbox).remove(0);
        assert_eq!(response.message_type, AcmpMessageType::ConnectRxResponse);
        assert_eq!(response.status, AcmpStatus::ListenerTalkerTimeout);
        assert_eq!(response.sequence_id, 7);
    }

    #[test]
    fn listener_commands_for_unknown_or_unbound_sinks() {
        let now = Instant::now();
        let mut acmp = listener();
        let mut outbox = Outbox::default();

        let mut unknown = from_controller(AcmpMessageType::ConnectRxCommand, TALKER);
        unknown.listener_unique_id = 1;
        acmp.process(unknown, now, &mut outbox);
        acmp.process(
            from_controller(AcmpMessageType::DisconnectRxCommand, TALKER),
            now,
            &mut outbox,
        );
        acmp.process(
            from_controller(AcmpMessageType::GetRxStateCommand, TALKER),
            now,
            &mut outbox,
        );

        let responses = sent(&mut outbox);
        assert_eq!(responses[0].status, AcmpStatus::ListenerUnknownId);
        assert_eq!(responses[1].status, AcmpStatus::NotConnected);
        assert_eq!(responses[2].status, AcmpStatus::Success);
        assert_eq!(responses[2].talker_entity_id, EntityId::NULL);
        assert_eq!(responses[2].connection_count, 0);
    }
}
