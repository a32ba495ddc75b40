use std::collections::HashMap;

use avdecc_helpers::{Awaiting, Expired, RetryPolicy, SequenceIds};
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::events::{Event, Outbox};
use crate::{
    AecpMessageType, Aecpdu, AemAecpdu, AemCommandType, AemStatus, ControlPdu, EntityId, Error,
    ErrorKind, MacAddress, Result, SequenceId, VuAecpdu,
};

/// Answers AEM commands addressed to the local entity.
///
/// Returns the response status and payload. Entity and controller availability and the
/// unsolicited notification registrations are answered without consulting the handler.
pub trait AemCommandHandler: Send + 'static {
    fn handle_command(&mut self, command: &AemAecpdu) -> (AemStatus, Vec<u8>);
}

impl<F> AemCommandHandler for F
where
    F: FnMut(&AemAecpdu) -> (AemStatus, Vec<u8>) + Send + 'static,
{
    fn handle_command(&mut self, command: &AemAecpdu) -> (AemStatus, Vec<u8>) {
        self(command)
    }
}

type Waiter = oneshot::Sender<Result<Aecpdu>>;

pub(crate) struct AecpStateMachine {
    local_entity_id: EntityId,
    policy: RetryPolicy,
    inflight: Awaiting<(EntityId, SequenceId), Aecpdu, Waiter>,
    sequence_ids: SequenceIds<EntityId>,
    handler: Option<Box<dyn AemCommandHandler>>,
    /// Controllers registered for unsolicited notifications.
    controllers: HashMap<EntityId, MacAddress>,
    notification_ids: SequenceIds<EntityId>,
}

impl AecpStateMachine {
    pub(crate) fn new(local_entity_id: EntityId, policy: RetryPolicy) -> Self {
        Self {
            local_entity_id,
            policy,
            inflight: Awaiting::new(),
            sequence_ids: SequenceIds::new(),
            handler: None,
            controllers: HashMap::new(),
            notification_ids: SequenceIds::new(),
        }
    }

    pub(crate) fn set_local_entity_id(&mut self, entity_id: EntityId) {
        self.local_entity_id = entity_id;
    }

    pub(crate) fn set_handler(&mut self, handler: Option<Box<dyn AemCommandHandler>>) {
        self.handler = handler;
    }

    /// Sends `command` to `dest_address`, filling in the controller and sequence IDs.
    /// `waiter` is completed once the command resolves.
    pub(crate) fn send_command(
        &mut self,
        mut command: Aecpdu,
        dest_address: MacAddress,
        waiter: Waiter,
        now: Instant,
        outbox: &mut Outbox,
    ) {
        let target = command.header().target_entity_id;
        let inflight = &self.inflight;
        let sequence_id = match self
            .sequence_ids
            .next(&target, |id| inflight.contains(&(target, id)))
        {
            Some(sequence_id) => sequence_id,
            None => {
                let _ = waiter.send(Err(ErrorKind::SequenceIdsExhausted(target).into()));
                return;
            }
        };

        let header = command.header_mut();
        header.controller_entity_id = self.local_entity_id;
        header.sequence_id = sequence_id;
        command.ether2_mut().dest_address = dest_address;

        debug!(
            "aecp: sending {:?} to {} (sequence ID {})",
            command.header().message_type,
            target,
            sequence_id
        );
        match self
            .inflight
            .register((target, sequence_id), command.clone(), waiter, self.policy, now)
        {
            Ok(()) => outbox.send(command),
            Err((_, waiter)) => {
                let _ = waiter.send(Err(ErrorKind::SequenceIdsExhausted(target).into()));
            }
        }
    }

    pub(crate) fn process(&mut self, pdu: Aecpdu, now: Instant, outbox: &mut Outbox) {
        let is_local = pdu.header().target_entity_id == self.local_entity_id;
        let message_type = pdu.header().message_type;
        match message_type {
            AecpMessageType::AemResponse | AecpMessageType::VendorUniqueResponse => {
                self.process_response(pdu, now, outbox)
            }
            AecpMessageType::AemCommand if is_local => {
                if let Aecpdu::Aem(command) = pdu {
                    self.answer_command(&command, outbox);
                }
            }
            AecpMessageType::VendorUniqueCommand if is_local => {
                if let Aecpdu::VendorUnique(command) = pdu {
                    debug!(
                        "aecp: vendor unique command from {}",
                        command.header.controller_entity_id
                    );
                    outbox.send(VuAecpdu::response_to(&command, AemStatus::NotImplemented));
                }
            }
            _ => {}
        }
    }

    fn process_response(&mut self, response: Aecpdu, now: Instant, outbox: &mut Outbox) {
        let header = response.header().clone();
        if header.controller_entity_id != self.local_entity_id {
            return;
        }

        if let Aecpdu::Aem(aem) = &response {
            if aem.unsolicited {
                debug!(
                    "aecp: unsolicited {} from {}",
                    aem.command_type, header.target_entity_id
                );
                outbox.emit(Event::UnsolicitedNotification(aem.clone()));
                return;
            }
        }

        let id = (header.target_entity_id, header.sequence_id);
        let expected = match self.inflight.get(&id) {
            Some(entry) => entry.command.header().message_type.response(),
            None => {
                debug!(
                    "aecp: unexpected response from {} (sequence ID {})",
                    header.target_entity_id, header.sequence_id
                );
                return;
            }
        };
        if expected != header.message_type {
            warn!(
                "aecp: {:?} from {} does not answer a {:?}",
                header.message_type, header.target_entity_id, expected
            );
            return;
        }

        if header.status == AemStatus::InProgress
            && header.message_type == AecpMessageType::AemResponse
        {
            trace!("aecp: {} still in progress", header.target_entity_id);
            self.inflight.restart_timer(&id, now);
            return;
        }

        if let Some(entry) = self.inflight.deregister(&id) {
            let result = match header.status {
                AemStatus::Success => Ok(response),
                status => Err(ErrorKind::AemStatus(status).into()),
            };
            let _ = entry.waiter.send(result);
        }
    }

    /// Entity side: answers an AEM command addressed to the local entity.
    fn answer_command(&mut self, command: &AemAecpdu, outbox: &mut Outbox) {
        let controller = command.header.controller_entity_id;
        let status = match command.command_type {
            AemCommandType::EntityAvailable | AemCommandType::ControllerAvailable => {
                AemStatus::Success
            }
            AemCommandType::RegisterUnsolicitedNotification => {
                info!("aecp: {} registered for notifications", controller);
                self.controllers
                    .insert(controller, command.ether2.src_address);
                AemStatus::Success
            }
            AemCommandType::DeregisterUnsolicitedNotification => {
                info!("aecp: {} deregistered from notifications", controller);
                self.controllers.remove(&controller);
                AemStatus::Success
            }
            _ => {
                let (status, payload) = match self.handler.as_mut() {
                    Some(handler) => handler.handle_command(command),
                    None => (AemStatus::NotImplemented, command.payload().to_vec()),
                };
                let mut response = AemAecpdu::response_to(command, status);
                if let Err(error) = response.set_payload(payload) {
                    warn!("aecp: dropping {} response payload: {}", command.command_type, error);
                    response = AemAecpdu::response_to(command, AemStatus::NoResources);
                }
                outbox.send(response);
                return;
            }
        };
        outbox.send(AemAecpdu::response_to(command, status));
    }

    /// Sends an unsolicited response to every registered controller.
    pub(crate) fn send_unsolicited_notification(
        &mut self,
        command_type: AemCommandType,
        payload: Vec<u8>,
        outbox: &mut Outbox,
    ) -> Result<usize> {
        let mut template = AemAecpdu::new(command_type);
        template.header.message_type = AecpMessageType::AemResponse;
        template.header.target_entity_id = self.local_entity_id;
        template.unsolicited = true;
        template.set_payload(payload)?;

        for (controller, mac_address) in &self.controllers {
            let mut notification = template.clone();
            notification.ether2.dest_address = *mac_address;
            notification.header.controller_entity_id = *controller;
            notification.header.sequence_id = self
                .notification_ids
                .next(controller, |_| false)
                .unwrap_or_default();
            outbox.send(notification);
        }
        Ok(self.controllers.len())
    }

    /// Retransmits or times out the commands whose deadline passed.
    pub(crate) fn expire(&mut self, now: Instant, outbox: &mut Outbox) {
        for ((target, sequence_id), _) in self
            .inflight
            .remove_where(|_, entry| entry.waiter.is_closed())
        {
            debug!(
                "aecp: command to {} (sequence ID {}) abandoned by caller",
                target, sequence_id
            );
        }

        for expired in self.inflight.expire(now) {
            match expired {
                Expired::Retry {
                    id: (target, sequence_id),
                    command,
                } => {
                    debug!("aecp: retrying {} (sequence ID {})", target, sequence_id);
                    outbox.send(command);
                }
                Expired::Exhausted {
                    id: (target, sequence_id),
                    entry,
                } => {
                    warn!("aecp: {} timed out (sequence ID {})", target, sequence_id);
                    let _ = entry.waiter.send(Err(Error {
                        kind: ErrorKind::Timeout,
                    }));
                }
            }
        }
    }

    pub(crate) fn next_deadline(&self) -> Option<Instant> {
        self.inflight.next_deadline()
    }

    /// Cancels the commands sent to an entity that went offline.
    pub(crate) fn cancel_target(&mut self, entity_id: EntityId) {
        for (_, entry) in self
            .inflight
            .remove_where(|(target, _), _| *target == entity_id)
        {
            let _ = entry.waiter.send(Err(ErrorKind::Cancelled.into()));
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, entry) in self.inflight.drain() {
            let _ = entry.waiter.send(Err(ErrorKind::Cancelled.into()));
        }
    }
}
