use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};

use crate::acmp::AcmpStateMachine;
use crate::adp::AdpStateMachine;
use crate::aecp::AecpStateMachine;
use crate::events::{Event, EventReader, Outbox};
use crate::transport::{self, FrameReceiver, Transport};
use crate::{
    AcmpMessageType, Acmpdu, Aecpdu, AemAecpdu, AemCommandHandler, AemCommandType, Config,
    ConnectionInfo, DiscoveredEntity, EntityId, ErrorKind, LocalEntityInfo, MacAddress, Pdu,
    ProtocolInterfaceType, Result, StreamIdentification, VuAecpdu,
};

/// Successful response to an AEM command.
pub type AemResponse = AemAecpdu;

/// A message from ProtocolInterface to its Worker task.
enum Request {
    Subscribe(mpsc::UnboundedSender<Event>),
    DiscoveredEntities(oneshot::Sender<Vec<DiscoveredEntity>>),
    EnableAdvertising,
    DisableAdvertising,
    SetEntityInfo(LocalEntityInfo),
    Discover(EntityId),
    Aecp {
        command: Aecpdu,
        sender: oneshot::Sender<Result<Aecpdu>>,
    },
    SetAemHandler(Option<Box<dyn AemCommandHandler>>),
    UnsolicitedNotification {
        command_type: AemCommandType,
        payload: Vec<u8>,
        sender: oneshot::Sender<Result<usize>>,
    },
    Acmp {
        command: Acmpdu,
        sender: oneshot::Sender<Result<Acmpdu>>,
    },
    Shutdown(oneshot::Sender<()>),
}

/// An AVDECC controller (and optionally talker/listener entity) bound to one network interface.
///
/// All protocol state is owned by a task spawned on creation. Dropping the interface, or calling
/// `shutdown`, cancels every command still awaiting a response and stops the task.
pub struct ProtocolInterface {
    requests: mpsc::UnboundedSender<Request>,
    interface_name: String,
    mac_address: MacAddress,
}

impl ProtocolInterface {
    /// Takes ownership of an opened transport. Must be called from within a tokio runtime.
    pub fn new<T>(transport: T, frames: FrameReceiver, config: Config) -> Self
    where
        T: Transport,
    {
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let interface = Self {
            requests: requests_tx,
            interface_name: transport.interface_name().to_string(),
            mac_address: transport.mac_address(),
        };

        let local_entity_id = config.entity.entity_id;
        let worker = Worker {
            transport,
            frames,
            frames_open: true,
            requests: requests_rx,
            subscribers: Vec::new(),
            advertise: config.advertise,
            adp: AdpStateMachine::new(&config),
            aecp: AecpStateMachine::new(local_entity_id, config.aecp),
            acmp: AcmpStateMachine::new(
                local_entity_id,
                config.acmp.clone(),
                &config.talker_streams,
                config.listener_sinks,
            ),
        };
        tokio::spawn(worker.task());

        interface
    }

    /// Opens a system network interface, see `transport::open`.
    pub fn open(kind: ProtocolInterfaceType, name: &str, config: Config) -> Result<Self> {
        let (transport, frames) = transport::open(kind, name)?;
        Ok(Self::new(transport, frames, config))
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn mac_address(&self) -> MacAddress {
        self.mac_address
    }

    fn send(&self, request: Request) -> Result<()> {
        self.requests
            .send(request)
            .map_err(|_| ErrorKind::ChannelError)?;
        Ok(())
    }

    async fn call<T, F>(&self, request: F) -> Result<T>
    where
        F: FnOnce(oneshot::Sender<T>) -> Request,
    {
        let (sender, receiver) = oneshot::channel();
        self.send(request(sender))?;
        let result = receiver.await.map_err(|_| ErrorKind::ChannelError)?;
        Ok(result)
    }

    /// Events observed from now on. The reader ends when the interface shuts down.
    pub fn subscribe(&self) -> EventReader {
        let (tx, rx) = mpsc::unbounded_channel();
        if self.send(Request::Subscribe(tx)).is_err() {
            debug!("{}: subscribing after shutdown", self.interface_name);
        }
        EventReader { rx }
    }

    /// Calls `callback` with every entity that comes online.
    pub fn on_entity_discovered<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(DiscoveredEntity) + Send + 'static,
    {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Event::EntityOnline(entity) = event {
                    callback(entity);
                }
            }
        })
    }

    /// Calls `callback` with every entity that departs or times out.
    pub fn on_entity_departed<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(EntityId) + Send + 'static,
    {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Event::EntityOffline(entity_id) = event {
                    callback(entity_id);
                }
            }
        })
    }

    pub fn on_unsolicited_notification<F>(&self, mut callback: F) -> JoinHandle<()>
    where
        F: FnMut(AemAecpdu) + Send + 'static,
    {
        let mut events = self.subscribe();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let Event::UnsolicitedNotification(notification) = event {
                    callback(notification);
                }
            }
        })
    }

    pub async fn discovered_entities(&self) -> Result<Vec<DiscoveredEntity>> {
        self.call(Request::DiscoveredEntities).await
    }

    pub fn enable_advertising(&self) -> Result<()> {
        self.send(Request::EnableAdvertising)
    }

    pub fn disable_advertising(&self) -> Result<()> {
        self.send(Request::DisableAdvertising)
    }

    /// Changes what the local entity advertises. Its entity ID is also used as the controller ID
    /// of subsequent commands.
    pub fn set_entity_info(&self, info: LocalEntityInfo) -> Result<()> {
        self.send(Request::SetEntityInfo(info))
    }

    pub fn discover_remote_entities(&self) -> Result<()> {
        self.send(Request::Discover(EntityId::NULL))
    }

    pub fn discover_remote_entity(&self, entity_id: EntityId) -> Result<()> {
        self.send(Request::Discover(entity_id))
    }

    async fn send_aecp_command(&self, command: Aecpdu) -> Result<Aecpdu> {
        self.call(|sender| Request::Aecp { command, sender })
            .await?
    }

    /// Sends an AEM command to a discovered entity and waits for its response.
    pub async fn send_aem_command(
        &self,
        target: EntityId,
        command_type: AemCommandType,
        payload: Vec<u8>,
    ) -> Result<AemResponse> {
        let mut command = AemAecpdu::new(command_type);
        command.header.target_entity_id = target;
        command.set_payload(payload)?;

        match self.send_aecp_command(Aecpdu::Aem(command)).await? {
            Aecpdu::Aem(response) => Ok(response),
            Aecpdu::VendorUnique(response) => {
                Err(ErrorKind::UnexpectedResponse(response.header.message_type).into())
            }
        }
    }

    pub async fn send_vendor_unique_command(
        &self,
        target: EntityId,
        protocol_identifier: [u8; 6],
        payload: Vec<u8>,
    ) -> Result<VuAecpdu> {
        let mut command = VuAecpdu::new(protocol_identifier);
        command.header.target_entity_id = target;
        command.set_payload(payload)?;

        match self
            .send_aecp_command(Aecpdu::VendorUnique(command))
            .await?
        {
            Aecpdu::VendorUnique(response) => Ok(response),
            Aecpdu::Aem(response) => {
                Err(ErrorKind::UnexpectedResponse(response.header.message_type).into())
            }
        }
    }

    pub async fn query_entity_available(&self, target: EntityId) -> Result<()> {
        self.send_aem_command(target, AemCommandType::EntityAvailable, Vec::new())
            .await?;
        Ok(())
    }

    pub async fn query_controller_available(&self, target: EntityId) -> Result<()> {
        self.send_aem_command(target, AemCommandType::ControllerAvailable, Vec::new())
            .await?;
        Ok(())
    }

    pub async fn register_unsolicited_notifications(&self, target: EntityId) -> Result<()> {
        self.send_aem_command(
            target,
            AemCommandType::RegisterUnsolicitedNotification,
            Vec::new(),
        )
        .await?;
        Ok(())
    }

    pub async fn deregister_unsolicited_notifications(&self, target: EntityId) -> Result<()> {
        self.send_aem_command(
            target,
            AemCommandType::DeregisterUnsolicitedNotification,
            Vec::new(),
        )
        .await?;
        Ok(())
    }

    /// Answers AEM commands addressed to the local entity with `handler`.
    pub fn set_aem_command_handler<H>(&self, handler: H) -> Result<()>
    where
        H: AemCommandHandler,
    {
        self.send(Request::SetAemHandler(Some(Box::new(handler))))
    }

    pub fn clear_aem_command_handler(&self) -> Result<()> {
        self.send(Request::SetAemHandler(None))
    }

    /// Notifies every registered controller. Returns how many were notified.
    pub async fn send_unsolicited_notification(
        &self,
        command_type: AemCommandType,
        payload: Vec<u8>,
    ) -> Result<usize> {
        self.call(|sender| Request::UnsolicitedNotification {
            command_type,
            payload,
            sender,
        })
        .await?
    }

    async fn send_acmp_command(
        &self,
        message_type: AcmpMessageType,
        talker: StreamIdentification,
        listener: StreamIdentification,
        connection_count: u16,
    ) -> Result<ConnectionInfo> {
        let command = Acmpdu {
            message_type,
            talker_entity_id: talker.entity_id,
            talker_unique_id: talker.stream_index,
            listener_entity_id: listener.entity_id,
            listener_unique_id: listener.stream_index,
            connection_count,
            ..Default::default()
        };
        let response = self
            .call(|sender| Request::Acmp { command, sender })
            .await??;
        Ok(ConnectionInfo::from(&response))
    }

    pub async fn connect_stream(
        &self,
        talker: StreamIdentification,
        listener: StreamIdentification,
    ) -> Result<ConnectionInfo> {
        self.send_acmp_command(AcmpMessageType::ConnectRxCommand, talker, listener, 0)
            .await
    }

    pub async fn disconnect_stream(
        &self,
        talker: StreamIdentification,
        listener: StreamIdentification,
    ) -> Result<ConnectionInfo> {
        self.send_acmp_command(AcmpMessageType::DisconnectRxCommand, talker, listener, 0)
            .await
    }

    /// Asks the talker directly to drop a listener, for listeners that went away.
    pub async fn disconnect_talker_stream(
        &self,
        talker: StreamIdentification,
        listener: StreamIdentification,
    ) -> Result<ConnectionInfo> {
        self.send_acmp_command(AcmpMessageType::DisconnectTxCommand, talker, listener, 0)
            .await
    }

    pub async fn get_talker_stream_state(
        &self,
        talker: StreamIdentification,
    ) -> Result<ConnectionInfo> {
        let nobody = StreamIdentification::new(EntityId::NULL, 0);
        self.send_acmp_command(AcmpMessageType::GetTxStateCommand, talker, nobody, 0)
            .await
    }

    pub async fn get_listener_stream_state(
        &self,
        listener: StreamIdentification,
    ) -> Result<ConnectionInfo> {
        let nobody = StreamIdentification::new(EntityId::NULL, 0);
        self.send_acmp_command(AcmpMessageType::GetRxStateCommand, nobody, listener, 0)
            .await
    }

    /// The `connection_index`th listener of a talker output.
    pub async fn get_talker_stream_connection(
        &self,
        talker: StreamIdentification,
        connection_index: u16,
    ) -> Result<ConnectionInfo> {
        let nobody = StreamIdentification::new(EntityId::NULL, 0);
        self.send_acmp_command(
            AcmpMessageType::GetTxConnectionCommand,
            talker,
            nobody,
            connection_index,
        )
        .await
    }

    /// Cancels outstanding commands, announces departure and waits for the task to stop. Later
    /// calls fail with `ChannelError`.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(Request::Shutdown).await
    }
}

/// Task owning the transport and every state machine.
struct Worker<T> {
    transport: T,
    frames: FrameReceiver,
    frames_open: bool,
    requests: mpsc::UnboundedReceiver<Request>,
    subscribers: Vec<mpsc::UnboundedSender<Event>>,
    advertise: bool,
    adp: AdpStateMachine,
    aecp: AecpStateMachine,
    acmp: AcmpStateMachine,
}

impl<T> Worker<T>
where
    T: Transport,
{
    async fn task(mut self) {
        info!(
            "{}: protocol interface up ({})",
            self.transport.interface_name(),
            self.transport.mac_address()
        );
        if self.advertise {
            let mut outbox = Outbox::default();
            self.adp.enable_advertising(Instant::now(), &mut outbox);
            self.flush(outbox);
        }

        loop {
            let deadline = self.next_deadline();
            let sleep = async move {
                match deadline {
                    Some(deadline) => time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            // Frames first, so a request observes every frame received before it was made.
            tokio::select! {
                biased;
                frame = self.frames.recv(), if self.frames_open => match frame {
                    Some(frame) => self.process_frame(&frame),
                    None => {
                        error!("{}: transport closed", self.transport.interface_name());
                        self.frames_open = false;
                        let mut outbox = Outbox::default();
                        outbox.emit(Event::TransportError(format!(
                            "{}: transport closed",
                            self.transport.interface_name()
                        )));
                        self.flush(outbox);
                    }
                },
                request = self.requests.recv() => match request {
                    Some(request) => {
                        if !self.process_request(request) {
                            break;
                        }
                    }
                    None => {
                        self.shutdown();
                        break;
                    }
                },
                _ = sleep => self.expire(Instant::now()),
            }
        }

        info!("{}: protocol interface down", self.transport.interface_name());
    }

    fn next_deadline(&self) -> Option<Instant> {
        [
            self.adp.next_deadline(),
            self.aecp.next_deadline(),
            self.acmp.next_deadline(),
        ]
        .iter()
        .flatten()
        .min()
        .copied()
    }

    /// Returns false once the task should stop.
    fn process_request(&mut self, request: Request) -> bool {
        let now = Instant::now();
        let mut outbox = Outbox::default();

        match request {
            Request::Subscribe(subscriber) => self.subscribers.push(subscriber),
            Request::DiscoveredEntities(sender) => {
                let _ = sender.send(self.adp.entities());
            }
            Request::EnableAdvertising => self.adp.enable_advertising(now, &mut outbox),
            Request::DisableAdvertising => self.adp.disable_advertising(&mut outbox),
            Request::SetEntityInfo(info) => {
                self.aecp.set_local_entity_id(info.entity_id);
                self.acmp.set_local_entity_id(info.entity_id);
                self.adp.set_entity_info(info, now, &mut outbox);
            }
            Request::Discover(entity_id) => self.adp.discover(entity_id, &mut outbox),
            Request::Aecp { command, sender } => {
                let target = command.header().target_entity_id;
                match self.adp.entity(target) {
                    Some(entity) => {
                        let mac_address = entity.mac_address;
                        self.aecp
                            .send_command(command, mac_address, sender, now, &mut outbox);
                    }
                    None => {
                        let _ = sender.send(Err(ErrorKind::UnknownEntity(target).into()));
                    }
                }
            }
            Request::SetAemHandler(handler) => self.aecp.set_handler(handler),
            Request::UnsolicitedNotification {
                command_type,
                payload,
                sender,
            } => {
                let result =
                    self.aecp
                        .send_unsolicited_notification(command_type, payload, &mut outbox);
                let _ = sender.send(result);
            }
            Request::Acmp { command, sender } => {
                self.acmp.send_command(command, sender, now, &mut outbox)
            }
            Request::Shutdown(ack) => {
                self.shutdown();
                let _ = ack.send(());
                return false;
            }
        }

        self.flush(outbox);
        true
    }

    fn process_frame(&mut self, frame: &[u8]) {
        let mac_address = self.transport.mac_address();
        if frame.get(6..12) == Some(&mac_address.0[..]) {
            return;
        }

        let pdu = match Pdu::deserialize(frame) {
            Ok(pdu) => pdu,
            Err(error) => {
                match error.kind {
                    ErrorKind::UnsupportedEtherType(_) | ErrorKind::UnsupportedSubtype(_) => {
                        trace!("ignoring frame: {}", error)
                    }
                    _ => warn!("dropping frame: {}", error),
                }
                return;
            }
        };

        let now = Instant::now();
        let mut outbox = Outbox::default();
        match pdu {
            Pdu::Adp(pdu) => self.adp.process(pdu, now, &mut outbox),
            Pdu::Aecp(pdu) => self.aecp.process(pdu, now, &mut outbox),
            Pdu::Acmp(pdu) => self.acmp.process(pdu, now, &mut outbox),
        }
        self.flush(outbox);
    }

    fn expire(&mut self, now: Instant) {
        let mut outbox = Outbox::default();
        self.adp.expire(now, &mut outbox);
        self.aecp.expire(now, &mut outbox);
        self.acmp.expire(now, &mut outbox);
        self.flush(outbox);
    }

    /// Transmits PDUs and publishes events until nothing is left. ACMP PDUs are also handed back
    /// to the local ACMP state machine, which may answer them.
    fn flush(&mut self, mut outbox: Outbox) {
        let now = Instant::now();
        let mac_address = self.transport.mac_address();

        while !outbox.is_empty() {
            let Outbox { pdus, events } = std::mem::take(&mut outbox);

            for event in events {
                if let Event::EntityOffline(entity_id) = &event {
                    self.aecp.cancel_target(*entity_id);
                }
                self.subscribers
                    .retain(|subscriber| subscriber.send(event.clone()).is_ok());
            }

            for mut pdu in pdus {
                pdu.ether2_mut().src_address = mac_address;
                let frame = pdu.serialize();
                trace!("sending {:?}", pdu);
                if let Err(error) = self.transport.send_frame(&frame) {
                    warn!(
                        "{}: failed to send frame: {}",
                        self.transport.interface_name(),
                        error
                    );
                }
                if let Pdu::Acmp(pdu) = pdu {
                    self.acmp.process(pdu, now, &mut outbox);
                }
            }
        }
    }

    fn shutdown(&mut self) {
        debug!("{}: shutting down", self.transport.interface_name());
        self.aecp.cancel_all();
        self.acmp.cancel_all();

        let mut outbox = Outbox::default();
        self.adp.disable_advertising(&mut outbox);
        self.flush(outbox);
    }
}
