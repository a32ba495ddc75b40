use std::time::Duration;

use avdecc_helpers::RetryPolicy;

use crate::{controller_capabilities, AcmpMessageType, EntityId, MacAddress};

/// What the local entity advertises about itself in ADP.
#[derive(Clone, Debug)]
pub struct LocalEntityInfo {
    /// Also used as the controller ID of every AECP and ACMP command sent.
    pub entity_id: EntityId,
    pub entity_model_id: u64,
    pub entity_capabilities: u32,
    pub talker_capabilities: u16,
    pub listener_capabilities: u16,
    pub controller_capabilities: u32,
    pub gptp_grandmaster_id: u64,
    pub gptp_domain_number: u8,
    pub identify_control_index: u16,
    pub interface_index: u16,
    pub association_id: u64,
    /// Advertisement validity in 2 second units (5 bits, 1..=31).
    pub valid_time: u8,
}

impl LocalEntityInfo {
    pub fn valid_time_duration(&self) -> Duration {
        Duration::from_secs(2 * u64::from(self.valid_time & 0x1F))
    }
}

impl Default for LocalEntityInfo {
    fn default() -> Self {
        Self {
            entity_id: EntityId::NULL,
            entity_model_id: 0,
            entity_capabilities: 0,
            talker_capabilities: 0,
            listener_capabilities: 0,
            controller_capabilities: controller_capabilities::IMPLEMENTED,
            gptp_grandmaster_id: 0,
            gptp_domain_number: 0,
            identify_control_index: 0,
            interface_index: 0,
            association_id: 0,
            valid_time: 31,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct AdpConfig {
    /// Period between ENTITY_AVAILABLE messages. Derived from the valid time when unset.
    pub advertise_interval: Option<Duration>,
}

impl AdpConfig {
    pub fn advertise_interval(&self, entity: &LocalEntityInfo) -> Duration {
        self.advertise_interval
            .unwrap_or_else(|| (entity.valid_time_duration() / 2).max(Duration::from_secs(1)))
    }
}

/// Per message timeouts of ACMP commands, sharing one retry count.
#[derive(Clone, Debug)]
pub struct AcmpConfig {
    pub connect_tx: Duration,
    pub disconnect_tx: Duration,
    pub get_tx_state: Duration,
    pub connect_rx: Duration,
    pub disconnect_rx: Duration,
    pub get_rx_state: Duration,
    pub get_tx_connection: Duration,
    pub max_retries: u8,
}

impl AcmpConfig {
    /// The same timeout for every command.
    pub fn uniform(timeout: Duration, max_retries: u8) -> Self {
        Self {
            connect_tx: timeout,
            disconnect_tx: timeout,
            get_tx_state: timeout,
            connect_rx: timeout,
            disconnect_rx: timeout,
            get_rx_state: timeout,
            get_tx_connection: timeout,
            max_retries,
        }
    }

    pub fn policy(&self, message_type: AcmpMessageType) -> RetryPolicy {
        let timeout = match message_type {
            AcmpMessageType::ConnectTxCommand => self.connect_tx,
            AcmpMessageType::DisconnectTxCommand => self.disconnect_tx,
            AcmpMessageType::GetTxStateCommand => self.get_tx_state,
            AcmpMessageType::ConnectRxCommand => self.connect_rx,
            AcmpMessageType::DisconnectRxCommand => self.disconnect_rx,
            AcmpMessageType::GetRxStateCommand => self.get_rx_state,
            AcmpMessageType::GetTxConnectionCommand => self.get_tx_connection,
            _ => self.get_tx_state,
        };
        RetryPolicy::new(timeout, self.max_retries)
    }
}

impl Default for AcmpConfig {
    fn default() -> Self {
        Self {
            connect_tx: Duration::from_millis(2000),
            disconnect_tx: Duration::from_millis(200),
            get_tx_state: Duration::from_millis(200),
            connect_rx: Duration::from_millis(4500),
            disconnect_rx: Duration::from_millis(500),
            get_rx_state: Duration::from_millis(200),
            get_tx_connection: Duration::from_millis(200),
            max_retries: 1,
        }
    }
}

/// A stream output of the local talker.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TalkerStreamConfig {
    pub stream_id: u64,
    pub stream_dest_address: MacAddress,
    pub stream_vlan_id: u16,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub entity: LocalEntityInfo,
    /// Start advertising the local entity when the interface comes up.
    pub advertise: bool,
    pub adp: AdpConfig,
    pub aecp: RetryPolicy,
    pub acmp: AcmpConfig,
    /// Indexed by talker unique ID.
    pub talker_streams: Vec<TalkerStreamConfig>,
    pub listener_sinks: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            entity: LocalEntityInfo::default(),
            advertise: false,
            adp: AdpConfig::default(),
            aecp: RetryPolicy::new(Duration::from_millis(250), 1),
            acmp: AcmpConfig::default(),
            talker_streams: Vec::new(),
            listener_sinks: 0,
        }
    }
}
