use std::fmt::{self, Display};

/// Defines a wire code table. Values without a named variant are kept as `Unknown(raw)`, so
/// decoding then encoding a code never changes it.
macro_rules! define_codes {
    ($(#[$meta:meta])* $name:ident: $repr:ty { $(($variant:ident, $value:literal)),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
        pub enum $name {
            $($variant,)+
            Unknown($repr),
        }

        impl From<$repr> for $name {
            fn from(raw: $repr) -> Self {
                match raw {
                    $($value => $name::$variant,)+
                    other => $name::Unknown(other),
                }
            }
        }

        impl From<$name> for $repr {
            fn from(code: $name) -> $repr {
                match code {
                    $($name::$variant => $value,)+
                    $name::Unknown(raw) => raw,
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                match self {
                    $($name::$variant => write!(f, "{} ({:#x})", stringify!($variant), $value),)+
                    $name::Unknown(raw) => write!(f, "Unknown ({:#x})", raw),
                }
            }
        }
    };
}

define_codes! {
    /// AVTP subtypes of the three AVDECC protocols.
    AvtpSubtype: u8 {
        (Adp, 0xFA),
        (Aecp, 0xFB),
        (Acmp, 0xFC),
    }
}

define_codes! {
    AdpMessageType: u8 {
        (EntityAvailable, 0),
        (EntityDeparting, 1),
        (EntityDiscover, 2),
    }
}

define_codes! {
    AecpMessageType: u8 {
        (AemCommand, 0),
        (AemResponse, 1),
        (AddressAccessCommand, 2),
        (AddressAccessResponse, 3),
        (AvcCommand, 4),
        (AvcResponse, 5),
        (VendorUniqueCommand, 6),
        (VendorUniqueResponse, 7),
    }
}

define_codes! {
    AemCommandType: u16 {
        (AcquireEntity, 0x0000),
        (LockEntity, 0x0001),
        (EntityAvailable, 0x0002),
        (ControllerAvailable, 0x0003),
        (ReadDescriptor, 0x0004),
        (WriteDescriptor, 0x0005),
        (SetConfiguration, 0x0006),
        (GetConfiguration, 0x0007),
        (SetStreamFormat, 0x0008),
        (GetStreamFormat, 0x0009),
        (SetVideoFormat, 0x000A),
        (GetVideoFormat, 0x000B),
        (SetSensorFormat, 0x000C),
        (GetSensorFormat, 0x000D),
        (SetStreamInfo, 0x000E),
        (GetStreamInfo, 0x000F),
        (SetName, 0x0010),
        (GetName, 0x0011),
        (SetAssociationId, 0x0012),
        (GetAssociationId, 0x0013),
        (SetSamplingRate, 0x0014),
        (GetSamplingRate, 0x0015),
        (SetClockSource, 0x0016),
        (GetClockSource, 0x0017),
        (SetControl, 0x0018),
        (GetControl, 0x0019),
        (IncrementControl, 0x001A),
        (DecrementControl, 0x001B),
        (SetSignalSelector, 0x001C),
        (GetSignalSelector, 0x001D),
        (SetMixer, 0x001E),
        (GetMixer, 0x001F),
        (SetMatrix, 0x0020),
        (GetMatrix, 0x0021),
        (StartStreaming, 0x0022),
        (StopStreaming, 0x0023),
        (RegisterUnsolicitedNotification, 0x0024),
        (DeregisterUnsolicitedNotification, 0x0025),
        (IdentifyNotification, 0x0026),
        (GetAvbInfo, 0x0027),
        (GetAsPath, 0x0028),
        (GetCounters, 0x0029),
        (Reboot, 0x002A),
        (GetAudioMap, 0x002B),
        (AddAudioMappings, 0x002C),
        (RemoveAudioMappings, 0x002D),
    }
}

define_codes! {
    /// AECP status. The AEM values also apply to vendor unique responses.
    AemStatus: u8 {
        (Success, 0),
        (NotImplemented, 1),
        (NoSuchDescriptor, 2),
        (EntityLocked, 3),
        (EntityAcquired, 4),
        (NotAuthenticated, 5),
        (AuthenticationDisabled, 6),
        (BadArguments, 7),
        (NoResources, 8),
        (InProgress, 9),
        (EntityMisbehaving, 10),
        (NotSupported, 11),
        (StreamIsRunning, 12),
    }
}

define_codes! {
    AcmpMessageType: u8 {
        (ConnectTxCommand, 0),
        (ConnectTxResponse, 1),
        (DisconnectTxCommand, 2),
        (DisconnectTxResponse, 3),
        (GetTxStateCommand, 4),
        (GetTxStateResponse, 5),
        (ConnectRxCommand, 6),
        (ConnectRxResponse, 7),
        (DisconnectRxCommand, 8),
        (DisconnectRxResponse, 9),
        (GetRxStateCommand, 10),
        (GetRxStateResponse, 11),
        (GetTxConnectionCommand, 12),
        (GetTxConnectionResponse, 13),
    }
}

define_codes! {
    AcmpStatus: u8 {
        (Success, 0),
        (ListenerUnknownId, 1),
        (TalkerUnknownId, 2),
        (TalkerDestMacFail, 3),
        (TalkerNoStreamIndex, 4),
        (TalkerNoBandwidth, 5),
        (TalkerExclusive, 6),
        (ListenerTalkerTimeout, 7),
        (ListenerExclusive, 8),
        (StateUnavailable, 9),
        (NotConnected, 10),
        (NoSuchConnection, 11),
        (CouldNotSendMessage, 12),
        (TalkerMisbehaving, 13),
        (ListenerMisbehaving, 14),
        (ControllerNotAuthorized, 16),
        (IncompatibleRequest, 17),
        (NotSupported, 31),
    }
}

impl AecpMessageType {
    pub fn is_response(self) -> bool {
        u8::from(self) & 0x01 == 0x01
    }

    /// The response type that answers this command type.
    pub fn response(self) -> Self {
        Self::from(u8::from(self) | 0x01)
    }
}

impl AcmpMessageType {
    pub fn is_response(self) -> bool {
        u8::from(self) & 0x01 == 0x01
    }

    pub fn response(self) -> Self {
        Self::from(u8::from(self) | 0x01)
    }

    /// True for messages addressed to a talker, false for those addressed to a listener.
    pub fn is_talker_message(self) -> bool {
        matches!(
            self,
            AcmpMessageType::ConnectTxCommand
                | AcmpMessageType::ConnectTxResponse
                | AcmpMessageType::DisconnectTxCommand
                | AcmpMessageType::DisconnectTxResponse
                | AcmpMessageType::GetTxStateCommand
                | AcmpMessageType::GetTxStateResponse
                | AcmpMessageType::GetTxConnectionCommand
                | AcmpMessageType::GetTxConnectionResponse
        )
    }
}
