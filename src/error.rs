//! Error types for the relay.
//!
//! Each concern gets its own enum so callers can match on what they can
//! actually handle. None of these terminate packet processing: the relay
//! handler turns every failure into a dropped packet plus a log line.

use thiserror::Error;

/// Errors from reading or writing the DHCP wire format.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseError {
    #[error("packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("invalid DHCP magic cookie")]
    InvalidMagicCookie,

    #[error("invalid option at offset {offset}: {message}")]
    InvalidOption { offset: usize, message: String },

    #[error("option {code} carries {len} bytes, more than fit in one option")]
    OptionTooLong { code: u8, len: usize },
}

/// Errors from decoding the Ethernet/VLAN/IPv4/UDP/ARP layering of a frame.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FrameError {
    #[error("truncated {layer} header")]
    Truncated { layer: &'static str },

    #[error("unsupported IPv4 header length {0}")]
    BadIpv4Header(u8),

    #[error("unsupported ARP address sizes (hardware {hardware}, protocol {protocol})")]
    UnsupportedArp { hardware: u8, protocol: u8 },

    #[error("failed to encode {layer} header")]
    Encode { layer: &'static str },
}

/// A circuit-id payload that this relay cannot decode.
///
/// Never surfaced as a failure: it only means the circuit id was not
/// authored by us, so resolution falls back to the relay record.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CircuitIdError {
    #[error("circuit id is not ASCII")]
    NotAscii,

    #[error("circuit id has no VLAN separator: {0}")]
    MissingSeparator(String),

    #[error("invalid connect point in circuit id: {0}")]
    InvalidConnectPoint(String),

    #[error("invalid VLAN in circuit id: {0}")]
    InvalidVlan(String),
}

/// Errors from loading the relay configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },

    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Errors from raw packet capture.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("network interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("failed to create capture channel: {0}")]
    ChannelCreation(String),

    #[error("insufficient permissions for raw capture (run as root or grant CAP_NET_RAW)")]
    InsufficientPermissions,
}

/// Why a single DHCP packet was not relayed.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum RelayError {
    /// Unparsable layering or options. Logged at debug level only.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// A missing interface, uplink MAC or relay record.
    #[error("{0}")]
    UnresolvedTopology(String),

    /// The DHCP server target has not been configured yet.
    #[error("missing DHCP relay server config")]
    ConfigurationIncomplete,
}

impl RelayError {
    /// Emit this error at the level its kind calls for.
    pub fn log(&self) {
        match self {
            RelayError::MalformedPacket(_) => tracing::debug!("Dropping packet: {}", self),
            RelayError::UnresolvedTopology(_) | RelayError::ConfigurationIncomplete => {
                tracing::warn!("Dropping packet: {}", self)
            }
        }
    }
}
