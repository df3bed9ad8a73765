//! Relay Agent Information option (RFC 3046, option 82) and the circuit id
//! this relay stamps into it.

use std::fmt;

use crate::domain::net::{ConnectPoint, VlanId};
use crate::error::CircuitIdError;

/// Sub-option codes defined by RFC 3046.
pub mod sub_option_codes {
    pub const CIRCUIT_ID: u8 = 1;
    pub const REMOTE_ID: u8 = 2;
}

/// One sub-option of the relay agent information option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelaySubOption {
    /// Sub-option 1: Agent Circuit ID
    CircuitId(Vec<u8>),
    /// Sub-option 2: Agent Remote ID
    RemoteId(Vec<u8>),
    /// Any other sub-option (code, data)
    Other(u8, Vec<u8>),
}

impl RelaySubOption {
    pub fn code(&self) -> u8 {
        match self {
            Self::CircuitId(_) => sub_option_codes::CIRCUIT_ID,
            Self::RemoteId(_) => sub_option_codes::REMOTE_ID,
            Self::Other(code, _) => *code,
        }
    }

    pub fn data(&self) -> &[u8] {
        match self {
            Self::CircuitId(data) | Self::RemoteId(data) | Self::Other(_, data) => data,
        }
    }
}

/// Option 82 payload: an ordered list of sub-options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayAgentInformation {
    pub sub_options: Vec<RelaySubOption>,
}

impl RelayAgentInformation {
    /// An option carrying only a circuit id sub-option.
    pub fn with_circuit_id(circuit_id: &CircuitId) -> Self {
        Self {
            sub_options: vec![RelaySubOption::CircuitId(circuit_id.encode())],
        }
    }

    /// Raw bytes of the circuit id sub-option, if present.
    pub fn circuit_id(&self) -> Option<&[u8]> {
        self.sub_options.iter().find_map(|sub| match sub {
            RelaySubOption::CircuitId(data) => Some(data.as_slice()),
            _ => None,
        })
    }

    /// Decode the option payload. Returns `None` if a sub-option runs past
    /// the end of the payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut sub_options = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            let code = data[offset];
            let len = *data.get(offset + 1)? as usize;
            let value = data.get(offset + 2..offset + 2 + len)?.to_vec();

            sub_options.push(match code {
                sub_option_codes::CIRCUIT_ID => RelaySubOption::CircuitId(value),
                sub_option_codes::REMOTE_ID => RelaySubOption::RemoteId(value),
                other => RelaySubOption::Other(other, value),
            });
            offset += 2 + len;
        }

        Some(Self { sub_options })
    }

    /// Encode the option payload (without the option 82 code/length header).
    /// Returns `None` if a sub-option is longer than 255 bytes.
    pub fn encode(&self) -> Option<Vec<u8>> {
        let mut out = Vec::new();
        for sub in &self.sub_options {
            let data = sub.data();
            out.push(sub.code());
            out.push(u8::try_from(data.len()).ok()?);
            out.extend_from_slice(data);
        }
        Some(out)
    }
}

/// The attachment point and VLAN a client request arrived on, carried
/// upstream in the circuit id sub-option.
///
/// Wire form is ASCII `"<device>/<port>:<vlan>"` where `<vlan>` is the
/// decimal id or `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CircuitId {
    connect_point: ConnectPoint,
    vlan: VlanId,
}

impl CircuitId {
    pub fn new(connect_point: ConnectPoint, vlan: VlanId) -> Self {
        Self {
            connect_point,
            vlan,
        }
    }

    pub fn connect_point(&self) -> &ConnectPoint {
        &self.connect_point
    }

    pub fn vlan(&self) -> VlanId {
        self.vlan
    }

    pub fn encode(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }

    pub fn decode(data: &[u8]) -> Result<Self, CircuitIdError> {
        if !data.is_ascii() {
            return Err(CircuitIdError::NotAscii);
        }
        // ASCII was checked above, so this cannot fail.
        let text = std::str::from_utf8(data).map_err(|_| CircuitIdError::NotAscii)?;

        let (connect_point, vlan) = text
            .rsplit_once(':')
            .ok_or_else(|| CircuitIdError::MissingSeparator(text.to_string()))?;
        let connect_point = connect_point
            .parse::<ConnectPoint>()
            .map_err(|_| CircuitIdError::InvalidConnectPoint(connect_point.to_string()))?;
        let vlan = vlan
            .parse::<VlanId>()
            .map_err(|_| CircuitIdError::InvalidVlan(vlan.to_string()))?;

        Ok(Self::new(connect_point, vlan))
    }
}

impl fmt::Display for CircuitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.connect_point, self.vlan)
    }
}
